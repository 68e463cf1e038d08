//! Native filesystem operation types and the `RawFilesystem` capability
//! trait.
//!
//! The structs here mirror the kernel driver's request/reply layouts
//! (Linux layout only). They are plain data: the wire representation
//! lives in `serialize.rs` and is always little-endian regardless of the
//! host.

use bitflags::bitflags;

use async_trait::async_trait;

use crate::cancel::Interrupt;
use crate::dirent::DirEntryList;
use crate::status::Status;

/// Header common to every request, carried unchanged across the boundary.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct InHeader {
    /// Total length of the original kernel request
    pub length: u32,
    /// Kernel opcode of the original request
    pub opcode: u32,
    /// Kernel-assigned request id
    pub unique: u64,
    /// Inode number the operation applies to
    pub nodeid: u64,
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    pub padding: u32,
}

/// File attributes corresponding to `struct stat` of Linux.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Attr {
    pub ino: u64,
    pub size: u64,
    /// Number of 512B blocks allocated
    pub blocks: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub atimensec: u32,
    pub mtimensec: u32,
    pub ctimensec: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
    pub padding: u32,
}

/// Reply to operations that resolve a name to an inode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryOut {
    pub nodeid: u64,
    pub generation: u64,
    /// Seconds the kernel may cache this entry
    pub entry_valid: u64,
    /// Seconds the kernel may cache the attributes
    pub attr_valid: u64,
    pub entry_valid_nsec: u32,
    pub attr_valid_nsec: u32,
    pub attr: Attr,
}

/// Reply carrying attributes only.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AttrOut {
    pub attr_valid: u64,
    pub attr_valid_nsec: u32,
    pub dummy: u32,
    pub attr: Attr,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GetAttrIn {
    pub header: InHeader,
    /// `FUSE_GETATTR_FH` when `fh` is meaningful
    pub flags: u32,
    pub dummy: u32,
    pub fh: u64,
}

bitflags! {
    /// Bits in `SetAttrIn.valid` selecting which fields to apply.
    ///
    /// If a time bit is set together with its `_NOW` bit, the current time
    /// on the serving side is used instead of the value in the request.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct SetAttrValid: u32 {
        const MODE      = 0x0001;
        const UID       = 0x0002;
        const GID       = 0x0004;
        const SIZE      = 0x0008;
        const ATIME     = 0x0010;
        const MTIME     = 0x0020;
        const FH        = 0x0040;
        const ATIME_NOW = 0x0080;
        const MTIME_NOW = 0x0100;
        const LOCKOWNER = 0x0200;
        const CTIME     = 0x0400;
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SetAttrIn {
    pub header: InHeader,
    pub valid: SetAttrValid,
    pub padding: u32,
    pub fh: u64,
    pub size: u64,
    pub lock_owner: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub atimensec: u32,
    pub mtimensec: u32,
    pub ctimensec: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenIn {
    pub header: InHeader,
    /// Open flags (O_RDONLY, O_WRONLY, O_RDWR, ...)
    pub flags: u32,
    pub mode: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenOut {
    /// File handle echoed back in subsequent I/O requests
    pub fh: u64,
    pub open_flags: u32,
    pub padding: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateIn {
    pub header: InHeader,
    pub flags: u32,
    pub mode: u32,
    pub umask: u32,
    pub padding: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateOut {
    pub entry: EntryOut,
    pub open: OpenOut,
}

/// Request layout shared by `Read`, `ReadDir` and `ReadDirPlus`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadIn {
    pub header: InHeader,
    pub fh: u64,
    pub offset: u64,
    pub size: u32,
    pub read_flags: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteIn {
    pub header: InHeader,
    pub fh: u64,
    pub offset: u64,
    pub size: u32,
    pub write_flags: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReleaseIn {
    pub header: InHeader,
    pub fh: u64,
    pub flags: u32,
    pub release_flags: u32,
    pub lock_owner: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushIn {
    pub header: InHeader,
    pub fh: u64,
    pub unused: u32,
    pub padding: u32,
    pub lock_owner: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FsyncIn {
    pub header: InHeader,
    pub fh: u64,
    /// Bit 0 set means data only, skip the metadata sync
    pub fsync_flags: u32,
    pub padding: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MknodIn {
    pub header: InHeader,
    pub mode: u32,
    pub rdev: u32,
    pub umask: u32,
    pub padding: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MkdirIn {
    pub header: InHeader,
    pub mode: u32,
    pub umask: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RenameIn {
    pub header: InHeader,
    /// Inode of the destination directory
    pub newdir: u64,
    pub flags: u32,
    pub padding: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkIn {
    pub header: InHeader,
    /// Inode of the existing file to link to
    pub oldnodeid: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessIn {
    pub header: InHeader,
    pub mask: u32,
    pub padding: u32,
}

/// Byte-range lock description, `struct flock` without the whence field.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FileLock {
    pub start: u64,
    pub end: u64,
    /// F_RDLCK, F_WRLCK or F_UNLCK
    pub typ: u32,
    pub pid: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LkIn {
    pub header: InHeader,
    pub fh: u64,
    pub owner: u64,
    pub lk: FileLock,
    pub lk_flags: u32,
    pub padding: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LkOut {
    pub lk: FileLock,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FallocateIn {
    pub header: InHeader,
    pub fh: u64,
    pub offset: u64,
    pub length: u64,
    pub mode: u32,
    pub padding: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LseekIn {
    pub header: InHeader,
    pub fh: u64,
    pub offset: u64,
    pub whence: u32,
    pub padding: u32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LseekOut {
    pub offset: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CopyFileRangeIn {
    pub header: InHeader,
    pub fh_in: u64,
    pub off_in: u64,
    pub nodeid_out: u64,
    pub fh_out: u64,
    pub off_out: u64,
    pub len: u64,
    pub flags: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SetXAttrIn {
    pub header: InHeader,
    pub size: u32,
    pub flags: u32,
}

/// Filesystem statistics corresponding to `struct statfs` of Linux.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StatFsOut {
    /// Total data blocks in the filesystem
    pub blocks: u64,
    /// Free blocks
    pub bfree: u64,
    /// Free blocks available to unprivileged users
    pub bavail: u64,
    /// Total file nodes
    pub files: u64,
    /// Free file nodes
    pub ffree: u64,
    /// Optimal transfer block size
    pub bsize: u32,
    /// Maximum length of filenames
    pub namelen: u32,
    /// Fragment size
    pub frsize: u32,
    pub padding: u32,
}

impl From<nix::sys::statvfs::Statvfs> for StatFsOut {
    fn from(buf: nix::sys::statvfs::Statvfs) -> StatFsOut {
        StatFsOut {
            blocks: buf.blocks(),
            bfree: buf.blocks_free(),
            bavail: buf.blocks_available(),
            files: buf.files(),
            ffree: buf.files_free(),
            bsize: buf.block_size() as u32,
            namelen: buf.name_max() as u32,
            frsize: buf.fragment_size() as u32,
            padding: 0,
        }
    }
}

/// The raw filesystem capability surface carried across the boundary.
///
/// Implementors receive every request the kernel driver emits, in the
/// kernel's own terms: inode numbers, opaque file handles, byte-string
/// names. Every method takes an [`Interrupt`] that fires if the caller
/// abandons the request; long operations should poll or select on it.
///
/// Most methods have default implementations returning
/// [`Status::ENOSYS`], so an implementation only needs the operations it
/// actually supports. `ENOSYS` is special: the serving side reports it as
/// an unimplemented-call failure instead of a payload status, and the
/// kernel stops issuing that operation.
///
/// # Minimum Implementation
///
/// For a browsable read-only filesystem, implement:
/// - [`lookup`](Self::lookup) - Resolve a name within a directory
/// - [`getattr`](Self::getattr) - Get file attributes
/// - [`open`](Self::open) / [`read`](Self::read) - Read file contents
/// - [`opendir`](Self::opendir) / [`readdir`](Self::readdir) - List
///   directories
///
/// For a writable filesystem, additionally implement `setattr`, `create`,
/// `write`, `mkdir`, `unlink`, `rmdir` and `rename`.
#[async_trait]
pub trait RawFilesystem: Send + Sync {
    /// Resolve `name` within the directory `header.nodeid`.
    async fn lookup(
        &self,
        _intr: &Interrupt,
        _header: &InHeader,
        _name: &[u8],
        _out: &mut EntryOut,
    ) -> Status {
        Status::ENOSYS
    }

    /// Drop `nlookup` references to an inode. Fire-and-forget: there is
    /// no way to report failure, so errors should be logged and swallowed.
    async fn forget(&self, _intr: &Interrupt, _header: &InHeader, _nlookup: u64) {}

    async fn getattr(&self, _intr: &Interrupt, _arg: &GetAttrIn, _out: &mut AttrOut) -> Status {
        Status::ENOSYS
    }

    async fn setattr(&self, _intr: &Interrupt, _arg: &SetAttrIn, _out: &mut AttrOut) -> Status {
        Status::ENOSYS
    }

    /// Read the target of a symbolic link.
    async fn readlink(&self, _intr: &Interrupt, _header: &InHeader) -> (Vec<u8>, Status) {
        (Vec::new(), Status::ENOSYS)
    }

    /// Create a symbolic link `name` pointing to `target`.
    async fn symlink(
        &self,
        _intr: &Interrupt,
        _header: &InHeader,
        _target: &[u8],
        _name: &[u8],
        _out: &mut EntryOut,
    ) -> Status {
        Status::ENOSYS
    }

    async fn mknod(
        &self,
        _intr: &Interrupt,
        _arg: &MknodIn,
        _name: &[u8],
        _out: &mut EntryOut,
    ) -> Status {
        Status::ENOSYS
    }

    async fn mkdir(
        &self,
        _intr: &Interrupt,
        _arg: &MkdirIn,
        _name: &[u8],
        _out: &mut EntryOut,
    ) -> Status {
        Status::ENOSYS
    }

    async fn unlink(&self, _intr: &Interrupt, _header: &InHeader, _name: &[u8]) -> Status {
        Status::ENOSYS
    }

    async fn rmdir(&self, _intr: &Interrupt, _header: &InHeader, _name: &[u8]) -> Status {
        Status::ENOSYS
    }

    /// Move `old_name` from `arg.header.nodeid` to `new_name` in
    /// `arg.newdir`.
    async fn rename(
        &self,
        _intr: &Interrupt,
        _arg: &RenameIn,
        _old_name: &[u8],
        _new_name: &[u8],
    ) -> Status {
        Status::ENOSYS
    }

    async fn link(
        &self,
        _intr: &Interrupt,
        _arg: &LinkIn,
        _name: &[u8],
        _out: &mut EntryOut,
    ) -> Status {
        Status::ENOSYS
    }

    async fn access(&self, _intr: &Interrupt, _arg: &AccessIn) -> Status {
        Status::ENOSYS
    }

    async fn open(&self, _intr: &Interrupt, _arg: &OpenIn, _out: &mut OpenOut) -> Status {
        Status::ENOSYS
    }

    async fn create(
        &self,
        _intr: &Interrupt,
        _arg: &CreateIn,
        _name: &[u8],
        _out: &mut CreateOut,
    ) -> Status {
        Status::ENOSYS
    }

    /// Read up to `buf.len()` bytes from `arg.offset`. Returns the number
    /// of bytes placed in `buf`; fewer than requested means end of file.
    async fn read(&self, _intr: &Interrupt, _arg: &ReadIn, _buf: &mut [u8]) -> (usize, Status) {
        (0, Status::ENOSYS)
    }

    /// Write `data` at `arg.offset`, returning the number of bytes
    /// accepted.
    async fn write(&self, _intr: &Interrupt, _arg: &WriteIn, _data: &[u8]) -> (u32, Status) {
        (0, Status::ENOSYS)
    }

    async fn lseek(&self, _intr: &Interrupt, _arg: &LseekIn, _out: &mut LseekOut) -> Status {
        Status::ENOSYS
    }

    async fn copy_file_range(&self, _intr: &Interrupt, _arg: &CopyFileRangeIn) -> (u32, Status) {
        (0, Status::ENOSYS)
    }

    async fn flush(&self, _intr: &Interrupt, _arg: &FlushIn) -> Status {
        Status::ENOSYS
    }

    /// Close a file handle. Like `forget`, errors cannot be reported.
    async fn release(&self, _intr: &Interrupt, _arg: &ReleaseIn) {}

    async fn fsync(&self, _intr: &Interrupt, _arg: &FsyncIn) -> Status {
        Status::ENOSYS
    }

    async fn fallocate(&self, _intr: &Interrupt, _arg: &FallocateIn) -> Status {
        Status::ENOSYS
    }

    async fn opendir(&self, _intr: &Interrupt, _arg: &OpenIn, _out: &mut OpenOut) -> Status {
        Status::ENOSYS
    }

    /// Fill `out` with directory entries starting at `arg.offset`. Stop
    /// when [`DirEntryList::add`] refuses an entry; the kernel asks again
    /// from the offset of the last accepted one.
    async fn readdir(&self, _intr: &Interrupt, _arg: &ReadIn, _out: &mut DirEntryList) -> Status {
        Status::ENOSYS
    }

    /// Like [`readdir`](Self::readdir) but each accepted entry reserves
    /// room for lookup attributes via [`DirEntryList::add_plus`].
    async fn readdirplus(
        &self,
        _intr: &Interrupt,
        _arg: &ReadIn,
        _out: &mut DirEntryList,
    ) -> Status {
        Status::ENOSYS
    }

    async fn releasedir(&self, _intr: &Interrupt, _arg: &ReleaseIn) {}

    async fn fsyncdir(&self, _intr: &Interrupt, _arg: &FsyncIn) -> Status {
        Status::ENOSYS
    }

    async fn statfs(&self, _intr: &Interrupt, _header: &InHeader, _out: &mut StatFsOut) -> Status {
        Status::ENOSYS
    }

    /// Test whether the lock described by `arg.lk` could be placed.
    async fn getlk(&self, _intr: &Interrupt, _arg: &LkIn, _out: &mut LkOut) -> Status {
        Status::ENOSYS
    }

    /// Non-blocking lock request.
    async fn setlk(&self, _intr: &Interrupt, _arg: &LkIn) -> Status {
        Status::ENOSYS
    }

    /// Blocking lock request; should honor the interrupt while waiting.
    async fn setlkw(&self, _intr: &Interrupt, _arg: &LkIn) -> Status {
        Status::ENOSYS
    }

    /// Read the extended attribute `attr` into `dest`, returning the
    /// attribute size. An empty `dest` is a size probe.
    async fn getxattr(
        &self,
        _intr: &Interrupt,
        _header: &InHeader,
        _attr: &[u8],
        _dest: &mut [u8],
    ) -> (u32, Status) {
        (0, Status::ENOSYS)
    }

    async fn setxattr(
        &self,
        _intr: &Interrupt,
        _arg: &SetXAttrIn,
        _attr: &[u8],
        _data: &[u8],
    ) -> Status {
        Status::ENOSYS
    }

    /// List extended attribute names into `dest` as NUL-separated byte
    /// strings, returning the total size.
    async fn listxattr(
        &self,
        _intr: &Interrupt,
        _header: &InHeader,
        _dest: &mut [u8],
    ) -> (u32, Status) {
        (0, Status::ENOSYS)
    }

    async fn removexattr(&self, _intr: &Interrupt, _header: &InHeader, _attr: &[u8]) -> Status {
        Status::ENOSYS
    }
}
