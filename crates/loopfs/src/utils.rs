use {
    netfuse::ops::{Attr, EntryOut},
    std::{fs::Metadata, io, os::unix::prelude::*},
};

#[macro_export]
macro_rules! INVALID_HANDLE {
    () => {
        ::std::io::Error::from_raw_os_error(nix::libc::EBADF)
    };
}

#[macro_export]
macro_rules! UNKNOWN_NODE {
    () => {
        ::std::io::Error::from_raw_os_error(nix::libc::ENOENT)
    };
}

/// How long the kernel may cache entries and attributes we hand out.
pub const CACHE_VALID_SECS: u64 = 1;

pub fn attr_from_metadata(attr: &Metadata) -> Attr {
    Attr {
        ino: attr.ino(),
        size: attr.size(),
        blocks: attr.blocks(),
        atime: attr.atime() as u64,
        mtime: attr.mtime() as u64,
        ctime: attr.ctime() as u64,
        atimensec: attr.atime_nsec() as u32,
        mtimensec: attr.mtime_nsec() as u32,
        ctimensec: attr.ctime_nsec() as u32,
        mode: attr.mode(),
        nlink: attr.nlink() as u32,
        uid: attr.uid(),
        gid: attr.gid(),
        rdev: attr.rdev() as u32,
        blksize: attr.blksize() as u32,
        padding: 0,
    }
}

pub fn entry_from_metadata(attr: &Metadata) -> EntryOut {
    EntryOut {
        nodeid: attr.ino(),
        generation: 0,
        entry_valid: CACHE_VALID_SECS,
        attr_valid: CACHE_VALID_SECS,
        entry_valid_nsec: 0,
        attr_valid_nsec: 0,
        attr: attr_from_metadata(attr),
    }
}

/// Maps a seek whence discriminant to the standard `SeekFrom`.
pub fn seek_from(whence: u32, offset: u64) -> io::Result<io::SeekFrom> {
    match whence {
        0 => Ok(io::SeekFrom::Start(offset)),
        1 => Ok(io::SeekFrom::Current(offset as i64)),
        2 => Ok(io::SeekFrom::End(offset as i64)),
        _ => Err(io::Error::from_raw_os_error(nix::libc::EINVAL)),
    }
}
