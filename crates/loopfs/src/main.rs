use {
    async_trait::async_trait,
    clap::Parser,
    filetime::FileTime,
    netfuse::{
        Interrupt, Status,
        dirent::{DirEntry, DirEntryList, type_to_mode},
        io_err,
        ops::*,
        res,
        srv::srv_async,
    },
    nix::libc::{DT_DIR, DT_LNK, DT_REG, O_CREAT, O_RDONLY, O_RDWR, O_TRUNC, O_WRONLY},
    std::{
        collections::HashMap,
        io::{self, SeekFrom},
        os::unix::{
            ffi::OsStrExt,
            fs::{MetadataExt, PermissionsExt},
        },
        path::PathBuf,
        sync::atomic::{AtomicU64, Ordering},
    },
    tokio::{
        fs,
        io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
        sync::{Mutex, RwLock},
    },
    tokio_stream::{StreamExt, wrappers::ReadDirStream},
};

mod utils;
use crate::utils::*;

// Callers sometimes set open flags that make no sense on the serving
// side, O_DIRECT being the usual offender: it demands 512-byte aligned
// buffers the bridge does not provide, so honoring it would fail every
// subsequent read and write. Masking the flags down to the set we
// support fixes that without chasing every buggy caller.
const UNIX_FLAGS: u32 = (O_WRONLY | O_RDONLY | O_RDWR | O_CREAT | O_TRUNC) as u32;

/// The node id the caller uses for the export root.
const ROOT_ID: u64 = 1;

/// Largest staging buffer a single copy_file_range will allocate.
const COPY_CHUNK: u64 = 1 << 24;

struct LoopFs {
    nodes: RwLock<HashMap<u64, PathBuf>>,
    handles: Mutex<HashMap<u64, fs::File>>,
    next_fh: AtomicU64,
}

impl LoopFs {
    fn new(realroot: PathBuf) -> LoopFs {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_ID, realroot);
        LoopFs {
            nodes: RwLock::new(nodes),
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    async fn node(&self, id: u64) -> io::Result<PathBuf> {
        let nodes = self.nodes.read().await;
        nodes.get(&id).cloned().ok_or_else(|| UNKNOWN_NODE!())
    }

    async fn child(&self, id: u64, name: &[u8]) -> io::Result<PathBuf> {
        Ok(self.node(id).await?.join(std::ffi::OsStr::from_bytes(name)))
    }

    async fn register(&self, id: u64, path: PathBuf) {
        let mut nodes = self.nodes.write().await;
        nodes.insert(id, path);
    }

    async fn register_entry(&self, path: PathBuf) -> io::Result<EntryOut> {
        let attr = fs::symlink_metadata(&path).await?;
        self.register(attr.ino(), path).await;
        Ok(entry_from_metadata(&attr))
    }

    async fn insert_handle(&self, file: fs::File) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        let mut handles = self.handles.lock().await;
        handles.insert(fh, file);
        fh
    }

    fn open_at(&self, path: &PathBuf, flags: u32, mode: u32) -> io::Result<fs::File> {
        let oflags = nix::fcntl::OFlag::from_bits_truncate((flags & UNIX_FLAGS) as i32);
        let omode = nix::sys::stat::Mode::from_bits_truncate(mode);
        let fd = nix::fcntl::open(path, oflags, omode)?;
        Ok(fs::File::from_std(fd.into()))
    }

    async fn do_setattr(&self, arg: &SetAttrIn) -> io::Result<AttrOut> {
        let filepath = self.node(arg.header.nodeid).await?;

        if arg.valid.contains(SetAttrValid::MODE) {
            fs::set_permissions(&filepath, PermissionsExt::from_mode(arg.mode)).await?;
        }

        if arg.valid.intersects(SetAttrValid::UID | SetAttrValid::GID) {
            let uid = if arg.valid.contains(SetAttrValid::UID) {
                Some(nix::unistd::Uid::from_raw(arg.uid))
            } else {
                None
            };
            let gid = if arg.valid.contains(SetAttrValid::GID) {
                Some(nix::unistd::Gid::from_raw(arg.gid))
            } else {
                None
            };
            nix::unistd::chown(&filepath, uid, gid)?;
        }

        if arg.valid.contains(SetAttrValid::SIZE) {
            fs::OpenOptions::new()
                .write(true)
                .create(false)
                .open(&filepath)
                .await?
                .set_len(arg.size)
                .await?;
        }

        if arg.valid.intersects(
            SetAttrValid::ATIME
                | SetAttrValid::MTIME
                | SetAttrValid::ATIME_NOW
                | SetAttrValid::MTIME_NOW,
        ) {
            let attr = fs::metadata(&filepath).await?;
            let atime = if arg.valid.contains(SetAttrValid::ATIME_NOW) {
                FileTime::now()
            } else if arg.valid.contains(SetAttrValid::ATIME) {
                FileTime::from_unix_time(arg.atime as i64, arg.atimensec)
            } else {
                FileTime::from_last_access_time(&attr)
            };

            let mtime = if arg.valid.contains(SetAttrValid::MTIME_NOW) {
                FileTime::now()
            } else if arg.valid.contains(SetAttrValid::MTIME) {
                FileTime::from_unix_time(arg.mtime as i64, arg.mtimensec)
            } else {
                FileTime::from_last_modification_time(&attr)
            };

            let times = filepath.clone();
            tokio::task::spawn_blocking(move || filetime::set_file_times(times, atime, mtime))
                .await
                .map_err(io::Error::other)??;
        }

        let attr = fs::symlink_metadata(&filepath).await?;
        Ok(AttrOut {
            attr_valid: CACHE_VALID_SECS,
            attr_valid_nsec: 0,
            dummy: 0,
            attr: attr_from_metadata(&attr),
        })
    }

    async fn do_readdir(&self, arg: &ReadIn, out: &mut DirEntryList, plus: bool) -> io::Result<()> {
        let path = self.node(arg.header.nodeid).await?;
        let skip = arg.offset as usize;

        if skip == 0 {
            let attr = fs::symlink_metadata(&path).await?;
            let dot = DirEntry {
                ino: attr.ino(),
                mode: type_to_mode(DT_DIR as u32),
                name: b".".to_vec(),
            };
            let accepted = if plus {
                // Callers resolve "." and ".." themselves; an empty
                // attribute block tells them not to cache anything.
                out.add_plus(&dot, &EntryOut::default())
            } else {
                out.add(&dot)
            };
            if !accepted {
                return Ok(());
            }
        }
        if skip <= 1 {
            let dotdot = DirEntry {
                ino: ROOT_ID,
                mode: type_to_mode(DT_DIR as u32),
                name: b"..".to_vec(),
            };
            let accepted = if plus {
                out.add_plus(&dotdot, &EntryOut::default())
            } else {
                out.add(&dotdot)
            };
            if !accepted {
                return Ok(());
            }
        }

        let mut entries =
            ReadDirStream::new(fs::read_dir(&path).await?).skip(skip.saturating_sub(2));
        while let Some(entry) = entries.next().await {
            let entry = entry?;
            let typ = {
                let ft = entry.file_type().await?;
                if ft.is_dir() {
                    DT_DIR
                } else if ft.is_symlink() {
                    DT_LNK
                } else {
                    DT_REG
                }
            };
            let dirent = DirEntry {
                ino: entry.ino(),
                mode: type_to_mode(typ as u32),
                name: entry.file_name().as_bytes().to_vec(),
            };

            let accepted = if plus {
                let childpath = path.join(entry.file_name());
                let attr = entry.metadata().await?;
                self.register(attr.ino(), childpath).await;
                out.add_plus(&dirent, &entry_from_metadata(&attr))
            } else {
                out.add(&dirent)
            };
            if !accepted {
                break;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl RawFilesystem for LoopFs {
    async fn lookup(
        &self,
        _intr: &Interrupt,
        header: &InHeader,
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        let path = match self.child(header.nodeid, name).await {
            Ok(path) => path,
            Err(e) => return Status::from(e),
        };
        match self.register_entry(path).await {
            Ok(entry) => {
                *out = entry;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn forget(&self, _intr: &Interrupt, header: &InHeader, _nlookup: u64) {
        if header.nodeid != ROOT_ID {
            let mut nodes = self.nodes.write().await;
            nodes.remove(&header.nodeid);
        }
    }

    async fn getattr(&self, _intr: &Interrupt, arg: &GetAttrIn, out: &mut AttrOut) -> Status {
        let result = async {
            let path = self.node(arg.header.nodeid).await?;
            let attr = fs::symlink_metadata(&path).await?;
            Ok::<_, io::Error>(AttrOut {
                attr_valid: CACHE_VALID_SECS,
                attr_valid_nsec: 0,
                dummy: 0,
                attr: attr_from_metadata(&attr),
            })
        };
        match result.await {
            Ok(attr_out) => {
                *out = attr_out;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn setattr(&self, _intr: &Interrupt, arg: &SetAttrIn, out: &mut AttrOut) -> Status {
        match self.do_setattr(arg).await {
            Ok(attr_out) => {
                *out = attr_out;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn readlink(&self, _intr: &Interrupt, header: &InHeader) -> (Vec<u8>, Status) {
        let result = async {
            let path = self.node(header.nodeid).await?;
            fs::read_link(&path).await
        };
        match result.await {
            Ok(target) => (target.into_os_string().into_encoded_bytes(), Status::OK),
            Err(e) => (Vec::new(), Status::from(e)),
        }
    }

    async fn symlink(
        &self,
        _intr: &Interrupt,
        header: &InHeader,
        target: &[u8],
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        let result = async {
            let path = self.child(header.nodeid, name).await?;
            fs::symlink(std::ffi::OsStr::from_bytes(target), &path).await?;
            self.register_entry(path).await
        };
        match result.await {
            Ok(entry) => {
                *out = entry;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn mknod(
        &self,
        _intr: &Interrupt,
        arg: &MknodIn,
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        let result = async {
            let path = self.child(arg.header.nodeid, name).await?;
            nix::sys::stat::mknod(
                &path,
                nix::sys::stat::SFlag::from_bits_truncate(arg.mode),
                nix::sys::stat::Mode::from_bits_truncate(arg.mode & !arg.umask),
                arg.rdev as nix::libc::dev_t,
            )?;
            self.register_entry(path).await
        };
        match result.await {
            Ok(entry) => {
                *out = entry;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn mkdir(
        &self,
        _intr: &Interrupt,
        arg: &MkdirIn,
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        let result = async {
            let path = self.child(arg.header.nodeid, name).await?;
            fs::create_dir(&path).await?;
            fs::set_permissions(&path, PermissionsExt::from_mode(arg.mode & !arg.umask)).await?;
            self.register_entry(path).await
        };
        match result.await {
            Ok(entry) => {
                *out = entry;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn unlink(&self, _intr: &Interrupt, header: &InHeader, name: &[u8]) -> Status {
        let result = async {
            let path = self.child(header.nodeid, name).await?;
            fs::remove_file(&path).await
        };
        match result.await {
            Ok(()) => Status::OK,
            Err(e) => Status::from(e),
        }
    }

    async fn rmdir(&self, _intr: &Interrupt, header: &InHeader, name: &[u8]) -> Status {
        let result = async {
            let path = self.child(header.nodeid, name).await?;
            fs::remove_dir(&path).await
        };
        match result.await {
            Ok(()) => Status::OK,
            Err(e) => Status::from(e),
        }
    }

    async fn rename(
        &self,
        _intr: &Interrupt,
        arg: &RenameIn,
        old_name: &[u8],
        new_name: &[u8],
    ) -> Status {
        let result = async {
            let oldpath = self.child(arg.header.nodeid, old_name).await?;
            let newpath = self.child(arg.newdir, new_name).await?;
            fs::rename(&oldpath, &newpath).await?;
            // The moved inode keeps its number but not its path.
            let attr = fs::symlink_metadata(&newpath).await?;
            self.register(attr.ino(), newpath).await;
            Ok::<_, io::Error>(())
        };
        match result.await {
            Ok(()) => Status::OK,
            Err(e) => Status::from(e),
        }
    }

    async fn link(
        &self,
        _intr: &Interrupt,
        arg: &LinkIn,
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        let result = async {
            let oldpath = self.node(arg.oldnodeid).await?;
            let newpath = self.child(arg.header.nodeid, name).await?;
            fs::hard_link(&oldpath, &newpath).await?;
            self.register_entry(newpath).await
        };
        match result.await {
            Ok(entry) => {
                *out = entry;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn access(&self, _intr: &Interrupt, arg: &AccessIn) -> Status {
        let result = async {
            let path = self.node(arg.header.nodeid).await?;
            nix::unistd::access(
                &path,
                nix::unistd::AccessFlags::from_bits_truncate(arg.mask as i32),
            )?;
            Ok::<_, io::Error>(())
        };
        match result.await {
            Ok(()) => Status::OK,
            Err(e) => Status::from(e),
        }
    }

    async fn open(&self, _intr: &Interrupt, arg: &OpenIn, out: &mut OpenOut) -> Status {
        let result = async {
            let path = self.node(arg.header.nodeid).await?;
            let file = self.open_at(&path, arg.flags, 0)?;
            Ok::<_, io::Error>(self.insert_handle(file).await)
        };
        match result.await {
            Ok(fh) => {
                out.fh = fh;
                out.open_flags = 0;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn create(
        &self,
        _intr: &Interrupt,
        arg: &CreateIn,
        name: &[u8],
        out: &mut CreateOut,
    ) -> Status {
        let result = async {
            let path = self.child(arg.header.nodeid, name).await?;
            let file = self.open_at(&path, arg.flags | O_CREAT as u32, arg.mode & !arg.umask)?;
            let fh = self.insert_handle(file).await;
            let entry = self.register_entry(path).await?;
            Ok::<_, io::Error>((entry, fh))
        };
        match result.await {
            Ok((entry, fh)) => {
                out.entry = entry;
                out.open.fh = fh;
                out.open.open_flags = 0;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn read(&self, _intr: &Interrupt, arg: &ReadIn, buf: &mut [u8]) -> (usize, Status) {
        let result = async {
            let mut handles = self.handles.lock().await;
            let file = handles.get_mut(&arg.fh).ok_or_else(|| INVALID_HANDLE!())?;
            file.seek(SeekFrom::Start(arg.offset)).await?;
            file.read(buf).await
        };
        match result.await {
            Ok(bytes) => (bytes, Status::OK),
            Err(e) => (0, Status::from(e)),
        }
    }

    async fn write(&self, _intr: &Interrupt, arg: &WriteIn, data: &[u8]) -> (u32, Status) {
        let result = async {
            let mut handles = self.handles.lock().await;
            let file = handles.get_mut(&arg.fh).ok_or_else(|| INVALID_HANDLE!())?;
            file.seek(SeekFrom::Start(arg.offset)).await?;
            file.write(data).await
        };
        match result.await {
            Ok(count) => (count as u32, Status::OK),
            Err(e) => (0, Status::from(e)),
        }
    }

    async fn lseek(&self, _intr: &Interrupt, arg: &LseekIn, out: &mut LseekOut) -> Status {
        let result = async {
            let pos = seek_from(arg.whence, arg.offset)?;
            let mut handles = self.handles.lock().await;
            let file = handles.get_mut(&arg.fh).ok_or_else(|| INVALID_HANDLE!())?;
            file.seek(pos).await
        };
        match result.await {
            Ok(offset) => {
                out.offset = offset;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn copy_file_range(&self, _intr: &Interrupt, arg: &CopyFileRangeIn) -> (u32, Status) {
        let result = async {
            let mut buf = vec![0; arg.len.min(COPY_CHUNK) as usize];
            let bytes = {
                let mut handles = self.handles.lock().await;
                let file = handles
                    .get_mut(&arg.fh_in)
                    .ok_or_else(|| INVALID_HANDLE!())?;
                file.seek(SeekFrom::Start(arg.off_in)).await?;
                file.read(&mut buf).await?
            };
            buf.truncate(bytes);

            let mut handles = self.handles.lock().await;
            let file = handles
                .get_mut(&arg.fh_out)
                .ok_or_else(|| INVALID_HANDLE!())?;
            file.seek(SeekFrom::Start(arg.off_out)).await?;
            file.write_all(&buf).await?;
            Ok::<_, io::Error>(buf.len() as u32)
        };
        match result.await {
            Ok(count) => (count, Status::OK),
            Err(e) => (0, Status::from(e)),
        }
    }

    async fn flush(&self, _intr: &Interrupt, arg: &FlushIn) -> Status {
        let handles = self.handles.lock().await;
        if handles.contains_key(&arg.fh) {
            Status::OK
        } else {
            Status::from(INVALID_HANDLE!())
        }
    }

    async fn release(&self, _intr: &Interrupt, arg: &ReleaseIn) {
        let mut handles = self.handles.lock().await;
        handles.remove(&arg.fh);
    }

    async fn fsync(&self, _intr: &Interrupt, arg: &FsyncIn) -> Status {
        let result = async {
            let mut handles = self.handles.lock().await;
            let file = handles.get_mut(&arg.fh).ok_or_else(|| INVALID_HANDLE!())?;
            if arg.fsync_flags & 1 != 0 {
                file.sync_data().await
            } else {
                file.sync_all().await
            }
        };
        match result.await {
            Ok(()) => Status::OK,
            Err(e) => Status::from(e),
        }
    }

    async fn fallocate(&self, _intr: &Interrupt, arg: &FallocateIn) -> Status {
        let result = async {
            let std_file = {
                let mut handles = self.handles.lock().await;
                let file = handles.get_mut(&arg.fh).ok_or_else(|| INVALID_HANDLE!())?;
                file.try_clone().await?.into_std().await
            };
            let (mode, offset, length) = (arg.mode, arg.offset, arg.length);
            tokio::task::spawn_blocking(move || {
                nix::fcntl::fallocate(
                    &std_file,
                    nix::fcntl::FallocateFlags::from_bits_truncate(mode as i32),
                    offset as i64,
                    length as i64,
                )
            })
            .await
            .map_err(io::Error::other)??;
            Ok::<_, io::Error>(())
        };
        match result.await {
            Ok(()) => Status::OK,
            Err(e) => Status::from(e),
        }
    }

    async fn opendir(&self, _intr: &Interrupt, arg: &OpenIn, out: &mut OpenOut) -> Status {
        let result = async {
            let path = self.node(arg.header.nodeid).await?;
            let attr = fs::symlink_metadata(&path).await?;
            if !attr.is_dir() {
                return Err(io::Error::from_raw_os_error(nix::libc::ENOTDIR));
            }
            // Listing re-reads the directory by node id, so the handle
            // carries no state of its own.
            Ok(self.next_fh.fetch_add(1, Ordering::Relaxed))
        };
        match result.await {
            Ok(fh) => {
                out.fh = fh;
                out.open_flags = 0;
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }

    async fn readdir(&self, _intr: &Interrupt, arg: &ReadIn, out: &mut DirEntryList) -> Status {
        match self.do_readdir(arg, out, false).await {
            Ok(()) => Status::OK,
            Err(e) => Status::from(e),
        }
    }

    async fn readdirplus(&self, _intr: &Interrupt, arg: &ReadIn, out: &mut DirEntryList) -> Status {
        match self.do_readdir(arg, out, true).await {
            Ok(()) => Status::OK,
            Err(e) => Status::from(e),
        }
    }

    async fn releasedir(&self, _intr: &Interrupt, _arg: &ReleaseIn) {}

    async fn fsyncdir(&self, _intr: &Interrupt, _arg: &FsyncIn) -> Status {
        Status::OK
    }

    async fn statfs(&self, _intr: &Interrupt, header: &InHeader, out: &mut StatFsOut) -> Status {
        let result = async {
            let path = self.node(header.nodeid).await?;
            tokio::task::spawn_blocking(move || nix::sys::statvfs::statvfs(&path))
                .await
                .map_err(io::Error::other)?
                .map_err(io::Error::from)
        };
        match result.await {
            Ok(statfs) => {
                *out = From::from(statfs);
                Status::OK
            }
            Err(e) => Status::from(e),
        }
    }
}

#[derive(Debug, clap::Parser)]
struct Cli {
    /// proto!address!port
    /// where: proto = tcp | unix
    address: String,

    /// Directory to export
    exportdir: PathBuf,
}

async fn loopfs_main(Cli { address, exportdir }: Cli) -> netfuse::Result<i32> {
    if !fs::try_exists(&exportdir).await? {
        fs::create_dir_all(&exportdir).await?;
    }
    if !fs::metadata(&exportdir).await?.is_dir() {
        return res!(io_err!(Other, "export path must be a directory"));
    }

    println!("[*] Exporting: {}", exportdir.display());
    println!("[*] Ready to accept clients: {}", address);
    srv_async(LoopFs::new(exportdir), &address).await.and(Ok(0))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let exit_code = loopfs_main(Cli::parse()).await.unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        -1
    });

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;
    use netfuse::dirent::DirentIter;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("loopfs-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn seek_whence_mapping() {
        assert_eq!(seek_from(0, 7).unwrap(), SeekFrom::Start(7));
        assert_eq!(seek_from(1, 7).unwrap(), SeekFrom::Current(7));
        assert_eq!(seek_from(2, 7).unwrap(), SeekFrom::End(7));
        assert!(seek_from(9, 0).is_err());
    }

    #[test]
    fn open_flag_mask_strips_unsupported_bits() {
        let flags = UNIX_FLAGS | nix::libc::O_DIRECT as u32;
        assert_eq!(flags & UNIX_FLAGS, UNIX_FLAGS);
    }

    #[tokio::test]
    async fn lookup_then_read() {
        let dir = scratch_dir("read");
        std::fs::write(dir.join("data.txt"), b"loopback").unwrap();

        let fs = LoopFs::new(dir.clone());
        let intr = Interrupt::new();

        let mut entry = EntryOut::default();
        let header = InHeader {
            nodeid: ROOT_ID,
            ..InHeader::default()
        };
        let status = fs.lookup(&intr, &header, b"data.txt", &mut entry).await;
        assert_eq!(status, Status::OK);
        assert_eq!(entry.attr.size, 8);

        let open_arg = OpenIn {
            header: InHeader {
                nodeid: entry.nodeid,
                ..InHeader::default()
            },
            flags: O_RDONLY as u32,
            mode: 0,
        };
        let mut open_out = OpenOut::default();
        assert_eq!(fs.open(&intr, &open_arg, &mut open_out).await, Status::OK);

        let read_arg = ReadIn {
            fh: open_out.fh,
            size: 64,
            ..ReadIn::default()
        };
        let mut buf = vec![0; 64];
        let (n, status) = fs.read(&intr, &read_arg, &mut buf).await;
        assert_eq!(status, Status::OK);
        assert_eq!(&buf[..n], b"loopback");

        fs.release(
            &intr,
            &ReleaseIn {
                fh: open_out.fh,
                ..ReleaseIn::default()
            },
        )
        .await;
        let (_, status) = fs.read(&intr, &read_arg, &mut buf).await;
        assert_eq!(status.errno(), nix::libc::EBADF);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn readdir_lists_children_after_dots() {
        let dir = scratch_dir("readdir");
        std::fs::write(dir.join("a.txt"), b"").unwrap();
        std::fs::create_dir(dir.join("sub")).unwrap();

        let fs = LoopFs::new(dir.clone());
        let intr = Interrupt::new();

        let arg = ReadIn {
            header: InHeader {
                nodeid: ROOT_ID,
                ..InHeader::default()
            },
            size: 4096,
            ..ReadIn::default()
        };
        let mut out = DirEntryList::new(4096, 0);
        assert_eq!(fs.readdir(&intr, &arg, &mut out).await, Status::OK);

        let names: Vec<Vec<u8>> = DirentIter::new(out.bytes()).map(|e| e.name).collect();
        assert_eq!(&names[0], b".");
        assert_eq!(&names[1], b"..");
        assert!(names.contains(&b"a.txt".to_vec()));
        assert!(names.contains(&b"sub".to_vec()));

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unknown_node_reports_enoent() {
        let dir = scratch_dir("enoent");
        let fs = LoopFs::new(dir.clone());
        let intr = Interrupt::new();

        let mut out = AttrOut::default();
        let arg = GetAttrIn {
            header: InHeader {
                nodeid: 9999,
                ..InHeader::default()
            },
            ..GetAttrIn::default()
        };
        assert_eq!(fs.getattr(&intr, &arg, &mut out).await, Status::ENOENT);

        let _ = std::fs::remove_dir_all(dir);
    }
}
