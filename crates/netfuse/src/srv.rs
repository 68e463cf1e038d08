//! Asynchronous serving side of the call bridge.
//!
//! `dispatch` drives one connection: it decodes each inbound frame, spawns
//! one task per call, and lets the per-operation handlers reply through a
//! shared framed writer. Oversized results leave as ordered chunk frames
//! terminated by `REos`; a native `ENOSYS` leaves as an unimplemented-call
//! abort instead of a payload status.

use {
    crate::{
        cancel::{CancelPool, Interrupt},
        chunk::{ByteChunks, EntryBatches, MSG_SIZE_THRESHOLD},
        dirent::{DirEntryList, DirentIter, ENTRY_OUT_SIZE},
        error::Error,
        io_err, serialize,
        status::{AbortCode, Status},
        utils::{self, Result},
        wire::{Data, DirEntryBatch, FsCall, Msg, MsgType},
    },
    bytes::buf::{Buf, BufMut},
    futures::sink::SinkExt,
    log::{debug, error, info},
    std::{
        collections::HashMap,
        path::{Path, PathBuf},
        sync::{Arc, Mutex as StdMutex, atomic::Ordering},
    },
    tokio::{
        io::{AsyncRead, AsyncWrite},
        net::{TcpListener, UnixListener},
        sync::Mutex,
    },
    tokio_stream::StreamExt,
    tokio_util::codec::{FramedWrite, length_delimited::LengthDelimitedCodec},
};

use crate::ops::*;

/// Pool of staging buffers for read results and directory listings.
///
/// Buffers come back zeroed to the requested size, which the dirent
/// builder relies on for its end-of-data sentinel.
#[derive(Default)]
struct BufferPool {
    free: StdMutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    fn acquire(&self, size: usize) -> Vec<u8> {
        let mut buf = {
            let mut free = self.free.lock().expect("buffer pool poisoned");
            free.pop()
        }
        .unwrap_or_default();
        buf.clear();
        buf.resize(size, 0);
        buf
    }

    fn release(&self, buf: Vec<u8>) {
        if let Ok(mut free) = self.free.lock() {
            free.push(buf);
        }
    }
}

/// Serving-side endpoint wrapping a [`RawFilesystem`].
pub struct Server<Fs> {
    fs: Arc<Fs>,
    msg_size_threshold: usize,
}

impl<Fs> Clone for Server<Fs> {
    fn clone(&self) -> Self {
        Server {
            fs: self.fs.clone(),
            msg_size_threshold: self.msg_size_threshold,
        }
    }
}

impl<Fs> Server<Fs>
where
    Fs: RawFilesystem + 'static,
{
    pub fn new(fs: Fs) -> Server<Fs> {
        Server {
            fs: Arc::new(fs),
            msg_size_threshold: MSG_SIZE_THRESHOLD,
        }
    }

    /// Override the per-frame payload budget for chunked results.
    pub fn msg_size_threshold(mut self, threshold: usize) -> Server<Fs> {
        assert!(threshold > 0);
        self.msg_size_threshold = threshold;
        self
    }

    /// Serve one established connection until the peer goes away.
    ///
    /// Every in-flight call's interrupt fires when the read loop ends, so
    /// operations blocked in the filesystem get a chance to bail out.
    pub async fn dispatch<Reader, Writer>(&self, reader: Reader, writer: Writer) -> Result<()>
    where
        Reader: 'static + AsyncRead + Send + std::marker::Unpin,
        Writer: 'static + AsyncWrite + Send + std::marker::Unpin,
    {
        let mut framedread = LengthDelimitedCodec::builder()
            .length_field_offset(0)
            .length_field_length(4)
            .length_adjustment(-4)
            .little_endian()
            .new_read(reader);
        let framedwrite = LengthDelimitedCodec::builder()
            .length_field_offset(0)
            .length_field_length(4)
            .length_adjustment(-4)
            .little_endian()
            .new_write(writer);

        let conn = Arc::new(ConnState {
            fs: self.fs.clone(),
            writer: Mutex::new(framedwrite),
            inflight: StdMutex::new(HashMap::new()),
            cancels: CancelPool::new(),
            buffers: BufferPool::default(),
            shutdown: Interrupt::new(),
            threshold: self.msg_size_threshold,
        });

        let result = loop {
            let bytes = match framedread.next().await {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(()),
            };

            let msg = match serialize::read_msg(&mut bytes.reader()) {
                Ok(msg) => msg,
                Err(e) => break Err(e.into()),
            };
            debug!("← tag={} {:?}", msg.tag, MsgType::from(&msg.body));

            // Cancellation is handled inline: it must not queue behind the
            // very call it is trying to cancel.
            if let FsCall::TInterrupt { oldtag } = msg.body {
                let target = {
                    let inflight = conn.inflight.lock().expect("inflight map poisoned");
                    inflight.get(&oldtag).cloned()
                };
                if let Some(intr) = target {
                    intr.fire();
                }
                continue;
            }

            let intr = Interrupt::new();
            {
                let mut inflight = conn.inflight.lock().expect("inflight map poisoned");
                inflight.insert(msg.tag, intr.clone());
            }

            let conn = conn.clone();
            tokio::spawn(async move {
                {
                    // Disconnect fires every in-flight interrupt through a
                    // pooled token; releasing the token on completion
                    // disarms the watcher.
                    let token = conn.cancels.acquire();
                    let shutdown = conn.shutdown.clone();
                    let target = intr.clone();
                    token.forward(async move { shutdown.fired().await }, move || {
                        target.fire()
                    });

                    if let Err(e) = conn.handle(msg.tag, msg.body, &intr).await {
                        error!("tag {}: {}", msg.tag, e);
                        let _ = conn
                            .send(
                                msg.tag,
                                FsCall::RAbort {
                                    code: AbortCode::Internal.to_u8(),
                                    message: e.to_string(),
                                },
                            )
                            .await;
                    }
                }

                let mut inflight = conn.inflight.lock().expect("inflight map poisoned");
                inflight.remove(&msg.tag);
            });
        };

        conn.shutdown.fire();
        result
    }
}

struct ConnState<Fs, Writer> {
    fs: Arc<Fs>,
    writer: Mutex<FramedWrite<Writer, LengthDelimitedCodec>>,
    inflight: StdMutex<HashMap<u16, Interrupt>>,
    cancels: CancelPool,
    buffers: BufferPool,
    shutdown: Interrupt,
    threshold: usize,
}

impl<Fs, Writer> ConnState<Fs, Writer>
where
    Fs: RawFilesystem,
    Writer: AsyncWrite + Send + std::marker::Unpin,
{
    async fn send(&self, tag: u16, body: FsCall) -> Result<()> {
        let msg = Msg { tag, body };

        let mut writer = bytes::BytesMut::with_capacity(4096).writer();
        serialize::write_msg(&mut writer, &msg)?;
        let frozen = writer.into_inner().freeze();

        let mut framedwrite = self.writer.lock().await;
        framedwrite.send(frozen).await?;
        debug!("→ tag={} {:?}", tag, MsgType::from(&msg.body));
        Ok(())
    }

    /// Sends the single-shot reply, or the unimplemented-call abort if the
    /// filesystem answered ENOSYS.
    async fn finish(&self, tag: u16, method: &str, status: Status, reply: FsCall) -> Result<()> {
        if status == Status::ENOSYS {
            self.abort_unimplemented(tag, method).await
        } else {
            self.send(tag, reply).await
        }
    }

    async fn abort_unimplemented(&self, tag: u16, method: &str) -> Result<()> {
        self.send(
            tag,
            FsCall::RAbort {
                code: AbortCode::Unimplemented.to_u8(),
                message: format!("method {method} not implemented"),
            },
        )
        .await
    }

    async fn handle(&self, tag: u16, body: FsCall, intr: &Interrupt) -> Result<()> {
        use crate::wire::FsCall::*;

        let fs = &self.fs;
        match body {
            TLookup { header, name } => {
                let mut entry = EntryOut::default();
                let status = fs.lookup(intr, &header, &name, &mut entry).await;
                self.finish(tag, "Lookup", status, RLookup { status, entry })
                    .await
            }
            TForget { header, nlookup } => {
                fs.forget(intr, &header, nlookup).await;
                self.send(tag, RForget).await
            }
            TGetAttr { arg } => {
                let mut attr_out = AttrOut::default();
                let status = fs.getattr(intr, &arg, &mut attr_out).await;
                self.finish(tag, "GetAttr", status, RGetAttr { status, attr_out })
                    .await
            }
            TSetAttr { arg } => {
                let mut attr_out = AttrOut::default();
                let status = fs.setattr(intr, &arg, &mut attr_out).await;
                self.finish(tag, "SetAttr", status, RSetAttr { status, attr_out })
                    .await
            }
            TReadlink { header } => {
                let (target, status) = fs.readlink(intr, &header).await;
                self.finish(
                    tag,
                    "Readlink",
                    status,
                    RReadlink {
                        status,
                        target: Data(target),
                    },
                )
                .await
            }
            TSymlink {
                header,
                target,
                name,
            } => {
                let mut entry = EntryOut::default();
                let status = fs
                    .symlink(intr, &header, &target.0, &name, &mut entry)
                    .await;
                self.finish(tag, "Symlink", status, RSymlink { status, entry })
                    .await
            }
            TMknod { arg, name } => {
                let mut entry = EntryOut::default();
                let status = fs.mknod(intr, &arg, &name, &mut entry).await;
                self.finish(tag, "Mknod", status, RMknod { status, entry })
                    .await
            }
            TMkdir { arg, name } => {
                let mut entry = EntryOut::default();
                let status = fs.mkdir(intr, &arg, &name, &mut entry).await;
                self.finish(tag, "Mkdir", status, RMkdir { status, entry })
                    .await
            }
            TUnlink { header, name } => {
                let status = fs.unlink(intr, &header, &name).await;
                self.finish(tag, "Unlink", status, RUnlink { status }).await
            }
            TRmdir { header, name } => {
                let status = fs.rmdir(intr, &header, &name).await;
                self.finish(tag, "Rmdir", status, RRmdir { status }).await
            }
            TRename {
                arg,
                old_name,
                new_name,
            } => {
                let status = fs.rename(intr, &arg, &old_name, &new_name).await;
                self.finish(tag, "Rename", status, RRename { status }).await
            }
            TLink { arg, name } => {
                let mut entry = EntryOut::default();
                let status = fs.link(intr, &arg, &name, &mut entry).await;
                self.finish(tag, "Link", status, RLink { status, entry })
                    .await
            }
            TAccess { arg } => {
                let status = fs.access(intr, &arg).await;
                self.finish(tag, "Access", status, RAccess { status }).await
            }
            TOpen { arg } => {
                let mut open_out = OpenOut::default();
                let status = fs.open(intr, &arg, &mut open_out).await;
                self.finish(tag, "Open", status, ROpen { status, open_out })
                    .await
            }
            TCreate { arg, name } => {
                let mut create_out = CreateOut::default();
                let status = fs.create(intr, &arg, &name, &mut create_out).await;
                self.finish(tag, "Create", status, RCreate { status, create_out })
                    .await
            }
            TRead { arg } => self.handle_read(tag, arg, intr).await,
            TWrite { arg, data } => {
                let (count, status) = fs.write(intr, &arg, &data.0).await;
                self.finish(tag, "Write", status, RWrite { status, count })
                    .await
            }
            TFlush { arg } => {
                let status = fs.flush(intr, &arg).await;
                self.finish(tag, "Flush", status, RFlush { status }).await
            }
            TRelease { arg } => {
                fs.release(intr, &arg).await;
                self.send(tag, RRelease).await
            }
            TFsync { arg } => {
                let status = fs.fsync(intr, &arg).await;
                self.finish(tag, "Fsync", status, RFsync { status }).await
            }
            TFallocate { arg } => {
                let status = fs.fallocate(intr, &arg).await;
                self.finish(tag, "Fallocate", status, RFallocate { status })
                    .await
            }
            TLseek { arg } => {
                let mut lseek_out = LseekOut::default();
                let status = fs.lseek(intr, &arg, &mut lseek_out).await;
                self.finish(tag, "Lseek", status, RLseek { status, lseek_out })
                    .await
            }
            TCopyFileRange { arg } => {
                let (count, status) = fs.copy_file_range(intr, &arg).await;
                self.finish(
                    tag,
                    "CopyFileRange",
                    status,
                    RCopyFileRange { status, count },
                )
                .await
            }
            TOpenDir { arg } => {
                let mut open_out = OpenOut::default();
                let status = fs.opendir(intr, &arg, &mut open_out).await;
                self.finish(tag, "OpenDir", status, ROpenDir { status, open_out })
                    .await
            }
            TReadDir { arg } => self.handle_readdir(tag, arg, intr, false).await,
            TReadDirPlus { arg } => self.handle_readdir(tag, arg, intr, true).await,
            TReleaseDir { arg } => {
                fs.releasedir(intr, &arg).await;
                self.send(tag, RReleaseDir).await
            }
            TFsyncDir { arg } => {
                let status = fs.fsyncdir(intr, &arg).await;
                self.finish(tag, "FsyncDir", status, RFsyncDir { status })
                    .await
            }
            TStatFs { header } => {
                let mut statfs = StatFsOut::default();
                let status = fs.statfs(intr, &header, &mut statfs).await;
                self.finish(tag, "StatFs", status, RStatFs { status, statfs })
                    .await
            }
            TGetLk { arg } => {
                let mut lk_out = LkOut::default();
                let status = fs.getlk(intr, &arg, &mut lk_out).await;
                self.finish(tag, "GetLk", status, RGetLk { status, lk_out })
                    .await
            }
            TSetLk { arg } => {
                let status = fs.setlk(intr, &arg).await;
                self.finish(tag, "SetLk", status, RSetLk { status }).await
            }
            TSetLkw { arg } => {
                let status = fs.setlkw(intr, &arg).await;
                self.finish(tag, "SetLkw", status, RSetLkw { status }).await
            }
            TGetXAttr { header, attr, size } => {
                // The value buffer is moved into the reply, so it does not
                // come from the staging pool.
                let mut dest = vec![0; size as usize];
                let (size, status) = fs.getxattr(intr, &header, &attr, &mut dest).await;
                let len = dest.len().min(size as usize);
                dest.truncate(len);
                self.finish(
                    tag,
                    "GetXAttr",
                    status,
                    RGetXAttr {
                        status,
                        size,
                        data: Data(dest),
                    },
                )
                .await
            }
            TSetXAttr { arg, attr, data } => {
                let status = fs.setxattr(intr, &arg, &attr, &data.0).await;
                self.finish(tag, "SetXAttr", status, RSetXAttr { status })
                    .await
            }
            TListXAttr { header, size } => {
                let mut dest = vec![0; size as usize];
                let (size, status) = fs.listxattr(intr, &header, &mut dest).await;
                let len = dest.len().min(size as usize);
                dest.truncate(len);
                self.finish(
                    tag,
                    "ListXAttr",
                    status,
                    RListXAttr {
                        status,
                        size,
                        data: Data(dest),
                    },
                )
                .await
            }
            TRemoveXAttr { header, attr } => {
                let status = fs.removexattr(intr, &header, &attr).await;
                self.finish(tag, "RemoveXAttr", status, RRemoveXAttr { status })
                    .await
            }
            other => {
                // R-messages and stray control frames have no business
                // arriving here.
                error!("unexpected message {:?}", MsgType::from(&other));
                self.send(
                    tag,
                    RAbort {
                        code: AbortCode::Internal.to_u8(),
                        message: "unexpected message".to_owned(),
                    },
                )
                .await
            }
        }
    }

    async fn handle_read(&self, tag: u16, arg: ReadIn, intr: &Interrupt) -> Result<()> {
        let mut buf = self.buffers.acquire(arg.size as usize);
        let (count, status) = self.fs.read(intr, &arg, &mut buf).await;

        if status == Status::ENOSYS {
            self.buffers.release(buf);
            return self.abort_unimplemented(tag, "Read").await;
        }
        if !status.is_ok() {
            self.buffers.release(buf);
            self.send(
                tag,
                FsCall::RReadChunk {
                    status,
                    data: Data(Vec::new()),
                },
            )
            .await?;
            return self.send(tag, FsCall::REos).await;
        }

        let count = count.min(buf.len());
        let mut cancelled = false;
        for chunk in ByteChunks::new(&buf[..count], self.threshold) {
            // An interrupted call gets no further frames, not even REos;
            // the peer has already abandoned the tag.
            if intr.is_fired() {
                cancelled = true;
                break;
            }
            self.send(
                tag,
                FsCall::RReadChunk {
                    status: Status::OK,
                    data: Data(chunk.to_vec()),
                },
            )
            .await?;
        }
        self.buffers.release(buf);
        if cancelled {
            debug!("tag {}: read stream interrupted", tag);
            return Ok(());
        }
        self.send(tag, FsCall::REos).await
    }

    async fn handle_readdir(
        &self,
        tag: u16,
        arg: ReadIn,
        intr: &Interrupt,
        plus: bool,
    ) -> Result<()> {
        let buf = self.buffers.acquire(arg.size as usize);
        let mut list = DirEntryList::with_buffer(buf, arg.size as usize, arg.offset);
        let (method, status) = if plus {
            ("ReadDirPlus", self.fs.readdirplus(intr, &arg, &mut list).await)
        } else {
            ("ReadDir", self.fs.readdir(intr, &arg, &mut list).await)
        };

        if status == Status::ENOSYS {
            self.buffers.release(list.into_buffer());
            return self.abort_unimplemented(tag, method).await;
        }
        if !status.is_ok() {
            self.buffers.release(list.into_buffer());
            self.send(
                tag,
                FsCall::RDirChunk {
                    status,
                    entries: DirEntryBatch::default(),
                },
            )
            .await?;
            return self.send(tag, FsCall::REos).await;
        }

        // The attribute block of a plus listing never crosses the wire;
        // the far side rebuilds its own.
        let prefix = if plus { ENTRY_OUT_SIZE } else { 0 };
        let entries: Vec<_> = DirentIter::with_prefix(list.bytes(), prefix).collect();
        self.buffers.release(list.into_buffer());

        for batch in EntryBatches::new(entries, self.threshold) {
            if intr.is_fired() {
                debug!("tag {}: listing stream interrupted", tag);
                return Ok(());
            }
            self.send(
                tag,
                FsCall::RDirChunk {
                    status: Status::OK,
                    entries: DirEntryBatch::with(batch),
                },
            )
            .await?;
        }
        self.send(tag, FsCall::REos).await
    }
}

async fn srv_async_tcp<Fs>(server: Server<Fs>, addr: &str) -> Result<()>
where
    Fs: RawFilesystem + 'static,
{
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("accepted: {:?}", peer);

        let server = server.clone();
        tokio::spawn(async move {
            let (readhalf, writehalf) = stream.into_split();
            if let Err(e) = server.dispatch(readhalf, writehalf).await {
                error!("connection error: {}", e);
            }
        });
    }
}

struct DeleteOnDrop {
    path: PathBuf,
    listener: UnixListener,
}

impl DeleteOnDrop {
    fn bind(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_owned();
        UnixListener::bind(&path).map(|listener| DeleteOnDrop { path, listener })
    }
}

impl std::ops::Deref for DeleteOnDrop {
    type Target = UnixListener;

    fn deref(&self) -> &Self::Target {
        &self.listener
    }
}

impl Drop for DeleteOnDrop {
    fn drop(&mut self) {
        // There's no way to return a useful error here
        if let Err(e) = std::fs::remove_file(&self.path) {
            eprintln!(
                "Warning: Failed to remove socket file {:?}: {}",
                self.path, e
            );
        }
    }
}

async fn srv_async_unix<Fs>(server: Server<Fs>, addr: impl AsRef<Path>) -> Result<()>
where
    Fs: RawFilesystem + 'static,
{
    use tokio::signal::unix::{SignalKind, signal};

    let listener = DeleteOnDrop::bind(addr)?;

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let running = Arc::new(std::sync::atomic::AtomicBool::new(true));

    {
        let running = running.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                }
            }
            running.store(false, Ordering::SeqCst);
        });
    }

    while running.load(Ordering::SeqCst) {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        info!("accepted: {:?}", peer);

                        let server = server.clone();
                        tokio::spawn(async move {
                            let (readhalf, writehalf) = tokio::io::split(stream);
                            if let Err(e) = server.dispatch(readhalf, writehalf).await {
                                error!("connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {
                // Allow the server to check the running flag
            }
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Start serving `fs` on `addr`, given as `"tcp!host!port"` or
/// `"unix!path!0"`.
pub async fn srv_async<Fs>(fs: Fs, addr: &str) -> Result<()>
where
    Fs: RawFilesystem + 'static,
{
    let server = Server::new(fs);
    let (proto, listen_addr) = utils::parse_proto(addr)
        .ok_or_else(|| Error::from(io_err!(InvalidInput, "Invalid protocol or address")))?;

    match proto {
        "tcp" => srv_async_tcp(server, &listen_addr).await,
        "unix" => srv_async_unix(server, &listen_addr).await,
        _ => Err(From::from(io_err!(InvalidInput, "Protocol not supported"))),
    }
}
