//! Calling side of the bridge: a tag-multiplexed connection and the
//! [`RemoteFs`] adapter that forwards every [`RawFilesystem`] operation
//! over it.
//!
//! One router task per connection reads frames and hands each to the
//! waiting call by tag. When a call's interrupt fires, the receive path
//! posts `TInterrupt` for the peer and resolves locally with `EINTR`
//! without waiting for the stream to wind down; a pooled watcher in the
//! serving side's style covers the window before the call is waiting.

use {
    crate::{
        cancel::{CancelPool, Interrupt},
        error::Error,
        io_err, res, serialize,
        status::{AbortCode, Status, status_from_transport},
        utils::{self, Result},
        wire::{Data, FsCall, Msg, MsgType, NOTAG},
    },
    bytes::buf::{Buf, BufMut},
    futures::sink::SinkExt,
    log::{debug, error, warn},
    std::{
        collections::HashMap,
        sync::{
            Arc, Mutex as StdMutex,
            atomic::{AtomicU16, Ordering},
        },
    },
    tokio::{
        io::{AsyncRead, AsyncWrite},
        sync::{Mutex, mpsc},
    },
    tokio_stream::StreamExt,
    tokio_util::codec::{FramedWrite, length_delimited::LengthDelimitedCodec},
};

use async_trait::async_trait;

use crate::dirent::DirEntryList;
use crate::ops::*;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct ConnInner {
    writer: Mutex<FramedWrite<BoxedWriter, LengthDelimitedCodec>>,
    pending: StdMutex<HashMap<u16, mpsc::UnboundedSender<FsCall>>>,
    next_tag: AtomicU16,
    cancels: CancelPool,
}

/// A point-to-point call channel multiplexing concurrent calls by tag.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnInner>,
}

impl Connection {
    /// Wraps an established byte stream and spawns the frame router.
    pub fn new<Reader, Writer>(reader: Reader, writer: Writer) -> Connection
    where
        Reader: 'static + AsyncRead + Send + std::marker::Unpin,
        Writer: 'static + AsyncWrite + Send + std::marker::Unpin,
    {
        let framedwrite = LengthDelimitedCodec::builder()
            .length_field_offset(0)
            .length_field_length(4)
            .length_adjustment(-4)
            .little_endian()
            .new_write(Box::new(writer) as BoxedWriter);
        let mut framedread = LengthDelimitedCodec::builder()
            .length_field_offset(0)
            .length_field_length(4)
            .length_adjustment(-4)
            .little_endian()
            .new_read(reader);

        let inner = Arc::new(ConnInner {
            writer: Mutex::new(framedwrite),
            pending: StdMutex::new(HashMap::new()),
            next_tag: AtomicU16::new(0),
            cancels: CancelPool::new(),
        });

        let router = inner.clone();
        tokio::spawn(async move {
            while let Some(bytes) = framedread.next().await {
                let bytes = match bytes {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!("connection read failed: {}", e);
                        break;
                    }
                };
                let msg = match serialize::read_msg(&mut bytes.reader()) {
                    Ok(msg) => msg,
                    Err(e) => {
                        error!("malformed frame: {}", e);
                        break;
                    }
                };
                debug!("← tag={} {:?}", msg.tag, MsgType::from(&msg.body));

                let waiter = {
                    let pending = router.pending.lock().expect("pending map poisoned");
                    pending.get(&msg.tag).cloned()
                };
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(msg.body);
                    }
                    // An abandoned call's trailing frames land here.
                    None => debug!("dropping frame for unknown tag {}", msg.tag),
                }
            }

            // Waking every pending call by dropping its sender turns the
            // lost connection into Error::Disconnected at each call site.
            let mut pending = router.pending.lock().expect("pending map poisoned");
            pending.clear();
        });

        Connection { inner }
    }

    fn begin(&self) -> Call {
        let mut pending = self.inner.pending.lock().expect("pending map poisoned");
        loop {
            let tag = self.inner.next_tag.fetch_add(1, Ordering::Relaxed);
            if tag == NOTAG || pending.contains_key(&tag) {
                continue;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            pending.insert(tag, tx);
            return Call {
                inner: self.inner.clone(),
                tag,
                rx,
            };
        }
    }

    /// Arms a pooled watcher that posts `TInterrupt` for `tag` the moment
    /// `intr` fires. Returns the guard; dropping it disarms.
    fn arm(&self, tag: u16, intr: &Interrupt) -> crate::cancel::CancelToken<'_> {
        let token = self.inner.cancels.acquire();
        let fire = intr.clone();
        let inner = self.inner.clone();
        token.forward(async move { fire.fired().await }, move || {
            tokio::spawn(async move {
                if let Err(e) = send_msg(&inner, tag, FsCall::TInterrupt { oldtag: tag }).await {
                    warn!("failed to post interrupt for tag {}: {}", tag, e);
                }
            });
        });
        token
    }

    /// Runs one call to a final reply, honoring `intr`.
    async fn call(&self, intr: &Interrupt, body: FsCall) -> Result<FsCall> {
        let mut call = self.begin();
        let _token = self.arm(call.tag, intr);
        call.send(body).await?;
        call.recv(intr).await
    }
}

/// One in-flight call's registration; dropping it abandons the tag and
/// any trailing frames.
struct Call {
    inner: Arc<ConnInner>,
    tag: u16,
    rx: mpsc::UnboundedReceiver<FsCall>,
}

impl Call {
    async fn send(&self, body: FsCall) -> Result<()> {
        send_msg(&self.inner, self.tag, body).await
    }

    /// Waits for the next frame of this call. Local cancellation wins the
    /// race and surfaces as [`Error::Cancelled`].
    async fn recv(&mut self, intr: &Interrupt) -> Result<FsCall> {
        tokio::select! {
            body = self.rx.recv() => {
                match body {
                    Some(FsCall::RAbort { code, message }) => res!(Error::Abort {
                        code: AbortCode::from_u8(code),
                        message,
                    }),
                    Some(body) => Ok(body),
                    None => res!(Error::Disconnected),
                }
            }
            _ = intr.fired() => {
                // The armed watcher can still be parked when the call
                // resolves and its token is released, so the interrupt is
                // posted from here as well. The serving side ignores an
                // interrupt for a tag it no longer tracks.
                if let Err(e) = send_msg(
                    &self.inner,
                    self.tag,
                    FsCall::TInterrupt { oldtag: self.tag },
                )
                .await
                {
                    warn!("failed to post interrupt for tag {}: {}", self.tag, e);
                }
                res!(Error::Cancelled)
            }
        }
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.remove(&self.tag);
        }
    }
}

async fn send_msg(inner: &ConnInner, tag: u16, body: FsCall) -> Result<()> {
    let msg = Msg { tag, body };

    let mut writer = bytes::BytesMut::with_capacity(4096).writer();
    serialize::write_msg(&mut writer, &msg)?;
    let frozen = writer.into_inner().freeze();

    let mut framedwrite = inner.writer.lock().await;
    framedwrite.send(frozen).await?;
    debug!("→ tag={} {:?}", tag, MsgType::from(&msg.body));
    Ok(())
}

/// Forward adapter: a [`RawFilesystem`] whose every operation happens on
/// the far side of a [`Connection`].
pub struct RemoteFs {
    conn: Connection,
}

impl RemoteFs {
    pub fn new(conn: Connection) -> RemoteFs {
        RemoteFs { conn }
    }

    async fn unary(&self, intr: &Interrupt, body: FsCall) -> Result<FsCall> {
        self.conn.call(intr, body).await
    }

    /// Streams a listing into `out`. A full sink stops insertion but the
    /// stream is still drained to its end marker.
    async fn do_readdir(
        &self,
        intr: &Interrupt,
        method: &str,
        body: FsCall,
        out: &mut DirEntryList,
        plus: bool,
    ) -> Status {
        let mut call = self.conn.begin();
        let _token = self.conn.arm(call.tag, intr);
        if let Err(e) = call.send(body).await {
            return status_from_transport(method, &e);
        }

        let mut full = false;
        loop {
            match call.recv(intr).await {
                Ok(FsCall::RDirChunk { status, entries }) => {
                    if !status.is_ok() {
                        return status;
                    }
                    for entry in entries.entries {
                        if full {
                            continue;
                        }
                        let accepted = if plus {
                            out.add_plus(&entry, &EntryOut::default())
                        } else {
                            out.add(&entry)
                        };
                        if !accepted {
                            full = true;
                        }
                    }
                }
                Ok(FsCall::REos) => return Status::OK,
                Ok(other) => {
                    error!("{method}: unexpected reply {:?}", MsgType::from(&other));
                    return Status::EIO;
                }
                Err(e) => return status_from_transport(method, &e),
            }
        }
    }
}

macro_rules! expect_reply {
    ($self:expr, $intr:expr, $method:expr, $body:expr, $pattern:pat => $result:expr) => {
        match $self.unary($intr, $body).await {
            Ok($pattern) => $result,
            Ok(other) => {
                error!("{}: unexpected reply {:?}", $method, MsgType::from(&other));
                Status::EIO
            }
            Err(e) => status_from_transport($method, &e),
        }
    };
}

#[async_trait]
impl RawFilesystem for RemoteFs {
    async fn lookup(
        &self,
        intr: &Interrupt,
        header: &InHeader,
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        expect_reply!(
            self,
            intr,
            "Lookup",
            FsCall::TLookup {
                header: *header,
                name: name.to_vec(),
            },
            FsCall::RLookup { status, entry } => {
                if status.is_ok() {
                    *out = entry;
                }
                status
            }
        )
    }

    async fn forget(&self, intr: &Interrupt, header: &InHeader, nlookup: u64) {
        // No status channel exists for forget; a transport failure is
        // only worth a log line.
        match self
            .unary(
                intr,
                FsCall::TForget {
                    header: *header,
                    nlookup,
                },
            )
            .await
        {
            Ok(FsCall::RForget) => {}
            Ok(other) => warn!("Forget: unexpected reply {:?}", MsgType::from(&other)),
            Err(e) => warn!("Forget: {}", e),
        }
    }

    async fn getattr(&self, intr: &Interrupt, arg: &GetAttrIn, out: &mut AttrOut) -> Status {
        expect_reply!(
            self,
            intr,
            "GetAttr",
            FsCall::TGetAttr { arg: *arg },
            FsCall::RGetAttr { status, attr_out } => {
                if status.is_ok() {
                    *out = attr_out;
                }
                status
            }
        )
    }

    async fn setattr(&self, intr: &Interrupt, arg: &SetAttrIn, out: &mut AttrOut) -> Status {
        expect_reply!(
            self,
            intr,
            "SetAttr",
            FsCall::TSetAttr { arg: *arg },
            FsCall::RSetAttr { status, attr_out } => {
                if status.is_ok() {
                    *out = attr_out;
                }
                status
            }
        )
    }

    async fn readlink(&self, intr: &Interrupt, header: &InHeader) -> (Vec<u8>, Status) {
        match self
            .unary(intr, FsCall::TReadlink { header: *header })
            .await
        {
            Ok(FsCall::RReadlink { status, target }) => (target.0, status),
            Ok(other) => {
                error!("Readlink: unexpected reply {:?}", MsgType::from(&other));
                (Vec::new(), Status::EIO)
            }
            Err(e) => (Vec::new(), status_from_transport("Readlink", &e)),
        }
    }

    async fn symlink(
        &self,
        intr: &Interrupt,
        header: &InHeader,
        target: &[u8],
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        expect_reply!(
            self,
            intr,
            "Symlink",
            FsCall::TSymlink {
                header: *header,
                target: Data(target.to_vec()),
                name: name.to_vec(),
            },
            FsCall::RSymlink { status, entry } => {
                if status.is_ok() {
                    *out = entry;
                }
                status
            }
        )
    }

    async fn mknod(
        &self,
        intr: &Interrupt,
        arg: &MknodIn,
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        expect_reply!(
            self,
            intr,
            "Mknod",
            FsCall::TMknod {
                arg: *arg,
                name: name.to_vec(),
            },
            FsCall::RMknod { status, entry } => {
                if status.is_ok() {
                    *out = entry;
                }
                status
            }
        )
    }

    async fn mkdir(
        &self,
        intr: &Interrupt,
        arg: &MkdirIn,
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        expect_reply!(
            self,
            intr,
            "Mkdir",
            FsCall::TMkdir {
                arg: *arg,
                name: name.to_vec(),
            },
            FsCall::RMkdir { status, entry } => {
                if status.is_ok() {
                    *out = entry;
                }
                status
            }
        )
    }

    async fn unlink(&self, intr: &Interrupt, header: &InHeader, name: &[u8]) -> Status {
        expect_reply!(
            self,
            intr,
            "Unlink",
            FsCall::TUnlink {
                header: *header,
                name: name.to_vec(),
            },
            FsCall::RUnlink { status } => status
        )
    }

    async fn rmdir(&self, intr: &Interrupt, header: &InHeader, name: &[u8]) -> Status {
        expect_reply!(
            self,
            intr,
            "Rmdir",
            FsCall::TRmdir {
                header: *header,
                name: name.to_vec(),
            },
            FsCall::RRmdir { status } => status
        )
    }

    async fn rename(
        &self,
        intr: &Interrupt,
        arg: &RenameIn,
        old_name: &[u8],
        new_name: &[u8],
    ) -> Status {
        expect_reply!(
            self,
            intr,
            "Rename",
            FsCall::TRename {
                arg: *arg,
                old_name: old_name.to_vec(),
                new_name: new_name.to_vec(),
            },
            FsCall::RRename { status } => status
        )
    }

    async fn link(
        &self,
        intr: &Interrupt,
        arg: &LinkIn,
        name: &[u8],
        out: &mut EntryOut,
    ) -> Status {
        expect_reply!(
            self,
            intr,
            "Link",
            FsCall::TLink {
                arg: *arg,
                name: name.to_vec(),
            },
            FsCall::RLink { status, entry } => {
                if status.is_ok() {
                    *out = entry;
                }
                status
            }
        )
    }

    async fn access(&self, intr: &Interrupt, arg: &AccessIn) -> Status {
        expect_reply!(
            self,
            intr,
            "Access",
            FsCall::TAccess { arg: *arg },
            FsCall::RAccess { status } => status
        )
    }

    async fn open(&self, intr: &Interrupt, arg: &OpenIn, out: &mut OpenOut) -> Status {
        expect_reply!(
            self,
            intr,
            "Open",
            FsCall::TOpen { arg: *arg },
            FsCall::ROpen { status, open_out } => {
                if status.is_ok() {
                    *out = open_out;
                }
                status
            }
        )
    }

    async fn create(
        &self,
        intr: &Interrupt,
        arg: &CreateIn,
        name: &[u8],
        out: &mut CreateOut,
    ) -> Status {
        expect_reply!(
            self,
            intr,
            "Create",
            FsCall::TCreate {
                arg: *arg,
                name: name.to_vec(),
            },
            FsCall::RCreate { status, create_out } => {
                if status.is_ok() {
                    *out = create_out;
                }
                status
            }
        )
    }

    /// Reassembles the chunked response into `buf` in arrival order.
    async fn read(&self, intr: &Interrupt, arg: &ReadIn, buf: &mut [u8]) -> (usize, Status) {
        let mut call = self.conn.begin();
        let _token = self.conn.arm(call.tag, intr);
        if let Err(e) = call.send(FsCall::TRead { arg: *arg }).await {
            return (0, status_from_transport("Read", &e));
        }

        let mut filled = 0;
        loop {
            match call.recv(intr).await {
                Ok(FsCall::RReadChunk { status, data }) => {
                    if !status.is_ok() {
                        return (0, status);
                    }
                    let take = data.0.len().min(buf.len() - filled);
                    buf[filled..filled + take].copy_from_slice(&data.0[..take]);
                    filled += take;
                }
                Ok(FsCall::REos) => return (filled, Status::OK),
                Ok(other) => {
                    error!("Read: unexpected reply {:?}", MsgType::from(&other));
                    return (0, Status::EIO);
                }
                Err(e) => return (0, status_from_transport("Read", &e)),
            }
        }
    }

    async fn write(&self, intr: &Interrupt, arg: &WriteIn, data: &[u8]) -> (u32, Status) {
        match self
            .unary(
                intr,
                FsCall::TWrite {
                    arg: *arg,
                    data: Data(data.to_vec()),
                },
            )
            .await
        {
            Ok(FsCall::RWrite { status, count }) => (count, status),
            Ok(other) => {
                error!("Write: unexpected reply {:?}", MsgType::from(&other));
                (0, Status::EIO)
            }
            Err(e) => (0, status_from_transport("Write", &e)),
        }
    }

    async fn lseek(&self, intr: &Interrupt, arg: &LseekIn, out: &mut LseekOut) -> Status {
        expect_reply!(
            self,
            intr,
            "Lseek",
            FsCall::TLseek { arg: *arg },
            FsCall::RLseek { status, lseek_out } => {
                if status.is_ok() {
                    *out = lseek_out;
                }
                status
            }
        )
    }

    async fn copy_file_range(&self, intr: &Interrupt, arg: &CopyFileRangeIn) -> (u32, Status) {
        match self
            .unary(intr, FsCall::TCopyFileRange { arg: *arg })
            .await
        {
            Ok(FsCall::RCopyFileRange { status, count }) => (count, status),
            Ok(other) => {
                error!(
                    "CopyFileRange: unexpected reply {:?}",
                    MsgType::from(&other)
                );
                (0, Status::EIO)
            }
            Err(e) => (0, status_from_transport("CopyFileRange", &e)),
        }
    }

    async fn flush(&self, intr: &Interrupt, arg: &FlushIn) -> Status {
        expect_reply!(
            self,
            intr,
            "Flush",
            FsCall::TFlush { arg: *arg },
            FsCall::RFlush { status } => status
        )
    }

    async fn release(&self, intr: &Interrupt, arg: &ReleaseIn) {
        match self
            .unary(intr, FsCall::TRelease { arg: *arg })
            .await
        {
            Ok(FsCall::RRelease) => {}
            Ok(other) => warn!("Release: unexpected reply {:?}", MsgType::from(&other)),
            Err(e) => warn!("Release: {}", e),
        }
    }

    async fn fsync(&self, intr: &Interrupt, arg: &FsyncIn) -> Status {
        expect_reply!(
            self,
            intr,
            "Fsync",
            FsCall::TFsync { arg: *arg },
            FsCall::RFsync { status } => status
        )
    }

    async fn fallocate(&self, intr: &Interrupt, arg: &FallocateIn) -> Status {
        expect_reply!(
            self,
            intr,
            "Fallocate",
            FsCall::TFallocate { arg: *arg },
            FsCall::RFallocate { status } => status
        )
    }

    async fn opendir(&self, intr: &Interrupt, arg: &OpenIn, out: &mut OpenOut) -> Status {
        expect_reply!(
            self,
            intr,
            "OpenDir",
            FsCall::TOpenDir { arg: *arg },
            FsCall::ROpenDir { status, open_out } => {
                if status.is_ok() {
                    *out = open_out;
                }
                status
            }
        )
    }

    async fn readdir(&self, intr: &Interrupt, arg: &ReadIn, out: &mut DirEntryList) -> Status {
        self.do_readdir(intr, "ReadDir", FsCall::TReadDir { arg: *arg }, out, false)
            .await
    }

    async fn readdirplus(&self, intr: &Interrupt, arg: &ReadIn, out: &mut DirEntryList) -> Status {
        self.do_readdir(
            intr,
            "ReadDirPlus",
            FsCall::TReadDirPlus { arg: *arg },
            out,
            true,
        )
        .await
    }

    async fn releasedir(&self, intr: &Interrupt, arg: &ReleaseIn) {
        match self
            .unary(intr, FsCall::TReleaseDir { arg: *arg })
            .await
        {
            Ok(FsCall::RReleaseDir) => {}
            Ok(other) => warn!("ReleaseDir: unexpected reply {:?}", MsgType::from(&other)),
            Err(e) => warn!("ReleaseDir: {}", e),
        }
    }

    async fn fsyncdir(&self, intr: &Interrupt, arg: &FsyncIn) -> Status {
        expect_reply!(
            self,
            intr,
            "FsyncDir",
            FsCall::TFsyncDir { arg: *arg },
            FsCall::RFsyncDir { status } => status
        )
    }

    async fn statfs(&self, intr: &Interrupt, header: &InHeader, out: &mut StatFsOut) -> Status {
        expect_reply!(
            self,
            intr,
            "StatFs",
            FsCall::TStatFs { header: *header },
            FsCall::RStatFs { status, statfs } => {
                if status.is_ok() {
                    *out = statfs;
                }
                status
            }
        )
    }

    async fn getlk(&self, intr: &Interrupt, arg: &LkIn, out: &mut LkOut) -> Status {
        expect_reply!(
            self,
            intr,
            "GetLk",
            FsCall::TGetLk { arg: *arg },
            FsCall::RGetLk { status, lk_out } => {
                if status.is_ok() {
                    *out = lk_out;
                }
                status
            }
        )
    }

    async fn setlk(&self, intr: &Interrupt, arg: &LkIn) -> Status {
        expect_reply!(
            self,
            intr,
            "SetLk",
            FsCall::TSetLk { arg: *arg },
            FsCall::RSetLk { status } => status
        )
    }

    async fn setlkw(&self, intr: &Interrupt, arg: &LkIn) -> Status {
        expect_reply!(
            self,
            intr,
            "SetLkw",
            FsCall::TSetLkw { arg: *arg },
            FsCall::RSetLkw { status } => status
        )
    }

    async fn getxattr(
        &self,
        intr: &Interrupt,
        header: &InHeader,
        attr: &[u8],
        dest: &mut [u8],
    ) -> (u32, Status) {
        match self
            .unary(
                intr,
                FsCall::TGetXAttr {
                    header: *header,
                    attr: attr.to_vec(),
                    size: dest.len() as u32,
                },
            )
            .await
        {
            Ok(FsCall::RGetXAttr { status, size, data }) => {
                let take = data.0.len().min(dest.len());
                dest[..take].copy_from_slice(&data.0[..take]);
                (size, status)
            }
            Ok(other) => {
                error!("GetXAttr: unexpected reply {:?}", MsgType::from(&other));
                (0, Status::EIO)
            }
            Err(e) => (0, status_from_transport("GetXAttr", &e)),
        }
    }

    async fn setxattr(
        &self,
        intr: &Interrupt,
        arg: &SetXAttrIn,
        attr: &[u8],
        data: &[u8],
    ) -> Status {
        expect_reply!(
            self,
            intr,
            "SetXAttr",
            FsCall::TSetXAttr {
                arg: *arg,
                attr: attr.to_vec(),
                data: Data(data.to_vec()),
            },
            FsCall::RSetXAttr { status } => status
        )
    }

    async fn listxattr(
        &self,
        intr: &Interrupt,
        header: &InHeader,
        dest: &mut [u8],
    ) -> (u32, Status) {
        match self
            .unary(
                intr,
                FsCall::TListXAttr {
                    header: *header,
                    size: dest.len() as u32,
                },
            )
            .await
        {
            Ok(FsCall::RListXAttr { status, size, data }) => {
                let take = data.0.len().min(dest.len());
                dest[..take].copy_from_slice(&data.0[..take]);
                (size, status)
            }
            Ok(other) => {
                error!("ListXAttr: unexpected reply {:?}", MsgType::from(&other));
                (0, Status::EIO)
            }
            Err(e) => (0, status_from_transport("ListXAttr", &e)),
        }
    }

    async fn removexattr(&self, intr: &Interrupt, header: &InHeader, attr: &[u8]) -> Status {
        expect_reply!(
            self,
            intr,
            "RemoveXAttr",
            FsCall::TRemoveXAttr {
                header: *header,
                attr: attr.to_vec(),
            },
            FsCall::RRemoveXAttr { status } => status
        )
    }
}

/// Connect to a serving endpoint at `addr`, given as `"tcp!host!port"`
/// or `"unix!path!0"`.
pub async fn connect(addr: &str) -> Result<RemoteFs> {
    let (proto, peer_addr) = utils::parse_proto(addr)
        .ok_or_else(|| Error::from(io_err!(InvalidInput, "Invalid protocol or address")))?;

    let conn = match proto {
        "tcp" => {
            let stream = tokio::net::TcpStream::connect(&peer_addr).await?;
            let (readhalf, writehalf) = stream.into_split();
            Connection::new(readhalf, writehalf)
        }
        "unix" => {
            let stream = tokio::net::UnixStream::connect(&peer_addr).await?;
            let (readhalf, writehalf) = stream.into_split();
            Connection::new(readhalf, writehalf)
        }
        _ => return res!(io_err!(InvalidInput, "Protocol not supported")),
    };

    Ok(RemoteFs::new(conn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirent::{DirEntry, DirentIter, ENTRY_OUT_SIZE};
    use crate::srv::Server;
    use std::time::Duration;
    use tokio::sync::Notify;

    struct TestFs;

    #[async_trait]
    impl RawFilesystem for TestFs {
        async fn lookup(
            &self,
            _intr: &Interrupt,
            _header: &InHeader,
            name: &[u8],
            out: &mut EntryOut,
        ) -> Status {
            if name == b"hello.txt" {
                out.nodeid = 42;
                out.attr.ino = 42;
                out.attr.mode = 0o100644;
                Status::OK
            } else {
                Status::ENOENT
            }
        }

        async fn access(&self, _intr: &Interrupt, _arg: &AccessIn) -> Status {
            Status::EACCES
        }

        async fn read(
            &self,
            _intr: &Interrupt,
            arg: &ReadIn,
            buf: &mut [u8],
        ) -> (usize, Status) {
            let content = b"hello world";
            let start = (arg.offset as usize).min(content.len());
            let end = (start + arg.size as usize).min(content.len());
            let n = (end - start).min(buf.len());
            buf[..n].copy_from_slice(&content[start..start + n]);
            (n, Status::OK)
        }

        async fn readdir(
            &self,
            _intr: &Interrupt,
            arg: &ReadIn,
            out: &mut DirEntryList,
        ) -> Status {
            let names: [&[u8]; 3] = [b"foo", b"foo2", b"foo3"];
            for (i, name) in names.iter().enumerate().skip(arg.offset as usize) {
                let entry = DirEntry {
                    ino: 2 + i as u64,
                    mode: 0o100000,
                    name: name.to_vec(),
                };
                if !out.add(&entry) {
                    break;
                }
            }
            Status::OK
        }

        async fn readdirplus(
            &self,
            intr: &Interrupt,
            arg: &ReadIn,
            out: &mut DirEntryList,
        ) -> Status {
            let names: [&[u8]; 3] = [b"foo", b"foo2", b"foo3"];
            let _ = intr;
            for (i, name) in names.iter().enumerate().skip(arg.offset as usize) {
                let entry = DirEntry {
                    ino: 2 + i as u64,
                    mode: 0o100000,
                    name: name.to_vec(),
                };
                let entry_out = EntryOut {
                    nodeid: entry.ino,
                    ..EntryOut::default()
                };
                if !out.add_plus(&entry, &entry_out) {
                    break;
                }
            }
            Status::OK
        }

        async fn setlkw(&self, intr: &Interrupt, _arg: &LkIn) -> Status {
            // Blocks until interrupted, like a contended lock would.
            intr.fired().await;
            Status::EINTR
        }
    }

    fn bridge(threshold: usize) -> RemoteFs {
        bridge_with(TestFs, threshold)
    }

    fn bridge_with<Fs: RawFilesystem + 'static>(fs: Fs, threshold: usize) -> RemoteFs {
        let (client_io, server_io) = tokio::io::duplex(1 << 20);

        let server = Server::new(fs).msg_size_threshold(threshold);
        tokio::spawn(async move {
            let (readhalf, writehalf) = tokio::io::split(server_io);
            let _ = server.dispatch(readhalf, writehalf).await;
        });

        let (readhalf, writehalf) = tokio::io::split(client_io);
        RemoteFs::new(Connection::new(readhalf, writehalf))
    }

    #[tokio::test]
    async fn lookup_roundtrip() {
        let fs = bridge(crate::chunk::MSG_SIZE_THRESHOLD);
        let intr = Interrupt::new();

        let mut out = EntryOut::default();
        let status = fs
            .lookup(&intr, &InHeader::default(), b"hello.txt", &mut out)
            .await;
        assert_eq!(status, Status::OK);
        assert_eq!(out.nodeid, 42);

        let status = fs
            .lookup(&intr, &InHeader::default(), b"missing", &mut out)
            .await;
        assert_eq!(status, Status::ENOENT);
    }

    #[tokio::test]
    async fn error_status_travels_as_payload() {
        let fs = bridge(crate::chunk::MSG_SIZE_THRESHOLD);
        let intr = Interrupt::new();

        let status = fs.access(&intr, &AccessIn::default()).await;
        assert_eq!(status, Status::EACCES);
    }

    #[tokio::test]
    async fn unimplemented_surfaces_as_enosys() {
        let fs = bridge(crate::chunk::MSG_SIZE_THRESHOLD);
        let intr = Interrupt::new();

        // TestFs leaves lseek at its default.
        let mut out = LseekOut::default();
        let status = fs.lseek(&intr, &LseekIn::default(), &mut out).await;
        assert_eq!(status, Status::ENOSYS);
    }

    #[tokio::test]
    async fn read_reassembles_chunked_payload() {
        // Threshold 5 forces "hello world" into three frames.
        let fs = bridge(5);
        let intr = Interrupt::new();

        let arg = ReadIn {
            size: 64,
            ..ReadIn::default()
        };
        let mut buf = vec![0; 64];
        let (n, status) = fs.read(&intr, &arg, &mut buf).await;
        assert_eq!(status, Status::OK);
        assert_eq!(&buf[..n], b"hello world");
    }

    #[tokio::test]
    async fn empty_read_succeeds() {
        let fs = bridge(5);
        let intr = Interrupt::new();

        let arg = ReadIn {
            offset: 100,
            size: 64,
            ..ReadIn::default()
        };
        let mut buf = vec![0; 64];
        let (n, status) = fs.read(&intr, &arg, &mut buf).await;
        assert_eq!(status, Status::OK);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn readdir_roundtrip() {
        let fs = bridge(crate::chunk::MSG_SIZE_THRESHOLD);
        let intr = Interrupt::new();

        let arg = ReadIn {
            size: 4096,
            ..ReadIn::default()
        };
        let mut out = DirEntryList::new(4096, 0);
        let status = fs.readdir(&intr, &arg, &mut out).await;
        assert_eq!(status, Status::OK);

        let names: Vec<Vec<u8>> = DirentIter::new(out.bytes()).map(|e| e.name).collect();
        assert_eq!(names, vec![b"foo".to_vec(), b"foo2".to_vec(), b"foo3".to_vec()]);
    }

    #[tokio::test]
    async fn readdir_splits_across_frames() {
        // Each entry estimates to 15-16 bytes; threshold 16 forces one
        // entry per frame, and the result must still assemble in order.
        let fs = bridge(16);
        let intr = Interrupt::new();

        let arg = ReadIn {
            size: 4096,
            ..ReadIn::default()
        };
        let mut out = DirEntryList::new(4096, 0);
        let status = fs.readdir(&intr, &arg, &mut out).await;
        assert_eq!(status, Status::OK);
        assert_eq!(DirentIter::new(out.bytes()).count(), 3);
    }

    #[tokio::test]
    async fn readdirplus_records_carry_prefix() {
        let fs = bridge(crate::chunk::MSG_SIZE_THRESHOLD);
        let intr = Interrupt::new();

        let arg = ReadIn {
            size: 4096,
            ..ReadIn::default()
        };
        let mut out = DirEntryList::new(4096, 0);
        let status = fs.readdirplus(&intr, &arg, &mut out).await;
        assert_eq!(status, Status::OK);

        let names: Vec<Vec<u8>> = DirentIter::with_prefix(out.bytes(), ENTRY_OUT_SIZE)
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec![b"foo".to_vec(), b"foo2".to_vec(), b"foo3".to_vec()]);
    }

    #[tokio::test]
    async fn full_sink_stops_insertion_without_error() {
        let fs = bridge(crate::chunk::MSG_SIZE_THRESHOLD);
        let intr = Interrupt::new();

        let arg = ReadIn {
            size: 4096,
            ..ReadIn::default()
        };
        // Room for one record of each name length, not three.
        let mut out = DirEntryList::new(64, 0);
        let status = fs.readdir(&intr, &arg, &mut out).await;
        assert_eq!(status, Status::OK);
        assert!(DirentIter::new(out.bytes()).count() < 3);
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_eintr() {
        let fs = bridge(crate::chunk::MSG_SIZE_THRESHOLD);
        let intr = Interrupt::new();

        let fire = intr.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            fire.fire();
        });

        let status = tokio::time::timeout(
            Duration::from_secs(5),
            fs.setlkw(&intr, &LkIn::default()),
        )
        .await
        .expect("cancelled call must not hang");
        assert_eq!(status, Status::EINTR);
    }

    /// Blocks in setlkw until its interrupt fires, then reports the fact.
    struct LockFs {
        interrupted: Arc<Notify>,
    }

    #[async_trait]
    impl RawFilesystem for LockFs {
        async fn setlkw(&self, intr: &Interrupt, _arg: &LkIn) -> Status {
            intr.fired().await;
            self.interrupted.notify_one();
            Status::EINTR
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn interrupt_reaches_serving_side() {
        // The local EINTR result alone proves nothing about the peer; the
        // serving-side interrupt must fire too, whatever the timing of the
        // cancellation relative to the call.
        for round in 0..100u64 {
            let interrupted = Arc::new(Notify::new());
            let fs = bridge_with(
                LockFs {
                    interrupted: interrupted.clone(),
                },
                crate::chunk::MSG_SIZE_THRESHOLD,
            );
            let intr = Interrupt::new();

            let fire = intr.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_micros(round * 50)).await;
                fire.fire();
            });

            let status = tokio::time::timeout(
                Duration::from_secs(5),
                fs.setlkw(&intr, &LkIn::default()),
            )
            .await
            .expect("cancelled call must not hang");
            assert_eq!(status, Status::EINTR);

            tokio::time::timeout(Duration::from_secs(1), interrupted.notified())
                .await
                .unwrap_or_else(|_| {
                    panic!("interrupt never reached the serving side (round {round})")
                });
        }
    }

    /// Completes a read only after the interrupt fires, with a payload that
    /// would otherwise span many frames.
    struct GatedReadFs;

    #[async_trait]
    impl RawFilesystem for GatedReadFs {
        async fn read(
            &self,
            intr: &Interrupt,
            _arg: &ReadIn,
            buf: &mut [u8],
        ) -> (usize, Status) {
            intr.fired().await;
            buf.fill(b'x');
            (buf.len(), Status::OK)
        }
    }

    #[tokio::test]
    async fn interrupted_stream_emits_no_further_frames() {
        let fs = bridge_with(GatedReadFs, 8);

        let mut call = fs.conn.begin();
        call.send(FsCall::TRead {
            arg: ReadIn {
                size: 64,
                ..ReadIn::default()
            },
        })
        .await
        .unwrap();
        send_msg(
            &fs.conn.inner,
            call.tag,
            FsCall::TInterrupt { oldtag: call.tag },
        )
        .await
        .unwrap();

        // The serving side observes the interrupt before emitting: no
        // chunk, no end-of-stream marker.
        let quiet = Interrupt::new();
        let frame = tokio::time::timeout(Duration::from_millis(200), call.recv(&quiet)).await;
        assert!(frame.is_err(), "interrupted stream must go silent");
    }
}
