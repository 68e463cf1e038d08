//! Protocol message types and constants.
//!
//! Every exchange is a tagged [`Msg`] inside one length-delimited frame.
//! T-messages travel from the calling side to the serving side, R-messages
//! the other way. Single-shot operations get exactly one R-message;
//! streaming operations (`TRead`, `TReadDir`, `TReadDirPlus`) get zero or
//! more data frames followed by [`FsCall::REos`], or a single
//! [`FsCall::RAbort`].

use enum_primitive::*;

use crate::dirent::DirEntry;
use crate::ops::*;
use crate::status::Status;

/// Tag reserved for messages outside any call. Currently unused on the
/// wire; real calls never carry it.
pub const NOTAG: u16 = !0;

/// Raw byte payload used by read results, write requests and xattr
/// values. Encoded with a 32-bit length.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Data(pub Vec<u8>);

/// One frame's worth of directory entries.
///
/// Carries its own 32-bit count: a frame near the size threshold can hold
/// far more short entries than a 16-bit count could express.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirEntryBatch {
    pub entries: Vec<DirEntry>,
}

impl DirEntryBatch {
    pub fn with(entries: Vec<DirEntry>) -> DirEntryBatch {
        DirEntryBatch { entries }
    }
}

enum_from_primitive! {
    #[doc = "Message type discriminants as they appear on the wire"]
    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    pub enum MsgType {
        TLookup         = 2,
        RLookup,
        TForget         = 4,
        RForget,
        TGetAttr        = 6,
        RGetAttr,
        TSetAttr        = 8,
        RSetAttr,
        TReadlink       = 10,
        RReadlink,
        TSymlink        = 12,
        RSymlink,
        TMknod          = 14,
        RMknod,
        TMkdir          = 16,
        RMkdir,
        TUnlink         = 18,
        RUnlink,
        TRmdir          = 20,
        RRmdir,
        TRename         = 22,
        RRename,
        TLink           = 24,
        RLink,
        TAccess         = 26,
        RAccess,
        TOpen           = 28,
        ROpen,
        TCreate         = 30,
        RCreate,
        TRead           = 32,
        RReadChunk,
        TWrite          = 34,
        RWrite,
        TFlush          = 36,
        RFlush,
        TRelease        = 38,
        RRelease,
        TFsync          = 40,
        RFsync,
        TFallocate      = 42,
        RFallocate,
        TLseek          = 44,
        RLseek,
        TCopyFileRange  = 46,
        RCopyFileRange,
        TOpenDir        = 48,
        ROpenDir,
        TReadDir        = 50,
        RDirChunk,
        // Replies to TReadDirPlus reuse RDirChunk; 53 stays unassigned.
        TReadDirPlus    = 52,
        TReleaseDir     = 54,
        RReleaseDir,
        TFsyncDir       = 56,
        RFsyncDir,
        TStatFs         = 58,
        RStatFs,
        TGetLk          = 60,
        RGetLk,
        TSetLk          = 62,
        RSetLk,
        TSetLkw         = 64,
        RSetLkw,
        TGetXAttr       = 66,
        RGetXAttr,
        TSetXAttr       = 68,
        RSetXAttr,
        TListXAttr      = 70,
        RListXAttr,
        TRemoveXAttr    = 72,
        RRemoveXAttr,

        // Control messages
        TInterrupt      = 100,
        REos            = 101,
        RAbort          = 102,
    }
}

impl<'a> From<&'a FsCall> for MsgType {
    fn from(call: &'a FsCall) -> MsgType {
        match *call {
            FsCall::TLookup { .. } => MsgType::TLookup,
            FsCall::RLookup { .. } => MsgType::RLookup,
            FsCall::TForget { .. } => MsgType::TForget,
            FsCall::RForget => MsgType::RForget,
            FsCall::TGetAttr { .. } => MsgType::TGetAttr,
            FsCall::RGetAttr { .. } => MsgType::RGetAttr,
            FsCall::TSetAttr { .. } => MsgType::TSetAttr,
            FsCall::RSetAttr { .. } => MsgType::RSetAttr,
            FsCall::TReadlink { .. } => MsgType::TReadlink,
            FsCall::RReadlink { .. } => MsgType::RReadlink,
            FsCall::TSymlink { .. } => MsgType::TSymlink,
            FsCall::RSymlink { .. } => MsgType::RSymlink,
            FsCall::TMknod { .. } => MsgType::TMknod,
            FsCall::RMknod { .. } => MsgType::RMknod,
            FsCall::TMkdir { .. } => MsgType::TMkdir,
            FsCall::RMkdir { .. } => MsgType::RMkdir,
            FsCall::TUnlink { .. } => MsgType::TUnlink,
            FsCall::RUnlink { .. } => MsgType::RUnlink,
            FsCall::TRmdir { .. } => MsgType::TRmdir,
            FsCall::RRmdir { .. } => MsgType::RRmdir,
            FsCall::TRename { .. } => MsgType::TRename,
            FsCall::RRename { .. } => MsgType::RRename,
            FsCall::TLink { .. } => MsgType::TLink,
            FsCall::RLink { .. } => MsgType::RLink,
            FsCall::TAccess { .. } => MsgType::TAccess,
            FsCall::RAccess { .. } => MsgType::RAccess,
            FsCall::TOpen { .. } => MsgType::TOpen,
            FsCall::ROpen { .. } => MsgType::ROpen,
            FsCall::TCreate { .. } => MsgType::TCreate,
            FsCall::RCreate { .. } => MsgType::RCreate,
            FsCall::TRead { .. } => MsgType::TRead,
            FsCall::RReadChunk { .. } => MsgType::RReadChunk,
            FsCall::TWrite { .. } => MsgType::TWrite,
            FsCall::RWrite { .. } => MsgType::RWrite,
            FsCall::TFlush { .. } => MsgType::TFlush,
            FsCall::RFlush { .. } => MsgType::RFlush,
            FsCall::TRelease { .. } => MsgType::TRelease,
            FsCall::RRelease => MsgType::RRelease,
            FsCall::TFsync { .. } => MsgType::TFsync,
            FsCall::RFsync { .. } => MsgType::RFsync,
            FsCall::TFallocate { .. } => MsgType::TFallocate,
            FsCall::RFallocate { .. } => MsgType::RFallocate,
            FsCall::TLseek { .. } => MsgType::TLseek,
            FsCall::RLseek { .. } => MsgType::RLseek,
            FsCall::TCopyFileRange { .. } => MsgType::TCopyFileRange,
            FsCall::RCopyFileRange { .. } => MsgType::RCopyFileRange,
            FsCall::TOpenDir { .. } => MsgType::TOpenDir,
            FsCall::ROpenDir { .. } => MsgType::ROpenDir,
            FsCall::TReadDir { .. } => MsgType::TReadDir,
            FsCall::RDirChunk { .. } => MsgType::RDirChunk,
            FsCall::TReadDirPlus { .. } => MsgType::TReadDirPlus,
            FsCall::TReleaseDir { .. } => MsgType::TReleaseDir,
            FsCall::RReleaseDir => MsgType::RReleaseDir,
            FsCall::TFsyncDir { .. } => MsgType::TFsyncDir,
            FsCall::RFsyncDir { .. } => MsgType::RFsyncDir,
            FsCall::TStatFs { .. } => MsgType::TStatFs,
            FsCall::RStatFs { .. } => MsgType::RStatFs,
            FsCall::TGetLk { .. } => MsgType::TGetLk,
            FsCall::RGetLk { .. } => MsgType::RGetLk,
            FsCall::TSetLk { .. } => MsgType::TSetLk,
            FsCall::RSetLk { .. } => MsgType::RSetLk,
            FsCall::TSetLkw { .. } => MsgType::TSetLkw,
            FsCall::RSetLkw { .. } => MsgType::RSetLkw,
            FsCall::TGetXAttr { .. } => MsgType::TGetXAttr,
            FsCall::RGetXAttr { .. } => MsgType::RGetXAttr,
            FsCall::TSetXAttr { .. } => MsgType::TSetXAttr,
            FsCall::RSetXAttr { .. } => MsgType::RSetXAttr,
            FsCall::TListXAttr { .. } => MsgType::TListXAttr,
            FsCall::RListXAttr { .. } => MsgType::RListXAttr,
            FsCall::TRemoveXAttr { .. } => MsgType::TRemoveXAttr,
            FsCall::RRemoveXAttr { .. } => MsgType::RRemoveXAttr,
            FsCall::TInterrupt { .. } => MsgType::TInterrupt,
            FsCall::REos => MsgType::REos,
            FsCall::RAbort { .. } => MsgType::RAbort,
        }
    }
}

/// A data type encapsulating the various protocol messages.
///
/// Names are raw byte strings; the protocol never assumes an encoding.
/// `status` fields carry the native outcome of the operation and the
/// remaining fields are only meaningful when the status is OK.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FsCall {
    TLookup {
        header: InHeader,
        name: Vec<u8>,
    },
    RLookup {
        status: Status,
        entry: EntryOut,
    },
    TForget {
        header: InHeader,
        nlookup: u64,
    },
    /// Bare acknowledgement; forget has no failure path.
    RForget,
    TGetAttr {
        arg: GetAttrIn,
    },
    RGetAttr {
        status: Status,
        attr_out: AttrOut,
    },
    TSetAttr {
        arg: SetAttrIn,
    },
    RSetAttr {
        status: Status,
        attr_out: AttrOut,
    },
    TReadlink {
        header: InHeader,
    },
    RReadlink {
        status: Status,
        target: Data,
    },
    TSymlink {
        header: InHeader,
        target: Data,
        name: Vec<u8>,
    },
    RSymlink {
        status: Status,
        entry: EntryOut,
    },
    TMknod {
        arg: MknodIn,
        name: Vec<u8>,
    },
    RMknod {
        status: Status,
        entry: EntryOut,
    },
    TMkdir {
        arg: MkdirIn,
        name: Vec<u8>,
    },
    RMkdir {
        status: Status,
        entry: EntryOut,
    },
    TUnlink {
        header: InHeader,
        name: Vec<u8>,
    },
    RUnlink {
        status: Status,
    },
    TRmdir {
        header: InHeader,
        name: Vec<u8>,
    },
    RRmdir {
        status: Status,
    },
    TRename {
        arg: RenameIn,
        old_name: Vec<u8>,
        new_name: Vec<u8>,
    },
    RRename {
        status: Status,
    },
    TLink {
        arg: LinkIn,
        name: Vec<u8>,
    },
    RLink {
        status: Status,
        entry: EntryOut,
    },
    TAccess {
        arg: AccessIn,
    },
    RAccess {
        status: Status,
    },
    TOpen {
        arg: OpenIn,
    },
    ROpen {
        status: Status,
        open_out: OpenOut,
    },
    TCreate {
        arg: CreateIn,
        name: Vec<u8>,
    },
    RCreate {
        status: Status,
        create_out: CreateOut,
    },
    TRead {
        arg: ReadIn,
    },
    /// One slice of a read result. A non-OK status ends the stream after
    /// this frame.
    RReadChunk {
        status: Status,
        data: Data,
    },
    TWrite {
        arg: WriteIn,
        data: Data,
    },
    RWrite {
        status: Status,
        count: u32,
    },
    TFlush {
        arg: FlushIn,
    },
    RFlush {
        status: Status,
    },
    TRelease {
        arg: ReleaseIn,
    },
    RRelease,
    TFsync {
        arg: FsyncIn,
    },
    RFsync {
        status: Status,
    },
    TFallocate {
        arg: FallocateIn,
    },
    RFallocate {
        status: Status,
    },
    TLseek {
        arg: LseekIn,
    },
    RLseek {
        status: Status,
        lseek_out: LseekOut,
    },
    TCopyFileRange {
        arg: CopyFileRangeIn,
    },
    RCopyFileRange {
        status: Status,
        count: u32,
    },
    TOpenDir {
        arg: OpenIn,
    },
    ROpenDir {
        status: Status,
        open_out: OpenOut,
    },
    TReadDir {
        arg: ReadIn,
    },
    /// One batch of a listing result, shared by `TReadDir` and
    /// `TReadDirPlus`. A non-OK status ends the stream after this frame.
    RDirChunk {
        status: Status,
        entries: DirEntryBatch,
    },
    TReadDirPlus {
        arg: ReadIn,
    },
    TReleaseDir {
        arg: ReleaseIn,
    },
    RReleaseDir,
    TFsyncDir {
        arg: FsyncIn,
    },
    RFsyncDir {
        status: Status,
    },
    TStatFs {
        header: InHeader,
    },
    RStatFs {
        status: Status,
        statfs: StatFsOut,
    },
    TGetLk {
        arg: LkIn,
    },
    RGetLk {
        status: Status,
        lk_out: LkOut,
    },
    TSetLk {
        arg: LkIn,
    },
    RSetLk {
        status: Status,
    },
    TSetLkw {
        arg: LkIn,
    },
    RSetLkw {
        status: Status,
    },
    TGetXAttr {
        header: InHeader,
        attr: Vec<u8>,
        size: u32,
    },
    RGetXAttr {
        status: Status,
        size: u32,
        data: Data,
    },
    TSetXAttr {
        arg: SetXAttrIn,
        attr: Vec<u8>,
        data: Data,
    },
    RSetXAttr {
        status: Status,
    },
    TListXAttr {
        header: InHeader,
        size: u32,
    },
    RListXAttr {
        status: Status,
        size: u32,
        data: Data,
    },
    TRemoveXAttr {
        header: InHeader,
        attr: Vec<u8>,
    },
    RRemoveXAttr {
        status: Status,
    },

    /// Cancel the in-flight call tagged `oldtag`. Never answered; the
    /// cancelled call itself ends with whatever it ends with.
    TInterrupt {
        oldtag: u16,
    },
    /// Clean end of a response stream.
    REos,
    /// The call failed at the transport level before or instead of a
    /// normal reply. `code` is an [`AbortCode`](crate::status::AbortCode)
    /// value.
    RAbort {
        code: u8,
        message: String,
    },
}

impl FsCall {
    /// Whether this message is a reply that terminates its call: true
    /// for every R-message except intermediate stream chunks.
    pub fn is_final(&self) -> bool {
        use crate::wire::FsCall::*;
        !matches!(
            self,
            RReadChunk { .. }
                | RDirChunk { .. }
                | TLookup { .. }
                | TForget { .. }
                | TGetAttr { .. }
                | TSetAttr { .. }
                | TReadlink { .. }
                | TSymlink { .. }
                | TMknod { .. }
                | TMkdir { .. }
                | TUnlink { .. }
                | TRmdir { .. }
                | TRename { .. }
                | TLink { .. }
                | TAccess { .. }
                | TOpen { .. }
                | TCreate { .. }
                | TRead { .. }
                | TWrite { .. }
                | TFlush { .. }
                | TRelease { .. }
                | TFsync { .. }
                | TFallocate { .. }
                | TLseek { .. }
                | TCopyFileRange { .. }
                | TOpenDir { .. }
                | TReadDir { .. }
                | TReadDirPlus { .. }
                | TReleaseDir { .. }
                | TFsyncDir { .. }
                | TStatFs { .. }
                | TGetLk { .. }
                | TSetLk { .. }
                | TSetLkw { .. }
                | TGetXAttr { .. }
                | TSetXAttr { .. }
                | TListXAttr { .. }
                | TRemoveXAttr { .. }
                | TInterrupt { .. }
        )
    }
}

/// Envelope for protocol messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Msg {
    /// Chosen by the calling side to identify the call. Every frame of
    /// the response carries the same tag.
    pub tag: u16,
    /// Message body encapsulating the various protocol messages.
    pub body: FsCall,
}
