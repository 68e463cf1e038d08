//! Serialize/deserialize protocol messages into/from binary.
//!
//! The wire encoding is little-endian regardless of host order; only the
//! kernel dirent buffers built in `dirent.rs` use host order, and those
//! never cross the wire as-is.

use crate::{io_err, res, status::Status, wire::*};
use crate::{
    dirent::DirEntry,
    ops::{
        AccessIn, Attr, AttrOut, CopyFileRangeIn, CreateIn, CreateOut, EntryOut, FallocateIn,
        FileLock, FlushIn, FsyncIn, GetAttrIn, InHeader, LinkIn, LkIn, LkOut, LseekIn, LseekOut,
        MkdirIn, MknodIn, OpenIn, OpenOut, ReadIn, ReleaseIn, RenameIn, SetAttrIn, SetAttrValid,
        SetXAttrIn, StatFsOut, WriteIn,
    },
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_traits::FromPrimitive;
use std::io::{Read, Result};
use std::mem;
use std::ops::{Shl, Shr};

macro_rules! decode {
    ($decoder:expr) => {
        Decodable::decode(&mut $decoder)?
    };

    ($typ:ident, $buf:expr) => {
        $typ::from_bits_truncate(decode!($buf))
    };
}

fn read_exact<R: Read + ?Sized>(r: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0; size];
    r.read_exact(&mut buf[..]).and(Ok(buf))
}

/// A serializing specific result to overload operators on `Result`
///
/// # Overloaded operators
/// <<, >>, ?
pub struct SResult<T>(::std::io::Result<T>);

/// A wrapper class of WriteBytesExt to provide operator overloads
/// for serializing
///
/// Operator '<<' serializes the right hand side argument into
/// the left hand side encoder
#[derive(Clone, Debug)]
pub struct Encoder<W> {
    writer: W,
    bytes: usize,
}

impl<W: WriteBytesExt> Encoder<W> {
    pub fn new(writer: W) -> Encoder<W> {
        Encoder { writer, bytes: 0 }
    }

    /// Return total bytes written
    pub fn bytes_written(&self) -> usize {
        self.bytes
    }

    /// Encode data, equivalent to: encoder << data
    pub fn encode<T: Encodable>(&mut self, data: &T) -> Result<usize> {
        let bytes = data.encode(&mut self.writer)?;
        self.bytes += bytes;
        Ok(bytes)
    }

    /// Get inner writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for Encoder<W> {
    type Output = SResult<Encoder<W>>;
    fn shl(mut self, rhs: &'a T) -> Self::Output {
        match self.encode(rhs) {
            Ok(_) => SResult(Ok(self)),
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Encodable, W: WriteBytesExt> Shl<&'a T> for SResult<Encoder<W>> {
    type Output = Self;
    fn shl(self, rhs: &'a T) -> Self::Output {
        match self.0 {
            Ok(mut encoder) => match encoder.encode(rhs) {
                Ok(_) => SResult(Ok(encoder)),
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

/// A wrapper class of ReadBytesExt to provide operator overloads
/// for deserializing
#[derive(Clone, Debug)]
pub struct Decoder<R> {
    reader: R,
}

impl<R: ReadBytesExt> Decoder<R> {
    pub fn new(reader: R) -> Decoder<R> {
        Decoder { reader }
    }
    pub fn decode<T: Decodable>(&mut self) -> Result<T> {
        Decodable::decode(&mut self.reader)
    }
    /// Get inner reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<'a, T: Decodable, R: ReadBytesExt> Shr<&'a mut T> for Decoder<R> {
    type Output = SResult<Decoder<R>>;
    fn shr(mut self, rhs: &'a mut T) -> Self::Output {
        match self.decode() {
            Ok(r) => {
                *rhs = r;
                SResult(Ok(self))
            }
            Err(e) => SResult(Err(e)),
        }
    }
}

impl<'a, T: Decodable, R: ReadBytesExt> Shr<&'a mut T> for SResult<Decoder<R>> {
    type Output = Self;
    fn shr(self, rhs: &'a mut T) -> Self::Output {
        match self.0 {
            Ok(mut decoder) => match decoder.decode() {
                Ok(r) => {
                    *rhs = r;
                    SResult(Ok(decoder))
                }
                Err(e) => SResult(Err(e)),
            },
            Err(e) => SResult(Err(e)),
        }
    }
}

/// Trait representing a type which can be serialized into binary
pub trait Encodable {
    /// Encode self to w and returns the number of bytes encoded
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize>;
}

impl Encodable for u8 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u8(*self).and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u16 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u16::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u32 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u32::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for u64 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_u64::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for i32 {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        w.write_i32::<LittleEndian>(*self)
            .and(Ok(mem::size_of::<Self>()))
    }
}

impl Encodable for String {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let mut bytes = (self.len() as u16).encode(w)?;
        bytes += w.write_all(self.as_bytes()).and(Ok(self.len()))?;
        Ok(bytes)
    }
}

impl Encodable for Status {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.0.encode(w)
    }
}

impl Encodable for Data {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        let size = self.0.len();
        let bytes = (size as u32).encode(w)? + size;
        w.write_all(&self.0)?;
        Ok(bytes)
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match self
            .iter()
            .fold(Encoder::new(w) << &(self.len() as u16), |acc, s| acc << s)
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for InHeader {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.length
            << &self.opcode
            << &self.unique
            << &self.nodeid
            << &self.uid
            << &self.gid
            << &self.pid
            << &self.padding
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for Attr {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.ino
            << &self.size
            << &self.blocks
            << &self.atime
            << &self.mtime
            << &self.ctime
            << &self.atimensec
            << &self.mtimensec
            << &self.ctimensec
            << &self.mode
            << &self.nlink
            << &self.uid
            << &self.gid
            << &self.rdev
            << &self.blksize
            << &self.padding
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for EntryOut {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.nodeid
            << &self.generation
            << &self.entry_valid
            << &self.attr_valid
            << &self.entry_valid_nsec
            << &self.attr_valid_nsec
            << &self.attr
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for AttrOut {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.attr_valid << &self.attr_valid_nsec << &self.dummy << &self.attr
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for GetAttrIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.flags << &self.dummy << &self.fh {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for SetAttrIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.header
            << &self.valid.bits()
            << &self.padding
            << &self.fh
            << &self.size
            << &self.lock_owner
            << &self.atime
            << &self.mtime
            << &self.ctime
            << &self.atimensec
            << &self.mtimensec
            << &self.ctimensec
            << &self.mode
            << &self.uid
            << &self.gid
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for OpenIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.flags << &self.mode {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for OpenOut {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.fh << &self.open_flags << &self.padding {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for CreateIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.flags << &self.mode << &self.umask << &self.padding
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for CreateOut {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.entry << &self.open {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for ReadIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.fh << &self.offset << &self.size << &self.read_flags
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for WriteIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.fh << &self.offset << &self.size << &self.write_flags
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for ReleaseIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.header
            << &self.fh
            << &self.flags
            << &self.release_flags
            << &self.lock_owner
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for FlushIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.fh << &self.unused << &self.padding << &self.lock_owner
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for FsyncIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.fh << &self.fsync_flags << &self.padding {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for MknodIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.mode << &self.rdev << &self.umask << &self.padding
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for MkdirIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.mode << &self.umask {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for RenameIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.newdir << &self.flags << &self.padding {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for LinkIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.oldnodeid {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for AccessIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.mask << &self.padding {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for FileLock {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.start << &self.end << &self.typ << &self.pid {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for LkIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.header
            << &self.fh
            << &self.owner
            << &self.lk
            << &self.lk_flags
            << &self.padding
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for LkOut {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.lk.encode(w)
    }
}

impl Encodable for FallocateIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.header
            << &self.fh
            << &self.offset
            << &self.length
            << &self.mode
            << &self.padding
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for LseekIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.fh << &self.offset << &self.whence << &self.padding
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for LseekOut {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        self.offset.encode(w)
    }
}

impl Encodable for CopyFileRangeIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.header
            << &self.fh_in
            << &self.off_in
            << &self.nodeid_out
            << &self.fh_out
            << &self.off_out
            << &self.len
            << &self.flags
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for SetXAttrIn {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.header << &self.size << &self.flags {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for StatFsOut {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w)
            << &self.blocks
            << &self.bfree
            << &self.bavail
            << &self.files
            << &self.ffree
            << &self.bsize
            << &self.namelen
            << &self.frsize
            << &self.padding
        {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for DirEntry {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match Encoder::new(w) << &self.ino << &self.mode << &self.name {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for DirEntryBatch {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        match self
            .entries
            .iter()
            .fold(Encoder::new(w) << &(self.entries.len() as u32), |acc, e| {
                acc << e
            }) {
            SResult(Ok(enc)) => Ok(enc.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

impl Encodable for Msg {
    fn encode<W: WriteBytesExt>(&self, w: &mut W) -> Result<usize> {
        use crate::wire::FsCall::*;

        let typ = MsgType::from(&self.body);
        let buf = Encoder::new(w) << &(typ as u8) << &self.tag;

        let buf = match self.body {
            TLookup {
                ref header,
                ref name,
            } => buf << header << name,
            RLookup {
                ref status,
                ref entry,
            } => buf << status << entry,
            TForget {
                ref header,
                ref nlookup,
            } => buf << header << nlookup,
            RForget => buf,
            TGetAttr { ref arg } => buf << arg,
            RGetAttr {
                ref status,
                ref attr_out,
            } => buf << status << attr_out,
            TSetAttr { ref arg } => buf << arg,
            RSetAttr {
                ref status,
                ref attr_out,
            } => buf << status << attr_out,
            TReadlink { ref header } => buf << header,
            RReadlink {
                ref status,
                ref target,
            } => buf << status << target,
            TSymlink {
                ref header,
                ref target,
                ref name,
            } => buf << header << target << name,
            RSymlink {
                ref status,
                ref entry,
            } => buf << status << entry,
            TMknod { ref arg, ref name } => buf << arg << name,
            RMknod {
                ref status,
                ref entry,
            } => buf << status << entry,
            TMkdir { ref arg, ref name } => buf << arg << name,
            RMkdir {
                ref status,
                ref entry,
            } => buf << status << entry,
            TUnlink {
                ref header,
                ref name,
            } => buf << header << name,
            RUnlink { ref status } => buf << status,
            TRmdir {
                ref header,
                ref name,
            } => buf << header << name,
            RRmdir { ref status } => buf << status,
            TRename {
                ref arg,
                ref old_name,
                ref new_name,
            } => buf << arg << old_name << new_name,
            RRename { ref status } => buf << status,
            TLink { ref arg, ref name } => buf << arg << name,
            RLink {
                ref status,
                ref entry,
            } => buf << status << entry,
            TAccess { ref arg } => buf << arg,
            RAccess { ref status } => buf << status,
            TOpen { ref arg } => buf << arg,
            ROpen {
                ref status,
                ref open_out,
            } => buf << status << open_out,
            TCreate { ref arg, ref name } => buf << arg << name,
            RCreate {
                ref status,
                ref create_out,
            } => buf << status << create_out,
            TRead { ref arg } => buf << arg,
            RReadChunk {
                ref status,
                ref data,
            } => buf << status << data,
            TWrite { ref arg, ref data } => buf << arg << data,
            RWrite {
                ref status,
                ref count,
            } => buf << status << count,
            TFlush { ref arg } => buf << arg,
            RFlush { ref status } => buf << status,
            TRelease { ref arg } => buf << arg,
            RRelease => buf,
            TFsync { ref arg } => buf << arg,
            RFsync { ref status } => buf << status,
            TFallocate { ref arg } => buf << arg,
            RFallocate { ref status } => buf << status,
            TLseek { ref arg } => buf << arg,
            RLseek {
                ref status,
                ref lseek_out,
            } => buf << status << lseek_out,
            TCopyFileRange { ref arg } => buf << arg,
            RCopyFileRange {
                ref status,
                ref count,
            } => buf << status << count,
            TOpenDir { ref arg } => buf << arg,
            ROpenDir {
                ref status,
                ref open_out,
            } => buf << status << open_out,
            TReadDir { ref arg } => buf << arg,
            RDirChunk {
                ref status,
                ref entries,
            } => buf << status << entries,
            TReadDirPlus { ref arg } => buf << arg,
            TReleaseDir { ref arg } => buf << arg,
            RReleaseDir => buf,
            TFsyncDir { ref arg } => buf << arg,
            RFsyncDir { ref status } => buf << status,
            TStatFs { ref header } => buf << header,
            RStatFs {
                ref status,
                ref statfs,
            } => buf << status << statfs,
            TGetLk { ref arg } => buf << arg,
            RGetLk {
                ref status,
                ref lk_out,
            } => buf << status << lk_out,
            TSetLk { ref arg } => buf << arg,
            RSetLk { ref status } => buf << status,
            TSetLkw { ref arg } => buf << arg,
            RSetLkw { ref status } => buf << status,
            TGetXAttr {
                ref header,
                ref attr,
                ref size,
            } => buf << header << attr << size,
            RGetXAttr {
                ref status,
                ref size,
                ref data,
            } => buf << status << size << data,
            TSetXAttr {
                ref arg,
                ref attr,
                ref data,
            } => buf << arg << attr << data,
            RSetXAttr { ref status } => buf << status,
            TListXAttr {
                ref header,
                ref size,
            } => buf << header << size,
            RListXAttr {
                ref status,
                ref size,
                ref data,
            } => buf << status << size << data,
            TRemoveXAttr {
                ref header,
                ref attr,
            } => buf << header << attr,
            RRemoveXAttr { ref status } => buf << status,
            TInterrupt { ref oldtag } => buf << oldtag,
            REos => buf,
            RAbort {
                ref code,
                ref message,
            } => buf << code << message,
        };

        match buf {
            SResult(Ok(b)) => Ok(b.bytes_written()),
            SResult(Err(e)) => Err(e),
        }
    }
}

/// Trait representing a type which can be deserialized from binary
pub trait Decodable: Sized {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self>;
}

impl Decodable for u8 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u8()
    }
}

impl Decodable for u16 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u16::<LittleEndian>()
    }
}

impl Decodable for u32 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u32::<LittleEndian>()
    }
}

impl Decodable for u64 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_u64::<LittleEndian>()
    }
}

impl Decodable for i32 {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        r.read_i32::<LittleEndian>()
    }
}

impl Decodable for String {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u16 = Decodable::decode(r)?;
        String::from_utf8(read_exact(r, len as usize)?)
            .map_err(|_| io_err!(Other, "Invalid UTF-8 sequence"))
    }
}

impl Decodable for Status {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(Status(Decodable::decode(r)?))
    }
}

impl Decodable for Data {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u32 = Decodable::decode(r)?;
        Ok(Data(read_exact(r, len as usize)?))
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let len: u16 = Decodable::decode(r)?;
        let mut buf = Vec::new();
        for _ in 0..len {
            buf.push(Decodable::decode(r)?);
        }
        Ok(buf)
    }
}

impl Decodable for InHeader {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(InHeader {
            length: Decodable::decode(r)?,
            opcode: Decodable::decode(r)?,
            unique: Decodable::decode(r)?,
            nodeid: Decodable::decode(r)?,
            uid: Decodable::decode(r)?,
            gid: Decodable::decode(r)?,
            pid: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for Attr {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(Attr {
            ino: Decodable::decode(r)?,
            size: Decodable::decode(r)?,
            blocks: Decodable::decode(r)?,
            atime: Decodable::decode(r)?,
            mtime: Decodable::decode(r)?,
            ctime: Decodable::decode(r)?,
            atimensec: Decodable::decode(r)?,
            mtimensec: Decodable::decode(r)?,
            ctimensec: Decodable::decode(r)?,
            mode: Decodable::decode(r)?,
            nlink: Decodable::decode(r)?,
            uid: Decodable::decode(r)?,
            gid: Decodable::decode(r)?,
            rdev: Decodable::decode(r)?,
            blksize: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for EntryOut {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(EntryOut {
            nodeid: Decodable::decode(r)?,
            generation: Decodable::decode(r)?,
            entry_valid: Decodable::decode(r)?,
            attr_valid: Decodable::decode(r)?,
            entry_valid_nsec: Decodable::decode(r)?,
            attr_valid_nsec: Decodable::decode(r)?,
            attr: Decodable::decode(r)?,
        })
    }
}

impl Decodable for AttrOut {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(AttrOut {
            attr_valid: Decodable::decode(r)?,
            attr_valid_nsec: Decodable::decode(r)?,
            dummy: Decodable::decode(r)?,
            attr: Decodable::decode(r)?,
        })
    }
}

impl Decodable for GetAttrIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(GetAttrIn {
            header: Decodable::decode(r)?,
            flags: Decodable::decode(r)?,
            dummy: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
        })
    }
}

impl Decodable for SetAttrIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(SetAttrIn {
            header: Decodable::decode(r)?,
            valid: decode!(SetAttrValid, *r),
            padding: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
            size: Decodable::decode(r)?,
            lock_owner: Decodable::decode(r)?,
            atime: Decodable::decode(r)?,
            mtime: Decodable::decode(r)?,
            ctime: Decodable::decode(r)?,
            atimensec: Decodable::decode(r)?,
            mtimensec: Decodable::decode(r)?,
            ctimensec: Decodable::decode(r)?,
            mode: Decodable::decode(r)?,
            uid: Decodable::decode(r)?,
            gid: Decodable::decode(r)?,
        })
    }
}

impl Decodable for OpenIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(OpenIn {
            header: Decodable::decode(r)?,
            flags: Decodable::decode(r)?,
            mode: Decodable::decode(r)?,
        })
    }
}

impl Decodable for OpenOut {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(OpenOut {
            fh: Decodable::decode(r)?,
            open_flags: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for CreateIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(CreateIn {
            header: Decodable::decode(r)?,
            flags: Decodable::decode(r)?,
            mode: Decodable::decode(r)?,
            umask: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for CreateOut {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(CreateOut {
            entry: Decodable::decode(r)?,
            open: Decodable::decode(r)?,
        })
    }
}

impl Decodable for ReadIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(ReadIn {
            header: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
            offset: Decodable::decode(r)?,
            size: Decodable::decode(r)?,
            read_flags: Decodable::decode(r)?,
        })
    }
}

impl Decodable for WriteIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(WriteIn {
            header: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
            offset: Decodable::decode(r)?,
            size: Decodable::decode(r)?,
            write_flags: Decodable::decode(r)?,
        })
    }
}

impl Decodable for ReleaseIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(ReleaseIn {
            header: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
            flags: Decodable::decode(r)?,
            release_flags: Decodable::decode(r)?,
            lock_owner: Decodable::decode(r)?,
        })
    }
}

impl Decodable for FlushIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(FlushIn {
            header: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
            unused: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
            lock_owner: Decodable::decode(r)?,
        })
    }
}

impl Decodable for FsyncIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(FsyncIn {
            header: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
            fsync_flags: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for MknodIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(MknodIn {
            header: Decodable::decode(r)?,
            mode: Decodable::decode(r)?,
            rdev: Decodable::decode(r)?,
            umask: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for MkdirIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(MkdirIn {
            header: Decodable::decode(r)?,
            mode: Decodable::decode(r)?,
            umask: Decodable::decode(r)?,
        })
    }
}

impl Decodable for RenameIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(RenameIn {
            header: Decodable::decode(r)?,
            newdir: Decodable::decode(r)?,
            flags: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for LinkIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(LinkIn {
            header: Decodable::decode(r)?,
            oldnodeid: Decodable::decode(r)?,
        })
    }
}

impl Decodable for AccessIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(AccessIn {
            header: Decodable::decode(r)?,
            mask: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for FileLock {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(FileLock {
            start: Decodable::decode(r)?,
            end: Decodable::decode(r)?,
            typ: Decodable::decode(r)?,
            pid: Decodable::decode(r)?,
        })
    }
}

impl Decodable for LkIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(LkIn {
            header: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
            owner: Decodable::decode(r)?,
            lk: Decodable::decode(r)?,
            lk_flags: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for LkOut {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(LkOut {
            lk: Decodable::decode(r)?,
        })
    }
}

impl Decodable for FallocateIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(FallocateIn {
            header: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
            offset: Decodable::decode(r)?,
            length: Decodable::decode(r)?,
            mode: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for LseekIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(LseekIn {
            header: Decodable::decode(r)?,
            fh: Decodable::decode(r)?,
            offset: Decodable::decode(r)?,
            whence: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for LseekOut {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(LseekOut {
            offset: Decodable::decode(r)?,
        })
    }
}

impl Decodable for CopyFileRangeIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(CopyFileRangeIn {
            header: Decodable::decode(r)?,
            fh_in: Decodable::decode(r)?,
            off_in: Decodable::decode(r)?,
            nodeid_out: Decodable::decode(r)?,
            fh_out: Decodable::decode(r)?,
            off_out: Decodable::decode(r)?,
            len: Decodable::decode(r)?,
            flags: Decodable::decode(r)?,
        })
    }
}

impl Decodable for SetXAttrIn {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(SetXAttrIn {
            header: Decodable::decode(r)?,
            size: Decodable::decode(r)?,
            flags: Decodable::decode(r)?,
        })
    }
}

impl Decodable for StatFsOut {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(StatFsOut {
            blocks: Decodable::decode(r)?,
            bfree: Decodable::decode(r)?,
            bavail: Decodable::decode(r)?,
            files: Decodable::decode(r)?,
            ffree: Decodable::decode(r)?,
            bsize: Decodable::decode(r)?,
            namelen: Decodable::decode(r)?,
            frsize: Decodable::decode(r)?,
            padding: Decodable::decode(r)?,
        })
    }
}

impl Decodable for DirEntry {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        Ok(DirEntry {
            ino: Decodable::decode(r)?,
            mode: Decodable::decode(r)?,
            name: Decodable::decode(r)?,
        })
    }
}

impl Decodable for DirEntryBatch {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        let count: u32 = Decodable::decode(r)?;
        let mut entries: Vec<DirEntry> = Vec::with_capacity(count as usize);
        for _ in 0..count {
            entries.push(Decodable::decode(r)?);
        }
        Ok(DirEntryBatch::with(entries))
    }
}

impl Decodable for Msg {
    fn decode<R: ReadBytesExt>(r: &mut R) -> Result<Self> {
        use crate::wire::MsgType::*;

        let mut buf = r;

        let msg_type = MsgType::from_u8(decode!(buf));
        let tag = decode!(buf);
        let body = match msg_type {
            Some(TLookup) => FsCall::TLookup {
                header: decode!(buf),
                name: decode!(buf),
            },
            Some(RLookup) => FsCall::RLookup {
                status: decode!(buf),
                entry: decode!(buf),
            },
            Some(TForget) => FsCall::TForget {
                header: decode!(buf),
                nlookup: decode!(buf),
            },
            Some(RForget) => FsCall::RForget,
            Some(TGetAttr) => FsCall::TGetAttr { arg: decode!(buf) },
            Some(RGetAttr) => FsCall::RGetAttr {
                status: decode!(buf),
                attr_out: decode!(buf),
            },
            Some(TSetAttr) => FsCall::TSetAttr { arg: decode!(buf) },
            Some(RSetAttr) => FsCall::RSetAttr {
                status: decode!(buf),
                attr_out: decode!(buf),
            },
            Some(TReadlink) => FsCall::TReadlink {
                header: decode!(buf),
            },
            Some(RReadlink) => FsCall::RReadlink {
                status: decode!(buf),
                target: decode!(buf),
            },
            Some(TSymlink) => FsCall::TSymlink {
                header: decode!(buf),
                target: decode!(buf),
                name: decode!(buf),
            },
            Some(RSymlink) => FsCall::RSymlink {
                status: decode!(buf),
                entry: decode!(buf),
            },
            Some(TMknod) => FsCall::TMknod {
                arg: decode!(buf),
                name: decode!(buf),
            },
            Some(RMknod) => FsCall::RMknod {
                status: decode!(buf),
                entry: decode!(buf),
            },
            Some(TMkdir) => FsCall::TMkdir {
                arg: decode!(buf),
                name: decode!(buf),
            },
            Some(RMkdir) => FsCall::RMkdir {
                status: decode!(buf),
                entry: decode!(buf),
            },
            Some(TUnlink) => FsCall::TUnlink {
                header: decode!(buf),
                name: decode!(buf),
            },
            Some(RUnlink) => FsCall::RUnlink {
                status: decode!(buf),
            },
            Some(TRmdir) => FsCall::TRmdir {
                header: decode!(buf),
                name: decode!(buf),
            },
            Some(RRmdir) => FsCall::RRmdir {
                status: decode!(buf),
            },
            Some(TRename) => FsCall::TRename {
                arg: decode!(buf),
                old_name: decode!(buf),
                new_name: decode!(buf),
            },
            Some(RRename) => FsCall::RRename {
                status: decode!(buf),
            },
            Some(TLink) => FsCall::TLink {
                arg: decode!(buf),
                name: decode!(buf),
            },
            Some(RLink) => FsCall::RLink {
                status: decode!(buf),
                entry: decode!(buf),
            },
            Some(TAccess) => FsCall::TAccess { arg: decode!(buf) },
            Some(RAccess) => FsCall::RAccess {
                status: decode!(buf),
            },
            Some(TOpen) => FsCall::TOpen { arg: decode!(buf) },
            Some(ROpen) => FsCall::ROpen {
                status: decode!(buf),
                open_out: decode!(buf),
            },
            Some(TCreate) => FsCall::TCreate {
                arg: decode!(buf),
                name: decode!(buf),
            },
            Some(RCreate) => FsCall::RCreate {
                status: decode!(buf),
                create_out: decode!(buf),
            },
            Some(TRead) => FsCall::TRead { arg: decode!(buf) },
            Some(RReadChunk) => FsCall::RReadChunk {
                status: decode!(buf),
                data: decode!(buf),
            },
            Some(TWrite) => FsCall::TWrite {
                arg: decode!(buf),
                data: decode!(buf),
            },
            Some(RWrite) => FsCall::RWrite {
                status: decode!(buf),
                count: decode!(buf),
            },
            Some(TFlush) => FsCall::TFlush { arg: decode!(buf) },
            Some(RFlush) => FsCall::RFlush {
                status: decode!(buf),
            },
            Some(TRelease) => FsCall::TRelease { arg: decode!(buf) },
            Some(RRelease) => FsCall::RRelease,
            Some(TFsync) => FsCall::TFsync { arg: decode!(buf) },
            Some(RFsync) => FsCall::RFsync {
                status: decode!(buf),
            },
            Some(TFallocate) => FsCall::TFallocate { arg: decode!(buf) },
            Some(RFallocate) => FsCall::RFallocate {
                status: decode!(buf),
            },
            Some(TLseek) => FsCall::TLseek { arg: decode!(buf) },
            Some(RLseek) => FsCall::RLseek {
                status: decode!(buf),
                lseek_out: decode!(buf),
            },
            Some(TCopyFileRange) => FsCall::TCopyFileRange { arg: decode!(buf) },
            Some(RCopyFileRange) => FsCall::RCopyFileRange {
                status: decode!(buf),
                count: decode!(buf),
            },
            Some(TOpenDir) => FsCall::TOpenDir { arg: decode!(buf) },
            Some(ROpenDir) => FsCall::ROpenDir {
                status: decode!(buf),
                open_out: decode!(buf),
            },
            Some(TReadDir) => FsCall::TReadDir { arg: decode!(buf) },
            Some(RDirChunk) => FsCall::RDirChunk {
                status: decode!(buf),
                entries: decode!(buf),
            },
            Some(TReadDirPlus) => FsCall::TReadDirPlus { arg: decode!(buf) },
            Some(TReleaseDir) => FsCall::TReleaseDir { arg: decode!(buf) },
            Some(RReleaseDir) => FsCall::RReleaseDir,
            Some(TFsyncDir) => FsCall::TFsyncDir { arg: decode!(buf) },
            Some(RFsyncDir) => FsCall::RFsyncDir {
                status: decode!(buf),
            },
            Some(TStatFs) => FsCall::TStatFs {
                header: decode!(buf),
            },
            Some(RStatFs) => FsCall::RStatFs {
                status: decode!(buf),
                statfs: decode!(buf),
            },
            Some(TGetLk) => FsCall::TGetLk { arg: decode!(buf) },
            Some(RGetLk) => FsCall::RGetLk {
                status: decode!(buf),
                lk_out: decode!(buf),
            },
            Some(TSetLk) => FsCall::TSetLk { arg: decode!(buf) },
            Some(RSetLk) => FsCall::RSetLk {
                status: decode!(buf),
            },
            Some(TSetLkw) => FsCall::TSetLkw { arg: decode!(buf) },
            Some(RSetLkw) => FsCall::RSetLkw {
                status: decode!(buf),
            },
            Some(TGetXAttr) => FsCall::TGetXAttr {
                header: decode!(buf),
                attr: decode!(buf),
                size: decode!(buf),
            },
            Some(RGetXAttr) => FsCall::RGetXAttr {
                status: decode!(buf),
                size: decode!(buf),
                data: decode!(buf),
            },
            Some(TSetXAttr) => FsCall::TSetXAttr {
                arg: decode!(buf),
                attr: decode!(buf),
                data: decode!(buf),
            },
            Some(RSetXAttr) => FsCall::RSetXAttr {
                status: decode!(buf),
            },
            Some(TListXAttr) => FsCall::TListXAttr {
                header: decode!(buf),
                size: decode!(buf),
            },
            Some(RListXAttr) => FsCall::RListXAttr {
                status: decode!(buf),
                size: decode!(buf),
                data: decode!(buf),
            },
            Some(TRemoveXAttr) => FsCall::TRemoveXAttr {
                header: decode!(buf),
                attr: decode!(buf),
            },
            Some(RRemoveXAttr) => FsCall::RRemoveXAttr {
                status: decode!(buf),
            },
            Some(TInterrupt) => FsCall::TInterrupt {
                oldtag: decode!(buf),
            },
            Some(REos) => FsCall::REos,
            Some(RAbort) => FsCall::RAbort {
                code: decode!(buf),
                message: decode!(buf),
            },
            None => return res!(io_err!(Other, "Invalid message type")),
        };

        Ok(Msg { tag, body })
    }
}

/// Helper function to read a protocol message from a byte-oriented stream
pub fn read_msg<R: ReadBytesExt>(r: &mut R) -> Result<Msg> {
    Decodable::decode(r)
}

/// Helper function to write a protocol message into a byte-oriented stream
pub fn write_msg<W: WriteBytesExt>(w: &mut W, msg: &Msg) -> Result<usize> {
    msg.encode(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::AbortCode;
    use std::io::Cursor;

    fn roundtrip(msg: Msg) {
        let mut buf = Vec::new();
        msg.encode(&mut buf).unwrap();
        let mut readbuf = Cursor::new(buf);
        let actual: Msg = Decodable::decode(&mut readbuf).unwrap();
        assert_eq!(msg, actual);
    }

    #[test]
    fn lookup_roundtrip() {
        roundtrip(Msg {
            tag: 0xdead,
            body: FsCall::TLookup {
                header: InHeader {
                    length: 48,
                    opcode: 1,
                    unique: 99,
                    nodeid: 1,
                    uid: 1000,
                    gid: 1000,
                    pid: 4242,
                    padding: 0,
                },
                name: b"hello.txt".to_vec(),
            },
        });
    }

    #[test]
    fn getattr_reply_roundtrip() {
        roundtrip(Msg {
            tag: 7,
            body: FsCall::RGetAttr {
                status: Status::OK,
                attr_out: AttrOut {
                    attr_valid: 1,
                    attr: Attr {
                        ino: 42,
                        size: 4096,
                        mode: 0o100644,
                        nlink: 1,
                        ..Attr::default()
                    },
                    ..AttrOut::default()
                },
            },
        });
    }

    #[test]
    fn error_status_travels_as_payload() {
        roundtrip(Msg {
            tag: 3,
            body: FsCall::RUnlink {
                status: Status::EACCES,
            },
        });
    }

    #[test]
    fn dir_chunk_roundtrip() {
        let entries = vec![
            DirEntry {
                ino: 2,
                mode: 0o040000,
                name: b"foo".to_vec(),
            },
            DirEntry {
                ino: 3,
                mode: 0o100000,
                name: b"foo2".to_vec(),
            },
        ];
        roundtrip(Msg {
            tag: 11,
            body: FsCall::RDirChunk {
                status: Status::OK,
                entries: DirEntryBatch::with(entries),
            },
        });
    }

    #[test]
    fn read_chunk_roundtrip() {
        roundtrip(Msg {
            tag: 5,
            body: FsCall::RReadChunk {
                status: Status::OK,
                data: Data(b"hello world".to_vec()),
            },
        });
    }

    #[test]
    fn write_roundtrip() {
        roundtrip(Msg {
            tag: 9,
            body: FsCall::TWrite {
                arg: WriteIn {
                    fh: 4,
                    offset: 8192,
                    size: 5,
                    ..WriteIn::default()
                },
                data: Data(b"bytes".to_vec()),
            },
        });
    }

    #[test]
    fn setattr_valid_bits_roundtrip() {
        roundtrip(Msg {
            tag: 2,
            body: FsCall::TSetAttr {
                arg: SetAttrIn {
                    valid: SetAttrValid::MODE | SetAttrValid::SIZE | SetAttrValid::MTIME,
                    size: 100,
                    mode: 0o600,
                    ..SetAttrIn::default()
                },
            },
        });
    }

    #[test]
    fn control_messages_roundtrip() {
        roundtrip(Msg {
            tag: 1,
            body: FsCall::TInterrupt { oldtag: 17 },
        });
        roundtrip(Msg {
            tag: 17,
            body: FsCall::REos,
        });
        roundtrip(Msg {
            tag: 17,
            body: FsCall::RAbort {
                code: AbortCode::Unimplemented.to_u8(),
                message: "method Lseek not implemented".to_owned(),
            },
        });
    }

    #[test]
    fn invalid_message_type_is_rejected() {
        // Type 53 is deliberately unassigned.
        let bytes = vec![53u8, 0, 0];
        let mut readbuf = Cursor::new(bytes);
        let res: Result<Msg> = Decodable::decode(&mut readbuf);
        assert!(res.is_err());
    }

    #[test]
    fn statfs_roundtrip() {
        roundtrip(Msg {
            tag: 6,
            body: FsCall::RStatFs {
                status: Status::OK,
                statfs: StatFsOut {
                    blocks: 1 << 30,
                    bfree: 1 << 29,
                    bavail: 1 << 28,
                    files: 1 << 20,
                    ffree: 1 << 19,
                    bsize: 4096,
                    namelen: 255,
                    frsize: 4096,
                    padding: 0,
                },
            },
        });
    }
}
