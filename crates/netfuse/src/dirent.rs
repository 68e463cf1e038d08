//! Kernel directory-entry buffer codec.
//!
//! Directory listings cross the kernel boundary as a packed byte buffer of
//! fixed-layout records in host byte order:
//!
//! ```text
//! ino[8] off[8] namelen[4] typ[4] name[namelen] pad[0-7]
//! ```
//!
//! Each record is padded with zero bytes to the next 8-byte boundary. A
//! record whose `off` field is zero marks the end of valid data, which is
//! why the builder works on a zeroed buffer. For "plus" listings every
//! record is preceded by a fixed 128-byte attribute block.

use crate::ops::EntryOut;

/// Fixed portion of one record, before the name.
pub const DIRENT_HEADER_SIZE: usize = 24;

/// Size of the serialized [`EntryOut`] block preceding each record in a
/// readdirplus buffer.
pub const ENTRY_OUT_SIZE: usize = 128;

/// One directory entry as it travels between processes: the record's
/// `typ` field widened into a full `st_mode` file-type value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u64,
    /// File type bits in `st_mode` form (`S_IFMT` range)
    pub mode: u32,
    /// Raw name bytes, no encoding assumed
    pub name: Vec<u8>,
}

/// Widen a record's `typ` field (`d_type`) to `st_mode` file-type bits.
pub fn type_to_mode(typ: u32) -> u32 {
    (typ << 12) & 0o170000
}

/// Narrow `st_mode` file-type bits back to a record `typ` field.
pub fn mode_to_type(mode: u32) -> u32 {
    (mode & 0o170000) >> 12
}

fn padding_for(namelen: usize) -> usize {
    (8 - (namelen & 7)) & 7
}

/// Fixed-capacity builder for a kernel directory-entry buffer.
///
/// `add` appends one record if it fits and reports refusal otherwise; a
/// refused entry must be re-offered on the next listing request. Offsets
/// are assigned monotonically from the requested starting offset, so the
/// `off` of each record is the resume point just past it.
pub struct DirEntryList {
    buf: Vec<u8>,
    len: usize,
    offset: u64,
}

impl DirEntryList {
    /// A zeroed buffer of `capacity` bytes, continuing from `offset`.
    pub fn new(capacity: usize, offset: u64) -> DirEntryList {
        DirEntryList {
            buf: vec![0; capacity],
            len: 0,
            offset,
        }
    }

    /// Like [`new`](Self::new) but reusing `buf` as backing storage to
    /// avoid the allocation. Stale contents are zeroed.
    pub fn with_buffer(mut buf: Vec<u8>, capacity: usize, offset: u64) -> DirEntryList {
        buf.clear();
        buf.resize(capacity, 0);
        DirEntryList {
            buf,
            len: 0,
            offset,
        }
    }

    /// Appends one plain record. Returns `false`, leaving the buffer
    /// untouched, if the record does not fit.
    pub fn add(&mut self, entry: &DirEntry) -> bool {
        self.append(entry, None)
    }

    /// Appends one record preceded by its 128-byte attribute block, for
    /// readdirplus buffers.
    pub fn add_plus(&mut self, entry: &DirEntry, entry_out: &EntryOut) -> bool {
        self.append(entry, Some(entry_out))
    }

    fn append(&mut self, entry: &DirEntry, entry_out: Option<&EntryOut>) -> bool {
        let prefix = if entry_out.is_some() {
            ENTRY_OUT_SIZE
        } else {
            0
        };
        let rec_len = prefix + DIRENT_HEADER_SIZE + entry.name.len() + padding_for(entry.name.len());
        if self.len + rec_len > self.buf.len() {
            return false;
        }

        let mut pos = self.len;
        if let Some(out) = entry_out {
            write_entry_out(&mut self.buf[pos..pos + ENTRY_OUT_SIZE], out);
            pos += ENTRY_OUT_SIZE;
        }

        self.offset += 1;
        self.buf[pos..pos + 8].copy_from_slice(&entry.ino.to_ne_bytes());
        self.buf[pos + 8..pos + 16].copy_from_slice(&self.offset.to_ne_bytes());
        self.buf[pos + 16..pos + 20].copy_from_slice(&(entry.name.len() as u32).to_ne_bytes());
        self.buf[pos + 20..pos + 24].copy_from_slice(&mode_to_type(entry.mode).to_ne_bytes());
        pos += DIRENT_HEADER_SIZE;
        self.buf[pos..pos + entry.name.len()].copy_from_slice(&entry.name);
        // Padding is already zero: the backing buffer never holds stale
        // bytes past `len`.

        self.len += rec_len;
        true
    }

    /// The used portion of the buffer.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset of the last record added, the resume point for the next
    /// listing request.
    pub fn last_offset(&self) -> u64 {
        self.offset
    }

    /// Recovers the backing buffer for pooled reuse.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buf
    }
}

fn write_entry_out(dst: &mut [u8], out: &EntryOut) {
    let mut pos = 0;
    let put64 = |dst: &mut [u8], pos: &mut usize, v: u64| {
        dst[*pos..*pos + 8].copy_from_slice(&v.to_ne_bytes());
        *pos += 8;
    };
    let put32 = |dst: &mut [u8], pos: &mut usize, v: u32| {
        dst[*pos..*pos + 4].copy_from_slice(&v.to_ne_bytes());
        *pos += 4;
    };

    put64(dst, &mut pos, out.nodeid);
    put64(dst, &mut pos, out.generation);
    put64(dst, &mut pos, out.entry_valid);
    put64(dst, &mut pos, out.attr_valid);
    put32(dst, &mut pos, out.entry_valid_nsec);
    put32(dst, &mut pos, out.attr_valid_nsec);

    put64(dst, &mut pos, out.attr.ino);
    put64(dst, &mut pos, out.attr.size);
    put64(dst, &mut pos, out.attr.blocks);
    put64(dst, &mut pos, out.attr.atime);
    put64(dst, &mut pos, out.attr.mtime);
    put64(dst, &mut pos, out.attr.ctime);
    put32(dst, &mut pos, out.attr.atimensec);
    put32(dst, &mut pos, out.attr.mtimensec);
    put32(dst, &mut pos, out.attr.ctimensec);
    put32(dst, &mut pos, out.attr.mode);
    put32(dst, &mut pos, out.attr.nlink);
    put32(dst, &mut pos, out.attr.uid);
    put32(dst, &mut pos, out.attr.gid);
    put32(dst, &mut pos, out.attr.rdev);
    put32(dst, &mut pos, out.attr.blksize);
    put32(dst, &mut pos, out.attr.padding);
    debug_assert_eq!(pos, ENTRY_OUT_SIZE);
}

/// Bounds-checked iterator over the records of a kernel directory-entry
/// buffer.
///
/// `prefix` is [`ENTRY_OUT_SIZE`] for readdirplus buffers and `0`
/// otherwise; the attribute block is skipped, never interpreted. A zero
/// `off` field, a truncated header or a name running past the end of the
/// buffer all terminate iteration cleanly.
pub struct DirentIter<'a> {
    buf: &'a [u8],
    pos: usize,
    prefix: usize,
}

impl<'a> DirentIter<'a> {
    pub fn new(buf: &'a [u8]) -> DirentIter<'a> {
        DirentIter {
            buf,
            pos: 0,
            prefix: 0,
        }
    }

    pub fn with_prefix(buf: &'a [u8], prefix: usize) -> DirentIter<'a> {
        DirentIter {
            buf,
            pos: 0,
            prefix,
        }
    }
}

impl Iterator for DirentIter<'_> {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        let start = self.pos.checked_add(self.prefix)?;
        if start + DIRENT_HEADER_SIZE > self.buf.len() {
            return None;
        }

        let field = |off: usize, len: usize| &self.buf[start + off..start + off + len];
        let ino = u64::from_ne_bytes(field(0, 8).try_into().ok()?);
        let off = u64::from_ne_bytes(field(8, 8).try_into().ok()?);
        if off == 0 {
            return None;
        }
        let namelen = u32::from_ne_bytes(field(16, 4).try_into().ok()?) as usize;
        let typ = u32::from_ne_bytes(field(20, 4).try_into().ok()?);

        let name_start = start + DIRENT_HEADER_SIZE;
        if name_start + namelen > self.buf.len() {
            return None;
        }
        let name = self.buf[name_start..name_start + namelen].to_vec();

        self.pos = name_start + namelen + padding_for(namelen);
        Some(DirEntry {
            ino,
            mode: type_to_mode(typ),
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::Attr;

    fn entry(ino: u64, name: &str) -> DirEntry {
        DirEntry {
            ino,
            mode: 0o100000,
            name: name.as_bytes().to_vec(),
        }
    }

    #[test]
    fn build_and_parse_roundtrip() {
        let mut list = DirEntryList::new(4096, 0);
        assert!(list.add(&entry(2, "foo")));
        assert!(list.add(&entry(3, "foo2")));
        assert!(list.add(&entry(4, "foo3")));

        let parsed: Vec<DirEntry> = DirentIter::new(list.bytes()).collect();
        assert_eq!(parsed, vec![entry(2, "foo"), entry(3, "foo2"), entry(4, "foo3")]);
    }

    #[test]
    fn records_are_eight_byte_aligned() {
        for namelen in 1..=16usize {
            let name = "x".repeat(namelen);
            let mut list = DirEntryList::new(256, 0);
            assert!(list.add(&entry(1, &name)));
            assert_eq!(list.bytes().len() % 8, 0, "namelen {namelen}");
            assert!(list.bytes().len() >= DIRENT_HEADER_SIZE + namelen);
        }
    }

    #[test]
    fn full_list_refuses_and_preserves_contents() {
        let first = entry(1, "aaa");
        let rec = DIRENT_HEADER_SIZE + 8;
        let mut list = DirEntryList::new(rec, 0);
        assert!(list.add(&first));
        let snapshot = list.bytes().to_vec();

        assert!(!list.add(&entry(2, "bbb")));
        assert_eq!(list.bytes(), &snapshot[..]);

        let parsed: Vec<DirEntry> = DirentIter::new(list.bytes()).collect();
        assert_eq!(parsed, vec![first]);
    }

    #[test]
    fn offsets_resume_from_start_offset() {
        let mut list = DirEntryList::new(4096, 40);
        list.add(&entry(1, "a"));
        list.add(&entry(2, "b"));
        assert_eq!(list.last_offset(), 42);

        // The off field of the first record is 41.
        let off = u64::from_ne_bytes(list.bytes()[8..16].try_into().unwrap());
        assert_eq!(off, 41);
    }

    #[test]
    fn zero_off_terminates_iteration() {
        // A fully zeroed buffer parses as empty.
        let buf = vec![0u8; 256];
        assert_eq!(DirentIter::new(&buf).count(), 0);
    }

    #[test]
    fn truncated_name_terminates_iteration() {
        let mut list = DirEntryList::new(4096, 0);
        list.add(&entry(1, "hello"));
        let bytes = list.bytes();

        // Cut into the name: the half record must not be yielded.
        let cut = &bytes[..DIRENT_HEADER_SIZE + 2];
        assert_eq!(DirentIter::new(cut).count(), 0);
    }

    #[test]
    fn plus_records_carry_attribute_block() {
        let out = EntryOut {
            nodeid: 7,
            attr: Attr {
                ino: 7,
                mode: 0o040755,
                ..Attr::default()
            },
            ..EntryOut::default()
        };

        let mut list = DirEntryList::new(4096, 0);
        assert!(list.add_plus(&entry(7, "sub"), &out));

        // The record proper starts after the attribute block.
        let nodeid = u64::from_ne_bytes(list.bytes()[..8].try_into().unwrap());
        assert_eq!(nodeid, 7);

        let parsed: Vec<DirEntry> =
            DirentIter::with_prefix(list.bytes(), ENTRY_OUT_SIZE).collect();
        assert_eq!(parsed, vec![entry(7, "sub")]);
    }

    #[test]
    fn reused_buffer_starts_clean() {
        let mut list = DirEntryList::new(4096, 0);
        list.add(&entry(1, "leftover"));
        let buf = list.into_buffer();

        let list = DirEntryList::with_buffer(buf, 4096, 0);
        assert!(list.is_empty());
        assert_eq!(DirentIter::new(&list.buf).count(), 0);
    }

    #[test]
    fn type_mode_conversions() {
        assert_eq!(type_to_mode(4), 0o040000); // DT_DIR -> S_IFDIR
        assert_eq!(type_to_mode(8), 0o100000); // DT_REG -> S_IFREG
        assert_eq!(type_to_mode(10), 0o120000); // DT_LNK -> S_IFLNK
        assert_eq!(mode_to_type(0o040755), 4);
        assert_eq!(mode_to_type(0o100644), 8);
    }
}
