//! Splitting oversized results into bounded stream frames.
//!
//! The framed transport could carry larger messages, but the peer imposes
//! a per-message ceiling; staying well under it leaves headroom for the
//! envelope around each payload. Directory listings are split on logical
//! entry size so a batch never materializes more than the threshold;
//! read payloads are sliced into threshold-sized chunks.

use crate::dirent::DirEntry;

/// Default per-frame payload budget, comfortably below the peer's 4 MiB
/// message ceiling.
pub const MSG_SIZE_THRESHOLD: usize = 1 << 20;

/// Logical wire size of one directory entry: mode, ino and the name
/// bytes. An estimate, not the exact encoded size; the envelope overhead
/// is covered by the gap between the threshold and the message ceiling.
pub fn entry_estimate(entry: &DirEntry) -> usize {
    4 + 8 + entry.name.len()
}

/// Splits a directory listing into batches whose summed
/// [`entry_estimate`] stays at or below `threshold`.
///
/// An entry whose own estimate exceeds the threshold still travels,
/// alone in its own batch. An empty listing yields no batches; the
/// caller's end-of-stream marker covers that case.
pub struct EntryBatches {
    entries: std::vec::IntoIter<DirEntry>,
    pending: Option<DirEntry>,
    threshold: usize,
}

impl EntryBatches {
    pub fn new(entries: Vec<DirEntry>, threshold: usize) -> EntryBatches {
        EntryBatches {
            entries: entries.into_iter(),
            pending: None,
            threshold,
        }
    }
}

impl Iterator for EntryBatches {
    type Item = Vec<DirEntry>;

    fn next(&mut self) -> Option<Vec<DirEntry>> {
        let mut batch = Vec::new();
        let mut size = 0;

        while let Some(entry) = self.pending.take().or_else(|| self.entries.next()) {
            let estimate = entry_estimate(&entry);
            if !batch.is_empty() && size + estimate > self.threshold {
                self.pending = Some(entry);
                break;
            }
            size += estimate;
            batch.push(entry);
            if size >= self.threshold {
                break;
            }
        }

        if batch.is_empty() { None } else { Some(batch) }
    }
}

/// Slices a byte payload into chunks of at most `threshold` bytes.
///
/// Every chunk but the last is exactly `threshold` long. A zero-length
/// payload yields exactly one empty chunk, so a successful empty read
/// still produces a data frame before end-of-stream.
pub struct ByteChunks<'a> {
    data: &'a [u8],
    threshold: usize,
    done: bool,
}

impl<'a> ByteChunks<'a> {
    pub fn new(data: &'a [u8], threshold: usize) -> ByteChunks<'a> {
        assert!(threshold > 0);
        ByteChunks {
            data,
            threshold,
            done: false,
        }
    }
}

impl<'a> Iterator for ByteChunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.done {
            return None;
        }
        let take = self.data.len().min(self.threshold);
        let (chunk, rest) = self.data.split_at(take);
        self.data = rest;
        self.done = rest.is_empty();
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> DirEntry {
        DirEntry {
            ino: 1,
            mode: 0o100000,
            name: name.as_bytes().to_vec(),
        }
    }

    #[test]
    fn small_listing_fits_one_batch() {
        let entries = vec![entry("foo"), entry("foo2"), entry("foo3")];
        let batches: Vec<_> = EntryBatches::new(entries.clone(), MSG_SIZE_THRESHOLD).collect();
        assert_eq!(batches, vec![entries]);
    }

    #[test]
    fn batches_respect_threshold() {
        // Each entry estimates to 12 + 4 = 16; threshold 40 fits two.
        let entries: Vec<_> = (0..5).map(|i| entry(&format!("nm{i:02}"))).collect();
        let batches: Vec<_> = EntryBatches::new(entries, 40).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[2].len(), 1);
        for batch in &batches {
            assert!(batch.iter().map(entry_estimate).sum::<usize>() <= 40);
        }
    }

    #[test]
    fn oversized_entry_travels_alone() {
        let big = entry(&"n".repeat(100));
        let entries = vec![entry("a"), big.clone(), entry("b")];
        let batches: Vec<_> = EntryBatches::new(entries, 32).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1], vec![big]);
    }

    #[test]
    fn empty_listing_yields_no_batches() {
        assert_eq!(EntryBatches::new(Vec::new(), 32).count(), 0);
    }

    #[test]
    fn byte_chunks_split_exactly() {
        let chunks: Vec<_> = ByteChunks::new(b"hello world", 5).collect();
        assert_eq!(chunks, vec![&b"hello"[..], b" worl", b"d"]);
    }

    #[test]
    fn byte_chunks_exact_multiple() {
        let chunks: Vec<_> = ByteChunks::new(b"abcdef", 3).collect();
        assert_eq!(chunks, vec![&b"abc"[..], b"def"]);
    }

    #[test]
    fn empty_payload_yields_one_empty_chunk() {
        let chunks: Vec<_> = ByteChunks::new(b"", 5).collect();
        assert_eq!(chunks, vec![&b""[..]]);
    }
}
