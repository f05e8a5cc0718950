//! Block and section decoding.
//!
//! A block is the compression and I/O unit of a table. After the
//! compression tag has been stripped and the payload decompressed, it
//! looks like this:
//!
//! ```text
//! [Section 0]
//! [Section 1]
//! ...
//! [Section N-1]
//! [Offset of Section 1: u32]
//! ...
//! [Offset of Section N-1: u32]
//! [Section count N: u32]
//! ```
//!
//! Section 0 always starts at offset 0, so only the offsets of sections
//! 1..N are stored. Each section is a run of entries sharing a delta
//! base: the first key is absolute, subsequent keys are deltas against
//! their predecessor, and every value is prefixed by its varint length.
//!
//! The payload buffer is leased from the shared pool and handed back by
//! [`BlockReader::release`]; sections and values are zero-copy views
//! into it.

use std::ops::Range;
use std::sync::Arc;

use crate::codec;
use crate::error::{Error, Result};
use crate::pool;

/// BlockReader decodes a single block.
#[derive(Debug)]
pub struct BlockReader {
    data: Arc<Vec<u8>>,
    bpos: usize,
    scnt: usize,
    max_key: u64,
}

impl BlockReader {
    /// Wraps a decompressed block payload.
    ///
    /// `bpos` is the block's position within the table and `max_key` the
    /// largest key it holds, both taken from the block index.
    pub(crate) fn new(data: Vec<u8>, bpos: usize, max_key: u64) -> Result<Self> {
        if data.len() < 4 {
            pool::release(data);
            return Err(Error::corruption("block too small"));
        }

        let scnt = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap()) as usize;
        if scnt == 0 || scnt * 4 > data.len() {
            pool::release(data);
            return Err(Error::corruption("invalid section count"));
        }

        Ok(Self { data: Arc::new(data), bpos, scnt, max_key })
    }

    /// An empty placeholder block at position `bpos`, used when the
    /// requested position lies outside the table.
    pub(crate) fn sentinel(bpos: usize) -> Self {
        Self { data: Arc::new(Vec::new()), bpos, scnt: 0, max_key: 0 }
    }

    /// Returns the position of this block within the table.
    pub fn pos(&self) -> usize {
        self.bpos
    }

    /// Returns the number of sections in this block.
    pub fn num_sections(&self) -> usize {
        self.scnt
    }

    /// Returns a reader for a single section. Positions past the end
    /// yield an empty sentinel section at position `num_sections()`.
    pub fn get_section(&self, spos: usize) -> SectionReader {
        if spos >= self.scnt {
            return SectionReader::empty(self.scnt);
        }

        let min = self.section_offset(spos);
        let max = self.section_offset(spos + 1);
        if min > max || max > self.data.len() - self.scnt * 4 {
            return SectionReader::corrupted(spos);
        }

        SectionReader::new(Arc::clone(&self.data), min..max, spos)
    }

    /// Returns the section that may contain `key`: the one whose first
    /// key is the largest first key ≤ `key`. Keys beyond the block's
    /// maximum yield the past-end sentinel.
    pub fn seek_section(&self, key: u64) -> SectionReader {
        if key > self.max_key {
            return self.get_section(self.scnt);
        }

        // Find the first section whose first key is > key; the answer
        // is the section before it.
        let mut left = 0;
        let mut right = self.scnt;
        while left < right {
            let mid = (left + right) / 2;
            if self.first_key(mid) > key {
                right = mid;
            } else {
                left = mid + 1;
            }
        }

        self.get_section(left.saturating_sub(1))
    }

    /// Returns the payload buffer to the shared pool. The reader and any
    /// sections borrowed from it must not be used afterwards.
    pub fn release(self) {
        if let Ok(buf) = Arc::try_unwrap(self.data) {
            pool::release(buf);
        }
    }

    /// The absolute first key of a section, used to steer the section
    /// search.
    fn first_key(&self, spos: usize) -> u64 {
        let off = self.section_offset(spos);
        match codec::uvarint(&self.data[off..]) {
            Ok((key, _)) => key,
            Err(_) => u64::MAX,
        }
    }

    /// The starting offset of a section within the block.
    fn section_offset(&self, spos: usize) -> usize {
        if spos < 1 {
            0
        } else if spos >= self.scnt {
            self.data.len() - self.scnt * 4
        } else {
            let nn = self.data.len() - self.scnt * 4 + (spos - 1) * 4;
            u32::from_le_bytes(self.data[nn..nn + 4].try_into().unwrap()) as usize
        }
    }
}

/// SectionReader iterates over the entries of an individual section
/// within a block.
#[derive(Debug)]
pub struct SectionReader {
    data: Arc<Vec<u8>>,
    bounds: Range<usize>,

    spos: usize,
    read: usize,

    key: u64,
    val: Range<usize>,
    corrupt: bool,
}

impl SectionReader {
    fn new(data: Arc<Vec<u8>>, bounds: Range<usize>, spos: usize) -> Self {
        Self { data, bounds, spos, read: 0, key: 0, val: 0..0, corrupt: false }
    }

    /// An exhausted section at position `spos`, holding no data.
    pub(crate) fn empty(spos: usize) -> Self {
        Self::new(Arc::new(Vec::new()), 0..0, spos)
    }

    fn corrupted(spos: usize) -> Self {
        let mut section = Self::empty(spos);
        section.corrupt = true;
        section
    }

    /// Returns the position of this section within its block.
    pub fn pos(&self) -> usize {
        self.spos
    }

    /// Returns the key of the current entry.
    pub fn key(&self) -> u64 {
        self.key
    }

    /// Returns the value of the current entry. Values are views into
    /// the block buffer and must be copied if used beyond the next
    /// cursor move or the block's release.
    pub fn value(&self) -> &[u8] {
        &self.data[self.val.clone()]
    }

    /// Returns true if more entries can be read from this section.
    pub fn more(&self) -> bool {
        self.bounds.start + self.read < self.bounds.end
    }

    /// Advances the cursor to the next entry, returning true on
    /// success.
    pub fn next(&mut self) -> bool {
        if self.more() {
            let (inc, n) = match codec::uvarint(self.rest()) {
                Ok(dec) => dec,
                Err(_) => return self.fail(),
            };
            self.read += n;
            self.key = self.key.wrapping_add(inc);
        }

        if self.more() {
            let (vlen, n) = match codec::uvarint(self.rest()) {
                Ok(dec) => dec,
                Err(_) => return self.fail(),
            };
            self.read += n;

            let start = self.bounds.start + self.read;
            let end = match usize::try_from(vlen).ok().and_then(|v| start.checked_add(v)) {
                Some(end) if end <= self.bounds.end => end,
                _ => return self.fail(),
            };
            self.val = start..end;
            self.read += end - start;
            return true;
        }

        false
    }

    /// Positions the cursor immediately before the first entry with a
    /// key ≥ `key`, so that the next call to [`next`](Self::next)
    /// produces it. Returns false if the section is exhausted first.
    pub fn seek(&mut self, key: u64) -> bool {
        while self.more() {
            let (inc, n) = match codec::uvarint(self.rest()) {
                Ok(dec) => dec,
                Err(_) => return self.fail(),
            };
            self.read += n;
            self.key = self.key.wrapping_add(inc);

            if self.key >= key {
                // Unread the delta so next() decodes it cleanly.
                self.read -= n;
                self.key = self.key.wrapping_sub(inc);
                return true;
            }

            if self.more() {
                let (vlen, n) = match codec::uvarint(self.rest()) {
                    Ok(dec) => dec,
                    Err(_) => return self.fail(),
                };
                self.read += n;

                let start = self.bounds.start + self.read;
                let end = match usize::try_from(vlen).ok().and_then(|v| start.checked_add(v)) {
                    Some(end) if end <= self.bounds.end => end,
                    _ => return self.fail(),
                };
                self.val = start..end;
                self.read += end - start;
            }
        }
        false
    }

    /// Reports whether the cursor hit malformed data.
    pub(crate) fn is_corrupt(&self) -> bool {
        self.corrupt
    }

    fn rest(&self) -> &[u8] {
        &self.data[self.bounds.start + self.read..self.bounds.end]
    }

    // Latch corruption and exhaust the cursor so more() turns false.
    fn fail(&mut self) -> bool {
        self.corrupt = true;
        self.read = self.bounds.end - self.bounds.start;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    // Assembles a raw block payload from (key, value) runs, one run per
    // section.
    fn build_block(sections: &[&[(u64, &[u8])]]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut soffs = Vec::new();

        for entries in sections {
            soffs.push(buf.len() as u32);
            let mut last = 0u64;
            for (i, (key, value)) in entries.iter().enumerate() {
                let skey = if i == 0 { *key } else { key - last };
                codec::put_uvarint(&mut buf, skey);
                codec::put_uvarint(&mut buf, value.len() as u64);
                buf.put_slice(value);
                last = *key;
            }
        }

        for &off in &soffs {
            if off > 0 {
                buf.put_u32_le(off);
            }
        }
        buf.put_u32_le(soffs.len() as u32);
        buf
    }

    fn sample_block() -> BlockReader {
        let data = build_block(&[
            &[(10, b"ten" as &[u8]), (12, b"twelve"), (14, b"fourteen")],
            &[(20, b"twenty" as &[u8]), (25, b"twentyfive")],
            &[(30, b"thirty" as &[u8])],
        ]);
        BlockReader::new(data, 0, 30).unwrap()
    }

    #[test]
    fn test_block_sections() {
        let block = sample_block();
        assert_eq!(block.num_sections(), 3);
        assert_eq!(block.pos(), 0);

        assert_eq!(block.get_section(0).pos(), 0);
        assert_eq!(block.get_section(1).pos(), 1);
        assert_eq!(block.get_section(2).pos(), 2);

        // Past-end positions clamp to an empty sentinel.
        assert_eq!(block.get_section(3).pos(), 3);
        assert_eq!(block.get_section(7).pos(), 3);
        assert!(!block.get_section(3).more());
    }

    #[test]
    fn test_block_seek_section() {
        let block = sample_block();

        assert_eq!(block.seek_section(0).pos(), 0);
        assert_eq!(block.seek_section(10).pos(), 0);
        assert_eq!(block.seek_section(19).pos(), 0);
        assert_eq!(block.seek_section(20).pos(), 1);
        assert_eq!(block.seek_section(29).pos(), 1);
        assert_eq!(block.seek_section(30).pos(), 2);

        // Beyond the block's max key lies the past-end sentinel.
        assert_eq!(block.seek_section(31).pos(), 3);
    }

    #[test]
    fn test_section_iterate() {
        let block = sample_block();
        let mut section = block.get_section(0);

        assert!(section.more());
        assert!(section.next());
        assert_eq!(section.key(), 10);
        assert_eq!(section.value(), b"ten");

        assert!(section.next());
        assert_eq!(section.key(), 12);
        assert_eq!(section.value(), b"twelve");

        assert!(section.next());
        assert_eq!(section.key(), 14);
        assert_eq!(section.value(), b"fourteen");

        assert!(!section.more());
        assert!(!section.next());
    }

    #[test]
    fn test_section_seek() {
        let block = sample_block();

        let mut section = block.get_section(0);
        assert!(section.seek(12));
        assert!(section.next());
        assert_eq!(section.key(), 12);

        // Seeking between keys positions before the next larger one.
        let mut section = block.get_section(0);
        assert!(section.seek(11));
        assert!(section.next());
        assert_eq!(section.key(), 12);

        // Seeking past the section's last key exhausts it.
        let mut section = block.get_section(0);
        assert!(!section.seek(15));
        assert!(!section.more());
    }

    #[test]
    fn test_section_empty_values() {
        let data = build_block(&[&[(1, b"" as &[u8]), (2, b""), (3, b"x")]]);
        let block = BlockReader::new(data, 0, 3).unwrap();

        let mut section = block.get_section(0);
        assert!(section.next());
        assert_eq!(section.key(), 1);
        assert_eq!(section.value(), b"");
        assert!(section.next());
        assert_eq!(section.key(), 2);
        assert_eq!(section.value(), b"");
        assert!(section.next());
        assert_eq!(section.key(), 3);
        assert_eq!(section.value(), b"x");
        assert!(!section.next());
    }

    #[test]
    fn test_block_too_small() {
        assert!(matches!(
            BlockReader::new(vec![0, 0], 0, 0),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_block_bad_section_count() {
        // Count of zero.
        assert!(matches!(
            BlockReader::new(vec![0, 0, 0, 0], 0, 0),
            Err(Error::Corruption(_))
        ));

        // Count larger than the block could hold.
        let mut data = vec![0u8; 8];
        data[4..].copy_from_slice(&100u32.to_le_bytes());
        assert!(matches!(
            BlockReader::new(data, 0, 0),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_section_value_overruns() {
        // One entry claiming a 100-byte value with only two bytes left.
        let mut buf = Vec::new();
        codec::put_uvarint(&mut buf, 5u64);
        codec::put_uvarint(&mut buf, 100u64);
        buf.put_slice(&[0xaa, 0xbb]);
        buf.put_u32_le(1);

        let block = BlockReader::new(buf, 0, 5).unwrap();
        let mut section = block.get_section(0);

        assert!(!section.next());
        assert!(section.is_corrupt());
        assert!(!section.more());
    }

    #[test]
    fn test_section_truncated_varint() {
        // A lone continuation byte is not a complete key delta.
        let mut buf = vec![0x80u8];
        buf.put_u32_le(1);

        let block = BlockReader::new(buf, 0, 5).unwrap();
        let mut section = block.get_section(0);

        assert!(!section.next());
        assert!(section.is_corrupt());
    }
}
