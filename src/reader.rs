//! Table reader implementation.
//!
//! Opening a reader parses the footer and materializes the block index
//! in memory; everything else is fetched on demand. Blocks are leased
//! from the shared buffer pool, decompressed if needed and sliced into
//! sections without copying.

use std::fs::File;
use std::mem;
use std::path::Path;

use crate::block::{BlockReader, SectionReader};
use crate::codec;
use crate::error::{Error, Result};
use crate::pool;
use crate::source::ReadAt;
use crate::{BlockInfo, BLOCK_NO_COMPRESSION, BLOCK_SNAPPY_COMPRESSION, FOOTER_SIZE, MAGIC};

/// Reader answers point lookups and forward scans over a table.
///
/// The reader itself is immutable after construction and can be shared
/// between threads; iterators and block readers obtained from it hold
/// mutable cursors and cannot.
///
/// Usage:
/// ```no_run
/// use numtable::Reader;
///
/// # fn main() -> Result<(), numtable::Error> {
/// let reader = Reader::open_path("table.ntb")?;
/// let value = reader.get(101)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Reader<R> {
    source: R,

    index: Vec<BlockInfo>,
    max_offset: u64, // end of the last block's payload
}

impl Reader<File> {
    /// Opens the table file at `path`, taking its size from the file
    /// metadata.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        Reader::open(file, size)
    }
}

impl<R: ReadAt> Reader<R> {
    /// Opens a reader over `size` bytes of `source`.
    ///
    /// Fails with [`Error::BadMagic`] if the trailing bytes are not the
    /// expected magic sequence.
    pub fn open(source: R, size: u64) -> Result<Self> {
        if size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("file too small to contain a footer"));
        }

        // Read and validate the footer.
        let footer_offset = size - FOOTER_SIZE as u64;
        let mut footer = [0u8; FOOTER_SIZE];
        source.read_at(&mut footer, footer_offset)?;

        if footer[8..] != MAGIC.to_le_bytes() {
            return Err(Error::BadMagic);
        }

        let index_offset = u64::from_le_bytes(footer[..8].try_into().unwrap());
        if index_offset > footer_offset {
            return Err(Error::corruption("block index offset past footer"));
        }

        // Walk the block index, undoing the delta encoding.
        let index_len = usize::try_from(footer_offset - index_offset)
            .map_err(|_| Error::corruption("block index too large"))?;
        let mut raw = vec![0u8; index_len];
        source.read_at(&mut raw, index_offset)?;

        let mut index = Vec::new();
        let mut info = BlockInfo::default();
        let mut pos = 0;
        while pos < raw.len() {
            let (dkey, n) = codec::uvarint(&raw[pos..])?;
            pos += n;
            let (doff, n) = codec::uvarint(&raw[pos..])?;
            pos += n;

            info.max_key = info.max_key.wrapping_add(dkey);
            info.offset = info.offset.wrapping_add(doff);
            index.push(info);
        }

        Ok(Self { source, index, max_offset: index_offset })
    }

    /// Returns the number of stored blocks.
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    /// Retrieves the value for `key`, allocating a fresh vector.
    ///
    /// Fails with [`Error::NotFound`] if the key is absent.
    pub fn get(&self, key: u64) -> Result<Vec<u8>> {
        let mut dst = Vec::new();
        self.append_to(&mut dst, key)?;
        Ok(dst)
    }

    /// Retrieves the value for `key` and appends it to `dst`, avoiding
    /// an intermediate allocation.
    ///
    /// Fails with [`Error::NotFound`] if the key is absent; `dst` is
    /// left untouched in that case.
    pub fn append_to(&self, dst: &mut Vec<u8>, key: u64) -> Result<()> {
        let mut iter = self.seek(key)?;

        if iter.next() && iter.key() == key {
            dst.extend_from_slice(iter.value());
            iter.release();
            return Ok(());
        }

        // A latched fetch or decode error outranks a plain miss.
        let err = iter.take_err();
        iter.release();
        match err {
            Some(e) => Err(e),
            None => Err(Error::NotFound),
        }
    }

    /// Returns an iterator positioned at the first entry with a key
    /// ≥ `key`.
    pub fn seek(&self, key: u64) -> Result<TableIterator<'_, R>> {
        let block = self.seek_block(key)?;
        let mut section = block.seek_section(key);
        section.seek(key);

        let mut iter = TableIterator { reader: self, block, section, err: None };
        if iter.section.is_corrupt() {
            iter.err = Some(Error::corruption("malformed section entry"));
        }
        Ok(iter)
    }

    /// Returns a reader for the block at position `bpos`. Positions
    /// past the end yield an empty sentinel block at `num_blocks()`.
    pub fn get_block(&self, bpos: usize) -> Result<BlockReader> {
        if self.index.is_empty() {
            return Ok(BlockReader::sentinel(0));
        }
        if bpos >= self.index.len() {
            return Ok(BlockReader::sentinel(self.index.len()));
        }
        self.read_block(bpos)
    }

    /// Returns a reader for the block that may contain `key`.
    pub fn seek_block(&self, key: u64) -> Result<BlockReader> {
        let bpos = self.index.partition_point(|info| info.max_key < key);
        self.get_block(bpos)
    }

    fn read_block(&self, bpos: usize) -> Result<BlockReader> {
        let min = self.index[bpos].offset;
        let max = if bpos + 1 < self.index.len() {
            self.index[bpos + 1].offset
        } else {
            self.max_offset
        };
        let len = max
            .checked_sub(min)
            .filter(|&len| len > 0)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or_else(|| Error::corruption("invalid block bounds in index"))?;

        let mut raw = pool::fetch(len);
        if let Err(e) = self.source.read_at(&mut raw, min) {
            pool::release(raw);
            return Err(e.into());
        }

        let max_key = self.index[bpos].max_key;
        let tag_pos = raw.len() - 1;
        match raw[tag_pos] {
            BLOCK_NO_COMPRESSION => {
                raw.truncate(tag_pos);
                BlockReader::new(raw, bpos, max_key)
            }
            BLOCK_SNAPPY_COMPRESSION => {
                let size = match snap::raw::decompress_len(&raw[..tag_pos]) {
                    Ok(size) => size,
                    Err(e) => {
                        pool::release(raw);
                        return Err(e.into());
                    }
                };

                let mut plain = pool::fetch(size);
                let result = snap::raw::Decoder::new().decompress(&raw[..tag_pos], &mut plain);
                pool::release(raw);

                match result {
                    Ok(n) => {
                        plain.truncate(n);
                        BlockReader::new(plain, bpos, max_key)
                    }
                    Err(e) => {
                        pool::release(plain);
                        Err(e.into())
                    }
                }
            }
            tag => {
                pool::release(raw);
                Err(Error::BadCompression(tag))
            }
        }
    }
}

/// TableIterator is a forward iterator over table entries, spanning
/// section and block boundaries.
///
/// Errors encountered while fetching or decoding blocks are latched:
/// [`more`](Self::more) and [`next`](Self::next) turn false and
/// [`err`](Self::err) exposes the cause.
pub struct TableIterator<'a, R> {
    reader: &'a Reader<R>,
    block: BlockReader,
    section: SectionReader,

    err: Option<Error>,
}

impl<'a, R: ReadAt> TableIterator<'a, R> {
    /// Returns the key of the current entry.
    pub fn key(&self) -> u64 {
        self.section.key()
    }

    /// Returns the value of the current entry. Values are views into
    /// the current block's buffer and must be copied if used beyond the
    /// next cursor move or release.
    pub fn value(&self) -> &[u8] {
        self.section.value()
    }

    /// Returns true if more entries can be read.
    pub fn more(&self) -> bool {
        if self.err.is_some() {
            return false;
        }

        self.section.more()
            || self.section.pos() + 1 < self.block.num_sections()
            || self.block.pos() + 1 < self.reader.num_blocks()
    }

    /// Advances the cursor to the next entry, returning true on
    /// success.
    pub fn next(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }

        // More entries in the current section.
        if self.section.more() {
            return self.advance_section();
        }

        // More sections in the current block.
        let spos = self.section.pos() + 1;
        if spos < self.block.num_sections() {
            self.section = self.block.get_section(spos);
            return self.advance_section();
        }

        // More blocks in the table.
        let bpos = self.block.pos() + 1;
        if bpos < self.reader.num_blocks() {
            match self.reader.get_block(bpos) {
                Ok(block) => {
                    // Drop the section's view before handing the old
                    // buffer back to the pool.
                    self.section = SectionReader::empty(0);
                    mem::replace(&mut self.block, block).release();
                    self.section = self.block.get_section(0);
                    self.advance_section()
                }
                Err(e) => {
                    self.err = Some(e);
                    false
                }
            }
        } else {
            false
        }
    }

    /// Exposes the latched iterator error, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Releases the iterator, returning its block buffer to the shared
    /// pool. All subsequent operations fail with [`Error::Released`].
    pub fn release(&mut self) {
        if matches!(self.err, Some(Error::Released)) {
            return;
        }

        self.section = SectionReader::empty(0);
        mem::replace(&mut self.block, BlockReader::sentinel(0)).release();
        self.err = Some(Error::Released);
    }

    pub(crate) fn take_err(&mut self) -> Option<Error> {
        self.err.take()
    }

    fn advance_section(&mut self) -> bool {
        let ok = self.section.next();
        if self.section.is_corrupt() {
            self.err = Some(Error::corruption("malformed section entry"));
            return false;
        }
        ok
    }
}
