//! Table writer implementation.
//!
//! Entries are accumulated into an in-memory block buffer and flushed
//! once the next entry would push the uncompressed block past the
//! configured size. Closing the writer emits the final block, the
//! delta-encoded block index and the fixed footer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::mem;
use std::path::Path;

use bytes::{BufMut, BytesMut};

use crate::codec::{self, MAX_VARINT_LEN};
use crate::config::{Compression, WriterOptions};
use crate::error::{Error, Result};
use crate::{BlockInfo, BLOCK_NO_COMPRESSION, BLOCK_SNAPPY_COMPRESSION, FOOTER_SIZE, MAGIC};

/// Writer produces a table from entries appended in strictly increasing
/// key order.
///
/// Usage:
/// ```rust
/// use numtable::{Writer, WriterOptions};
///
/// # fn main() -> Result<(), numtable::Error> {
/// let mut buf = Vec::new();
/// let mut writer = Writer::new(&mut buf, WriterOptions::default());
/// writer.append(101, b"foo")?;
/// writer.append(102, b"bar")?;
/// writer.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Writer<W: Write> {
    sink: W,
    opts: WriterOptions,

    block: BlockInfo, // current block max-key, offset doubling as the file cursor
    blen: usize,      // entries in the current block
    soffs: Vec<u32>,  // section start offsets within the current block
    buf: BytesMut,    // uncompressed block under construction

    index: Vec<BlockInfo>,
    closed: bool,
}

impl Writer<BufWriter<File>> {
    /// Creates a table file at `path` and returns a writer for it.
    pub fn create<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Writer::new(BufWriter::new(file), options))
    }
}

impl<W: Write> Writer<W> {
    /// Wraps a byte sink and returns a writer. Zero-valued options fall
    /// back to their defaults.
    pub fn new(sink: W, options: WriterOptions) -> Self {
        Self {
            sink,
            opts: options.normalized(),
            block: BlockInfo::default(),
            blen: 0,
            soffs: Vec::new(),
            buf: BytesMut::new(),
            index: Vec::new(),
            closed: false,
        }
    }

    /// Appends an entry to the table.
    ///
    /// The key must be strictly greater than every previously appended
    /// key; violations fail with [`Error::OutOfOrder`] and leave the
    /// writer state untouched.
    pub fn append(&mut self, key: u64, value: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }

        if key <= self.block.max_key && (self.blen != 0 || !self.index.is_empty()) {
            return Err(Error::OutOfOrder { last: self.block.max_key, key });
        }

        if !self.buf.is_empty()
            && self.buf.len() + value.len() + 2 * MAX_VARINT_LEN > self.opts.block_size
        {
            self.flush()?;
        }

        let mut skey = key;
        if self.blen % self.opts.block_restart_interval == 0 {
            // New section: the key is stored in full.
            self.soffs.push(self.buf.len() as u32);
        } else {
            skey -= self.block.max_key;
        }

        codec::put_uvarint(&mut self.buf, skey);
        codec::put_uvarint(&mut self.buf, value.len() as u64);
        self.buf.put_slice(value);

        self.blen += 1;
        self.block.max_key = key;

        Ok(())
    }

    /// Closes the writer, emitting any pending block, the block index
    /// and the footer. A second close fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.flush()?;

        let index_offset = self.block.offset;
        self.write_index()?;
        self.write_footer(index_offset)?;
        self.sink.flush()?;

        self.closed = true;
        Ok(())
    }

    /// Frames and writes out the current block, if any.
    fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }

        // Section offset table: section 0 starts at offset 0 and is not
        // stored.
        for &off in &self.soffs {
            if off > 0 {
                self.buf.put_u32_le(off);
            }
        }
        self.buf.put_u32_le(self.soffs.len() as u32);

        // The index records the offset at which this block starts.
        self.index.push(self.block);

        let mut buf = mem::take(&mut self.buf);
        self.soffs.clear();
        self.blen = 0;

        let result = self.write_block(&buf);
        buf.clear();
        self.buf = buf;
        result
    }

    fn write_block(&mut self, plain: &[u8]) -> Result<()> {
        if self.opts.compression == Compression::Snappy {
            let snp = snap::raw::Encoder::new().compress_vec(plain)?;
            // Keep the compressed form only if it saves at least a
            // quarter of the payload.
            if snp.len() < plain.len() - plain.len() / 4 {
                self.write_raw(&snp)?;
                return self.write_raw(&[BLOCK_SNAPPY_COMPRESSION]);
            }
        }

        self.write_raw(plain)?;
        self.write_raw(&[BLOCK_NO_COMPRESSION])
    }

    fn write_index(&mut self) -> Result<()> {
        let mut tmp = BytesMut::with_capacity(2 * MAX_VARINT_LEN);
        let mut prev = BlockInfo::default();

        for i in 0..self.index.len() {
            let ent = self.index[i];
            let mut key = ent.max_key;
            let mut off = ent.offset;
            if i != 0 {
                key -= prev.max_key;
                off -= prev.offset;
            }
            prev = ent;

            tmp.clear();
            codec::put_uvarint(&mut tmp, key);
            codec::put_uvarint(&mut tmp, off);
            self.write_raw(&tmp)?;
        }
        Ok(())
    }

    fn write_footer(&mut self, index_offset: u64) -> Result<()> {
        let mut tmp = [0u8; FOOTER_SIZE];
        tmp[..8].copy_from_slice(&index_offset.to_le_bytes());
        tmp[8..].copy_from_slice(&MAGIC.to_le_bytes());
        self.write_raw(&tmp)
    }

    fn write_raw(&mut self, p: &[u8]) -> Result<()> {
        self.sink.write_all(p)?;
        self.block.offset += p.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_empty() {
        let mut buf = Vec::new();
        let mut writer = Writer::new(&mut buf, WriterOptions::default());
        writer.close().unwrap();

        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[..8], &[0u8; 8]);
        assert_eq!(&buf[8..], &MAGIC.to_le_bytes());
    }

    #[test]
    fn test_footer_magic() {
        let mut buf = Vec::new();
        let mut writer = Writer::new(&mut buf, WriterOptions::default());
        writer.append(1, b"one").unwrap();
        writer.close().unwrap();

        assert_eq!(
            &buf[buf.len() - 8..],
            &[0x47, 0x27, 0x86, 0xBE, 0x1F, 0x7A, 0x65, 0xDB]
        );
    }

    #[test]
    fn test_out_of_order_appends() {
        let mut buf = Vec::new();
        let mut writer = Writer::new(&mut buf, WriterOptions::default());
        let testdata = b"testdata";

        writer.append(20, testdata).unwrap();

        let err = writer.append(19, testdata).unwrap_err();
        assert_eq!(err.to_string(), "Out-of-order append: 19 must be > 20");

        // A failed append must not disturb the writer.
        writer.append(22, testdata).unwrap();

        let err = writer.append(20, testdata).unwrap_err();
        assert_eq!(err.to_string(), "Out-of-order append: 20 must be > 22");

        writer.append(23, testdata).unwrap();

        let err = writer.append(23, testdata).unwrap_err();
        assert_eq!(err.to_string(), "Out-of-order append: 23 must be > 23");

        writer.append(24, testdata).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_first_key_unconstrained() {
        // The first entry of a file has no predecessor, so even key 0
        // is accepted.
        let mut buf = Vec::new();
        let mut writer = Writer::new(&mut buf, WriterOptions::default());
        writer.append(0, b"zero").unwrap();
        writer.append(1, b"one").unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_closed() {
        let mut buf = Vec::new();
        let mut writer = Writer::new(&mut buf, WriterOptions::default());
        writer.append(1, b"one").unwrap();
        writer.close().unwrap();

        assert!(matches!(writer.append(2, b"two"), Err(Error::Closed)));
        assert!(matches!(writer.close(), Err(Error::Closed)));
    }

    #[test]
    fn test_zero_options_normalize() {
        let opts = WriterOptions {
            block_size: 0,
            block_restart_interval: 0,
            compression: Compression::None,
        };

        let mut buf = Vec::new();
        let mut writer = Writer::new(&mut buf, opts);
        for key in 0..100u64 {
            writer.append(key, &[0u8; 64]).unwrap();
        }
        writer.close().unwrap();

        // With a normalized 4KiB block size the hundred 64-byte entries
        // span more than one block but nowhere near a hundred.
        assert!(buf.len() > 4096);
    }

    #[test]
    fn test_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.ntb");

        let mut writer = Writer::create(&path, WriterOptions::default()).unwrap();
        writer.append(7, b"seven").unwrap();
        writer.close().unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[data.len() - 8..], &MAGIC.to_le_bytes());
    }
}
