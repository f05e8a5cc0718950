//! # numtable - A Sorted Numeric-Keyed Table Format
//!
//! numtable is an immutable, append-only, on-disk table format indexed by
//! 64-bit unsigned integer keys, in the spirit of SSTables but specialized
//! for dense, monotonically increasing numeric keys (sequence numbers,
//! timestamps) mapped to opaque byte values.
//!
//! A [`Writer`] accepts entries in strictly increasing key order and
//! produces the file; a [`Reader`] answers point lookups and forward range
//! scans over it.
//!
//! ## File Format
//!
//! A table is a series of blocks followed by a block index and a fixed
//! footer:
//!
//! ```text
//! +---------+---------+---------+-------------+--------------+
//! | block 1 |   ...   | block n | block index | footer (16B) |
//! +---------+---------+---------+-------------+--------------+
//! ```
//!
//! The block index stores one (max key, file offset) pair per block as
//! varints, each pair delta-encoded against the previous one. The footer
//! is the absolute index offset as a little-endian u64 followed by the
//! 8-byte magic.
//!
//! ## Block Format
//!
//! Each block holds one or more sections, a section offset table and a
//! section count, optionally snappy-compressed as a whole, then a single
//! trailing compression tag byte:
//!
//! ```text
//! +-----------+-------+-----------+------------------------+----------------+------------+
//! | section 1 |  ...  | section n | offsets 2..n (u32 each) | count n (u32) | tag (1B)  |
//! +-----------+-------+-----------+------------------------+----------------+------------+
//! ```
//!
//! Section 1 always starts at offset 0, so only the offsets of sections
//! 2..n are stored.
//!
//! ## Section Format
//!
//! A section is a run of entries sharing a delta base: the first key is
//! an absolute varint, each later key a varint delta from its
//! predecessor, every value prefixed by its varint length:
//!
//! ```text
//! +----------------+--------------+---------+----------------------+--------------+---------+------+
//! | key 1 (varint) | len (varint) | value 1 | key delta 2 (varint) | len (varint) | value 2 | ...  |
//! +----------------+--------------+---------+----------------------+--------------+---------+------+
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use numtable::{Reader, Writer, WriterOptions};
//!
//! # fn main() -> Result<(), numtable::Error> {
//! let mut file = Vec::new();
//! let mut writer = Writer::new(&mut file, WriterOptions::default());
//! writer.append(101, b"foo")?;
//! writer.append(102, b"bar")?;
//! writer.close()?;
//!
//! let size = file.len() as u64;
//! let reader = Reader::open(file, size)?;
//! assert_eq!(reader.get(102)?, b"bar");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod block;
mod codec;
pub mod config;
pub mod error;
mod pool;
pub mod reader;
pub mod source;
pub mod writer;

// Re-exports
pub use block::{BlockReader, SectionReader};
pub use config::{Compression, WriterOptions};
pub use error::{Error, Result};
pub use reader::{Reader, TableIterator};
pub use source::ReadAt;
pub use writer::Writer;

/// Default minimum uncompressed block size (4KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Default number of entries per section.
pub const DEFAULT_BLOCK_RESTART_INTERVAL: usize = 16;

/// Footer size in bytes (fixed).
pub const FOOTER_SIZE: usize = 16;

/// Magic number terminating every table file,
/// `47 27 86 BE 1F 7A 65 DB` in little-endian byte order.
pub const MAGIC: u64 = 0xDB65_7A1F_BE86_2747;

// Compression tag byte appended to each block on disk.
pub(crate) const BLOCK_NO_COMPRESSION: u8 = 0;
pub(crate) const BLOCK_SNAPPY_COMPRESSION: u8 = 1;

/// A single block index entry: the largest key stored in a block and the
/// block's starting offset within the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BlockInfo {
    pub max_key: u64,
    pub offset: u64,
}
