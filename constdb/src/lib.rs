//! Read-only constant key/value databases.
//!
//! A constant database maps byte-string keys to byte-string values. It is
//! built once, offline, and never modified afterwards; lookups are O(1)
//! expected time, lock free, and need no per-query heap state beyond the
//! returned value. The file layout:
//!
//! ```text
//! +----------------+---------+--------+--------+-----+----------+
//! | p0 p1 ... p255 | records | table0 | table1 | ... | table255 |
//! +----------------+---------+--------+--------+-----+----------+
//! ```
//!
//! The leading 2048 bytes hold 256 little-endian `(offset, length)` pairs,
//! one per secondary hash table. A record is `(key_len, val_len, key,
//! value)` with little-endian u32 lengths; a table slot is `(hash,
//! record_offset)` and is empty when the hash is zero. A key's hash picks
//! the table by its low 8 bits and the starting slot by the remaining 24,
//! and a linear probe ends at a matching record or an empty slot.

extern crate bytes;
extern crate failure;
#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;
extern crate memmap;

// dev dependencies
#[cfg(test)]
extern crate env_logger;
#[cfg(test)]
#[macro_use]
extern crate proptest;
#[cfg(test)]
extern crate tempfile;

pub use cdb::{cdb_hash, CDBData, CDBError, HashFn, LoadOption, ReadAt, Result, Source, Writer,
              CDB};
pub use memmap::Mmap;

pub mod cdb;
