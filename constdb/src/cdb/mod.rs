pub use self::errors::CDBError;
pub use self::source::{CDBData, LoadOption, ReadAt, Source};
use bytes::{Buf, BufMut, Bytes, BytesMut, IntoBuf};
use failure;

use std::fmt;
use std::fs::File;
use std::io::prelude::*;
use std::io::SeekFrom;
use std::path::Path;
use std::result;

pub mod errors;
pub mod source;

pub const STARTING_HASH: u32 = 5381;
const MAIN_TABLE_SIZE: usize = 256;
const MAIN_TABLE_SIZE_BYTES: usize = 2048;
const END_TABLE_ENTRY_SIZE: usize = 8;
const RECORD_HEADER_SIZE: usize = 8;

pub type Result<T> = result::Result<T, failure::Error>;

/// An injectable hash function: a pure mapping from key bytes to a 32 bit
/// value. The hash is part of the file format, so a database answers
/// correctly only under the function it was built with; `None` everywhere
/// selects [`cdb_hash`].
pub type HashFn = fn(&[u8]) -> u32;

/// The canonical cdb hash: `h = h * 33 ^ b` over the key bytes, starting
/// from 5381, in wrapping u32 arithmetic.
pub fn cdb_hash(bytes: &[u8]) -> u32 {
    CDBHash::new(bytes).inner()
}

#[derive(Copy, Clone, Default, Eq, PartialEq)]
pub(crate) struct CDBHash(u32);

impl CDBHash {
    fn new(bytes: &[u8]) -> Self {
        let mut h = STARTING_HASH;

        for b in bytes {
            // wrapping ops here: hashing relies on modular arithmetic, and
            // plain u32 arithmetic panics on overflow in debug builds
            h = h.wrapping_shl(5).wrapping_add(h) ^ (*b as u32)
        }
        CDBHash(h)
    }

    #[inline]
    fn table(&self) -> usize {
        self.0 as usize % MAIN_TABLE_SIZE
    }

    #[inline]
    fn slot(&self, num_ents: usize) -> usize {
        (self.0 as usize >> 8) % num_ents
    }

    #[inline]
    fn inner(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for CDBHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CDBHash(0x{:08x})", self.0)
    }
}

/// One primary index entry: the absolute offset and slot count of a
/// secondary hash table.
#[derive(Copy, Clone, Default)]
pub(crate) struct Bucket {
    ptr: u32,
    num_ents: u32,
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "Bucket {{ ptr: {:>#010x}, num_ents: {:>#010x} }}",
            self.ptr, self.num_ents
        )
    }
}

impl Bucket {
    // returns the offset into the db of slot n of this bucket's table.
    // panics if n >= num_ents
    fn entry_n_pos(&self, n: usize) -> IndexEntryPos {
        assert!(n < self.num_ents as usize);
        IndexEntryPos(self.ptr as u64 + (n * END_TABLE_ENTRY_SIZE) as u64)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct IndexEntryPos(u64);

impl From<IndexEntryPos> for u64 {
    fn from(n: IndexEntryPos) -> Self {
        n.0
    }
}

#[derive(Copy, Clone, Default)]
pub(crate) struct IndexEntry {
    hash: CDBHash, // the hash of the stored key
    ptr: u32,      // pointer to the absolute position of the record in the db
}

/// A read-only constant database over a byte source.
///
/// The handle owns the source, the bound hash function, and the 256 entry
/// primary index, which is decoded exactly once at open time. Nothing
/// mutates after construction, so lookups are safe from concurrent threads
/// for any source with positioned reads.
pub struct CDB<S> {
    source: S,
    hasher: HashFn,
    index: [Bucket; MAIN_TABLE_SIZE],
}

impl<S: ReadAt> CDB<S> {
    /// Opens a database over an arbitrary byte source, reading and decoding
    /// the primary index. Fails if the index cannot be read in full; no
    /// partially constructed database is ever returned.
    pub fn from_source(source: S, hasher: Option<HashFn>) -> Result<CDB<S>> {
        let mut index = [Bucket::default(); MAIN_TABLE_SIZE];

        {
            let mut scratch = [0u8; MAIN_TABLE_SIZE_BYTES];
            let mut buf = source.read_at(&mut scratch, 0)?.into_buf();

            for (i, bucket) in index.iter_mut().enumerate() {
                let ptr = buf.get_u32_le();
                let num_ents = buf.get_u32_le();

                if num_ents > 0 && (ptr as usize) < MAIN_TABLE_SIZE_BYTES {
                    return Err(CDBError::bad_table_pointer(i, ptr).into());
                }
                *bucket = Bucket { ptr, num_ents };
            }
        }

        Ok(CDB {
            source,
            hasher: hasher.unwrap_or(cdb_hash),
            index,
        })
    }

    /// Looks `key` up under the database's bound hash function.
    ///
    /// `Ok(None)` means the key is not present, a normal outcome distinct
    /// from both an error and an empty value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.lookup(key, CDBHash((self.hasher)(key)))
    }

    /// Looks `key` up under a hash the caller already computed, e.g. to
    /// reuse one hash across repeated lookups or to sidestep the bound
    /// function for a single query.
    pub fn get_with_hash(&self, key: &[u8], hash: u32) -> Result<Option<Bytes>> {
        self.lookup(key, CDBHash(hash))
    }

    /// Looks `key` up under the canonical cdb hash, whatever function the
    /// database was opened with.
    pub fn get_with_cdb_hash(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.lookup(key, CDBHash::new(key))
    }

    /// Closes the database, releasing the byte source. For a file backed
    /// database this closes the descriptor; resident buffers are freed or
    /// unmapped.
    pub fn close(self) -> Result<()> {
        drop(self);
        Ok(())
    }

    #[inline]
    fn index_entry_at(&self, pos: IndexEntryPos) -> Result<IndexEntry> {
        let mut scratch = [0u8; END_TABLE_ENTRY_SIZE];
        let mut buf = self.source.read_at(&mut scratch, pos.into())?.into_buf();

        let hash = CDBHash(buf.get_u32_le());
        let ptr = buf.get_u32_le();

        Ok(IndexEntry { hash, ptr })
    }

    #[inline]
    fn record_header_at(&self, pos: u64) -> Result<(usize, usize)> {
        let mut scratch = [0u8; RECORD_HEADER_SIZE];
        let mut buf = self.source.read_at(&mut scratch, pos)?.into_buf();

        let ksize = buf.get_u32_le() as usize;
        let vsize = buf.get_u32_le() as usize;

        Ok((ksize, vsize))
    }

    fn lookup(&self, key: &[u8], hash: CDBHash) -> Result<Option<Bytes>> {
        let bucket = self.index[hash.table()];
        if bucket.num_ents == 0 {
            trace!("table {} is empty, returning none", hash.table());
            return Ok(None);
        }

        let num_ents = bucket.num_ents as usize;
        let slot = hash.slot(num_ents);

        for x in 0..num_ents {
            let idx_ent = self.index_entry_at(bucket.entry_n_pos((x + slot) % num_ents))?;

            // 0 is reserved as the empty sentinel, and the writer leaves no
            // holes on a probe path before its terminator
            if idx_ent.hash.inner() == 0 {
                return Ok(None);
            }
            if idx_ent.hash != hash {
                continue;
            }

            let (ksize, vsize) = self.record_header_at(idx_ent.ptr as u64)?;
            if ksize != key.len() {
                // full hash collision with a different key
                trace!("{:?} collides on a {} byte key", hash, ksize);
                continue;
            }

            let mut rec = vec![0u8; ksize + vsize];
            let data = self
                .source
                .read_at(&mut rec, idx_ent.ptr as u64 + RECORD_HEADER_SIZE as u64)?;
            if &data[..ksize] == key {
                return Ok(Some(Bytes::from(&data[ksize..])));
            }
        }

        Ok(None)
    }
}

impl CDB<File> {
    /// Opens the file at `path` read-only under the canonical cdb hash.
    /// Lookups issue positioned reads against the descriptor and never move
    /// a shared cursor.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<CDB<File>> {
        Self::from_source(File::open(path)?, None)
    }
}

impl CDB<CDBData> {
    /// Loads the whole database into memory, onto the heap or mmapped, and
    /// opens it under the canonical cdb hash.
    pub fn load(source: Source, lopt: LoadOption) -> Result<CDB<CDBData>> {
        CDBData::new(source, lopt).and_then(|data| Self::from_source(data, None))
    }

    /// Opens a database over bytes already resident in memory.
    pub fn from_bytes<T: Into<CDBData>>(data: T, hasher: Option<HashFn>) -> Result<CDB<CDBData>> {
        Self::from_source(data.into(), hasher)
    }
}

fn ready_buf(size: usize) -> BytesMut {
    let mut b = BytesMut::with_capacity(size);
    b.reserve(size);
    b
}

// lays one bucket out as an open addressed table with twice as many slots
// as entries, so every probe path ends in an empty terminator
fn place_slots(entries: &[IndexEntry]) -> Vec<IndexEntry> {
    let mut slots = vec![IndexEntry::default(); entries.len() * 2];

    for ent in entries {
        let mut at = ent.hash.slot(slots.len());
        while slots[at].ptr != 0 {
            at = (at + 1) % slots.len();
        }
        slots[at] = *ent;
    }

    slots
}

/// Builds a database file. Records accumulate with `put`; the secondary
/// tables and the primary index are written out when the writer drops, and
/// only then is the file complete.
pub struct Writer<'a, F>
where
    F: Write + Seek + 'a,
{
    file: &'a mut F,
    hasher: HashFn,
    index: Vec<Vec<IndexEntry>>,
}

impl<'a, F> Writer<'a, F>
where
    F: Write + Seek + 'a,
{
    /// Starts a database at the beginning of `file` under the canonical cdb
    /// hash, reserving room for the primary index.
    pub fn new(file: &'a mut F) -> Result<Writer<'a, F>> {
        Self::with_hash(file, cdb_hash)
    }

    /// As `new`, with a caller supplied hash function. Readers must open
    /// the resulting file with the same function.
    pub fn with_hash(file: &'a mut F, hasher: HashFn) -> Result<Writer<'a, F>> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&[0u8; MAIN_TABLE_SIZE_BYTES])?;

        Ok(Writer {
            file,
            hasher,
            index: vec![Vec::new(); MAIN_TABLE_SIZE],
        })
    }

    fn seek(&mut self, sf: SeekFrom) -> Result<u32> {
        self.file.seek(sf).map(|n| n as u32).map_err(|e| e.into())
    }

    /// Appends one record. Keys may repeat; lookups return the first record
    /// written under a key.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let hash = CDBHash((self.hasher)(key));
        if hash.inner() == 0 {
            // the format cannot represent such a key: its slot would read
            // as the empty terminator
            return Err(CDBError::zero_hash_key(key.len()).into());
        }

        let ptr = self.seek(SeekFrom::Current(0))?;
        let mut buf = ready_buf(RECORD_HEADER_SIZE + key.len() + value.len());

        buf.put_u32_le(key.len() as u32);
        buf.put_u32_le(value.len() as u32);
        buf.extend_from_slice(key);
        buf.extend_from_slice(value);

        self.file.write_all(&buf[..])?;

        self.index[hash.table()].push(IndexEntry { hash, ptr });
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        // the secondary tables go down in one forward pass at EOF; their
        // offsets are known arithmetically, so the primary index can be
        // assembled alongside and filled in afterwards
        let mut table_at = self.seek(SeekFrom::End(0))?;
        let mut primary = ready_buf(MAIN_TABLE_SIZE_BYTES);

        for entries in &self.index {
            let slots = place_slots(entries);

            primary.put_u32_le(table_at);
            primary.put_u32_le(slots.len() as u32);
            table_at += (slots.len() * END_TABLE_ENTRY_SIZE) as u32;

            let mut buf = ready_buf(slots.len() * END_TABLE_ENTRY_SIZE);
            for ent in slots {
                buf.put_u32_le(ent.hash.inner());
                buf.put_u32_le(ent.ptr);
            }
            self.file.write_all(&buf[..])?;
        }

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&primary[..])?;

        // leave the cursor at BOF
        self.file.seek(SeekFrom::Start(0))?;

        Ok(())
    }
}

impl<'a, F> Drop for Writer<'a, F>
where
    F: Write + Seek + 'a,
{
    fn drop(&mut self) {
        self.finalize().unwrap();
    }
}
