// for docs on the 'failure' crate see https://boats.gitlab.io/failure/intro.html

#[derive(Debug, Fail)]
pub enum CDBError {
    #[fail(
        display = "read of {} bytes at offset {} out of range for a source of {} bytes",
        len, offset, source_len
    )]
    ReadOutOfRange {
        offset: u64,
        len: usize,
        source_len: usize,
    },

    #[fail(
        display = "table {} points at offset {}, inside the primary index",
        table, ptr
    )]
    BadTablePointer { table: usize, ptr: u32 },

    #[fail(
        display = "key of {} bytes hashes to 0, the empty slot sentinel",
        key_len
    )]
    ZeroHashKey { key_len: usize },
}

impl CDBError {
    pub fn read_out_of_range(offset: u64, len: usize, source_len: usize) -> CDBError {
        CDBError::ReadOutOfRange {
            offset,
            len,
            source_len,
        }
    }

    pub fn bad_table_pointer(table: usize, ptr: u32) -> CDBError {
        CDBError::BadTablePointer { table, ptr }
    }

    pub fn zero_hash_key(key_len: usize) -> CDBError {
        CDBError::ZeroHashKey { key_len }
    }
}
