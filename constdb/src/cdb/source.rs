use memmap::Mmap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::{fs, fs::File};

use cdb::errors::CDBError;
use cdb::Result;

/// Positioned, exact-length reads against an immutable byte source.
///
/// `read_at` returns exactly `scratch.len()` bytes starting at `offset`.
/// A source with resident data hands back a subslice of itself and leaves
/// `scratch` untouched; a file backed source fills `scratch` with a
/// positioned read and returns it. Fewer bytes than requested is an error,
/// never a short result.
pub trait ReadAt {
    fn read_at<'a>(&'a self, scratch: &'a mut [u8], offset: u64) -> Result<&'a [u8]>;
}

pub enum Source<'a> {
    Path(PathBuf),
    File(&'a mut fs::File),
}

impl<'a> From<PathBuf> for Source<'a> {
    fn from(pb: PathBuf) -> Self {
        Source::Path(pb)
    }
}

impl<'a> From<&'a mut fs::File> for Source<'a> {
    fn from(f: &'a mut File) -> Self {
        Source::File(f)
    }
}

/// A database resident in memory, either copied onto the heap or mmapped.
/// Lookups against it issue no syscalls at all.
pub enum CDBData {
    Boxed(Box<[u8]>),
    Mmapped(Mmap),
}

impl CDBData {
    pub fn new(source: Source, lopt: LoadOption) -> Result<CDBData> {
        match (source, lopt) {
            (Source::Path(pb), LoadOption::HEAP) => {
                Self::load_bytes_at_path(&pb).map(CDBData::Boxed)
            }
            (Source::Path(pb), LoadOption::MMAP) => Self::mmap_path(&pb).map(CDBData::Mmapped),
            (Source::File(ref mut f), LoadOption::HEAP) => {
                Self::load_bytes_from_file(f).map(CDBData::Boxed)
            }
            (Source::File(ref mut f), LoadOption::MMAP) => {
                Self::mmap_file(f).map(CDBData::Mmapped)
            }
        }
    }

    fn load_bytes_from_file(f: &mut File) -> Result<Box<[u8]>> {
        let mut buffer = Vec::with_capacity(f.metadata()?.len() as usize);
        f.read_to_end(&mut buffer)?;
        Ok(buffer.into_boxed_slice())
    }

    fn load_bytes_at_path(path: &Path) -> Result<Box<[u8]>> {
        let mut f = File::open(path)?;
        Self::load_bytes_from_file(&mut f)
    }

    fn mmap_path(path: &Path) -> Result<Mmap> {
        let f = File::open(path)?;
        Self::mmap_file(&f)
    }

    fn mmap_file(f: &File) -> Result<Mmap> {
        unsafe { Mmap::map(f) }.map_err(|e| e.into())
    }
}

impl From<Mmap> for CDBData {
    fn from(m: Mmap) -> Self {
        CDBData::Mmapped(m)
    }
}

impl From<Box<[u8]>> for CDBData {
    fn from(b: Box<[u8]>) -> Self {
        CDBData::Boxed(b)
    }
}

impl From<Vec<u8>> for CDBData {
    fn from(v: Vec<u8>) -> Self {
        CDBData::from(v.into_boxed_slice())
    }
}

impl AsRef<[u8]> for CDBData {
    fn as_ref(&self) -> &[u8] {
        match self {
            CDBData::Mmapped(map) => &map[..],
            CDBData::Boxed(bx) => &bx[..],
        }
    }
}

impl ReadAt for CDBData {
    fn read_at<'a>(&'a self, scratch: &'a mut [u8], offset: u64) -> Result<&'a [u8]> {
        let data = self.as_ref();
        let oob = || CDBError::read_out_of_range(offset, scratch.len(), data.len());

        if offset > data.len() as u64 {
            return Err(oob().into());
        }
        let start = offset as usize;
        let end = start
            .checked_add(scratch.len())
            .filter(|&end| end <= data.len())
            .ok_or_else(oob)?;

        Ok(&data[start..end])
    }
}

#[cfg(unix)]
impl ReadAt for File {
    fn read_at<'a>(&'a self, scratch: &'a mut [u8], offset: u64) -> Result<&'a [u8]> {
        use std::os::unix::fs::FileExt;

        FileExt::read_exact_at(self, scratch, offset)?;
        Ok(&scratch[..])
    }
}

#[cfg(windows)]
impl ReadAt for File {
    fn read_at<'a>(&'a self, scratch: &'a mut [u8], offset: u64) -> Result<&'a [u8]> {
        use std::io;
        use std::os::windows::fs::FileExt;

        let mut filled = 0;
        while filled < scratch.len() {
            let n = self.seek_read(&mut scratch[filled..], offset + filled as u64)?;
            if n == 0 {
                return Err(
                    io::Error::new(io::ErrorKind::UnexpectedEof, "short positioned read").into(),
                );
            }
            filled += n;
        }
        Ok(&scratch[..])
    }
}

pub enum LoadOption {
    HEAP = 1,
    MMAP = 2,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn buffer_reads_are_subslices() {
        let data = CDBData::from(vec![1u8, 2, 3, 4, 5]);
        let mut scratch = [0u8; 2];

        {
            let got = data.read_at(&mut scratch, 1).unwrap();
            assert_eq!(got, &[2u8, 3][..]);
        }
        // the read borrowed the resident data, not the scratch buffer
        assert_eq!(scratch, [0u8; 2]);

        let mut empty = [0u8; 0];
        assert_eq!(data.read_at(&mut empty, 5).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn buffer_reads_past_the_end_fail() {
        let data = CDBData::from(vec![0u8; 4]);

        assert!(data.read_at(&mut [0u8; 8], 0).is_err());
        assert!(data.read_at(&mut [0u8; 2], 3).is_err());
        assert!(data.read_at(&mut [0u8; 1], 9).is_err());
    }

    #[test]
    fn file_reads_match_buffer_reads() {
        let mut ntf = NamedTempFile::new().unwrap();
        ntf.write_all(b"0123456789").unwrap();

        let f = ntf.reopen().unwrap();
        let mut scratch = [0u8; 4];
        assert_eq!(f.read_at(&mut scratch, 3).unwrap(), b"3456");
        assert_eq!(f.read_at(&mut scratch, 0).unwrap(), b"0123");

        // short reads are errors, not truncated results
        assert!(f.read_at(&mut scratch, 8).is_err());
    }
}
