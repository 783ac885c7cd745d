//! Synthetic constant database generation, for benchmarks and fixtures.

extern crate constdb;
#[macro_use]
extern crate log;
extern crate rand;

use constdb::{Result, Writer};
use rand::{Rng, SeedableRng, StdRng};
use std::io::{Seek, Write};

/// Shape of a generated database. The same spec always yields the same
/// file, byte for byte.
pub struct GenSpec {
    pub count: u32,
    pub seed: u64,
    pub value_size: usize,
}

impl GenSpec {
    fn rng(&self) -> StdRng {
        let mut seed = [0u8; 32];
        for (i, b) in seed.iter_mut().enumerate() {
            *b = (self.seed >> ((i % 8) * 8)) as u8;
        }
        StdRng::from_seed(seed)
    }
}

/// Writes `spec.count` records to `file`: keys `key0`, `key1`, ... each
/// mapped to `spec.value_size` seeded pseudo random bytes.
pub fn generate<F: Write + Seek>(file: &mut F, spec: &GenSpec) -> Result<()> {
    let mut rng = spec.rng();

    {
        let mut w = Writer::new(file)?;
        for i in 0..spec.count {
            let key = format!("key{}", i);
            let mut val = vec![0u8; spec.value_size];
            rng.fill(&mut val[..]);
            w.put(key.as_bytes(), &val)?;
        }
    }

    debug!("wrote {} records of {} value bytes", spec.count, spec.value_size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use constdb::CDB;
    use std::io::Cursor;

    #[test]
    fn generation_is_deterministic_and_readable() {
        let spec = GenSpec {
            count: 500,
            seed: 7,
            value_size: 16,
        };

        let mut a = Cursor::new(Vec::new());
        let mut b = Cursor::new(Vec::new());
        generate(&mut a, &spec).unwrap();
        generate(&mut b, &spec).unwrap();

        let (a, b) = (a.into_inner(), b.into_inner());
        assert_eq!(a, b);

        let cdb = CDB::from_bytes(a, None).unwrap();
        assert_eq!(cdb.get(b"key0").unwrap().map(|v| v.len()), Some(16));
        assert!(cdb.get(b"key499").unwrap().is_some());
        assert_eq!(cdb.get(b"key500").unwrap(), None);
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = Cursor::new(Vec::new());
        let mut b = Cursor::new(Vec::new());
        generate(&mut a, &GenSpec { count: 10, seed: 1, value_size: 8 }).unwrap();
        generate(&mut b, &GenSpec { count: 10, seed: 2, value_size: 8 }).unwrap();
        assert_ne!(a.into_inner(), b.into_inner());
    }
}
