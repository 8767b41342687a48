//! Atomic JSON file helpers for the universe cache and batch checkpoints.
//!
//! A file is always written to a `.tmp` sibling first and renamed into place,
//! so a file that exists under its final name is always complete. Presence of
//! the final name is the only resumability signal the pipeline trusts.

use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::errors::GenerateError;

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), GenerateError> {
    let tmp = path.with_extension("tmp");
    let mut writer = BufWriter::new(File::create(&tmp)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, GenerateError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("0001.json");
        write_json_atomic(&path, &vec![1u32, 2, 3]).expect("write");
        assert!(!path.with_extension("tmp").exists());
        let values: Vec<u32> = read_json(&path).expect("read");
        assert_eq!(values, [1, 2, 3]);
    }
}
