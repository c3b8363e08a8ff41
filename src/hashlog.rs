//! Shared append-only transaction-hash file.
//!
//! The file is written by the transfer generator and drained by pull-mode
//! ingestion, one `0x`-prefixed transaction hash per line. Every access,
//! including the read that precedes a truncate, takes an exclusive advisory
//! lock so a concurrent writer never loses a hash mid-write and a reader
//! never observes a half-truncated file. Lock acquisition is try-lock with
//! an explicit [`HashLogError::Contention`] failure; callers retry on their
//! next tick instead of blocking.

use alloy::primitives::B256;
use fs2::FileExt;
use std::{
    fs::OpenOptions,
    io::{Read, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::HashLogError;

#[derive(Debug, Clone)]
pub struct HashLog {
    path: PathBuf,
}

impl HashLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one transaction hash under the exclusive lock.
    pub fn append(&self, tx_hash: B256) -> Result<(), HashLogError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        lock(&file)?;

        let result = writeln!(&file, "{tx_hash}");
        // Closing the handle would release the lock anyway; unlock explicitly
        // so the error path is visible.
        let _ = FileExt::unlock(&file);
        result?;
        Ok(())
    }

    /// Read every hash in the file and truncate it to empty, all under one
    /// exclusive lock acquisition. Malformed lines are skipped with a
    /// warning. This is the at-least-once half of pull-mode ingestion: a
    /// crash between read and truncate replays the batch on the next run.
    pub fn drain(&self) -> Result<Vec<B256>, HashLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        lock(&file)?;

        let mut contents = String::new();
        let result = read_and_truncate(&mut file, &mut contents);
        let _ = FileExt::unlock(&file);
        result?;

        let mut hashes = Vec::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match B256::from_str(line) {
                Ok(hash) => hashes.push(hash),
                Err(e) => log::warn!("skipping malformed hash line {line:?}: {e}"),
            }
        }
        Ok(hashes)
    }
}

fn read_and_truncate(file: &mut std::fs::File, contents: &mut String) -> std::io::Result<()> {
    file.read_to_string(contents)?;
    file.set_len(0)?;
    Ok(())
}

fn lock(file: &std::fs::File) -> Result<(), HashLogError> {
    file.try_lock_exclusive().map_err(|e| {
        if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
            HashLogError::Contention
        } else {
            HashLogError::Io(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn hash(b: u8) -> B256 {
        B256::repeat_byte(b)
    }

    #[test]
    fn append_then_drain_round_trips() {
        let dir = tempdir().unwrap();
        let log = HashLog::new(dir.path().join("hash.txt"));

        log.append(hash(1)).unwrap();
        log.append(hash(2)).unwrap();

        let drained = log.drain().unwrap();
        assert_eq!(drained, vec![hash(1), hash(2)]);

        // File is truncated: a second drain sees nothing
        assert!(log.drain().unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "");
    }

    #[test]
    fn missing_file_drains_empty() {
        let dir = tempdir().unwrap();
        let log = HashLog::new(dir.path().join("absent.txt"));
        assert!(log.drain().unwrap().is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hash.txt");
        std::fs::write(
            &path,
            format!("{}\nnot-a-hash\n\n{}\n", hash(3), hash(4)),
        )
        .unwrap();

        let log = HashLog::new(&path);
        assert_eq!(log.drain().unwrap(), vec![hash(3), hash(4)]);
    }

    #[test]
    fn drain_under_held_lock_reports_contention() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hash.txt");
        let log = HashLog::new(&path);
        log.append(hash(5)).unwrap();

        // Hold the lock through an independent handle
        let holder = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        holder.try_lock_exclusive().unwrap();

        match log.drain() {
            Err(HashLogError::Contention) => {}
            other => panic!("expected contention, got {other:?}"),
        }

        FileExt::unlock(&holder).unwrap();
        assert_eq!(log.drain().unwrap(), vec![hash(5)]);
    }
}
