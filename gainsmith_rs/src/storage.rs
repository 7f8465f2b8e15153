use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use polars::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Outcome of a guarded CSV write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No file existed at the destination.
    Created,
    /// The existing file had identical contents and was left untouched.
    Reused,
    /// The existing file differed and was replaced because the caller
    /// acknowledged the change.
    Overwritten,
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("Unable to open {} for hashing", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hash of the bytes `CsvWriter` would produce for `frame`, without touching
/// the filesystem.
pub fn sha256_frame_as_csv(frame: &mut DataFrame) -> Result<String> {
    let mut writer = HashingWriter::new(io::sink());
    CsvWriter::new(&mut writer)
        .include_header(true)
        .finish(frame)
        .context("Failed to hash feature frame")?;
    Ok(writer.finalize_hex())
}

/// Write `frame` to `path` unless an existing file with different contents
/// is there and `ack_new_df` is false.
///
/// Identical contents are reused so repeated runs over the same input keep
/// the file's mtime stable.
pub fn write_csv_guarded(
    frame: &mut DataFrame,
    path: &Path,
    ack_new_df: bool,
) -> Result<WriteOutcome> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut outcome = WriteOutcome::Created;
    if path.exists() {
        let old_hash = sha256_file(path)?;
        let new_hash = sha256_frame_as_csv(frame)?;
        if old_hash == new_hash {
            info!(
                rows = frame.height(),
                path = %path.display(),
                "Feature table unchanged; reusing existing {file_name}"
            );
            return Ok(WriteOutcome::Reused);
        }
        if !ack_new_df {
            return Err(anyhow!(
                "Existing {file_name} differs from the newly computed feature table.\n\
                 path: {}\n\
                 existing sha256: {old_hash}\n\
                 new sha256: {new_hash}\n\
                 Rerun with --ack-new-df to overwrite, or choose a fresh --output-dir to keep prior results.",
                path.display(),
            ));
        }
        warn!(
            existing_hash = %old_hash,
            new_hash = %new_hash,
            path = %path.display(),
            "Feature table hash mismatch; overwriting because ack_new_df=true"
        );
        outcome = WriteOutcome::Overwritten;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Unable to create {}", parent.display()))?;
    }
    let mut file =
        File::create(path).with_context(|| format!("Unable to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(frame)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        rows = frame.height(),
        columns = frame.width(),
        path = %path.display(),
        "Feature table written"
    );
    Ok(outcome)
}

/// `Write` adapter that feeds every byte through SHA-256 on its way to `inner`.
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_writer_matches_direct_digest() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"date,close\n").expect("write");
        writer.write_all(b"2024-01-02,10.5\n").expect("write");
        let expected = hex::encode(Sha256::digest(b"date,close\n2024-01-02,10.5\n"));
        assert_eq!(writer.finalize_hex(), expected);
    }

    #[test]
    fn frame_hash_matches_file_hash_after_write() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("frame.csv");
        let mut frame = DataFrame::new(vec![
            Series::new("date", &["2024-01-02", "2024-01-03"]),
            Series::new("close", &[10.5, 11.0]),
        ])?;
        let outcome = write_csv_guarded(&mut frame, &path, false)?;
        assert_eq!(outcome, WriteOutcome::Created);
        assert_eq!(sha256_file(&path)?, sha256_frame_as_csv(&mut frame)?);
        Ok(())
    }
}
