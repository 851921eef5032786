// SPDX-License-Identifier: GPL-3.0-only

//! Snapshot files
//!
//! Saves composed frames as `{prefix}_{YYYYmmdd_HHMMSS_mmm}.{ext}`. Files are
//! opened with `create_new`, so a name that is already taken (two saves in
//! the same millisecond, or a leftover file) gets a `_N` suffix instead of
//! being overwritten.

use crate::errors::SnapshotError;
use chrono::{DateTime, Local};
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Give up after this many taken names for one timestamp
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Encoding used for snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Jpg,
    Png,
}

impl SnapshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Jpg => "jpg",
            SnapshotFormat::Png => "png",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            SnapshotFormat::Jpg => ImageFormat::Jpeg,
            SnapshotFormat::Png => ImageFormat::Png,
        }
    }
}

/// Writes snapshots into one directory
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    directory: PathBuf,
    prefix: String,
    format: SnapshotFormat,
}

impl SnapshotWriter {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>, format: SnapshotFormat) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            format,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Save `image` stamped with the current local time
    pub fn save(&self, image: &RgbImage) -> Result<PathBuf, SnapshotError> {
        self.save_at(image, Local::now())
    }

    /// Save `image` stamped with `timestamp`
    pub fn save_at(&self, image: &RgbImage, timestamp: DateTime<Local>) -> Result<PathBuf, SnapshotError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SnapshotError::NoFrame);
        }
        fs::create_dir_all(&self.directory)?;

        let stem = format!("{}_{}", self.prefix, timestamp.format("%Y%m%d_%H%M%S_%3f"));
        let ext = self.format.extension();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{}.{}", stem, ext)
            } else {
                format!("{}_{}.{}", stem, attempt, ext)
            };
            let path = self.directory.join(name);

            let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "Snapshot name taken");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if let Err(e) = self.encode(image, file) {
                // Don't leave a truncated image behind
                if let Err(remove_err) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %remove_err, "Failed to remove partial snapshot");
                }
                return Err(e);
            }

            info!(path = %path.display(), "Snapshot saved");
            return Ok(path);
        }

        Err(SnapshotError::Io(format!(
            "no free file name for {} after {} attempts",
            stem, MAX_NAME_ATTEMPTS
        )))
    }

    fn encode(&self, image: &RgbImage, file: fs::File) -> Result<(), SnapshotError> {
        let mut writer = BufWriter::new(file);
        image.write_to(&mut writer, self.format.image_format())?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .unwrap()
    }

    #[test]
    fn test_name_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path(), "capture", SnapshotFormat::Png);
        let path = writer.save_at(&RgbImage::new(4, 4), fixed_time()).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "capture_20240309_140507_000.png"
        );
    }

    #[test]
    fn test_same_instant_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path(), "capture", SnapshotFormat::Jpg);
        let first = writer.save_at(&RgbImage::new(4, 4), fixed_time()).unwrap();
        let second = writer.save_at(&RgbImage::new(4, 4), fixed_time()).unwrap();

        assert_ne!(first, second);
        assert!(first.exists() && second.exists());
        assert!(
            second
                .file_name()
                .unwrap()
                .to_string_lossy()
                .ends_with("_1.jpg")
        );
    }

    #[test]
    fn test_empty_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path(), "capture", SnapshotFormat::Jpg);
        assert!(matches!(
            writer.save(&RgbImage::new(0, 0)),
            Err(SnapshotError::NoFrame)
        ));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let writer = SnapshotWriter::new(&nested, "shot", SnapshotFormat::Png);
        let path = writer.save(&RgbImage::new(2, 2)).unwrap();
        assert!(path.starts_with(&nested));
    }
}
