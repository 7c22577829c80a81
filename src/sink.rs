//! Destinations for verified artifacts.
//!
//! The reassembler hands every artifact that passed its digest check to an
//! [`ArtifactSink`]. [`FsSink`] writes one file per artifact, named from the
//! artifact identifier and the completion time. Existing files are never
//! overwritten; a colliding name gains a numeric suffix.

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt};

use crate::record::ArtifactId;

/// Failure persisting an artifact.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing the artifact failed.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The sink refused the artifact.
    #[error("sink rejected {id}: {reason}")]
    Rejected { id: ArtifactId, reason: String },
}

/// Receives verified artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Persist `bytes` for `id`, returning where they were stored.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when the artifact could not be stored.
    async fn store(&self, id: &ArtifactId, bytes: &[u8]) -> Result<PathBuf, SinkError>;
}

/// Suffixes tried before a colliding name is reported as an error.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Writes artifacts as individual files under a directory.
#[derive(Clone, Debug)]
pub struct FsSink {
    dir: PathBuf,
    extension: String,
}

impl FsSink {
    /// Store artifacts under `dir` with a `.jpg` extension.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "jpg".to_owned(),
        }
    }

    /// Override the file extension.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Directory receiving artifacts.
    #[must_use]
    pub fn dir(&self) -> &Path { &self.dir }

    /// Create the target directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Write`] if the directory cannot be created.
    pub async fn ensure_dir(&self) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| SinkError::Write {
                path: self.dir.clone(),
                source,
            })
    }

    /// Deterministic file name for `id` completed at `completed_at`.
    ///
    /// Characters outside `[A-Za-z0-9._-]` in the identifier become `_`, so a
    /// device name can never escape the target directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Local, TimeZone};
    /// use chunkwire::{
    ///     record::{ArtifactId, DeviceId, OriginTimestamp},
    ///     sink::FsSink,
    /// };
    ///
    /// let sink = FsSink::new("out");
    /// let id = ArtifactId::new(DeviceId::new("cam"), OriginTimestamp::from_millis(5));
    /// let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
    /// assert_eq!(sink.file_name(&id, at), "image_cam_5_20240309_140507.jpg");
    /// ```
    #[must_use]
    pub fn file_name(&self, id: &ArtifactId, completed_at: DateTime<Local>) -> String {
        format!("{}.{}", Self::stem(id, completed_at), self.extension)
    }

    fn candidate(&self, id: &ArtifactId, completed_at: DateTime<Local>, attempt: u32) -> PathBuf {
        let name = if attempt == 0 {
            self.file_name(id, completed_at)
        } else {
            format!("{}_{attempt}.{}", Self::stem(id, completed_at), self.extension)
        };
        self.dir.join(name)
    }

    fn stem(id: &ArtifactId, completed_at: DateTime<Local>) -> String {
        let sanitised: String = id
            .to_string()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("image_{sanitised}_{}", completed_at.format("%Y%m%d_%H%M%S"))
    }

    async fn write_new(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

#[async_trait]
impl ArtifactSink for FsSink {
    async fn store(&self, id: &ArtifactId, bytes: &[u8]) -> Result<PathBuf, SinkError> {
        let completed_at = Local::now();
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.candidate(id, completed_at, attempt);
            match Self::write_new(&path, bytes).await {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => return Err(SinkError::Write { path, source }),
            }
        }
        Err(SinkError::Write {
            path: self.dir.join(self.file_name(id, completed_at)),
            source: io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{MAX_NAME_ATTEMPTS} candidate names already taken"),
            ),
        })
    }
}
