//! Bucket model.
//!
//! A bucket is an immutable directory of time-bounded index data. Its identity is
//! `(index, name)`; together with its [`BucketFormat`] it determines exactly one
//! archive path.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, ArchiveResult};

const ORIGIN_PREFIX: &str = "db";
const REPLICA_PREFIX: &str = "rb";

/// On-disk layout of an archived bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BucketFormat {
    /// The indexing engine's own directory layout, archived as-is.
    #[serde(rename = "NATIVE_BUCKET")]
    Native,
    /// Events exported to CSV.
    #[serde(rename = "CSV")]
    Csv,
}

impl BucketFormat {
    /// Name used as the last segment of an archive path.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "NATIVE_BUCKET",
            Self::Csv => "CSV",
        }
    }
}

impl Default for BucketFormat {
    fn default() -> Self {
        Self::Native
    }
}

impl fmt::Display for BucketFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BucketFormat {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NATIVE_BUCKET" => Ok(Self::Native),
            "CSV" => Ok(Self::Csv),
            other => Err(ArchiveError::ValidationError(format!(
                "unknown bucket format `{other}`"
            ))),
        }
    }
}

/// Checks that an index name is a single plain path segment.
///
/// Index names are joined onto local holding areas and archive paths, so
/// separators and `.`/`..` are rejected.
///
/// # Errors
///
/// Returns `ArchiveError::ValidationError` describing the problem.
pub fn validate_index_name(index: &str) -> ArchiveResult<()> {
    let reason = if index.is_empty() {
        Some("cannot be empty")
    } else if index == "." || index == ".." {
        Some("cannot be `.` or `..`")
    } else if index.contains(['/', '\\', '\0']) {
        Some("cannot contain a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ArchiveError::ValidationError(format!(
            "invalid index name `{index}`: {reason}"
        ))),
        None => Ok(()),
    }
}

/// Whether a bucket is the origin copy or a replica held for another peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    Origin,
    Replica,
}

/// Parsed form of `<db|rb>_<newest>_<oldest>_<localId>[_<guid>]`.
///
/// Times are epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketName {
    pub kind: BucketKind,
    pub newest: i64,
    pub oldest: i64,
    pub local_id: String,
    pub guid: Option<String>,
}

impl BucketName {
    /// Parse a bucket directory name.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveError::InvalidBucketName` when the name does not follow
    /// the naming scheme.
    pub fn parse(name: &str) -> ArchiveResult<Self> {
        let invalid = |reason: &str| ArchiveError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = name.splitn(5, '_');
        let kind = match parts.next() {
            Some(ORIGIN_PREFIX) => BucketKind::Origin,
            Some(REPLICA_PREFIX) => BucketKind::Replica,
            _ => return Err(invalid("expected `db_` or `rb_` prefix")),
        };
        let newest = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| invalid("newest time is not an integer"))?;
        let oldest = parts
            .next()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or_else(|| invalid("oldest time is not an integer"))?;
        let local_id = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("missing local id"))?
            .to_string();
        let guid = parts.next().map(str::to_string);

        Ok(Self {
            kind,
            newest,
            oldest,
            local_id,
            guid,
        })
    }

    /// Earliest event time. Some producers write the two timestamps reversed.
    #[must_use]
    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.newest.min(self.oldest), 0)
    }

    /// Latest event time.
    #[must_use]
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.newest.max(self.oldest), 0)
    }
}

/// A bucket, either on local disk, in the archive, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Index the bucket belongs to.
    pub index: String,
    /// Directory name of the bucket.
    pub name: String,
    /// Layout of the bucket's data.
    pub format: BucketFormat,
    /// Directory on local disk, if the bucket is materialised locally.
    pub local_path: Option<PathBuf>,
    /// Path in the archive, if known to be archived.
    pub archive_path: Option<String>,
    /// Size on local disk in bytes, when known.
    pub size_bytes: Option<u64>,
}

impl Bucket {
    /// Creates a bucket record with no location attached.
    #[must_use]
    pub fn new(index: impl Into<String>, name: impl Into<String>, format: BucketFormat) -> Self {
        Self {
            index: index.into(),
            name: name.into(),
            format,
            local_path: None,
            archive_path: None,
            size_bytes: None,
        }
    }

    /// Creates a bucket for a local directory. The bucket name is the last
    /// path component.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveError::ValidationError` if the index is not a valid
    /// index name (see [`validate_index_name`]) or the path has no final
    /// component (e.g. `/`).
    pub fn local(
        index: impl Into<String>,
        path: impl Into<PathBuf>,
        format: BucketFormat,
    ) -> ArchiveResult<Self> {
        let index = index.into();
        let path = path.into();
        validate_index_name(&index)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ArchiveError::ValidationError(format!(
                    "cannot derive bucket name from `{}`",
                    path.display()
                ))
            })?
            .to_string();

        Ok(Self {
            index,
            name,
            format,
            local_path: Some(path),
            archive_path: None,
            size_bytes: None,
        })
    }

    /// Creates a record for a bucket found in the archive.
    #[must_use]
    pub fn archived(
        index: impl Into<String>,
        name: impl Into<String>,
        format: BucketFormat,
        archive_path: impl Into<String>,
    ) -> Self {
        Self {
            archive_path: Some(archive_path.into()),
            ..Self::new(index, name, format)
        }
    }

    /// Same bucket, now living at `path`.
    #[must_use]
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Same bucket with a known size.
    #[must_use]
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    /// Local directory of the bucket.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveError::ValidationError` if the bucket has no local copy.
    pub fn require_local_path(&self) -> ArchiveResult<&Path> {
        self.local_path.as_deref().ok_or_else(|| {
            ArchiveError::ValidationError(format!("bucket `{}` has no local path", self.identity()))
        })
    }

    /// `<index>/<name>`, used in logs and lock names.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}/{}", self.index, self.name)
    }

    /// Parsed bucket name, if the name follows the naming scheme.
    #[must_use]
    pub fn parsed_name(&self) -> Option<BucketName> {
        BucketName::parse(&self.name).ok()
    }

    /// Whether this is a replica copy (`rb_` prefix).
    #[must_use]
    pub fn is_replica(&self) -> bool {
        self.name.starts_with("rb_")
    }

    /// Name under which the bucket is archived.
    ///
    /// Replicas are archived under their origin name so every copy of a
    /// bucket in a cluster maps to the same archive path.
    #[must_use]
    pub fn archive_name(&self) -> String {
        match self.name.strip_prefix("rb_") {
            Some(rest) => format!("db_{rest}"),
            None => self.name.clone(),
        }
    }

    /// Earliest event time, derived from the bucket name.
    #[must_use]
    pub fn earliest(&self) -> Option<DateTime<Utc>> {
        self.parsed_name().and_then(|n| n.earliest())
    }

    /// Latest event time, derived from the bucket name.
    #[must_use]
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.parsed_name().and_then(|n| n.latest())
    }

    /// Whether the bucket's time range intersects `[earliest, latest]`.
    ///
    /// Returns `None` when the bucket name carries no time range.
    #[must_use]
    pub fn intersects(&self, earliest: DateTime<Utc>, latest: DateTime<Utc>) -> Option<bool> {
        let bucket_earliest = self.earliest()?;
        let bucket_latest = self.latest()?;
        Some(bucket_earliest <= latest && bucket_latest >= earliest)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.index, self.name, self.format)
    }
}
