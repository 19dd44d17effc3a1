//! RG-010: Directory service. Durable, versioned storage for application,
//! infrastructure, deploy, build and dev-environment records, plus opaque
//! blobs.
//!
//! Tasks only see records through the [`Backend`] contract. A missing record
//! is `Ok(None)`, never an error. There are no compound transactions: a
//! caller doing get-mutate-put races with other writers (last write wins).

#[cfg(test)]
pub mod conformance;
pub mod ident;
pub mod sqlite;
pub mod types;

pub use sqlite::{Layout, SqliteBackend};
pub use types::*;

use thiserror::Error;

/// Storage failure.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("io error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("failed to encode record: {0}")]
    Encode(serde_json::Error),

    #[error("failed to decode record {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },

    #[error(
        "Data version is higher than this version knows how to handle!\n\
         This version can read up to version {supported}, but version {found}\n\
         data was found.\n\n\
         This means that a newer version touched this data, or the data\n\
         was corrupted in some other way."
    )]
    VersionTooNew { supported: u8, found: u8 },
}

impl DirectoryError {
    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Storage(_))
    }
}

/// The directory capability contract, independent of storage technology.
///
/// `put_*` calls on records with an identity assign one when it is empty
/// and write it back into the record.
pub trait Backend {
    /// Store an application under `lookup`; the record's own lookup is
    /// replaced by it.
    fn put_app(&self, lookup: &AppLookup, app: &App) -> Result<(), DirectoryError>;
    fn get_app(&self, lookup: &AppLookup) -> Result<Option<App>, DirectoryError>;
    /// Every stored application, ordered by [`app_order`].
    fn list_apps(&self) -> Result<Vec<App>, DirectoryError>;

    fn put_blob(&self, key: &str, data: &[u8]) -> Result<(), DirectoryError>;
    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, DirectoryError>;

    fn put_infra(&self, infra: &mut Infra) -> Result<(), DirectoryError>;
    fn get_infra(&self, lookup: &Lookup) -> Result<Option<Infra>, DirectoryError>;

    fn put_dev(&self, dev: &mut Dev) -> Result<(), DirectoryError>;
    fn get_dev(&self, lookup: &Lookup) -> Result<Option<Dev>, DirectoryError>;
    fn delete_dev(&self, lookup: &Lookup) -> Result<(), DirectoryError>;

    fn put_build(&self, build: &Build) -> Result<(), DirectoryError>;
    fn get_build(&self, lookup: &Lookup) -> Result<Option<Build>, DirectoryError>;

    fn put_deploy(&self, deploy: &mut Deploy) -> Result<(), DirectoryError>;
    fn get_deploy(&self, lookup: &Lookup) -> Result<Option<Deploy>, DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rg010_version_error_message() {
        let err = DirectoryError::VersionTooNew {
            supported: 1,
            found: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("up to version 1"));
        assert!(msg.contains("version 4"));
        assert!(!err.is_retryable());
    }
}
