//! RG-012: Embedded transactional directory backend (SQLite).
//!
//! Data is kept in a single `entries(bucket, key, value)` table. Nested
//! buckets are flattened into a path whose segments are joined with U+001F,
//! so `apps/web/aws-simple` becomes one `bucket` value. Applications live at
//! `apps/<id>/<version>/<config hash>` under the key `app`.
//!
//! Every operation opens the database, checks the format version, does its
//! work and closes the connection again. Suited to a single developer's
//! machine, not to concurrent team use.

use super::ident::generate_id;
use super::types::{app_order, App, AppLookup, Build, Deploy, Dev, Infra, Lookup};
use super::{Backend, DirectoryError};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

const SEGMENT_SEP: &str = "\u{1f}";
const APP_SLOT: &str = "app";

/// Names and version marker used by a backend instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub db_file: String,
    pub meta_bucket: String,
    pub apps_bucket: String,
    pub blob_bucket: String,
    pub infra_bucket: String,
    pub version_key: String,
    /// Highest format version this build can read; written to fresh stores.
    pub data_version: u8,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            db_file: "rigger.db".to_string(),
            meta_bucket: "meta".to_string(),
            apps_bucket: "apps".to_string(),
            blob_bucket: "blob".to_string(),
            infra_bucket: "infra".to_string(),
            version_key: "version".to_string(),
            data_version: 1,
        }
    }
}

/// Directory backend storing records in a local SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    dir: PathBuf,
    layout: Layout,
}

impl SqliteBackend {
    /// Open (creating if needed) the store under `dir` with the default layout.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DirectoryError> {
        Self::with_layout(dir, Layout::default())
    }

    /// Open with an explicit layout. Fails if the stored format version is
    /// newer than `layout.data_version`.
    pub fn with_layout(dir: impl Into<PathBuf>, layout: Layout) -> Result<Self, DirectoryError> {
        let backend = Self {
            dir: dir.into(),
            layout,
        };
        backend.connect()?;
        tracing::debug!(path = %backend.db_path().display(), "opened directory");
        Ok(backend)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn db_path(&self) -> PathBuf {
        self.dir.join(&self.layout.db_file)
    }

    fn connect(&self) -> Result<Connection, DirectoryError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| DirectoryError::Io {
            path: self.dir.clone(),
            source: e,
        })?;

        let conn = Connection::open(self.db_path())?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                bucket TEXT NOT NULL,
                key    TEXT NOT NULL,
                value  BLOB NOT NULL,
                PRIMARY KEY (bucket, key)
            )",
        )?;
        self.check_version(&conn)?;
        Ok(conn)
    }

    /// Version gate. A missing marker is initialised; a newer one is fatal
    /// and left untouched.
    fn check_version(&self, conn: &Connection) -> Result<(), DirectoryError> {
        let stored = get_raw(conn, &self.layout.meta_bucket, &self.layout.version_key)?;
        match stored {
            None => put_raw(
                conn,
                &self.layout.meta_bucket,
                &self.layout.version_key,
                &[self.layout.data_version],
            ),
            Some(bytes) => {
                let found = bytes.first().copied().unwrap_or(0);
                if found > self.layout.data_version {
                    tracing::warn!(found, supported = self.layout.data_version, "directory too new");
                    return Err(DirectoryError::VersionTooNew {
                        supported: self.layout.data_version,
                        found,
                    });
                }
                Ok(())
            }
        }
    }

    // ========================================================================
    // Key derivation
    // ========================================================================

    fn infra_bucket(&self, lookup: &Lookup) -> String {
        bucket_path(&[&self.layout.infra_bucket, &lookup.infra])
    }

    fn app_bucket(&self, lookup: &Lookup) -> String {
        bucket_path(&[&self.layout.apps_bucket, &lookup.app])
    }

    fn app_version_bucket(&self, lookup: &AppLookup) -> String {
        let hash = lookup.config_hash.to_string();
        bucket_path(&[&self.layout.apps_bucket, &lookup.app_id, &lookup.version, &hash])
    }

    fn app_infra_bucket(&self, lookup: &Lookup) -> String {
        let scope = format!("{}-{}", lookup.infra, lookup.infra_flavor);
        bucket_path(&[&self.layout.apps_bucket, &lookup.app, &scope])
    }

    // ========================================================================
    // Record helpers
    // ========================================================================

    fn put_record<T: Serialize>(&self, bucket: &str, key: &str, record: &T) -> Result<(), DirectoryError> {
        let data = encode_record(record)?;
        let conn = self.connect()?;
        put_raw(&conn, bucket, key, &data)
    }

    fn get_record<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> Result<Option<T>, DirectoryError> {
        let conn = self.connect()?;
        match get_raw(&conn, bucket, key)? {
            Some(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| DirectoryError::Decode {
                    key: format!("{}/{}", bucket.replace(SEGMENT_SEP, "/"), key),
                    source: e,
                }),
            None => Ok(None),
        }
    }
}

/// `"root"` for an infrastructure's own record, `"foundation-<name>"` otherwise.
pub fn infra_key(lookup: &Lookup) -> String {
    if lookup.foundation.is_empty() {
        "root".to_string()
    } else {
        format!("foundation-{}", lookup.foundation)
    }
}

fn bucket_path(segments: &[&str]) -> String {
    segments.join(SEGMENT_SEP)
}

/// Tab-indented JSON.
fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>, DirectoryError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    record.serialize(&mut ser).map_err(DirectoryError::Encode)?;
    Ok(buf)
}

fn get_raw(conn: &Connection, bucket: &str, key: &str) -> Result<Option<Vec<u8>>, DirectoryError> {
    let value = conn
        .query_row(
            "SELECT value FROM entries WHERE bucket = ?1 AND key = ?2",
            params![bucket, key],
            |row| row.get::<_, Vec<u8>>(0),
        )
        .optional()?;
    Ok(value)
}

fn put_raw(conn: &Connection, bucket: &str, key: &str, value: &[u8]) -> Result<(), DirectoryError> {
    conn.execute(
        "INSERT OR REPLACE INTO entries (bucket, key, value) VALUES (?1, ?2, ?3)",
        params![bucket, key, value],
    )?;
    Ok(())
}

fn delete_raw(conn: &Connection, bucket: &str, key: &str) -> Result<(), DirectoryError> {
    conn.execute(
        "DELETE FROM entries WHERE bucket = ?1 AND key = ?2",
        params![bucket, key],
    )?;
    Ok(())
}

impl Backend for SqliteBackend {
    fn put_app(&self, lookup: &AppLookup, app: &App) -> Result<(), DirectoryError> {
        let record = App {
            lookup: lookup.clone(),
            ..app.clone()
        };
        self.put_record(&self.app_version_bucket(lookup), APP_SLOT, &record)
    }

    fn get_app(&self, lookup: &AppLookup) -> Result<Option<App>, DirectoryError> {
        let app: Option<App> = self.get_record(&self.app_version_bucket(lookup), APP_SLOT)?;
        Ok(app.map(|mut app| {
            app.lookup = lookup.clone();
            app
        }))
    }

    fn list_apps(&self) -> Result<Vec<App>, DirectoryError> {
        let prefix = format!("{}{}", self.layout.apps_bucket, SEGMENT_SEP);
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT bucket, value FROM entries
             WHERE key = ?1 AND substr(bucket, 1, length(?2)) = ?2",
        )?;
        let rows = stmt
            .query_map(params![APP_SLOT, prefix], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut apps = Vec::new();
        for (bucket, data) in rows {
            let segments: Vec<&str> = bucket.split(SEGMENT_SEP).collect();
            let [_, app_id, version, hash] = segments[..] else {
                continue;
            };
            let Ok(config_hash) = hash.parse::<u64>() else {
                continue;
            };
            let mut app: App = serde_json::from_slice(&data).map_err(|e| DirectoryError::Decode {
                key: format!("{}/{}", bucket.replace(SEGMENT_SEP, "/"), APP_SLOT),
                source: e,
            })?;
            app.lookup = AppLookup::new(app_id, version, config_hash);
            apps.push(app);
        }
        apps.sort_by(app_order);
        Ok(apps)
    }

    fn put_blob(&self, key: &str, data: &[u8]) -> Result<(), DirectoryError> {
        let conn = self.connect()?;
        put_raw(&conn, &self.layout.blob_bucket, key, data)
    }

    fn get_blob(&self, key: &str) -> Result<Option<Vec<u8>>, DirectoryError> {
        let conn = self.connect()?;
        get_raw(&conn, &self.layout.blob_bucket, key)
    }

    fn put_infra(&self, infra: &mut Infra) -> Result<(), DirectoryError> {
        if infra.id.is_empty() {
            infra.id = generate_id();
        }
        tracing::debug!(lookup = %infra.lookup, state = %infra.state, "put infra");
        self.put_record(&self.infra_bucket(&infra.lookup), &infra_key(&infra.lookup), infra)
    }

    fn get_infra(&self, lookup: &Lookup) -> Result<Option<Infra>, DirectoryError> {
        self.get_record(&self.infra_bucket(lookup), &infra_key(lookup))
    }

    fn put_dev(&self, dev: &mut Dev) -> Result<(), DirectoryError> {
        if dev.id.is_empty() {
            dev.id = generate_id();
        }
        self.put_record(&self.app_bucket(&dev.lookup), "dev", dev)
    }

    fn get_dev(&self, lookup: &Lookup) -> Result<Option<Dev>, DirectoryError> {
        self.get_record(&self.app_bucket(lookup), "dev")
    }

    fn delete_dev(&self, lookup: &Lookup) -> Result<(), DirectoryError> {
        let conn = self.connect()?;
        delete_raw(&conn, &self.app_bucket(lookup), "dev")
    }

    fn put_build(&self, build: &Build) -> Result<(), DirectoryError> {
        self.put_record(&self.app_infra_bucket(&build.lookup()), "build", build)
    }

    fn get_build(&self, lookup: &Lookup) -> Result<Option<Build>, DirectoryError> {
        self.get_record(&self.app_infra_bucket(lookup), "build")
    }

    fn put_deploy(&self, deploy: &mut Deploy) -> Result<(), DirectoryError> {
        if deploy.id.is_empty() {
            deploy.id = generate_id();
        }
        self.put_record(&self.app_infra_bucket(&deploy.lookup), "deploy", deploy)
    }

    fn get_deploy(&self, lookup: &Lookup) -> Result<Option<Deploy>, DirectoryError> {
        self.get_record(&self.app_infra_bucket(lookup), "deploy")
    }
}
