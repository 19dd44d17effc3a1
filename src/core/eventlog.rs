//! RG-013: Append-only JSONL run journal.

use super::types::ExecuteEvent;
use crate::directory::ident::generate_id;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// One journal line.
#[derive(Debug, Serialize)]
pub struct JournalEntry<'a> {
    pub ts: String,
    pub run_id: &'a str,
    #[serde(flatten)]
    pub event: &'a ExecuteEvent,
}

/// Journal write failure.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("cannot write journal {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot encode journal entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn now_iso8601() -> String {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format_timestamp(since_epoch.as_millis() as i64)
}

fn format_timestamp(millis: i64) -> String {
    let secs = millis.div_euclid(1000);
    let (year, month, day) = civil_from_days(secs.div_euclid(86_400));
    let of_day = secs.rem_euclid(86_400);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        year,
        month,
        day,
        of_day / 3600,
        of_day % 3600 / 60,
        of_day % 60,
        millis.rem_euclid(1000)
    )
}

/// Proleptic Gregorian date for a count of days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    // Shift the epoch to 0000-03-01 so leap days fall at the end of an era year.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let day_of_era = z.rem_euclid(146_097);
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let shifted_month = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * shifted_month + 2) / 5 + 1) as u32;
    let month = if shifted_month < 10 {
        shifted_month + 3
    } else {
        shifted_month - 9
    } as u32;
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Run identifier: `r-` plus twelve hex digits of a fresh identity.
pub fn generate_run_id() -> String {
    let id = generate_id().replace('-', "");
    format!("r-{}", &id[..12])
}

/// Journal location under a data directory.
pub fn journal_path(data_dir: &Path) -> PathBuf {
    data_dir.join("events.jsonl")
}

/// Append one event as a JSON line.
pub fn append_event(
    data_dir: &Path,
    run_id: &str,
    event: &ExecuteEvent,
) -> Result<(), JournalError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| JournalError::Io { path, source }
    };
    std::fs::create_dir_all(data_dir).map_err(io_err(data_dir))?;

    let entry = JournalEntry {
        ts: now_iso8601(),
        run_id,
        event,
    };
    let mut line = serde_json::to_vec(&entry)?;
    line.push(b'\n');

    let path = journal_path(data_dir);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(io_err(&path))?;
    file.write_all(&line).map_err(io_err(&path))
}
