//! Error taxonomy.
//!
//! Configuration and schedule errors are fatal at setup. Probe and storage
//! failures stay inside a single cycle. A [`LoopFault`] ends the process.
use std::path::PathBuf;

use thiserror::Error;
use time::OffsetDateTime;

/// Problems with the user's input or environment, detected before any schedule is armed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("please provide a valid target")]
    EmptyTarget,

    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget {
        target: String,
        reason: &'static str,
    },

    #[error("invalid date {input:?}; use YYYY-MM-DD (e.g. 2025-04-10), optionally followed by HH:MM")]
    InvalidDate { input: String },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("nmap is not installed (looked in {searched})")]
    ToolMissing { searched: String },

    #[error("nmap binary {path} does not exist or is not executable")]
    ToolPathMissing { path: PathBuf },

    #[error("poll interval must be at least one second")]
    ZeroPollInterval,
}

/// Schedule values that cannot produce a valid recurrence.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("first scan time {first_run} must be in the future (now {now})")]
    NotInFuture {
        first_run: OffsetDateTime,
        now: OffsetDateTime,
    },

    #[error("invalid frequency {0:?}; choose daily (1), weekly (2) or monthly (3)")]
    UnknownFrequency(String),
}

/// Why a probe produced no usable result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    /// The engine ran but the target was not among the responding hosts.
    #[error("target {target} did not respond; check connectivity or permissions")]
    Unreachable { target: String },

    /// The engine could not be run, crashed, timed out, or produced garbage.
    #[error("scan failed: {reason}")]
    Tool { reason: String },
}

/// Report persistence failed. The cycle still counts as attempted.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to write report {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode scan result for {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// The scheduling loop can no longer keep its invariants; terminate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoopFault {
    #[error("next due time overflowed after {last_due} + {interval}")]
    DueOverflow {
        last_due: OffsetDateTime,
        interval: time::Duration,
    },
}
