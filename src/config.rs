use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use time::{OffsetDateTime, UtcOffset};

use crate::error::ConfigError;
use crate::report::DEFAULT_PREFIX;
use crate::schedule::{parse_first_run, FrequencyKind, ScheduleSpec};
use crate::types::{Target, DEFAULT_ARGUMENTS};

/// vulnwatch: scheduled nmap vulnerability scans of a single target, one text report per run.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vulnwatch",
    version,
    about = "Scheduled nmap vulnerability scans of a single target, one text report per run.",
    long_about = None
)]
pub struct Cli {
    /// Target IP or hostname (e.g. 192.168.1.1 or scanme.nmap.org).
    #[arg(long, env = "VULNWATCH_TARGET")]
    pub target: String,

    /// Scan frequency: daily (1), weekly (2) or monthly (3, every four weeks).
    #[arg(long, env = "VULNWATCH_FREQUENCY")]
    pub frequency: String,

    /// First scan date, YYYY-MM-DD (local midnight) or "YYYY-MM-DD HH:MM".
    #[arg(long = "first-run", env = "VULNWATCH_FIRST_RUN")]
    pub first_run: String,

    /// Arguments passed to nmap before the target.
    #[arg(long, env = "VULNWATCH_ARGUMENTS", default_value = DEFAULT_ARGUMENTS, allow_hyphen_values = true)]
    pub arguments: String,

    /// Directory reports are written to.
    #[arg(long = "output-dir", env = "VULNWATCH_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Report file name prefix.
    #[arg(long, default_value = DEFAULT_PREFIX)]
    pub prefix: String,

    /// Seconds between due-time checks once recurring scans are armed.
    #[arg(long = "poll-interval-secs", default_value_t = 60)]
    pub poll_interval_secs: u64,

    /// Abort a single scan after this many seconds (unbounded if omitted).
    #[arg(long = "probe-timeout-secs")]
    pub probe_timeout_secs: Option<u64>,

    /// Path to the nmap binary (searched for if omitted).
    #[arg(long)]
    pub nmap: Option<PathBuf>,

    /// Also write the structured scan result as JSON next to each report.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target: Target,
    pub arguments: String,
    pub schedule: ScheduleSpec,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub poll_interval: Duration,
    pub probe_timeout: Option<Duration>,
    pub nmap: Option<PathBuf>,
    pub json: bool,
}

impl Cli {
    /// Check every user-supplied value. The first-run date is read in
    /// `offset` and must lie strictly after `now`.
    pub fn validate(&self, offset: UtcOffset, now: OffsetDateTime) -> Result<Settings, ConfigError> {
        let target = Target::parse(&self.target)?;
        let frequency: FrequencyKind = self.frequency.parse()?;
        let first_run = parse_first_run(&self.first_run, offset)?;
        let schedule = ScheduleSpec::new(frequency, first_run, now)?;
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        Ok(Settings {
            target,
            arguments: self.arguments.trim().to_string(),
            schedule,
            output_dir: self.output_dir.clone(),
            prefix: self.prefix.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            probe_timeout: self
                .probe_timeout_secs
                .filter(|s| *s > 0)
                .map(Duration::from_secs),
            nmap: self.nmap.clone(),
            json: self.json,
        })
    }
}
