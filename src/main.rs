use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use time::UtcOffset;
use tracing_subscriber::EnvFilter;

use vulnwatch::clock::{Clock, SystemClock};
use vulnwatch::config::{Cli, Settings};
use vulnwatch::cycle::CycleRunner;
use vulnwatch::orchestrator::{self, Orchestrator, StopReason};
use vulnwatch::probe::{self, NmapProber};
use vulnwatch::storage::FsReportStore;

const EXIT_CONFIG: u8 = 1;
const EXIT_FAULT: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    // Must be read before the runtime exists; see `SystemClock`.
    let offset = UtcOffset::current_local_offset().unwrap_or_else(|e| {
        eprintln!("Warning: {e}; reading dates as UTC");
        UtcOffset::UTC
    });
    let clock = SystemClock::new(offset);

    print_banner();

    let settings = match cli.validate(offset, clock.now()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let nmap = match probe::locate_nmap(settings.nmap.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Install it with:");
            eprintln!("  - Ubuntu/Debian: sudo apt-get install nmap");
            eprintln!("  - Red Hat/CentOS: sudo yum install nmap");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    print_settings(&settings, &nmap);

    match run(settings, nmap, clock) {
        Ok(StopReason::Interrupted) => {
            println!("\nScheduler stopped by user. Exiting...");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Unexpected error in scheduler: {e:#}");
            ExitCode::from(EXIT_FAULT)
        }
    }
}

fn run(settings: Settings, nmap: PathBuf, clock: SystemClock) -> Result<StopReason> {
    // One job, one target: a single-threaded runtime is all the loop needs.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    rt.block_on(async move {
        let prober = NmapProber::new(nmap).with_timeout(settings.probe_timeout);
        let store = FsReportStore::new(&settings.output_dir);
        let runner = CycleRunner::new(prober, store, clock, settings.prefix.clone())
            .with_json(settings.json);
        let mut orch = Orchestrator::new(
            runner,
            settings.target.clone(),
            settings.arguments.clone(),
            settings.schedule,
        )
        .with_poll_interval(settings.poll_interval);

        orchestrator::cancel_on_signal(orch.cancel_token());
        let stop = orch.run().await?;
        Ok(stop)
    })
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

fn print_banner() {
    println!("vulnwatch {}", env!("CARGO_PKG_VERSION"));
    println!("===================================");
    println!("Scheduled vulnerability scans with nmap");
    println!("Note: requires root privileges (sudo) for best results");
    println!("Warning: only scan targets you have permission to test");
    println!("===================================\n");
}

fn print_settings(settings: &Settings, nmap: &std::path::Path) {
    println!("vulnwatch configuration:");
    println!("  target       : {}", settings.target);
    println!("  frequency    : {}", settings.schedule.frequency());
    println!("  first run    : {}", settings.schedule.first_run());
    println!("  arguments    : {}", settings.arguments);
    println!("  nmap         : {}", nmap.display());
    println!("  output dir   : {}", settings.output_dir.display());
    println!("  poll every   : {}s", settings.poll_interval.as_secs());
    println!(
        "  probe limit  : {}",
        settings
            .probe_timeout
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("  json output  : {}", settings.json);
    println!();
}
