use std::fmt;

use time::macros::format_description;
use time::OffsetDateTime;

use crate::types::{HostRecord, ScanResult, Target};

/// Default file name prefix for persisted reports.
pub const DEFAULT_PREFIX: &str = "vuln_scan";

const RULE_WIDTH: usize = 50;

/// Text report for one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub target: Target,
    pub generated_at: OffsetDateTime,
    /// One rendered block per host, in the order the engine returned them.
    pub blocks: Vec<String>,
}

impl Report {
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Vulnerability Scan Report - {}", self.target)?;
        writeln!(f, "Generated: {}", format_timestamp(self.generated_at))?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;
        writeln!(f)?;
        for block in &self.blocks {
            f.write_str(block)?;
        }
        Ok(())
    }
}

/// Build the report for `result`. Output depends only on the inputs.
pub fn build_report(target: &Target, result: &ScanResult, generated_at: OffsetDateTime) -> Report {
    Report {
        target: target.clone(),
        generated_at,
        blocks: result.hosts.iter().map(render_host).collect(),
    }
}

fn render_host(host: &HostRecord) -> String {
    HostBlock(host).to_string()
}

/// One host's section: status, ports ascending within each protocol, then a rule.
struct HostBlock<'a>(&'a HostRecord);

impl fmt::Display for HostBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = self.0;
        writeln!(f, "Host: {} ({})", host.address, host.hostname)?;
        writeln!(f, "State: {}", host.state)?;
        writeln!(f)?;

        for proto in &host.protocols {
            writeln!(f, "Protocol: {}", proto.protocol)?;
            let mut ports: Vec<_> = proto.ports.iter().collect();
            ports.sort_by_key(|p| p.port);

            for p in ports {
                let service = if p.service.is_empty() {
                    "unknown"
                } else {
                    p.service.as_str()
                };
                writeln!(
                    f,
                    "Port: {}\tState: {}\tService: {} ({} {})",
                    p.port, p.state, service, p.product, p.version
                )?;
                if !p.scripts.is_empty() {
                    writeln!(f, "Vulnerabilities:")?;
                    for s in &p.scripts {
                        writeln!(f, "- {}:\n  {}", s.id, s.output)?;
                    }
                }
                writeln!(f)?;
            }
        }

        writeln!(f, "{}", "-".repeat(RULE_WIDTH))
    }
}

/// `<prefix>_<target>_<unix-seconds>.txt`.
///
/// Unique per target and second. Characters that would act as path
/// separators are replaced with `_`.
pub fn storage_key(prefix: &str, target: &Target, generated_at: OffsetDateTime) -> String {
    let safe: String = target
        .as_str()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect();
    format!("{prefix}_{safe}_{}.txt", generated_at.unix_timestamp())
}

fn format_timestamp(t: OffsetDateTime) -> String {
    let fmt = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
    );
    t.format(fmt).unwrap_or_else(|_| t.unix_timestamp().to_string())
}
