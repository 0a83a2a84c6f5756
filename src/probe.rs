use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time;
use tracing::{debug, info};

use crate::error::{ConfigError, ProbeFailure};
use crate::nmap_xml::parse_nmap_xml;
use crate::types::{ScanRequest, ScanResult};

/// Where the engine is usually installed, checked before `$PATH`.
const WELL_KNOWN_PATHS: &[&str] = &["/usr/bin/nmap", "/usr/local/bin/nmap"];

/// Tagged result of one probe, so callers branch on data rather than error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success(ScanResult),
    /// The engine ran fine but no responding host came back.
    Unreachable,
    /// The engine could not be started, failed, timed out, or emitted unreadable output.
    ToolError(String),
}

impl ProbeOutcome {
    pub fn into_result(self, request: &ScanRequest) -> Result<ScanResult, ProbeFailure> {
        match self {
            Self::Success(result) => Ok(result),
            Self::Unreachable => Err(ProbeFailure::Unreachable {
                target: request.target.to_string(),
            }),
            Self::ToolError(reason) => Err(ProbeFailure::Tool { reason }),
        }
    }
}

/// Something that can probe one target. Must never panic or propagate on engine failure.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    fn name(&self) -> &'static str;
    async fn probe(&self, request: &ScanRequest) -> ProbeOutcome;
}

/// Runs the `nmap` binary and decodes its XML output.
#[derive(Debug, Clone)]
pub struct NmapProber {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl NmapProber {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: None,
        }
    }

    /// Bound a single probe. Without this a hung engine hangs the cycle.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument vector: user arguments, XML on stdout, then the target.
    pub fn command_args(request: &ScanRequest) -> Vec<String> {
        let mut args = request.argument_list();
        args.push("-oX".to_string());
        args.push("-".to_string());
        args.push(request.target.to_string());
        args
    }

    async fn run(&self, request: &ScanRequest) -> Result<String, String> {
        let args = Self::command_args(request);
        info!(command = %self.binary.display(), ?args, "launching nmap");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to start {}: {e}", self.binary.display()))?;

        let output = match self.timeout {
            Some(limit) => time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| format!("nmap did not finish within {}s", limit.as_secs()))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| format!("failed waiting for nmap: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("nmap exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl Prober for NmapProber {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn probe(&self, request: &ScanRequest) -> ProbeOutcome {
        let xml = match self.run(request).await {
            Ok(xml) => xml,
            Err(reason) => return ProbeOutcome::ToolError(reason),
        };
        classify(request, &xml)
    }
}

/// Turn raw engine output into an outcome.
pub fn classify(request: &ScanRequest, xml: &str) -> ProbeOutcome {
    let result = match parse_nmap_xml(&request.target, xml) {
        Ok(r) => r,
        Err(e) => return ProbeOutcome::ToolError(format!("unreadable nmap output: {e}")),
    };
    debug!(hosts = result.hosts.len(), "decoded nmap output");
    if result.hosts.iter().any(|h| h.is_up()) {
        ProbeOutcome::Success(result)
    } else {
        ProbeOutcome::Unreachable
    }
}

/// Check that the engine is installed and runnable.
///
/// An explicit path must be an executable file. Otherwise the well-known
/// install locations are tried, then `$PATH`.
pub fn locate_nmap(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return which::which(path).map_err(|_| ConfigError::ToolPathMissing {
            path: path.to_path_buf(),
        });
    }

    WELL_KNOWN_PATHS
        .iter()
        .find_map(|p| which::which(p).ok())
        .or_else(|| which::which("nmap").ok())
        .ok_or_else(|| ConfigError::ToolMissing {
            searched: format!("{} and $PATH", WELL_KNOWN_PATHS.join(", ")),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Target, DEFAULT_ARGUMENTS};

    fn request() -> ScanRequest {
        ScanRequest::new(Target::parse("10.0.0.99").unwrap(), DEFAULT_ARGUMENTS)
    }

    #[test]
    fn command_line_puts_target_last() {
        let args = NmapProber::command_args(&request());
        assert_eq!(args, vec!["-sV", "--script=vuln", "-oX", "-", "10.0.0.99"]);
    }

    #[test]
    fn no_up_host_is_unreachable() {
        let xml = r#"<nmaprun><runstats><hosts up="0" down="1" total="1"/></runstats></nmaprun>"#;
        assert_eq!(classify(&request(), xml), ProbeOutcome::Unreachable);

        let down = r#"<nmaprun><host><status state="down"/><address addr="10.0.0.99" addrtype="ipv4"/></host></nmaprun>"#;
        assert_eq!(classify(&request(), down), ProbeOutcome::Unreachable);
    }

    #[test]
    fn unreadable_output_is_tool_error() {
        assert!(matches!(
            classify(&request(), "segfault"),
            ProbeOutcome::ToolError(_)
        ));
    }

    #[test]
    fn outcomes_map_to_failures() {
        let req = request();
        assert_eq!(
            ProbeOutcome::Unreachable.into_result(&req),
            Err(ProbeFailure::Unreachable {
                target: "10.0.0.99".into()
            })
        );
        assert!(matches!(
            ProbeOutcome::ToolError("boom".into()).into_result(&req),
            Err(ProbeFailure::Tool { .. })
        ));
    }

    #[test]
    fn explicit_missing_binary_rejected() {
        let err = locate_nmap(Some(Path::new("/definitely/not/here/nmap"))).unwrap_err();
        assert!(matches!(err, ConfigError::ToolPathMissing { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn explicit_path_must_be_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("nmap");
        std::fs::write(&fake, "not a program").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(
            locate_nmap(Some(&fake)),
            Err(ConfigError::ToolPathMissing { .. })
        ));

        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(locate_nmap(Some(&fake)).unwrap(), fake);
    }

    #[tokio::test]
    async fn missing_binary_is_tool_error() {
        let prober = NmapProber::new("/definitely/not/here/nmap");
        let outcome = prober.probe(&request()).await;
        assert!(matches!(outcome, ProbeOutcome::ToolError(r) if r.contains("failed to start")));
    }
}
