use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default engine arguments: service/version detection plus the `vuln` script category.
pub const DEFAULT_ARGUMENTS: &str = "-sV --script=vuln";

/// A single host to probe, as given by the user (IP address or hostname).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Trim and validate a user-supplied target.
    ///
    /// Rejects empty input, interior whitespace (which would split into several
    /// engine arguments), and a leading `-` (which the engine would read as an option).
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let t = raw.trim();
        if t.is_empty() {
            return Err(ConfigError::EmptyTarget);
        }
        if t.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidTarget {
                target: t.to_string(),
                reason: "contains whitespace",
            });
        }
        if t.starts_with('-') {
            return Err(ConfigError::InvalidTarget {
                target: t.to_string(),
                reason: "starts with '-'",
            });
        }
        Ok(Self(t.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One probe invocation: who to scan and with which engine arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub target: Target,
    pub arguments: String,
}

impl ScanRequest {
    pub fn new(target: Target, arguments: impl Into<String>) -> Self {
        Self {
            target,
            arguments: arguments.into(),
        }
    }

    /// Arguments split the way a shell would for a simple, unquoted string.
    pub fn argument_list(&self) -> Vec<String> {
        self.arguments
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// Everything the engine reported for one probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub target: Target,
    pub hosts: Vec<HostRecord>,
}

/// One responding host. Protocols keep the order the engine reported them in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub address: String,
    pub hostname: String,
    pub state: String,
    pub protocols: Vec<ProtocolPorts>,
}

impl HostRecord {
    pub fn is_up(&self) -> bool {
        self.state == "up"
    }
}

/// Ports seen for one protocol (`tcp`, `udp`, `sctp`, `ip`), in engine order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProtocolPorts {
    pub protocol: String,
    pub ports: Vec<PortRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortRecord {
    pub port: u16,
    pub state: String,
    pub service: String,
    pub product: String,
    pub version: String,
    /// Script findings; empty when no script produced output for this port.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scripts: Vec<ScriptFinding>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScriptFinding {
    pub id: String,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_is_trimmed() {
        let t = Target::parse("  scanme.example.org \n").unwrap();
        assert_eq!(t.as_str(), "scanme.example.org");
    }

    #[test]
    fn blank_target_rejected() {
        assert!(matches!(Target::parse("   "), Err(ConfigError::EmptyTarget)));
    }

    #[test]
    fn option_like_target_rejected() {
        assert!(Target::parse("-iL /etc/passwd").is_err());
        assert!(Target::parse("--script=x").is_err());
    }

    #[test]
    fn default_arguments_split() {
        let req = ScanRequest::new(Target::parse("10.0.0.1").unwrap(), DEFAULT_ARGUMENTS);
        assert_eq!(req.argument_list(), vec!["-sV", "--script=vuln"]);
    }
}
