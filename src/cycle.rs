use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::error::{ProbeFailure, StorageError};
use crate::probe::Prober;
use crate::report::{build_report, storage_key};
use crate::storage::ReportStore;
use crate::types::{ScanRequest, ScanResult, Target};

/// Result of one probe-and-record attempt.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The report was persisted under this key.
    Recorded(String),
    Failed(CycleFailure),
}

impl CycleOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}

#[derive(Debug, Error)]
pub enum CycleFailure {
    #[error(transparent)]
    Probe(#[from] ProbeFailure),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Probe, render, persist. One instance serves every cycle of the process.
pub struct CycleRunner<P, S, C> {
    prober: P,
    store: S,
    clock: C,
    prefix: String,
    write_json: bool,
}

impl<P: Prober, S: ReportStore, C: Clock> CycleRunner<P, S, C> {
    pub fn new(prober: P, store: S, clock: C, prefix: impl Into<String>) -> Self {
        Self {
            prober,
            store,
            clock,
            prefix: prefix.into(),
            write_json: false,
        }
    }

    /// Also persist the structured result next to the text report.
    pub fn with_json(mut self, enabled: bool) -> Self {
        self.write_json = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run one cycle. Never retries and never lets an error escape: probe and
    /// storage failures come back as [`CycleOutcome::Failed`].
    pub async fn run_cycle(&self, target: &Target, arguments: &str) -> CycleOutcome {
        let request = ScanRequest::new(target.clone(), arguments);
        info!(%target, started = %self.clock.now(), engine = self.prober.name(), "starting scan");

        let result = match self.prober.probe(&request).await.into_result(&request) {
            Ok(result) => result,
            Err(failure) => {
                match &failure {
                    ProbeFailure::Unreachable { .. } => warn!(%target, "{failure}"),
                    _ => error!(%target, "{failure}"),
                }
                return CycleOutcome::Failed(failure.into());
            }
        };

        match self.record(target, &result).await {
            Ok(key) => {
                info!(%target, report = %key, "report saved");
                CycleOutcome::Recorded(key)
            }
            Err(e) => {
                error!(%target, error = %e, "report could not be saved");
                CycleOutcome::Failed(e.into())
            }
        }
    }

    async fn record(&self, target: &Target, result: &ScanResult) -> Result<String, StorageError> {
        let generated_at = self.clock.now();
        let report = build_report(target, result, generated_at);
        let key = storage_key(&self.prefix, target, generated_at);
        self.store.write_text(&key, &report.render()).await?;

        if self.write_json {
            let json_key = format!("{}.json", key.trim_end_matches(".txt"));
            let written = match serde_json::to_string_pretty(result) {
                Ok(body) => self.store.write_text(&json_key, &body).await,
                Err(source) => Err(StorageError::Encode {
                    key: json_key.clone(),
                    source,
                }),
            };
            if let Err(e) = written {
                warn!(error = %e, "structured result not saved");
            }
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::probe::ProbeOutcome;
    use crate::types::{HostRecord, ProtocolPorts, PortRecord};
    use std::sync::Mutex;
    use time::macros::datetime;

    struct FixedProber(ProbeOutcome);

    #[async_trait::async_trait]
    impl Prober for FixedProber {
        fn name(&self) -> &'static str {
            "fixed"
        }
        async fn probe(&self, _request: &ScanRequest) -> ProbeOutcome {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        writes: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ReportStore for MemoryStore {
        async fn write_text(&self, key: &str, content: &str) -> Result<(), StorageError> {
            if self.fail {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.writes
                .lock()
                .unwrap()
                .push((key.to_string(), content.to_string()));
            Ok(())
        }
    }

    fn target() -> Target {
        Target::parse("scanme.example.org").unwrap()
    }

    fn success() -> ProbeOutcome {
        ProbeOutcome::Success(ScanResult {
            target: target(),
            hosts: vec![HostRecord {
                address: "45.33.32.156".into(),
                hostname: "scanme.example.org".into(),
                state: "up".into(),
                protocols: vec![ProtocolPorts {
                    protocol: "tcp".into(),
                    ports: vec![PortRecord {
                        port: 22,
                        state: "open".into(),
                        service: "ssh".into(),
                        product: "OpenSSH".into(),
                        version: "9.6".into(),
                        scripts: vec![],
                    }],
                }],
            }],
        })
    }

    fn clock() -> TokioClock {
        TokioClock::starting_at(datetime!(2025-04-10 00:00 UTC))
    }

    #[tokio::test(start_paused = true)]
    async fn success_is_recorded() {
        let runner = CycleRunner::new(FixedProber(success()), MemoryStore::default(), clock(), "vuln_scan");
        let outcome = runner.run_cycle(&target(), "-sV").await;
        match outcome {
            CycleOutcome::Recorded(key) => {
                assert_eq!(key, "vuln_scan_scanme.example.org_1744243200.txt")
            }
            other => panic!("unexpected {other:?}"),
        }
        let writes = runner.store().writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].1.contains("Port: 22\tState: open\tService: ssh (OpenSSH 9.6)"));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_never_writes() {
        let t = Target::parse("10.0.0.99").unwrap();
        for outcome in [ProbeOutcome::Unreachable, ProbeOutcome::ToolError("crashed".into())] {
            let runner = CycleRunner::new(FixedProber(outcome), MemoryStore::default(), clock(), "vuln_scan");
            let result = runner.run_cycle(&t, "-sV").await;
            assert!(matches!(result, CycleOutcome::Failed(CycleFailure::Probe(_))));
            assert!(runner.store().writes.lock().unwrap().is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_is_reported() {
        let store = MemoryStore {
            fail: true,
            ..Default::default()
        };
        let runner = CycleRunner::new(FixedProber(success()), store, clock(), "vuln_scan");
        let outcome = runner.run_cycle(&target(), "-sV").await;
        assert!(matches!(outcome, CycleOutcome::Failed(CycleFailure::Storage(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn json_written_alongside_report() {
        let runner = CycleRunner::new(FixedProber(success()), MemoryStore::default(), clock(), "vuln_scan")
            .with_json(true);
        assert!(runner.run_cycle(&target(), "-sV").await.is_recorded());
        let writes = runner.store().writes.lock().unwrap();
        let keys: Vec<_> = writes.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "vuln_scan_scanme.example.org_1744243200.txt",
                "vuln_scan_scanme.example.org_1744243200.json"
            ]
        );
        let parsed: ScanResult = serde_json::from_str(&writes[1].1).unwrap();
        assert_eq!(parsed.hosts[0].protocols[0].ports[0].port, 22);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_cycles_get_distinct_keys() {
        let runner = CycleRunner::new(FixedProber(success()), MemoryStore::default(), clock(), "vuln_scan");
        let CycleOutcome::Recorded(first) = runner.run_cycle(&target(), "-sV").await else {
            panic!("first cycle failed");
        };
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        let CycleOutcome::Recorded(second) = runner.run_cycle(&target(), "-sV").await else {
            panic!("second cycle failed");
        };
        assert_ne!(first, second);
    }
}
