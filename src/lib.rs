//! Library crate for vulnwatch: scheduled single-target vulnerability scans.
pub mod clock;
pub mod config;
pub mod cycle;
pub mod error;
pub mod nmap_xml;
pub mod orchestrator;
pub mod probe;
pub mod report;
pub mod schedule;
pub mod storage;
pub mod types;
