//! Decoder for `nmap -oX` output.
//!
//! Only the parts that end up in a report are modelled; everything else in the
//! document is ignored.
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::types::{HostRecord, PortRecord, ProtocolPorts, ScanResult, ScriptFinding, Target};

#[derive(Debug, Deserialize)]
struct NmapRun {
    #[serde(rename = "host", default)]
    hosts: Vec<XmlHost>,
}

#[derive(Debug, Deserialize)]
struct XmlHost {
    #[serde(default)]
    status: Option<XmlStatus>,
    #[serde(rename = "address", default)]
    addresses: Vec<XmlAddress>,
    #[serde(default)]
    hostnames: Option<XmlHostnames>,
    #[serde(default)]
    ports: Option<XmlPorts>,
}

#[derive(Debug, Deserialize)]
struct XmlStatus {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Deserialize)]
struct XmlAddress {
    #[serde(rename = "@addr")]
    addr: String,
    #[serde(rename = "@addrtype", default)]
    addr_type: String,
}

#[derive(Debug, Deserialize)]
struct XmlHostnames {
    #[serde(rename = "hostname", default)]
    names: Vec<XmlHostname>,
}

#[derive(Debug, Deserialize)]
struct XmlHostname {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct XmlPorts {
    #[serde(rename = "port", default)]
    ports: Vec<XmlPort>,
}

#[derive(Debug, Deserialize)]
struct XmlPort {
    #[serde(rename = "@protocol")]
    protocol: String,
    #[serde(rename = "@portid")]
    portid: u16,
    state: XmlPortState,
    #[serde(default)]
    service: Option<XmlService>,
    #[serde(rename = "script", default)]
    scripts: Vec<XmlScript>,
}

#[derive(Debug, Deserialize)]
struct XmlPortState {
    #[serde(rename = "@state")]
    state: String,
}

#[derive(Debug, Default, Deserialize)]
struct XmlService {
    #[serde(rename = "@name", default)]
    name: String,
    #[serde(rename = "@product", default)]
    product: String,
    #[serde(rename = "@version", default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct XmlScript {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@output", default)]
    output: String,
}

/// Decode an XML scan report into a [`ScanResult`] for `target`.
///
/// Hosts and protocols keep document order. Ports are not sorted here.
pub fn parse_nmap_xml(target: &Target, xml: &str) -> Result<ScanResult, quick_xml::de::DeError> {
    if !xml.contains("<nmaprun") {
        return Err(serde::de::Error::custom("no <nmaprun> element in engine output"));
    }
    let run: NmapRun = from_str(xml)?;
    let hosts = run.hosts.into_iter().map(host_record).collect();
    Ok(ScanResult {
        target: target.clone(),
        hosts,
    })
}

fn host_record(host: XmlHost) -> HostRecord {
    // Prefer the IP address; a MAC address entry only shows up on local segments.
    let address = host
        .addresses
        .iter()
        .find(|a| a.addr_type != "mac")
        .or_else(|| host.addresses.first())
        .map(|a| a.addr.clone())
        .unwrap_or_default();
    let hostname = host
        .hostnames
        .and_then(|h| h.names.into_iter().next())
        .map(|h| h.name)
        .unwrap_or_default();
    let state = host
        .status
        .map(|s| s.state)
        .unwrap_or_else(|| "unknown".to_string());

    let mut protocols: Vec<ProtocolPorts> = Vec::new();
    for p in host.ports.map(|p| p.ports).unwrap_or_default() {
        let service = p.service.unwrap_or_default();
        let record = PortRecord {
            port: p.portid,
            state: p.state.state,
            service: service.name,
            product: service.product,
            version: service.version,
            scripts: p
                .scripts
                .into_iter()
                .map(|s| ScriptFinding {
                    id: s.id,
                    output: s.output,
                })
                .collect(),
        };
        match protocols.iter_mut().find(|g| g.protocol == p.protocol) {
            Some(group) => group.ports.push(record),
            None => protocols.push(ProtocolPorts {
                protocol: p.protocol,
                ports: vec![record],
            }),
        }
    }

    HostRecord {
        address,
        hostname,
        state,
        protocols,
    }
}
