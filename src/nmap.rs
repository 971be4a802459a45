//! Typed view of nmap's XML output (`-oX`).
//!
//! Only the parts of the document the pipeline needs are modelled. Every
//! other element and attribute nmap emits is ignored, and optional parts
//! (hostnames, ports, service details) default to empty instead of failing.
use serde_derive::Deserialize;

use crate::error::ScanError;

/// The `<nmaprun>` root. One payload may describe any number of hosts.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct NmapRun {
    #[serde(rename = "host", default)]
    pub hosts: Vec<Host>,
}

/// One `<host>` record.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Host {
    #[serde(default)]
    pub status: Status,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub hostnames: Hostnames,
    #[serde(default)]
    pub ports: Ports,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Status {
    #[serde(rename = "@state", default)]
    pub state: String,
}

/// An address entry, tagged by family: `ipv4`, `ipv6` or `mac`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype", default)]
    pub addr_type: String,
    #[serde(rename = "@vendor", default)]
    pub vendor: Option<String>,
}

impl Address {
    /// Network layer address (IPv4 or IPv6).
    pub fn is_network(&self) -> bool {
        matches!(self.addr_type.as_str(), "ipv4" | "ipv6")
    }

    /// Link layer address.
    pub fn is_hardware(&self) -> bool {
        self.addr_type == "mac"
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub names: Vec<Hostname>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name", default)]
    pub name: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub list: Vec<Port>,
}

/// One `<port>` record.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Port {
    #[serde(rename = "@protocol")]
    pub protocol: String,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    #[serde(default)]
    pub state: PortState,
    #[serde(default)]
    pub service: Service,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct PortState {
    #[serde(rename = "@state", default)]
    pub state: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct Service {
    #[serde(rename = "@name", default)]
    pub name: String,
    #[serde(rename = "@product", default)]
    pub product: String,
    #[serde(rename = "@version", default)]
    pub version: String,
}

impl Host {
    pub fn is_up(&self) -> bool {
        self.status.state == "up"
    }

    /// The first IPv4/IPv6 address of the host.
    pub fn ip(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.is_network())
            .map(|a| a.addr.as_str())
    }

    /// The MAC address, only present when nmap ran on the same segment.
    pub fn mac(&self) -> Option<&str> {
        self.addresses
            .iter()
            .find(|a| a.is_hardware())
            .map(|a| a.addr.as_str())
    }

    /// The first reported hostname, if any.
    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .names
            .first()
            .map(|h| h.name.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn open_ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.list.iter().filter(|p| p.is_open())
    }
}

impl Port {
    pub fn is_open(&self) -> bool {
        self.state.state == "open"
    }

    /// Renders the port as `22/tcp ssh OpenSSH`.
    ///
    /// Service name and product are appended only when nmap reported them.
    /// A product without a service name follows the port directly
    /// (`9000/tcp Apache`), and a bare port is just `9000/tcp`.
    pub fn label(&self) -> String {
        let mut label = format!("{}/{}", self.port_id, self.protocol);
        for part in [&self.service.name, &self.service.product] {
            if !part.is_empty() {
                label.push(' ');
                label.push_str(part);
            }
        }
        label
    }
}

/// Parses one `-oX` payload.
pub fn parse(xml: &[u8]) -> Result<NmapRun, ScanError> {
    Ok(quick_xml::de::from_reader(xml)?)
}
