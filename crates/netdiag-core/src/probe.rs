//! Probe kinds, start parameters and decoded result types
//!
//! Everything a caller sees on the streaming side of the API lives here:
//! which probe is running ([`ProbeKind`]), how it was started
//! ([`ProbeParams`]), and what its subscribers receive ([`ProbeEvent`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::error::{DecodeError, Error, Result};

/// The probe kinds with a session slot of their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// ICMP echo
    Ping,
    /// ICMP traceroute
    Traceroute,
    /// UDP traceroute
    UdpTraceroute,
    /// TCP connect ping
    TcpPing,
    /// TCP port scan
    PortScan,
    /// LAN host discovery
    LanScan,
}

impl ProbeKind {
    /// All kinds, in declaration order
    pub const ALL: [ProbeKind; 6] = [
        ProbeKind::Ping,
        ProbeKind::Traceroute,
        ProbeKind::UdpTraceroute,
        ProbeKind::TcpPing,
        ProbeKind::PortScan,
        ProbeKind::LanScan,
    ];

    /// Whether sessions of this kind end on their own
    ///
    /// Unbounded kinds keep running until stopped (UDP traceroute) or until
    /// the engine reports they finished (LAN scan).
    pub fn self_terminates(self) -> bool {
        !matches!(self, ProbeKind::UdpTraceroute | ProbeKind::LanScan)
    }

    /// Short lowercase name used in logs
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeKind::Ping => "ping",
            ProbeKind::Traceroute => "traceroute",
            ProbeKind::UdpTraceroute => "udp_traceroute",
            ProbeKind::TcpPing => "tcp_ping",
            ProbeKind::PortScan => "port_scan",
            ProbeKind::LanScan => "lan_scan",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one started session, unique for the lifetime of a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ports covered by a port scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortSelection {
    /// Inclusive range `begin..=end`
    Range { begin: u16, end: u16 },
    /// Explicit list, scanned in the given order
    List(Vec<u16>),
}

impl PortSelection {
    /// Number of ports the scan will visit
    pub fn len(&self) -> usize {
        match self {
            PortSelection::Range { begin, end } if begin <= end => (*end - *begin) as usize + 1,
            PortSelection::Range { .. } => 0,
            PortSelection::List(ports) => ports.len(),
        }
    }

    /// Whether the selection covers no port at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Kind-specific start parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeParams {
    Ping { host: String, count: u32 },
    Traceroute { host: String },
    UdpTraceroute { host: String, max_ttl: u8 },
    TcpPing { host: String, port: u16, count: u32 },
    PortScan { host: String, ports: PortSelection },
    LanScan,
}

impl ProbeParams {
    /// The session slot these parameters start
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeParams::Ping { .. } => ProbeKind::Ping,
            ProbeParams::Traceroute { .. } => ProbeKind::Traceroute,
            ProbeParams::UdpTraceroute { .. } => ProbeKind::UdpTraceroute,
            ProbeParams::TcpPing { .. } => ProbeKind::TcpPing,
            ProbeParams::PortScan { .. } => ProbeKind::PortScan,
            ProbeParams::LanScan => ProbeKind::LanScan,
        }
    }

    /// Target host, if the probe has one
    pub fn host(&self) -> Option<&str> {
        match self {
            ProbeParams::Ping { host, .. }
            | ProbeParams::Traceroute { host }
            | ProbeParams::UdpTraceroute { host, .. }
            | ProbeParams::TcpPing { host, .. }
            | ProbeParams::PortScan { host, .. } => Some(host),
            ProbeParams::LanScan => None,
        }
    }

    /// Reject parameters the engine could never act on
    pub fn validate(&self) -> Result<()> {
        if let Some(host) = self.host()
            && host.trim().is_empty()
        {
            return Err(Error::invalid_input(format!("{}: host cannot be empty", self.kind())));
        }

        match self {
            ProbeParams::Ping { count, .. } | ProbeParams::TcpPing { count, .. } if *count == 0 => {
                Err(Error::invalid_input(format!("{}: count must be > 0", self.kind())))
            }
            ProbeParams::UdpTraceroute { max_ttl: 0, .. } => {
                Err(Error::invalid_input("udp_traceroute: max_ttl must be > 0"))
            }
            ProbeParams::PortScan {
                ports: PortSelection::Range { begin, end },
                ..
            } if begin > end => Err(Error::invalid_input(format!(
                "port_scan: begin port {} is after end port {}",
                begin, end
            ))),
            ProbeParams::PortScan {
                ports: PortSelection::List(ports),
                ..
            } if ports.is_empty() => Err(Error::invalid_input("port_scan: port list is empty")),
            _ => Ok(()),
        }
    }
}

/// One ICMP echo line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResult {
    #[serde(rename = "result")]
    pub text: String,
    #[serde(rename = "isEnd")]
    pub is_end: bool,
}

/// One traceroute hop line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerouteResult {
    #[serde(rename = "result")]
    pub text: String,
    #[serde(rename = "destIp")]
    pub dest_ip: String,
    #[serde(rename = "isEnd")]
    pub is_end: bool,
}

/// One UDP traceroute line; the stream has no natural end
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpTracerouteResult {
    #[serde(rename = "result")]
    pub text: String,
}

/// One TCP connect attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpPingResult {
    #[serde(rename = "result")]
    pub text: String,
    #[serde(rename = "isEnd")]
    pub is_end: bool,
}

/// Outcome for a single scanned port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortScanResult {
    pub port: u16,
    #[serde(rename = "isOpen")]
    pub is_open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when this is the last port of the selection
    #[serde(rename = "isEnd", default)]
    pub is_end: bool,
}

/// A host that answered during a LAN scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanScanActiveIp {
    pub ip: IpAddr,
}

/// LAN scan progress in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanScanProgress {
    pub percent: f64,
}

/// A typed result, one variant per engine event
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResult {
    Ping(PingResult),
    Traceroute(TracerouteResult),
    UdpTraceroute(UdpTracerouteResult),
    TcpPing(TcpPingResult),
    PortScan(PortScanResult),
    LanScanActiveIp(LanScanActiveIp),
    LanScanProgress(LanScanProgress),
    LanScanFinished,
}

impl DecodedResult {
    /// The session slot this result belongs to
    pub fn kind(&self) -> ProbeKind {
        match self {
            DecodedResult::Ping(_) => ProbeKind::Ping,
            DecodedResult::Traceroute(_) => ProbeKind::Traceroute,
            DecodedResult::UdpTraceroute(_) => ProbeKind::UdpTraceroute,
            DecodedResult::TcpPing(_) => ProbeKind::TcpPing,
            DecodedResult::PortScan(_) => ProbeKind::PortScan,
            DecodedResult::LanScanActiveIp(_)
            | DecodedResult::LanScanProgress(_)
            | DecodedResult::LanScanFinished => ProbeKind::LanScan,
        }
    }

    /// Whether this is the last result of its session
    pub fn is_terminal(&self) -> bool {
        match self {
            DecodedResult::Ping(r) => r.is_end,
            DecodedResult::Traceroute(r) => r.is_end,
            DecodedResult::TcpPing(r) => r.is_end,
            DecodedResult::PortScan(r) => r.is_end,
            DecodedResult::LanScanFinished => true,
            DecodedResult::UdpTraceroute(_)
            | DecodedResult::LanScanActiveIp(_)
            | DecodedResult::LanScanProgress(_) => false,
        }
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    /// A successfully decoded result
    Result {
        session: SessionId,
        result: DecodedResult,
    },
    /// A record that could not be turned into a result
    ///
    /// `terminal` is set when the record still ended its session.
    Failed {
        session: SessionId,
        kind: ProbeKind,
        error: DecodeError,
        terminal: bool,
    },
}

impl ProbeEvent {
    pub fn session(&self) -> SessionId {
        match self {
            ProbeEvent::Result { session, .. } | ProbeEvent::Failed { session, .. } => *session,
        }
    }

    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeEvent::Result { result, .. } => result.kind(),
            ProbeEvent::Failed { kind, .. } => *kind,
        }
    }

    pub fn result(&self) -> Option<&DecodedResult> {
        match self {
            ProbeEvent::Result { result, .. } => Some(result),
            ProbeEvent::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ProbeEvent::Result { result, .. } => result.is_terminal(),
            ProbeEvent::Failed { terminal, .. } => *terminal,
        }
    }
}

/// One name/address pair from a domain lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRecord {
    pub name: String,
    pub ip: IpAddr,
}

/// Device-side view of the current network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceNetInfo {
    pub net_type: String,
    #[serde(rename = "wifiSSID")]
    pub wifi_ssid: String,
    #[serde(rename = "wifiBSSID")]
    pub wifi_bssid: String,
    #[serde(rename = "wifiIPV4")]
    pub wifi_ipv4: String,
    pub wifi_netmask: String,
    #[serde(rename = "wifiIPV6")]
    pub wifi_ipv6: String,
    #[serde(rename = "cellIPV4")]
    pub cell_ipv4: String,
}

/// Public address information as seen from outside
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpInfoModel {
    pub ip: String,
    pub city: String,
    pub region: String,
    pub country: String,
    pub location: String,
    pub org: String,
}

/// Atomic snapshot returned by the network info query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub device_net_info: DeviceNetInfo,
    pub ip_info_model: IpInfoModel,
}
