use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use anyhow::Context;

/// Address used to ask the OS routing table which local address carries default-route traffic.
/// Nothing is ever sent to it.
pub const ROUTE_PROBE_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 53);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperStatus {
    Up,
    Down,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InterfaceKind {
    Physical,
    Loopback,
    Tunnel,
    Wireless,
}

impl Display for InterfaceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Physical => write!(f, "physical"),
            Self::Loopback => write!(f, "loopback"),
            Self::Tunnel => write!(f, "tunnel"),
            Self::Wireless => write!(f, "wireless"),
        }
    }
}

/// Snapshot of one OS network interface, taken at selection time.
#[derive(Clone, Debug)]
pub struct NetworkInterfaceInfo {
    pub name: String,
    pub description: String,
    pub status: OperStatus,
    pub kind: InterfaceKind,
    pub ipv4: Vec<Ipv4Addr>,
    pub gateways: Vec<IpAddr>,
    /// Link speed in bits per second, if the OS reports one.
    pub speed: Option<u64>,
}

impl NetworkInterfaceInfo {
    pub fn is_up(&self) -> bool {
        self.status == OperStatus::Up
    }

    pub fn is_loopback(&self) -> bool {
        self.kind == InterfaceKind::Loopback
    }

    pub fn is_tunnel(&self) -> bool {
        self.kind == InterfaceKind::Tunnel
    }

    pub fn has_ipv4(&self) -> bool {
        !self.ipv4.is_empty()
    }

    pub fn has_gateway(&self) -> bool {
        !self.gateways.is_empty()
    }

    pub fn ipv4_gateway(&self) -> Option<Ipv4Addr> {
        self.gateways.iter().find_map(|gw| match gw {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }

    /// Whether the name or the description advertises a wireless adapter.
    pub fn looks_wireless(&self) -> bool {
        const MARKERS: [&str; 3] = ["wireless", "wifi", "wi-fi"];
        let name = self.name.to_lowercase();
        let description = self.description.to_lowercase();
        MARKERS
            .iter()
            .any(|m| name.contains(m) || description.contains(m))
    }
}

impl Display for NetworkInterfaceInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.description.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.description)
        }
    }
}

/// Access to the live network configuration of the host.
pub trait InterfaceProvider: Send + Sync {
    /// Enumerates all interfaces, in OS order. Never cached.
    fn interfaces(&self) -> anyhow::Result<Vec<NetworkInterfaceInfo>>;

    /// The local IPv4 address the OS would use as source for traffic on the default route.
    fn default_route_source(&self) -> anyhow::Result<Ipv4Addr>;
}

/// [`InterfaceProvider`] backed by the operating system.
#[derive(Default)]
pub struct SystemInterfaces;

impl InterfaceProvider for SystemInterfaces {
    fn interfaces(&self) -> anyhow::Result<Vec<NetworkInterfaceInfo>> {
        Ok(netdev::get_interfaces().iter().map(convert).collect())
    }

    fn default_route_source(&self) -> anyhow::Result<Ipv4Addr> {
        // Connecting a UDP socket only selects a route; no packet leaves the host.
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .with_context(|| "Failed to bind route probe socket")?;
        socket
            .connect(ROUTE_PROBE_ADDR)
            .with_context(|| "Failed to resolve a route to the internet")?;
        match socket
            .local_addr()
            .with_context(|| "Failed to read route probe address")?
            .ip()
        {
            IpAddr::V4(v4) if !v4.is_unspecified() => Ok(v4),
            other => Err(anyhow::anyhow!(
                "Route probe returned unusable local address {}",
                other
            )),
        }
    }
}

fn convert(iface: &netdev::Interface) -> NetworkInterfaceInfo {
    let kind = if iface.is_loopback() || iface.if_type == netdev::interface::InterfaceType::Loopback
    {
        InterfaceKind::Loopback
    } else if iface.is_tun() || iface.if_type == netdev::interface::InterfaceType::Tunnel {
        InterfaceKind::Tunnel
    } else if iface.if_type == netdev::interface::InterfaceType::Wireless80211 {
        InterfaceKind::Wireless
    } else {
        InterfaceKind::Physical
    };

    let gateways = iface
        .gateway
        .as_ref()
        .map(|gw| {
            gw.ipv4
                .iter()
                .copied()
                .map(IpAddr::V4)
                .chain(gw.ipv6.iter().copied().map(IpAddr::V6))
                .collect()
        })
        .unwrap_or_default();

    NetworkInterfaceInfo {
        name: display_name(iface),
        description: iface.description.clone().unwrap_or_default(),
        status: if iface.is_up() {
            OperStatus::Up
        } else {
            OperStatus::Down
        },
        kind,
        ipv4: iface.ipv4.iter().map(|net| net.addr()).collect(),
        gateways,
        speed: iface.transmit_speed.or(iface.receive_speed),
    }
}

/// Windows tools address adapters by their friendly name ("Wi-Fi"), not by GUID.
#[cfg(windows)]
fn display_name(iface: &netdev::Interface) -> String {
    iface
        .friendly_name
        .clone()
        .unwrap_or_else(|| iface.name.clone())
}

#[cfg(not(windows))]
fn display_name(iface: &netdev::Interface) -> String {
    iface.name.clone()
}
