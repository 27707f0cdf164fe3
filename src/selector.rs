use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::interface::{InterfaceProvider, NetworkInterfaceInfo};

/// Gateway assumed when none of the interfaces reports one.
pub const FALLBACK_GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

/// Picks the physical interface that carries the default route, and its gateway.
///
/// Selection never fails: when nothing usable is found, it degrades to a per-OS default name
/// and [`FALLBACK_GATEWAY`].
#[derive(Clone)]
pub struct InterfaceSelector {
    provider: Arc<dyn InterfaceProvider>,
    fallback_name: &'static str,
}

impl InterfaceSelector {
    pub fn new(provider: Arc<dyn InterfaceProvider>, fallback_name: &'static str) -> Self {
        Self {
            provider,
            fallback_name,
        }
    }

    pub fn provider(&self) -> &Arc<dyn InterfaceProvider> {
        &self.provider
    }

    /// Returns the name of the primary interface.
    ///
    /// Rules, first match wins:
    /// 1. the up, non-loopback interface owning the source address of the default route;
    /// 2. the fastest up wireless interface with an IPv4 address and a gateway;
    /// 3. the fastest up, non-loopback, non-tunnel interface with an IPv4 address and a gateway;
    /// 4. the first up, non-loopback interface with an IPv4 address;
    /// 5. the OS default name.
    pub fn select_primary_interface(&self) -> String {
        let interfaces = match self.provider.interfaces() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                error!("Error detecting network interface: {:?}", e);
                return self.fallback();
            }
        };

        match self.provider.default_route_source() {
            Ok(local_ip) => {
                info!("Local IP connecting to internet appears to be: {}", local_ip);
                if let Some(iface) = exact_match(&interfaces, local_ip) {
                    info!(
                        "Found exact interface match: {} with IP {}",
                        iface, local_ip
                    );
                    return iface.name.clone();
                }
            }
            Err(e) => warn!("Could not probe the default route: {:?}", e),
        }

        if let Some(iface) = fastest(
            interfaces
                .iter()
                .filter(|i| i.is_up() && i.looks_wireless() && i.has_ipv4() && i.has_gateway()),
        ) {
            info!("Using wireless interface with highest speed: {}", iface);
            return iface.name.clone();
        }

        if let Some(iface) = fastest(interfaces.iter().filter(|i| {
            i.is_up() && !i.is_loopback() && !i.is_tunnel() && i.has_ipv4() && i.has_gateway()
        })) {
            info!("Using interface with highest speed and gateway: {}", iface);
            return iface.name.clone();
        }

        if let Some(iface) = interfaces
            .iter()
            .find(|i| i.is_up() && !i.is_loopback() && i.has_ipv4())
        {
            info!("Found usable interface: {}", iface);
            return iface.name.clone();
        }

        self.fallback()
    }

    /// Returns the IPv4 gateway of the primary interface.
    ///
    /// Selection is re-run on every call. If the selected interface has no IPv4 gateway, the
    /// first one found on any up, non-loopback interface is used instead.
    pub fn select_gateway(&self) -> Ipv4Addr {
        let primary = self.select_primary_interface();

        match self.provider.interfaces() {
            Ok(interfaces) => {
                if let Some(gateway) = interfaces
                    .iter()
                    .find(|i| i.name == primary)
                    .and_then(NetworkInterfaceInfo::ipv4_gateway)
                {
                    info!("Found gateway: {} on interface {}", gateway, primary);
                    return gateway;
                }

                if let Some((iface, gateway)) = interfaces
                    .iter()
                    .filter(|i| i.is_up() && !i.is_loopback())
                    .find_map(|i| i.ipv4_gateway().map(|gw| (i, gw)))
                {
                    info!(
                        "Found gateway: {} on interface {} (fallback)",
                        gateway, iface.name
                    );
                    return gateway;
                }
            }
            Err(e) => error!("Error detecting gateway: {:?}", e),
        }

        warn!(
            "Could not detect gateway, using default: {}",
            FALLBACK_GATEWAY
        );
        FALLBACK_GATEWAY
    }

    fn fallback(&self) -> String {
        warn!(
            "Could not detect network interface, using default: {}",
            self.fallback_name
        );
        self.fallback_name.to_string()
    }
}

fn exact_match(
    interfaces: &[NetworkInterfaceInfo],
    local_ip: Ipv4Addr,
) -> Option<&NetworkInterfaceInfo> {
    interfaces
        .iter()
        .filter(|i| i.is_up() && !i.is_loopback())
        .find(|i| i.ipv4.contains(&local_ip))
}

/// The candidate with the highest link speed. Ties keep the earliest candidate; unknown speed
/// ranks as zero.
fn fastest<'a>(
    candidates: impl Iterator<Item = &'a NetworkInterfaceInfo>,
) -> Option<&'a NetworkInterfaceInfo> {
    let mut best: Option<&NetworkInterfaceInfo> = None;
    for candidate in candidates {
        let faster = match best {
            Some(current) => candidate.speed.unwrap_or(0) > current.speed.unwrap_or(0),
            None => true,
        };
        if faster {
            best = Some(candidate);
        }
    }
    best
}
