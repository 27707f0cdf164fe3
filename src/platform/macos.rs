use std::net::Ipv4Addr;

use super::{Platform, TunnelStrategy, Uplink};
use crate::command::CommandSpec;
use crate::selector::InterfaceSelector;

pub const DEVICE: &str = "utun123";
pub const DEVICE_ADDR: Ipv4Addr = Ipv4Addr::new(198, 18, 0, 1);

/// Routes that together cover 1.0.0.0 - 255.255.255.255. They are more specific than any
/// default route, so they win without touching it; 0.0.0.0/8 is never routable anyway.
pub const ROUTE_LADDER: [(Ipv4Addr, u8); 8] = [
    (Ipv4Addr::new(1, 0, 0, 0), 8),
    (Ipv4Addr::new(2, 0, 0, 0), 7),
    (Ipv4Addr::new(4, 0, 0, 0), 6),
    (Ipv4Addr::new(8, 0, 0, 0), 5),
    (Ipv4Addr::new(16, 0, 0, 0), 4),
    (Ipv4Addr::new(32, 0, 0, 0), 3),
    (Ipv4Addr::new(64, 0, 0, 0), 2),
    (Ipv4Addr::new(128, 0, 0, 0), 1),
];

/// The benchmark block the tunnel addresses itself from.
pub const TUNNEL_NET: (Ipv4Addr, u8) = (Ipv4Addr::new(198, 18, 0, 0), 15);

/// macOS: `tun2socks` opens the utun device, which is then brought up point-to-point and
/// covered by a ladder of routes.
pub struct MacOsStrategy;

impl TunnelStrategy for MacOsStrategy {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    fn device(&self) -> &'static str {
        DEVICE
    }

    fn detect(&self, selector: &InterfaceSelector) -> Uplink {
        info!("Detecting primary network interface...");
        let interface = selector.select_primary_interface();
        info!("Using {} as primary network interface", interface);
        Uplink {
            interface,
            gateway: None,
        }
    }

    fn device_created_by_tunnel(&self) -> bool {
        true
    }

    fn after_launch(&self, _uplink: &Uplink) -> Vec<CommandSpec> {
        let addr = DEVICE_ADDR.to_string();
        let mut commands = vec![CommandSpec::new(
            "ifconfig",
            [DEVICE, &addr, &addr, "up"],
        )];
        commands.extend(
            ROUTE_LADDER
                .iter()
                .chain(std::iter::once(&TUNNEL_NET))
                .map(|(net, prefix)| {
                    CommandSpec::new(
                        "route",
                        ["add", "-net", &format!("{}/{}", net, prefix), &addr],
                    )
                }),
        );
        commands
    }
}
