use super::{Platform, TunnelStrategy, Uplink};
use crate::command::CommandSpec;
use crate::selector::InterfaceSelector;

/// Adapter created by `tun2socks` through the Wintun driver.
pub const DEVICE: &str = "wintun";
pub const DEVICE_ADDR: &str = "192.168.123.1";
pub const DEVICE_MASK: &str = "255.255.255.0";
pub const DNS_SERVER: &str = "8.8.8.8";

/// Windows: `tun2socks` creates the Wintun adapter, which is then addressed with `netsh` and
/// given a preferred default route.
pub struct WindowsStrategy;

impl TunnelStrategy for WindowsStrategy {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn device(&self) -> &'static str {
        DEVICE
    }

    fn detect(&self, selector: &InterfaceSelector) -> Uplink {
        info!("Detecting primary network interface...");
        let interface = selector.select_primary_interface();
        info!("Using {} as the primary network interface", interface);
        Uplink {
            interface,
            gateway: None,
        }
    }

    fn device_created_by_tunnel(&self) -> bool {
        true
    }

    fn after_launch(&self, _uplink: &Uplink) -> Vec<CommandSpec> {
        let name = format!("name={}", DEVICE);
        vec![
            CommandSpec::new(
                "netsh",
                [
                    "interface",
                    "ipv4",
                    "set",
                    "address",
                    &name,
                    "source=static",
                    &format!("addr={}", DEVICE_ADDR),
                    &format!("mask={}", DEVICE_MASK),
                ],
            ),
            CommandSpec::new(
                "netsh",
                [
                    "interface",
                    "ipv4",
                    "set",
                    "dnsservers",
                    &name,
                    "static",
                    &format!("address={}", DNS_SERVER),
                    "register=none",
                    "validate=no",
                ],
            ),
            CommandSpec::new(
                "netsh",
                [
                    "interface",
                    "ipv4",
                    "add",
                    "route",
                    "0.0.0.0/0",
                    DEVICE,
                    DEVICE_ADDR,
                    "metric=1",
                ],
            ),
        ]
    }
}
