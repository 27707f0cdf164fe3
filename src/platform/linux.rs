use super::{Platform, TunnelStrategy, Uplink};
use crate::command::CommandSpec;
use crate::selector::{InterfaceSelector, FALLBACK_GATEWAY};

pub const DEVICE: &str = "tun0";
pub const DEVICE_ADDR: &str = "198.18.0.1";
pub const DEVICE_PREFIX: u8 = 15;

/// Metric of the default route through the tunnel.
pub const TUNNEL_METRIC: u32 = 1;
/// Metric the original default route is re-added with, so it stays as fallback.
pub const UPLINK_METRIC: u32 = 10;

/// Linux: the TUN device and all routing exist before `tun2socks` starts, which then binds
/// its outgoing sockets to the uplink interface.
pub struct LinuxStrategy;

impl TunnelStrategy for LinuxStrategy {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    fn device(&self) -> &'static str {
        DEVICE
    }

    fn detect(&self, selector: &InterfaceSelector) -> Uplink {
        info!("Detecting primary network interface and gateway...");
        let interface = selector.select_primary_interface();
        let gateway = selector.select_gateway();
        info!("Using {} as primary network interface", interface);
        info!("Using {} as primary gateway", gateway);
        Uplink {
            interface,
            gateway: Some(gateway),
        }
    }

    fn before_launch(&self, uplink: &Uplink) -> Vec<CommandSpec> {
        let gateway = uplink.gateway.unwrap_or(FALLBACK_GATEWAY).to_string();
        let iface = uplink.interface.as_str();
        vec![
            CommandSpec::new("ip", ["tuntap", "add", "mode", "tun", "dev", DEVICE]),
            CommandSpec::new(
                "ip",
                [
                    "addr",
                    "add",
                    &format!("{}/{}", DEVICE_ADDR, DEVICE_PREFIX),
                    "dev",
                    DEVICE,
                ],
            ),
            CommandSpec::new("ip", ["link", "set", "dev", DEVICE, "up"]),
            CommandSpec::new("ip", ["route", "del", "default"]),
            CommandSpec::new(
                "ip",
                [
                    "route",
                    "add",
                    "default",
                    "via",
                    DEVICE_ADDR,
                    "dev",
                    DEVICE,
                    "metric",
                    &TUNNEL_METRIC.to_string(),
                ],
            ),
            CommandSpec::new(
                "ip",
                [
                    "route",
                    "add",
                    "default",
                    "via",
                    &gateway,
                    "dev",
                    iface,
                    "metric",
                    &UPLINK_METRIC.to_string(),
                ],
            ),
            // Replies to tunneled connections arrive on the uplink with tunnel-side addresses.
            CommandSpec::new("sysctl", ["net.ipv4.conf.all.rp_filter=0"]),
            CommandSpec::new("sysctl", [format!("net.ipv4.conf.{}.rp_filter=0", iface)]),
        ]
    }

    fn device_created_by_tunnel(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_order() {
        let uplink = Uplink {
            interface: "wlp2s0".into(),
            gateway: Some("192.168.0.254".parse().unwrap()),
        };
        let commands: Vec<String> = LinuxStrategy
            .before_launch(&uplink)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            commands,
            [
                "ip tuntap add mode tun dev tun0",
                "ip addr add 198.18.0.1/15 dev tun0",
                "ip link set dev tun0 up",
                "ip route del default",
                "ip route add default via 198.18.0.1 dev tun0 metric 1",
                "ip route add default via 192.168.0.254 dev wlp2s0 metric 10",
                "sysctl net.ipv4.conf.all.rp_filter=0",
                "sysctl net.ipv4.conf.wlp2s0.rp_filter=0",
            ]
        );
        assert!(LinuxStrategy.after_launch(&uplink).is_empty());
        assert!(!LinuxStrategy.device_created_by_tunnel());
    }

    #[test]
    fn test_missing_gateway_uses_fallback() {
        let uplink = Uplink {
            interface: "eth0".into(),
            gateway: None,
        };
        let commands = LinuxStrategy.before_launch(&uplink);
        assert_eq!(
            commands[5].to_string(),
            "ip route add default via 192.168.1.1 dev eth0 metric 10"
        );
    }
}
