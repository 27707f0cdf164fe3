//! Per-OS tunnel setup strategies.
//!
//! Every strategy follows the same lifecycle, driven by the orchestrator:
//! detect the uplink, run the commands that must precede the tunnel process, start the
//! process, optionally wait for its virtual device, then run the remaining commands.

use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

use crate::command::CommandSpec;
use crate::proxy::ProxyEndpoint;
use crate::selector::InterfaceSelector;

pub mod linux;
pub mod macos;
pub mod windows;

pub use linux::LinuxStrategy;
pub use macos::MacOsStrategy;
pub use windows::WindowsStrategy;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Platform {
    Windows,
    MacOs,
    /// Both glibc and musl targets.
    Linux,
    Unsupported(String),
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unsupported(std::env::consts::OS.to_string())
        }
    }

    /// Interface name assumed when detection finds nothing.
    pub fn fallback_interface(&self) -> &'static str {
        match self {
            Platform::Windows => "Ethernet",
            Platform::MacOs => "en0",
            Platform::Linux | Platform::Unsupported(_) => "eth0",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Windows => write!(f, "Windows"),
            Platform::MacOs => write!(f, "macOS"),
            Platform::Linux => write!(f, "Linux"),
            Platform::Unsupported(os) => write!(f, "{}", os),
        }
    }
}

/// The physical side of the tunnel: where the proxy traffic itself leaves the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Uplink {
    pub interface: String,
    /// Only detected where the setup needs it.
    pub gateway: Option<Ipv4Addr>,
}

/// How one operating system gets its traffic into the tunnel.
pub trait TunnelStrategy: Send + Sync {
    fn platform(&self) -> Platform;

    /// Name of the virtual device `tun2socks` attaches to.
    fn device(&self) -> &'static str;

    fn detect(&self, selector: &InterfaceSelector) -> Uplink;

    /// Commands that must complete before the tunnel process starts.
    fn before_launch(&self, _uplink: &Uplink) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Whether the virtual device is created by the tunnel process itself, so that
    /// [`TunnelStrategy::after_launch`] has to wait for it.
    fn device_created_by_tunnel(&self) -> bool;

    /// Commands configuring the virtual device once the tunnel process runs.
    fn after_launch(&self, _uplink: &Uplink) -> Vec<CommandSpec> {
        Vec::new()
    }

    /// Arguments for the tunnel executable.
    fn tunnel_args(&self, proxy: &ProxyEndpoint, uplink: &Uplink) -> Vec<String> {
        vec![
            "-device".to_string(),
            self.device().to_string(),
            "-proxy".to_string(),
            proxy.url(),
            "-interface".to_string(),
            uplink.interface.clone(),
        ]
    }
}

/// Selects the strategy for `platform`.
pub fn strategy_for(platform: &Platform) -> anyhow::Result<Box<dyn TunnelStrategy>> {
    match platform {
        Platform::Windows => Ok(Box::new(WindowsStrategy)),
        Platform::MacOs => Ok(Box::new(MacOsStrategy)),
        Platform::Linux => Ok(Box::new(LinuxStrategy)),
        Platform::Unsupported(os) => Err(anyhow::anyhow!(
            "Operating system not supported: {}",
            os
        )),
    }
}
