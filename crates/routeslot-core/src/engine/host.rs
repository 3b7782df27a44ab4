use async_trait::async_trait;
use serde::Serialize;
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::process::Command;
use tracing::debug;

/// A network interface found on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub index: u32,
}

/// Host networking facilities the supervisor depends on.
#[async_trait]
pub trait HostNetwork: Send + Sync {
    /// Returns the first interface whose name contains one of `patterns`.
    async fn find_interface(&self, patterns: &[String]) -> io::Result<Option<InterfaceInfo>>;

    /// Routes `cidr` through `interface`.
    async fn add_route(&self, cidr: &str, interface: &str) -> io::Result<()>;

    async fn remove_route(&self, cidr: &str, interface: &str) -> io::Result<()>;
}

/// Linux implementation: `/sys/class/net` for interfaces, `ip route` for routes.
pub struct LinuxHost {
    sys_class_net: PathBuf,
    ip_binary: PathBuf,
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self { sys_class_net: PathBuf::from("/sys/class/net"), ip_binary: PathBuf::from("ip") }
    }
}

impl LinuxHost {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads interfaces from another directory laid out like `/sys/class/net`.
    #[must_use]
    pub fn with_sys_class_net(mut self, path: impl Into<PathBuf>) -> Self {
        self.sys_class_net = path.into();
        self
    }

    async fn read_index(dir: &Path) -> io::Result<u32> {
        let raw = tokio::fs::read_to_string(dir.join("ifindex")).await?;
        raw.trim()
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad ifindex '{}': {e}", raw.trim())))
    }

    async fn ip_route(&self, action: &str, cidr: &str, interface: &str) -> io::Result<()> {
        let output = Command::new(&self.ip_binary)
            .args(["route", action, cidr, "dev", interface])
            .output()
            .await?;

        if output.status.success() {
            debug!(action, cidr, interface, "ip route applied");
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "ip route {action} {cidr} dev {interface} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[async_trait]
impl HostNetwork for LinuxHost {
    async fn find_interface(&self, patterns: &[String]) -> io::Result<Option<InterfaceInfo>> {
        let mut entries = tokio::fs::read_dir(&self.sys_class_net).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        for pattern in patterns {
            if let Some(name) = names.iter().find(|name| name.contains(pattern.as_str())) {
                let index = Self::read_index(&self.sys_class_net.join(name)).await?;
                return Ok(Some(InterfaceInfo { name: name.clone(), index }));
            }
        }
        Ok(None)
    }

    async fn add_route(&self, cidr: &str, interface: &str) -> io::Result<()> {
        self.ip_route("replace", cidr, interface).await
    }

    async fn remove_route(&self, cidr: &str, interface: &str) -> io::Result<()> {
        self.ip_route("del", cidr, interface).await
    }
}
