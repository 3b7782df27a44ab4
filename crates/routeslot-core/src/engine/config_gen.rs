use crate::{config::EngineConfig, provider::document::provider_name};
use serde_json::{json, Map, Value};
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Directory (inside the engine's config dir) where the engine caches provider documents.
pub const PROVIDER_CACHE_DIR: &str = "providers";

/// Renders the engine's static configuration.
///
/// Every slot gets an HTTP proxy provider pointing at the provider server, a `select`
/// group over that provider, and a local mixed listener routed through the group.
pub struct EngineConfigGenerator {
    engine: EngineConfig,
    provider_base_url: String,
    total_slots: u32,
}

impl EngineConfigGenerator {
    #[must_use]
    pub fn new(engine: EngineConfig, provider_base_url: impl Into<String>, total_slots: u32) -> Self {
        Self { engine, provider_base_url: provider_base_url.into(), total_slots }
    }

    #[must_use]
    pub fn render(&self) -> Value {
        let mut providers = Map::new();
        let mut groups = Vec::with_capacity(self.total_slots as usize);
        let mut listeners = Vec::with_capacity(self.total_slots as usize);

        for slot in 1..=self.total_slots {
            let name = provider_name(slot);
            providers.insert(
                name.clone(),
                json!({
                    "type": "http",
                    "url": format!("{}/provider/slot/{slot}", self.provider_base_url),
                    "interval": self.engine.provider_interval_seconds,
                    "path": format!("./{PROVIDER_CACHE_DIR}/{name}.yaml"),
                    "health-check": { "enable": false },
                }),
            );
            groups.push(json!({
                "name": name,
                "type": "select",
                "use": [name],
            }));
            listeners.push(json!({
                "name": format!("{name}-in"),
                "type": "mixed",
                "listen": "127.0.0.1",
                "port": u32::from(self.engine.listener_base_port) + slot,
                "proxy": name,
            }));
        }

        let mut root = json!({
            "mode": "rule",
            "log-level": "info",
            "allow-lan": false,
            "ipv6": false,
            "external-controller": format!(
                "{}:{}",
                self.engine.controller_host, self.engine.controller_port
            ),
            "tun": {
                "enable": true,
                "stack": "system",
                "device": self.engine.tun_device,
                "auto-route": false,
                "auto-detect-interface": false,
            },
            "proxy-providers": providers,
            "proxy-groups": groups,
            "listeners": listeners,
            "rules": ["MATCH,DIRECT"],
        });

        if let (Some(secret), Some(obj)) = (&self.engine.controller_secret, root.as_object_mut()) {
            obj.insert("secret".to_string(), Value::String(secret.clone()));
        }
        root
    }

    /// Removes the previous configuration and provider cache.
    ///
    /// # Errors
    /// Returns I/O errors other than "not found".
    pub async fn discard_previous(&self) -> io::Result<()> {
        let config_path = self.engine.config_path();
        match tokio::fs::remove_file(&config_path).await {
            Ok(()) => debug!(path = %config_path.display(), "removed previous engine config"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let cache = self.engine.config_dir.join(PROVIDER_CACHE_DIR);
        match tokio::fs::remove_dir_all(&cache).await {
            Ok(()) => debug!(path = %cache.display(), "removed provider cache"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Writes the configuration and checks the file landed non-empty.
    ///
    /// # Errors
    /// Returns I/O errors, or `InvalidData` if the written file is empty.
    pub async fn write(&self) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.engine.config_dir).await?;
        let path = self.engine.config_path();

        let rendered = serde_json::to_vec_pretty(&self.render()).map_err(io::Error::other)?;
        tokio::fs::write(&path, &rendered).await?;
        verify_non_empty(&path).await?;

        info!(path = %path.display(), slots = self.total_slots, bytes = rendered.len(), "engine config generated");
        Ok(path)
    }
}

async fn verify_non_empty(path: &Path) -> io::Result<()> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is empty after writing", path.display()),
        ));
    }
    Ok(())
}
