use std::collections::HashMap;
use std::path::Path;
use serde::Deserialize;
use anyhow::{Context, Result};
use shared::protocol::{DEFAULT_DOMAIN, DEFAULT_REGISTER_PORT, DEFAULT_SERVICE_TYPE};
use shared::types::RegistrationDescriptor;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browse: BrowseConfig,
    #[serde(default)]
    pub register: RegisterConfig,
    #[serde(default)]
    pub mdns: MdnsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowseConfig {
    #[serde(default = "default_service_type")]
    pub service_type: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Start browsing as soon as the daemon is up
    #[serde(default = "default_true")]
    pub autostart: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterConfig {
    #[serde(default = "default_service_type")]
    pub service_type: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Instance name; the system hostname when unset
    pub name: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub txt: HashMap<String, String>,
    #[serde(default)]
    pub autostart: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MdnsConfig {
    /// Restrict the daemon to this interface
    pub interface: Option<String>,
}

fn default_service_type() -> String {
    DEFAULT_SERVICE_TYPE.to_string()
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_port() -> u16 {
    DEFAULT_REGISTER_PORT
}

fn default_true() -> bool {
    true
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            domain: default_domain(),
            autostart: true,
        }
    }
}

impl Default for RegisterConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            domain: default_domain(),
            name: None,
            port: default_port(),
            txt: HashMap::new(),
            autostart: false,
        }
    }
}

impl RegisterConfig {
    /// Build the registration descriptor, naming the service after this host
    /// unless a name is configured.
    pub fn descriptor(&self) -> Result<RegistrationDescriptor> {
        let name = match &self.name {
            Some(name) => name.clone(),
            None => hostname::get()
                .context("Failed to get system hostname")?
                .to_string_lossy()
                .to_string(),
        };

        Ok(RegistrationDescriptor {
            service_type: self.service_type.clone(),
            name,
            domain: self.domain.clone(),
            port: self.port,
            txt: self.txt.clone(),
        })
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.browse.service_type, "_rxdnssd._tcp");
        assert_eq!(config.browse.domain, "local.");
        assert!(config.browse.autostart);
        assert_eq!(config.register.port, 123);
        assert!(!config.register.autostart);
        assert!(config.mdns.interface.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [browse]
            service_type = "_http._tcp"
            autostart = false

            [register]
            name = "kitchen"
            port = 8080
            txt = { path = "/api" }

            [mdns]
            interface = "eth0"
            "#,
        )
        .unwrap();

        assert_eq!(config.browse.service_type, "_http._tcp");
        assert_eq!(config.browse.domain, "local.");
        assert!(!config.browse.autostart);
        assert_eq!(config.mdns.interface.as_deref(), Some("eth0"));

        let descriptor = config.register.descriptor().unwrap();
        assert_eq!(descriptor.name, "kitchen");
        assert_eq!(descriptor.service_type, "_rxdnssd._tcp");
        assert_eq!(descriptor.port, 8080);
        assert_eq!(descriptor.txt.get("path").map(String::as_str), Some("/api"));
    }

    #[test]
    fn test_descriptor_defaults_to_hostname() {
        let descriptor = RegisterConfig::default().descriptor().unwrap();
        assert!(!descriptor.name.is_empty());
    }
}
