use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path};
use tokio::fs;
use tracing::warn;

use crate::models::User;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub api: ApiConf,
    pub polling: PollingConf,
    pub geocoding: GeocodingConf,
    pub mqtt: Option<MqttConf>,
    pub http: HttpConf,
    /// clé API → utilisateur (fourni par le fournisseur de session)
    pub sessions: HashMap<String, User>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConf {
    pub base_url: String,      // ex: "https://cranes.example.com"
    pub token: Option<String>, // envoyé en "Authorization: Bearer ..."
    pub crane_limit: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConf {
    pub status_interval_secs: u64,
    pub cranes_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GeocodingConf {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String, // télémétrie sur {prefix}/{craneId}/telemetry
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
}

fn default_topic_prefix() -> String {
    "cranes".into()
}

impl Default for ApiConf {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".into(),
            token: None,
            crane_limit: 100,
            timeout_secs: 10,
        }
    }
}

impl Default for PollingConf {
    fn default() -> Self {
        Self { status_interval_secs: 10, cranes_interval_secs: 10 }
    }
}

impl Default for GeocodingConf {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".into(),
            user_agent: concat!("craneboard-kernel/", env!("CARGO_PKG_VERSION")).into(),
            timeout_secs: 5,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

/// Lecture de la config ; fichier absent ou invalide → défauts, jamais fatal
pub async fn load_config() -> KernelConfig {
    let path = std::env::var("CRANEBOARD_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    if !Path::new(&path).exists() {
        warn!("no {} found, using default config", path);
        return KernelConfig::default();
    }
    let txt = fs::read_to_string(&path).await.unwrap_or_default();
    parse_config(&txt)
}

pub fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("invalid config: {e}");
        KernelConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_defaults_poll_every_ten_seconds() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.polling.status_interval_secs, 10);
        assert_eq!(cfg.polling.cranes_interval_secs, 10);
        assert!(cfg.mqtt.is_none());
        assert!(cfg.sessions.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = parse_config(
            r#"
api:
  base_url: "http://backend:4000"
mqtt:
  host: broker
  port: 1883
sessions:
  key-admin:
    name: Ana
    role: admin
  key-mgr:
    name: Maya
    role: manager
    assigned_cranes: ["TC-1"]
"#,
        );
        assert_eq!(cfg.api.base_url, "http://backend:4000");
        assert_eq!(cfg.api.crane_limit, 100);
        assert_eq!(cfg.mqtt.as_ref().map(|m| m.topic_prefix.as_str()), Some("cranes"));
        assert_eq!(cfg.sessions["key-admin"].role, Role::Admin);
        assert!(cfg.sessions["key-mgr"].assigned_cranes.contains("TC-1"));
    }

    #[test]
    fn test_invalid_yaml_falls_back() {
        let cfg = parse_config("api: [not, a, map");
        assert_eq!(cfg.http.bind, "0.0.0.0:8080");
    }
}
