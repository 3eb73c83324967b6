//! # config
//!
//! Environment-driven worker configuration (§6 "Environment variables").
//! There is no CLI flag parser here beyond `-v`/`--verbose` — the original
//! system reads everything else from the environment, and so does this one.

use std::env;

/// Runtime configuration for one protocol worker.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub mqtt_broker_host: String,
    pub elastic_url: Option<String>,
    pub elastic_user: Option<String>,
    pub elastic_password: Option<String>,
    pub plates_url: Option<String>,
    pub spoof_imei_url: Option<String>,
    pub client_id_tag: String,
    pub hostname: String,
    pub verbose: bool,
}

impl BridgeConfig {
    /// Reads configuration from the environment. `MQTT_BROKER_HOST` is the
    /// only required variable; everything else degrades to an absent
    /// collaborator (no audit sink, no plate lookup) rather than failing
    /// startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mqtt_broker_host =
            env::var("MQTT_BROKER_HOST").map_err(|_| ConfigError::MissingRequired("MQTT_BROKER_HOST"))?;
        let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "bridge-worker".to_string());
        let client_id_tag = env::var("CLIENT_ID").unwrap_or_else(|_| "default".to_string());
        let verbose = env::args().any(|a| a == "-v" || a == "--verbose");

        Ok(Self {
            mqtt_broker_host,
            elastic_url: env::var("ELASTIC_URL").ok(),
            elastic_user: env::var("ELASTIC_USER").ok(),
            elastic_password: env::var("ELASTIC_PASSWORD").ok(),
            plates_url: env::var("PLATES_URL").ok(),
            spoof_imei_url: env::var("SPOOF_IMEI_URL").ok(),
            client_id_tag,
            hostname,
            verbose,
        })
    }

    /// A client-id unique enough to satisfy §4.6 step 1 (hostname +
    /// timestamp) without depending on a wall-clock read at call sites
    /// that must stay deterministic — callers supply the timestamp.
    pub fn mqtt_client_id(&self, protocol: &str, unix_timestamp: i64) -> String {
        format!("{}-{protocol}-{}-{unix_timestamp}", self.hostname, self.client_id_tag)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingRequired(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mqtt_client_id_embeds_hostname_and_timestamp() {
        let config = BridgeConfig {
            mqtt_broker_host: "broker:1883".to_string(),
            elastic_url: None,
            elastic_user: None,
            elastic_password: None,
            plates_url: None,
            spoof_imei_url: None,
            client_id_tag: "fleetco".to_string(),
            hostname: "worker-1".to_string(),
            verbose: false,
        };
        let id = config.mqtt_client_id("gt06", 1_700_000_000);
        assert_eq!(id, "worker-1-gt06-fleetco-1700000000");
    }
}
