//! Bridge configuration: endpoint addresses, credentials, identity,
//! logging, and message filters.
//!
//! Settings are loadable from a TOML file whose keys match the CLI flag
//! spellings. The root device identity is not configured directly — it
//! is read from the common name of the device certificate at startup.

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use x509_parser::pem::parse_x509_pem;

use sb_mqtt_channel::ConnectionConfig;

/// Configuration errors that abort startup.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid filter regex '{pattern}': {source}")]
    Filter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("cannot parse the device certificate: {0}")]
    Certificate(String),

    #[error("missing required setting '{0}'")]
    Missing(&'static str),

    #[error("invalid address '{0}'")]
    Address(String),
}

/// Compiled message filters, immutable after startup.
#[derive(Debug, Clone, Default)]
pub struct MessageFilters {
    /// Messages whose Ditto topic matches are dropped entirely.
    pub topic_filter: Option<Regex>,
    /// JSON leaf paths matching any of these are removed from payloads.
    pub payload_filters: Vec<Regex>,
}

/// All configurable data of the bridge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// AWS IoT Core endpoint URL.
    pub address: String,
    /// Remote MQTT client ID. Defaults to the device ID.
    pub client_id: String,
    /// Tenant ID forwarded with pass-through events.
    pub tenant_id: String,
    /// AWS root CA certificate path (PEM).
    pub ca_cert: String,
    /// Device certificate path (PEM). Its common name is the device ID.
    pub cert: String,
    /// Device private key path (PEM).
    pub key: String,

    /// Local broker URL.
    pub local_address: String,
    pub local_username: String,
    pub local_password: String,
    #[serde(rename = "localCACert")]
    pub local_ca_cert: String,
    pub local_cert: String,
    pub local_key: String,

    pub log_file: String,
    pub log_level: String,
    /// Log rotation limits, in megabytes / files / days.
    pub log_file_size: u64,
    pub log_file_count: u32,
    pub log_file_max_age: u32,

    /// TPM-backed key material. Recognized but handled by the TLS layer
    /// of the deployment, not by this process.
    pub tpm_device: String,
    pub tpm_handle: u64,
    pub tpm_key: String,
    pub tpm_key_pub: String,

    /// Regex blocking incoming messages by their Ditto topic.
    pub topic_filter: String,
    /// Regexes excluding parts of incoming message payloads.
    pub payload_filters: Vec<String>,

    /// Root device identity, read from the certificate common name.
    #[serde(skip)]
    pub device_id: String,
    /// Compiled filters, populated by `compile_filters`.
    #[serde(skip)]
    pub filters: MessageFilters,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            address: String::new(),
            client_id: String::new(),
            tenant_id: "default-tenant-id".to_string(),
            ca_cert: "aws.crt".to_string(),
            cert: String::new(),
            key: String::new(),
            local_address: "tcp://localhost:1883".to_string(),
            local_username: String::new(),
            local_password: String::new(),
            local_ca_cert: String::new(),
            local_cert: String::new(),
            local_key: String::new(),
            log_file: "logs/shadowbridge.log".to_string(),
            log_level: "INFO".to_string(),
            log_file_size: 2,
            log_file_count: 5,
            log_file_max_age: 28,
            tpm_device: String::new(),
            tpm_handle: 0,
            tpm_key: String::new(),
            tpm_key_pub: String::new(),
            topic_filter: String::new(),
            payload_filters: Vec::new(),
            device_id: String::new(),
            filters: MessageFilters::default(),
        }
    }
}

impl BridgeSettings {
    /// Load settings from a TOML file path.
    pub fn from_file(path: &str) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_string(),
            source,
        })?;
        Ok(toml::from_str(&contents)?)
    }

    /// Read the device ID from the common name of the device certificate.
    pub fn read_device_id(&mut self) -> Result<(), SettingsError> {
        if self.cert.is_empty() {
            return Err(SettingsError::Missing("cert"));
        }
        let raw = std::fs::read(&self.cert).map_err(|source| SettingsError::Io {
            path: self.cert.clone(),
            source,
        })?;
        let (_, pem) = parse_x509_pem(&raw)
            .map_err(|e| SettingsError::Certificate(format!("not PEM encoded: {e}")))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| SettingsError::Certificate(e.to_string()))?;
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .ok_or_else(|| {
                SettingsError::Certificate("no common name in certificate subject".to_string())
            })?;
        self.device_id = common_name.to_string();
        Ok(())
    }

    /// Compile the configured regex filters. Invalid patterns abort startup.
    pub fn compile_filters(&mut self) -> Result<(), SettingsError> {
        let mut filters = MessageFilters::default();
        if !self.topic_filter.is_empty() {
            filters.topic_filter =
                Some(
                    Regex::new(&self.topic_filter).map_err(|source| SettingsError::Filter {
                        pattern: self.topic_filter.clone(),
                        source,
                    })?,
                );
        }
        for pattern in &self.payload_filters {
            filters
                .payload_filters
                .push(Regex::new(pattern).map_err(|source| SettingsError::Filter {
                    pattern: pattern.clone(),
                    source,
                })?);
        }
        self.filters = filters;
        Ok(())
    }

    /// Validate required settings and referenced files.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.address.is_empty() {
            return Err(SettingsError::Missing("address"));
        }
        if self.local_address.is_empty() {
            return Err(SettingsError::Missing("localAddress"));
        }
        for path in [&self.ca_cert, &self.key] {
            if !path.is_empty() && !std::path::Path::new(path).exists() {
                return Err(SettingsError::Io {
                    path: path.clone(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
        }
        split_endpoint(&self.address, 8883)?;
        split_endpoint(&self.local_address, 1883)?;
        Ok(())
    }

    /// Connection profile for the AWS IoT Core endpoint (mTLS).
    pub fn cloud_connection(&self) -> Result<ConnectionConfig, SettingsError> {
        let (host, port) = split_endpoint(&self.address, 8883)?;
        let mut config = ConnectionConfig::plaintext(host, port, self.remote_client_id());
        config.ca_cert_path = Some(self.ca_cert.clone());
        config.client_cert_path = Some(self.cert.clone());
        config.client_key_path = Some(self.key.clone());
        Ok(config)
    }

    /// Connection profile for the local broker.
    pub fn local_connection(&self) -> Result<ConnectionConfig, SettingsError> {
        let (host, port) = split_endpoint(&self.local_address, 1883)?;
        let client_id = format!("{}-local", self.remote_client_id());
        let mut config = ConnectionConfig::plaintext(host, port, client_id);
        if !self.local_username.is_empty() {
            config.username = Some(self.local_username.clone());
            config.password = Some(self.local_password.clone());
        }
        if !self.local_ca_cert.is_empty() {
            config.ca_cert_path = Some(self.local_ca_cert.clone());
            if !self.local_cert.is_empty() {
                config.client_cert_path = Some(self.local_cert.clone());
                config.client_key_path = Some(self.local_key.clone());
            }
        }
        Ok(config)
    }

    fn remote_client_id(&self) -> String {
        if self.client_id.is_empty() {
            self.device_id.clone()
        } else {
            self.client_id.clone()
        }
    }
}

/// Split a broker URL into host and port, tolerating a scheme prefix.
fn split_endpoint(address: &str, default_port: u16) -> Result<(String, u16), SettingsError> {
    let rest = match address.split_once("://") {
        Some((_, rest)) => rest,
        None => address,
    };
    let rest = rest.trim_end_matches('/');
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| SettingsError::Address(address.to_string()))?;
            (host, port)
        }
        None => (rest, default_port),
    };
    if host.is_empty() {
        return Err(SettingsError::Address(address.to_string()));
    }
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = BridgeSettings::default();
        assert_eq!(settings.tenant_id, "default-tenant-id");
        assert_eq!(settings.ca_cert, "aws.crt");
        assert_eq!(settings.local_address, "tcp://localhost:1883");
        assert_eq!(settings.log_level, "INFO");
        assert!(settings.payload_filters.is_empty());
        assert!(settings.filters.topic_filter.is_none());
    }

    #[test]
    fn deserialize_camel_case_keys() {
        let toml = r#"
address = "ssl://a1b2c3-ats.iot.eu-west-1.amazonaws.com:8883"
clientId = "bridge-client"
tenantId = "tenant-a"
localAddress = "tcp://mosquitto:1883"
localUsername = "bridge"
localCACert = "/etc/bridge/local-ca.pem"
topicFilter = "^filtered/.*"
payloadFilters = [".*/unwanted$"]
logLevel = "DEBUG"
"#;
        let settings: BridgeSettings = toml::from_str(toml).unwrap();
        assert_eq!(settings.client_id, "bridge-client");
        assert_eq!(settings.tenant_id, "tenant-a");
        assert_eq!(settings.local_username, "bridge");
        assert_eq!(settings.local_ca_cert, "/etc/bridge/local-ca.pem");
        assert_eq!(settings.topic_filter, "^filtered/.*");
        assert_eq!(settings.payload_filters, vec![".*/unwanted$"]);
        assert_eq!(settings.log_level, "DEBUG");
        // Untouched keys keep their defaults.
        assert_eq!(settings.log_file_count, 5);
    }

    #[test]
    fn compile_filters_accepts_valid_patterns() {
        let mut settings = BridgeSettings {
            topic_filter: "^test/.*".to_string(),
            payload_filters: vec![".*/unwanted$".to_string(), ".*/0/value$".to_string()],
            ..Default::default()
        };
        settings.compile_filters().unwrap();
        assert!(settings.filters.topic_filter.is_some());
        assert_eq!(settings.filters.payload_filters.len(), 2);
    }

    #[test]
    fn compile_filters_rejects_invalid_topic_filter() {
        let mut settings = BridgeSettings {
            topic_filter: "([unclosed".to_string(),
            ..Default::default()
        };
        let err = settings.compile_filters().unwrap_err();
        assert!(matches!(err, SettingsError::Filter { .. }));
    }

    #[test]
    fn compile_filters_rejects_invalid_payload_filter() {
        let mut settings = BridgeSettings {
            payload_filters: vec![".*".to_string(), "([unclosed".to_string()],
            ..Default::default()
        };
        assert!(settings.compile_filters().is_err());
    }

    #[test]
    fn validate_requires_address() {
        let settings = BridgeSettings {
            ca_cert: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Missing("address"))
        ));
    }

    #[test]
    fn split_endpoint_variants() {
        assert_eq!(
            split_endpoint("ssl://iot.example.com:8883", 8883).unwrap(),
            ("iot.example.com".to_string(), 8883)
        );
        assert_eq!(
            split_endpoint("iot.example.com", 8883).unwrap(),
            ("iot.example.com".to_string(), 8883)
        );
        assert_eq!(
            split_endpoint("tcp://localhost:1883", 1883).unwrap(),
            ("localhost".to_string(), 1883)
        );
        assert!(split_endpoint("tcp://host:notaport", 1883).is_err());
        assert!(split_endpoint("tcp://", 1883).is_err());
    }

    #[test]
    fn local_connection_applies_credentials() {
        let mut settings = BridgeSettings {
            local_username: "bridge".to_string(),
            local_password: "secret".to_string(),
            ..Default::default()
        };
        settings.device_id = "test:device".to_string();
        let config = settings.local_connection().unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 1883);
        assert_eq!(config.client_id, "test:device-local");
        assert_eq!(config.username.as_deref(), Some("bridge"));
        assert!(!config.uses_tls());
    }

    #[test]
    fn cloud_connection_uses_tls_paths() {
        let mut settings = BridgeSettings {
            address: "ssl://a1-ats.iot.eu-west-1.amazonaws.com:8883".to_string(),
            cert: "/etc/bridge/cert.pem".to_string(),
            key: "/etc/bridge/key.pem".to_string(),
            ..Default::default()
        };
        settings.device_id = "test:device".to_string();
        let config = settings.cloud_connection().unwrap();
        assert_eq!(config.host, "a1-ats.iot.eu-west-1.amazonaws.com");
        assert_eq!(config.port, 8883);
        assert_eq!(config.client_id, "test:device");
        assert!(config.uses_tls());
        assert_eq!(config.client_cert_path.as_deref(), Some("/etc/bridge/cert.pem"));
    }
}
