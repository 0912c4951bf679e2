use serde::Deserialize;

/// MQTT connection settings for one broker endpoint.
///
/// The bridge holds two of these: the local broker (usually plaintext
/// TCP, optionally username/password or TLS) and the AWS IoT Core
/// endpoint (always mTLS).
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Broker hostname (e.g., an AWS IoT ATS endpoint).
    pub host: String,
    /// Broker port (8883 for TLS, 1883 for plaintext).
    #[serde(default = "default_port")]
    pub port: u16,
    /// MQTT client ID.
    pub client_id: String,
    /// Broker username (local broker only).
    #[serde(default)]
    pub username: Option<String>,
    /// Broker password (local broker only).
    #[serde(default)]
    pub password: Option<String>,
    /// Path to the CA certificate (PEM). Setting this enables TLS.
    #[serde(default)]
    pub ca_cert_path: Option<String>,
    /// Path to the client X.509 certificate (PEM).
    #[serde(default)]
    pub client_cert_path: Option<String>,
    /// Path to the client private key (PEM).
    #[serde(default)]
    pub client_key_path: Option<String>,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u16 {
    30
}

impl ConnectionConfig {
    /// A plaintext TCP connection profile.
    pub fn plaintext(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            username: None,
            password: None,
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            keepalive_secs: default_keepalive(),
        }
    }

    pub fn uses_tls(&self) -> bool {
        self.ca_cert_path.is_some()
    }
}
