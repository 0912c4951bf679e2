//! TLS transport configuration for broker connections.
//!
//! Loads the CA certificate and, when configured, the client X.509
//! certificate and private key from PEM files and builds rumqttc's
//! TLS transport. AWS IoT Core requires the full mTLS triple; a local
//! broker may use the CA alone.

use rumqttc::Transport;

use crate::config::ConnectionConfig;
use crate::error::{MqttError, MqttResult};

/// Build a TLS transport from the certificate paths in the config.
pub fn load_tls_transport(config: &ConnectionConfig) -> MqttResult<Transport> {
    let ca_path = config
        .ca_cert_path
        .as_deref()
        .ok_or_else(|| MqttError::Tls("no CA certificate configured".into()))?;
    let ca = std::fs::read(ca_path)
        .map_err(|e| MqttError::Tls(format!("failed to read CA cert '{ca_path}': {e}")))?;

    let client_auth = match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let cert = std::fs::read(cert_path).map_err(|e| {
                MqttError::Tls(format!("failed to read client cert '{cert_path}': {e}"))
            })?;
            let key = std::fs::read(key_path).map_err(|e| {
                MqttError::Tls(format!("failed to read client key '{key_path}': {e}"))
            })?;
            Some((cert, key))
        }
        (None, None) => None,
        _ => {
            return Err(MqttError::Tls(
                "client certificate and key must both be configured".into(),
            ));
        }
    };

    Ok(Transport::tls_with_config(
        rumqttc::TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(ca: Option<&str>, cert: Option<&str>, key: Option<&str>) -> ConnectionConfig {
        let mut config = ConnectionConfig::plaintext("localhost", 8883, "test");
        config.ca_cert_path = ca.map(String::from);
        config.client_cert_path = cert.map(String::from);
        config.client_key_path = key.map(String::from);
        config
    }

    #[test]
    fn missing_ca_cert_returns_error() {
        let config = config_with(Some("/nonexistent/ca.pem"), None, None);
        let err = load_tls_transport(&config).err().expect("should fail");
        assert!(err.to_string().contains("CA cert"), "got: {err}");
    }

    #[test]
    fn cert_without_key_is_rejected() {
        let config = config_with(Some("/nonexistent/ca.pem"), Some("/nonexistent/cert.pem"), None);
        assert!(load_tls_transport(&config).is_err());
    }
}
