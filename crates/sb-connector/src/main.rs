use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sb_connector::bus;
use sb_connector::handlers::{
    CommandRequestHandler, DeviceHandler, MessageHandler, ShadowStateHandler, ShadowStore,
};
use sb_connector::router;
use sb_connector::settings::BridgeSettings;
use sb_mqtt_channel::MqttChannel;

/// MQTT bridge between a local Ditto twin broker and AWS IoT Core
/// Device Shadows.
#[derive(Parser, Debug)]
#[command(name = "shadowbridge", version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long = "configFile")]
    config_file: Option<PathBuf>,

    /// Remote endpoint URL
    #[arg(long)]
    address: Option<String>,

    /// Remote client ID
    #[arg(long = "clientId")]
    client_id: Option<String>,

    /// Tenant ID
    #[arg(long = "tenantId")]
    tenant_id: Option<String>,

    /// AWS root CA certificate path
    #[arg(long = "caCert")]
    ca_cert: Option<String>,

    /// Device certificate path (its common name is the device ID)
    #[arg(long)]
    cert: Option<String>,

    /// Device private key path
    #[arg(long)]
    key: Option<String>,

    /// Local broker URL
    #[arg(long = "localAddress")]
    local_address: Option<String>,

    /// Local broker username
    #[arg(long = "localUsername")]
    local_username: Option<String>,

    /// Local broker password
    #[arg(long = "localPassword")]
    local_password: Option<String>,

    /// Local broker CA certificate path
    #[arg(long = "localCACert")]
    local_ca_cert: Option<String>,

    /// Local broker client certificate path
    #[arg(long = "localCert")]
    local_cert: Option<String>,

    /// Local broker client key path
    #[arg(long = "localKey")]
    local_key: Option<String>,

    /// Log file location
    #[arg(long = "logFile")]
    log_file: Option<String>,

    /// Log level (ERROR, WARN, INFO, DEBUG, TRACE)
    #[arg(long = "logLevel")]
    log_level: Option<String>,

    /// Log file size limit in megabytes
    #[arg(long = "logFileSize")]
    log_file_size: Option<u64>,

    /// Number of rotated log files to keep
    #[arg(long = "logFileCount")]
    log_file_count: Option<u32>,

    /// Rotated log file age limit in days
    #[arg(long = "logFileMaxAge")]
    log_file_max_age: Option<u32>,

    /// TPM device path
    #[arg(long = "tpmDevice")]
    tpm_device: Option<String>,

    /// TPM key handle
    #[arg(long = "tpmHandle")]
    tpm_handle: Option<u64>,

    /// TPM private key part path
    #[arg(long = "tpmKey")]
    tpm_key: Option<String>,

    /// TPM public key part path
    #[arg(long = "tpmKeyPub")]
    tpm_key_pub: Option<String>,

    /// Regex filter used to block incoming messages by their topic
    #[arg(long = "topicFilter")]
    topic_filter: Option<String>,

    /// Regex filters used to exclude parts of the incoming payloads
    #[arg(long = "payloadFilters")]
    payload_filters: Vec<String>,
}

impl Args {
    /// Overlay explicitly given flags onto the settings.
    fn apply(self, settings: &mut BridgeSettings) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    settings.$field = value;
                })*
            };
        }
        overlay!(
            address,
            client_id,
            tenant_id,
            ca_cert,
            cert,
            key,
            local_address,
            local_username,
            local_password,
            local_ca_cert,
            local_cert,
            local_key,
            log_file,
            log_level,
            log_file_size,
            log_file_count,
            log_file_max_age,
            tpm_device,
            tpm_handle,
            tpm_key,
            tpm_key_pub,
            topic_filter,
        );
        if !self.payload_filters.is_empty() {
            settings.payload_filters = self.payload_filters;
        }
    }
}

fn init_logging(settings: &BridgeSettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(settings.log_level.to_lowercase())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).json();

    if settings.log_file.is_empty() {
        builder.init();
        return Ok(());
    }

    if let Some(dir) = std::path::Path::new(&settings.log_file).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
        }
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.log_file)
        .with_context(|| format!("cannot open log file {}", settings.log_file))?;
    builder.with_writer(Arc::new(file)).init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config_file {
        Some(path) => BridgeSettings::from_file(&path.to_string_lossy())
            .context("cannot parse config")?,
        None => BridgeSettings::default(),
    };
    args.apply(&mut settings);

    settings
        .read_device_id()
        .context("cannot read deviceId from its certificate")?;
    settings
        .compile_filters()
        .context("cannot compile regular expression filters")?;
    settings.validate().context("settings validation error")?;

    init_logging(&settings)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        device_id = %settings.device_id,
        "starting shadowbridge"
    );
    if !settings.tpm_device.is_empty() || !settings.tpm_key.is_empty() {
        tracing::warn!("TPM key material is configured but not handled here, using file-based keys");
    }

    let store = Arc::new(ShadowStore::new());

    let device_handlers: Vec<Box<dyn MessageHandler>> =
        vec![Box::new(DeviceHandler::new(store.clone()))];
    let cloud_handlers: Vec<Box<dyn MessageHandler>> = vec![
        Box::new(ShadowStateHandler::new(store.clone())),
        Box::new(CommandRequestHandler::new()),
    ];

    let device_bus = bus::register_handlers(&settings, device_handlers);
    let cloud_bus = bus::register_handlers(&settings, cloud_handlers);

    let (local, local_loop) = MqttChannel::connect(&settings.local_connection()?)
        .context("cannot create local broker connection")?;
    let (cloud, cloud_loop) = MqttChannel::connect(&settings.cloud_connection()?)
        .context("cannot create AWS IoT Core connection")?;
    let local = Arc::new(local);
    let cloud = Arc::new(cloud);

    tracing::info!("starting message router");
    let device_task = tokio::spawn(router::run_bus(
        "device-to-cloud",
        local.clone(),
        local_loop,
        device_bus,
        cloud.clone(),
    ));
    let cloud_task = tokio::spawn(router::run_bus(
        "cloud-to-device",
        cloud,
        cloud_loop,
        cloud_bus,
        local,
    ));

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for shutdown signal")?;
    tracing::info!("shutdown signal received, stopping message router");
    device_task.abort();
    cloud_task.abort();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_settings() {
        let args = Args::parse_from([
            "shadowbridge",
            "--address",
            "ssl://iot.example.com:8883",
            "--tenantId",
            "tenant-a",
            "--topicFilter",
            "^blocked/.*",
            "--payloadFilters",
            ".*/unwanted$",
            "--payloadFilters",
            ".*/private$",
        ]);
        let mut settings = BridgeSettings::default();
        args.apply(&mut settings);

        assert_eq!(settings.address, "ssl://iot.example.com:8883");
        assert_eq!(settings.tenant_id, "tenant-a");
        assert_eq!(settings.topic_filter, "^blocked/.*");
        assert_eq!(
            settings.payload_filters,
            vec![".*/unwanted$", ".*/private$"]
        );
        // Untouched settings keep their defaults.
        assert_eq!(settings.local_address, "tcp://localhost:1883");
        assert_eq!(settings.ca_cert, "aws.crt");
    }

    #[test]
    fn absent_flags_leave_settings_alone() {
        let args = Args::parse_from(["shadowbridge"]);
        let mut settings = BridgeSettings::default();
        settings.tenant_id = "configured".to_string();
        args.apply(&mut settings);
        assert_eq!(settings.tenant_id, "configured");
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Args::try_parse_from(["shadowbridge", "--unknownFlag", "x"]).is_err());
    }
}
