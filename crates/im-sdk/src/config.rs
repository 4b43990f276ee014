//! SDK configuration loading (§6 CLI / configuration options).
//!
//! TOML is the sole config source. Every section has defaults so a caller
//! can supply only what differs from them.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Config types (the values the rest of the SDK consumes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub api_url: String,
    pub ws_url: String,
    pub database: DatabaseConfig,
    pub transport: TransportConfig,
    pub enable_dual_transport: bool,
    pub enable_smart_switch: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub file_name: String,
    pub enable_wal: bool,
    pub encryption_key: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Ws,
    Tcp,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub kind: TransportKind,
    pub url: String,
    pub connection_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval: Duration,
    pub tcp: TcpConfig,
    pub ws: WsConfig,
}

#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub enable_nagle: bool,
    pub enable_keepalive: bool,
    pub use_tls: bool,
    pub send_buf: usize,
    pub recv_buf: usize,
}

#[derive(Debug, Clone)]
pub struct WsConfig {
    pub headers: Vec<(String, String)>,
    pub enable_compression: bool,
    pub max_frame_size: usize,
}

impl Default for SdkConfig {
    fn default() -> Self {
        SdkConfig {
            api_url: "https://localhost/api/v1".to_owned(),
            ws_url: "ws://localhost/ws/v1".to_owned(),
            database: DatabaseConfig {
                file_name: "im-sdk.sqlite3".to_owned(),
                enable_wal: false,
                encryption_key: None,
            },
            transport: TransportConfig {
                kind: TransportKind::Ws,
                url: "ws://localhost/ws/v1".to_owned(),
                connection_timeout: Duration::from_secs(30),
                heartbeat_interval: Duration::from_secs(30),
                heartbeat_timeout: Duration::from_secs(10),
                auto_reconnect: true,
                max_reconnect_attempts: 5,
                reconnect_interval: Duration::from_secs(1),
                tcp: TcpConfig {
                    enable_nagle: false,
                    enable_keepalive: true,
                    use_tls: false,
                    send_buf: 64 * 1024,
                    recv_buf: 64 * 1024,
                },
                ws: WsConfig {
                    headers: Vec::new(),
                    enable_compression: false,
                    max_frame_size: 16 * 1024 * 1024,
                },
            },
            enable_dual_transport: false,
            enable_smart_switch: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (Option fields, defaults applied after)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    api_url: Option<String>,
    ws_url: Option<String>,
    database_config: Option<RawDatabaseConfig>,
    transport: Option<RawTransportConfig>,
    enable_dual_transport: Option<bool>,
    enable_smart_switch: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct RawDatabaseConfig {
    file_name: Option<String>,
    enable_wal: Option<bool>,
    encryption_key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTransportConfig {
    #[serde(rename = "type")]
    kind: Option<String>,
    url: Option<String>,
    connection_timeout: Option<u64>,
    heartbeat_interval: Option<u64>,
    heartbeat_timeout: Option<u64>,
    auto_reconnect: Option<bool>,
    max_reconnect_attempts: Option<u32>,
    reconnect_interval: Option<u64>,
    tcp: Option<RawTcpConfig>,
    ws: Option<RawWsConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTcpConfig {
    enable_nagle: Option<bool>,
    enable_keepalive: Option<bool>,
    use_tls: Option<bool>,
    send_buf: Option<usize>,
    recv_buf: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RawWsConfig {
    headers: Option<Vec<(String, String)>>,
    enable_compression: Option<bool>,
    max_frame_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<SdkConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load config from a TOML string, applying defaults for anything absent.
pub fn load_config_from_str(toml_str: &str) -> Result<SdkConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let defaults = SdkConfig::default();

    let database = match raw.database_config {
        Some(d) => DatabaseConfig {
            file_name: d.file_name.unwrap_or(defaults.database.file_name),
            enable_wal: d.enable_wal.unwrap_or(defaults.database.enable_wal),
            encryption_key: d.encryption_key.map(String::into_bytes),
        },
        None => defaults.database,
    };

    let transport = match raw.transport {
        Some(t) => {
            let kind = match t.kind.as_deref() {
                Some("tcp") => TransportKind::Tcp,
                Some("ws") | None => TransportKind::Ws,
                Some(other) => {
                    return Err(ConfigError::InvalidValue(format!(
                        "transport.type must be 'ws' or 'tcp', got '{other}'"
                    )));
                }
            };
            let tcp = match t.tcp {
                Some(c) => TcpConfig {
                    enable_nagle: c.enable_nagle.unwrap_or(defaults.transport.tcp.enable_nagle),
                    enable_keepalive: c
                        .enable_keepalive
                        .unwrap_or(defaults.transport.tcp.enable_keepalive),
                    use_tls: c.use_tls.unwrap_or(defaults.transport.tcp.use_tls),
                    send_buf: c.send_buf.unwrap_or(defaults.transport.tcp.send_buf),
                    recv_buf: c.recv_buf.unwrap_or(defaults.transport.tcp.recv_buf),
                },
                None => defaults.transport.tcp,
            };
            let ws = match t.ws {
                Some(c) => WsConfig {
                    headers: c.headers.unwrap_or_default(),
                    enable_compression: c
                        .enable_compression
                        .unwrap_or(defaults.transport.ws.enable_compression),
                    max_frame_size: c.max_frame_size.unwrap_or(defaults.transport.ws.max_frame_size),
                },
                None => defaults.transport.ws,
            };
            TransportConfig {
                kind,
                url: t.url.unwrap_or(defaults.transport.url),
                connection_timeout: t
                    .connection_timeout
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.transport.connection_timeout),
                heartbeat_interval: t
                    .heartbeat_interval
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.transport.heartbeat_interval),
                heartbeat_timeout: t
                    .heartbeat_timeout
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.transport.heartbeat_timeout),
                auto_reconnect: t.auto_reconnect.unwrap_or(defaults.transport.auto_reconnect),
                max_reconnect_attempts: t
                    .max_reconnect_attempts
                    .unwrap_or(defaults.transport.max_reconnect_attempts),
                reconnect_interval: t
                    .reconnect_interval
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.transport.reconnect_interval),
                tcp,
                ws,
            }
        }
        None => defaults.transport,
    };

    Ok(SdkConfig {
        api_url: raw.api_url.unwrap_or(defaults.api_url),
        ws_url: raw.ws_url.unwrap_or(defaults.ws_url),
        database,
        transport,
        enable_dual_transport: raw.enable_dual_transport.unwrap_or(defaults.enable_dual_transport),
        enable_smart_switch: raw.enable_smart_switch.unwrap_or(defaults.enable_smart_switch),
    })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}
