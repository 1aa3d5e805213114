use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_UUID: &str = "00000000-0000-0000-0000-000000000000";
pub const DEFAULT_FILE_PATH: &str = "./tmp";
pub const DEFAULT_SUB_PATH: &str = "sub";
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";
pub const DEFAULT_LISTEN_PORT: u16 = 3000;
pub const DEFAULT_EDGE_PORT: u16 = 8001;
pub const DEFAULT_FRONT_ADDRESS: &str = "xcr.cf.cname.vvhan.com";
pub const DEFAULT_FRONT_PORT: u16 = 443;
pub const DEFAULT_NAME: &str = "my-claw";
pub const DEFAULT_KEEPALIVE_URL: &str = "https://oooo.serv00.net/add-url";
pub const DEFAULT_ORG_LOOKUP_URL: &str = "http://ip-api.com/json/";
pub const DEFAULT_PROXY_BIN: &str = "/usr/local/bin/web";
pub const DEFAULT_TUNNEL_BIN: &str = "/usr/local/bin/bot";
pub const DEFAULT_TELEMETRY_BIN: &str = "/usr/local/bin/nezha";
pub const DEFAULT_DISCOVERY_SETTLE_SECS: u64 = 5;
pub const DEFAULT_DISCOVERY_RETRY_SECS: u64 = 5;

/// Telemetry ports that imply a TLS connection when no explicit flag is given.
pub const TLS_TELEMETRY_PORTS: [&str; 3] = ["443", "8443", "2096"];

const CONFIG_FILE: &str = "config.json";
const BOOT_LOG_FILE: &str = "boot.log";
const SUBSCRIPTION_FILE: &str = "sub.txt";
const CREDENTIALS_FILE: &str = "tunnel.json";
const MANIFEST_FILE: &str = "tunnel.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Immutable snapshot of every environment-derived parameter.
///
/// Parsed once at process start and shared behind an `Arc`; every option
/// accepts either a long flag or its environment variable.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Provision the proxy and tunnel, then publish subscription links")]
pub struct RuntimeConfig {
    /// Identity token shared by every inbound and descriptor
    #[arg(long, env = "UUID", default_value = DEFAULT_UUID)]
    pub uuid: String,

    /// Directory holding generated configs, logs and the subscription blob
    #[arg(long, env = "FILE_PATH", default_value = DEFAULT_FILE_PATH)]
    pub file_path: PathBuf,

    /// Route suffix the subscription is served under
    #[arg(long, env = "SUB_PATH", default_value = DEFAULT_SUB_PATH)]
    pub sub_path: String,

    #[arg(long, env = "LISTEN_HOST", default_value = DEFAULT_LISTEN_HOST)]
    pub listen_host: String,

    #[arg(long, env = "PORT", default_value_t = DEFAULT_LISTEN_PORT)]
    pub port: u16,

    /// Listen port set by hosting panels; preferred over `PORT` when present
    #[arg(long, env = "SERVER_PORT")]
    pub server_port: Option<u16>,

    /// Port of the edge inbound the tunnel forwards to
    #[arg(long, env = "ARGO_PORT", default_value_t = DEFAULT_EDGE_PORT)]
    pub argo_port: u16,

    /// Tunnel credential: empty, a bare token, or a structured JSON credential
    #[arg(long, env = "ARGO_AUTH", hide_env_values = true)]
    pub argo_auth: Option<String>,

    /// Static public hostname; skips log discovery when set
    #[arg(long, env = "ARGO_DOMAIN")]
    pub argo_domain: Option<String>,

    /// Front-end address advertised in the connection descriptors
    #[arg(long, env = "CFIP", default_value = DEFAULT_FRONT_ADDRESS)]
    pub cfip: String,

    #[arg(long, env = "CFPORT", default_value_t = DEFAULT_FRONT_PORT)]
    pub cfport: u16,

    /// Display-name prefix for every descriptor
    #[arg(long, env = "NAME", default_value = DEFAULT_NAME)]
    pub name: String,

    /// Aggregator base URL the subscription location is registered with
    #[arg(long, env = "UPLOAD_URL")]
    pub upload_url: Option<String>,

    /// Public URL this deployment is reachable at
    #[arg(long, env = "PROJECT_URL")]
    pub project_url: Option<String>,

    /// Register the project URL with the keep-alive service
    #[arg(long, env = "AUTO_ACCESS", value_parser = clap::builder::FalseyValueParser::new())]
    pub auto_access: bool,

    #[arg(long, env = "KEEPALIVE_URL", default_value = DEFAULT_KEEPALIVE_URL)]
    pub keepalive_url: String,

    #[arg(long, env = "ORG_LOOKUP_URL", default_value = DEFAULT_ORG_LOOKUP_URL)]
    pub org_lookup_url: String,

    #[arg(long, env = "NEZHA_SERVER")]
    pub telemetry_server: Option<String>,

    #[arg(long, env = "NEZHA_PORT")]
    pub telemetry_port: Option<String>,

    #[arg(long, env = "NEZHA_KEY", hide_env_values = true)]
    pub telemetry_key: Option<String>,

    /// Explicit TLS choice for the telemetry agent (`--tls`, true/false, 1/0)
    #[arg(long, env = "NEZHA_TLS", value_parser = parse_tls_flag)]
    pub telemetry_tls: Option<bool>,

    #[arg(long, env = "PROXY_BIN", default_value = DEFAULT_PROXY_BIN)]
    pub proxy_bin: PathBuf,

    #[arg(long, env = "TUNNEL_BIN", default_value = DEFAULT_TUNNEL_BIN)]
    pub tunnel_bin: PathBuf,

    #[arg(long, env = "TELEMETRY_BIN", default_value = DEFAULT_TELEMETRY_BIN)]
    pub telemetry_bin: PathBuf,

    /// Seconds to wait after launch before the first log scan
    #[arg(long, env = "DISCOVERY_SETTLE_SECS", default_value_t = DEFAULT_DISCOVERY_SETTLE_SECS)]
    pub discovery_settle_secs: u64,

    /// Seconds between log scans
    #[arg(long, env = "DISCOVERY_RETRY_SECS", default_value_t = DEFAULT_DISCOVERY_RETRY_SECS)]
    pub discovery_retry_secs: u64,

    /// Give up on discovery after this many seconds; unbounded when unset
    #[arg(long, env = "DISCOVERY_TIMEOUT_SECS")]
    pub discovery_timeout_secs: Option<u64>,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            uuid: DEFAULT_UUID.to_string(),
            file_path: PathBuf::from(DEFAULT_FILE_PATH),
            sub_path: DEFAULT_SUB_PATH.to_string(),
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            port: DEFAULT_LISTEN_PORT,
            server_port: None,
            argo_port: DEFAULT_EDGE_PORT,
            argo_auth: None,
            argo_domain: None,
            cfip: DEFAULT_FRONT_ADDRESS.to_string(),
            cfport: DEFAULT_FRONT_PORT,
            name: DEFAULT_NAME.to_string(),
            upload_url: None,
            project_url: None,
            auto_access: false,
            keepalive_url: DEFAULT_KEEPALIVE_URL.to_string(),
            org_lookup_url: DEFAULT_ORG_LOOKUP_URL.to_string(),
            telemetry_server: None,
            telemetry_port: None,
            telemetry_key: None,
            telemetry_tls: None,
            proxy_bin: PathBuf::from(DEFAULT_PROXY_BIN),
            tunnel_bin: PathBuf::from(DEFAULT_TUNNEL_BIN),
            telemetry_bin: PathBuf::from(DEFAULT_TELEMETRY_BIN),
            discovery_settle_secs: DEFAULT_DISCOVERY_SETTLE_SECS,
            discovery_retry_secs: DEFAULT_DISCOVERY_RETRY_SECS,
            discovery_timeout_secs: None,
            log_format: LogFormat::Json,
        }
    }
}

/// Fully configured telemetry agent settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub server: String,
    pub port: String,
    pub key: String,
    pub tls: bool,
}

impl RuntimeConfig {
    /// Create a new runtime configuration builder
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::default()
    }

    pub fn config_path(&self) -> PathBuf {
        self.file_path.join(CONFIG_FILE)
    }

    pub fn boot_log_path(&self) -> PathBuf {
        self.file_path.join(BOOT_LOG_FILE)
    }

    pub fn subscription_path(&self) -> PathBuf {
        self.file_path.join(SUBSCRIPTION_FILE)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.file_path.join(CREDENTIALS_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.file_path.join(MANIFEST_FILE)
    }

    pub fn work_dir(&self) -> &Path {
        &self.file_path
    }

    /// The tunnel credential, treating blank values as absent.
    pub fn tunnel_credential(&self) -> Option<&str> {
        non_blank(self.argo_auth.as_deref())
    }

    /// The static public hostname, treating blank values as absent.
    pub fn static_domain(&self) -> Option<&str> {
        non_blank(self.argo_domain.as_deref())
    }

    pub fn upload_url(&self) -> Option<&str> {
        non_blank(self.upload_url.as_deref())
    }

    pub fn project_url(&self) -> Option<&str> {
        non_blank(self.project_url.as_deref())
    }

    /// HTTP listen port: `SERVER_PORT` when set, else `PORT`.
    pub fn listen_port(&self) -> u16 {
        self.server_port.unwrap_or(self.port)
    }

    pub fn listen_addr(&self) -> String {
        match self.listen_host.trim().parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.listen_port()).to_string(),
            Err(_) => format!("{}:{}", self.listen_host, self.listen_port()),
        }
    }

    /// Local URL the tunnel client forwards traffic to.
    pub fn local_target_url(&self) -> String {
        format!("http://localhost:{}", self.argo_port)
    }

    /// Telemetry settings, present only when server, port and key are all set.
    ///
    /// An explicit TLS flag wins; otherwise TLS is inferred from well-known TLS ports.
    pub fn telemetry(&self) -> Option<TelemetrySettings> {
        let server = non_blank(self.telemetry_server.as_deref())?;
        let port = non_blank(self.telemetry_port.as_deref())?;
        let key = non_blank(self.telemetry_key.as_deref())?;
        let tls = self
            .telemetry_tls
            .unwrap_or_else(|| TLS_TELEMETRY_PORTS.contains(&port));

        Some(TelemetrySettings {
            server: server.to_string(),
            port: port.to_string(),
            key: key.to_string(),
            tls,
        })
    }

    pub fn discovery_settle(&self) -> Duration {
        Duration::from_secs(self.discovery_settle_secs)
    }

    pub fn discovery_retry(&self) -> Duration {
        Duration::from_secs(self.discovery_retry_secs)
    }

    pub fn discovery_timeout(&self) -> Option<Duration> {
        self.discovery_timeout_secs.map(Duration::from_secs)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accepts the agent's own `--tls` spelling alongside the usual boolean words.
pub fn parse_tls_flag(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "--tls" | "true" | "1" | "yes" | "on" => Ok(true),
        "" | "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("unrecognized TLS flag '{other}'")),
    }
}

/// Builder for RuntimeConfig, used where no command line or environment is involved
#[derive(Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.config.uuid = uuid.into();
        self
    }

    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.file_path = path.into();
        self
    }

    pub fn sub_path(mut self, sub_path: impl Into<String>) -> Self {
        self.config.sub_path = sub_path.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn server_port(mut self, port: u16) -> Self {
        self.config.server_port = Some(port);
        self
    }

    pub fn listen_host(mut self, host: impl Into<String>) -> Self {
        self.config.listen_host = host.into();
        self
    }

    pub fn argo_port(mut self, port: u16) -> Self {
        self.config.argo_port = port;
        self
    }

    pub fn argo_auth(mut self, credential: impl Into<String>) -> Self {
        self.config.argo_auth = Some(credential.into());
        self
    }

    pub fn argo_domain(mut self, domain: impl Into<String>) -> Self {
        self.config.argo_domain = Some(domain.into());
        self
    }

    pub fn front_end(mut self, address: impl Into<String>, port: u16) -> Self {
        self.config.cfip = address.into();
        self.config.cfport = port;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn upload_url(mut self, url: impl Into<String>) -> Self {
        self.config.upload_url = Some(url.into());
        self
    }

    pub fn project_url(mut self, url: impl Into<String>) -> Self {
        self.config.project_url = Some(url.into());
        self
    }

    pub fn auto_access(mut self, enabled: bool) -> Self {
        self.config.auto_access = enabled;
        self
    }

    pub fn keepalive_url(mut self, url: impl Into<String>) -> Self {
        self.config.keepalive_url = url.into();
        self
    }

    pub fn org_lookup_url(mut self, url: impl Into<String>) -> Self {
        self.config.org_lookup_url = url.into();
        self
    }

    pub fn telemetry(
        mut self,
        server: impl Into<String>,
        port: impl Into<String>,
        key: impl Into<String>,
        tls: Option<bool>,
    ) -> Self {
        self.config.telemetry_server = Some(server.into());
        self.config.telemetry_port = Some(port.into());
        self.config.telemetry_key = Some(key.into());
        self.config.telemetry_tls = tls;
        self
    }

    pub fn discovery_timing(mut self, settle_secs: u64, retry_secs: u64) -> Self {
        self.config.discovery_settle_secs = settle_secs;
        self.config.discovery_retry_secs = retry_secs;
        self
    }

    pub fn discovery_timeout_secs(mut self, secs: u64) -> Self {
        self.config.discovery_timeout_secs = Some(secs);
        self
    }

    pub fn build(self) -> RuntimeConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths_live_under_work_dir() {
        let config = RuntimeConfig::builder().file_path("/data").build();
        assert_eq!(config.config_path(), PathBuf::from("/data/config.json"));
        assert_eq!(config.boot_log_path(), PathBuf::from("/data/boot.log"));
        assert_eq!(config.subscription_path(), PathBuf::from("/data/sub.txt"));
        assert_eq!(config.manifest_path(), PathBuf::from("/data/tunnel.yml"));
    }

    #[test]
    fn test_blank_values_count_as_absent() {
        let config = RuntimeConfig::builder()
            .argo_auth("   ")
            .argo_domain("")
            .build();
        assert!(config.tunnel_credential().is_none());
        assert!(config.static_domain().is_none());
    }

    #[test]
    fn test_telemetry_requires_all_three_fields() {
        let mut config = RuntimeConfig::builder()
            .telemetry("nz.example.com", "5555", "secret", None)
            .build();
        assert!(config.telemetry().is_some());

        config.telemetry_key = None;
        assert!(config.telemetry().is_none());
    }

    #[test]
    fn test_telemetry_tls_inferred_from_port() {
        for port in TLS_TELEMETRY_PORTS {
            let config = RuntimeConfig::builder()
                .telemetry("nz.example.com", port, "secret", None)
                .build();
            assert!(config.telemetry().unwrap().tls, "port {port} should imply TLS");
        }

        let plain = RuntimeConfig::builder()
            .telemetry("nz.example.com", "5555", "secret", None)
            .build();
        assert!(!plain.telemetry().unwrap().tls);
    }

    #[test]
    fn test_explicit_tls_flag_overrides_port() {
        let config = RuntimeConfig::builder()
            .telemetry("nz.example.com", "443", "secret", Some(false))
            .build();
        assert!(!config.telemetry().unwrap().tls);
    }

    #[test]
    fn test_server_port_preferred_over_port() {
        let config = RuntimeConfig::builder().port(3000).build();
        assert_eq!(config.listen_addr(), "0.0.0.0:3000");

        let panel = RuntimeConfig::builder().port(3000).server_port(25565).build();
        assert_eq!(panel.listen_port(), 25565);
        assert_eq!(panel.listen_addr(), "0.0.0.0:25565");
    }

    #[test]
    fn test_ipv6_listen_host_is_bracketed() {
        let config = RuntimeConfig::builder().listen_host("::").port(3000).build();
        assert_eq!(config.listen_addr(), "[::]:3000");
        assert!(config.listen_addr().parse::<SocketAddr>().is_ok());
    }

    #[test]
    fn test_parse_tls_flag() {
        assert_eq!(parse_tls_flag("--tls"), Ok(true));
        assert_eq!(parse_tls_flag("TRUE"), Ok(true));
        assert_eq!(parse_tls_flag("0"), Ok(false));
        assert!(parse_tls_flag("maybe").is_err());
    }
}
