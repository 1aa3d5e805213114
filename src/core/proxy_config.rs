//! Generation of the proxy engine's declarative configuration.
//!
//! The document has one edge inbound on the tunnel-facing port that
//! multiplexes by websocket path, plus one loopback inbound per protocol.
//! Both sides are derived from [`WS_ROUTES`] so the fallback table can never
//! drift from the loopback listeners it points at.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::RuntimeConfig;
use crate::ports::file_system::{FileSystem, FileSystemError};

/// One websocket-framed protocol reachable through the edge inbound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WsRoute {
    pub protocol: Protocol,
    pub path: &'static str,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vless,
    Vmess,
    Trojan,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Vless => write!(f, "vless"),
            Protocol::Vmess => write!(f, "vmess"),
            Protocol::Trojan => write!(f, "trojan"),
        }
    }
}

pub static WS_ROUTES: [WsRoute; 3] = [
    WsRoute {
        protocol: Protocol::Vless,
        path: "/vless-argo",
        port: 3002,
    },
    WsRoute {
        protocol: Protocol::Vmess,
        path: "/vmess-argo",
        port: 3003,
    },
    WsRoute {
        protocol: Protocol::Trojan,
        path: "/trojan-argo",
        port: 3004,
    },
];

impl WsRoute {
    pub fn for_protocol(protocol: Protocol) -> &'static WsRoute {
        WS_ROUTES
            .iter()
            .find(|route| route.protocol == protocol)
            .unwrap_or(&WS_ROUTES[0])
    }
}

#[derive(Error, Debug)]
pub enum ProxyConfigError {
    #[error("Failed to serialize proxy config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to persist proxy config: {0}")]
    Write(#[from] FileSystemError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyConfigDocument {
    pub log: LogSettings,
    pub inbounds: Vec<Inbound>,
    pub dns: DnsSettings,
    pub outbounds: Vec<Outbound>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSettings {
    pub access: String,
    pub error: String,
    pub loglevel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listen: Option<String>,
    pub protocol: Protocol,
    pub settings: Value,
    pub stream_settings: StreamSettings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sniffing: Option<Sniffing>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_settings: Option<WsSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WsSettings {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sniffing {
    pub enabled: bool,
    pub dest_override: Vec<String>,
    pub metadata_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DnsSettings {
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outbound {
    pub protocol: String,
    pub tag: String,
}

const LOOPBACK: &str = "127.0.0.1";
const DOH_SERVER: &str = "https+local://8.8.8.8/dns-query";

impl ProxyConfigDocument {
    /// Build the document for `config`. Pure; equal inputs give equal documents.
    pub fn synthesize(config: &RuntimeConfig) -> Self {
        let uuid = config.uuid.as_str();

        let mut inbounds = Vec::with_capacity(WS_ROUTES.len() + 1);
        inbounds.push(edge_inbound(config.argo_port, uuid));
        inbounds.extend(WS_ROUTES.iter().map(|route| loopback_inbound(route, uuid)));

        Self {
            log: LogSettings {
                access: "/dev/null".to_string(),
                error: "/dev/null".to_string(),
                loglevel: "none".to_string(),
            },
            inbounds,
            dns: DnsSettings {
                servers: vec![DOH_SERVER.to_string()],
            },
            outbounds: vec![
                Outbound {
                    protocol: "freedom".to_string(),
                    tag: "direct".to_string(),
                },
                Outbound {
                    protocol: "blackhole".to_string(),
                    tag: "block".to_string(),
                },
            ],
        }
    }

    pub fn render(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn edge_inbound(port: u16, uuid: &str) -> Inbound {
    let fallbacks: Vec<Value> = WS_ROUTES
        .iter()
        .map(|route| json!({ "path": route.path, "dest": route.port }))
        .collect();

    Inbound {
        port,
        listen: None,
        protocol: Protocol::Vless,
        settings: json!({
            "clients": [{ "id": uuid, "flow": "xtls-rprx-vision" }],
            "decryption": "none",
            "fallbacks": fallbacks,
        }),
        stream_settings: StreamSettings {
            network: "tcp".to_string(),
            security: None,
            ws_settings: None,
        },
        sniffing: None,
    }
}

fn loopback_inbound(route: &WsRoute, uuid: &str) -> Inbound {
    let settings = match route.protocol {
        Protocol::Vless => json!({ "clients": [{ "id": uuid, "level": 0 }], "decryption": "none" }),
        Protocol::Vmess => json!({ "clients": [{ "id": uuid, "alterId": 0 }] }),
        Protocol::Trojan => json!({ "clients": [{ "password": uuid }] }),
    };

    Inbound {
        port: route.port,
        listen: Some(LOOPBACK.to_string()),
        protocol: route.protocol,
        settings,
        stream_settings: StreamSettings {
            network: "ws".to_string(),
            security: Some("none".to_string()),
            ws_settings: Some(WsSettings {
                path: route.path.to_string(),
            }),
        },
        sniffing: Some(Sniffing {
            enabled: true,
            dest_override: vec!["http".to_string(), "tls".to_string(), "quic".to_string()],
            metadata_only: false,
        }),
    }
}

/// Synthesize and persist the proxy config, overwriting any previous file.
///
/// A failure here is fatal: the proxy engine cannot start without it.
pub async fn write_proxy_config(
    config: &RuntimeConfig,
    fs: &dyn FileSystem,
) -> Result<ProxyConfigDocument, ProxyConfigError> {
    let document = ProxyConfigDocument::synthesize(config);
    let rendered = document.render()?;
    let path = config.config_path();

    fs.write(&path, rendered.as_bytes()).await?;
    tracing::info!(path = %path.display(), "Proxy configuration generated");

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_system::TokioFileSystem;

    fn test_config() -> RuntimeConfig {
        RuntimeConfig::builder()
            .uuid("11111111-1111-1111-1111-111111111111")
            .argo_port(8001)
            .build()
    }

    #[test]
    fn test_all_inbounds_share_identity() {
        let config = test_config();
        let rendered = ProxyConfigDocument::synthesize(&config).render().unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();

        let inbounds = value["inbounds"].as_array().unwrap();
        assert_eq!(inbounds.len(), 4);
        for inbound in inbounds {
            let client = &inbound["settings"]["clients"][0];
            let identity = client
                .get("id")
                .or_else(|| client.get("password"))
                .and_then(Value::as_str);
            assert_eq!(identity, Some(config.uuid.as_str()));
        }
    }

    #[test]
    fn test_fallbacks_map_to_loopback_inbounds() {
        let document = ProxyConfigDocument::synthesize(&test_config());
        let edge = &document.inbounds[0];
        assert_eq!(edge.port, 8001);
        assert!(edge.listen.is_none());

        let fallbacks = edge.settings["fallbacks"].as_array().unwrap();
        let loopbacks = &document.inbounds[1..];
        assert_eq!(fallbacks.len(), loopbacks.len());

        for (fallback, inbound) in fallbacks.iter().zip(loopbacks) {
            assert_eq!(fallback["dest"].as_u64(), Some(u64::from(inbound.port)));
            let ws_path = &inbound.stream_settings.ws_settings.as_ref().unwrap().path;
            assert_eq!(fallback["path"].as_str(), Some(ws_path.as_str()));
            assert_eq!(inbound.listen.as_deref(), Some(LOOPBACK));
        }
    }

    #[test]
    fn test_rendered_field_names() {
        let rendered = ProxyConfigDocument::synthesize(&test_config()).render().unwrap();
        assert!(rendered.contains("\"streamSettings\""));
        assert!(rendered.contains("\"wsSettings\""));
        assert!(rendered.contains("\"destOverride\""));
        assert!(rendered.contains("\"alterId\": 0"));
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::builder()
            .uuid("11111111-1111-1111-1111-111111111111")
            .file_path(dir.path())
            .build();
        let fs = TokioFileSystem::new();

        write_proxy_config(&config, &fs).await.unwrap();
        let first = std::fs::read(config.config_path()).unwrap();
        write_proxy_config(&config, &fs).await.unwrap();
        let second = std::fs::read(config.config_path()).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let config = RuntimeConfig::builder().file_path(&blocker).build();

        let result = write_proxy_config(&config, &TokioFileSystem::new()).await;
        assert!(matches!(result, Err(ProxyConfigError::Write(_))));
    }
}
