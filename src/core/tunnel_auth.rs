//! Tunnel credential classification.
//!
//! Rules are applied in order and the first match wins: a blank credential
//! selects an ephemeral quick tunnel, a bare token selects token mode, and a
//! credential carrying the `TunnelSecret` marker selects the structured mode.
//! A bare-token-shaped string is never inspected for the marker.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RuntimeConfig;
use crate::ports::file_system::{FileSystem, FileSystemError};

pub const STRUCTURED_CREDENTIAL_MARKER: &str = "TunnelSecret";

static BARE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9=]{120,250}$").expect("token pattern is a valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelMode {
    /// Ephemeral tunnel; the hostname is only discoverable from the client log
    Quick,
    /// Pre-registered tunnel addressed by a bare token
    Token,
    /// Pre-registered tunnel described by a JSON credential and a routing manifest
    StructuredCredential,
}

impl std::fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TunnelMode::Quick => write!(f, "quick"),
            TunnelMode::Token => write!(f, "token"),
            TunnelMode::StructuredCredential => write!(f, "json"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TunnelAuthError {
    #[error("Malformed tunnel credential: {0}")]
    MalformedCredential(String),

    #[error("Failed to render routing manifest: {0}")]
    Manifest(#[from] serde_yaml::Error),

    #[error("Failed to persist tunnel credential artifacts: {0}")]
    Write(#[from] FileSystemError),
}

/// Outcome of classifying a credential string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Quick,
    Token,
    Structured { tunnel_id: String },
}

impl Classification {
    pub fn mode(&self) -> TunnelMode {
        match self {
            Classification::Quick => TunnelMode::Quick,
            Classification::Token => TunnelMode::Token,
            Classification::Structured { .. } => TunnelMode::StructuredCredential,
        }
    }
}

#[derive(Deserialize)]
struct StructuredCredential {
    #[serde(rename = "TunnelID")]
    tunnel_id: String,
}

/// Classify a raw credential without touching the file system.
pub fn classify(credential: Option<&str>) -> Result<Classification, TunnelAuthError> {
    let Some(raw) = credential.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(Classification::Quick);
    };

    if BARE_TOKEN.is_match(raw) {
        return Ok(Classification::Token);
    }

    if raw.contains(STRUCTURED_CREDENTIAL_MARKER) {
        let tunnel_id = parse_tunnel_id(raw)?;
        return Ok(Classification::Structured { tunnel_id });
    }

    tracing::warn!(
        "Tunnel credential is neither a bare token nor a structured credential; using a quick tunnel"
    );
    Ok(Classification::Quick)
}

fn parse_tunnel_id(raw: &str) -> Result<String, TunnelAuthError> {
    let credential: StructuredCredential = serde_json::from_str(raw)
        .map_err(|e| TunnelAuthError::MalformedCredential(format!("cannot read TunnelID: {e}")))?;

    let tunnel_id = credential.tunnel_id.trim();
    if tunnel_id.is_empty() {
        return Err(TunnelAuthError::MalformedCredential(
            "TunnelID is empty".to_string(),
        ));
    }
    Ok(tunnel_id.to_string())
}

#[derive(Debug, Serialize)]
pub struct RoutingManifest {
    pub tunnel: String,
    #[serde(rename = "credentials-file")]
    pub credentials_file: PathBuf,
    pub protocol: String,
    pub ingress: Vec<IngressRule>,
}

#[derive(Debug, Serialize)]
pub struct IngressRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
    #[serde(rename = "originRequest", skip_serializing_if = "Option::is_none")]
    pub origin_request: Option<OriginRequest>,
}

#[derive(Debug, Serialize)]
pub struct OriginRequest {
    #[serde(rename = "noTLSVerify")]
    pub no_tls_verify: bool,
}

impl RoutingManifest {
    /// Route the public hostname to the local edge port, everything else to 404.
    pub fn new(
        tunnel_id: &str,
        credentials_file: &Path,
        hostname: Option<&str>,
        local_target: &str,
    ) -> Self {
        let mut ingress = Vec::with_capacity(2);
        match hostname {
            Some(hostname) => ingress.push(IngressRule {
                hostname: Some(hostname.to_string()),
                service: local_target.to_string(),
                origin_request: Some(OriginRequest {
                    no_tls_verify: true,
                }),
            }),
            None => tracing::warn!(
                "No public hostname configured; the routing manifest only has the catch-all rule"
            ),
        }
        ingress.push(IngressRule {
            hostname: None,
            service: "http_status:404".to_string(),
            origin_request: None,
        });

        Self {
            tunnel: tunnel_id.to_string(),
            credentials_file: credentials_file.to_path_buf(),
            protocol: "http2".to_string(),
            ingress,
        }
    }

    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Classify the configured credential and, for structured credentials,
/// write the credentials file and routing manifest the tunnel client needs.
pub async fn resolve_tunnel_mode(
    config: &RuntimeConfig,
    fs: &dyn FileSystem,
) -> Result<TunnelMode, TunnelAuthError> {
    let classification = classify(config.tunnel_credential())?;

    if let Classification::Structured { tunnel_id } = &classification {
        let credentials_path = config.credentials_path();
        let manifest_path = config.manifest_path();
        let raw = config.tunnel_credential().unwrap_or_default();

        fs.write(&credentials_path, raw.as_bytes()).await?;

        let manifest = RoutingManifest::new(
            tunnel_id,
            &credentials_path,
            config.static_domain(),
            &config.local_target_url(),
        );
        fs.write(&manifest_path, manifest.render()?.as_bytes()).await?;

        tracing::info!(
            tunnel_id = %tunnel_id,
            manifest = %manifest_path.display(),
            "Structured tunnel credential materialized"
        );
    }

    let mode = classification.mode();
    tracing::info!(mode = %mode, "Tunnel mode selected");
    Ok(mode)
}
