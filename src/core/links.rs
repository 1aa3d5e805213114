//! Connection descriptors and the encoded subscription bundle.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use thiserror::Error;
use url::form_urlencoded;

use crate::config::RuntimeConfig;
use crate::core::proxy_config::{Protocol, WsRoute};
use crate::core::publisher::Publisher;
use crate::core::subscription::SubscriptionSlot;
use crate::metrics;
use crate::ports::file_system::{FileSystem, FileSystemError};
use crate::ports::http_client::HttpClient;

pub const ORG_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);
/// Label used when the lookup answers without an organization.
pub const ORG_MISSING_LABEL: &str = "Cloud";
/// Label used when the lookup fails or times out.
pub const ORG_FALLBACK_LABEL: &str = "Net";

const DEFAULT_NAME_PREFIX: &str = "Claw";
const EARLY_DATA_SUFFIX: &str = "?ed=2560";
const FINGERPRINT: &str = "firefox";

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Failed to encode descriptor: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to persist subscription: {0}")]
    Write(#[from] FileSystemError),
}

/// Look up the organization owning this host's public address.
///
/// Never fails: any error or timeout yields [`ORG_FALLBACK_LABEL`].
pub async fn lookup_org_label(http: &dyn HttpClient, url: &str) -> String {
    let lookup = tokio::time::timeout(ORG_LOOKUP_TIMEOUT, http.get_json(url, ORG_LOOKUP_TIMEOUT));
    match lookup.await {
        Ok(Ok(body)) => body
            .get("org")
            .and_then(|org| org.as_str())
            .map(str::trim)
            .filter(|org| !org.is_empty())
            .unwrap_or(ORG_MISSING_LABEL)
            .to_string(),
        Ok(Err(err)) => {
            tracing::debug!("Organization lookup failed, using fallback label: {}", err);
            ORG_FALLBACK_LABEL.to_string()
        }
        Err(_) => {
            tracing::debug!("Organization lookup timed out after {:?}", ORG_LOOKUP_TIMEOUT);
            ORG_FALLBACK_LABEL.to_string()
        }
    }
}

pub fn display_name(prefix: &str, org: &str) -> String {
    let prefix = match prefix.trim() {
        "" => DEFAULT_NAME_PREFIX,
        p => p,
    };
    format!("{prefix}-{org}")
}

#[derive(Serialize)]
struct VmessDescriptor<'a> {
    v: &'a str,
    ps: &'a str,
    add: &'a str,
    port: String,
    id: &'a str,
    aid: &'a str,
    scy: &'a str,
    net: &'a str,
    #[serde(rename = "type")]
    header_type: &'a str,
    host: &'a str,
    path: String,
    tls: &'a str,
    sni: &'a str,
    alpn: &'a str,
    fp: &'a str,
}

/// The three connection descriptors plus their combined encoded form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionBundle {
    pub vmess: String,
    pub vless: String,
    pub trojan: String,
    /// Base64 of the newline-joined descriptors; served byte-for-byte
    pub encoded: String,
}

impl SubscriptionBundle {
    /// Build every descriptor for `hostname`. Deterministic in its inputs.
    pub fn build(hostname: &str, config: &RuntimeConfig, org: &str) -> Result<Self, LinkError> {
        let name = display_name(&config.name, org);

        let vmess = vmess_descriptor(hostname, config, &name)?;
        let vless = url_descriptor(
            Protocol::Vless,
            hostname,
            config,
            &name,
            &[("encryption", "none")],
        );
        let trojan = url_descriptor(Protocol::Trojan, hostname, config, &name, &[]);

        let plain = [vmess.as_str(), vless.as_str(), trojan.as_str()].join("\n");
        let encoded = STANDARD.encode(plain);

        Ok(Self {
            vmess,
            vless,
            trojan,
            encoded,
        })
    }

    pub fn lines(&self) -> [&str; 3] {
        [&self.vmess, &self.vless, &self.trojan]
    }
}

fn advertised_path(protocol: Protocol) -> String {
    format!("{}{}", WsRoute::for_protocol(protocol).path, EARLY_DATA_SUFFIX)
}

fn vmess_descriptor(hostname: &str, config: &RuntimeConfig, name: &str) -> Result<String, LinkError> {
    let descriptor = VmessDescriptor {
        v: "2",
        ps: name,
        add: &config.cfip,
        port: config.cfport.to_string(),
        id: &config.uuid,
        aid: "0",
        scy: "none",
        net: "ws",
        header_type: "none",
        host: hostname,
        path: advertised_path(Protocol::Vmess),
        tls: "tls",
        sni: hostname,
        alpn: "",
        fp: FINGERPRINT,
    };
    let json = serde_json::to_string(&descriptor)?;
    Ok(format!("vmess://{}", STANDARD.encode(json)))
}

/// `scheme://id@front:port?params#name` descriptors share one parameter schema;
/// `leading` carries the protocol-specific parameters placed first.
fn url_descriptor(
    protocol: Protocol,
    hostname: &str,
    config: &RuntimeConfig,
    name: &str,
    leading: &[(&str, &str)],
) -> String {
    let path = advertised_path(protocol);
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(leading.iter().copied())
        .extend_pairs([
            ("security", "tls"),
            ("sni", hostname),
            ("fp", FINGERPRINT),
            ("type", "ws"),
            ("host", hostname),
            ("path", path.as_str()),
        ])
        .finish();

    format!(
        "{protocol}://{}@{}:{}?{query}#{}",
        config.uuid,
        config.cfip,
        config.cfport,
        encode_fragment(name)
    )
}

// Form encoding writes spaces as '+'; a literal '+' is already escaped, so
// swapping gives component-style %20.
fn encode_fragment(text: &str) -> String {
    form_urlencoded::byte_serialize(text.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Builds, persists and serves the subscription once a hostname is known.
pub struct LinkSynthesizer {
    config: Arc<RuntimeConfig>,
    fs: Arc<dyn FileSystem>,
    http: Arc<dyn HttpClient>,
    slot: Arc<SubscriptionSlot>,
    publisher: Publisher,
}

impl LinkSynthesizer {
    pub fn new(
        config: Arc<RuntimeConfig>,
        fs: Arc<dyn FileSystem>,
        http: Arc<dyn HttpClient>,
        slot: Arc<SubscriptionSlot>,
    ) -> Self {
        let publisher = Publisher::new(config.clone(), http.clone());
        Self {
            config,
            fs,
            http,
            slot,
            publisher,
        }
    }

    /// Generate the bundle for `hostname`, persist it, make it servable, then
    /// hand off to the publisher without waiting on it.
    pub async fn synthesize(&self, hostname: &str) -> Result<SubscriptionBundle, LinkError> {
        let org = lookup_org_label(self.http.as_ref(), &self.config.org_lookup_url).await;
        let bundle = SubscriptionBundle::build(hostname, &self.config, &org)?;

        self.fs
            .write(&self.config.subscription_path(), bundle.encoded.as_bytes())
            .await?;

        if self.slot.publish(bundle.encoded.clone()) {
            metrics::set_subscription_ready(true);
            tracing::info!(
                hostname = %hostname,
                "Subscription generated. Access at /{}",
                self.config.sub_path
            );
        } else {
            tracing::warn!("Subscription already published; keeping the first one");
        }

        self.publisher.publish_detached();
        Ok(bundle)
    }
}
