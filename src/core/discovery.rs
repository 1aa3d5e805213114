//! Discovery of the publicly reachable tunnel hostname.
//!
//! A configured static hostname resolves immediately. Otherwise, in quick
//! mode, the tunnel client's log is scanned on a fixed timer until it
//! announces the ephemeral hostname. Scans are strictly sequential and the
//! timer is a tokio sleep, so the HTTP server keeps serving meanwhile.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::{Instant, sleep};

use crate::config::RuntimeConfig;
use crate::core::tunnel_auth::TunnelMode;
use crate::metrics;
use crate::ports::log_source::LogSource;

/// Domain suffix the tunnel provider assigns to ephemeral tunnels.
pub const QUICK_TUNNEL_SUFFIX: &str = "trycloudflare.com";

// Appears in the client's own error lines; never an assigned tunnel hostname.
const PROVIDER_API_HOST: &str = "api.trycloudflare.com";

static QUICK_TUNNEL_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://((?:[A-Za-z0-9-]+\.)+trycloudflare\.com)\b")
        .expect("quick tunnel pattern is a valid regex")
});

/// Find the first ephemeral tunnel hostname announced in raw log text.
pub fn extract_hostname(log: &str) -> Option<String> {
    QUICK_TUNNEL_URL
        .captures_iter(log)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
        .find(|host| host != PROVIDER_API_HOST)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainSource {
    Static,
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryState {
    /// Waiting for the tunnel log to announce a hostname
    AwaitingLog { attempts: u32 },
    /// Hostname known; terminal
    Resolved {
        hostname: String,
        source: DomainSource,
    },
    /// A registered tunnel without a configured hostname; nothing can be discovered
    Unavailable,
    /// The optional discovery ceiling elapsed; terminal
    TimedOut { attempts: u32 },
}

impl DiscoveryState {
    /// Where discovery starts for a given static hostname and tunnel mode.
    pub fn initial(static_domain: Option<&str>, mode: TunnelMode) -> Self {
        match (static_domain, mode) {
            (Some(hostname), _) => DiscoveryState::Resolved {
                hostname: hostname.to_string(),
                source: DomainSource::Static,
            },
            (None, TunnelMode::Quick) => DiscoveryState::AwaitingLog { attempts: 0 },
            (None, _) => DiscoveryState::Unavailable,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DiscoveryState::AwaitingLog { .. })
    }

    pub fn hostname(&self) -> Option<&str> {
        match self {
            DiscoveryState::Resolved { hostname, .. } => Some(hostname),
            _ => None,
        }
    }
}

pub struct DomainDiscoverer {
    state: DiscoveryState,
    log_source: Arc<dyn LogSource>,
    settle: Duration,
    retry: Duration,
    timeout: Option<Duration>,
}

impl DomainDiscoverer {
    pub fn new(config: &RuntimeConfig, mode: TunnelMode, log_source: Arc<dyn LogSource>) -> Self {
        Self {
            state: DiscoveryState::initial(config.static_domain(), mode),
            log_source,
            settle: config.discovery_settle(),
            retry: config.discovery_retry(),
            timeout: config.discovery_timeout(),
        }
    }

    pub fn state(&self) -> &DiscoveryState {
        &self.state
    }

    /// Make a single scan of the log. A no-op outside `AwaitingLog`.
    pub async fn poll_once(&mut self) -> &DiscoveryState {
        let DiscoveryState::AwaitingLog { attempts } = self.state else {
            return &self.state;
        };
        let attempt = attempts + 1;

        let found = match self.log_source.read_log().await {
            Ok(Some(content)) => extract_hostname(&content),
            Ok(None) => {
                tracing::debug!(attempt, "Tunnel log not written yet");
                None
            }
            Err(err) => {
                tracing::warn!(attempt, "Failed to read tunnel log: {}", err);
                None
            }
        };

        self.state = match found {
            Some(hostname) => {
                metrics::increment_discovery_attempt("hit");
                tracing::info!(hostname = %hostname, attempt, "Found quick tunnel domain");
                DiscoveryState::Resolved {
                    hostname,
                    source: DomainSource::Log,
                }
            }
            None => {
                metrics::increment_discovery_attempt("miss");
                tracing::info!(attempt, "Waiting for tunnel domain...");
                DiscoveryState::AwaitingLog { attempts: attempt }
            }
        };
        &self.state
    }

    /// Drive discovery to a terminal state.
    ///
    /// Without a configured ceiling this only returns once a hostname is found.
    pub async fn run(mut self) -> DiscoveryState {
        match &self.state {
            DiscoveryState::Resolved { hostname, .. } => {
                tracing::info!(hostname = %hostname, "Using configured tunnel domain");
                return self.state;
            }
            DiscoveryState::Unavailable => {
                tracing::warn!(
                    "Registered tunnel without a configured hostname; subscription will not be generated"
                );
                return self.state;
            }
            _ => {}
        }

        let started = Instant::now();
        sleep(self.settle).await;

        loop {
            if self.poll_once().await.is_terminal() {
                return self.state;
            }

            if let Some(limit) = self.timeout {
                if started.elapsed() + self.retry > limit {
                    let attempts = match self.state {
                        DiscoveryState::AwaitingLog { attempts } => attempts,
                        _ => 0,
                    };
                    tracing::warn!(attempts, "Tunnel domain discovery timed out after {:?}", limit);
                    self.state = DiscoveryState::TimedOut { attempts };
                    return self.state;
                }
            }

            sleep(self.retry).await;
        }
    }
}
