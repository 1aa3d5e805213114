/// Edgesub - tunnel domain discovery and subscription synthesis
///
/// This crate provisions a local proxy engine and a tunnel client, then:
/// - Discovers the public hostname the tunnel is reachable under
/// - Synthesizes vmess, vless and trojan connection descriptors for it
/// - Serves the encoded bundle over HTTP and announces it to an aggregator
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

// These modules are implementation details and should not be directly used by users
pub(crate) mod adapters;
pub(crate) mod core;

// Re-export the specific types needed by the binary crate
pub use crate::adapters::{
    DetachedSpawner, FileLogSource, ReqwestHttpClient, SubscriptionServer, TokioFileSystem,
};
pub use crate::core::{BootstrapError, DiscoveryState, Orchestrator, SubscriptionSlot, TunnelMode};
