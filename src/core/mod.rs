pub mod discovery;
pub mod launcher;
pub mod links;
pub mod orchestrator;
pub mod proxy_config;
pub mod publisher;
pub mod subscription;
pub mod tunnel_auth;

pub use discovery::{DiscoveryState, DomainDiscoverer};
pub use launcher::ProcessLauncher;
pub use links::LinkSynthesizer;
pub use orchestrator::{BootstrapError, Orchestrator};
pub use publisher::Publisher;
pub use subscription::SubscriptionSlot;
pub use tunnel_auth::TunnelMode;
