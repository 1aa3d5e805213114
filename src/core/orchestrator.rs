//! Startup sequence and the background discovery-to-subscription pipeline.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::RuntimeConfig;
use crate::core::discovery::{DiscoveryState, DomainDiscoverer};
use crate::core::launcher::{LaunchReport, ProcessLauncher};
use crate::core::links::LinkSynthesizer;
use crate::core::proxy_config::{ProxyConfigError, write_proxy_config};
use crate::core::subscription::SubscriptionSlot;
use crate::core::tunnel_auth::{TunnelAuthError, TunnelMode, resolve_tunnel_mode};
use crate::ports::file_system::{FileSystem, FileSystemError};
use crate::ports::http_client::HttpClient;
use crate::ports::log_source::LogSource;
use crate::ports::process::ProcessSpawner;

/// Failures that abort startup before any subprocess is launched.
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Failed to prepare working directory: {0}")]
    WorkDir(#[source] FileSystemError),

    #[error(transparent)]
    ProxyConfig(#[from] ProxyConfigError),

    #[error(transparent)]
    TunnelAuth(#[from] TunnelAuthError),
}

#[derive(Debug)]
pub struct BootstrapReport {
    pub mode: TunnelMode,
    pub launches: Vec<LaunchReport>,
}

pub struct Orchestrator {
    config: Arc<RuntimeConfig>,
    fs: Arc<dyn FileSystem>,
    http: Arc<dyn HttpClient>,
    spawner: Arc<dyn ProcessSpawner>,
    log_source: Arc<dyn LogSource>,
    slot: Arc<SubscriptionSlot>,
}

impl Orchestrator {
    pub fn with_dependencies(
        config: Arc<RuntimeConfig>,
        fs: Arc<dyn FileSystem>,
        http: Arc<dyn HttpClient>,
        spawner: Arc<dyn ProcessSpawner>,
        log_source: Arc<dyn LogSource>,
        slot: Arc<SubscriptionSlot>,
    ) -> Self {
        Self {
            config,
            fs,
            http,
            spawner,
            log_source,
            slot,
        }
    }

    /// Write every artifact the subprocesses need, then launch them.
    ///
    /// Artifact failures are fatal; launch failures are only reported.
    pub async fn bootstrap(&self) -> Result<BootstrapReport, BootstrapError> {
        let config = self.config.as_ref();

        self.fs
            .ensure_dir(config.work_dir())
            .await
            .map_err(BootstrapError::WorkDir)?;
        self.remove_stale_artifacts().await;

        write_proxy_config(config, self.fs.as_ref()).await?;
        let mode = resolve_tunnel_mode(config, self.fs.as_ref()).await?;

        let launches = ProcessLauncher::new(self.spawner.clone()).launch_all(config, mode);
        Ok(BootstrapReport { mode, launches })
    }

    /// Resolve the tunnel hostname in the background and synthesize the
    /// subscription exactly once when it is found.
    pub fn spawn_discovery(&self, mode: TunnelMode) -> JoinHandle<DiscoveryState> {
        let discoverer = DomainDiscoverer::new(&self.config, mode, self.log_source.clone());
        let synthesizer = LinkSynthesizer::new(
            self.config.clone(),
            self.fs.clone(),
            self.http.clone(),
            self.slot.clone(),
        );

        tokio::spawn(async move {
            let state = discoverer.run().await;
            if let Some(hostname) = state.hostname() {
                if let Err(err) = synthesizer.synthesize(hostname).await {
                    tracing::error!(hostname = %hostname, "Failed to generate subscription: {}", err);
                }
            }
            state
        })
    }

    pub async fn start(&self) -> Result<JoinHandle<DiscoveryState>, BootstrapError> {
        let report = self.bootstrap().await?;
        Ok(self.spawn_discovery(report.mode))
    }

    // A previous run's log could announce a hostname that no longer exists.
    async fn remove_stale_artifacts(&self) {
        for path in [self.config.boot_log_path(), self.config.subscription_path()] {
            if let Err(err) = self.fs.remove_if_exists(&path).await {
                tracing::warn!("Failed to remove stale artifact: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_system::TokioFileSystem;
    use crate::adapters::http::SubscriptionServer;
    use crate::core::launcher::ProcessKind;
    use crate::ports::http_client::{HttpClientError, JsonFuture, PostFuture};
    use crate::ports::log_source::LogReadFuture;
    use crate::ports::process::{LaunchSpec, SpawnError};
    use crate::utils::graceful_shutdown::GracefulShutdown;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::{Value, json};
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    const UUID: &str = "11111111-1111-1111-1111-111111111111";

    #[derive(Default)]
    struct RecordingSpawner {
        launched: Mutex<Vec<LaunchSpec>>,
    }

    impl ProcessSpawner for RecordingSpawner {
        fn spawn_detached(&self, spec: &LaunchSpec) -> Result<u32, SpawnError> {
            self.launched.lock().unwrap().push(spec.clone());
            Ok(4242)
        }
    }

    struct OfflineHttp;

    impl HttpClient for OfflineHttp {
        fn get_json<'a>(&'a self, url: &'a str, _timeout: Duration) -> JsonFuture<'a> {
            Box::pin(async move { Err(HttpClientError::ConnectionError(url.to_string())) })
        }

        fn post_json<'a>(&'a self, _url: &'a str, _body: &'a Value) -> PostFuture<'a> {
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct FakeLog(Mutex<Option<String>>);

    impl LogSource for FakeLog {
        fn read_log(&self) -> LogReadFuture<'_> {
            let content = self.0.lock().unwrap().clone();
            Box::pin(async move { Ok(content) })
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        spawner: Arc<RecordingSpawner>,
        log: Arc<FakeLog>,
        slot: Arc<SubscriptionSlot>,
    }

    fn harness(config: RuntimeConfig) -> Harness {
        let spawner = Arc::new(RecordingSpawner::default());
        let log = Arc::new(FakeLog::default());
        let slot = Arc::new(SubscriptionSlot::new());
        let orchestrator = Orchestrator::with_dependencies(
            Arc::new(config),
            Arc::new(TokioFileSystem::new()),
            Arc::new(OfflineHttp),
            spawner.clone(),
            log.clone(),
            slot.clone(),
        );
        Harness {
            orchestrator,
            spawner,
            log,
            slot,
        }
    }

    fn quick_config(dir: &Path) -> RuntimeConfig {
        RuntimeConfig::builder()
            .uuid(UUID)
            .file_path(dir.join("work"))
            .discovery_timing(0, 1)
            .build()
    }

    async fn get_sub(server: &SubscriptionServer) -> (StatusCode, String) {
        let response = server
            .build_app()
            .oneshot(Request::builder().uri("/sub").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_quick_tunnel_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config(dir.path());
        let h = harness(config.clone());
        let server = SubscriptionServer::with_dependencies(
            "127.0.0.1:0",
            "sub",
            h.slot.clone(),
            None,
            Arc::new(GracefulShutdown::new()),
        );

        let report = h.orchestrator.bootstrap().await.unwrap();
        assert_eq!(report.mode, TunnelMode::Quick);
        assert!(config.config_path().exists());
        assert_eq!(h.spawner.launched.lock().unwrap().len(), 2);

        assert_eq!(get_sub(&server).await.0, StatusCode::NOT_FOUND);

        *h.log.0.lock().unwrap() =
            Some("INF |  https://foo.trycloudflare.com  |".to_string());
        let state = h.orchestrator.spawn_discovery(report.mode).await.unwrap();
        assert_eq!(state.hostname(), Some("foo.trycloudflare.com"));

        let (status, body) = get_sub(&server).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            std::fs::read_to_string(config.subscription_path()).unwrap(),
            body
        );

        let decoded = String::from_utf8(STANDARD.decode(&body).unwrap()).unwrap();
        let lines: Vec<&str> = decoded.lines().collect();
        assert_eq!(lines.len(), 3);

        let vmess = lines[0].strip_prefix("vmess://").unwrap();
        let descriptor: Value =
            serde_json::from_slice(&STANDARD.decode(vmess).unwrap()).unwrap();
        assert_eq!(descriptor["sni"], json!("foo.trycloudflare.com"));
        assert_eq!(descriptor["id"], json!(UUID));

        assert!(lines[1].starts_with("vless://"));
        assert!(lines[2].starts_with("trojan://"));
        for line in &lines[1..] {
            assert!(line.contains("sni=foo.trycloudflare.com"));
            assert!(line.contains(UUID));
        }
    }

    #[tokio::test]
    async fn test_bootstrap_clears_stale_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = quick_config(dir.path());
        std::fs::create_dir_all(config.work_dir()).unwrap();
        std::fs::write(config.boot_log_path(), "https://old.trycloudflare.com").unwrap();
        std::fs::write(config.subscription_path(), "stale").unwrap();

        harness(config.clone()).orchestrator.bootstrap().await.unwrap();

        assert!(!config.boot_log_path().exists());
        assert!(!config.subscription_path().exists());
    }

    #[tokio::test]
    async fn test_static_domain_with_token() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::builder()
            .uuid(UUID)
            .file_path(dir.path())
            .argo_auth("A".repeat(150))
            .argo_domain("edge.example.com")
            .build();
        let h = harness(config);

        let report = h.orchestrator.bootstrap().await.unwrap();
        assert_eq!(report.mode, TunnelMode::Token);
        assert!(report.launches.iter().any(|r| r.kind == ProcessKind::Tunnel));

        let state = h.orchestrator.spawn_discovery(report.mode).await.unwrap();
        assert_eq!(state.hostname(), Some("edge.example.com"));
        assert!(h.slot.is_ready());
    }

    #[tokio::test]
    async fn test_malformed_structured_credential_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::builder()
            .uuid(UUID)
            .file_path(dir.path())
            .argo_auth(r#"{"AccountTag":"a","TunnelSecret":"s"}"#)
            .build();
        let h = harness(config);

        let err = h.orchestrator.bootstrap().await.unwrap_err();
        assert!(matches!(err, BootstrapError::TunnelAuth(_)));
        assert!(h.spawner.launched.lock().unwrap().is_empty());
    }
}
