use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::core::tunnel_auth::TunnelMode;
use crate::metrics;
use crate::ports::process::{LaunchSpec, ProcessSpawner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    Proxy,
    Tunnel,
    Telemetry,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Proxy => "proxy",
            ProcessKind::Tunnel => "tunnel",
            ProcessKind::Telemetry => "telemetry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Started { pid: u32 },
    Failed(String),
}

impl LaunchOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, LaunchOutcome::Started { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub kind: ProcessKind,
    pub outcome: LaunchOutcome,
}

pub fn proxy_command(config: &RuntimeConfig) -> LaunchSpec {
    LaunchSpec::new(&config.proxy_bin)
        .arg("-c")
        .arg(config.config_path().display().to_string())
}

/// Tunnel client arguments for each mode.
///
/// Only quick mode writes a log file, since that log is the sole channel the
/// ephemeral hostname is announced on.
pub fn tunnel_command(config: &RuntimeConfig, mode: TunnelMode) -> LaunchSpec {
    let spec = LaunchSpec::new(&config.tunnel_bin).args(["tunnel", "--edge-ip-version", "auto"]);

    match mode {
        TunnelMode::Token => spec
            .args(["--no-autoupdate", "--protocol", "http2", "run", "--token"])
            .arg(config.tunnel_credential().unwrap_or_default()),
        TunnelMode::StructuredCredential => spec
            .arg("--config")
            .arg(config.manifest_path().display().to_string())
            .arg("run"),
        TunnelMode::Quick => spec
            .args(["--no-autoupdate", "--protocol", "http2", "--logfile"])
            .arg(config.boot_log_path().display().to_string())
            .args(["--loglevel", "info", "--url"])
            .arg(config.local_target_url()),
    }
}

/// Telemetry agent arguments, or `None` unless server, port and key are all set.
pub fn telemetry_command(config: &RuntimeConfig) -> Option<LaunchSpec> {
    let telemetry = config.telemetry()?;

    let mut spec = LaunchSpec::new(&config.telemetry_bin)
        .arg("-s")
        .arg(format!("{}:{}", telemetry.server, telemetry.port))
        .arg("-p")
        .arg(telemetry.key);
    if telemetry.tls {
        spec = spec.arg("--tls");
    }
    Some(spec.args([
        "--disable-auto-update",
        "--report-delay",
        "4",
        "--skip-conn",
        "--skip-procs",
    ]))
}

pub struct ProcessLauncher {
    spawner: Arc<dyn ProcessSpawner>,
}

impl ProcessLauncher {
    pub fn new(spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self { spawner }
    }

    /// Start every configured subprocess. Failures are logged and reported,
    /// never propagated.
    pub fn launch_all(&self, config: &RuntimeConfig, mode: TunnelMode) -> Vec<LaunchReport> {
        let mut plan = vec![
            (ProcessKind::Proxy, proxy_command(config)),
            (ProcessKind::Tunnel, tunnel_command(config, mode)),
        ];
        match telemetry_command(config) {
            Some(spec) => plan.push((ProcessKind::Telemetry, spec)),
            None => tracing::debug!("Telemetry agent not fully configured; skipping"),
        }

        plan.into_iter()
            .map(|(kind, spec)| self.launch(kind, &spec, mode))
            .collect()
    }

    fn launch(&self, kind: ProcessKind, spec: &LaunchSpec, mode: TunnelMode) -> LaunchReport {
        let outcome = match self.spawner.spawn_detached(spec) {
            Ok(pid) => {
                if kind == ProcessKind::Tunnel {
                    tracing::info!(process = kind.as_str(), pid, mode = %mode, "Tunnel client started");
                } else {
                    tracing::info!(process = kind.as_str(), pid, "Process started");
                }
                LaunchOutcome::Started { pid }
            }
            Err(err) => {
                tracing::error!(process = kind.as_str(), "Start failed: {}", err);
                LaunchOutcome::Failed(err.to_string())
            }
        };

        metrics::increment_launch_total(kind.as_str(), outcome.is_started());
        LaunchReport { kind, outcome }
    }
}
