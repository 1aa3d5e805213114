use std::process::Stdio;

use tokio::process::Command;

use crate::ports::process::{LaunchSpec, ProcessSpawner, SpawnError};

/// Starts subprocesses in their own process group with stdio discarded.
///
/// The child handle is dropped right after spawning; tokio reaps the exit
/// status in the background, so no zombie is left behind.
#[derive(Debug, Default, Clone)]
pub struct DetachedSpawner;

impl DetachedSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessSpawner for DetachedSpawner {
    fn spawn_detached(&self, spec: &LaunchSpec) -> Result<u32, SpawnError> {
        if !spec.program.exists() {
            return Err(SpawnError::NotFound(spec.program.clone()));
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| SpawnError::Io {
            program: spec.program.clone(),
            source,
        })?;

        Ok(child.id().unwrap_or_default())
    }
}
