use std::path::PathBuf;
use thiserror::Error;

/// Error type for subprocess launches
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SpawnError {
    /// The binary does not exist at the configured path
    #[error("Binary not found: {0}")]
    NotFound(PathBuf),

    /// The OS refused to start the process
    #[error("Failed to start {program}: {source}")]
    Io {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A fully resolved command line for one subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// ProcessSpawner defines the port for starting detached subprocesses
pub trait ProcessSpawner: Send + Sync + 'static {
    /// Start the process with all output discarded and return its pid
    ///
    /// The process keeps running independently; nothing tracks it afterwards.
    fn spawn_detached(&self, spec: &LaunchSpec) -> Result<u32, SpawnError>;
}
