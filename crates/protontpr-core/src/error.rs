// ProtonTPR Error Taxonomy
// One error enum for discovery, attach, forwarding and the run loop

use std::path::PathBuf;

/// Result type for mirror operations
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Errors that can occur while locating, attaching or mirroring a device
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No device matching '{pattern}' found in {}", .dir.display())]
    NotFound { dir: PathBuf, pattern: String },

    #[error("{} devices match '{pattern}', refusing to guess: {}", .candidates.len(), join_paths(.candidates))]
    Ambiguous {
        pattern: String,
        candidates: Vec<PathBuf>,
    },

    #[error("Could not open device {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read device descriptor of {}: {source}", .path.display())]
    Context {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not create virtual device: {0}")]
    VirtualCreation(String),

    #[error("Device {} disconnected", .path.display())]
    Disconnected { path: PathBuf },

    #[error("Read error on {}: {source}", .path.display())]
    TransientRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hotplug monitor error: {0}")]
    Hotplug(#[source] std::io::Error),

    #[error("System call failed: {0}")]
    SystemCall(#[from] std::io::Error),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl MirrorError {
    /// Process exit code for this failure class.
    ///
    /// Code 2 is left to clap for usage errors; 0 is graceful shutdown.
    pub fn exit_code(&self) -> i32 {
        match self {
            MirrorError::Config(_) => 1,
            MirrorError::NotFound { .. } => 3,
            MirrorError::Ambiguous { .. } => 4,
            MirrorError::Open { .. } => 5,
            MirrorError::Context { .. } => 6,
            MirrorError::VirtualCreation(_) => 7,
            MirrorError::Hotplug(_) | MirrorError::SystemCall(_) => 8,
            MirrorError::Disconnected { .. } | MirrorError::TransientRead { .. } => 9,
        }
    }
}
