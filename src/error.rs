use pregel_api::ComputeError;

#[derive(Debug)]
pub enum PregelError {
    Generic(String),
    ReadFile(String, String),
    Config(String),
    UnknownCollection(String),
    ShardCountMismatch(String, usize, String, usize),
    UnknownAlgorithm(String),
    Parameter(&'static str, &'static str, String),
    Storage(String),
    DocumentNotFound(String),
    InvalidDocumentId(String),
    InvalidState(&'static str, String),
    Computation(String),
    Cancelled,
}

impl PregelError {
    /// Configuration errors are detected before any I/O and are never worth retrying.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PregelError::Config(_)
                | PregelError::UnknownCollection(_)
                | PregelError::ShardCountMismatch(..)
                | PregelError::UnknownAlgorithm(_)
                | PregelError::Parameter(..)
        )
    }
}

impl std::fmt::Display for PregelError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            PregelError::Generic(msg) => write!(f, "[PregelError] {}", msg)?,
            PregelError::ReadFile(file_path, e) => {
                write!(f, "[IOError] Could not read file '{}': {}", file_path, e)?;
            }
            PregelError::Config(msg) => write!(f, "[ConfigError] {}", msg)?,
            PregelError::UnknownCollection(name) => {
                write!(f, "[ConfigError] Collection '{}' is not known to the cluster", name)?;
            }
            PregelError::ShardCountMismatch(
                vertex_collection,
                vertex_shards,
                edge_collection,
                edge_shards,
            ) => write!(
                f,
                "[ConfigError] Vertex collection '{}' has {} local shards but edge collection \
                 '{}' has {}; collections must be co-partitioned",
                vertex_collection, vertex_shards, edge_collection, edge_shards
            )?,
            PregelError::UnknownAlgorithm(name) => {
                write!(f, "[ConfigError] Unknown algorithm '{}'", name)?;
            }
            PregelError::Parameter(algorithm, parameter, msg) => {
                write!(f, "[ConfigError] {} parameter '{}': {}", algorithm, parameter, msg)?;
            }
            PregelError::Storage(msg) => write!(f, "[StorageError] {}", msg)?,
            PregelError::DocumentNotFound(id) => {
                write!(f, "[StorageError] Document '{}' not found", id)?;
            }
            PregelError::InvalidDocumentId(id) => {
                write!(f, "[StorageError] Invalid document id '{}'", id)?;
            }
            PregelError::InvalidState(operation, state) => {
                write!(f, "[StateError] Cannot {} in state {}", operation, state)?;
            }
            PregelError::Computation(msg) => write!(f, "[ComputationError] {}", msg)?,
            PregelError::Cancelled => write!(f, "[ComputationError] Job was cancelled")?,
        }
        Ok(())
    }
}

impl std::error::Error for PregelError {}

impl From<ComputeError> for PregelError {
    fn from(e: ComputeError) -> Self {
        PregelError::Computation(e.0)
    }
}

pub fn storage_error(message: String) -> PregelError {
    PregelError::Storage(message)
}

pub fn config_error(message: String) -> PregelError {
    PregelError::Config(message)
}
