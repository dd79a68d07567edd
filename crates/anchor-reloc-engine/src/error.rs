use anchor_reloc_core::StoreError;
use uuid::Uuid;

#[derive(thiserror::Error, Debug)]
pub enum RelocalizationError {
    #[error("no reference fiducials available")]
    NoFiducialsAvailable,
    #[error("unknown fiducial `{0}`")]
    UnknownFiducial(String),
    #[error("package {0} is not part of this session")]
    UnknownPackage(Uuid),
    #[error("Strategy '{0}' not found")]
    StrategyNotFound(String),
    #[error("relocalization timed out after {0:.1} s")]
    Timeout(f64),
    #[error("relocalization is not running")]
    NotRunning,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
