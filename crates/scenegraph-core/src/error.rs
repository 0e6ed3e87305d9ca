use thiserror::Error;

#[derive(Error, Debug)]
pub enum SceneGraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bad bootstrap: {0}")]
    BadBootstrap(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Dangling reference: {0}")]
    DanglingRef(String),

    #[error("Bad intent: {0}")]
    BadIntent(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, SceneGraphError>;
