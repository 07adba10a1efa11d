use thiserror::Error;

#[derive(Error, Debug)]
pub enum FabricError {
    #[error("failed to parse '{input}' at {what}")]
    Parse { input: String, what: &'static str },

    #[error("{0} exhausted")]
    ResourceExhausted(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("{0} is busy")]
    Busy(String),

    #[error("route table error: {0}")]
    Route(String),

    #[error("I/O fault on {target}: {source}")]
    IoFault {
        target: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} closed while data remained")]
    PeerClosed(&'static str),

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FabricError>;
