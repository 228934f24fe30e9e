use thiserror::Error;

#[derive(Error, Debug)]
pub enum CastError {
    // Préconditions du dispatcher : signalées, jamais fatales
    #[error("No active cast session")]
    NoActiveSession,
    #[error("Cannot load an empty queue")]
    EmptyQueue,
    #[error("Start index {index} is out of range for a queue of {len} items")]
    StartIndexOutOfRange { index: usize, len: usize },

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS Error: {0}")]
    Tls(#[from] rustls::Error),
    #[error("Transport Error: {0}")]
    Transport(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
    #[error("Cast protocol Error: {0}")]
    Protocol(String),
    #[error("Receiver rejected {0}")]
    Receiver(String),
    #[error("Request of {size} bytes exceeds the {limit} bytes message limit")]
    RequestTooLarge { size: usize, limit: usize },
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Discovery Error: {0}")]
    Discovery(String),
    #[error("Session controller is gone")]
    ControllerStopped,

    #[error("Configuration Error: {0}")]
    Config(String),
    #[error("YAML Error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CastError {
    pub fn transport(message: impl Into<String>) -> Self {
        CastError::Transport(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        CastError::Protocol(message.into())
    }

    pub fn receiver(message: impl Into<String>) -> Self {
        CastError::Receiver(message.into())
    }

    /// True when the error means the connection to the receiver is unusable.
    ///
    /// Receiver-side rejections, requests refused before sending and
    /// precondition failures leave the session intact; everything that broke
    /// the socket or the handshake does not.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CastError::Io(_) | CastError::Tls(_) | CastError::Transport(_) | CastError::Timeout(_)
        )
    }

    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            CastError::NoActiveSession
                | CastError::EmptyQueue
                | CastError::StartIndexOutOfRange { .. }
        )
    }
}

impl From<rust_cast::errors::Error> for CastError {
    fn from(err: rust_cast::errors::Error) -> Self {
        use rust_cast::errors::Error;

        match err {
            Error::Io(e) => CastError::Io(e),
            Error::Tls(e) => CastError::Tls(e),
            Error::Dns(e) => CastError::transport(format!("invalid receiver host: {}", e)),
            Error::Protobuf(e) => CastError::transport(format!("unreadable frame: {}", e)),
            // Le message a été reçu mais ne se lit pas : la connexion reste bonne.
            Error::Serialization(e) => CastError::protocol(e.to_string()),
            Error::Parsing(e) => CastError::protocol(e),
            // LOAD_FAILED, LAUNCH_ERROR, INVALID_REQUEST... arrivent tous ici
            Error::Internal(e) | Error::Namespace(e) => CastError::receiver(e),
        }
    }
}
