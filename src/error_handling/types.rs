use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadBindAddress(String),
    OutOfRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadBindAddress(e) => write!(f, "Bind address error: {}", e),
            ConfigError::OutOfRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures reported by the container engine client.
///
/// These are the only errors the `container_runtime` implementations may
/// return; everything coming back from the engine is translated into one
/// of these variants before it leaves that module.
#[derive(Debug)]
pub enum RuntimeError {
    /// The engine cannot be reached at all.
    Unavailable(String),
    /// The requested image reference cannot be resolved.
    ImageInvalid(String),
    /// The engine does not know the referenced container.
    NotFound(String),
    /// Any other engine-side failure.
    Api(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Unavailable(e) => write!(f, "Container engine unavailable: {}", e),
            RuntimeError::ImageInvalid(e) => write!(f, "Invalid image reference: {}", e),
            RuntimeError::NotFound(e) => write!(f, "Container not found: {}", e),
            RuntimeError::Api(e) => write!(f, "Container engine error: {}", e),
        }
    }
}

impl std::error::Error for RuntimeError {}

#[derive(Debug)]
pub enum ContainerError {
    RuntimeUnavailable(String),
    ImageInvalid(String),
    NotRunning(String),
    UnknownContainer(String),
    EngineFailure(String),
}

impl fmt::Display for ContainerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerError::RuntimeUnavailable(e) => {
                write!(f, "Container runtime unavailable: {}", e)
            }
            ContainerError::ImageInvalid(e) => write!(f, "Invalid container image: {}", e),
            ContainerError::NotRunning(status) => {
                write!(f, "Container is not running (status: {})", status)
            }
            ContainerError::UnknownContainer(id) => {
                write!(f, "Container {} is not managed by this service", id)
            }
            ContainerError::EngineFailure(e) => write!(f, "Container operation failed: {}", e),
        }
    }
}

impl std::error::Error for ContainerError {}

impl From<RuntimeError> for ContainerError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Unavailable(e) => ContainerError::RuntimeUnavailable(e),
            RuntimeError::ImageInvalid(e) => ContainerError::ImageInvalid(e),
            RuntimeError::NotFound(e) => ContainerError::UnknownContainer(e),
            RuntimeError::Api(e) => ContainerError::EngineFailure(e),
        }
    }
}

/// Session authorization failures.
///
/// `Invalid` is deliberately uniform: expired, unknown and
/// mismatched-token lookups are indistinguishable to callers.
#[derive(Debug)]
pub enum SessionError {
    Invalid,
    ContainerNotRunning(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Invalid => write!(f, "Session invalid or expired"),
            SessionError::ContainerNotRunning(status) => {
                write!(f, "Container is not running (status: {})", status)
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug)]
pub enum QueueError {
    AlreadyQueued,
    AlreadyInMatch(i64),
    StorageError(StorageError),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::AlreadyQueued => write!(f, "User already has a queue entry"),
            QueueError::AlreadyInMatch(id) => {
                write!(f, "User is already in an active match ({})", id)
            }
            QueueError::StorageError(e) => write!(f, "Queue storage error: {}", e),
        }
    }
}

impl std::error::Error for QueueError {}

impl From<StorageError> for QueueError {
    fn from(err: StorageError) -> Self {
        QueueError::StorageError(err)
    }
}

#[derive(Debug)]
pub enum MatchError {
    NotFound(i64),
    NoActiveMatch,
    NotParticipant,
    NotCancellable(String),
    WrongState(String),
    InvalidWinner,
    StorageError(StorageError),
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::NotFound(id) => write!(f, "Match {} not found", id),
            MatchError::NoActiveMatch => write!(f, "No active match to operate on"),
            MatchError::NotParticipant => write!(f, "User is not a participant in this match"),
            MatchError::NotCancellable(status) => {
                write!(f, "Match cannot be cancelled in state {}", status)
            }
            MatchError::WrongState(status) => {
                write!(f, "Match state {} does not allow this transition", status)
            }
            MatchError::InvalidWinner => write!(f, "Winner must be one of the match players"),
            MatchError::StorageError(e) => write!(f, "Match storage error: {}", e),
        }
    }
}

impl std::error::Error for MatchError {}

impl From<StorageError> for MatchError {
    fn from(err: StorageError) -> Self {
        MatchError::StorageError(err)
    }
}

#[derive(Debug)]
pub enum ChallengeError {
    SelfChallenge,
    AlreadyPending(i64),
    NotFound(i64),
    NotAddressee,
    AlreadyResponded(String),
    Expired,
    StorageError(StorageError),
}

impl fmt::Display for ChallengeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeError::SelfChallenge => write!(f, "Users cannot challenge themselves"),
            ChallengeError::AlreadyPending(id) => {
                write!(f, "A pending challenge already exists ({})", id)
            }
            ChallengeError::NotFound(id) => write!(f, "Challenge {} not found", id),
            ChallengeError::NotAddressee => write!(f, "Challenge is addressed to another user"),
            ChallengeError::AlreadyResponded(status) => {
                write!(f, "Challenge was already responded to (status: {})", status)
            }
            ChallengeError::Expired => write!(f, "Challenge has expired"),
            ChallengeError::StorageError(e) => write!(f, "Challenge storage error: {}", e),
        }
    }
}

impl std::error::Error for ChallengeError {}

impl From<StorageError> for ChallengeError {
    fn from(err: StorageError) -> Self {
        ChallengeError::StorageError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed(String),
    WriteFailed(String),
    ReadFailed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(e) => write!(f, "Storage connection failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum WebError {
    BadBindAddress(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BadBindAddress(e) => write!(f, "Web server bind address error: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    StorageError(StorageError),
    WebError(WebError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web server error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}
