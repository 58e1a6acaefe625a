use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    LevelsEmpty(String),
    BadPenalty(String),
    BadPortRange(String),
    DirectoryDoesNotExist(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::LevelsEmpty(e) => write!(f, "Level configuration error: {}", e),
            ConfigError::BadPenalty(e) => write!(f, "Hint penalty error: {}", e),
            ConfigError::BadPortRange(e) => write!(f, "Port range error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures surfaced by the container runtime adapter.
///
/// The adapter never retries on its own; every variant carries enough
/// identifying context (container name or id) for the caller to retry the
/// specific operation if it wants to.
#[derive(Debug)]
pub enum RuntimeError {
    EngineUnreachable(String),
    CreationFailed(String),
    StartFailed(String),
    StopFailed(String),
    RemoveFailed(String),
    InspectFailed(String),
    ImageBuildFailed(String),
    PortNotAssigned(String),
    ServiceNotReady(String),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::EngineUnreachable(e) => write!(f, "Container engine unreachable: {}", e),
            RuntimeError::CreationFailed(e) => write!(f, "Container creation failed: {}", e),
            RuntimeError::StartFailed(e) => write!(f, "Container start failed: {}", e),
            RuntimeError::StopFailed(e) => write!(f, "Container stop failed: {}", e),
            RuntimeError::RemoveFailed(e) => write!(f, "Container removal failed: {}", e),
            RuntimeError::InspectFailed(e) => write!(f, "Container inspect failed: {}", e),
            RuntimeError::ImageBuildFailed(e) => write!(f, "Image build failed: {}", e),
            RuntimeError::PortNotAssigned(e) => {
                write!(f, "No host port assigned for container: {}", e)
            }
            RuntimeError::ServiceNotReady(e) => {
                write!(f, "Container service did not become ready: {}", e)
            }
        }
    }
}

impl std::error::Error for RuntimeError {}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed(String),
    WriteFailed(String),
    ReadFailed(String),
    NotFound(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(e) => write!(f, "Storage connection failed: {}", e),
            StorageError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageError::NotFound(e) => write!(f, "Record not found: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound(err.to_string()),
            _ => StorageError::ReadFailed(err.to_string()),
        }
    }
}

#[derive(Debug)]
pub enum SessionError {
    /// Bad input from the caller. Always user-facing, never retried.
    Validation(String),
    /// The bounded join-code sampling loop found no free code.
    CodeSpaceExhausted,
    InvalidTransition { from: String, to: String },
    NotFound(String),
    StorageError(StorageError),
    RuntimeError(RuntimeError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Validation(e) => write!(f, "Validation error: {}", e),
            SessionError::CodeSpaceExhausted => {
                write!(f, "Failed to generate a unique session code")
            }
            SessionError::InvalidTransition { from, to } => {
                write!(f, "Illegal session status transition: {} -> {}", from, to)
            }
            SessionError::NotFound(e) => write!(f, "Session not found: {}", e),
            SessionError::StorageError(e) => write!(f, "Storage error: {}", e),
            SessionError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::StorageError(err)
    }
}

impl From<RuntimeError> for SessionError {
    fn from(err: RuntimeError) -> Self {
        SessionError::RuntimeError(err)
    }
}

#[derive(Debug)]
pub enum JoinError {
    SessionNotFound(String),
    /// Session or team at capacity. Terminal for this join attempt.
    SessionFull,
    DuplicateName(String),
    BadNameLength(usize),
    /// Provisioning a fresh container for the joining player failed.
    Provisioning(SessionError),
    StorageError(StorageError),
    RuntimeError(RuntimeError),
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::SessionNotFound(code) => {
                write!(f, "No joinable session with code {}", code)
            }
            JoinError::SessionFull => write!(f, "Session is full"),
            JoinError::DuplicateName(name) => {
                write!(f, "Display name already taken in this session: {}", name)
            }
            JoinError::BadNameLength(len) => {
                write!(f, "Display name must be 2-20 characters, got {}", len)
            }
            JoinError::Provisioning(e) => write!(f, "Container provisioning failed: {}", e),
            JoinError::StorageError(e) => write!(f, "Storage error: {}", e),
            JoinError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for JoinError {}

impl From<StorageError> for JoinError {
    fn from(err: StorageError) -> Self {
        JoinError::StorageError(err)
    }
}

impl From<RuntimeError> for JoinError {
    fn from(err: RuntimeError) -> Self {
        JoinError::RuntimeError(err)
    }
}

impl From<SessionError> for JoinError {
    fn from(err: SessionError) -> Self {
        JoinError::Provisioning(err)
    }
}

impl JoinError {
    /// Capacity and input failures are user-facing; the rest are server-side.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            JoinError::SessionNotFound(_)
                | JoinError::SessionFull
                | JoinError::DuplicateName(_)
                | JoinError::BadNameLength(_)
        )
    }
}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Failed to bind web server: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    Storage(StorageError),
    Web(WebError),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::Storage(e) => write!(f, "Storage error: {}", e),
            ControllerError::Web(e) => write!(f, "Web error: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::Storage(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::Web(err)
    }
}

#[derive(Debug)]
pub enum EventError {
    ContainerNotFound(String),
    UnknownSource(String),
    StorageError(StorageError),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::ContainerNotFound(id) => {
                write!(f, "No container for event attribution: {}", id)
            }
            EventError::UnknownSource(e) => {
                write!(f, "Event source could not be attributed: {}", e)
            }
            EventError::StorageError(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for EventError {}

impl From<StorageError> for EventError {
    fn from(err: StorageError) -> Self {
        EventError::StorageError(err)
    }
}
