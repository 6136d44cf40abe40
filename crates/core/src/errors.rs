use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("{kind} `{id}` was not found")]
    NotFound { kind: &'static str, id: String },
    #[error("upstream fetch for `{key}` failed: {message}")]
    UpstreamFetchFailed { key: String, message: String },
    #[error("item `{item_id}` remained locked after {attempts} attempts")]
    TransientLockContention { item_id: String, attempts: u32 },
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl EngineError {
    pub fn item_not_found(id: impl Into<String>) -> Self {
        Self::NotFound { kind: "item", id: id.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl EngineError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<EngineError> for InterfaceError {
    fn from(value: EngineError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            EngineError::NotFound { .. } => {
                Self::NotFound { message: value.to_string(), correlation_id }
            }
            EngineError::MalformedInput(message) => Self::BadRequest { message, correlation_id },
            EngineError::UpstreamFetchFailed { .. }
            | EngineError::TransientLockContention { .. }
            | EngineError::Persistence(_) => {
                Self::ServiceUnavailable { message: value.to_string(), correlation_id }
            }
            EngineError::ConfigurationMissing(message) => Self::Internal { message, correlation_id },
        }
    }
}
