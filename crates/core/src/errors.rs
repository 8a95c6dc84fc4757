use thiserror::Error;

use crate::workflow::WorkflowTransitionError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("choose a template before configuring a variant")]
    MissingTemplate,
    #[error("template `{0}` is not variant-capable")]
    NotVariantCapable(String),
    #[error("missing required fields: {}", .missing.join(", "))]
    IncompleteSelection { missing: Vec<String> },
    #[error("attribute `{0}` is not configurable on this template")]
    UnknownAttribute(String),
    #[error("attribute `{0}` is listed more than once on the template")]
    DuplicateAttribute(String),
    #[error("value `{value}` is not permitted for attribute `{attribute}`")]
    ValueNotPermitted { attribute: String, value: String },
    #[error("attribute `{attribute}` expects a number, got `{value}`")]
    NotNumeric { attribute: String, value: String },
    #[error("{0} is out of range")]
    OutOfRange(String),
    #[error(transparent)]
    WorkflowTransition(#[from] WorkflowTransitionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failure reported by a port implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("transport failure calling `{operation}`: {message}")]
    Transport { operation: String, message: String },
    #[error("`{operation}` was rejected: {message}")]
    Rejected { operation: String, message: String },
    #[error("`{operation}` returned an unexpected response: {detail}")]
    UnexpectedShape { operation: String, detail: String },
    #[error("{what} was not found")]
    NotFound { what: String },
}

impl RemoteError {
    pub fn transport(operation: &str, message: impl Into<String>) -> Self {
        Self::Transport { operation: operation.to_owned(), message: message.into() }
    }

    pub fn rejected(operation: &str, message: impl Into<String>) -> Self {
        Self::Rejected { operation: operation.to_owned(), message: message.into() }
    }

    pub fn unexpected(operation: &str, detail: impl Into<String>) -> Self {
        Self::UnexpectedShape { operation: operation.to_owned(), detail: detail.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("missing data: {0}")]
    MissingData(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Coarse grouping used to pick how a failure is presented.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    Validation,
    Remote,
    MissingData,
}

impl ApplicationError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Domain(_) => FailureClass::Validation,
            Self::MissingData(_) => FailureClass::MissingData,
            Self::Remote(_) | Self::Persistence(_) | Self::Configuration(_) => {
                FailureClass::Remote
            }
        }
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Incomplete { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("incomplete: {message}")]
    Incomplete { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "Some values are missing or invalid. Check the form and try again.",
            Self::Incomplete { .. } => "No price could be determined for this configuration.",
            Self::ServiceUnavailable { .. } => {
                "The business system could not complete the request. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Incomplete { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let message = value.to_string();
        match value {
            ApplicationError::Domain(_) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::MissingData(_) => {
                Self::Incomplete { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Remote(_) | ApplicationError::Persistence(_) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(_) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
