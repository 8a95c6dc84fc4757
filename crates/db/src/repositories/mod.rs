use std::str::FromStr;

use rust_decimal::Decimal;
use signcfg_core::errors::{DomainError, RemoteError};
use thiserror::Error;

pub mod backend;
pub mod catalog;
pub mod memory;
pub mod price_book;
pub mod pricing;
pub mod quotation;

pub use backend::LocalBackend;
pub use catalog::SqlCatalogRepository;
pub use memory::InMemoryBackend;
pub use price_book::SqlPriceBookRepository;
pub use pricing::SqlPricingRepository;
pub use quotation::SqlQuotationRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{0} was not found")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl RepositoryError {
    fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(error)) => error.is_unique_violation(),
            _ => false,
        }
    }

    /// Converts into the port-level error for the named operation.
    pub fn into_remote(self, operation: &str) -> RemoteError {
        if self.is_unique_violation() {
            return RemoteError::rejected(operation, self.to_string());
        }
        match self {
            Self::Database(error) => RemoteError::transport(operation, error.to_string()),
            Self::Decode(detail) => RemoteError::unexpected(operation, detail),
            Self::NotFound(what) => RemoteError::not_found(what),
            Self::Conflict(message) => RemoteError::rejected(operation, message),
            Self::Invalid(error) => RemoteError::rejected(operation, error.to_string()),
        }
    }
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value.trim())
        .map_err(|error| RepositoryError::Decode(format!("{field} `{value}` is not a decimal: {error}")))
}

pub(crate) fn parse_optional_decimal(
    field: &str,
    value: Option<String>,
) -> Result<Option<Decimal>, RepositoryError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_decimal(field, raw).map(Some),
    }
}
