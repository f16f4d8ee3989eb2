use super::models::{EntityKind, ProductId};
use super::validation::ValidationError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("No {entity} with id {id}")]
    NotFound { entity: EntityKind, id: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Coarse error category, for callers that only render the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InsufficientStock,
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CatalogError {
    pub fn not_found(entity: EntityKind, id: i64) -> Self {
        CatalogError::NotFound { entity, id }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CatalogError::Validation(_) => ErrorKind::Validation,
            CatalogError::NotFound { .. } => ErrorKind::NotFound,
            CatalogError::Conflict(_) => ErrorKind::Conflict,
            CatalogError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CatalogError::Storage(_) => ErrorKind::Storage,
        }
    }
}
