//! Validation for catalog entities.
//!
//! Drafts are checked before any statement is issued, so a rejected draft
//! never reaches the database.

use super::models::{CustomerDraft, ProductDraft};
use std::fmt;

/// Validation error types
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField { field: &'static str },
    NegativeValue { field: &'static str, value: i64 },
    NonPositiveValue { field: &'static str, value: i64 },
    InvalidAmount { field: &'static str, value: f64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField { field } => {
                write!(f, "Field '{}' is required but was empty", field)
            }
            ValidationError::NegativeValue { field, value } => {
                write!(f, "Field '{}' must be non-negative, got {}", field, value)
            }
            ValidationError::NonPositiveValue { field, value } => {
                write!(f, "Field '{}' must be positive, got {}", field, value)
            }
            ValidationError::InvalidAmount { field, value } => {
                write!(
                    f,
                    "Field '{}' must be a non-negative amount, got {}",
                    field, value
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn validate_product(product: &ProductDraft) -> ValidationResult<()> {
    if product.name.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "name" });
    }
    if !product.price.is_finite() || product.price < 0.0 {
        return Err(ValidationError::InvalidAmount {
            field: "price",
            value: product.price,
        });
    }
    if product.stock < 0 {
        return Err(ValidationError::NegativeValue {
            field: "stock",
            value: product.stock,
        });
    }
    Ok(())
}

pub fn validate_customer(customer: &CustomerDraft) -> ValidationResult<()> {
    if customer.name.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "name" });
    }
    if customer.email.trim().is_empty() {
        return Err(ValidationError::EmptyField { field: "email" });
    }
    Ok(())
}

pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 {
        return Err(ValidationError::NonPositiveValue {
            field: "quantity",
            value: quantity,
        });
    }
    Ok(())
}

/// Trims optional text, mapping blank input to `None`.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_product_valid() {
        let product = ProductDraft::new("Widget", 9.99, 5);
        assert!(validate_product(&product).is_ok());
    }

    #[test]
    fn test_validate_product_zero_price_and_stock_are_valid() {
        let product = ProductDraft::new("Freebie", 0.0, 0);
        assert!(validate_product(&product).is_ok());
    }

    #[test]
    fn test_validate_product_blank_name() {
        let product = ProductDraft::new("   ", 1.0, 1);
        let err = validate_product(&product).unwrap_err();
        assert_eq!(err, ValidationError::EmptyField { field: "name" });
    }

    #[test]
    fn test_validate_product_negative_price() {
        let product = ProductDraft::new("Widget", -0.01, 1);
        let err = validate_product(&product).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidAmount { field: "price", .. }
        ));
    }

    #[test]
    fn test_validate_product_nan_price() {
        let product = ProductDraft::new("Widget", f64::NAN, 1);
        assert!(validate_product(&product).is_err());
    }

    #[test]
    fn test_validate_product_negative_stock() {
        let product = ProductDraft::new("Widget", 1.0, -3);
        let err = validate_product(&product).unwrap_err();
        assert_eq!(
            err,
            ValidationError::NegativeValue {
                field: "stock",
                value: -3
            }
        );
        assert_eq!(err.to_string(), "Field 'stock' must be non-negative, got -3");
    }

    #[test]
    fn test_validate_customer_empty_email() {
        let customer = CustomerDraft::new("Ada", " ");
        let err = validate_customer(&customer).unwrap_err();
        assert_eq!(err, ValidationError::EmptyField { field: "email" });
    }

    #[test]
    fn test_validate_customer_empty_name() {
        let customer = CustomerDraft::new("", "ada@example.com");
        let err = validate_customer(&customer).unwrap_err();
        assert_eq!(err, ValidationError::EmptyField { field: "name" });
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(matches!(
            validate_quantity(0),
            Err(ValidationError::NonPositiveValue {
                field: "quantity",
                value: 0
            })
        ));
        assert!(validate_quantity(-2).is_err());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  Rome ")), Some("Rome"));
        assert_eq!(non_blank(Some("   ")), None);
        assert_eq!(non_blank(None), None);
    }
}
