//! Shared validation utilities
//!
//! Validation for export request inputs: filter values, column
//! projections, and CSV dialect characters. Every function returns a
//! typed error whose message is safe to show to the client.

use thiserror::Error;

use crate::export::model::{SubscriptionTier, ALLOWED_COLUMNS};

/// Errors that can occur during country code validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CountryCodeError {
    #[error("country_code must be exactly two letters")]
    Length,

    #[error("country_code must be two uppercase ASCII letters")]
    InvalidFormat,
}

/// Errors that can occur during subscription tier validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TierError {
    #[error("subscription_tier must be one of: free, basic, premium, enterprise")]
    Unknown,
}

/// Errors that can occur during min_ltv validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MinLtvError {
    #[error("min_ltv must be a number")]
    NotANumber,

    #[error("min_ltv must be finite")]
    NotFinite,

    #[error("min_ltv must not be negative")]
    Negative,
}

/// Errors that can occur during column list validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ColumnsError {
    #[error("columns must not be empty")]
    Empty,

    #[error("unknown column: {0}")]
    Unknown(String),

    #[error("duplicate column: {0}")]
    Duplicate(String),
}

/// Validate a country code filter: exactly two uppercase ASCII letters
pub fn validate_country_code(code: &str) -> Result<String, CountryCodeError> {
    if code.len() != 2 {
        return Err(CountryCodeError::Length);
    }
    if !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(CountryCodeError::InvalidFormat);
    }
    Ok(code.to_string())
}

/// Validate a subscription tier filter against the fixed tier set
pub fn validate_tier(tier: &str) -> Result<SubscriptionTier, TierError> {
    tier.parse().map_err(|_| TierError::Unknown)
}

/// Validate a minimum lifetime value filter: non-negative and finite
pub fn validate_min_ltv(raw: &str) -> Result<f64, MinLtvError> {
    let value: f64 = raw.trim().parse().map_err(|_| MinLtvError::NotANumber)?;
    if !value.is_finite() {
        return Err(MinLtvError::NotFinite);
    }
    if value < 0.0 {
        return Err(MinLtvError::Negative);
    }
    Ok(value)
}

/// Validate a comma-separated column projection against the allow-list.
///
/// Order is preserved; duplicates are rejected.
pub fn validate_columns(raw: &str) -> Result<Vec<String>, ColumnsError> {
    let mut columns = Vec::new();
    for part in raw.split(',') {
        let name = part.trim();
        if name.is_empty() {
            return Err(ColumnsError::Empty);
        }
        if !ALLOWED_COLUMNS.iter().any(|(allowed, _)| *allowed == name) {
            return Err(ColumnsError::Unknown(name.to_string()));
        }
        if columns.iter().any(|existing: &String| existing == name) {
            return Err(ColumnsError::Duplicate(name.to_string()));
        }
        columns.push(name.to_string());
    }
    if columns.is_empty() {
        return Err(ColumnsError::Empty);
    }
    Ok(columns)
}
