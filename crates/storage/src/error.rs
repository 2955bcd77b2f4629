//! Storage errors

use growth_escrow::EscrowError;
use growth_ledger::LedgerError;
use growth_pricing::PricingError;
use thiserror::Error;

/// SQLite primary result codes that mean "another writer holds the lock"
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid decimal value in column {field}: {value}")]
    InvalidDecimal { field: &'static str, value: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnumValue { field: &'static str, value: String },

    #[error("Invalid timestamp in column {field}: {value}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Row not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub fn invalid_decimal(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidDecimal {
            field,
            value: value.into(),
        }
    }

    pub fn invalid_enum(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidEnumValue {
            field,
            value: value.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Lost a race for the database write lock; safe to retry
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::PoolTimedOut) => true,
            Self::Database(sqlx::Error::Database(db)) => {
                let code = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                matches!(code, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
                    || db.message().contains("database is locked")
            }
            _ => false,
        }
    }
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        if err.is_busy() {
            LedgerError::Contention(err.to_string())
        } else {
            LedgerError::Storage(err.to_string())
        }
    }
}

impl From<StorageError> for EscrowError {
    fn from(err: StorageError) -> Self {
        EscrowError::Storage(err.to_string())
    }
}

impl From<StorageError> for PricingError {
    fn from(err: StorageError) -> Self {
        PricingError::Counter(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_contention() {
        let err = StorageError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_busy());
        assert!(matches!(LedgerError::from(err), LedgerError::Contention(_)));
    }

    #[test]
    fn test_decode_errors_are_not_retried() {
        let err = StorageError::invalid_decimal("growth_credits", "abc");
        assert!(!err.is_busy());
        assert!(matches!(LedgerError::from(err), LedgerError::Storage(_)));
    }

    #[test]
    fn test_escrow_and_pricing_mapping() {
        let escrow: EscrowError = StorageError::not_found("claim c1").into();
        assert!(matches!(escrow, EscrowError::Storage(_)));

        let pricing: PricingError = StorageError::invalid_enum("mode", "hourly").into();
        assert!(matches!(pricing, PricingError::Counter(_)));
    }
}
