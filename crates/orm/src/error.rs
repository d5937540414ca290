//! Error types for the model layer
//!
//! Caller mistakes (bad ids, empty datasets, broken configuration) are
//! raised as errors. Validation failures are not errors: writes report them
//! through their return value and `BaseModel::errors`.

use tabula_validation::RuleError;
use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Error types for model operations
#[derive(Debug, Error)]
pub enum ModelError {
    /// Caller passed an argument of the wrong shape (invalid primary keys)
    #[error("{0}")]
    InvalidArgument(String),

    /// The data handed to a write cannot be used
    #[error(transparent)]
    Data(#[from] DataError),

    /// The model or its collaborators are misconfigured
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Database query or statement error
    #[error("Database error: {0}")]
    Database(String),

    /// Connection pool error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ModelError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        ModelError::InvalidArgument(message.into())
    }

    pub fn missing_batch_index(index: &str) -> Self {
        ModelError::InvalidArgument(format!(
            "The index (\"{}\") for updateBatch() is missing in the data.",
            index
        ))
    }
}

/// Problems with the data of a single call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("There is no data to {0}.")]
    EmptyDataset(String),

    #[error("Allowed fields must be specified for model: \"{0}\"")]
    InvalidAllowedFields(String),

    #[error("\"{0}\" is not a valid Model Event callback.")]
    InvalidMethodTriggered(String),

    #[error("Only single column allowed in Column name.")]
    FindColumnHaveMultipleColumns,

    #[error("There is no primary key defined when trying to make {0}.")]
    EmptyPrimaryKey(String),

    #[error("Cannot cast field \"{field}\" as {cast}: {reason}")]
    Cast {
        field: String,
        cast: String,
        reason: String,
    },
}

impl DataError {
    pub fn empty_dataset(operation: impl Into<String>) -> Self {
        DataError::EmptyDataset(operation.into())
    }

    pub fn cast(field: impl Into<String>, cast: impl Into<String>, reason: impl Into<String>) -> Self {
        DataError::Cast {
            field: field.into(),
            cast: cast.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("`{0}` model does not specify a Primary Key.")]
    NoPrimaryKey(String),

    #[error("`{0}` is not a valid dateFormat; expected datetime, date or int.")]
    NoDateFormat(String),

    #[error("\"{0}\" is not a valid cast type.")]
    UnknownCast(String),

    #[error(transparent)]
    Validation(#[from] RuleError),

    #[error("Missing required field: {field}. {hint}")]
    MissingRequired { field: String, hint: String },

    #[error("Invalid value for field '{field}': '{value}'. Expected: {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Parsing error: {message}")]
    Parsing { message: String },
}

impl ConfigError {
    /// Create a missing required field error
    pub fn missing_required(field: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingRequired {
            field: field.into(),
            hint: hint.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn parsing(message: impl Into<String>) -> Self {
        Self::Parsing {
            message: message.into(),
        }
    }
}

impl From<RuleError> for ModelError {
    fn from(err: RuleError) -> Self {
        ModelError::Config(ConfigError::Validation(err))
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ModelError::Connection(err.to_string())
            }
            other => ModelError::Database(other.to_string()),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_error_messages() {
        assert_eq!(
            DataError::empty_dataset("insert").to_string(),
            "There is no data to insert."
        );
        assert_eq!(
            DataError::InvalidMethodTriggered("doSomething".into()).to_string(),
            "\"doSomething\" is not a valid Model Event callback."
        );
    }

    #[test]
    fn test_nested_errors_are_transparent() {
        let err: ModelError = DataError::FindColumnHaveMultipleColumns.into();
        assert_eq!(err.to_string(), "Only single column allowed in Column name.");

        let err: ModelError = RuleError::UnknownGroup("signup".into()).into();
        assert!(matches!(err, ModelError::Config(ConfigError::Validation(_))));
        assert_eq!(err.to_string(), "\"signup\" is not a validation rule group.");
    }

    #[test]
    fn test_sqlx_pool_errors_are_connection_errors() {
        let err: ModelError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ModelError::Connection(_)));

        let err: ModelError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ModelError::Database(_)));
    }
}
