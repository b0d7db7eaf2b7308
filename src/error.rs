//! Error types for terrafact.
//!
//! All errors are strongly typed using thiserror, layered by concern:
//! validation problems with caller input, registry configuration problems,
//! and storage failures. The top-level [`Error`] wraps all of them.

use chrono::NaiveDate;
use thiserror::Error;

use crate::storage::StorageError;

/// Validation errors that occur while checking caller input.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Entity canonical name was empty or whitespace.
    #[error("Canonical name cannot be empty")]
    EmptyCanonicalName,

    /// Fact predicate was empty or whitespace.
    #[error("Predicate cannot be empty")]
    EmptyPredicate,

    /// Confidence outside `[0.0, 1.0]` or not finite.
    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        /// The rejected value.
        value: f64,
    },

    /// Validity window bounds were reversed.
    #[error("Invalid validity window: from ({from}) must not be after to ({to})")]
    InvalidValidityWindow {
        /// Start of the rejected window.
        from: NaiveDate,
        /// End of the rejected window.
        to: NaiveDate,
    },

    /// A builder was finished without a required field.
    #[error("Required field '{field}' is missing")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// A correction targeted a fact outside the assumption namespace.
    #[error("Fact predicate '{predicate}' is not an assumption fact")]
    NotAnAssumptionFact {
        /// The offending predicate.
        predicate: String,
    },

    /// Conflict resolution was called with nothing to resolve.
    #[error("Conflict resolution requires at least one candidate")]
    NoCandidates,
}

/// Configuration errors raised by the field registry.
///
/// Per-row parse failures are logged and skipped during catalog load;
/// these errors surface only for problems that make a catalog unusable
/// (a broken header) or for enum cells that cannot be interpreted.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The catalog header lacks a required column.
    #[error("Catalog header is missing required column '{column}'")]
    MissingColumn {
        /// The missing column name.
        column: String,
    },

    /// A cell held a value outside its closed enum.
    #[error("Unrecognized value '{value}' in column '{column}'")]
    UnknownValue {
        /// The column being parsed.
        column: String,
        /// The unrecognized cell content.
        value: String,
    },

    /// Every row of the catalog failed to parse, or none existed.
    #[error("Catalog for '{property_type}' has no usable rows")]
    EmptyCatalog {
        /// The property type being loaded.
        property_type: String,
    },

    /// The runtime field overlay could not be fetched.
    #[error("Dynamic field source failed: {reason}")]
    DynamicSource {
        /// What went wrong, for the log line.
        reason: String,
    },

    /// The catalog file could not be read.
    #[error("Failed to read catalog: {0}")]
    Io(String),
}

/// Top-level error type for terrafact operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller input failed validation.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Registry configuration problem.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl Error {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a registry configuration error.
    #[must_use]
    pub const fn is_registry(&self) -> bool {
        matches!(self, Self::Registry(_))
    }

    /// Returns true if this is a storage error.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for terrafact operations.
pub type Result<T> = std::result::Result<T, Error>;
