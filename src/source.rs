//! Source and provenance types.
//!
//! Every fact carries provenance. Knowing where a value came from is
//! what makes supersession auditable and conflict resolution possible.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an asserted value originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Typed in by a user.
    UserInput,
    /// Extracted from a source document.
    DocumentExtract,
    /// Pulled from a market-data provider.
    MarketData,
    /// Computed by the platform.
    Calculation,
    /// Inferred by a model.
    AiInference,
    /// A user explicitly corrected a prior value.
    UserCorrection,
    /// Bulk import.
    Import,
}

impl SourceType {
    /// User corrections carry intent regardless of value equality, so
    /// they bypass the identical-value no-op check.
    #[must_use]
    pub const fn always_creates(&self) -> bool {
        matches!(self, Self::UserCorrection)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserInput => write!(f, "user_input"),
            Self::DocumentExtract => write!(f, "document_extract"),
            Self::MarketData => write!(f, "market_data"),
            Self::Calculation => write!(f, "calculation"),
            Self::AiInference => write!(f, "ai_inference"),
            Self::UserCorrection => write!(f, "user_correction"),
            Self::Import => write!(f, "import"),
        }
    }
}

/// Provenance attached to a fact: the source type, an optional reference
/// to the originating record, the acting user, and an optional note.
///
/// # Examples
///
/// ```
/// use terrafact::Provenance;
///
/// let prov = Provenance::document("doc-17");
/// assert_eq!(prov.source_id.as_deref(), Some("doc-17"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// The kind of producer.
    pub source_type: SourceType,

    /// Reference to the originating record (e.g. a document id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    /// The user behind the write, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Free-text note (e.g. a correction reason).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Provenance {
    /// Provenance for a document extraction.
    #[must_use]
    pub fn document(doc_id: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::DocumentExtract,
            source_id: Some(doc_id.into()),
            created_by: None,
            note: None,
        }
    }

    /// Provenance for direct user input.
    #[must_use]
    pub fn user_input(user_id: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::UserInput,
            source_id: None,
            created_by: Some(user_id.into()),
            note: None,
        }
    }

    /// Provenance for a user correction, with an optional reason.
    #[must_use]
    pub fn correction(user_id: Option<String>, reason: Option<String>) -> Self {
        Self {
            source_type: SourceType::UserCorrection,
            source_id: None,
            created_by: user_id,
            note: reason,
        }
    }

    /// Provenance for a platform calculation.
    #[must_use]
    pub fn calculation(calc_id: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::Calculation,
            source_id: Some(calc_id.into()),
            created_by: None,
            note: None,
        }
    }

    /// Provenance for a market-data pull.
    #[must_use]
    pub fn market_data(provider: impl Into<String>) -> Self {
        Self {
            source_type: SourceType::MarketData,
            source_id: Some(provider.into()),
            created_by: None,
            note: None,
        }
    }

    /// Sets the acting user, returning self for chaining.
    #[must_use]
    pub fn with_created_by(mut self, user_id: impl Into<String>) -> Self {
        self.created_by = Some(user_id.into());
        self
    }
}

impl Default for Provenance {
    fn default() -> Self {
        Self {
            source_type: SourceType::UserInput,
            source_id: None,
            created_by: None,
            note: None,
        }
    }
}
