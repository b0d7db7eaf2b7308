//! Fact types: the atomic unit of knowledge in terrafact.
//!
//! A fact is a timestamped, sourced assertion `(subject, predicate,
//! object)` where the object is either a literal value or another
//! entity. Facts are never edited in place: a replacement supersedes
//! the prior fact, preserving full history.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::confidence::Confidence;
use crate::entity::EntityId;
use crate::error::ValidationError;
use crate::source::Provenance;
use crate::validity::ValidityWindow;

/// Unique identifier for a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(Uuid);

impl FactId {
    /// Creates a new random fact ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FactId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The predicate namespace used for assumption facts.
pub const ASSUMPTION_PREDICATE_PREFIX: &str = "has_assumption:";

/// Builds the predicate for an assumption key
/// (`cap_rate` -> `has_assumption:cap_rate`).
#[must_use]
pub fn assumption_predicate(assumption_key: &str) -> String {
    format!("{ASSUMPTION_PREDICATE_PREFIX}{}", assumption_key.trim())
}

/// Recovers the assumption key from a predicate, if it is one.
#[must_use]
pub fn assumption_key_from_predicate(predicate: &str) -> Option<&str> {
    predicate.strip_prefix(ASSUMPTION_PREDICATE_PREFIX)
}

/// The object of a fact: a literal value or a reference to another
/// entity. The enum makes the XOR invariant unrepresentable to violate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FactObject {
    /// A literal value, stored in normalized string form.
    Literal(String),
    /// A reference to another entity.
    Entity(EntityId),
}

impl FactObject {
    /// The literal value, when this is a [`FactObject::Literal`].
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(s) => Some(s),
            Self::Entity(_) => None,
        }
    }

    /// The referenced entity, when this is a [`FactObject::Entity`].
    pub const fn as_entity(&self) -> Option<EntityId> {
        match self {
            Self::Entity(id) => Some(*id),
            Self::Literal(_) => None,
        }
    }
}

impl fmt::Display for FactObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "{s:?}"),
            Self::Entity(id) => write!(f, "entity:{id}"),
        }
    }
}

/// A timestamped, sourced assertion about an entity.
///
/// # Examples
///
/// ```
/// use terrafact::{assumption_predicate, Confidence, EntityId, Fact, Provenance};
///
/// let fact = Fact::builder()
///     .subject(EntityId::from_canonical_name("project:42"))
///     .predicate(assumption_predicate("cap_rate"))
///     .literal("0.055")
///     .provenance(Provenance::document("doc-17"))
///     .confidence(Confidence::new(0.9).unwrap())
///     .build()
///     .unwrap();
///
/// assert!(fact.is_current);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    /// Unique identifier.
    pub id: FactId,
    /// The entity the assertion is about.
    pub subject: EntityId,
    /// What is being asserted.
    pub predicate: String,
    /// The asserted value or entity reference.
    pub object: FactObject,

    /// When the fact holds in the world.
    #[serde(default)]
    pub validity: ValidityWindow,

    /// Where the fact came from.
    pub provenance: Provenance,
    /// How much the asserting system trusts it.
    pub confidence: Confidence,

    /// Exactly one fact per (subject, predicate[, object entity]) key is
    /// current at any time. Only the fact store flips this.
    pub is_current: bool,

    /// The fact this one replaced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<FactId>,

    /// The fact that replaced this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<FactId>,

    /// When the fact was recorded.
    pub created_at: DateTime<Utc>,
}

impl Fact {
    /// Starts building a fact.
    pub fn builder() -> FactBuilder {
        FactBuilder::default()
    }

    /// Whether the fact is current and its validity window contains `date`.
    #[must_use]
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.is_current && self.validity.is_valid_on(date)
    }

    /// Whether a later fact has replaced this one.
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    /// The assumption key, when this is an assumption fact.
    #[must_use]
    pub fn assumption_key(&self) -> Option<&str> {
        assumption_key_from_predicate(&self.predicate)
    }
}

impl PartialEq for Fact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Fact {}

impl std::hash::Hash for Fact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Builder for creating facts. Ensures required fields are set and the
/// predicate is non-empty before building.
#[derive(Debug, Default)]
pub struct FactBuilder {
    id: Option<FactId>,
    subject: Option<EntityId>,
    predicate: Option<String>,
    object: Option<FactObject>,
    validity: Option<ValidityWindow>,
    provenance: Option<Provenance>,
    confidence: Option<Confidence>,
}

impl FactBuilder {
    /// Sets the fact ID (generated if not set).
    #[must_use]
    pub fn id(mut self, id: FactId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the subject entity.
    #[must_use]
    pub fn subject(mut self, subject: EntityId) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the predicate.
    #[must_use]
    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Sets a literal object.
    #[must_use]
    pub fn literal(mut self, value: impl Into<String>) -> Self {
        self.object = Some(FactObject::Literal(value.into()));
        self
    }

    /// Sets an entity object.
    #[must_use]
    pub fn object_entity(mut self, entity: EntityId) -> Self {
        self.object = Some(FactObject::Entity(entity));
        self
    }

    /// Sets the validity window.
    #[must_use]
    pub fn validity(mut self, validity: ValidityWindow) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Sets the provenance.
    #[must_use]
    pub fn provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = Some(provenance);
        self
    }

    /// Sets the confidence.
    #[must_use]
    pub fn confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Builds the fact.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if a required field is missing or the
    /// predicate is empty.
    pub fn build(self) -> Result<Fact, ValidationError> {
        let subject = self.subject.ok_or(ValidationError::MissingField {
            field: "subject".to_string(),
        })?;

        let predicate = self.predicate.ok_or(ValidationError::MissingField {
            field: "predicate".to_string(),
        })?;
        if predicate.trim().is_empty() {
            return Err(ValidationError::EmptyPredicate);
        }

        let object = self.object.ok_or(ValidationError::MissingField {
            field: "object".to_string(),
        })?;

        Ok(Fact {
            id: self.id.unwrap_or_default(),
            subject,
            predicate,
            object,
            validity: self.validity.unwrap_or_default(),
            provenance: self.provenance.unwrap_or_default(),
            confidence: self.confidence.unwrap_or_default(),
            is_current: true,
            supersedes: None,
            superseded_by: None,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_fact() -> Fact {
        Fact::builder()
            .subject(EntityId::from_canonical_name("project:1"))
            .predicate(assumption_predicate("cap_rate"))
            .literal("0.055")
            .confidence(Confidence::new(0.9).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_assumption_predicate_round_trip() {
        let pred = assumption_predicate("cap_rate");
        assert_eq!(pred, "has_assumption:cap_rate");
        assert_eq!(assumption_key_from_predicate(&pred), Some("cap_rate"));
        assert_eq!(assumption_key_from_predicate("located_in"), None);
    }

    #[test]
    fn test_fact_builder_success() {
        let fact = make_fact();
        assert!(fact.is_current);
        assert!(fact.supersedes.is_none());
        assert_eq!(fact.object.as_literal(), Some("0.055"));
        assert_eq!(fact.assumption_key(), Some("cap_rate"));
    }

    #[test]
    fn test_fact_builder_missing_subject() {
        let result = Fact::builder()
            .predicate("located_in")
            .literal("austin")
            .build();
        assert!(matches!(
            result,
            Err(ValidationError::MissingField { ref field }) if field == "subject"
        ));
    }

    #[test]
    fn test_fact_builder_empty_predicate() {
        let result = Fact::builder()
            .subject(EntityId::from_canonical_name("project:1"))
            .predicate("  ")
            .literal("x")
            .build();
        assert!(matches!(result, Err(ValidationError::EmptyPredicate)));
    }

    #[test]
    fn test_fact_builder_missing_object() {
        let result = Fact::builder()
            .subject(EntityId::from_canonical_name("project:1"))
            .predicate("located_in")
            .build();
        assert!(matches!(
            result,
            Err(ValidationError::MissingField { ref field }) if field == "object"
        ));
    }

    #[test]
    fn test_fact_object_xor() {
        let literal = FactObject::Literal("0.055".into());
        assert!(literal.as_literal().is_some());
        assert!(literal.as_entity().is_none());

        let entity = FactObject::Entity(EntityId::from_canonical_name("market:austin:tx"));
        assert!(entity.as_entity().is_some());
        assert!(entity.as_literal().is_none());
    }

    #[test]
    fn test_fact_is_valid_on() {
        let mut fact = make_fact();
        let date = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        assert!(fact.is_valid_on(date));

        fact.is_current = false;
        assert!(!fact.is_valid_on(date));
    }

    #[test]
    fn test_fact_equality_by_id() {
        let a = make_fact();
        let mut b = make_fact();
        b.id = a.id;
        assert_eq!(a, b);
    }

    #[test]
    fn test_fact_serialization() {
        let fact = make_fact();
        let json = serde_json::to_string(&fact).unwrap();
        let back: Fact = serde_json::from_str(&json).unwrap();
        assert_eq!(fact.id, back.id);
        assert_eq!(fact.predicate, back.predicate);
    }
}
