//! The knowledge-graph service.
//!
//! [`KnowledgeGraph`] composes an entity store and a fact store into the
//! system of record: idempotent entity get-or-create, fact creation with
//! supersession, history queries, and user corrections. This is the only
//! layer that encodes the supersession rules; backends just persist.

use std::sync::Arc;

use tracing::debug;

use crate::confidence::Confidence;
use crate::entity::{Entity, EntityId, EntityType};
use crate::error::{Error, Result, ValidationError};
use crate::fact::{assumption_predicate, Fact, FactObject};
use crate::source::Provenance;
use crate::storage::{EntityStore, FactStore, StorageError};
use crate::validity::ValidityWindow;

/// Parameters for [`KnowledgeGraph::get_or_create_entity`].
#[derive(Debug, Clone)]
pub struct EntitySpec {
    /// The kind of entity being resolved.
    pub entity_type: EntityType,
    /// Deterministic identity key, e.g. `project:42`.
    pub canonical_name: String,
    /// Optional refinement such as `build_to_rent`.
    pub subtype: Option<String>,
    /// Flexible attributes, shallow-merged on repeat calls.
    pub metadata: serde_json::Value,
    /// Who initiated the creation.
    pub created_by: Option<String>,
}

impl EntitySpec {
    /// A minimal spec with just a type and canonical name.
    #[must_use]
    pub fn new(entity_type: EntityType, canonical_name: impl Into<String>) -> Self {
        Self {
            entity_type,
            canonical_name: canonical_name.into(),
            subtype: None,
            metadata: serde_json::Value::Null,
            created_by: None,
        }
    }

    /// Sets the subtype, returning self for chaining.
    #[must_use]
    pub fn subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Sets the metadata, returning self for chaining.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the creator, returning self for chaining.
    #[must_use]
    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }
}

/// The versioned, provenance-tagged system of record.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use terrafact::{canonical, EntitySpec, EntityType, KnowledgeGraph};
/// use terrafact::{InMemoryEntityStore, InMemoryFactStore};
///
/// let graph = KnowledgeGraph::new(
///     Arc::new(InMemoryEntityStore::new()),
///     Arc::new(InMemoryFactStore::new()),
/// );
///
/// let spec = EntitySpec::new(EntityType::Project, canonical::project(42));
/// let a = graph.get_or_create_entity(spec.clone()).unwrap();
/// let b = graph.get_or_create_entity(spec).unwrap();
/// assert_eq!(a.id, b.id);
/// ```
pub struct KnowledgeGraph {
    entities: Arc<dyn EntityStore>,
    facts: Arc<dyn FactStore>,
}

impl KnowledgeGraph {
    /// Creates a graph over the given backends.
    pub fn new(entities: Arc<dyn EntityStore>, facts: Arc<dyn FactStore>) -> Self {
        Self { entities, facts }
    }

    // ---- entities ----

    /// Looks up the entity by canonical name, creating it if absent.
    ///
    /// When the entity exists, incoming metadata is shallow-overlaid and
    /// the subtype is updated only if the incoming value is non-null and
    /// differs; nothing is persisted when no change occurred. A losing
    /// race against a concurrent identical insert degrades to a lookup,
    /// never to a duplicate-key error.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty canonical name, or a
    /// storage error from the backend.
    pub fn get_or_create_entity(&self, spec: EntitySpec) -> Result<Entity> {
        if spec.canonical_name.trim().is_empty() {
            return Err(ValidationError::EmptyCanonicalName.into());
        }

        match self.entities.get_by_name(&spec.canonical_name)? {
            Some(existing) => self.merge_into_existing(existing, &spec),
            None => {
                let mut entity =
                    Entity::new(spec.canonical_name.clone(), spec.entity_type.clone())
                        .with_metadata(spec.metadata.clone());
                entity.entity_subtype = spec.subtype.clone();
                entity.created_by = spec.created_by.clone();

                match self.entities.insert(entity.clone()) {
                    Ok(()) => Ok(entity),
                    // Lost the race to a concurrent identical call:
                    // retry as lookup-and-merge.
                    Err(StorageError::DuplicateKey(_)) => {
                        debug!(canonical_name = %spec.canonical_name, "entity insert raced; retrying as lookup");
                        let existing = self
                            .entities
                            .get_by_name(&spec.canonical_name)?
                            .ok_or_else(|| {
                                Error::Storage(StorageError::BackendError(
                                    "duplicate key reported but entity not found".to_string(),
                                ))
                            })?;
                        self.merge_into_existing(existing, &spec)
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn merge_into_existing(&self, mut existing: Entity, spec: &EntitySpec) -> Result<Entity> {
        let mut changed = existing.merge_metadata(&spec.metadata);

        if let Some(subtype) = &spec.subtype {
            if existing.entity_subtype.as_deref() != Some(subtype.as_str()) {
                existing.entity_subtype = Some(subtype.clone());
                changed = true;
            }
        }

        if changed {
            existing.touch();
            self.entities.update(existing.clone())?;
        }
        Ok(existing)
    }

    /// Pure lookup by canonical name, no side effects.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the backend.
    pub fn get_entity(&self, canonical_name: &str) -> Result<Option<Entity>> {
        Ok(self.entities.get_by_name(canonical_name)?)
    }

    // ---- facts ----

    /// Records an assumption value for an entity.
    ///
    /// The predicate is `has_assumption:{assumption_key}` and the value is
    /// stored as a normalized literal. If the current fact already holds
    /// an identical literal this is a no-op returning `Ok(None)`, unless
    /// the source is a user correction, which always creates and
    /// supersedes. A differing value supersedes the prior current fact
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns validation errors for an empty key, or storage errors.
    pub fn create_assumption_fact(
        &self,
        subject: EntityId,
        assumption_key: &str,
        value: &str,
        provenance: Provenance,
        confidence: Confidence,
        validity: ValidityWindow,
    ) -> Result<Option<Fact>> {
        if assumption_key.trim().is_empty() {
            return Err(ValidationError::EmptyPredicate.into());
        }

        let predicate = assumption_predicate(assumption_key);
        let normalized = value.trim().to_string();
        let current = self.current_fact(subject, &predicate)?;

        if let Some(current) = &current {
            let same_value = current.object.as_literal() == Some(normalized.as_str());
            if same_value && !provenance.source_type.always_creates() {
                debug!(%subject, predicate, "identical assumption value; skipping");
                return Ok(None);
            }
        }

        let fact = Fact::builder()
            .subject(subject)
            .predicate(predicate)
            .literal(normalized)
            .provenance(provenance)
            .confidence(confidence)
            .validity(validity)
            .build()?;

        match current {
            Some(old) => self.facts.insert_superseding(fact.clone(), old.id)?,
            None => self.facts.insert(fact.clone())?,
        }
        Ok(Some(fact))
    }

    /// Records a relationship between two entities.
    ///
    /// Re-asserting the same (subject, predicate, object) is a no-op
    /// returning `Ok(None)`, regardless of source. When the object
    /// changes for the same predicate, the prior current fact is
    /// superseded.
    ///
    /// # Errors
    ///
    /// Returns validation errors for an empty predicate, or storage
    /// errors.
    pub fn create_relationship_fact(
        &self,
        subject: EntityId,
        predicate: &str,
        object: EntityId,
        provenance: Provenance,
        confidence: Confidence,
    ) -> Result<Option<Fact>> {
        if predicate.trim().is_empty() {
            return Err(ValidationError::EmptyPredicate.into());
        }

        let current = self.current_fact(subject, predicate)?;
        if let Some(current) = &current {
            if current.object.as_entity() == Some(object) {
                debug!(%subject, predicate, "relationship already asserted; skipping");
                return Ok(None);
            }
        }

        let fact = Fact::builder()
            .subject(subject)
            .predicate(predicate)
            .object_entity(object)
            .provenance(provenance)
            .confidence(confidence)
            .build()?;

        match current {
            Some(old) => self.facts.insert_superseding(fact.clone(), old.id)?,
            None => self.facts.insert(fact.clone())?,
        }
        Ok(Some(fact))
    }

    /// All current facts for an entity, optionally filtered by predicate
    /// prefix (e.g. `"has_assumption"`).
    ///
    /// # Errors
    ///
    /// Returns a storage error from the backend.
    pub fn get_current_facts(
        &self,
        subject: EntityId,
        predicate_prefix: Option<&str>,
    ) -> Result<Vec<Fact>> {
        let facts = self.facts.find_by_subject(subject)?;
        Ok(facts
            .into_iter()
            .filter(|f| f.is_current)
            .filter(|f| {
                predicate_prefix.map_or(true, |prefix| f.predicate.starts_with(prefix))
            })
            .collect())
    }

    /// The full fact chain for a (subject, predicate) key, superseded
    /// facts included, most recent first.
    ///
    /// # Errors
    ///
    /// Returns a storage error from the backend.
    pub fn get_history(&self, subject: EntityId, predicate: &str) -> Result<Vec<Fact>> {
        Ok(self.facts.find_by_subject_predicate(subject, predicate)?)
    }

    /// Records a user correction of an assumption fact.
    ///
    /// Always creates a new fact at full confidence, even when the
    /// corrected value is textually identical to the current one; the
    /// user's intent is "this is definitively now true."
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NotAnAssumptionFact` when the fact's
    /// predicate is not in the assumption namespace.
    pub fn record_user_correction(
        &self,
        fact: &Fact,
        corrected_value: &str,
        reason: Option<String>,
        user_id: Option<String>,
    ) -> Result<Fact> {
        let key = fact
            .assumption_key()
            .ok_or_else(|| ValidationError::NotAnAssumptionFact {
                predicate: fact.predicate.clone(),
            })?
            .to_string();

        let created = self.create_assumption_fact(
            fact.subject,
            &key,
            corrected_value,
            Provenance::correction(user_id, reason),
            Confidence::certain(),
            fact.validity,
        )?;

        // User corrections always create; None is unreachable here.
        created.ok_or_else(|| {
            Error::Storage(StorageError::BackendError(
                "user correction did not create a fact".to_string(),
            ))
        })
    }

    fn current_fact(&self, subject: EntityId, predicate: &str) -> Result<Option<Fact>> {
        let facts = self.facts.find_by_subject_predicate(subject, predicate)?;
        Ok(facts.into_iter().find(|f| f.is_current))
    }
}
