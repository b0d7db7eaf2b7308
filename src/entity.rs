//! Entity types and identity management.
//!
//! The entity layer is the prerequisite for everything in terrafact.
//! Facts cannot be linked, superseded, or queried without stable
//! entity identity, and identity here is deterministic: the same
//! canonical name always yields the same [`EntityId`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for deriving entity ids from canonical names (UUID v5).
const ENTITY_NAMESPACE: Uuid = Uuid::from_u128(0x7f3a_d2c4_9b1e_4e8a_b6d0_5c2f_81a7_e943);

/// Globally unique, stable entity identifier.
///
/// An `EntityId` is derived deterministically from the entity's canonical
/// name, so two independent writers that compute the same canonical name
/// always address the same entity.
///
/// # Examples
///
/// ```
/// use terrafact::EntityId;
///
/// let a = EntityId::from_canonical_name("project:42");
/// let b = EntityId::from_canonical_name("project:42");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Derives the entity ID for a canonical name.
    #[must_use]
    pub fn from_canonical_name(canonical_name: &str) -> Self {
        Self(Uuid::new_v5(&ENTITY_NAMESPACE, canonical_name.as_bytes()))
    }

    /// Creates an entity ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Creates a nil entity ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of entity types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A development or acquisition project.
    Project,
    /// A physical property.
    Property,
    /// A source document (OM, rent roll, T-12, appraisal, ...).
    Document,
    /// A market or submarket.
    Market,
    /// A named assumption category.
    AssumptionType,
    /// A human person.
    Person,
    /// A company or institution.
    Company,
    /// A custom entity type.
    Custom(String),
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Property => write!(f, "property"),
            Self::Document => write!(f, "document"),
            Self::Market => write!(f, "market"),
            Self::AssumptionType => write!(f, "assumption_type"),
            Self::Person => write!(f, "person"),
            Self::Company => write!(f, "company"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// Canonical-name formulas, one per entity type.
///
/// Canonical names are the only identity key in the graph. Every producer
/// must build them through these functions so that two writers referring
/// to the same real-world thing land on the same entity.
pub mod canonical {
    /// Canonical name for a project: `project:{project_id}`.
    #[must_use]
    pub fn project(project_id: i64) -> String {
        format!("project:{project_id}")
    }

    /// Canonical name for a property: `property:{normalized_address}`.
    #[must_use]
    pub fn property(address: &str) -> String {
        format!("property:{}", normalize_address(address))
    }

    /// Canonical name for a document: `document:{doc_id}`.
    #[must_use]
    pub fn document(doc_id: &str) -> String {
        format!("document:{}", doc_id.trim())
    }

    /// Canonical name for a market: `market:{city}:{state}[:{submarket}]`.
    #[must_use]
    pub fn market(city: &str, state: &str, submarket: Option<&str>) -> String {
        let city = city.trim().to_ascii_lowercase();
        let state = state.trim().to_ascii_lowercase();
        match submarket {
            Some(sub) if !sub.trim().is_empty() => {
                format!("market:{city}:{state}:{}", sub.trim().to_ascii_lowercase())
            }
            _ => format!("market:{city}:{state}"),
        }
    }

    /// Canonical name for an assumption type: `assumption_type:{key}`.
    #[must_use]
    pub fn assumption_type(key: &str) -> String {
        format!("assumption_type:{}", key.trim().to_ascii_lowercase())
    }

    /// Lowercases, strips punctuation, and collapses whitespace so that
    /// "123 Main St." and "123  main st" address the same property.
    #[must_use]
    pub fn normalize_address(address: &str) -> String {
        let mut out = String::with_capacity(address.len());
        let mut last_was_space = true;
        for ch in address.trim().chars() {
            if ch.is_alphanumeric() {
                out.extend(ch.to_lowercase());
                last_was_space = false;
            } else if ch.is_whitespace() && !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
        while out.ends_with(' ') {
            out.pop();
        }
        out
    }
}

/// The anchor of identity in terrafact.
///
/// All facts attach to entities via [`EntityId`]. An entity is created
/// lazily on first reference and is never hard-deleted by this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic identifier, derived from `canonical_name`.
    pub id: EntityId,

    /// The unique identity key. See [`canonical`] for formulas.
    pub canonical_name: String,

    /// The kind of thing this entity is.
    pub entity_type: EntityType,

    /// Free-text refinement of the type (e.g. a property subtype).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_subtype: Option<String>,

    /// Open key/value map. Merged shallowly on update: incoming keys
    /// overwrite, other existing keys are retained.
    #[serde(default)]
    pub metadata: serde_json::Value,

    /// When the entity was first created.
    pub created_at: DateTime<Utc>,
    /// When the entity was last persisted.
    pub updated_at: DateTime<Utc>,

    /// Who initiated the creation, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Increments on every persisted change.
    pub version: u64,
}

impl Entity {
    /// Creates a new entity with the given canonical name and type.
    ///
    /// # Examples
    ///
    /// ```
    /// use terrafact::{canonical, Entity, EntityType};
    ///
    /// let entity = Entity::new(canonical::project(42), EntityType::Project);
    /// assert_eq!(entity.canonical_name, "project:42");
    /// assert_eq!(entity.version, 1);
    /// ```
    #[must_use]
    pub fn new(canonical_name: impl Into<String>, entity_type: EntityType) -> Self {
        let canonical_name = canonical_name.into();
        let now = Utc::now();
        Self {
            id: EntityId::from_canonical_name(&canonical_name),
            canonical_name,
            entity_type,
            entity_subtype: None,
            metadata: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
            created_by: None,
            version: 1,
        }
    }

    /// Sets the subtype, returning self for chaining.
    #[must_use]
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.entity_subtype = Some(subtype.into());
        self
    }

    /// Sets the metadata, returning self for chaining.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Sets the creator, returning self for chaining.
    #[must_use]
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Shallow-overlays `incoming` onto this entity's metadata.
    ///
    /// Incoming keys overwrite, other existing keys are retained. Returns
    /// true when the metadata actually changed.
    pub fn merge_metadata(&mut self, incoming: &serde_json::Value) -> bool {
        use serde_json::Value;

        let merged = match (&self.metadata, incoming) {
            (_, Value::Null) => return false,
            (Value::Object(existing), Value::Object(new)) => {
                let mut out = existing.clone();
                for (k, v) in new {
                    out.insert(k.clone(), v.clone());
                }
                Value::Object(out)
            }
            (Value::Null, other) => other.clone(),
            // Non-object metadata is replaced wholesale.
            (_, other) => other.clone(),
        };

        if merged == self.metadata {
            return false;
        }
        self.metadata = merged;
        true
    }

    /// Updates the `updated_at` timestamp and increments the version.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl std::hash::Hash for Entity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
