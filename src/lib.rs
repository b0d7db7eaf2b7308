//! # terrafact - The Knowledge Core for Real-Estate Underwriting
//!
//! terrafact is the extraction and knowledge layer of an underwriting
//! platform: documents come in, a single trustworthy value per field
//! comes out, and every value carries its history.
//!
//! ## Core Concepts
//!
//! - **Entity**: A stable identity anchor (project, property, document, market)
//! - **Fact**: An atomic assertion with confidence, provenance, and temporal validity
//! - **Field Registry**: The catalog of extractable fields and where each lands
//! - **Conflict Resolution**: Deterministic winner selection across documents
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use terrafact::{
//!     canonical, Confidence, EntitySpec, EntityType, KnowledgeGraph, Provenance,
//!     InMemoryEntityStore, InMemoryFactStore, ValidityWindow,
//! };
//!
//! let graph = KnowledgeGraph::new(
//!     Arc::new(InMemoryEntityStore::new()),
//!     Arc::new(InMemoryFactStore::new()),
//! );
//!
//! // Resolve the project entity (idempotent) and assert an assumption.
//! let project = graph
//!     .get_or_create_entity(EntitySpec::new(EntityType::Project, canonical::project(42)))
//!     .unwrap();
//! graph
//!     .create_assumption_fact(
//!         project.id,
//!         "cap_rate",
//!         "0.055",
//!         Provenance::document("doc-17"),
//!         Confidence::new(0.9).unwrap(),
//!         ValidityWindow::unbounded(),
//!     )
//!     .unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod confidence;
pub mod entity;
pub mod error;
pub mod fact;
pub mod numeric;
pub mod source;
pub mod validity;
pub mod value;

// Storage and the graph service
pub mod graph;
pub mod storage;

// The extraction pipeline
pub mod classifier;
pub mod readiness;
pub mod registry;
pub mod resolver;
pub mod writer;

// Re-export primary types at crate root for convenience
pub use classifier::{
    classify, classify_label, classify_text, DocumentType, SubtypeClassifier, SubtypeDefinition,
    SubtypeMatch,
};
pub use confidence::Confidence;
pub use entity::{canonical, Entity, EntityId, EntityType};
pub use error::{Error, RegistryError, Result, ValidationError};
pub use fact::{
    assumption_key_from_predicate, assumption_predicate, Fact, FactBuilder, FactId, FactObject,
    ASSUMPTION_PREDICATE_PREFIX,
};
pub use graph::{EntitySpec, KnowledgeGraph};
pub use readiness::{ConfidenceLevel, ModelReadinessCalculator, ReadinessReport};
pub use registry::{
    document_priority, AnalyticalTier, DbWriteType, DynamicFieldSource, ExtractPolicy,
    Extractability, FieldMapping, FieldRegistry, FieldRole, FieldType, Scope,
};
pub use resolver::{
    values_match, ConflictResolver, ExtractionCandidate, RejectedValue, Resolution,
    ResolutionReason, FLAG_THRESHOLD_PERCENT,
};
pub use source::{Provenance, SourceType};
pub use storage::{
    EntityStore, FactStore, InMemoryEntityStore, InMemoryFactStore, InMemoryProductionStore,
    InMemoryStores, ProductionStore, StorageError,
};
pub use validity::ValidityWindow;
pub use value::{Row, Value};
pub use writer::{ExtractionWriter, WriteContext, WriteOutcome};
