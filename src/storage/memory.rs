//! In-memory storage backend.
//!
//! Thread-safe reference implementations of the storage traits, intended
//! for embedded usage and tests. Each store guards its state behind one
//! `RwLock`, so multi-row mutations (the fact supersession pair) are
//! atomic with respect to other callers.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::entity::{Entity, EntityId};
use crate::fact::{Fact, FactId};
use crate::storage::traits::{EntityStore, FactStore, ProductionStore, StorageError};
use crate::value::Row;

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct EntityState {
    by_id: HashMap<EntityId, Entity>,
    by_name: HashMap<String, EntityId>,
}

/// Thread-safe in-memory entity store.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    state: RwLock<EntityState>,
}

impl InMemoryEntityStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn insert(&self, entity: Entity) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("entity.insert"))?;
        if state.by_id.contains_key(&entity.id) {
            return Err(StorageError::DuplicateKey(entity.id.to_string()));
        }
        if state.by_name.contains_key(&entity.canonical_name) {
            return Err(StorageError::DuplicateKey(entity.canonical_name.clone()));
        }

        state.by_name.insert(entity.canonical_name.clone(), entity.id);
        state.by_id.insert(entity.id, entity);
        Ok(())
    }

    fn get(&self, id: EntityId) -> Result<Option<Entity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("entity.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn get_by_name(&self, canonical_name: &str) -> Result<Option<Entity>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("entity.get_by_name"))?;
        Ok(state
            .by_name
            .get(canonical_name)
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    fn update(&self, entity: Entity) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("entity.update"))?;
        let prev = state
            .by_id
            .get(&entity.id)
            .ok_or(StorageError::EntityNotFound(entity.id))?;

        if entity.version <= prev.version {
            return Err(StorageError::BackendError(format!(
                "entity version must increase on update: id={} prev={} new={}",
                entity.id, prev.version, entity.version
            )));
        }
        if entity.canonical_name != prev.canonical_name {
            return Err(StorageError::BackendError(
                "canonical_name is the identity key and cannot change".to_string(),
            ));
        }

        state.by_id.insert(entity.id, entity);
        Ok(())
    }

    fn list_by_type(&self, type_name: &str) -> Result<Vec<Entity>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("entity.list_by_type"))?;
        let mut results: Vec<Entity> = state
            .by_id
            .values()
            .filter(|e| e.entity_type.to_string() == type_name)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));
        Ok(results)
    }
}

#[derive(Debug, Default)]
struct FactState {
    by_id: HashMap<FactId, Fact>,
    by_subject: HashMap<EntityId, Vec<FactId>>,
    by_subject_predicate: HashMap<(EntityId, String), Vec<FactId>>,
}

impl FactState {
    fn index_insert(&mut self, fact: &Fact) {
        self.by_subject.entry(fact.subject).or_default().push(fact.id);
        self.by_subject_predicate
            .entry((fact.subject, fact.predicate.clone()))
            .or_default()
            .push(fact.id);
    }

    fn insert_checked(&mut self, fact: Fact) -> Result<(), StorageError> {
        if self.by_id.contains_key(&fact.id) {
            return Err(StorageError::DuplicateKey(fact.id.to_string()));
        }
        self.index_insert(&fact);
        self.by_id.insert(fact.id, fact);
        Ok(())
    }
}

/// Thread-safe in-memory fact store.
#[derive(Debug, Default)]
pub struct InMemoryFactStore {
    state: RwLock<FactState>,
}

impl InMemoryFactStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_ids(state: &FactState, ids: &[FactId]) -> Vec<Fact> {
        // Index vectors are in insertion order; reversing yields most
        // recent first without relying on timestamp resolution.
        ids.iter()
            .rev()
            .filter_map(|id| state.by_id.get(id).cloned())
            .collect()
    }
}

impl FactStore for InMemoryFactStore {
    fn insert(&self, fact: Fact) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("fact.insert"))?;
        state.insert_checked(fact)
    }

    fn get(&self, id: FactId) -> Result<Option<Fact>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("fact.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn insert_superseding(&self, mut new_fact: Fact, old_id: FactId) -> Result<(), StorageError> {
        if new_fact.id == old_id {
            return Err(StorageError::BackendError(
                "a fact cannot supersede itself".to_string(),
            ));
        }

        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("fact.insert_superseding"))?;

        // Validate everything before mutating so a failure leaves the
        // prior state untouched.
        let old = state
            .by_id
            .get(&old_id)
            .ok_or(StorageError::FactNotFound(old_id))?;
        if !old.is_current {
            return Err(StorageError::NotCurrent(old_id));
        }
        if state.by_id.contains_key(&new_fact.id) {
            return Err(StorageError::DuplicateKey(new_fact.id.to_string()));
        }

        new_fact.supersedes = Some(old_id);
        new_fact.is_current = true;
        let new_id = new_fact.id;

        state.index_insert(&new_fact);
        state.by_id.insert(new_id, new_fact);

        let old = state
            .by_id
            .get_mut(&old_id)
            .ok_or(StorageError::FactNotFound(old_id))?;
        old.is_current = false;
        old.superseded_by = Some(new_id);

        Ok(())
    }

    fn find_by_subject(&self, subject: EntityId) -> Result<Vec<Fact>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("fact.find_by_subject"))?;
        let Some(ids) = state.by_subject.get(&subject) else {
            return Ok(Vec::new());
        };
        Ok(Self::collect_ids(&state, ids))
    }

    fn find_by_subject_predicate(
        &self,
        subject: EntityId,
        predicate: &str,
    ) -> Result<Vec<Fact>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("fact.find_by_subject_predicate"))?;
        let key = (subject, predicate.trim().to_string());
        let Some(ids) = state.by_subject_predicate.get(&key) else {
            return Ok(Vec::new());
        };
        Ok(Self::collect_ids(&state, ids))
    }
}

fn row_matches(row: &Row, selector: &Row) -> bool {
    selector.iter().all(|(k, v)| row.get(k) == Some(v))
}

/// Thread-safe in-memory production-table store.
///
/// Tables are named row sets; the uniqueness discipline (selector-based
/// upserts) is supplied by the extraction writer, mirroring how the
/// relational schema enforces it with unique indexes.
#[derive(Debug, Default)]
pub struct InMemoryProductionStore {
    state: RwLock<HashMap<String, Vec<Row>>>,
}

impl InMemoryProductionStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProductionStore for InMemoryProductionStore {
    fn upsert(&self, table: &str, selector: &Row, values: &Row) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("production.upsert"))?;
        let rows = state.entry(table.to_string()).or_default();

        if let Some(row) = rows.iter_mut().find(|row| row_matches(row, selector)) {
            for (k, v) in values {
                row.insert(k.clone(), v.clone());
            }
            return Ok(());
        }

        let mut row = selector.clone();
        for (k, v) in values {
            row.insert(k.clone(), v.clone());
        }
        rows.push(row);
        Ok(())
    }

    fn insert_row(&self, table: &str, values: &Row) -> Result<(), StorageError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("production.insert_row"))?;
        state.entry(table.to_string()).or_default().push(values.clone());
        Ok(())
    }

    fn get(&self, table: &str, selector: &Row) -> Result<Option<Row>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("production.get"))?;
        Ok(state
            .get(table)
            .and_then(|rows| rows.iter().find(|row| row_matches(row, selector)))
            .cloned())
    }

    fn row_count(&self, table: &str) -> Result<usize, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("production.row_count"))?;
        Ok(state.get(table).map_or(0, Vec::len))
    }
}

/// Convenience bundle of in-memory stores.
#[derive(Debug, Default)]
pub struct InMemoryStores {
    /// Entity store.
    pub entities: InMemoryEntityStore,
    /// Fact store.
    pub facts: InMemoryFactStore,
    /// Production-table store.
    pub production: InMemoryProductionStore,
}

impl InMemoryStores {
    /// Create a new bundle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::confidence::Confidence;
    use crate::entity::EntityType;
    use crate::fact::assumption_predicate;
    use crate::source::Provenance;

    fn mk_fact(subject: EntityId, predicate: &str, value: &str) -> Fact {
        Fact::builder()
            .subject(subject)
            .predicate(predicate)
            .literal(value)
            .provenance(Provenance::document("doc-1"))
            .confidence(Confidence::new(0.9).unwrap())
            .build()
            .unwrap()
    }

    fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn entity_insert_get_and_name_index() {
        let store = InMemoryEntityStore::new();
        let entity = Entity::new("project:1", EntityType::Project);
        let id = entity.id;

        store.insert(entity.clone()).unwrap();
        assert!(matches!(
            store.insert(entity),
            Err(StorageError::DuplicateKey(_))
        ));

        assert_eq!(store.get(id).unwrap().unwrap().id, id);
        assert_eq!(store.get_by_name("project:1").unwrap().unwrap().id, id);
        assert!(store.get_by_name("project:2").unwrap().is_none());
    }

    #[test]
    fn entity_update_requires_version_bump() {
        let store = InMemoryEntityStore::new();
        let mut entity = Entity::new("project:1", EntityType::Project);
        store.insert(entity.clone()).unwrap();

        // Same version is rejected.
        assert!(store.update(entity.clone()).is_err());

        entity.touch();
        store.update(entity.clone()).unwrap();
        assert_eq!(store.get(entity.id).unwrap().unwrap().version, 2);
    }

    #[test]
    fn entity_update_rejects_identity_change() {
        let store = InMemoryEntityStore::new();
        let entity = Entity::new("project:1", EntityType::Project);
        store.insert(entity.clone()).unwrap();

        let mut renamed = entity;
        renamed.canonical_name = "project:2".to_string();
        renamed.touch();
        assert!(store.update(renamed).is_err());
    }

    #[test]
    fn entity_list_by_type() {
        let store = InMemoryEntityStore::new();
        store.insert(Entity::new("project:1", EntityType::Project)).unwrap();
        store.insert(Entity::new("project:2", EntityType::Project)).unwrap();
        store
            .insert(Entity::new("market:austin:tx", EntityType::Market))
            .unwrap();

        let projects = store.list_by_type("project").unwrap();
        assert_eq!(projects.len(), 2);
        assert_eq!(projects[0].canonical_name, "project:1");
    }

    #[test]
    fn fact_insert_and_find_most_recent_first() {
        let store = InMemoryFactStore::new();
        let subject = EntityId::from_canonical_name("project:1");
        let pred = assumption_predicate("cap_rate");

        let first = mk_fact(subject, &pred, "0.05");
        let second = mk_fact(subject, &pred, "0.055");
        let second_id = second.id;

        store.insert(first).unwrap();
        store.insert(second).unwrap();

        let found = store.find_by_subject_predicate(subject, &pred).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, second_id);
    }

    #[test]
    fn fact_insert_superseding_is_atomic_pair() {
        let store = InMemoryFactStore::new();
        let subject = EntityId::from_canonical_name("project:1");
        let pred = assumption_predicate("cap_rate");

        let old = mk_fact(subject, &pred, "0.05");
        let old_id = old.id;
        store.insert(old).unwrap();

        let new = mk_fact(subject, &pred, "0.06");
        let new_id = new.id;
        store.insert_superseding(new, old_id).unwrap();

        let old_after = store.get(old_id).unwrap().unwrap();
        assert!(!old_after.is_current);
        assert_eq!(old_after.superseded_by, Some(new_id));

        let new_after = store.get(new_id).unwrap().unwrap();
        assert!(new_after.is_current);
        assert_eq!(new_after.supersedes, Some(old_id));
    }

    #[test]
    fn fact_insert_superseding_rejects_non_current_old() {
        let store = InMemoryFactStore::new();
        let subject = EntityId::from_canonical_name("project:1");
        let pred = assumption_predicate("cap_rate");

        let old = mk_fact(subject, &pred, "0.05");
        let old_id = old.id;
        store.insert(old).unwrap();
        store
            .insert_superseding(mk_fact(subject, &pred, "0.06"), old_id)
            .unwrap();

        // Old is no longer current; superseding it again must fail and
        // must not insert the new fact.
        let stale = mk_fact(subject, &pred, "0.07");
        let stale_id = stale.id;
        assert!(matches!(
            store.insert_superseding(stale, old_id),
            Err(StorageError::NotCurrent(_))
        ));
        assert!(store.get(stale_id).unwrap().is_none());
    }

    #[test]
    fn fact_supersede_self_rejected() {
        let store = InMemoryFactStore::new();
        let subject = EntityId::from_canonical_name("project:1");
        let fact = mk_fact(subject, "located_in", "austin");
        let id = fact.id;
        store.insert(fact.clone()).unwrap();

        let mut same = fact;
        same.id = id;
        assert!(store.insert_superseding(same, id).is_err());
    }

    #[test]
    fn production_upsert_inserts_then_updates() {
        let store = InMemoryProductionStore::new();
        let selector = row(&[("project_id", json!(42)), ("category", json!("Insurance"))]);

        store
            .upsert("opex_items", &selector, &row(&[("annual_amount", json!("12000"))]))
            .unwrap();
        assert_eq!(store.row_count("opex_items").unwrap(), 1);

        store
            .upsert("opex_items", &selector, &row(&[("annual_amount", json!("13000"))]))
            .unwrap();
        assert_eq!(store.row_count("opex_items").unwrap(), 1);

        let stored = store.get("opex_items", &selector).unwrap().unwrap();
        assert_eq!(stored["annual_amount"], json!("13000"));
        assert_eq!(stored["category"], json!("Insurance"));
    }

    #[test]
    fn production_insert_row_always_appends() {
        let store = InMemoryProductionStore::new();
        let values = row(&[("milestone", json!("permits"))]);
        store.insert_row("milestones", &values).unwrap();
        store.insert_row("milestones", &values).unwrap();
        assert_eq!(store.row_count("milestones").unwrap(), 2);
    }
}
