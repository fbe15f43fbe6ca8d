//! In-memory storage backend.
//!
//! Every primitive takes the single write lock for its whole duration, so primitives are
//! serializable. Used for development and tests.

use chrono::Utc;
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::error::{OntologyError, Result};
use crate::model::{
    Annotation, AnnotationValue, EntityRecord, Id, NewVersion, Organisation, Repository,
    SubclassRelation, SuperLink, Version, VersionChain,
};
use crate::store::traits::{
    AnnotationStore, EntityStore, HierarchyStore, RepositoryStore, Store, VersionStore,
};

#[derive(Debug)]
struct StoredEntity {
    record: EntityRecord,
    chain: VersionChain,
}

#[derive(Debug, Default)]
struct MemoryState {
    organisations: HashMap<Id, Organisation>,
    repositories: HashMap<Id, Repository>,
    entities: HashMap<Id, StoredEntity>,
    relations: Vec<SubclassRelation>,
}

impl MemoryState {
    fn chain_mut(&mut self, entity_id: &Id) -> Result<&mut VersionChain> {
        self.entities
            .get_mut(entity_id)
            .map(|e| &mut e.chain)
            .ok_or_else(|| OntologyError::not_found(format!("Entity '{}' does not exist", entity_id)))
    }

    fn replace_relations(&mut self, entity_id: &Id, repository_id: &Id, supers: Vec<SuperLink>) {
        self.relations
            .retain(|r| !(&r.entity_id == entity_id && &r.repository_id == repository_id));
        self.relations
            .extend(supers.into_iter().map(|link| SubclassRelation {
                entity_id: entity_id.clone(),
                super_entity_id: link.super_entity_id,
                repository_id: repository_id.clone(),
                index: link.index,
            }));
    }

    /// Does `organisation_id` contain `start` itself or one of its super organisations?
    fn organisation_contains(&self, organisation_id: &Id, start: &Id) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = Some(start.clone());
        while let Some(current) = cursor {
            if &current == organisation_id {
                return true;
            }
            if !seen.insert(current.clone()) {
                return false;
            }
            cursor = self
                .organisations
                .get(&current)
                .and_then(|o| o.super_organisation_id.clone());
        }
        false
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn by_creation(records: impl Iterator<Item = EntityRecord>) -> Vec<EntityRecord> {
    records
        .sorted_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
        .collect()
}

#[async_trait::async_trait]
impl RepositoryStore for MemoryStore {
    async fn resolve_repository(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
    ) -> Result<Option<Repository>> {
        let state = self.state.read();
        Ok(state
            .repositories
            .get(repository_id)
            .filter(|r| state.organisation_contains(organisation_id, &r.organisation_id))
            .cloned())
    }

    async fn get_repository(&self, repository_id: &Id) -> Result<Option<Repository>> {
        Ok(self.state.read().repositories.get(repository_id).cloned())
    }

    async fn upsert_organisation(&self, organisation: Organisation) -> Result<()> {
        self.state
            .write()
            .organisations
            .insert(organisation.id.clone(), organisation);
        Ok(())
    }

    async fn upsert_repository(&self, repository: Repository) -> Result<()> {
        let mut state = self.state.write();
        if !state.organisations.contains_key(&repository.organisation_id) {
            return Err(OntologyError::not_found(format!(
                "Organisation '{}' does not exist",
                repository.organisation_id
            )));
        }
        state.repositories.insert(repository.id.clone(), repository);
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn entity_exists(&self, id: &Id) -> Result<bool> {
        Ok(self.state.read().entities.contains_key(id))
    }

    async fn get_entity(&self, id: &Id) -> Result<Option<EntityRecord>> {
        Ok(self.state.read().entities.get(id).map(|e| e.record.clone()))
    }

    async fn list_entities(&self, repository_id: &Id) -> Result<Vec<EntityRecord>> {
        let state = self.state.read();
        Ok(by_creation(
            state
                .entities
                .values()
                .filter(|e| &e.record.repository_id == repository_id)
                .map(|e| e.record.clone()),
        ))
    }

    async fn count_entities(&self, repository_id: &Id) -> Result<usize> {
        let state = self.state.read();
        Ok(state
            .entities
            .values()
            .filter(|e| &e.record.repository_id == repository_id)
            .count())
    }

    async fn insert_entity(
        &self,
        record: EntityRecord,
        first_version: NewVersion,
        supers: Vec<SuperLink>,
    ) -> Result<Version> {
        let mut state = self.state.write();

        if state.entities.contains_key(&record.id) {
            return Err(OntologyError::conflict(format!(
                "Entity '{}' already exists",
                record.id
            )));
        }
        if let Some(origin_id) = &record.origin_id {
            let duplicate = state.entities.values().any(|e| {
                e.record.origin_id.as_ref() == Some(origin_id)
                    && e.record.repository_id == record.repository_id
            });
            if duplicate {
                return Err(OntologyError::conflict(format!(
                    "Entity '{}' already has a fork in repository '{}'",
                    origin_id, record.repository_id
                )));
            }
        }

        let mut chain = VersionChain::new(record.id.clone());
        let version = chain.append(first_version, true, Utc::now()).clone();

        state
            .relations
            .extend(supers.into_iter().map(|link| SubclassRelation {
                entity_id: record.id.clone(),
                super_entity_id: link.super_entity_id,
                repository_id: record.repository_id.clone(),
                index: link.index,
            }));
        state
            .entities
            .insert(record.id.clone(), StoredEntity { record, chain });

        Ok(version)
    }

    async fn delete_entity(&self, id: &Id) -> Result<bool> {
        let mut state = self.state.write();
        let Some(mut removed) = state.entities.remove(id) else {
            return Ok(false);
        };

        for number in removed.chain.list_desc().iter().map(|v| v.version).collect::<Vec<_>>() {
            removed.chain.annotations_mut(number)?.clear();
        }
        state
            .relations
            .retain(|r| &r.entity_id != id && &r.super_entity_id != id);

        for other in state.entities.values_mut() {
            if other.record.origin_id.as_ref() == Some(id) {
                other.record.origin_id = None;
            }
            other.chain.clear_equivalence_to(id);
        }

        Ok(true)
    }

    async fn find_fork(&self, origin_id: &Id, repository_id: &Id) -> Result<Option<EntityRecord>> {
        let state = self.state.read();
        Ok(state
            .entities
            .values()
            .find(|e| {
                e.record.origin_id.as_ref() == Some(origin_id)
                    && &e.record.repository_id == repository_id
            })
            .map(|e| e.record.clone()))
    }

    async fn list_forks(&self, origin_id: &Id) -> Result<Vec<EntityRecord>> {
        let state = self.state.read();
        Ok(by_creation(
            state
                .entities
                .values()
                .filter(|e| e.record.origin_id.as_ref() == Some(origin_id))
                .map(|e| e.record.clone()),
        ))
    }
}

#[async_trait::async_trait]
impl VersionStore for MemoryStore {
    async fn get_chain(&self, entity_id: &Id) -> Result<Option<VersionChain>> {
        Ok(self
            .state
            .read()
            .entities
            .get(entity_id)
            .map(|e| e.chain.clone()))
    }

    async fn append_version(
        &self,
        entity_id: &Id,
        draft: NewVersion,
        make_current: bool,
        supers: Option<Vec<SuperLink>>,
    ) -> Result<Version> {
        let mut state = self.state.write();
        let version = state
            .chain_mut(entity_id)?
            .append(draft, make_current, Utc::now())
            .clone();
        if let Some(supers) = supers {
            let repository_id = state
                .entities
                .get(entity_id)
                .map(|e| e.record.repository_id.clone())
                .ok_or_else(|| {
                    OntologyError::not_found(format!("Entity '{}' does not exist", entity_id))
                })?;
            state.replace_relations(entity_id, &repository_id, supers);
        }
        Ok(version)
    }

    async fn set_current_version(&self, entity_id: &Id, version: i32) -> Result<Version> {
        let mut state = self.state.write();
        let chain = state.chain_mut(entity_id)?;
        Ok(chain.set_current(version)?.clone())
    }

    async fn hide_version(&self, entity_id: &Id, version: i32) -> Result<Version> {
        let mut state = self.state.write();
        let chain = state.chain_mut(entity_id)?;
        Ok(chain.hide(version, Utc::now())?.clone())
    }

    async fn remove_version(&self, entity_id: &Id, version: i32) -> Result<Version> {
        let mut state = self.state.write();
        let chain = state.chain_mut(entity_id)?;
        let mut removed = chain.remove(version)?;
        let cleared = removed.annotations.clear();
        let target = removed.to_ref();
        for other in state.entities.values_mut() {
            other.chain.clear_equivalence_to_version(&target);
        }
        log::debug!(
            "Removed version {} of entity '{}' with {} annotations",
            version,
            entity_id,
            cleared.len()
        );
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl AnnotationStore for MemoryStore {
    async fn replace_annotations(
        &self,
        entity_id: &Id,
        version: i32,
        property: &str,
        values: Vec<(AnnotationValue, Option<String>)>,
    ) -> Result<Vec<Annotation>> {
        let mut state = self.state.write();
        let annotations = state.chain_mut(entity_id)?.annotations_mut(version)?;
        annotations.set_property(property, values);
        Ok(annotations
            .by_property(property)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn delete_annotations(&self, entity_id: &Id, version: i32) -> Result<usize> {
        let mut state = self.state.write();
        let annotations = state.chain_mut(entity_id)?.annotations_mut(version)?;
        Ok(annotations.clear().len())
    }
}

#[async_trait::async_trait]
impl HierarchyStore for MemoryStore {
    async fn list_relations(&self, repository_id: &Id) -> Result<Vec<SubclassRelation>> {
        let state = self.state.read();
        Ok(state
            .relations
            .iter()
            .filter(|r| &r.repository_id == repository_id)
            .cloned()
            .collect())
    }

    async fn replace_super_entities(
        &self,
        entity_id: &Id,
        repository_id: &Id,
        supers: Vec<SuperLink>,
    ) -> Result<()> {
        let mut state = self.state.write();
        if !state.entities.contains_key(entity_id) {
            return Err(OntologyError::not_found(format!(
                "Entity '{}' does not exist",
                entity_id
            )));
        }
        state.replace_relations(entity_id, repository_id, supers);
        Ok(())
    }
}

impl Store for MemoryStore {}
