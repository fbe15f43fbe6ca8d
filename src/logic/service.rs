use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{OntologyError, Result};
use crate::logic::annotations::AnnotationOperations;
use crate::logic::fork::ForkEngine;
use crate::logic::hierarchy::HierarchyIndex;
use crate::logic::versions::VersionOperations;
use crate::model::{
    generate_id, Annotation, Entity, EntityData, EntityKind, EntityRecord, ForkOrigin,
    ForkSummary, ForkingInstruction, ForkingStats, Id, LocalisableText, Organisation, Repository,
    SuperLink, UserContext, TITLE,
};
use crate::store::entity_cache::EntityListCache;
use crate::store::traits::Store;

/// Ontology operations as offered to the request layer.
///
/// Every operation is scoped by an organisation and a repository. An entity that exists but is
/// owned by another repository is reported as not found.
pub struct OntologyService<S: Store> {
    store: Arc<S>,
    cache: EntityListCache,
}

impl<S: Store> OntologyService<S> {
    pub fn new(store: Arc<S>, cache: EntityListCache) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &EntityListCache {
        &self.cache
    }

    async fn repository(&self, organisation_id: &Id, repository_id: &Id) -> Result<Repository> {
        self.store
            .resolve_repository(organisation_id, repository_id)
            .await?
            .ok_or_else(|| {
                OntologyError::not_found(format!(
                    "Repository '{}' not found in organisation '{}'",
                    repository_id, organisation_id
                ))
            })
    }

    async fn owned_record(&self, repository: &Repository, id: &Id) -> Result<EntityRecord> {
        self.store
            .get_entity(id)
            .await?
            .filter(|r| r.repository_id == repository.id)
            .ok_or_else(|| {
                OntologyError::not_found(format!(
                    "Entity '{}' not found in repository '{}'",
                    id, repository.id
                ))
            })
    }

    async fn view(&self, record: &EntityRecord, version: Option<i32>) -> Result<Entity> {
        let (selected, current) =
            VersionOperations::get_version(self.store.as_ref(), &record.id, version).await?;
        let index = HierarchyIndex::load(self.store.as_ref(), &record.repository_id).await?;
        Ok(Entity::assemble(
            record,
            &selected,
            current,
            index.supers_of(&record.id),
        ))
    }

    /// Current versions of `records`, loading each repository's relations once.
    async fn views(&self, records: Vec<EntityRecord>) -> Result<Vec<Entity>> {
        let mut indexes: HashMap<Id, HierarchyIndex> = HashMap::new();
        let mut entities = Vec::with_capacity(records.len());
        for record in records {
            if !indexes.contains_key(&record.repository_id) {
                let index = HierarchyIndex::load(self.store.as_ref(), &record.repository_id).await?;
                indexes.insert(record.repository_id.clone(), index);
            }
            let Some(chain) = self.store.get_chain(&record.id).await? else {
                continue;
            };
            let Some(current) = chain.current() else {
                log::warn!("Entity '{}' has no current version", record.id);
                continue;
            };
            let supers = indexes
                .get(&record.repository_id)
                .map(|index| index.supers_of(&record.id))
                .unwrap_or_default();
            entities.push(Entity::assemble(
                &record,
                current,
                chain.current_number(),
                supers,
            ));
        }
        Ok(entities)
    }

    /// Keep the superclasses that exist in the same repository. A restricted phenotype's super
    /// phenotype must exist.
    async fn linkable(
        &self,
        repository_id: &Id,
        entity_id: &Id,
        kind: EntityKind,
        links: Vec<SuperLink>,
    ) -> Result<Vec<SuperLink>> {
        let mut kept = Vec::with_capacity(links.len());
        for link in links {
            let owned = link.super_entity_id != *entity_id
                && self
                    .store
                    .get_entity(&link.super_entity_id)
                    .await?
                    .is_some_and(|r| &r.repository_id == repository_id);
            if owned {
                kept.push(link);
            } else if kind.is_restricted() {
                return Err(OntologyError::not_found(format!(
                    "Super phenotype '{}' not found in repository '{}'",
                    link.super_entity_id, repository_id
                )));
            } else {
                log::debug!(
                    "Ignoring super category '{}' of '{}': not in repository '{}'",
                    link.super_entity_id,
                    entity_id,
                    repository_id
                );
            }
        }
        Ok(kept)
    }

    pub async fn create_entity(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        data: EntityData,
        user: &UserContext,
    ) -> Result<Entity> {
        let repository = self.repository(organisation_id, repository_id).await?;
        let kind = data.kind()?;
        let links = data.super_links(kind)?.unwrap_or_default();
        let id = data
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(generate_id);

        if self.store.entity_exists(&id).await? {
            return Err(OntologyError::conflict(format!(
                "Entity '{}' already exists",
                id
            )));
        }
        let links = self.linkable(&repository.id, &id, kind, links).await?;

        let record = EntityRecord {
            id,
            repository_id: repository.id.clone(),
            kind,
            origin_id: None,
            created_at: Utc::now(),
        };
        self.store
            .insert_entity(record.clone(), data.to_new_version(user.author()), links)
            .await?;
        self.cache.invalidate_repository(&repository.id).await;

        log::info!(
            "Created {} '{}' in repository '{}'",
            kind.as_str(),
            record.id,
            repository.id
        );
        self.view(&record, None).await
    }

    /// Append a version built from `data` and make it current. Superclasses are replaced only
    /// when `data` names them.
    pub async fn update_entity_by_id(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
        data: EntityData,
        user: &UserContext,
    ) -> Result<Entity> {
        let repository = self.repository(organisation_id, repository_id).await?;
        let record = self.owned_record(&repository, id).await?;

        if data.id.as_ref().is_some_and(|body_id| body_id != id) {
            return Err(OntologyError::conflict(format!(
                "Entity id '{}' cannot be changed",
                id
            )));
        }
        if data.entity_type.is_some_and(|kind| kind != record.kind) {
            return Err(OntologyError::conflict(format!(
                "Entity '{}' is a {} and cannot change its type",
                id,
                record.kind.as_str()
            )));
        }

        let links = if data.has_hierarchy_fields(record.kind) {
            let links = data.super_links(record.kind)?.unwrap_or_default();
            Some(self.linkable(&repository.id, id, record.kind, links).await?)
        } else {
            None
        };

        VersionOperations::create_version(
            self.store.as_ref(),
            id,
            data.to_new_version(user.author()),
            true,
            links,
        )
        .await?;
        self.cache.invalidate_repository(&repository.id).await;

        self.view(&record, None).await
    }

    /// `None` loads the current version.
    pub async fn load_entity(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
        version: Option<i32>,
    ) -> Result<Entity> {
        let repository = self.repository(organisation_id, repository_id).await?;
        let record = self.owned_record(&repository, id).await?;
        self.view(&record, version).await
    }

    /// Every version of an entity, newest first.
    pub async fn get_versions(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
    ) -> Result<Vec<Entity>> {
        let repository = self.repository(organisation_id, repository_id).await?;
        let record = self.owned_record(&repository, id).await?;
        let (versions, current) = VersionOperations::list_versions(self.store.as_ref(), id).await?;
        let index = HierarchyIndex::load(self.store.as_ref(), &repository.id).await?;

        Ok(versions
            .iter()
            .map(|v| Entity::assemble(&record, v, current, index.supers_of(id)))
            .collect())
    }

    pub async fn set_current_entity_version(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
        version: i32,
    ) -> Result<Entity> {
        let repository = self.repository(organisation_id, repository_id).await?;
        let record = self.owned_record(&repository, id).await?;
        VersionOperations::set_current(self.store.as_ref(), id, version).await?;
        self.cache.invalidate_repository(&repository.id).await;
        self.view(&record, None).await
    }

    /// Soft delete. The version stays in the chain.
    pub async fn hide_version(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
        version: i32,
    ) -> Result<Entity> {
        let repository = self.repository(organisation_id, repository_id).await?;
        let record = self.owned_record(&repository, id).await?;
        VersionOperations::hide(self.store.as_ref(), id, version).await?;
        self.cache.invalidate_repository(&repository.id).await;
        self.view(&record, Some(version)).await
    }

    /// Permanently delete a version that is not current.
    pub async fn delete_version(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
        version: i32,
    ) -> Result<()> {
        let repository = self.repository(organisation_id, repository_id).await?;
        self.owned_record(&repository, id).await?;
        VersionOperations::delete_permanently(self.store.as_ref(), id, version).await?;
        self.cache.invalidate_repository(&repository.id).await;
        Ok(())
    }

    pub async fn delete_entity(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
    ) -> Result<()> {
        let repository = self.repository(organisation_id, repository_id).await?;
        self.owned_record(&repository, id).await?;
        let forks = self.store.list_forks(id).await?;

        if !self.store.delete_entity(id).await? {
            return Err(OntologyError::not_found(format!(
                "Entity '{}' does not exist",
                id
            )));
        }

        self.cache.invalidate_repository(&repository.id).await;
        for fork in forks {
            self.cache.invalidate_repository(&fork.repository_id).await;
        }
        log::info!("Deleted entity '{}' from repository '{}'", id, repository.id);
        Ok(())
    }

    /// Annotations of one property, `None` reading the current version.
    pub async fn get_annotations(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
        version: Option<i32>,
        property: &str,
    ) -> Result<Vec<Annotation>> {
        let repository = self.repository(organisation_id, repository_id).await?;
        self.owned_record(&repository, id).await?;
        AnnotationOperations::get_annotations(self.store.as_ref(), id, version, property).await
    }

    /// Replace the values of one property on an existing version.
    pub async fn set_annotations(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
        version: i32,
        property: &str,
        values: Vec<LocalisableText>,
    ) -> Result<Vec<Annotation>> {
        if property.trim().is_empty() {
            return Err(OntologyError::bad_request("Annotation property must not be empty"));
        }
        let repository = self.repository(organisation_id, repository_id).await?;
        self.owned_record(&repository, id).await?;
        let stored = AnnotationOperations::set_annotations(
            self.store.as_ref(),
            id,
            version,
            property,
            values,
        )
        .await?;
        self.cache.invalidate_repository(&repository.id).await;
        log::info!(
            "Set {} '{}' annotations on version {} of entity '{}'",
            stored.len(),
            property,
            version,
            id
        );
        Ok(stored)
    }

    /// Remove every annotation of a version, nested ones included. Returns how many were removed.
    pub async fn delete_annotations(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
        version: i32,
    ) -> Result<usize> {
        let repository = self.repository(organisation_id, repository_id).await?;
        self.owned_record(&repository, id).await?;
        let removed =
            AnnotationOperations::delete_recursive(self.store.as_ref(), id, version).await?;
        self.cache.invalidate_repository(&repository.id).await;
        Ok(removed)
    }

    /// Current versions of every entity owned by the repository.
    pub async fn get_entities_by_repository_id(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
    ) -> Result<Vec<Entity>> {
        let repository = self.repository(organisation_id, repository_id).await?;
        if let Some(cached) = self.cache.get_list(&repository.id).await {
            log::debug!("Entity list of '{}' served from cache", repository.id);
            return Ok(cached);
        }

        let records = self.store.list_entities(&repository.id).await?;
        let entities = self.views(records).await?;
        self.cache.put_list(&repository.id, entities.clone()).await;
        Ok(entities)
    }

    pub async fn count_entities(&self, organisation_id: &Id, repository_id: &Id) -> Result<usize> {
        let repository = self.repository(organisation_id, repository_id).await?;
        if let Some(count) = self.cache.get_count(&repository.id).await {
            return Ok(count);
        }

        let count = self.store.count_entities(&repository.id).await?;
        self.cache.put_count(&repository.id, count).await;
        Ok(count)
    }

    /// Direct subclasses of `id` as declared by the repository, ordered by relation index.
    pub async fn get_subclasses(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
    ) -> Result<Vec<Entity>> {
        let repository = self.repository(organisation_id, repository_id).await?;
        if !self.store.entity_exists(id).await? {
            return Err(OntologyError::not_found(format!(
                "Entity '{}' does not exist",
                id
            )));
        }

        let index = HierarchyIndex::load(self.store.as_ref(), &repository.id).await?;
        let mut records = Vec::new();
        for sub in index.subclasses_of(id) {
            if let Some(record) = self.store.get_entity(sub).await? {
                records.push(record);
            }
        }
        self.views(records).await
    }

    /// Entities of the repository without a superclass in that repository.
    pub async fn get_root_entities_by_repository_id(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
    ) -> Result<Vec<Entity>> {
        let repository = self.repository(organisation_id, repository_id).await?;
        let index = HierarchyIndex::load(self.store.as_ref(), &repository.id).await?;
        let roots = self
            .store
            .list_entities(&repository.id)
            .await?
            .into_iter()
            .filter(|r| index.is_root(&r.id))
            .collect();
        self.views(roots).await
    }

    pub async fn get_forking_stats(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
    ) -> Result<ForkingStats> {
        let repository = self.repository(organisation_id, repository_id).await?;
        let record = self.owned_record(&repository, id).await?;

        let origin = match &record.origin_id {
            Some(origin_id) => {
                let titles = AnnotationOperations::get_annotations(
                    self.store.as_ref(),
                    origin_id,
                    None,
                    TITLE,
                )
                .await;
                match titles {
                    Ok(titles) => Some(ForkOrigin {
                        id: origin_id.clone(),
                        titles: titles.iter().filter_map(Annotation::localised).collect(),
                    }),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e),
                }
            }
            None => None,
        };

        let mut forks = Vec::new();
        for fork in self.store.list_forks(id).await? {
            let repository_name = self
                .store
                .get_repository(&fork.repository_id)
                .await?
                .map(|r| r.name)
                .unwrap_or_else(|| fork.repository_id.clone());
            forks.push(ForkSummary {
                id: fork.id,
                repository_id: fork.repository_id,
                repository_name,
            });
        }

        Ok(ForkingStats { origin, forks })
    }

    /// Fork an entity of a primary repository into the instructed repository. Returns the
    /// created or updated destination entities; skipped ones are left out.
    pub async fn create_fork(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
        id: &Id,
        instruction: ForkingInstruction,
        user: &UserContext,
    ) -> Result<Vec<Entity>> {
        let repository = self.repository(organisation_id, repository_id).await?;
        let outcomes =
            ForkEngine::create_fork(self.store.as_ref(), &repository, id, &instruction, user)
                .await?;
        self.cache
            .invalidate_repository(&instruction.repository_id)
            .await;
        ForkEngine::fork_results(self.store.as_ref(), &instruction.repository_id, &outcomes).await
    }

    pub async fn register_organisation(&self, organisation: Organisation) -> Result<Organisation> {
        self.store.upsert_organisation(organisation.clone()).await?;
        log::info!("Registered organisation '{}'", organisation.id);
        Ok(organisation)
    }

    pub async fn register_repository(&self, repository: Repository) -> Result<Repository> {
        self.store.upsert_repository(repository.clone()).await?;
        self.cache.invalidate_repository(&repository.id).await;
        log::info!(
            "Registered repository '{}' in organisation '{}'",
            repository.id,
            repository.organisation_id
        );
        Ok(repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::testing::{seeded_store, DEST, ORG, PRIMARY};
    use crate::model::LocalisableText;
    use crate::store::MemoryStore;

    fn service(store: MemoryStore) -> OntologyService<MemoryStore> {
        OntologyService::new(Arc::new(store), EntityListCache::default())
    }

    fn ids() -> (Id, Id, Id) {
        (ORG.to_string(), PRIMARY.to_string(), DEST.to_string())
    }

    fn body(id: &str, kind: EntityKind, title: &str) -> EntityData {
        EntityData {
            id: Some(id.to_string()),
            entity_type: Some(kind),
            titles: vec![LocalisableText::new(title, Some("en"))],
            ..Default::default()
        }
    }

    fn user() -> UserContext {
        UserContext::new("curator")
    }

    #[tokio::test]
    async fn test_create_and_load_entity() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();

        let created = service
            .create_entity(&org, &primary, body("w", EntityKind::SinglePhenotype, "Weight"), &user())
            .await
            .unwrap();
        assert_eq!(created.version, 1);
        assert!(created.current);
        assert_eq!(created.author.as_deref(), Some("curator"));

        let loaded = service
            .load_entity(&org, &primary, &"w".to_string(), None)
            .await
            .unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_create_generates_missing_id() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();
        let data = EntityData {
            id: None,
            ..body("", EntityKind::Category, "Anthropometry")
        };

        let created = service.create_entity(&org, &primary, data, &user()).await.unwrap();
        assert!(!created.id.is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_missing_kind() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();
        service
            .create_entity(&org, &primary, body("c", EntityKind::Category, "C"), &user())
            .await
            .unwrap();

        let duplicate = service
            .create_entity(&org, &primary, body("c", EntityKind::Category, "C"), &user())
            .await
            .unwrap_err();
        assert!(duplicate.is_conflict());

        let untyped = EntityData {
            entity_type: None,
            ..body("d", EntityKind::Category, "D")
        };
        let err = service.create_entity(&org, &primary, untyped, &user()).await.unwrap_err();
        assert!(matches!(err, OntologyError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_super_categories_outside_repository_are_ignored() {
        let service = service(seeded_store().await);
        let (org, primary, dest) = ids();
        service
            .create_entity(&org, &primary, body("p", EntityKind::Category, "P"), &user())
            .await
            .unwrap();
        service
            .create_entity(&org, &dest, body("foreign", EntityKind::Category, "F"), &user())
            .await
            .unwrap();

        let child = EntityData {
            super_categories: Some(vec!["p".into(), "foreign".into(), "missing".into()]),
            ..body("child", EntityKind::Category, "Child")
        };
        let created = service.create_entity(&org, &primary, child, &user()).await.unwrap();
        assert_eq!(created.super_categories, vec!["p".to_string()]);

        let orphan = EntityData {
            super_phenotype: Some("missing".into()),
            ..body("r", EntityKind::RestrictedPhenotype, "R")
        };
        let err = service.create_entity(&org, &primary, orphan, &user()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_appends_version_and_keeps_relations() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();
        service
            .create_entity(&org, &primary, body("p", EntityKind::Category, "P"), &user())
            .await
            .unwrap();
        let child = EntityData {
            super_categories: Some(vec!["p".into()]),
            ..body("c", EntityKind::Category, "Child")
        };
        service.create_entity(&org, &primary, child, &user()).await.unwrap();

        let id = "c".to_string();
        let updated = service
            .update_entity_by_id(&org, &primary, &id, body("c", EntityKind::Category, "Renamed"), &user())
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.titles[0].text, "Renamed");
        assert_eq!(updated.super_categories, vec!["p".to_string()]);

        let detached = EntityData {
            super_categories: Some(Vec::new()),
            ..body("c", EntityKind::Category, "Renamed")
        };
        let updated = service
            .update_entity_by_id(&org, &primary, &id, detached, &user())
            .await
            .unwrap();
        assert!(updated.super_categories.is_empty());

        let versions = service.get_versions(&org, &primary, &id).await.unwrap();
        let numbers: Vec<i32> = versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
        assert_eq!(versions.iter().filter(|v| v.current).count(), 1);
    }

    #[tokio::test]
    async fn test_restricted_update_with_empty_categories_keeps_parent() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();
        service
            .create_entity(&org, &primary, body("bmi", EntityKind::SinglePhenotype, "BMI"), &user())
            .await
            .unwrap();
        let obese = EntityData {
            super_phenotype: Some("bmi".into()),
            ..body("obese", EntityKind::RestrictedPhenotype, "Obese")
        };
        service.create_entity(&org, &primary, obese, &user()).await.unwrap();

        let update = EntityData {
            super_categories: Some(Vec::new()),
            ..body("obese", EntityKind::RestrictedPhenotype, "Obesity")
        };
        let updated = service
            .update_entity_by_id(&org, &primary, &"obese".to_string(), update, &user())
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.super_phenotype.as_deref(), Some("bmi"));
    }

    #[tokio::test]
    async fn test_update_cannot_change_identity_or_kind() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();
        service
            .create_entity(&org, &primary, body("c", EntityKind::Category, "C"), &user())
            .await
            .unwrap();
        let id = "c".to_string();

        let renamed = service
            .update_entity_by_id(&org, &primary, &id, body("other", EntityKind::Category, "C"), &user())
            .await
            .unwrap_err();
        assert!(renamed.is_conflict());

        let retyped = service
            .update_entity_by_id(&org, &primary, &id, body("c", EntityKind::SinglePhenotype, "C"), &user())
            .await
            .unwrap_err();
        assert!(retyped.is_conflict());
    }

    #[tokio::test]
    async fn test_entities_of_other_repositories_are_not_found() {
        let service = service(seeded_store().await);
        let (org, primary, dest) = ids();
        service
            .create_entity(&org, &primary, body("c", EntityKind::Category, "C"), &user())
            .await
            .unwrap();

        let err = service
            .load_entity(&org, &dest, &"c".to_string(), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = service
            .load_entity(&"elsewhere".to_string(), &primary, &"c".to_string(), None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_version_lifecycle_through_service() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();
        let id = "c".to_string();
        service
            .create_entity(&org, &primary, body("c", EntityKind::Category, "V1"), &user())
            .await
            .unwrap();
        service
            .update_entity_by_id(&org, &primary, &id, body("c", EntityKind::Category, "V2"), &user())
            .await
            .unwrap();

        let err = service.delete_version(&org, &primary, &id, 2).await.unwrap_err();
        assert!(err.is_conflict());

        let hidden = service.hide_version(&org, &primary, &id, 1).await.unwrap();
        assert!(hidden.hidden_at.is_some());
        let err = service
            .set_current_entity_version(&org, &primary, &id, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OntologyError::NotAcceptable(_)));

        service.delete_version(&org, &primary, &id, 1).await.unwrap();
        let versions = service.get_versions(&org, &primary, &id).await.unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].titles[0].text, "V2");
    }

    #[tokio::test]
    async fn test_listing_cache_is_invalidated_by_mutations() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();

        assert_eq!(service.count_entities(&org, &primary).await.unwrap(), 0);
        assert!(service
            .get_entities_by_repository_id(&org, &primary)
            .await
            .unwrap()
            .is_empty());

        service
            .create_entity(&org, &primary, body("c", EntityKind::Category, "C"), &user())
            .await
            .unwrap();
        assert_eq!(service.count_entities(&org, &primary).await.unwrap(), 1);
        assert_eq!(
            service
                .get_entities_by_repository_id(&org, &primary)
                .await
                .unwrap()
                .len(),
            1
        );

        service
            .delete_entity(&org, &primary, &"c".to_string())
            .await
            .unwrap();
        assert_eq!(service.count_entities(&org, &primary).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hiding_refreshes_cached_listing() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();
        service
            .create_entity(&org, &primary, body("c", EntityKind::Category, "C"), &user())
            .await
            .unwrap();
        let cached = service
            .get_entities_by_repository_id(&org, &primary)
            .await
            .unwrap();
        assert!(cached[0].hidden_at.is_none());

        service
            .hide_version(&org, &primary, &"c".to_string(), 1)
            .await
            .unwrap();

        let listed = service
            .get_entities_by_repository_id(&org, &primary)
            .await
            .unwrap();
        assert_eq!(listed[0].version, 1);
        assert!(listed[0].hidden_at.is_some());
    }

    #[tokio::test]
    async fn test_annotation_edits_through_service() {
        let service = service(seeded_store().await);
        let (org, primary, dest) = ids();
        let id = "w".to_string();
        service
            .create_entity(&org, &primary, body("w", EntityKind::SinglePhenotype, "Weight"), &user())
            .await
            .unwrap();
        service
            .get_entities_by_repository_id(&org, &primary)
            .await
            .unwrap();

        let stored = service
            .set_annotations(
                &org,
                &primary,
                &id,
                1,
                TITLE,
                vec![
                    LocalisableText::new("Body weight", Some("en")),
                    LocalisableText::new("Gewicht", Some("de")),
                ],
            )
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);

        let titles = service
            .get_annotations(&org, &primary, &id, None, TITLE)
            .await
            .unwrap();
        assert_eq!(titles[0].value.as_str(), Some("Body weight"));
        let listed = service
            .get_entities_by_repository_id(&org, &primary)
            .await
            .unwrap();
        assert_eq!(listed[0].titles.len(), 2);

        let err = service
            .set_annotations(&org, &primary, &id, 1, " ", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OntologyError::BadRequest(_)));
        let err = service
            .get_annotations(&org, &dest, &id, None, TITLE)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let removed = service.delete_annotations(&org, &primary, &id, 1).await.unwrap();
        assert_eq!(removed, 2);
        let loaded = service.load_entity(&org, &primary, &id, None).await.unwrap();
        assert!(loaded.titles.is_empty());
    }

    #[tokio::test]
    async fn test_subclasses_and_roots() {
        let service = service(seeded_store().await);
        let (org, primary, _) = ids();
        service
            .create_entity(&org, &primary, body("root", EntityKind::Category, "Root"), &user())
            .await
            .unwrap();
        for (id, index) in [("second", 2), ("first", 1)] {
            let data = EntityData {
                super_categories: Some(vec!["root".into()]),
                index: Some(index),
                ..body(id, EntityKind::Category, id)
            };
            service.create_entity(&org, &primary, data, &user()).await.unwrap();
        }

        let subs = service
            .get_subclasses(&org, &primary, &"root".to_string())
            .await
            .unwrap();
        let sub_ids: Vec<&str> = subs.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(sub_ids, vec!["first", "second"]);

        let roots = service
            .get_root_entities_by_repository_id(&org, &primary)
            .await
            .unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, "root");

        let (_, _, dest) = ids();
        assert!(service
            .get_root_entities_by_repository_id(&org, &dest)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_fork_invalidates_destination_and_reports_stats() {
        let service = service(seeded_store().await);
        let (org, primary, dest) = ids();
        service
            .create_entity(&org, &primary, body("c", EntityKind::Category, "Origin"), &user())
            .await
            .unwrap();
        assert_eq!(service.count_entities(&org, &dest).await.unwrap(), 0);

        let forks = service
            .create_fork(
                &org,
                &primary,
                &"c".to_string(),
                ForkingInstruction::new(ORG, DEST),
                &user(),
            )
            .await
            .unwrap();
        assert_eq!(forks.len(), 1);
        assert_eq!(service.count_entities(&org, &dest).await.unwrap(), 1);

        let stats = service
            .get_forking_stats(&org, &primary, &"c".to_string())
            .await
            .unwrap();
        assert!(stats.origin.is_none());
        assert_eq!(stats.forks.len(), 1);
        assert_eq!(stats.forks[0].repository_id, DEST);
        assert_eq!(stats.forks[0].repository_name, DEST);

        let stats = service
            .get_forking_stats(&org, &dest, &forks[0].id)
            .await
            .unwrap();
        let origin = stats.origin.unwrap();
        assert_eq!(origin.id, "c");
        assert_eq!(origin.titles[0].text, "Origin");
    }
}
