use crate::error::Result;
use crate::model::{
    Annotation, AnnotationValue, EntityRecord, Id, NewVersion, Organisation, Repository,
    SubclassRelation, SuperLink, Version, VersionChain,
};

/// Minimal organisation/repository lookup the ontology core depends on.
#[async_trait::async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Find a repository that belongs to the organisation directly or through any of its
    /// sub-organisations.
    async fn resolve_repository(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
    ) -> Result<Option<Repository>>;
    async fn get_repository(&self, repository_id: &Id) -> Result<Option<Repository>>;
    async fn upsert_organisation(&self, organisation: Organisation) -> Result<()>;
    async fn upsert_repository(&self, repository: Repository) -> Result<()>;
}

#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    async fn entity_exists(&self, id: &Id) -> Result<bool>;
    async fn get_entity(&self, id: &Id) -> Result<Option<EntityRecord>>;
    async fn list_entities(&self, repository_id: &Id) -> Result<Vec<EntityRecord>>;
    async fn count_entities(&self, repository_id: &Id) -> Result<usize>;
    /// Create an entity together with its first version, marked current, and its superclass
    /// relations. Fails with `Conflict` if the id is taken or if the record's origin already has
    /// a fork in the same repository.
    async fn insert_entity(
        &self,
        record: EntityRecord,
        first_version: NewVersion,
        supers: Vec<SuperLink>,
    ) -> Result<Version>;
    /// Remove an entity with all its versions, annotations and relations. Forks of it lose
    /// their origin, versions equivalent to its versions lose that link.
    async fn delete_entity(&self, id: &Id) -> Result<bool>;
    /// Entity in `repository_id` that was forked from `origin_id`.
    async fn find_fork(&self, origin_id: &Id, repository_id: &Id) -> Result<Option<EntityRecord>>;
    /// Every entity forked from `origin_id`, in any repository.
    async fn list_forks(&self, origin_id: &Id) -> Result<Vec<EntityRecord>>;
}

/// Entry points that mutate a version chain. Each call is one atomic transition.
#[async_trait::async_trait]
pub trait VersionStore: Send + Sync {
    async fn get_chain(&self, entity_id: &Id) -> Result<Option<VersionChain>>;
    /// Append a version. `Some(supers)` also replaces the superclasses the entity has in its own
    /// repository, in the same transition.
    async fn append_version(
        &self,
        entity_id: &Id,
        draft: NewVersion,
        make_current: bool,
        supers: Option<Vec<SuperLink>>,
    ) -> Result<Version>;
    async fn set_current_version(&self, entity_id: &Id, version: i32) -> Result<Version>;
    async fn hide_version(&self, entity_id: &Id, version: i32) -> Result<Version>;
    /// Splice a non-current version out of its chain and delete it with its annotations and
    /// expressions. Versions equivalent to it lose that link.
    async fn remove_version(&self, entity_id: &Id, version: i32) -> Result<Version>;
}

#[async_trait::async_trait]
pub trait AnnotationStore: Send + Sync {
    /// Replace the top-level annotations of one property on one version.
    async fn replace_annotations(
        &self,
        entity_id: &Id,
        version: i32,
        property: &str,
        values: Vec<(AnnotationValue, Option<String>)>,
    ) -> Result<Vec<Annotation>>;
    /// Delete every annotation of a version, nested annotations first. Returns how many were
    /// removed.
    async fn delete_annotations(&self, entity_id: &Id, version: i32) -> Result<usize>;
}

#[async_trait::async_trait]
pub trait HierarchyStore: Send + Sync {
    /// Every subclass relation declared by a repository.
    async fn list_relations(&self, repository_id: &Id) -> Result<Vec<SubclassRelation>>;
    /// Replace the superclasses `entity_id` has in the scope of `repository_id`.
    async fn replace_super_entities(
        &self,
        entity_id: &Id,
        repository_id: &Id,
        supers: Vec<SuperLink>,
    ) -> Result<()>;
}

pub trait Store:
    RepositoryStore + EntityStore + VersionStore + AnnotationStore + HierarchyStore + Send + Sync
{
}
