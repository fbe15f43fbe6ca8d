//! Forking entities from a primary repository into another repository.
//!
//! A fork is an entity in the destination whose record names the forked entity as its origin and
//! whose versions point back at the origin version they were copied from. Each call processes
//! its origin set parents first. Entities that are already up to date, or whose parent has no
//! fork in the destination, are skipped without failing the call.

use chrono::Utc;
use std::collections::{HashMap, HashSet};

use crate::error::{OntologyError, Result};
use crate::logic::hierarchy::HierarchyIndex;
use crate::logic::versions::VersionOperations;
use crate::model::{
    generate_id, Entity, EntityRecord, ForkingInstruction, Id, NewVersion, Repository, SuperLink,
    UserContext, Version, VersionChain,
};
use crate::store::traits::Store;

/// What happened to one member of the origin set.
#[derive(Debug, Clone, PartialEq)]
pub enum ForkOutcome {
    Created { origin_id: Id, fork_id: Id },
    Updated { origin_id: Id, fork_id: Id, version: i32 },
    Skipped { origin_id: Id, reason: String },
}

impl ForkOutcome {
    fn fork_id(&self) -> Option<&Id> {
        match self {
            ForkOutcome::Created { fork_id, .. } | ForkOutcome::Updated { fork_id, .. } => {
                Some(fork_id)
            }
            ForkOutcome::Skipped { .. } => None,
        }
    }
}

struct ForkContext<'a, S: Store> {
    store: &'a S,
    destination: &'a Repository,
    origin_index: &'a HierarchyIndex,
    update: bool,
    author: Option<String>,
    /// Origin set of this call. Only superclasses inside it are carried over.
    members: HashSet<Id>,
    /// origin id -> fork id in the destination, for forks produced or found during this call
    forks: HashMap<Id, Id>,
}

impl<'a, S: Store> ForkContext<'a, S> {
    async fn fork_of(&mut self, origin_id: &Id) -> Result<Option<Id>> {
        if let Some(fork_id) = self.forks.get(origin_id) {
            return Ok(Some(fork_id.clone()));
        }
        let found = self
            .store
            .find_fork(origin_id, &self.destination.id)
            .await?
            .map(|r| r.id);
        if let Some(fork_id) = &found {
            self.forks.insert(origin_id.clone(), fork_id.clone());
        }
        Ok(found)
    }

    fn skip(origin_id: &Id, reason: impl Into<String>) -> ForkOutcome {
        let reason = reason.into();
        log::debug!("Skipping fork of '{}': {}", origin_id, reason);
        ForkOutcome::Skipped {
            origin_id: origin_id.clone(),
            reason,
        }
    }

    /// Destination superclasses for a newly created fork. Only origin superclasses that belong to
    /// this call's origin set are remapped, so the entity the call started from is rootless.
    /// `None` means the entity cannot be forked yet.
    async fn remapped_supers(&mut self, origin: &EntityRecord) -> Result<Option<Vec<SuperLink>>> {
        let relations: Vec<_> = self
            .origin_index
            .supers_of(&origin.id)
            .iter()
            .filter(|r| self.members.contains(&r.super_entity_id))
            .cloned()
            .collect();

        if origin.kind.is_restricted() {
            let Some(parent) = relations.first() else {
                return Ok(None);
            };
            return Ok(self.fork_of(&parent.super_entity_id).await?.map(|fork_id| {
                vec![SuperLink {
                    super_entity_id: fork_id,
                    index: parent.index,
                }]
            }));
        }

        let mut links = Vec::with_capacity(relations.len());
        for relation in relations {
            if let Some(fork_id) = self.fork_of(&relation.super_entity_id).await? {
                links.push(SuperLink {
                    super_entity_id: fork_id,
                    index: relation.index,
                });
            }
        }
        Ok(Some(links))
    }

    fn draft(&self, origin_current: &Version) -> NewVersion {
        NewVersion {
            equivalent: Some(origin_current.to_ref()),
            ..NewVersion::copy_of(origin_current, self.author.clone())
        }
    }

    async fn fork_one(&mut self, origin_id: &Id) -> Result<ForkOutcome> {
        let Some(origin) = self.store.get_entity(origin_id).await? else {
            return Ok(Self::skip(origin_id, "origin no longer exists"));
        };
        let origin_chain = VersionOperations::load_chain(self.store, origin_id).await?;
        let Some(origin_current) = origin_chain.current() else {
            return Ok(Self::skip(origin_id, "origin has no current version"));
        };

        match self.store.find_fork(origin_id, &self.destination.id).await? {
            Some(existing) => {
                self.forks.insert(origin_id.clone(), existing.id.clone());
                if !self.update {
                    return Ok(Self::skip(origin_id, "already forked"));
                }
                let fork_chain = VersionOperations::load_chain(self.store, &existing.id).await?;
                self.update_existing(&origin, origin_current, &existing, &fork_chain)
                    .await
            }
            None => self.create_new(&origin, origin_current).await,
        }
    }

    /// Append a copy of the origin's current version to an existing fork. The destination's own
    /// superclasses are kept, except that a restricted phenotype follows its parent's fork.
    async fn update_existing(
        &mut self,
        origin: &EntityRecord,
        origin_current: &Version,
        existing: &EntityRecord,
        fork_chain: &VersionChain,
    ) -> Result<ForkOutcome> {
        if fork_chain
            .current()
            .is_some_and(|current| current.is_equivalent_to(origin_current))
        {
            return Ok(Self::skip(&origin.id, "fork is up to date"));
        }

        let restricted_parent = if origin.kind.is_restricted() {
            match self.remapped_supers(origin).await? {
                Some(links) => Some(links),
                None => {
                    log::warn!(
                        "Cannot update fork '{}': super phenotype of '{}' has no fork in '{}'",
                        existing.id,
                        origin.id,
                        self.destination.id
                    );
                    return Ok(Self::skip(&origin.id, "super phenotype is not forked"));
                }
            }
        } else {
            None
        };

        let version = VersionOperations::create_version(
            self.store,
            &existing.id,
            self.draft(origin_current),
            true,
            restricted_parent,
        )
        .await?;

        log::info!(
            "Updated fork '{}' of '{}' to version {}",
            existing.id,
            origin.id,
            version.version
        );
        Ok(ForkOutcome::Updated {
            origin_id: origin.id.clone(),
            fork_id: existing.id.clone(),
            version: version.version,
        })
    }

    async fn create_new(
        &mut self,
        origin: &EntityRecord,
        origin_current: &Version,
    ) -> Result<ForkOutcome> {
        let Some(supers) = self.remapped_supers(origin).await? else {
            log::warn!(
                "Cannot fork '{}' into '{}': its super phenotype has no fork there",
                origin.id,
                self.destination.id
            );
            return Ok(Self::skip(&origin.id, "super phenotype is not forked"));
        };

        let record = EntityRecord {
            id: generate_id(),
            repository_id: self.destination.id.clone(),
            kind: origin.kind,
            origin_id: Some(origin.id.clone()),
            created_at: Utc::now(),
        };
        let fork_id = record.id.clone();

        match self
            .store
            .insert_entity(record, self.draft(origin_current), supers)
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                log::warn!(
                    "Fork of '{}' into '{}' lost a race: {}",
                    origin.id,
                    self.destination.id,
                    e
                );
                return Ok(Self::skip(&origin.id, "forked concurrently"));
            }
            Err(e) => return Err(e),
        }

        self.forks.insert(origin.id.clone(), fork_id.clone());
        log::info!(
            "Forked '{}' into repository '{}' as '{}'",
            origin.id,
            self.destination.id,
            fork_id
        );
        Ok(ForkOutcome::Created {
            origin_id: origin.id.clone(),
            fork_id,
        })
    }
}

pub struct ForkEngine;

impl ForkEngine {
    /// Ordered list of entities to fork for `origin`: a restricted phenotype brings its super
    /// phenotype along, anything else brings its transitive subclasses when cascading.
    pub fn origin_set(origin: &EntityRecord, index: &HierarchyIndex, cascade: bool) -> Vec<Id> {
        if origin.kind.is_restricted() {
            let mut set: Vec<Id> = index
                .supers_of(&origin.id)
                .first()
                .map(|r| vec![r.super_entity_id.clone()])
                .unwrap_or_default();
            set.push(origin.id.clone());
            return set;
        }

        let mut set = vec![origin.id.clone()];
        if cascade {
            set.extend(index.cascade(&origin.id));
        }
        index.parents_first(set)
    }

    /// Fork `origin_id`, owned by `origin_repository`, as instructed. Every precondition is
    /// checked before anything is written.
    pub async fn create_fork<S: Store>(
        store: &S,
        origin_repository: &Repository,
        origin_id: &Id,
        instruction: &ForkingInstruction,
        user: &UserContext,
    ) -> Result<Vec<ForkOutcome>> {
        if instruction.repository_id == origin_repository.id {
            return Err(OntologyError::not_acceptable(
                "Cannot fork an entity into its own repository",
            ));
        }
        if !origin_repository.primary {
            return Err(OntologyError::not_acceptable(
                "Cannot fork from non-primary repository",
            ));
        }
        let destination = store
            .resolve_repository(&instruction.organisation_id, &instruction.repository_id)
            .await?
            .ok_or_else(|| {
                OntologyError::not_found(format!(
                    "Repository '{}' not found in organisation '{}'",
                    instruction.repository_id, instruction.organisation_id
                ))
            })?;
        let origin = store
            .get_entity(origin_id)
            .await?
            .filter(|r| r.repository_id == origin_repository.id)
            .ok_or_else(|| {
                OntologyError::not_found(format!(
                    "Entity '{}' not found in repository '{}'",
                    origin_id, origin_repository.id
                ))
            })?;

        let origin_index = HierarchyIndex::load(store, &origin_repository.id).await?;
        let set = Self::origin_set(&origin, &origin_index, instruction.cascade);
        log::info!(
            "Forking {} entities from '{}' into '{}' (update: {})",
            set.len(),
            origin_repository.id,
            destination.id,
            instruction.update
        );

        let mut context = ForkContext {
            store,
            destination: &destination,
            origin_index: &origin_index,
            update: instruction.update,
            author: user.author(),
            members: set.iter().cloned().collect(),
            forks: HashMap::new(),
        };

        let mut outcomes = Vec::with_capacity(set.len());
        for member in &set {
            outcomes.push(context.fork_one(member).await?);
        }
        Ok(outcomes)
    }

    /// Destination entities produced by a fork call, in processing order.
    pub async fn fork_results<S: Store>(
        store: &S,
        destination_id: &Id,
        outcomes: &[ForkOutcome],
    ) -> Result<Vec<Entity>> {
        let index = HierarchyIndex::load(store, destination_id).await?;
        let mut entities = Vec::new();
        for fork_id in outcomes.iter().filter_map(ForkOutcome::fork_id) {
            let Some(record) = store.get_entity(fork_id).await? else {
                continue;
            };
            let chain = VersionOperations::load_chain(store, fork_id).await?;
            let current = chain.resolve(None)?;
            entities.push(Entity::assemble(
                &record,
                current,
                chain.current_number(),
                index.supers_of(fork_id),
            ));
        }
        Ok(entities)
    }
}
