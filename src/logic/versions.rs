use crate::error::{OntologyError, Result};
use crate::model::{Id, NewVersion, SuperLink, Version, VersionChain};
use crate::store::traits::Store;

/// Entry points to an entity's version chain.
pub struct VersionOperations;

impl VersionOperations {
    pub async fn load_chain<S: Store>(store: &S, entity_id: &Id) -> Result<VersionChain> {
        store
            .get_chain(entity_id)
            .await?
            .ok_or_else(|| OntologyError::not_found(format!("Entity '{}' does not exist", entity_id)))
    }

    /// `None` selects the current version. The chain's current version number comes along so
    /// callers can tell whether the selected version is current.
    pub async fn get_version<S: Store>(
        store: &S,
        entity_id: &Id,
        version: Option<i32>,
    ) -> Result<(Version, Option<i32>)> {
        let chain = Self::load_chain(store, entity_id).await?;
        let selected = chain.resolve(version)?.clone();
        Ok((selected, chain.current_number()))
    }

    /// Append a version. `Some(supers)` replaces the entity's superclasses in the same step.
    pub async fn create_version<S: Store>(
        store: &S,
        entity_id: &Id,
        draft: NewVersion,
        make_current: bool,
        supers: Option<Vec<SuperLink>>,
    ) -> Result<Version> {
        let relinked = supers.is_some();
        let version = store
            .append_version(entity_id, draft, make_current, supers)
            .await?;
        log::info!(
            "Created version {} of entity '{}'{}{}",
            version.version,
            entity_id,
            if make_current { " as current" } else { "" },
            if relinked { " with new superclasses" } else { "" }
        );
        Ok(version)
    }

    /// Newest first, with the chain's current version number.
    pub async fn list_versions<S: Store>(
        store: &S,
        entity_id: &Id,
    ) -> Result<(Vec<Version>, Option<i32>)> {
        let chain = Self::load_chain(store, entity_id).await?;
        let versions = chain.list_desc().into_iter().cloned().collect();
        Ok((versions, chain.current_number()))
    }

    pub async fn set_current<S: Store>(store: &S, entity_id: &Id, version: i32) -> Result<Version> {
        let selected = store.set_current_version(entity_id, version).await?;
        log::info!("Version {} of entity '{}' is now current", version, entity_id);
        Ok(selected)
    }

    pub async fn hide<S: Store>(store: &S, entity_id: &Id, version: i32) -> Result<Version> {
        let hidden = store.hide_version(entity_id, version).await?;
        log::info!("Hid version {} of entity '{}'", version, entity_id);
        Ok(hidden)
    }

    pub async fn delete_permanently<S: Store>(
        store: &S,
        entity_id: &Id,
        version: i32,
    ) -> Result<Version> {
        let removed = store.remove_version(entity_id, version).await?;
        log::info!("Deleted version {} of entity '{}'", version, entity_id);
        Ok(removed)
    }
}
