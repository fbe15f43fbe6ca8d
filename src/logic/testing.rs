//! Fixtures shared by the logic tests.

use chrono::Utc;

use crate::model::{
    EntityData, EntityKind, EntityRecord, LocalisableText, Organisation, Repository, SuperLink,
};
use crate::store::{EntityStore, MemoryStore, RepositoryStore};

pub const ORG: &str = "org";
pub const PRIMARY: &str = "primary";
pub const DEST: &str = "dest";

/// Organisation `org` with the primary repository `primary` and the secondary `dest`.
pub async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store
        .upsert_organisation(Organisation::new(ORG, "Organisation"))
        .await
        .unwrap();
    store
        .upsert_repository(Repository::new(PRIMARY, ORG, true))
        .await
        .unwrap();
    store
        .upsert_repository(Repository::new(DEST, ORG, false))
        .await
        .unwrap();
    store
}

pub async fn entity_in(
    store: &MemoryStore,
    repository_id: &str,
    id: &str,
    kind: EntityKind,
    title: &str,
    supers: &[&str],
) -> EntityRecord {
    let record = EntityRecord {
        id: id.to_string(),
        repository_id: repository_id.to_string(),
        kind,
        origin_id: None,
        created_at: Utc::now(),
    };
    let data = EntityData {
        titles: vec![LocalisableText::new(title, Some("en"))],
        ..Default::default()
    };
    let links = supers
        .iter()
        .map(|parent| SuperLink {
            super_entity_id: parent.to_string(),
            index: Some(0),
        })
        .collect();
    store
        .insert_entity(record.clone(), data.to_new_version(Some("seed".to_string())), links)
        .await
        .unwrap();
    record
}

pub async fn category(store: &MemoryStore, id: &str, title: &str, supers: &[&str]) -> EntityRecord {
    entity_in(store, PRIMARY, id, EntityKind::Category, title, supers).await
}

pub async fn phenotype(store: &MemoryStore, id: &str, title: &str) -> EntityRecord {
    entity_in(store, PRIMARY, id, EntityKind::SinglePhenotype, title, &[]).await
}

pub async fn restricted(store: &MemoryStore, id: &str, title: &str, parent: &str) -> EntityRecord {
    entity_in(
        store,
        PRIMARY,
        id,
        EntityKind::RestrictedPhenotype,
        title,
        &[parent],
    )
    .await
}
