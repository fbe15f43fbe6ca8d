use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgConnection, PgPool, Row,
};
use std::collections::{HashMap, HashSet};

use crate::error::{OntologyError, Result};
use crate::model::{
    Annotation, AnnotationArena, AnnotationValue, EntityKind, EntityRecord, Id, NewVersion,
    Organisation, Repository, SubclassRelation, SuperLink, Version, VersionChain, VersionRef,
};
use crate::store::traits::{
    AnnotationStore, EntityStore, HierarchyStore, RepositoryStore, Store, VersionStore,
};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

const VERSION_COLUMNS: &str = "entity_id, version, created_at, hidden_at, author, previous_version, \
     next_version, expressions, equivalent_entity_id, equivalent_version";

const ENTITY_COLUMNS: &str = "id, repository_id, kind, origin_id, created_at";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Unique violations become `Conflict`, missing foreign rows become `NotFound`.
fn classify(err: sqlx::Error, context: &str) -> OntologyError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(UNIQUE_VIOLATION) => {
                return OntologyError::conflict(format!("{}: {}", context, db.message()))
            }
            Some(FOREIGN_KEY_VIOLATION) => {
                return OntologyError::not_found(format!("{}: {}", context, db.message()))
            }
            _ => {}
        }
    }
    OntologyError::Storage(anyhow::Error::new(err).context(context.to_string()))
}

fn slot_to_db(slot: usize) -> Result<i32> {
    Ok(i32::try_from(slot).context("annotation slot out of range")?)
}

fn slot_from_db(slot: i32) -> Result<usize> {
    Ok(usize::try_from(slot).context("negative annotation slot")?)
}

fn record_from_row(row: &PgRow) -> Result<EntityRecord> {
    let kind: String = row.get("kind");
    let kind = EntityKind::parse(&kind).ok_or_else(|| anyhow!("Unknown entity kind '{}'", kind))?;
    Ok(EntityRecord {
        id: row.get("id"),
        repository_id: row.get("repository_id"),
        kind,
        origin_id: row.get("origin_id"),
        created_at: row.get("created_at"),
    })
}

fn repository_from_row(row: &PgRow) -> Repository {
    Repository {
        id: row.get("id"),
        organisation_id: row.get("organisation_id"),
        name: row.get("name"),
        description: row.get("description"),
        primary: row.get("is_primary"),
        created_at: row.get("created_at"),
    }
}

fn annotation_from_row(row: &PgRow) -> Result<(i32, usize, Option<usize>, Annotation)> {
    let version: i32 = row.get("version");
    let slot = slot_from_db(row.get("slot"))?;
    let parent = row
        .get::<Option<i32>, _>("parent_slot")
        .map(slot_from_db)
        .transpose()?;
    let datatype: String = row.get("datatype");

    let value = match datatype.as_str() {
        "string" => row
            .get::<Option<String>, _>("string_value")
            .map(AnnotationValue::String),
        "date_time" => row
            .get::<Option<DateTime<Utc>>, _>("date_value")
            .map(AnnotationValue::DateTime),
        "number" => row
            .get::<Option<f64>, _>("number_value")
            .map(AnnotationValue::Number),
        "boolean" => row
            .get::<Option<bool>, _>("boolean_value")
            .map(AnnotationValue::Boolean),
        "class" => row
            .get::<Option<String>, _>("class_value")
            .map(AnnotationValue::Class),
        _ => None,
    }
    .ok_or_else(|| anyhow!("Annotation slot {} has no {} value", slot, datatype))?;

    Ok((
        version,
        slot,
        parent,
        Annotation {
            property: row.get("property"),
            value,
            language: row.get("language"),
            index: row.get("idx"),
        },
    ))
}

/// Lock the entity row for the rest of the transaction and return its current-version pointer.
async fn lock_entity(conn: &mut PgConnection, entity_id: &Id) -> Result<Option<i32>> {
    let row = sqlx::query("SELECT current_version FROM entities WHERE id = $1 FOR UPDATE")
        .bind(entity_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to lock entity")?;

    match row {
        Some(row) => Ok(row.get("current_version")),
        None => Err(OntologyError::not_found(format!(
            "Entity '{}' does not exist",
            entity_id
        ))),
    }
}

async fn load_chain(
    conn: &mut PgConnection,
    entity_id: &Id,
    current: Option<i32>,
) -> Result<VersionChain> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM entity_versions WHERE entity_id = $1 ORDER BY version",
        VERSION_COLUMNS
    ))
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load versions")?;

    let annotation_rows = sqlx::query(
        "SELECT version, slot, parent_slot, property, datatype, string_value, date_value, \
         number_value, boolean_value, class_value, language, idx \
         FROM annotations WHERE entity_id = $1",
    )
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load annotations")?;

    let mut annotations: HashMap<i32, Vec<(usize, Option<usize>, Annotation)>> = HashMap::new();
    for row in &annotation_rows {
        let (version, slot, parent, annotation) = annotation_from_row(row)?;
        annotations
            .entry(version)
            .or_default()
            .push((slot, parent, annotation));
    }

    let mut versions = Vec::with_capacity(rows.len());
    for row in rows {
        let number: i32 = row.get("version");
        let expressions: serde_json::Value = row.get("expressions");
        let equivalent = match (
            row.get::<Option<String>, _>("equivalent_entity_id"),
            row.get::<Option<i32>, _>("equivalent_version"),
        ) {
            (Some(id), Some(version)) => Some(VersionRef::new(id, version)),
            _ => None,
        };

        versions.push(Version {
            entity_id: row.get("entity_id"),
            version: number,
            created_at: row.get("created_at"),
            hidden_at: row.get("hidden_at"),
            author: row.get("author"),
            previous_version: row.get("previous_version"),
            next_version: row.get("next_version"),
            annotations: AnnotationArena::from_slots(
                annotations.remove(&number).unwrap_or_default(),
            )?,
            expressions: serde_json::from_value(expressions)
                .context("Failed to decode version expressions")?,
            equivalent,
        });
    }

    Ok(VersionChain::from_parts(entity_id.clone(), current, versions)?)
}

async fn insert_annotation(
    conn: &mut PgConnection,
    version: &Version,
    slot: usize,
    parent: Option<usize>,
    annotation: &Annotation,
) -> Result<()> {
    let mut string_value: Option<String> = None;
    let mut date_value: Option<DateTime<Utc>> = None;
    let mut number_value: Option<f64> = None;
    let mut boolean_value: Option<bool> = None;
    let mut class_value: Option<String> = None;
    match &annotation.value {
        AnnotationValue::String(v) => string_value = Some(v.clone()),
        AnnotationValue::DateTime(v) => date_value = Some(*v),
        AnnotationValue::Number(v) => number_value = Some(*v),
        AnnotationValue::Boolean(v) => boolean_value = Some(*v),
        AnnotationValue::Class(v) => class_value = Some(v.clone()),
    }

    sqlx::query(
        r#"
        INSERT INTO annotations (entity_id, version, slot, parent_slot, property, datatype,
                                 string_value, date_value, number_value, boolean_value,
                                 class_value, language, idx)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(&version.entity_id)
    .bind(version.version)
    .bind(slot_to_db(slot)?)
    .bind(parent.map(slot_to_db).transpose()?)
    .bind(&annotation.property)
    .bind(annotation.datatype())
    .bind(string_value)
    .bind(date_value)
    .bind(number_value)
    .bind(boolean_value)
    .bind(class_value)
    .bind(&annotation.language)
    .bind(annotation.index)
    .execute(&mut *conn)
    .await
    .context("Failed to insert annotation")?;

    Ok(())
}

/// Delete annotation rows one by one in the given order, which must list children first.
async fn delete_annotation_slots(
    conn: &mut PgConnection,
    entity_id: &Id,
    version: i32,
    slots: &[usize],
) -> Result<()> {
    for slot in slots {
        sqlx::query("DELETE FROM annotations WHERE entity_id = $1 AND version = $2 AND slot = $3")
            .bind(entity_id)
            .bind(version)
            .bind(slot_to_db(*slot)?)
            .execute(&mut *conn)
            .await
            .context("Failed to delete annotation")?;
    }
    Ok(())
}

async fn insert_version(conn: &mut PgConnection, version: &Version) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO entity_versions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        VERSION_COLUMNS
    ))
    .bind(&version.entity_id)
    .bind(version.version)
    .bind(version.created_at)
    .bind(version.hidden_at)
    .bind(&version.author)
    .bind(version.previous_version)
    .bind(version.next_version)
    .bind(serde_json::Value::Array(version.expressions.clone()))
    .bind(version.equivalent.as_ref().map(|e| e.entity_id.clone()))
    .bind(version.equivalent.as_ref().map(|e| e.version))
    .execute(&mut *conn)
    .await
    .map_err(|e| classify(e, "Failed to insert version"))?;

    for (slot, parent, annotation) in version.annotations.iter_slots() {
        insert_annotation(conn, version, slot, parent, annotation).await?;
    }
    Ok(())
}

/// Persist the mutable columns of a version: chain links, hide marker, equivalence.
async fn update_version_state(conn: &mut PgConnection, version: &Version) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE entity_versions
        SET previous_version = $3, next_version = $4, hidden_at = $5,
            equivalent_entity_id = $6, equivalent_version = $7
        WHERE entity_id = $1 AND version = $2
        "#,
    )
    .bind(&version.entity_id)
    .bind(version.version)
    .bind(version.previous_version)
    .bind(version.next_version)
    .bind(version.hidden_at)
    .bind(version.equivalent.as_ref().map(|e| e.entity_id.clone()))
    .bind(version.equivalent.as_ref().map(|e| e.version))
    .execute(&mut *conn)
    .await
    .context("Failed to update version")?;
    Ok(())
}

async fn set_current_pointer(conn: &mut PgConnection, entity_id: &Id, version: i32) -> Result<()> {
    sqlx::query("UPDATE entities SET current_version = $2 WHERE id = $1")
        .bind(entity_id)
        .bind(version)
        .execute(&mut *conn)
        .await
        .context("Failed to set current version")?;
    Ok(())
}

async fn insert_relations(
    conn: &mut PgConnection,
    entity_id: &Id,
    repository_id: &Id,
    supers: Vec<SuperLink>,
) -> Result<()> {
    for link in supers {
        sqlx::query(
            r#"
            INSERT INTO subclass_relations (entity_id, super_entity_id, repository_id, idx)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (entity_id, super_entity_id, repository_id) DO UPDATE SET idx = EXCLUDED.idx
            "#,
        )
        .bind(entity_id)
        .bind(&link.super_entity_id)
        .bind(repository_id)
        .bind(link.index)
        .execute(&mut *conn)
        .await
        .context("Failed to insert subclass relation")?;
    }
    Ok(())
}

async fn replace_relations(
    conn: &mut PgConnection,
    entity_id: &Id,
    repository_id: &Id,
    supers: Vec<SuperLink>,
) -> Result<()> {
    sqlx::query("DELETE FROM subclass_relations WHERE entity_id = $1 AND repository_id = $2")
        .bind(entity_id)
        .bind(repository_id)
        .execute(&mut *conn)
        .await
        .context("Failed to clear subclass relations")?;
    insert_relations(conn, entity_id, repository_id, supers).await
}

#[async_trait::async_trait]
impl RepositoryStore for PostgresStore {
    async fn resolve_repository(
        &self,
        organisation_id: &Id,
        repository_id: &Id,
    ) -> Result<Option<Repository>> {
        let row = sqlx::query(
            r#"
            WITH RECURSIVE ancestors (id) AS (
                SELECT organisation_id FROM repositories WHERE id = $1
                UNION
                SELECT o.super_organisation_id
                FROM organisations o JOIN ancestors a ON o.id = a.id
                WHERE o.super_organisation_id IS NOT NULL
            )
            SELECT id, organisation_id, name, description, is_primary, created_at
            FROM repositories
            WHERE id = $1 AND EXISTS (SELECT 1 FROM ancestors WHERE id = $2)
            "#,
        )
        .bind(repository_id)
        .bind(organisation_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to resolve repository")?;

        Ok(row.as_ref().map(repository_from_row))
    }

    async fn get_repository(&self, repository_id: &Id) -> Result<Option<Repository>> {
        let row = sqlx::query(
            "SELECT id, organisation_id, name, description, is_primary, created_at \
             FROM repositories WHERE id = $1",
        )
        .bind(repository_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch repository")?;

        Ok(row.as_ref().map(repository_from_row))
    }

    async fn upsert_organisation(&self, organisation: Organisation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO organisations (id, name, description, super_organisation_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                super_organisation_id = EXCLUDED.super_organisation_id
            "#,
        )
        .bind(&organisation.id)
        .bind(&organisation.name)
        .bind(&organisation.description)
        .bind(&organisation.super_organisation_id)
        .bind(organisation.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, "Failed to upsert organisation"))?;

        Ok(())
    }

    async fn upsert_repository(&self, repository: Repository) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO repositories (id, organisation_id, name, description, is_primary, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                organisation_id = EXCLUDED.organisation_id,
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                is_primary = EXCLUDED.is_primary
            "#,
        )
        .bind(&repository.id)
        .bind(&repository.organisation_id)
        .bind(&repository.name)
        .bind(&repository.description)
        .bind(repository.primary)
        .bind(repository.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, "Failed to upsert repository"))?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityStore for PostgresStore {
    async fn entity_exists(&self, id: &Id) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE id = $1")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check entity existence")?;

        Ok(count > 0)
    }

    async fn get_entity(&self, id: &Id) -> Result<Option<EntityRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM entities WHERE id = $1", ENTITY_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch entity")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_entities(&self, repository_id: &Id) -> Result<Vec<EntityRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM entities WHERE repository_id = $1 ORDER BY created_at, id",
            ENTITY_COLUMNS
        ))
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list entities")?;

        rows.iter().map(record_from_row).collect()
    }

    async fn count_entities(&self, repository_id: &Id) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE repository_id = $1")
            .bind(repository_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count entities")?;

        Ok(usize::try_from(count).context("negative entity count")?)
    }

    async fn insert_entity(
        &self,
        record: EntityRecord,
        first_version: NewVersion,
        supers: Vec<SuperLink>,
    ) -> Result<Version> {
        let mut chain = VersionChain::new(record.id.clone());
        let version = chain.append(first_version, true, Utc::now()).clone();

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO entities (id, repository_id, kind, origin_id, current_version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&record.id)
        .bind(&record.repository_id)
        .bind(record.kind.as_str())
        .bind(&record.origin_id)
        .bind(version.version)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| classify(e, "Failed to insert entity"))?;

        insert_version(&mut tx, &version).await?;
        insert_relations(&mut tx, &record.id, &record.repository_id, supers).await?;

        tx.commit().await.context("Failed to commit entity")?;
        Ok(version)
    }

    async fn delete_entity(&self, id: &Id) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let current = match lock_entity(&mut tx, id).await {
            Ok(current) => current,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        let mut chain = load_chain(&mut tx, id, current).await?;

        let numbers: Vec<i32> = chain.list_desc().iter().map(|v| v.version).collect();
        for number in numbers {
            let order = chain.annotations_mut(number)?.clear();
            delete_annotation_slots(&mut tx, id, number, &order).await?;
        }

        sqlx::query("DELETE FROM entity_versions WHERE entity_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete versions")?;
        sqlx::query("DELETE FROM subclass_relations WHERE entity_id = $1 OR super_entity_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete subclass relations")?;
        sqlx::query("UPDATE entities SET origin_id = NULL WHERE origin_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to unlink forks")?;
        sqlx::query(
            "UPDATE entity_versions SET equivalent_entity_id = NULL, equivalent_version = NULL \
             WHERE equivalent_entity_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to unlink equivalent versions")?;
        sqlx::query("DELETE FROM entities WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete entity")?;

        tx.commit().await.context("Failed to commit entity deletion")?;
        Ok(true)
    }

    async fn find_fork(&self, origin_id: &Id, repository_id: &Id) -> Result<Option<EntityRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM entities WHERE origin_id = $1 AND repository_id = $2",
            ENTITY_COLUMNS
        ))
        .bind(origin_id)
        .bind(repository_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find fork")?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_forks(&self, origin_id: &Id) -> Result<Vec<EntityRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM entities WHERE origin_id = $1 ORDER BY created_at, id",
            ENTITY_COLUMNS
        ))
        .bind(origin_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list forks")?;

        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait::async_trait]
impl VersionStore for PostgresStore {
    async fn get_chain(&self, entity_id: &Id) -> Result<Option<VersionChain>> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;

        let row = sqlx::query("SELECT current_version FROM entities WHERE id = $1")
            .bind(entity_id)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch entity")?;
        let Some(row) = row else {
            return Ok(None);
        };

        let chain = load_chain(&mut conn, entity_id, row.get("current_version")).await?;
        Ok(Some(chain))
    }

    async fn append_version(
        &self,
        entity_id: &Id,
        draft: NewVersion,
        make_current: bool,
        supers: Option<Vec<SuperLink>>,
    ) -> Result<Version> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let current = lock_entity(&mut tx, entity_id).await?;
        let mut chain = load_chain(&mut tx, entity_id, current).await?;

        let old_tail = chain.tail().map(|t| t.version);
        let version = chain.append(draft, make_current, Utc::now()).clone();

        insert_version(&mut tx, &version).await?;
        if let Some(tail) = old_tail.and_then(|t| chain.get(t)) {
            update_version_state(&mut tx, tail).await?;
        }
        if make_current {
            set_current_pointer(&mut tx, entity_id, version.version).await?;
        }
        if let Some(supers) = supers {
            let repository_id: Id =
                sqlx::query_scalar("SELECT repository_id FROM entities WHERE id = $1")
                    .bind(entity_id)
                    .fetch_one(&mut *tx)
                    .await
                    .context("Failed to read entity repository")?;
            replace_relations(&mut tx, entity_id, &repository_id, supers).await?;
        }

        tx.commit().await.context("Failed to commit version")?;
        Ok(version)
    }

    async fn set_current_version(&self, entity_id: &Id, version: i32) -> Result<Version> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let current = lock_entity(&mut tx, entity_id).await?;
        let mut chain = load_chain(&mut tx, entity_id, current).await?;

        let selected = chain.set_current(version)?.clone();
        set_current_pointer(&mut tx, entity_id, version).await?;

        tx.commit().await.context("Failed to commit current version")?;
        Ok(selected)
    }

    async fn hide_version(&self, entity_id: &Id, version: i32) -> Result<Version> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let current = lock_entity(&mut tx, entity_id).await?;
        let mut chain = load_chain(&mut tx, entity_id, current).await?;

        let hidden = chain.hide(version, Utc::now())?.clone();
        update_version_state(&mut tx, &hidden).await?;

        tx.commit().await.context("Failed to commit hidden version")?;
        Ok(hidden)
    }

    async fn remove_version(&self, entity_id: &Id, version: i32) -> Result<Version> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let current = lock_entity(&mut tx, entity_id).await?;
        let mut chain = load_chain(&mut tx, entity_id, current).await?;

        let mut removed = chain.remove(version)?;
        let order = removed.annotations.clear();
        delete_annotation_slots(&mut tx, entity_id, version, &order).await?;

        sqlx::query("DELETE FROM entity_versions WHERE entity_id = $1 AND version = $2")
            .bind(entity_id)
            .bind(version)
            .execute(&mut *tx)
            .await
            .context("Failed to delete version")?;
        sqlx::query(
            "UPDATE entity_versions SET equivalent_entity_id = NULL, equivalent_version = NULL \
             WHERE equivalent_entity_id = $1 AND equivalent_version = $2",
        )
        .bind(entity_id)
        .bind(version)
        .execute(&mut *tx)
        .await
        .context("Failed to unlink equivalent versions")?;

        for neighbour in [removed.previous_version, removed.next_version]
            .into_iter()
            .flatten()
        {
            if let Some(neighbour) = chain.get(neighbour) {
                update_version_state(&mut tx, neighbour).await?;
            }
        }

        tx.commit().await.context("Failed to commit version removal")?;
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl AnnotationStore for PostgresStore {
    async fn replace_annotations(
        &self,
        entity_id: &Id,
        version: i32,
        property: &str,
        values: Vec<(AnnotationValue, Option<String>)>,
    ) -> Result<Vec<Annotation>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let current = lock_entity(&mut tx, entity_id).await?;
        let mut chain = load_chain(&mut tx, entity_id, current).await?;

        let arena = chain.annotations_mut(version)?;
        let before: HashSet<usize> = arena.iter_slots().map(|(slot, _, _)| slot).collect();
        let removed = arena.set_property(property, values);
        delete_annotation_slots(&mut tx, entity_id, version, &removed).await?;

        let arena = chain.annotations_mut(version)?.clone();
        let snapshot = chain.resolve(Some(version))?.clone();
        for (slot, parent, annotation) in arena.iter_slots() {
            if !before.contains(&slot) {
                insert_annotation(&mut tx, &snapshot, slot, parent, annotation).await?;
            }
        }

        tx.commit().await.context("Failed to commit annotations")?;
        Ok(arena.by_property(property).into_iter().cloned().collect())
    }

    async fn delete_annotations(&self, entity_id: &Id, version: i32) -> Result<usize> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let current = lock_entity(&mut tx, entity_id).await?;
        let mut chain = load_chain(&mut tx, entity_id, current).await?;

        let order = chain.annotations_mut(version)?.clear();
        delete_annotation_slots(&mut tx, entity_id, version, &order).await?;

        tx.commit().await.context("Failed to commit annotation deletion")?;
        Ok(order.len())
    }
}

#[async_trait::async_trait]
impl HierarchyStore for PostgresStore {
    async fn list_relations(&self, repository_id: &Id) -> Result<Vec<SubclassRelation>> {
        let rows = sqlx::query(
            r#"
            SELECT entity_id, super_entity_id, repository_id, idx
            FROM subclass_relations
            WHERE repository_id = $1
            ORDER BY idx NULLS LAST, entity_id
            "#,
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list subclass relations")?;

        Ok(rows
            .into_iter()
            .map(|row| SubclassRelation {
                entity_id: row.get("entity_id"),
                super_entity_id: row.get("super_entity_id"),
                repository_id: row.get("repository_id"),
                index: row.get("idx"),
            })
            .collect())
    }

    async fn replace_super_entities(
        &self,
        entity_id: &Id,
        repository_id: &Id,
        supers: Vec<SuperLink>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        lock_entity(&mut tx, entity_id).await?;
        replace_relations(&mut tx, entity_id, repository_id, supers).await?;

        tx.commit().await.context("Failed to commit subclass relations")?;
        Ok(())
    }
}

impl Store for PostgresStore {}
