use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OntologyError, Result};
use crate::model::{
    AnnotationArena, AnnotationValue, Expression, Id, LocalisableText, NewVersion, Version,
    VersionRef, DESCRIPTION, SYNONYM, TITLE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Category,
    SinglePhenotype,
    CompositePhenotype,
    /// Requires a super phenotype and never has super categories
    RestrictedPhenotype,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Category => "category",
            EntityKind::SinglePhenotype => "single_phenotype",
            EntityKind::CompositePhenotype => "composite_phenotype",
            EntityKind::RestrictedPhenotype => "restricted_phenotype",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "category" => Some(EntityKind::Category),
            "single_phenotype" => Some(EntityKind::SinglePhenotype),
            "composite_phenotype" => Some(EntityKind::CompositePhenotype),
            "restricted_phenotype" => Some(EntityKind::RestrictedPhenotype),
            _ => None,
        }
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, EntityKind::RestrictedPhenotype)
    }
}

/// Identity row of an entity. Content lives in its [`crate::model::VersionChain`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub id: Id,
    pub repository_id: Id,
    pub kind: EntityKind,
    /// Entity this one was forked from
    pub origin_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

/// `entity_id IS_SUBCLASS_OF super_entity_id`, as declared by `repository_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubclassRelation {
    pub entity_id: Id,
    pub super_entity_id: Id,
    pub repository_id: Id,
    pub index: Option<i32>,
}

/// Superclass of an entity, without the repository scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperLink {
    pub super_entity_id: Id,
    pub index: Option<i32>,
}

/// Request body for creating or updating an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    #[serde(default)]
    pub id: Option<Id>,
    #[serde(default)]
    pub entity_type: Option<EntityKind>,
    #[serde(default)]
    pub titles: Vec<LocalisableText>,
    #[serde(default)]
    pub synonyms: Vec<LocalisableText>,
    #[serde(default)]
    pub descriptions: Vec<LocalisableText>,
    #[serde(default)]
    pub super_categories: Option<Vec<Id>>,
    #[serde(default)]
    pub super_phenotype: Option<Id>,
    #[serde(default)]
    pub index: Option<i32>,
    #[serde(default)]
    pub expressions: Vec<Expression>,
}

impl EntityData {
    pub fn kind(&self) -> Result<EntityKind> {
        self.entity_type
            .ok_or_else(|| OntologyError::bad_request("entityType is missing"))
    }

    /// Does the body say anything about superclasses of an entity of `kind`? An empty super
    /// category list clears a category's superclasses but is silent for a restricted phenotype.
    pub fn has_hierarchy_fields(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::RestrictedPhenotype => {
                self.super_phenotype.is_some()
                    || self.super_categories.as_ref().is_some_and(|c| !c.is_empty())
            }
            EntityKind::Category | EntityKind::SinglePhenotype | EntityKind::CompositePhenotype => {
                self.super_categories.is_some() || self.super_phenotype.is_some()
            }
        }
    }

    /// Superclasses named by the body, or `None` if it carries no hierarchy fields at all.
    /// Fails when the fields contradict the kind.
    pub fn super_links(&self, kind: EntityKind) -> Result<Option<Vec<SuperLink>>> {
        let categories = self.super_categories.as_deref().unwrap_or_default();
        match kind {
            EntityKind::RestrictedPhenotype => {
                if !categories.is_empty() {
                    return Err(OntologyError::bad_request(
                        "A restricted phenotype cannot have super categories",
                    ));
                }
                match &self.super_phenotype {
                    Some(parent) => Ok(Some(vec![SuperLink {
                        super_entity_id: parent.clone(),
                        index: self.index,
                    }])),
                    None => Err(OntologyError::bad_request(
                        "A restricted phenotype requires a super phenotype",
                    )),
                }
            }
            EntityKind::Category | EntityKind::SinglePhenotype | EntityKind::CompositePhenotype => {
                if self.super_phenotype.is_some() {
                    return Err(OntologyError::bad_request(format!(
                        "Only restricted phenotypes have a super phenotype, not {}",
                        kind.as_str()
                    )));
                }
                Ok(self.super_categories.as_ref().map(|ids| {
                    ids.iter()
                        .map(|id| SuperLink {
                            super_entity_id: id.clone(),
                            index: self.index,
                        })
                        .collect()
                }))
            }
        }
    }

    pub fn to_new_version(&self, author: Option<String>) -> NewVersion {
        let mut annotations = AnnotationArena::new();
        for (property, texts) in [
            (TITLE, &self.titles),
            (SYNONYM, &self.synonyms),
            (DESCRIPTION, &self.descriptions),
        ] {
            annotations.set_property(
                property,
                texts
                    .iter()
                    .map(|t| (AnnotationValue::String(t.text.clone()), t.lang.clone())),
            );
        }

        NewVersion {
            annotations,
            expressions: self.expressions.clone(),
            author,
            equivalent: None,
        }
    }
}

/// One version of an entity as handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: Id,
    pub repository_id: Id,
    pub entity_type: EntityKind,
    pub version: i32,
    pub current: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub titles: Vec<LocalisableText>,
    pub synonyms: Vec<LocalisableText>,
    pub descriptions: Vec<LocalisableText>,
    pub super_categories: Vec<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub super_phenotype: Option<Id>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
    pub expressions: Vec<Expression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equivalent_version: Option<VersionRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_id: Option<Id>,
}

impl Entity {
    /// `supers` are the relations declared by the entity's own repository, already ordered.
    pub fn assemble(
        record: &EntityRecord,
        version: &Version,
        current: Option<i32>,
        supers: &[SubclassRelation],
    ) -> Self {
        let (super_categories, super_phenotype) = match record.kind {
            EntityKind::RestrictedPhenotype => {
                (Vec::new(), supers.first().map(|r| r.super_entity_id.clone()))
            }
            EntityKind::Category | EntityKind::SinglePhenotype | EntityKind::CompositePhenotype => (
                supers.iter().map(|r| r.super_entity_id.clone()).collect(),
                None,
            ),
        };

        Self {
            id: record.id.clone(),
            repository_id: record.repository_id.clone(),
            entity_type: record.kind,
            version: version.version,
            current: current == Some(version.version),
            created_at: version.created_at,
            hidden_at: version.hidden_at,
            author: version.author.clone(),
            titles: version.annotations.localised_texts(TITLE),
            synonyms: version.annotations.localised_texts(SYNONYM),
            descriptions: version.annotations.localised_texts(DESCRIPTION),
            super_categories,
            super_phenotype,
            index: supers.first().and_then(|r| r.index),
            expressions: version.expressions.clone(),
            equivalent_version: version.equivalent.clone(),
            origin_id: record.origin_id.clone(),
        }
    }
}
