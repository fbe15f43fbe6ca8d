use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Id, LocalisableText};

pub const TITLE: &str = "title";
pub const SYNONYM: &str = "synonym";
pub const DESCRIPTION: &str = "description";

/// Value of an annotation. The variant is the datatype, so exactly one value is ever populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "datatype", content = "value", rename_all = "snake_case")]
pub enum AnnotationValue {
    String(String),
    DateTime(DateTime<Utc>),
    Number(f64),
    Boolean(bool),
    Class(Id),
}

impl AnnotationValue {
    pub fn datatype(&self) -> &'static str {
        match self {
            AnnotationValue::String(_) => "string",
            AnnotationValue::DateTime(_) => "date_time",
            AnnotationValue::Number(_) => "number",
            AnnotationValue::Boolean(_) => "boolean",
            AnnotationValue::Class(_) => "class",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnnotationValue::String(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub property: String,
    pub value: AnnotationValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
}

impl Annotation {
    pub fn text(property: &str, text: impl Into<String>, language: Option<String>) -> Self {
        Self {
            property: property.to_string(),
            value: AnnotationValue::String(text.into()),
            language,
            index: None,
        }
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.index = Some(index);
        self
    }

    pub fn datatype(&self) -> &'static str {
        self.value.datatype()
    }

    /// The annotation as display text. Only string values have one.
    pub fn localised(&self) -> Option<LocalisableText> {
        self.value.as_str().map(|text| LocalisableText {
            text: text.to_string(),
            lang: self.language.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationNode {
    pub annotation: Annotation,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Annotation tree of one version.
///
/// Nodes live in a flat slot vector and refer to each other by slot, so an annotation that is
/// itself annotated never needs a pointer back into its owner. Slots are never reused: a child
/// always has a higher slot than its parent, which lets backends insert rows in ascending slot
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationArena {
    slots: Vec<Option<AnnotationNode>>,
    roots: Vec<usize>,
}

impl AnnotationArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an arena from persisted `(slot, parent_slot, annotation)` rows.
    pub fn from_slots(rows: Vec<(usize, Option<usize>, Annotation)>) -> anyhow::Result<Self> {
        let size = rows.iter().map(|(slot, _, _)| slot + 1).max().unwrap_or(0);
        let mut arena = Self {
            slots: vec![None; size],
            roots: Vec::new(),
        };

        let mut rows = rows;
        rows.sort_by_key(|(slot, _, _)| *slot);
        for (slot, parent, annotation) in rows {
            if let Some(parent) = parent {
                let parent_node = arena
                    .slots
                    .get_mut(parent)
                    .and_then(Option::as_mut)
                    .ok_or_else(|| {
                        anyhow::anyhow!("annotation slot {} refers to missing parent {}", slot, parent)
                    })?;
                parent_node.children.push(slot);
            } else {
                arena.roots.push(slot);
            }
            arena.slots[slot] = Some(AnnotationNode {
                annotation,
                parent,
                children: Vec::new(),
            });
        }

        Ok(arena)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Annotation> {
        self.node(slot).map(|n| &n.annotation)
    }

    pub fn node(&self, slot: usize) -> Option<&AnnotationNode> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Live nodes in ascending slot order as `(slot, parent_slot, annotation)`.
    pub fn iter_slots(&self) -> impl Iterator<Item = (usize, Option<usize>, &Annotation)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, node)| node.as_ref().map(|n| (slot, n.parent, &n.annotation)))
    }

    /// Attach an annotation directly to the version.
    pub fn add(&mut self, annotation: Annotation) -> usize {
        let slot = self.slots.len();
        self.slots.push(Some(AnnotationNode {
            annotation,
            parent: None,
            children: Vec::new(),
        }));
        self.roots.push(slot);
        slot
    }

    /// Annotate an existing annotation. Returns `None` if `parent` is not a live slot.
    pub fn add_child(&mut self, parent: usize, annotation: Annotation) -> Option<usize> {
        let slot = self.slots.len();
        let parent_node = self.slots.get_mut(parent)?.as_mut()?;
        parent_node.children.push(slot);
        self.slots.push(Some(AnnotationNode {
            annotation,
            parent: Some(parent),
            children: Vec::new(),
        }));
        Some(slot)
    }

    /// Top-level annotations of one property, ordered by their index. Unindexed ones come last
    /// in insertion order.
    pub fn by_property(&self, property: &str) -> Vec<&Annotation> {
        let mut found: Vec<&Annotation> = self
            .roots
            .iter()
            .filter_map(|slot| self.get(*slot))
            .filter(|a| a.property == property)
            .collect();
        found.sort_by_key(|a| (a.index.is_none(), a.index));
        found
    }

    pub fn localised_texts(&self, property: &str) -> Vec<LocalisableText> {
        self.by_property(property)
            .into_iter()
            .filter_map(Annotation::localised)
            .collect()
    }

    /// Replace every top-level annotation of `property`. Old ones are removed together with
    /// their nested annotations, new ones get their position as index. Returns the removed slots.
    pub fn set_property<I>(&mut self, property: &str, values: I) -> Vec<usize>
    where
        I: IntoIterator<Item = (AnnotationValue, Option<String>)>,
    {
        let stale: Vec<usize> = self
            .roots
            .iter()
            .copied()
            .filter(|slot| self.get(*slot).is_some_and(|a| a.property == property))
            .collect();

        let mut removed = Vec::new();
        for slot in stale {
            removed.extend(self.remove_recursive(slot));
        }

        for (position, (value, language)) in values.into_iter().enumerate() {
            self.add(Annotation {
                property: property.to_string(),
                value,
                language,
                index: Some(position as i32),
            });
        }

        removed
    }

    /// Remove a node and everything nested below it. The returned slots are in deletion order:
    /// every descendant comes before its ancestor.
    pub fn remove_recursive(&mut self, slot: usize) -> Vec<usize> {
        let Some(node) = self.node(slot) else {
            return Vec::new();
        };
        let parent = node.parent;

        let mut visit = Vec::new();
        let mut stack = vec![slot];
        while let Some(current) = stack.pop() {
            visit.push(current);
            if let Some(n) = self.node(current) {
                stack.extend(n.children.iter().copied());
            }
        }
        visit.reverse();

        for removed in &visit {
            self.slots[*removed] = None;
        }
        match parent {
            Some(parent) => {
                if let Some(p) = self.slots.get_mut(parent).and_then(Option::as_mut) {
                    p.children.retain(|c| *c != slot);
                }
            }
            None => self.roots.retain(|r| *r != slot),
        }

        visit
    }

    /// Remove every annotation, nested ones first.
    pub fn clear(&mut self) -> Vec<usize> {
        let roots = self.roots.clone();
        roots
            .into_iter()
            .flat_map(|root| self.remove_recursive(root))
            .collect()
    }
}
