use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::error::{OntologyError, Result};
use crate::model::{AnnotationArena, Id, VersionRef};

/// Numbering starts here for every entity.
pub const FIRST_VERSION: i32 = 1;

/// Opaque expression payload carried by a version.
pub type Expression = serde_json::Value;

/// Snapshot of an entity. After creation only the chain links, the hide marker, the equivalence
/// link and the annotations are touched.
#[derive(Debug, Clone, PartialEq)]
pub struct Version {
    pub entity_id: Id,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub hidden_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub previous_version: Option<i32>,
    pub next_version: Option<i32>,
    pub annotations: AnnotationArena,
    pub expressions: Vec<Expression>,
    /// Fork counterpart of this version in another repository
    pub equivalent: Option<VersionRef>,
}

impl Version {
    pub fn is_hidden(&self) -> bool {
        self.hidden_at.is_some()
    }

    pub fn to_ref(&self) -> VersionRef {
        VersionRef::new(self.entity_id.clone(), self.version)
    }

    pub fn is_equivalent_to(&self, other: &Version) -> bool {
        self.equivalent.as_ref() == Some(&other.to_ref())
    }
}

/// Content of a version that is about to be appended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewVersion {
    pub annotations: AnnotationArena,
    pub expressions: Vec<Expression>,
    pub author: Option<String>,
    pub equivalent: Option<VersionRef>,
}

impl NewVersion {
    /// Copy the content of an existing version, e.g. to carry it into a fork.
    pub fn copy_of(version: &Version, author: Option<String>) -> Self {
        Self {
            annotations: version.annotations.clone(),
            expressions: version.expressions.clone(),
            author,
            equivalent: None,
        }
    }
}

/// Append-only version chain of one entity together with its current-version pointer.
///
/// Versions are doubly linked through `previous_version`/`next_version`. The pointer is a single
/// field, so there is never more than one current version.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionChain {
    entity_id: Id,
    current: Option<i32>,
    versions: BTreeMap<i32, Version>,
}

impl VersionChain {
    pub fn new(entity_id: impl Into<Id>) -> Self {
        Self {
            entity_id: entity_id.into(),
            current: None,
            versions: BTreeMap::new(),
        }
    }

    /// Rebuild a chain from persisted versions.
    pub fn from_parts(
        entity_id: impl Into<Id>,
        current: Option<i32>,
        versions: Vec<Version>,
    ) -> anyhow::Result<Self> {
        let entity_id = entity_id.into();
        let versions: BTreeMap<i32, Version> =
            versions.into_iter().map(|v| (v.version, v)).collect();

        if let Some(current) = current {
            if !versions.contains_key(&current) {
                anyhow::bail!(
                    "current version {} of entity '{}' is not part of its chain",
                    current,
                    entity_id
                );
            }
        }

        Ok(Self {
            entity_id,
            current,
            versions,
        })
    }

    pub fn entity_id(&self) -> &Id {
        &self.entity_id
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn current_number(&self) -> Option<i32> {
        self.current
    }

    pub fn current(&self) -> Option<&Version> {
        self.current.and_then(|n| self.versions.get(&n))
    }

    pub fn get(&self, version: i32) -> Option<&Version> {
        self.versions.get(&version)
    }

    /// `None` selects the current version.
    pub fn resolve(&self, version: Option<i32>) -> Result<&Version> {
        let selected = match version {
            Some(n) => self.versions.get(&n),
            None => self.current(),
        };
        selected.ok_or_else(|| match version {
            Some(n) => OntologyError::not_found(format!(
                "Version {} of entity '{}' does not exist",
                n, self.entity_id
            )),
            None => OntologyError::not_found(format!(
                "Entity '{}' has no current version",
                self.entity_id
            )),
        })
    }

    pub fn annotations_mut(&mut self, version: i32) -> Result<&mut AnnotationArena> {
        let entity_id = &self.entity_id;
        self.versions
            .get_mut(&version)
            .map(|v| &mut v.annotations)
            .ok_or_else(|| {
                OntologyError::not_found(format!(
                    "Version {} of entity '{}' does not exist",
                    version, entity_id
                ))
            })
    }

    /// Highest existing version number plus one, or [`FIRST_VERSION`] for an empty chain.
    pub fn next_version_number(&self) -> i32 {
        self.versions
            .keys()
            .next_back()
            .map(|max| max + 1)
            .unwrap_or(FIRST_VERSION)
    }

    /// Last version of the chain, the one without a successor.
    pub fn tail(&self) -> Option<&Version> {
        self.versions.values().rev().find(|v| v.next_version.is_none())
    }

    /// Append a version after the tail and optionally make it current.
    pub fn append(&mut self, draft: NewVersion, make_current: bool, now: DateTime<Utc>) -> &Version {
        let number = self.next_version_number();
        let previous = self.tail().map(|t| t.version);

        if let Some(tail) = previous.and_then(|p| self.versions.get_mut(&p)) {
            tail.next_version = Some(number);
        }

        self.versions.insert(
            number,
            Version {
                entity_id: self.entity_id.clone(),
                version: number,
                created_at: now,
                hidden_at: None,
                author: draft.author,
                previous_version: previous,
                next_version: None,
                annotations: draft.annotations,
                expressions: draft.expressions,
                equivalent: draft.equivalent,
            },
        );

        if make_current {
            self.current = Some(number);
        }

        &self.versions[&number]
    }

    /// Repoint the current-version pointer. Hidden versions cannot become current.
    pub fn set_current(&mut self, version: i32) -> Result<&Version> {
        let target = self.versions.get(&version).ok_or_else(|| {
            OntologyError::not_found(format!(
                "Version {} of entity '{}' does not exist",
                version, self.entity_id
            ))
        })?;
        if target.is_hidden() {
            return Err(OntologyError::not_acceptable(format!(
                "Hidden version {} of entity '{}' cannot become current",
                version, self.entity_id
            )));
        }
        self.current = Some(version);
        Ok(&self.versions[&version])
    }

    /// Soft delete. Hiding an already hidden version changes nothing.
    pub fn hide(&mut self, version: i32, now: DateTime<Utc>) -> Result<&Version> {
        let entity_id = &self.entity_id;
        let target = self.versions.get_mut(&version).ok_or_else(|| {
            OntologyError::not_found(format!(
                "Version {} of entity '{}' does not exist",
                version, entity_id
            ))
        })?;
        if target.hidden_at.is_none() {
            target.hidden_at = Some(now);
        }
        Ok(target)
    }

    /// Unlink and return a version that is not current. Its neighbours are spliced together;
    /// if only one neighbour exists, that neighbour's pointer to the removed version is cleared.
    pub fn remove(&mut self, version: i32) -> Result<Version> {
        if !self.versions.contains_key(&version) {
            return Err(OntologyError::not_found(format!(
                "Version {} of entity '{}' does not exist",
                version, self.entity_id
            )));
        }
        if self.current == Some(version) {
            return Err(OntologyError::conflict(format!(
                "Current version {} of entity '{}' cannot be deleted",
                version, self.entity_id
            )));
        }

        let removed = self
            .versions
            .remove(&version)
            .ok_or_else(|| anyhow::anyhow!("version {} vanished during removal", version))?;

        if let Some(previous) = removed
            .previous_version
            .and_then(|p| self.versions.get_mut(&p))
        {
            previous.next_version = removed.next_version;
        }
        if let Some(next) = removed.next_version.and_then(|n| self.versions.get_mut(&n)) {
            next.previous_version = removed.previous_version;
        }

        Ok(removed)
    }

    /// Drop equivalence links pointing at any version of `entity_id`. Returns the versions touched.
    pub fn clear_equivalence_to(&mut self, entity_id: &str) -> Vec<i32> {
        self.versions
            .values_mut()
            .filter(|v| v.equivalent.as_ref().is_some_and(|e| e.entity_id == entity_id))
            .map(|v| {
                v.equivalent = None;
                v.version
            })
            .collect()
    }

    /// Drop equivalence links pointing at one version. Returns the versions touched.
    pub fn clear_equivalence_to_version(&mut self, target: &VersionRef) -> Vec<i32> {
        self.versions
            .values_mut()
            .filter(|v| v.equivalent.as_ref() == Some(target))
            .map(|v| {
                v.equivalent = None;
                v.version
            })
            .collect()
    }

    /// Versions ordered by number, newest first.
    pub fn list_desc(&self) -> Vec<&Version> {
        self.versions.values().rev().collect()
    }

    /// Versions in link order, head to tail.
    pub fn walk(&self) -> Vec<&Version> {
        let mut ordered = Vec::with_capacity(self.versions.len());
        let mut cursor = self
            .versions
            .values()
            .find(|v| v.previous_version.is_none())
            .map(|v| v.version);
        while let Some(n) = cursor {
            let Some(v) = self.versions.get(&n) else { break };
            ordered.push(v);
            if ordered.len() > self.versions.len() {
                break;
            }
            cursor = v.next_version;
        }
        ordered
    }

    /// Check that the links form one acyclic, symmetric chain covering every version.
    pub fn verify_links(&self) -> std::result::Result<(), String> {
        if self.versions.is_empty() {
            return Ok(());
        }
        let heads = self
            .versions
            .values()
            .filter(|v| v.previous_version.is_none())
            .count();
        let tails = self
            .versions
            .values()
            .filter(|v| v.next_version.is_none())
            .count();
        if heads != 1 || tails != 1 {
            return Err(format!("expected one head and one tail, found {} and {}", heads, tails));
        }
        for v in self.versions.values() {
            if let Some(next) = v.next_version {
                match self.versions.get(&next) {
                    Some(n) if n.previous_version == Some(v.version) => {}
                    _ => return Err(format!("version {} -> {} is not mirrored", v.version, next)),
                }
            }
            if let Some(previous) = v.previous_version {
                match self.versions.get(&previous) {
                    Some(p) if p.next_version == Some(v.version) => {}
                    _ => {
                        return Err(format!("version {} <- {} is not mirrored", v.version, previous))
                    }
                }
            }
        }
        if self.walk().len() != self.versions.len() {
            return Err("chain does not reach every version".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_with(n: usize) -> VersionChain {
        let mut chain = VersionChain::new("e-1");
        for _ in 0..n {
            chain.append(NewVersion::default(), true, Utc::now());
        }
        chain
    }

    #[test]
    fn test_first_version_is_one() {
        let chain = VersionChain::new("e-1");
        assert_eq!(chain.next_version_number(), 1);

        let chain = chain_with(1);
        assert_eq!(chain.current_number(), Some(1));
        assert!(chain.verify_links().is_ok());
    }

    #[test]
    fn test_next_version_skips_gaps() {
        let mut chain = chain_with(5);
        chain.set_current(5).unwrap();
        chain.remove(3).unwrap();
        chain.remove(4).unwrap();

        let numbers: Vec<i32> = chain.walk().iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![1, 2, 5]);
        assert_eq!(chain.next_version_number(), 6);
    }

    #[test]
    fn test_append_links_after_tail() {
        let mut chain = chain_with(2);
        chain.set_current(1).unwrap();
        let v3 = chain.append(NewVersion::default(), false, Utc::now());

        assert_eq!(v3.version, 3);
        assert_eq!(v3.previous_version, Some(2));
        assert_eq!(chain.get(2).unwrap().next_version, Some(3));
        assert_eq!(chain.current_number(), Some(1));
        assert!(chain.verify_links().is_ok());
    }

    #[test]
    fn test_removing_current_version_conflicts() {
        let mut chain = chain_with(3);
        let err = chain.remove(3).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_remove_middle_resplices() {
        let mut chain = chain_with(3);
        chain.remove(2).unwrap();

        assert_eq!(chain.get(1).unwrap().next_version, Some(3));
        assert_eq!(chain.get(3).unwrap().previous_version, Some(1));
        assert!(chain.verify_links().is_ok());
    }

    #[test]
    fn test_remove_head_clears_dangling_pointer() {
        let mut chain = chain_with(3);
        chain.remove(1).unwrap();

        assert_eq!(chain.get(2).unwrap().previous_version, None);
        assert!(chain.verify_links().is_ok());
    }

    #[test]
    fn test_remove_tail_clears_dangling_pointer() {
        let mut chain = chain_with(3);
        chain.set_current(1).unwrap();
        chain.remove(3).unwrap();

        assert_eq!(chain.get(2).unwrap().next_version, None);
        assert_eq!(chain.tail().unwrap().version, 2);
        assert!(chain.verify_links().is_ok());
    }

    #[test]
    fn test_hidden_version_cannot_become_current() {
        let mut chain = chain_with(2);
        chain.hide(1, Utc::now()).unwrap();

        let err = chain.set_current(1).unwrap_err();
        assert!(matches!(err, OntologyError::NotAcceptable(_)));
        assert_eq!(chain.current_number(), Some(2));
    }

    #[test]
    fn test_hide_is_idempotent() {
        let mut chain = chain_with(1);
        let first = chain.hide(1, Utc::now()).unwrap().hidden_at;
        let second = chain
            .hide(1, Utc::now() + chrono::Duration::seconds(5))
            .unwrap()
            .hidden_at;
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_defaults_to_current() {
        let mut chain = chain_with(3);
        chain.set_current(2).unwrap();

        assert_eq!(chain.resolve(None).unwrap().version, 2);
        assert_eq!(chain.resolve(Some(3)).unwrap().version, 3);
        assert!(chain.resolve(Some(9)).unwrap_err().is_not_found());
    }

    #[test]
    fn test_list_desc_orders_newest_first() {
        let chain = chain_with(3);
        let numbers: Vec<i32> = chain.list_desc().iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
    }

    #[test]
    fn test_clear_equivalence_to_one_version_only() {
        let mut chain = VersionChain::new("fork");
        for origin_version in [1, 2] {
            let draft = NewVersion {
                equivalent: Some(VersionRef::new("origin", origin_version)),
                ..Default::default()
            };
            chain.append(draft, true, Utc::now());
        }

        let touched = chain.clear_equivalence_to_version(&VersionRef::new("origin", 1));

        assert_eq!(touched, vec![1]);
        assert_eq!(chain.resolve(Some(1)).unwrap().equivalent, None);
        assert_eq!(
            chain.resolve(Some(2)).unwrap().equivalent,
            Some(VersionRef::new("origin", 2))
        );
    }

    #[test]
    fn test_from_parts_rejects_unknown_current() {
        assert!(VersionChain::from_parts("e-1", Some(4), Vec::new()).is_err());
    }
}
