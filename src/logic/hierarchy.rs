use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::Result;
use crate::model::{Id, SubclassRelation};
use crate::store::traits::Store;

/// Subclass relations declared by one repository, indexed both ways.
///
/// A class can be subclassed differently in different repositories, so an index never mixes
/// relations of more than one repository.
#[derive(Debug, Clone, Default)]
pub struct HierarchyIndex {
    repository_id: Id,
    supers: HashMap<Id, Vec<SubclassRelation>>,
    subs: HashMap<Id, Vec<SubclassRelation>>,
}

fn by_index(relations: &mut [SubclassRelation]) {
    relations.sort_by(|a, b| {
        (a.index.is_none(), a.index, &a.entity_id, &a.super_entity_id).cmp(&(
            b.index.is_none(),
            b.index,
            &b.entity_id,
            &b.super_entity_id,
        ))
    });
}

impl HierarchyIndex {
    pub async fn load<S: Store>(store: &S, repository_id: &Id) -> Result<Self> {
        let relations = store.list_relations(repository_id).await?;
        log::debug!(
            "Loaded {} subclass relations of repository '{}'",
            relations.len(),
            repository_id
        );
        Ok(Self::from_relations(repository_id.clone(), relations))
    }

    /// Relations owned by other repositories are ignored.
    pub fn from_relations(repository_id: Id, relations: Vec<SubclassRelation>) -> Self {
        let mut supers: HashMap<Id, Vec<SubclassRelation>> = HashMap::new();
        let mut subs: HashMap<Id, Vec<SubclassRelation>> = HashMap::new();
        for relation in relations
            .into_iter()
            .filter(|r| r.repository_id == repository_id)
        {
            supers
                .entry(relation.entity_id.clone())
                .or_default()
                .push(relation.clone());
            subs.entry(relation.super_entity_id.clone())
                .or_default()
                .push(relation);
        }
        supers.values_mut().for_each(|r| by_index(r));
        subs.values_mut().for_each(|r| by_index(r));

        Self {
            repository_id,
            supers,
            subs,
        }
    }

    pub fn repository_id(&self) -> &Id {
        &self.repository_id
    }

    /// Outgoing relations of an entity, ordered by index.
    pub fn supers_of(&self, entity_id: &str) -> &[SubclassRelation] {
        self.supers.get(entity_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Direct subclasses, ordered by the relation index.
    pub fn subclasses_of(&self, entity_id: &str) -> Vec<&Id> {
        self.subs
            .get(entity_id)
            .map(|relations| relations.iter().map(|r| &r.entity_id).collect())
            .unwrap_or_default()
    }

    pub fn is_root(&self, entity_id: &str) -> bool {
        self.supers_of(entity_id).is_empty()
    }

    /// Every transitive subclass, breadth first, so a class always comes after the class it was
    /// reached from. The start entity is not included and cycles are cut.
    pub fn cascade(&self, entity_id: &Id) -> Vec<Id> {
        let mut seen: HashSet<&Id> = HashSet::from([entity_id]);
        let mut ordered = Vec::new();
        let mut queue = VecDeque::from([entity_id]);

        while let Some(current) = queue.pop_front() {
            for sub in self.subclasses_of(current) {
                if seen.insert(sub) {
                    ordered.push(sub.clone());
                    queue.push_back(sub);
                }
            }
        }

        ordered
    }

    /// Reorder `ids` so every entity comes after those of its superclasses that are part of the
    /// same list. The original order is kept wherever it already satisfies that. Members of a
    /// cycle keep their original relative order.
    pub fn parents_first(&self, ids: Vec<Id>) -> Vec<Id> {
        let members: HashSet<&Id> = ids.iter().collect();
        let mut placed: HashSet<Id> = HashSet::new();
        let mut pending: Vec<Id> = ids.clone();
        let mut ordered = Vec::with_capacity(ids.len());

        while !pending.is_empty() {
            let ready = pending.iter().position(|id| {
                self.supers_of(id).iter().all(|r| {
                    !members.contains(&r.super_entity_id) || placed.contains(&r.super_entity_id)
                })
            });
            let next = pending.remove(ready.unwrap_or(0));
            placed.insert(next.clone());
            ordered.push(next);
        }

        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(entity: &str, parent: &str, repository: &str, index: Option<i32>) -> SubclassRelation {
        SubclassRelation {
            entity_id: entity.to_string(),
            super_entity_id: parent.to_string(),
            repository_id: repository.to_string(),
            index,
        }
    }

    fn index(relations: Vec<SubclassRelation>) -> HierarchyIndex {
        HierarchyIndex::from_relations("repo".to_string(), relations)
    }

    #[test]
    fn test_subclasses_ordered_by_index() {
        let idx = index(vec![
            rel("b", "root", "repo", Some(2)),
            rel("c", "root", "repo", None),
            rel("a", "root", "repo", Some(1)),
        ]);
        assert_eq!(idx.subclasses_of("root"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_other_repository_relations_are_ignored() {
        let idx = index(vec![
            rel("a", "root", "repo", None),
            rel("b", "root", "elsewhere", None),
        ]);
        assert_eq!(idx.subclasses_of("root"), vec!["a"]);
        assert!(idx.is_root("b"));
        assert!(!idx.is_root("a"));
    }

    #[test]
    fn test_cascade_is_transitive_and_cuts_cycles() {
        let idx = index(vec![
            rel("a", "root", "repo", Some(0)),
            rel("b", "root", "repo", Some(1)),
            rel("c", "a", "repo", None),
            rel("root", "c", "repo", None),
        ]);
        assert_eq!(idx.cascade(&"root".to_string()), vec!["a", "b", "c"]);
        assert!(idx.cascade(&"b".to_string()).is_empty());
    }

    #[test]
    fn test_parents_first_moves_children_behind_late_parents() {
        let idx = index(vec![
            rel("child", "p1", "repo", None),
            rel("child", "p2", "repo", None),
        ]);
        let ordered = idx.parents_first(vec![
            "p1".to_string(),
            "child".to_string(),
            "p2".to_string(),
        ]);
        assert_eq!(ordered, vec!["p1", "p2", "child"]);
    }
}
