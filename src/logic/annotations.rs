use crate::error::Result;
use crate::logic::versions::VersionOperations;
use crate::model::{Annotation, AnnotationValue, Id, LocalisableText};
use crate::store::traits::Store;

pub struct AnnotationOperations;

impl AnnotationOperations {
    /// Replace every annotation of `property` on one version. The position of a value in
    /// `values` becomes its index.
    pub async fn set_annotations<S: Store>(
        store: &S,
        entity_id: &Id,
        version: i32,
        property: &str,
        values: Vec<LocalisableText>,
    ) -> Result<Vec<Annotation>> {
        let values = values
            .into_iter()
            .map(|t| (AnnotationValue::String(t.text), t.lang))
            .collect();
        store
            .replace_annotations(entity_id, version, property, values)
            .await
    }

    pub async fn get_annotations<S: Store>(
        store: &S,
        entity_id: &Id,
        version: Option<i32>,
        property: &str,
    ) -> Result<Vec<Annotation>> {
        let (version, _) = VersionOperations::get_version(store, entity_id, version).await?;
        Ok(version
            .annotations
            .by_property(property)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Delete the whole annotation tree of a version, innermost annotations first.
    pub async fn delete_recursive<S: Store>(store: &S, entity_id: &Id, version: i32) -> Result<usize> {
        let removed = store.delete_annotations(entity_id, version).await?;
        log::debug!(
            "Deleted {} annotations of version {} of entity '{}'",
            removed,
            version,
            entity_id
        );
        Ok(removed)
    }
}
