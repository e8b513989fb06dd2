//! Instance factory
//!
//! Builds correctly-stamped instances so connectors never assemble headers
//! by hand. Skeletons carry a fresh GUID, version 1, the type's initial
//! status and the local repository's provenance; the `get_new_*` forms
//! layer caller-supplied content on top. Classification editing always
//! returns a new entity value and leaves the input untouched.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{self, CoreError, Result};
use crate::instances::{
    Classification, ClassificationOrigin, EntityDetail, EntityProxy, InstanceHeader,
    InstanceProperties, InstanceProvenanceType, Relationship,
};
use crate::registry::TypeRegistry;
use crate::typedefs::TypeDefCategory;

pub struct InstanceFactory {
    registry: Arc<TypeRegistry>,
}

impl InstanceFactory {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    fn skeleton_header(
        &self,
        source_name: &str,
        method_name: &'static str,
        user_name: &str,
        provenance: InstanceProvenanceType,
        type_name: &str,
        expected_category: TypeDefCategory,
    ) -> Result<InstanceHeader> {
        let instance_type = self.registry.get_instance_type(source_name, type_name)?;
        if instance_type.type_def_category != expected_category {
            return Err(CoreError::type_error(
                source_name,
                method_name,
                format!(
                    "type {type_name} is a {} rather than a {}",
                    instance_type.type_def_category.type_name(),
                    expected_category.type_name()
                ),
            ));
        }
        let status = self.registry.get_initial_status(source_name, type_name)?;
        let guid = Uuid::new_v4().to_string();
        let instance_url = self.registry.get_instance_url(&guid);

        Ok(InstanceHeader {
            guid,
            instance_type,
            status,
            created_by: user_name.to_string(),
            create_time: Utc::now(),
            updated_by: None,
            update_time: None,
            version: 1,
            metadata_collection_id: self.registry.local_metadata_collection_id().to_string(),
            provenance,
            instance_url,
        })
    }

    /// An empty entity of the named type, ready for the caller to fill in
    pub fn get_skeleton_entity(
        &self,
        source_name: &str,
        user_name: &str,
        provenance: InstanceProvenanceType,
        type_name: &str,
    ) -> Result<EntityDetail> {
        let header = self.skeleton_header(
            source_name,
            "get_skeleton_entity",
            user_name,
            provenance,
            type_name,
            TypeDefCategory::EntityDef,
        )?;
        Ok(EntityDetail {
            header,
            properties: None,
            classifications: None,
        })
    }

    /// An empty relationship of the named type. The entity proxies are
    /// attached by the caller once the ends are known.
    pub fn get_skeleton_relationship(
        &self,
        source_name: &str,
        user_name: &str,
        provenance: InstanceProvenanceType,
        type_name: &str,
    ) -> Result<Relationship> {
        let header = self.skeleton_header(
            source_name,
            "get_skeleton_relationship",
            user_name,
            provenance,
            type_name,
            TypeDefCategory::RelationshipDef,
        )?;
        Ok(Relationship {
            header,
            properties: None,
            entity_one_proxy: None,
            entity_two_proxy: None,
        })
    }

    /// An empty classification, checked for applicability to the entity
    /// type it will be attached to
    pub fn get_skeleton_classification(
        &self,
        source_name: &str,
        user_name: &str,
        classification_type_name: &str,
        entity_type_name: &str,
    ) -> Result<Classification> {
        const METHOD: &str = "get_skeleton_classification";

        if !self.registry.is_valid_type_category(
            source_name,
            TypeDefCategory::ClassificationDef,
            classification_type_name,
        ) {
            return Err(CoreError::type_error(
                source_name,
                METHOD,
                format!("{classification_type_name} is not an active classification type"),
            ));
        }
        if !self.registry.is_valid_classification_for_entity(
            source_name,
            classification_type_name,
            entity_type_name,
        ) {
            return Err(CoreError::type_error(
                source_name,
                METHOD,
                format!(
                    "classification {classification_type_name} may not be attached to entities of type {entity_type_name}"
                ),
            ));
        }

        let instance_type = self
            .registry
            .get_instance_type(source_name, classification_type_name)?;
        let status = self
            .registry
            .get_initial_status(source_name, classification_type_name)?;
        Ok(Classification {
            name: classification_type_name.to_string(),
            instance_type,
            status,
            created_by: user_name.to_string(),
            create_time: Utc::now(),
            updated_by: None,
            update_time: None,
            version: 1,
            origin: ClassificationOrigin::Assigned,
            origin_guid: None,
            properties: None,
        })
    }

    /// A new entity carrying the supplied properties and classifications
    pub fn get_new_entity(
        &self,
        source_name: &str,
        user_name: &str,
        provenance: InstanceProvenanceType,
        type_name: &str,
        properties: Option<InstanceProperties>,
        classifications: Option<Vec<Classification>>,
    ) -> Result<EntityDetail> {
        let mut entity = self.get_skeleton_entity(source_name, user_name, provenance, type_name)?;
        entity.properties = properties.filter(|p| !p.is_empty());
        entity.classifications = normalize_classifications(classifications);
        Ok(entity)
    }

    pub fn get_new_relationship(
        &self,
        source_name: &str,
        user_name: &str,
        provenance: InstanceProvenanceType,
        type_name: &str,
        properties: Option<InstanceProperties>,
    ) -> Result<Relationship> {
        let mut relationship =
            self.get_skeleton_relationship(source_name, user_name, provenance, type_name)?;
        relationship.properties = properties.filter(|p| !p.is_empty());
        Ok(relationship)
    }

    pub fn get_new_classification(
        &self,
        source_name: &str,
        user_name: &str,
        classification_type_name: &str,
        entity_type_name: &str,
        properties: Option<InstanceProperties>,
        origin: ClassificationOrigin,
        origin_guid: Option<String>,
    ) -> Result<Classification> {
        let mut classification = self.get_skeleton_classification(
            source_name,
            user_name,
            classification_type_name,
            entity_type_name,
        )?;
        classification.properties = properties.filter(|p| !p.is_empty());
        classification.origin = origin;
        classification.origin_guid = origin_guid;
        Ok(classification)
    }

    /// Attach a classification, replacing any existing one with the same
    /// name. Returns a new entity value.
    pub fn add_classification_to_entity(
        &self,
        _source_name: &str,
        entity: &EntityDetail,
        classification: Classification,
    ) -> EntityDetail {
        let mut updated = entity.clone();
        let mut classifications = updated.classifications.take().unwrap_or_default();
        classifications.retain(|c| c.name != classification.name);
        classifications.push(classification);
        classifications.sort_by(|a, b| a.name.cmp(&b.name));
        updated.classifications = Some(classifications);
        updated
    }

    pub fn get_classification_from_entity(
        &self,
        source_name: &str,
        entity: &EntityDetail,
        classification_name: &str,
    ) -> Result<Classification> {
        entity
            .classifications
            .as_deref()
            .and_then(|cs| cs.iter().find(|c| c.name == classification_name))
            .cloned()
            .ok_or_else(|| {
                CoreError::classification_error(
                    source_name,
                    "get_classification_from_entity",
                    format!(
                        "entity {} carries no classification named {classification_name}",
                        entity.header.guid
                    ),
                )
            })
    }

    /// Replace an attached classification with new content. The stored
    /// audit trail moves forward: version is bumped from the attached copy
    /// and the updater is recorded.
    pub fn update_classification_in_entity(
        &self,
        source_name: &str,
        user_name: &str,
        entity: &EntityDetail,
        classification: Classification,
    ) -> Result<EntityDetail> {
        let existing =
            self.get_classification_from_entity(source_name, entity, &classification.name)?;

        let mut updated = classification;
        updated.updated_by = Some(user_name.to_string());
        updated.update_time = Some(Utc::now());
        updated.version = existing.version + 1;
        Ok(self.add_classification_to_entity(source_name, entity, updated))
    }

    /// Detach a classification by name. An entity left with no
    /// classifications stores `None`, never an empty list.
    pub fn delete_classification_from_entity(
        &self,
        source_name: &str,
        entity: &EntityDetail,
        classification_name: &str,
    ) -> Result<EntityDetail> {
        let mut updated = entity.clone();
        let mut classifications = updated.classifications.take().unwrap_or_default();
        let before = classifications.len();
        classifications.retain(|c| c.name != classification_name);
        if classifications.len() == before {
            return Err(CoreError::classification_error(
                source_name,
                "delete_classification_from_entity",
                format!(
                    "entity {} carries no classification named {classification_name}",
                    entity.header.guid
                ),
            ));
        }
        updated.classifications = if classifications.is_empty() {
            None
        } else {
            Some(classifications)
        };
        Ok(updated)
    }

    /// Overlay `incoming` onto `existing`. Incoming values win on name
    /// collisions; with nothing to merge onto, incoming moves through
    /// unchanged.
    pub fn merge_instance_properties(
        &self,
        _source_name: &str,
        existing: Option<&InstanceProperties>,
        incoming: Option<InstanceProperties>,
    ) -> Option<InstanceProperties> {
        match (existing, incoming) {
            (None, incoming) => incoming,
            (Some(existing), None) => Some(existing.clone()),
            (Some(existing), Some(incoming)) => {
                let mut merged = existing.clone();
                merged.extend_from(incoming);
                Some(merged)
            }
        }
    }

    /// Record a mutation on `updated`: the version moves to one past the
    /// stored original and the updater is stamped into the audit trail
    pub fn increment_version(
        &self,
        user_id: &str,
        original: &InstanceHeader,
        updated: &mut InstanceHeader,
    ) {
        updated.updated_by = Some(user_id.to_string());
        updated.update_time = Some(Utc::now());
        updated.version = original.version + 1;
    }

    /// Build the proxy used to anchor relationship ends: the entity's
    /// header plus its unique-flagged properties only.
    ///
    /// The entity's recorded type must resolve in the registry; an entity
    /// stamped with a type we cannot resolve means the repository content
    /// is corrupted, which is not recoverable.
    pub fn get_new_entity_proxy(&self, source_name: &str, entity: &EntityDetail) -> EntityProxy {
        const METHOD: &str = "get_new_entity_proxy";

        let type_def = match self
            .registry
            .get_type_def(source_name, &entity.header.instance_type.type_def_guid)
        {
            Ok(type_def) => type_def,
            Err(err) => error::repository_corruption(
                source_name,
                METHOD,
                &format!(
                    "entity {} is stamped with unresolvable type {}: {err}",
                    entity.header.guid, entity.header.instance_type.type_def_name
                ),
            ),
        };

        let unique_properties = entity.properties.as_ref().map(|props| {
            let mut unique = InstanceProperties::new();
            for (name, value) in props.iter() {
                let is_unique = type_def
                    .attribute(name)
                    .map(|a| a.unique)
                    .unwrap_or(false);
                if is_unique {
                    if let Some(value) = value {
                        unique.insert(name, value.clone());
                    }
                }
            }
            unique
        });

        EntityProxy {
            header: entity.header.clone(),
            unique_properties: unique_properties.filter(|p| !p.is_empty()),
        }
    }
}

fn normalize_classifications(
    classifications: Option<Vec<Classification>>,
) -> Option<Vec<Classification>> {
    let mut classifications = classifications?;
    if classifications.is_empty() {
        return None;
    }
    classifications.sort_by(|a, b| a.name.cmp(&b.name));
    Some(classifications)
}
