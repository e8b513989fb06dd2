//! Patch engine
//!
//! TypeDefs are immutable once published, so every change is expressed as a
//! [`TypeDefPatch`] that carries the single action to perform and the exact
//! version it was built against. Applying a patch never touches the input;
//! it produces a new TypeDef at the patch's target version.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{CoreError, Result};
use crate::registry::TypeRegistry;
use crate::typedefs::{PatchAction, TypeDef, TypeDefAttribute, TypeDefPatch};

pub struct PatchEngine {
    registry: Arc<TypeRegistry>,
}

impl PatchEngine {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Apply `patch` to `original`, returning the successor version.
    ///
    /// The patch must target `original` by GUID and name, must move the
    /// version strictly forward, and must have been built against exactly
    /// the version `original` is at. Any failure leaves `original` unused
    /// and unchanged.
    pub fn apply_patch(
        &self,
        source_name: &str,
        original: &TypeDef,
        patch: &TypeDefPatch,
    ) -> Result<TypeDef> {
        const METHOD: &str = "apply_patch";

        if patch.type_def_guid != original.guid || patch.type_name != original.name {
            return Err(CoreError::patch_error(
                source_name,
                METHOD,
                format!(
                    "patch targets {} (GUID {}) but was applied to {} (GUID {})",
                    patch.type_name, patch.type_def_guid, original.name, original.guid
                ),
            ));
        }
        if patch.update_to_version <= patch.apply_to_version {
            return Err(CoreError::patch_error(
                source_name,
                METHOD,
                format!(
                    "patch for {} does not move the version forward ({} -> {})",
                    patch.type_name, patch.apply_to_version, patch.update_to_version
                ),
            ));
        }
        if original.version != patch.apply_to_version {
            return Err(CoreError::patch_error(
                source_name,
                METHOD,
                format!(
                    "patch for {} was built against version {} but the type is at version {}",
                    patch.type_name, patch.apply_to_version, original.version
                ),
            ));
        }

        let mut updated = original.clone();
        match &patch.action {
            PatchAction::AddAttributes { attributes } => {
                self.add_attributes(source_name, &mut updated, attributes)?;
            }
            PatchAction::AddOptions { options } => {
                add_options(source_name, &mut updated, options)?;
            }
            PatchAction::UpdateOptions { options } => {
                update_options(source_name, &mut updated, options)?;
            }
            PatchAction::DeleteOptions { option_names } => {
                delete_options(source_name, &mut updated, option_names)?;
            }
            PatchAction::AddExternalStandards { mappings } => {
                add_external_standards(source_name, &mut updated, mappings)?;
            }
            PatchAction::UpdateExternalStandards { mappings } => {
                update_external_standards(source_name, &mut updated, mappings)?;
            }
            PatchAction::DeleteExternalStandards { identifiers } => {
                delete_external_standards(source_name, &mut updated, identifiers)?;
            }
            PatchAction::UpdateDescriptions {
                description,
                description_guid,
                attribute_descriptions,
            } => {
                update_descriptions(
                    source_name,
                    &mut updated,
                    description.as_deref(),
                    description_guid.as_deref(),
                    attribute_descriptions,
                )?;
            }
        }

        updated.version = patch.update_to_version;
        updated.version_name = patch.new_version_name.clone();
        debug!(
            source_name,
            type_name = %updated.name,
            version = updated.version,
            "patch applied"
        );
        Ok(updated)
    }

    fn add_attributes(
        &self,
        source_name: &str,
        updated: &mut TypeDef,
        attributes: &[TypeDefAttribute],
    ) -> Result<()> {
        const METHOD: &str = "apply_patch";

        if attributes.is_empty() {
            return Err(CoreError::patch_error(
                source_name,
                METHOD,
                format!("patch for {} adds no attributes", updated.name),
            ));
        }

        let mut merged = updated.properties.take().unwrap_or_default();
        for attribute in attributes {
            if attribute.name.is_empty() {
                return Err(CoreError::patch_error(
                    source_name,
                    METHOD,
                    format!("patch for {} carries an unnamed attribute", updated.name),
                ));
            }
            if !self.registry.valid_attribute_type_def_id(
                source_name,
                &attribute.attribute_type.guid,
                &attribute.attribute_type.name,
                attribute.attribute_type.category,
            ) {
                return Err(CoreError::patch_error(
                    source_name,
                    METHOD,
                    format!(
                        "attribute {} of {} references unresolvable attribute type {}",
                        attribute.name, updated.name, attribute.attribute_type.name
                    ),
                ));
            }
            if merged.iter().any(|existing| existing.name == attribute.name) {
                return Err(CoreError::patch_error(
                    source_name,
                    METHOD,
                    format!(
                        "type {} already declares an attribute named {}",
                        updated.name, attribute.name
                    ),
                ));
            }
            merged.push(attribute.clone());
        }

        updated.properties = if merged.is_empty() { None } else { Some(merged) };
        Ok(())
    }
}

fn add_options(
    source_name: &str,
    updated: &mut TypeDef,
    options: &BTreeMap<String, String>,
) -> Result<()> {
    let mut merged = updated.options.take().unwrap_or_default();
    for (key, value) in options {
        if merged.contains_key(key) {
            return Err(CoreError::patch_error(
                source_name,
                "apply_patch",
                format!("type {} already carries option {key}", updated.name),
            ));
        }
        merged.insert(key.clone(), value.clone());
    }
    updated.options = if merged.is_empty() { None } else { Some(merged) };
    Ok(())
}

fn update_options(
    source_name: &str,
    updated: &mut TypeDef,
    options: &BTreeMap<String, String>,
) -> Result<()> {
    let mut merged = updated.options.take().unwrap_or_default();
    for (key, value) in options {
        match merged.get_mut(key) {
            Some(existing) => *existing = value.clone(),
            None => {
                return Err(CoreError::patch_error(
                    source_name,
                    "apply_patch",
                    format!("type {} carries no option {key} to update", updated.name),
                ));
            }
        }
    }
    updated.options = if merged.is_empty() { None } else { Some(merged) };
    Ok(())
}

fn delete_options(
    source_name: &str,
    updated: &mut TypeDef,
    option_names: &[String],
) -> Result<()> {
    let mut merged = updated.options.take().unwrap_or_default();
    for key in option_names {
        if merged.remove(key).is_none() {
            return Err(CoreError::patch_error(
                source_name,
                "apply_patch",
                format!("type {} carries no option {key} to delete", updated.name),
            ));
        }
    }
    updated.options = if merged.is_empty() { None } else { Some(merged) };
    Ok(())
}

fn add_external_standards(
    source_name: &str,
    updated: &mut TypeDef,
    mappings: &[crate::typedefs::ExternalStandardMapping],
) -> Result<()> {
    let mut merged = updated.external_standard_mappings.take().unwrap_or_default();
    for mapping in mappings {
        if merged.iter().any(|m| m.identifier == mapping.identifier) {
            return Err(CoreError::patch_error(
                source_name,
                "apply_patch",
                format!(
                    "type {} already maps to external identifier {}",
                    updated.name, mapping.identifier
                ),
            ));
        }
        merged.push(mapping.clone());
    }
    updated.external_standard_mappings = if merged.is_empty() { None } else { Some(merged) };
    Ok(())
}

fn update_external_standards(
    source_name: &str,
    updated: &mut TypeDef,
    mappings: &[crate::typedefs::ExternalStandardMapping],
) -> Result<()> {
    let mut merged = updated.external_standard_mappings.take().unwrap_or_default();
    for mapping in mappings {
        match merged.iter_mut().find(|m| m.identifier == mapping.identifier) {
            Some(existing) => *existing = mapping.clone(),
            None => {
                return Err(CoreError::patch_error(
                    source_name,
                    "apply_patch",
                    format!(
                        "type {} has no mapping for external identifier {} to update",
                        updated.name, mapping.identifier
                    ),
                ));
            }
        }
    }
    updated.external_standard_mappings = if merged.is_empty() { None } else { Some(merged) };
    Ok(())
}

fn delete_external_standards(
    source_name: &str,
    updated: &mut TypeDef,
    identifiers: &[String],
) -> Result<()> {
    let mut merged = updated.external_standard_mappings.take().unwrap_or_default();
    for identifier in identifiers {
        let before = merged.len();
        merged.retain(|m| &m.identifier != identifier);
        if merged.len() == before {
            return Err(CoreError::patch_error(
                source_name,
                "apply_patch",
                format!(
                    "type {} has no mapping for external identifier {identifier} to delete",
                    updated.name
                ),
            ));
        }
    }
    updated.external_standard_mappings = if merged.is_empty() { None } else { Some(merged) };
    Ok(())
}

fn update_descriptions(
    source_name: &str,
    updated: &mut TypeDef,
    description: Option<&str>,
    description_guid: Option<&str>,
    attribute_descriptions: &BTreeMap<String, String>,
) -> Result<()> {
    // None means "leave unchanged"; there is no clearing action
    if let Some(description) = description {
        updated.description = Some(description.to_string());
    }
    if let Some(description_guid) = description_guid {
        updated.description_guid = Some(description_guid.to_string());
    }

    for (attr_name, attr_description) in attribute_descriptions {
        let attribute = updated
            .properties
            .as_mut()
            .and_then(|attrs| attrs.iter_mut().find(|a| &a.name == attr_name));
        match attribute {
            Some(attribute) => attribute.description = Some(attr_description.clone()),
            None => {
                return Err(CoreError::patch_error(
                    source_name,
                    "apply_patch",
                    format!(
                        "type {} declares no attribute named {attr_name}",
                        updated.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typedefs::{AttributeTypeDef, PrimitiveCategory};

    fn engine_with_person() -> (PatchEngine, TypeDef) {
        let registry = Arc::new(TypeRegistry::new("local-mcid", None));
        let string_type =
            AttributeTypeDef::new_primitive("at-string", "string", PrimitiveCategory::String);
        let int_type = AttributeTypeDef::new_primitive("at-int", "int", PrimitiveCategory::Int);
        registry
            .add_attribute_type_def("test", string_type.clone())
            .unwrap();
        registry.add_attribute_type_def("test", int_type).unwrap();

        let person = TypeDef::new_entity_def("g1", "Person", "archive")
            .with_properties(vec![TypeDefAttribute::new("name", string_type.link())]);
        registry.add_type_def("test", person.clone()).unwrap();
        (PatchEngine::new(registry), person)
    }

    fn add_age_patch(apply_to: u64) -> TypeDefPatch {
        let int_link = crate::typedefs::AttributeTypeDefLink {
            guid: "at-int".to_string(),
            name: "int".to_string(),
            category: crate::typedefs::AttributeTypeDefCategory::Primitive,
        };
        TypeDefPatch {
            type_def_guid: "g1".to_string(),
            type_name: "Person".to_string(),
            apply_to_version: apply_to,
            update_to_version: apply_to + 1,
            new_version_name: "1.1".to_string(),
            action: PatchAction::AddAttributes {
                attributes: vec![TypeDefAttribute::new("age", int_link)],
            },
        }
    }

    #[test]
    fn test_add_attributes_leaves_original_untouched() {
        let (engine, person) = engine_with_person();
        let updated = engine.apply_patch("test", &person, &add_age_patch(1)).unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.version_name, "1.1");
        assert!(updated.attribute("age").is_some());
        assert!(updated.attribute("name").is_some());

        // Original is the published v1, unchanged
        assert_eq!(person.version, 1);
        assert!(person.attribute("age").is_none());
    }

    #[test]
    fn test_stale_patch_rejected() {
        let (engine, person) = engine_with_person();
        let stale = add_age_patch(7);
        let err = engine.apply_patch("test", &person, &stale).unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_backwards_patch_rejected() {
        let (engine, person) = engine_with_person();
        let mut patch = add_age_patch(1);
        patch.update_to_version = 1;
        let err = engine.apply_patch("test", &person, &patch).unwrap_err();
        assert!(matches!(err, CoreError::PatchError { .. }));
    }

    #[test]
    fn test_duplicate_attribute_name_rejected() {
        let (engine, person) = engine_with_person();
        let mut patch = add_age_patch(1);
        patch.action = PatchAction::AddAttributes {
            attributes: vec![TypeDefAttribute::new(
                "name",
                crate::typedefs::AttributeTypeDefLink {
                    guid: "at-string".to_string(),
                    name: "string".to_string(),
                    category: crate::typedefs::AttributeTypeDefCategory::Primitive,
                },
            )],
        };
        let err = engine.apply_patch("test", &person, &patch).unwrap_err();
        assert!(matches!(err, CoreError::PatchError { .. }));
    }

    #[test]
    fn test_unresolvable_attribute_type_rejected() {
        let (engine, person) = engine_with_person();
        let mut patch = add_age_patch(1);
        patch.action = PatchAction::AddAttributes {
            attributes: vec![TypeDefAttribute::new(
                "score",
                crate::typedefs::AttributeTypeDefLink {
                    guid: "at-missing".to_string(),
                    name: "decimal".to_string(),
                    category: crate::typedefs::AttributeTypeDefCategory::Primitive,
                },
            )],
        };
        let err = engine.apply_patch("test", &person, &patch).unwrap_err();
        assert!(matches!(err, CoreError::PatchError { .. }));
    }

    #[test]
    fn test_option_lifecycle() {
        let (engine, person) = engine_with_person();

        let add = TypeDefPatch {
            type_def_guid: "g1".into(),
            type_name: "Person".into(),
            apply_to_version: 1,
            update_to_version: 2,
            new_version_name: "1.1".into(),
            action: PatchAction::AddOptions {
                options: BTreeMap::from([("supportedZones".to_string(), "all".to_string())]),
            },
        };
        let v2 = engine.apply_patch("test", &person, &add).unwrap();
        assert_eq!(
            v2.options.as_ref().and_then(|o| o.get("supportedZones")),
            Some(&"all".to_string())
        );

        // Adding the same key again conflicts
        let mut re_add = add.clone();
        re_add.apply_to_version = 2;
        re_add.update_to_version = 3;
        assert!(engine.apply_patch("test", &v2, &re_add).is_err());

        // Deleting the only option leaves None, not an empty map
        let delete = TypeDefPatch {
            type_def_guid: "g1".into(),
            type_name: "Person".into(),
            apply_to_version: 2,
            update_to_version: 3,
            new_version_name: "1.2".into(),
            action: PatchAction::DeleteOptions {
                option_names: vec!["supportedZones".to_string()],
            },
        };
        let v3 = engine.apply_patch("test", &v2, &delete).unwrap();
        assert!(v3.options.is_none());
    }

    #[test]
    fn test_update_descriptions_none_leaves_unchanged() {
        let (engine, person) = engine_with_person();
        let person = person.with_description("an individual");

        let patch = TypeDefPatch {
            type_def_guid: "g1".into(),
            type_name: "Person".into(),
            apply_to_version: 1,
            update_to_version: 2,
            new_version_name: "1.1".into(),
            action: PatchAction::UpdateDescriptions {
                description: None,
                description_guid: None,
                attribute_descriptions: BTreeMap::from([(
                    "name".to_string(),
                    "full legal name".to_string(),
                )]),
            },
        };
        let updated = engine.apply_patch("test", &person, &patch).unwrap();
        assert_eq!(updated.description.as_deref(), Some("an individual"));
        assert_eq!(
            updated.attribute("name").and_then(|a| a.description.as_deref()),
            Some("full legal name")
        );

        // An attribute name with no match is a patch error
        let bad = TypeDefPatch {
            action: PatchAction::UpdateDescriptions {
                description: None,
                description_guid: None,
                attribute_descriptions: BTreeMap::from([(
                    "nickname".to_string(),
                    "x".to_string(),
                )]),
            },
            ..patch
        };
        assert!(engine.apply_patch("test", &person, &bad).is_err());
    }
}
