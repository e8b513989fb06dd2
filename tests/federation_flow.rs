//! Federation Flow Tests
//!
//! End-to-end scenarios across the registry, patch engine, factory and
//! validator, the way a repository connector drives them: seed types from
//! an archive, evolve them with patches, stamp instances and validate them
//! before exchange.

use std::sync::Arc;

use metarepo_core::archive::discover_archives;
use metarepo_core::instances::{InstanceProvenanceType, InstanceStatus};
use metarepo_core::typedefs::{
    AttributeCardinality, AttributeTypeDef, PatchAction, PrimitiveCategory, RelationshipEndDef,
    TypeDefAttribute, TypeDefLink,
};
use metarepo_core::{
    CoreError, InstanceFactory, InstanceProperties, InstancePropertyValue, PatchEngine,
    PropertyErrorKind, TypeArchive, TypeDef, TypeDefPatch, TypeRegistry, Validator,
};

const SOURCE: &str = "repoA";

/// Registry seeded the way a deployment would be: from an archive carrying
/// entity, relationship and classification types
fn seeded_registry() -> Arc<TypeRegistry> {
    let registry = Arc::new(TypeRegistry::new(
        "mcid-repo-a",
        Some("https://repo-a.example.org".to_string()),
    ));
    registry
        .load_archive(SOURCE, &open_types_archive())
        .unwrap();
    registry
}

fn open_types_archive() -> TypeArchive {
    let string_type =
        AttributeTypeDef::new_primitive("at-string", "string", PrimitiveCategory::String);
    let int_type = AttributeTypeDef::new_primitive("at-int", "int", PrimitiveCategory::Int);

    let mut archive = TypeArchive::new("open-types", "1.0", "mcid-archive");
    archive.add_attribute_type_def(string_type.clone());
    archive.add_attribute_type_def(int_type);

    archive.add_type_def(
        TypeDef::new_entity_def("t-person", "Person", "mcid-archive").with_properties(vec![
            TypeDefAttribute::new("employee_id", string_type.link()).unique(),
            TypeDefAttribute::new("name", string_type.link()),
        ]),
    );
    archive.add_type_def(TypeDef::new_entity_def(
        "t-organization",
        "Organization",
        "mcid-archive",
    ));
    archive.add_type_def(TypeDef::new_entity_def("t-document", "Document", "mcid-archive"));
    archive.add_type_def(TypeDef::new_relationship_def(
        "t-employment",
        "Employment",
        "mcid-archive",
        RelationshipEndDef {
            entity_type: TypeDefLink::new("t-person", "Person"),
            attribute_name: "employees".to_string(),
            cardinality: AttributeCardinality::AnyNumberUnordered,
            description: None,
        },
        RelationshipEndDef {
            entity_type: TypeDefLink::new("t-organization", "Organization"),
            attribute_name: "employers".to_string(),
            cardinality: AttributeCardinality::AnyNumberUnordered,
            description: None,
        },
    ));
    archive.add_type_def(TypeDef::new_classification_def(
        "t-confidential",
        "Confidential",
        "mcid-archive",
        vec![TypeDefLink::new("t-person", "Person")],
        false,
    ));
    archive
}

// =============================================================================
// Type Evolution
// =============================================================================

#[test]
fn test_patch_produces_new_version_original_survives() {
    let registry = seeded_registry();
    let engine = PatchEngine::new(Arc::clone(&registry));

    let person_v1 = registry.require_type_def_by_name(SOURCE, "Person").unwrap();
    assert_eq!(person_v1.version, 1);

    let int_type = registry
        .require_attribute_type_def_by_name(SOURCE, "int")
        .unwrap();
    let patch = TypeDefPatch {
        type_def_guid: "t-person".to_string(),
        type_name: "Person".to_string(),
        apply_to_version: 1,
        update_to_version: 2,
        new_version_name: "1.1".to_string(),
        action: PatchAction::AddAttributes {
            attributes: vec![TypeDefAttribute::new("age", int_type.link())],
        },
    };

    let person_v2 = engine.apply_patch(SOURCE, &person_v1, &patch).unwrap();
    assert_eq!(person_v2.version, 2);
    assert!(person_v2.attribute("age").is_some());
    assert!(person_v1.attribute("age").is_none());

    registry.publish_type_def_update(SOURCE, person_v2).unwrap();
    let current = registry.require_type_def_by_name(SOURCE, "Person").unwrap();
    assert_eq!(current.version, 2);

    // The same patch no longer applies: the registry moved on
    let err = engine.apply_patch(SOURCE, &current, &patch).unwrap_err();
    assert!(matches!(err, CoreError::PatchError { .. }));
}

// =============================================================================
// Instance Creation
// =============================================================================

#[test]
fn test_skeleton_entity_fully_stamped() {
    let registry = seeded_registry();
    let factory = InstanceFactory::new(Arc::clone(&registry));

    let entity = factory
        .get_skeleton_entity(SOURCE, "alice", InstanceProvenanceType::LocalCohort, "Person")
        .unwrap();

    assert_eq!(entity.header.version, 1);
    assert_eq!(entity.header.created_by, "alice");
    assert_eq!(entity.header.status, InstanceStatus::Active);
    assert_eq!(entity.header.metadata_collection_id, "mcid-repo-a");
    assert_eq!(entity.header.instance_type.type_def_name, "Person");
    assert!(entity
        .header
        .instance_url
        .as_deref()
        .unwrap()
        .contains(&entity.header.guid));

    // GUIDs are fresh per instance
    let other = factory
        .get_skeleton_entity(SOURCE, "alice", InstanceProvenanceType::LocalCohort, "Person")
        .unwrap();
    assert_ne!(entity.header.guid, other.header.guid);
}

#[test]
fn test_classification_not_applicable_is_type_error() {
    let registry = seeded_registry();
    let factory = InstanceFactory::new(Arc::clone(&registry));

    let err = factory
        .get_skeleton_classification(SOURCE, "alice", "Confidential", "Document")
        .unwrap_err();
    assert!(matches!(err, CoreError::TypeError { .. }));
    assert_eq!(err.status_code(), 404);
}

// =============================================================================
// Validation at the Exchange Boundary
// =============================================================================

#[test]
fn test_new_entity_round_trips_through_validation() {
    let registry = seeded_registry();
    let factory = InstanceFactory::new(Arc::clone(&registry));
    let validator = Validator::new(Arc::clone(&registry));

    let mut properties = InstanceProperties::new();
    properties.insert("employee_id", InstancePropertyValue::string("E-7"));
    properties.insert("name", InstancePropertyValue::string("alice"));

    let entity = factory
        .get_new_entity(
            SOURCE,
            "alice",
            InstanceProvenanceType::LocalCohort,
            "Person",
            Some(properties),
            None,
        )
        .unwrap();

    let person = registry.require_type_def_by_name(SOURCE, "Person").unwrap();
    validator
        .validate_properties_for_type(SOURCE, &person, entity.properties.as_ref())
        .unwrap();

    // A peer-style null value is rejected, not dropped
    let mut with_null = InstanceProperties::new();
    with_null.insert_null("name");
    let err = validator
        .validate_properties_for_type(SOURCE, &person, Some(&with_null))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::PropertyError {
            kind: PropertyErrorKind::NullPropertyValue,
            ..
        }
    ));
}

#[test]
fn test_relationship_end_mismatch_rejected() {
    let registry = seeded_registry();
    let factory = InstanceFactory::new(Arc::clone(&registry));
    let validator = Validator::new(Arc::clone(&registry));

    let person = factory
        .get_skeleton_entity(SOURCE, "alice", InstanceProvenanceType::LocalCohort, "Person")
        .unwrap();
    let organization = factory
        .get_skeleton_entity(
            SOURCE,
            "alice",
            InstanceProvenanceType::LocalCohort,
            "Organization",
        )
        .unwrap();

    let mut relationship = factory
        .get_skeleton_relationship(
            SOURCE,
            "alice",
            InstanceProvenanceType::LocalCohort,
            "Employment",
        )
        .unwrap();
    relationship.entity_one_proxy = Some(factory.get_new_entity_proxy(SOURCE, &person));
    relationship.entity_two_proxy = Some(factory.get_new_entity_proxy(SOURCE, &organization));

    let employment = registry.require_type_def_by_name(SOURCE, "Employment").unwrap();
    validator
        .validate_relationship_ends(SOURCE, &relationship, &employment)
        .unwrap();

    // A Person at the Organization end fails positionally
    relationship.entity_two_proxy = Some(factory.get_new_entity_proxy(SOURCE, &person));
    let err = validator
        .validate_relationship_ends(SOURCE, &relationship, &employment)
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidRelationshipEnds { .. }));
    assert_eq!(err.status_code(), 400);
}

#[test]
fn test_double_delete_rejected() {
    let registry = seeded_registry();
    let factory = InstanceFactory::new(Arc::clone(&registry));
    let validator = Validator::new(Arc::clone(&registry));

    let entity = factory
        .get_skeleton_entity(SOURCE, "alice", InstanceProvenanceType::LocalCohort, "Person")
        .unwrap();
    validator
        .validate_instance_status_for_delete(SOURCE, &entity.header)
        .unwrap();

    // Soft delete: status change plus version bump
    let mut deleted = entity.header.clone();
    deleted.status = InstanceStatus::Deleted;
    factory.increment_version("alice", &entity.header, &mut deleted);
    assert_eq!(deleted.version, 2);

    let err = validator
        .validate_instance_status_for_delete(SOURCE, &deleted)
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidParameter { .. }));
    // But restore preconditions now hold
    validator.validate_entity_is_deleted(SOURCE, &deleted).unwrap();
}

// =============================================================================
// Archives on Disk
// =============================================================================

#[test]
fn test_archive_discovery_and_load_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("open-types.json");
    open_types_archive().to_file(&path).unwrap();

    let found = discover_archives(&[dir.path().to_path_buf()]);
    assert_eq!(found.len(), 1);

    let registry = Arc::new(TypeRegistry::new("mcid-repo-b", None));
    let archive = TypeArchive::from_file(&found[0]).unwrap();
    let added = registry.load_archive("repoB", &archive).unwrap();
    assert_eq!(added, 5);
    assert!(registry.get_type_def_by_name("repoB", "Person").is_some());

    // Loading the same archive again is idempotent
    let added = registry.load_archive("repoB", &archive).unwrap();
    assert_eq!(added, 0);
}
