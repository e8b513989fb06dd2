//! Type definition model
//!
//! TypeDefs are the versioned schemas exchanged between repositories in the
//! federation. They are immutable once published: every change goes through
//! the patch engine and produces a new value with an incremented version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::instances::InstanceStatus;

/// Category of a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeDefCategory {
    EntityDef,
    RelationshipDef,
    ClassificationDef,
}

impl TypeDefCategory {
    pub fn type_name(&self) -> &'static str {
        match self {
            TypeDefCategory::EntityDef => "EntityDef",
            TypeDefCategory::RelationshipDef => "RelationshipDef",
            TypeDefCategory::ClassificationDef => "ClassificationDef",
        }
    }
}

/// Category of an attribute type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeTypeDefCategory {
    Primitive,
    EnumDef,
    Collection,
}

impl AttributeTypeDefCategory {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeTypeDefCategory::Primitive => "Primitive",
            AttributeTypeDefCategory::EnumDef => "EnumDef",
            AttributeTypeDefCategory::Collection => "Collection",
        }
    }
}

/// Storage category for primitive property values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveCategory {
    Boolean,
    Int,
    Float,
    String,
    Date,
}

/// Shape of a collection attribute. The validator does not distinguish
/// collection shapes when checking property compatibility; this is kept for
/// archive fidelity and documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Array,
    Map,
    Struct,
}

/// Cardinality of an attribute or relationship end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeCardinality {
    AtMostOne,
    OneOnly,
    AnyNumberUnordered,
    AnyNumberOrdered,
}

/// Lightweight reference to a TypeDef
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefLink {
    pub guid: String,
    pub name: String,
}

impl TypeDefLink {
    pub fn new(guid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
        }
    }
}

/// Summary of a TypeDef, exchanged between repositories during
/// reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefSummary {
    pub guid: String,
    pub name: String,
    pub version: u64,
    pub category: TypeDefCategory,
}

/// Reference to an AttributeTypeDef, carried on each TypeDefAttribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTypeDefLink {
    pub guid: String,
    pub name: String,
    pub category: AttributeTypeDefCategory,
}

/// One element of an enum attribute type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumElement {
    pub ordinal: i32,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Mapping from a type or attribute to an element of an external standard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalStandardMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub identifier: String,
}

/// One end of a relationship definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEndDef {
    /// Entity type that instances attached to this end must have
    pub entity_type: TypeDefLink,
    /// Attribute name used when navigating from the other end
    pub attribute_name: String,
    pub cardinality: AttributeCardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A single property declaration within a TypeDef. Names are unique within
/// a TypeDef's property list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefAttribute {
    pub name: String,
    pub attribute_type: AttributeTypeDefLink,
    #[serde(default)]
    pub unique: bool,
    pub cardinality: AttributeCardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TypeDefAttribute {
    pub fn new(name: impl Into<String>, attribute_type: AttributeTypeDefLink) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            unique: false,
            cardinality: AttributeCardinality::AtMostOne,
            description: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Category-specific payload of an AttributeTypeDef
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum AttributeTypeDefPayload {
    Primitive { primitive_category: PrimitiveCategory },
    EnumDef { elements: Vec<EnumElement> },
    Collection { collection_kind: CollectionKind },
}

/// The type of a single property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTypeDef {
    pub guid: String,
    pub name: String,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub payload: AttributeTypeDefPayload,
}

impl AttributeTypeDef {
    pub fn new_primitive(
        guid: impl Into<String>,
        name: impl Into<String>,
        primitive_category: PrimitiveCategory,
    ) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            version: 1,
            description: None,
            payload: AttributeTypeDefPayload::Primitive { primitive_category },
        }
    }

    pub fn new_enum(
        guid: impl Into<String>,
        name: impl Into<String>,
        elements: Vec<EnumElement>,
    ) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            version: 1,
            description: None,
            payload: AttributeTypeDefPayload::EnumDef { elements },
        }
    }

    pub fn new_collection(
        guid: impl Into<String>,
        name: impl Into<String>,
        collection_kind: CollectionKind,
    ) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            version: 1,
            description: None,
            payload: AttributeTypeDefPayload::Collection { collection_kind },
        }
    }

    pub fn category(&self) -> AttributeTypeDefCategory {
        match self.payload {
            AttributeTypeDefPayload::Primitive { .. } => AttributeTypeDefCategory::Primitive,
            AttributeTypeDefPayload::EnumDef { .. } => AttributeTypeDefCategory::EnumDef,
            AttributeTypeDefPayload::Collection { .. } => AttributeTypeDefCategory::Collection,
        }
    }

    pub fn link(&self) -> AttributeTypeDefLink {
        AttributeTypeDefLink {
            guid: self.guid.clone(),
            name: self.name.clone(),
            category: self.category(),
        }
    }
}

/// Category-specific payload of a TypeDef. The category is derived from the
/// variant, so a TypeDef can never carry an unresolvable category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum TypeDefKind {
    EntityDef,
    RelationshipDef {
        end_one: RelationshipEndDef,
        end_two: RelationshipEndDef,
    },
    ClassificationDef {
        /// Entity types this classification may be attached to. An empty
        /// list means the classification applies to any entity type.
        valid_entity_types: Vec<TypeDefLink>,
        propagatable: bool,
    },
}

/// A versioned schema for an entity, relationship or classification
/// category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub guid: String,
    pub name: String,
    /// Monotonic version, bumped by every published patch
    pub version: u64,
    pub version_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Glossary term that provides the detailed description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_type: Option<TypeDefLink>,
    /// Metadata collection id of the archive or repository that defined
    /// this type
    pub origin: String,
    /// Declared properties. `None` means the type declares no properties;
    /// an empty list is never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<TypeDefAttribute>>,
    pub valid_statuses: Vec<InstanceStatus>,
    pub initial_status: InstanceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_standard_mappings: Option<Vec<ExternalStandardMapping>>,
    #[serde(flatten)]
    pub kind: TypeDefKind,
}

impl TypeDef {
    fn new(guid: impl Into<String>, name: impl Into<String>, origin: impl Into<String>, kind: TypeDefKind) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            version: 1,
            version_name: "1.0".to_string(),
            description: None,
            description_guid: None,
            super_type: None,
            origin: origin.into(),
            properties: None,
            valid_statuses: vec![InstanceStatus::Active, InstanceStatus::Deleted],
            initial_status: InstanceStatus::Active,
            options: None,
            external_standard_mappings: None,
            kind,
        }
    }

    /// Create a new entity type definition
    pub fn new_entity_def(
        guid: impl Into<String>,
        name: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self::new(guid, name, origin, TypeDefKind::EntityDef)
    }

    /// Create a new relationship type definition
    pub fn new_relationship_def(
        guid: impl Into<String>,
        name: impl Into<String>,
        origin: impl Into<String>,
        end_one: RelationshipEndDef,
        end_two: RelationshipEndDef,
    ) -> Self {
        Self::new(guid, name, origin, TypeDefKind::RelationshipDef { end_one, end_two })
    }

    /// Create a new classification type definition
    pub fn new_classification_def(
        guid: impl Into<String>,
        name: impl Into<String>,
        origin: impl Into<String>,
        valid_entity_types: Vec<TypeDefLink>,
        propagatable: bool,
    ) -> Self {
        Self::new(
            guid,
            name,
            origin,
            TypeDefKind::ClassificationDef {
                valid_entity_types,
                propagatable,
            },
        )
    }

    /// Set the declared properties (builder style). An empty list is
    /// normalised to `None`.
    pub fn with_properties(mut self, properties: Vec<TypeDefAttribute>) -> Self {
        self.properties = if properties.is_empty() {
            None
        } else {
            Some(properties)
        };
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn category(&self) -> TypeDefCategory {
        match self.kind {
            TypeDefKind::EntityDef => TypeDefCategory::EntityDef,
            TypeDefKind::RelationshipDef { .. } => TypeDefCategory::RelationshipDef,
            TypeDefKind::ClassificationDef { .. } => TypeDefCategory::ClassificationDef,
        }
    }

    pub fn link(&self) -> TypeDefLink {
        TypeDefLink {
            guid: self.guid.clone(),
            name: self.name.clone(),
        }
    }

    pub fn summary(&self) -> TypeDefSummary {
        TypeDefSummary {
            guid: self.guid.clone(),
            name: self.name.clone(),
            version: self.version,
            category: self.category(),
        }
    }

    /// Look up a declared attribute by name
    pub fn attribute(&self, name: &str) -> Option<&TypeDefAttribute> {
        self.properties
            .as_deref()
            .and_then(|attrs| attrs.iter().find(|a| a.name == name))
    }
}

/// Immutable snapshot of a set of type definitions, returned by the
/// registry's gallery and wildcard queries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDefGallery {
    pub type_defs: Vec<TypeDef>,
    pub attribute_type_defs: Vec<AttributeTypeDef>,
}

impl TypeDefGallery {
    pub fn is_empty(&self) -> bool {
        self.type_defs.is_empty() && self.attribute_type_defs.is_empty()
    }
}

/// The single action a patch performs. Actions are mutually exclusive per
/// patch, which the enum makes structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PatchAction {
    AddAttributes {
        attributes: Vec<TypeDefAttribute>,
    },
    AddOptions {
        options: BTreeMap<String, String>,
    },
    UpdateOptions {
        options: BTreeMap<String, String>,
    },
    DeleteOptions {
        option_names: Vec<String>,
    },
    AddExternalStandards {
        mappings: Vec<ExternalStandardMapping>,
    },
    UpdateExternalStandards {
        mappings: Vec<ExternalStandardMapping>,
    },
    DeleteExternalStandards {
        identifiers: Vec<String>,
    },
    UpdateDescriptions {
        /// `None` leaves the current description unchanged; there is no way
        /// to clear a description once set.
        description: Option<String>,
        description_guid: Option<String>,
        /// Per-attribute description updates, matched by attribute name.
        #[serde(default)]
        attribute_descriptions: BTreeMap<String, String>,
    },
}

/// A versioned, additive change to a TypeDef
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefPatch {
    /// GUID of the TypeDef the patch targets
    pub type_def_guid: String,
    pub type_name: String,
    /// Version the patch was built against. The target must be at exactly
    /// this version for the patch to apply.
    pub apply_to_version: u64,
    pub update_to_version: u64,
    pub new_version_name: String,
    #[serde(flatten)]
    pub action: PatchAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_derived_from_kind() {
        let entity = TypeDef::new_entity_def("g1", "Person", "archive");
        assert_eq!(entity.category(), TypeDefCategory::EntityDef);

        let classification =
            TypeDef::new_classification_def("g2", "Confidential", "archive", vec![], false);
        assert_eq!(classification.category(), TypeDefCategory::ClassificationDef);
    }

    #[test]
    fn test_empty_property_list_normalised_to_none() {
        let entity = TypeDef::new_entity_def("g1", "Person", "archive").with_properties(vec![]);
        assert!(entity.properties.is_none());
    }

    #[test]
    fn test_typedef_round_trips_through_json() {
        let string_type =
            AttributeTypeDef::new_primitive("at1", "string", PrimitiveCategory::String);
        let entity = TypeDef::new_entity_def("g1", "Person", "archive")
            .with_properties(vec![TypeDefAttribute::new("name", string_type.link()).unique()]);

        let json = serde_json::to_string(&entity).unwrap();
        let back: TypeDef = serde_json::from_str(&json).unwrap();
        assert_eq!(entity, back);
        assert!(json.contains("\"category\":\"entity_def\""));
    }
}
