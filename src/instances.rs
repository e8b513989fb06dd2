//! Instance model
//!
//! Entities, relationships and classifications as they travel between
//! repositories. Instances carry their type by reference (an
//! [`InstanceType`] stamped from the registry), an audit trail and the
//! identity of the repository that owns the master copy.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::typedefs::{PrimitiveCategory, TypeDefCategory};

/// Lifecycle status of an instance. Deletes are soft: the instance moves
/// to `Deleted` and keeps its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Unknown,
    Proposed,
    Draft,
    Prepared,
    Active,
    Deleted,
}

/// Where the master copy of an instance came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceProvenanceType {
    Unknown,
    LocalCohort,
    ExportArchive,
    ContentPack,
    DeregisteredRepository,
}

/// How a classification came to be attached to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationOrigin {
    /// Attached directly to the entity
    Assigned,
    /// Propagated along a relationship from another entity
    Propagated,
}

/// Match semantics for multi-property searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCriteria {
    All,
    Any,
    None,
}

/// Reference to the TypeDef an instance was stamped with. Carried on every
/// instance so a receiver can validate without resolving the full TypeDef.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub type_def_guid: String,
    pub type_def_name: String,
    pub type_def_version: u64,
    pub type_def_category: TypeDefCategory,
    pub valid_statuses: Vec<InstanceStatus>,
}

/// A single typed primitive value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveValue {
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(DateTime<Utc>),
}

impl PrimitiveValue {
    pub fn category(&self) -> PrimitiveCategory {
        match self {
            PrimitiveValue::Boolean(_) => PrimitiveCategory::Boolean,
            PrimitiveValue::Int(_) => PrimitiveCategory::Int,
            PrimitiveValue::Float(_) => PrimitiveCategory::Float,
            PrimitiveValue::String(_) => PrimitiveCategory::String,
            PrimitiveValue::Date(_) => PrimitiveCategory::Date,
        }
    }
}

/// One property value on an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstancePropertyValue {
    Primitive(PrimitiveValue),
    Enum { ordinal: i32, symbol: String },
    Struct(InstanceProperties),
    Array(Vec<InstancePropertyValue>),
    Map(BTreeMap<String, InstancePropertyValue>),
}

impl InstancePropertyValue {
    pub fn string(value: impl Into<String>) -> Self {
        InstancePropertyValue::Primitive(PrimitiveValue::String(value.into()))
    }

    pub fn int(value: i64) -> Self {
        InstancePropertyValue::Primitive(PrimitiveValue::Int(value))
    }

    pub fn boolean(value: bool) -> Self {
        InstancePropertyValue::Primitive(PrimitiveValue::Boolean(value))
    }
}

/// Named property values for an instance.
///
/// Values are `Option` because peers may send explicit JSON nulls; those
/// are preserved here so the validator can reject them rather than having
/// them silently vanish during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceProperties {
    properties: BTreeMap<String, Option<InstancePropertyValue>>,
}

impl InstanceProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: InstancePropertyValue) {
        self.properties.insert(name.into(), Some(value));
    }

    /// Record an explicit null for a property, as received from a peer
    pub fn insert_null(&mut self, name: impl Into<String>) {
        self.properties.insert(name.into(), None);
    }

    pub fn get(&self, name: &str) -> Option<&Option<InstancePropertyValue>> {
        self.properties.get(name)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Option<InstancePropertyValue>)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fold another property set into this one. Incoming entries win on
    /// name collisions; explicit nulls are carried over as-is.
    pub fn extend_from(&mut self, other: InstanceProperties) {
        self.properties.extend(other.properties);
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Audit and provenance fields shared by every instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceHeader {
    pub guid: String,
    pub instance_type: InstanceType,
    pub status: InstanceStatus,
    pub created_by: String,
    pub create_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    /// Bumped on every mutation of the master copy
    pub version: u64,
    /// Metadata collection that owns the master copy
    pub metadata_collection_id: String,
    pub provenance: InstanceProvenanceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_url: Option<String>,
}

/// A classification attached to an entity. Classifications have no GUID of
/// their own; they are identified by name within their entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub name: String,
    pub instance_type: InstanceType,
    pub status: InstanceStatus,
    pub created_by: String,
    pub create_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
    pub version: u64,
    pub origin: ClassificationOrigin,
    /// GUID of the entity the classification propagated from, when the
    /// origin is `Propagated`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<InstanceProperties>,
}

/// Header plus classifications, without the property payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    #[serde(flatten)]
    pub header: InstanceHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifications: Option<Vec<Classification>>,
}

/// The full master-copy view of an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDetail {
    #[serde(flatten)]
    pub header: InstanceHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<InstanceProperties>,
    /// Kept sorted by classification name; an empty set is stored as
    /// `None`, never `Some(empty)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classifications: Option<Vec<Classification>>,
}

impl EntityDetail {
    /// The header-and-classifications view, exchanged when the property
    /// payload is not needed
    pub fn summary(&self) -> EntitySummary {
        EntitySummary {
            header: self.header.clone(),
            classifications: self.classifications.clone(),
        }
    }
}

/// Enough of an entity to anchor a relationship end: the header plus the
/// unique-flagged properties only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityProxy {
    #[serde(flatten)]
    pub header: InstanceHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_properties: Option<InstanceProperties>,
}

/// A relationship between two entities, referenced by proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    #[serde(flatten)]
    pub header: InstanceHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<InstanceProperties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_one_proxy: Option<EntityProxy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_two_proxy: Option<EntityProxy>,
}
