//! Structural validation of types and instances
//!
//! The validator answers two kinds of question: parameter guards that
//! connectors run at their entry points (user id, GUID, type name, search
//! criteria) and structural checks on instances against their types
//! (property compatibility, relationship ends, status transitions,
//! reference-copy provenance, property search matching).
//!
//! Every check is pure per call; the registry is only consulted for type
//! resolution.

use std::sync::Arc;

use regex::Regex;

use crate::error::{self, CoreError, PropertyErrorKind, Result};
use crate::instances::{
    EntityProxy, InstanceHeader, InstanceProperties, InstancePropertyValue, InstanceStatus,
    MatchCriteria, PrimitiveValue, Relationship,
};
use crate::registry::TypeRegistry;
use crate::typedefs::{AttributeTypeDefCategory, TypeDef, TypeDefKind};

pub struct Validator {
    registry: Arc<TypeRegistry>,
}

impl Validator {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    // ------------------------------------------------------------------
    // Parameter guards
    // ------------------------------------------------------------------

    pub fn validate_user_id(&self, source_name: &str, user_id: &str) -> Result<()> {
        if user_id.is_empty() {
            return Err(CoreError::invalid_parameter(
                source_name,
                "validate_user_id",
                "the user id is empty",
            ));
        }
        Ok(())
    }

    pub fn validate_guid(
        &self,
        source_name: &str,
        parameter_name: &str,
        guid: &str,
    ) -> Result<()> {
        if guid.is_empty() {
            return Err(CoreError::invalid_parameter(
                source_name,
                "validate_guid",
                format!("the GUID passed as {parameter_name} is empty"),
            ));
        }
        Ok(())
    }

    /// Guard a type-name parameter: it must be non-empty and known to the
    /// registry
    pub fn validate_type_name(
        &self,
        source_name: &str,
        parameter_name: &str,
        type_name: &str,
    ) -> Result<()> {
        if type_name.is_empty() {
            return Err(CoreError::invalid_parameter(
                source_name,
                "validate_type_name",
                format!("the type name passed as {parameter_name} is empty"),
            ));
        }
        if self.registry.get_type_def_by_name(source_name, type_name).is_none() {
            return Err(CoreError::type_error(
                source_name,
                "validate_type_name",
                format!("type name {type_name} is not known to this repository"),
            ));
        }
        Ok(())
    }

    pub fn validate_home_metadata_collection_id(
        &self,
        source_name: &str,
        parameter_name: &str,
        metadata_collection_id: &str,
    ) -> Result<()> {
        if metadata_collection_id.is_empty() {
            return Err(CoreError::invalid_parameter(
                source_name,
                "validate_home_metadata_collection_id",
                format!("the metadata collection id passed as {parameter_name} is empty"),
            ));
        }
        Ok(())
    }

    pub fn validate_search_criteria(
        &self,
        source_name: &str,
        parameter_name: &str,
        search_criteria: &str,
    ) -> Result<()> {
        if search_criteria.is_empty() {
            return Err(CoreError::invalid_parameter(
                source_name,
                "validate_search_criteria",
                format!("the search criteria passed as {parameter_name} is empty"),
            ));
        }
        Ok(())
    }

    /// Match criteria and match properties travel together: supplying one
    /// without the other is a caller mistake
    pub fn validate_match_criteria(
        &self,
        source_name: &str,
        match_criteria: Option<MatchCriteria>,
        match_properties: Option<&InstanceProperties>,
    ) -> Result<()> {
        match (match_criteria, match_properties) {
            (None, None) | (Some(_), Some(_)) => Ok(()),
            (Some(_), None) => Err(CoreError::invalid_parameter(
                source_name,
                "validate_match_criteria",
                "match criteria supplied without match properties",
            )),
            (None, Some(_)) => Err(CoreError::invalid_parameter(
                source_name,
                "validate_match_criteria",
                "match properties supplied without match criteria",
            )),
        }
    }

    // ------------------------------------------------------------------
    // Instance structure
    // ------------------------------------------------------------------

    /// Check every supplied property against the type's attribute
    /// definitions. Fails on the first offending property.
    pub fn validate_properties_for_type(
        &self,
        source_name: &str,
        type_def: &TypeDef,
        properties: Option<&InstanceProperties>,
    ) -> Result<()> {
        const METHOD: &str = "validate_properties_for_type";

        let Some(properties) = properties.filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        let Some(attributes) = type_def.properties.as_deref() else {
            return Err(CoreError::property_error(
                PropertyErrorKind::NoPropertiesForType,
                source_name,
                METHOD,
                format!(
                    "type {} declares no attributes but {} properties were supplied",
                    type_def.name,
                    properties.len()
                ),
            ));
        };

        for (name, value) in properties.iter() {
            let Some(attribute) = attributes.iter().find(|a| a.name == name) else {
                return Err(CoreError::property_error(
                    PropertyErrorKind::BadPropertyForType,
                    source_name,
                    METHOD,
                    format!("property {name} is not declared on type {}", type_def.name),
                ));
            };
            let Some(value) = value else {
                return Err(CoreError::property_error(
                    PropertyErrorKind::NullPropertyValue,
                    source_name,
                    METHOD,
                    format!("property {name} of type {} carries a null value", type_def.name),
                ));
            };

            let compatible = match (value, attribute.attribute_type.category) {
                (InstancePropertyValue::Primitive(_), AttributeTypeDefCategory::Primitive) => true,
                (InstancePropertyValue::Enum { .. }, AttributeTypeDefCategory::EnumDef) => true,
                (
                    InstancePropertyValue::Struct(_)
                    | InstancePropertyValue::Array(_)
                    | InstancePropertyValue::Map(_),
                    AttributeTypeDefCategory::Collection,
                ) => true,
                _ => false,
            };
            if !compatible {
                return Err(CoreError::property_error(
                    PropertyErrorKind::BadPropertyType,
                    source_name,
                    METHOD,
                    format!(
                        "property {name} of type {} does not match its declared {} attribute type {}",
                        type_def.name,
                        attribute.attribute_type.category.type_name(),
                        attribute.attribute_type.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Check the relationship's proxies against the positional end
    /// constraints of its type. A RelationshipDef that is not actually a
    /// relationship is registry corruption, not a caller mistake.
    pub fn validate_relationship_ends(
        &self,
        source_name: &str,
        relationship: &Relationship,
        type_def: &TypeDef,
    ) -> Result<()> {
        const METHOD: &str = "validate_relationship_ends";

        let TypeDefKind::RelationshipDef { end_one, end_two } = &type_def.kind else {
            error::logic_error(
                source_name,
                METHOD,
                &format!("type {} is not a relationship definition", type_def.name),
            );
        };

        for (position, end_def, proxy) in [
            (1, end_one, relationship.entity_one_proxy.as_ref()),
            (2, end_two, relationship.entity_two_proxy.as_ref()),
        ] {
            let Some(proxy) = proxy else {
                return Err(CoreError::invalid_relationship_ends(
                    source_name,
                    METHOD,
                    format!(
                        "relationship {} has no entity proxy at end {position}",
                        relationship.header.guid
                    ),
                ));
            };
            let proxy_type = &proxy.header.instance_type;
            if proxy_type.type_def_guid != end_def.entity_type.guid
                || proxy_type.type_def_name != end_def.entity_type.name
            {
                return Err(CoreError::invalid_relationship_ends(
                    source_name,
                    METHOD,
                    format!(
                        "end {position} of relationship type {} requires entities of type {} but the proxy is a {}",
                        type_def.name, end_def.entity_type.name, proxy_type.type_def_name
                    ),
                ));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Status transitions
    // ------------------------------------------------------------------

    /// A status supplied on an instance must be one its type allows. No
    /// status at all is fine; the factory will stamp the initial status.
    pub fn validate_instance_status(
        &self,
        source_name: &str,
        status: Option<InstanceStatus>,
        type_def: &TypeDef,
    ) -> Result<()> {
        let Some(status) = status else {
            return Ok(());
        };
        if !type_def.valid_statuses.contains(&status) {
            return Err(CoreError::status_not_supported(
                source_name,
                "validate_instance_status",
                format!("type {} does not support status {status:?}", type_def.name),
            ));
        }
        Ok(())
    }

    /// A status-change request must name the new status explicitly
    pub fn validate_new_status(
        &self,
        source_name: &str,
        status: Option<InstanceStatus>,
        type_def: &TypeDef,
    ) -> Result<()> {
        let Some(status) = status else {
            return Err(CoreError::invalid_parameter(
                source_name,
                "validate_new_status",
                "no new status was supplied",
            ));
        };
        if !type_def.valid_statuses.contains(&status) {
            return Err(CoreError::status_not_supported(
                source_name,
                "validate_new_status",
                format!("type {} does not support status {status:?}", type_def.name),
            ));
        }
        Ok(())
    }

    /// May this instance be (soft-)deleted?
    pub fn validate_instance_status_for_delete(
        &self,
        source_name: &str,
        header: &InstanceHeader,
    ) -> Result<()> {
        const METHOD: &str = "validate_instance_status_for_delete";

        if !header
            .instance_type
            .valid_statuses
            .contains(&InstanceStatus::Deleted)
        {
            return Err(CoreError::status_not_supported(
                source_name,
                METHOD,
                format!(
                    "type {} does not support soft delete",
                    header.instance_type.type_def_name
                ),
            ));
        }
        if header.status == InstanceStatus::Deleted {
            return Err(CoreError::invalid_parameter(
                source_name,
                METHOD,
                format!("instance {} is already deleted", header.guid),
            ));
        }
        Ok(())
    }

    /// Assert that an entity is in the deleted state, as restore and purge
    /// require
    pub fn validate_entity_is_deleted(
        &self,
        source_name: &str,
        header: &InstanceHeader,
    ) -> Result<()> {
        if header.status != InstanceStatus::Deleted {
            return Err(CoreError::invalid_parameter(
                source_name,
                "validate_entity_is_deleted",
                format!("entity {} is not in the deleted state", header.guid),
            ));
        }
        Ok(())
    }

    pub fn validate_relationship_is_deleted(
        &self,
        source_name: &str,
        header: &InstanceHeader,
    ) -> Result<()> {
        if header.status != InstanceStatus::Deleted {
            return Err(CoreError::invalid_parameter(
                source_name,
                "validate_relationship_is_deleted",
                format!("relationship {} is not in the deleted state", header.guid),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reference copies and proxies
    // ------------------------------------------------------------------

    /// A reference copy must be homed in some other repository and must
    /// carry a resolvable type
    pub fn validate_reference_instance_header(
        &self,
        source_name: &str,
        header: &InstanceHeader,
    ) -> Result<()> {
        const METHOD: &str = "validate_reference_instance_header";

        if header.metadata_collection_id.is_empty() {
            return Err(CoreError::invalid_parameter(
                source_name,
                METHOD,
                format!("reference copy {} carries no home metadata collection id", header.guid),
            ));
        }
        if header.metadata_collection_id == self.registry.local_metadata_collection_id() {
            return Err(CoreError::invalid_parameter(
                source_name,
                METHOD,
                format!(
                    "instance {} is homed in this repository and must not arrive as a reference copy",
                    header.guid
                ),
            ));
        }
        if !self.registry.is_known_type(
            source_name,
            &header.instance_type.type_def_guid,
            &header.instance_type.type_def_name,
        ) {
            return Err(CoreError::type_error(
                source_name,
                METHOD,
                format!(
                    "reference copy {} is stamped with unknown type {}",
                    header.guid, header.instance_type.type_def_name
                ),
            ));
        }
        Ok(())
    }

    /// An entity proxy stands in for an entity owned elsewhere; a proxy for
    /// a locally-homed entity is a caller mistake
    pub fn validate_entity_proxy(&self, source_name: &str, proxy: &EntityProxy) -> Result<()> {
        const METHOD: &str = "validate_entity_proxy";

        self.validate_guid(source_name, "proxy.guid", &proxy.header.guid)?;
        if proxy.header.metadata_collection_id.is_empty() {
            return Err(CoreError::invalid_parameter(
                source_name,
                METHOD,
                format!("entity proxy {} carries no home metadata collection id", proxy.header.guid),
            ));
        }
        if proxy.header.metadata_collection_id == self.registry.local_metadata_collection_id() {
            return Err(CoreError::invalid_parameter(
                source_name,
                METHOD,
                format!(
                    "entity {} is homed in this repository; pass the entity itself rather than a proxy",
                    proxy.header.guid
                ),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Search matching
    // ------------------------------------------------------------------

    /// Does any string-valued property match the search criteria? The
    /// criteria is a regex that must match a whole value; matching recurses
    /// through struct, array and map values and stops at the first hit.
    pub fn verify_instance_properties_match_search_criteria(
        &self,
        source_name: &str,
        properties: Option<&InstanceProperties>,
        search_criteria: &str,
    ) -> Result<bool> {
        const METHOD: &str = "verify_instance_properties_match_search_criteria";

        self.validate_search_criteria(source_name, "search_criteria", search_criteria)?;
        let matcher = Regex::new(&format!("^(?:{search_criteria})$")).map_err(|e| {
            CoreError::invalid_parameter(
                source_name,
                METHOD,
                format!("search criteria is not a valid regular expression: {e}"),
            )
        })?;

        let Some(properties) = properties else {
            return Ok(false);
        };
        Ok(properties
            .iter()
            .filter_map(|(_, value)| value.as_ref())
            .any(|value| value_matches(value, &matcher)))
    }

    /// How many of the match properties appear in the instance with an
    /// equal value?
    pub fn count_matching_property_values(
        &self,
        _source_name: &str,
        match_properties: &InstanceProperties,
        instance_properties: Option<&InstanceProperties>,
    ) -> usize {
        let Some(instance_properties) = instance_properties else {
            return 0;
        };
        match_properties
            .iter()
            .filter(|(name, match_value)| match match_value {
                Some(match_value) => {
                    instance_properties.get(name) == Some(&Some((*match_value).clone()))
                }
                None => false,
            })
            .count()
    }

    /// Apply All/Any/None semantics over the matching-property count
    pub fn verify_matching_instance_property_values(
        &self,
        source_name: &str,
        match_properties: Option<&InstanceProperties>,
        instance_properties: Option<&InstanceProperties>,
        match_criteria: MatchCriteria,
    ) -> bool {
        let Some(match_properties) = match_properties.filter(|p| !p.is_empty()) else {
            return true;
        };
        let count =
            self.count_matching_property_values(source_name, match_properties, instance_properties);
        match match_criteria {
            MatchCriteria::All => count == match_properties.len(),
            MatchCriteria::Any => count > 0,
            MatchCriteria::None => count == 0,
        }
    }
}

fn value_matches(value: &InstancePropertyValue, matcher: &Regex) -> bool {
    match value {
        InstancePropertyValue::Primitive(PrimitiveValue::String(s)) => matcher.is_match(s),
        InstancePropertyValue::Primitive(_) => false,
        InstancePropertyValue::Enum { symbol, .. } => matcher.is_match(symbol),
        InstancePropertyValue::Struct(nested) => nested
            .iter()
            .filter_map(|(_, v)| v.as_ref())
            .any(|v| value_matches(v, matcher)),
        InstancePropertyValue::Array(elements) => {
            elements.iter().any(|v| value_matches(v, matcher))
        }
        InstancePropertyValue::Map(entries) => {
            entries.values().any(|v| value_matches(v, matcher))
        }
    }
}
