//! Type registry
//!
//! Process-wide cache of the type definitions this repository knows about.
//! The registry distinguishes *known* types (everything ever seen, including
//! types accepted from federation peers) from *active* types (the subset
//! instances may be created against). Active is always a subset of known.
//!
//! Reads are served from an immutable snapshot behind `RwLock<Arc<_>>`:
//! readers clone the `Arc` and never block each other, writers build a
//! complete replacement snapshot and swap it in.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::archive::TypeArchive;
use crate::config::RepositoryConfig;
use crate::error::{CoreError, Result};
use crate::fingerprint::TypeFingerprint;
use crate::instances::{InstanceStatus, InstanceType};
use crate::typedefs::{
    AttributeTypeDef, AttributeTypeDefCategory, TypeDef, TypeDefCategory, TypeDefGallery,
    TypeDefKind,
};

/// A disagreement between the local registry and a peer's view of a type,
/// reported by reconciliation. The `name`/`guid` fields identify either a
/// TypeDef or an AttributeTypeDef; both sides of the gallery are compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "conflict", rename_all = "snake_case")]
pub enum TypeDefConflict {
    /// Same GUID, different name (or the reverse)
    IdentityClash {
        guid: String,
        local_name: String,
        peer_name: String,
    },
    /// Same GUID and name, different category
    CategoryMismatch {
        name: String,
        local_category: TypeDefCategory,
        peer_category: TypeDefCategory,
    },
    /// Same GUID and name, different attribute type category
    AttributeCategoryMismatch {
        name: String,
        local_category: AttributeTypeDefCategory,
        peer_category: AttributeTypeDefCategory,
    },
    /// Same GUID and name, peer is at a different version
    VersionMismatch {
        name: String,
        local_version: u64,
        peer_version: u64,
    },
    /// Same GUID, name and version, but the definitions differ in content
    ContentDrift { name: String, version: u64 },
}

#[derive(Debug, Clone, Default)]
struct RegistrySnapshot {
    known_types: HashMap<String, TypeDef>,
    type_guids_by_name: HashMap<String, String>,
    active_types: HashSet<String>,
    known_attribute_types: HashMap<String, AttributeTypeDef>,
    attribute_type_guids_by_name: HashMap<String, String>,
    active_attribute_types: HashSet<String>,
}

impl RegistrySnapshot {
    fn type_def_by_name(&self, name: &str) -> Option<&TypeDef> {
        self.type_guids_by_name
            .get(name)
            .and_then(|guid| self.known_types.get(guid))
    }

    fn attribute_type_def_by_name(&self, name: &str) -> Option<&AttributeTypeDef> {
        self.attribute_type_guids_by_name
            .get(name)
            .and_then(|guid| self.known_attribute_types.get(guid))
    }
}

/// The local repository's view of the federation's type system
pub struct TypeRegistry {
    /// Metadata collection id of the local repository
    local_metadata_collection_id: String,
    /// Root used to mint instance URLs, when configured
    instance_url_root: Option<String>,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl TypeRegistry {
    pub fn new(
        local_metadata_collection_id: impl Into<String>,
        instance_url_root: Option<String>,
    ) -> Self {
        Self {
            local_metadata_collection_id: local_metadata_collection_id.into(),
            instance_url_root,
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
        }
    }

    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new(
            config.metadata_collection_id.clone(),
            config.instance_url_root.clone(),
        )
    }

    pub fn local_metadata_collection_id(&self) -> &str {
        &self.local_metadata_collection_id
    }

    fn read_snapshot(&self) -> Arc<RegistrySnapshot> {
        // A poisoned lock still holds the last complete snapshot
        Arc::clone(&self.snapshot.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Clone the current snapshot, apply `mutate`, and swap the result in.
    /// Readers keep the old snapshot until their `Arc` drops.
    fn update_snapshot<T>(
        &self,
        mutate: impl FnOnce(&mut RegistrySnapshot) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = RegistrySnapshot::clone(&guard);
        let outcome = mutate(&mut next)?;
        *guard = Arc::new(next);
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Galleries and lookups
    // ------------------------------------------------------------------

    /// All types instances may currently be created against
    pub fn active_type_def_gallery(&self) -> TypeDefGallery {
        let snapshot = self.read_snapshot();
        TypeDefGallery {
            type_defs: snapshot
                .active_types
                .iter()
                .filter_map(|guid| snapshot.known_types.get(guid))
                .cloned()
                .collect(),
            attribute_type_defs: snapshot
                .active_attribute_types
                .iter()
                .filter_map(|guid| snapshot.known_attribute_types.get(guid))
                .cloned()
                .collect(),
        }
    }

    /// Every type this repository has ever seen, peer-accepted ones included
    pub fn known_type_def_gallery(&self) -> TypeDefGallery {
        let snapshot = self.read_snapshot();
        TypeDefGallery {
            type_defs: snapshot.known_types.values().cloned().collect(),
            attribute_type_defs: snapshot.known_attribute_types.values().cloned().collect(),
        }
    }

    /// Advisory lookup by name. `None` is not an error; callers probing for
    /// optional types use this form.
    pub fn get_type_def_by_name(&self, source_name: &str, name: &str) -> Option<TypeDef> {
        let found = self.read_snapshot().type_def_by_name(name).cloned();
        if found.is_none() {
            debug!(source_name, type_name = name, "type name not known");
        }
        found
    }

    pub fn get_attribute_type_def_by_name(
        &self,
        source_name: &str,
        name: &str,
    ) -> Option<AttributeTypeDef> {
        let found = self.read_snapshot().attribute_type_def_by_name(name).cloned();
        if found.is_none() {
            debug!(source_name, attribute_type_name = name, "attribute type name not known");
        }
        found
    }

    /// Lookup by GUID; an unknown GUID is an error because callers passing
    /// GUIDs got them from an instance or a peer, so a miss means stale or
    /// corrupt data.
    pub fn get_type_def(&self, source_name: &str, guid: &str) -> Result<TypeDef> {
        self.read_snapshot()
            .known_types
            .get(guid)
            .cloned()
            .ok_or_else(|| {
                CoreError::type_error(
                    source_name,
                    "get_type_def",
                    format!("type definition GUID {guid} is not known to this repository"),
                )
            })
    }

    pub fn get_attribute_type_def(
        &self,
        source_name: &str,
        guid: &str,
    ) -> Result<AttributeTypeDef> {
        self.read_snapshot()
            .known_attribute_types
            .get(guid)
            .cloned()
            .ok_or_else(|| {
                CoreError::type_error(
                    source_name,
                    "get_attribute_type_def",
                    format!("attribute type GUID {guid} is not known to this repository"),
                )
            })
    }

    /// Name-keyed lookup that treats a miss as an error, for callers that
    /// require the type to exist
    pub fn require_type_def_by_name(&self, source_name: &str, name: &str) -> Result<TypeDef> {
        self.read_snapshot()
            .type_def_by_name(name)
            .cloned()
            .ok_or_else(|| {
                CoreError::type_error(
                    source_name,
                    "require_type_def_by_name",
                    format!("type name {name} is not known to this repository"),
                )
            })
    }

    pub fn require_attribute_type_def_by_name(
        &self,
        source_name: &str,
        name: &str,
    ) -> Result<AttributeTypeDef> {
        self.read_snapshot()
            .attribute_type_def_by_name(name)
            .cloned()
            .ok_or_else(|| {
                CoreError::type_error(
                    source_name,
                    "require_attribute_type_def_by_name",
                    format!("attribute type name {name} is not known to this repository"),
                )
            })
    }

    /// Active types whose names match a `*` wildcard pattern. All other
    /// characters match literally.
    pub fn get_active_types_by_wildcard_name(
        &self,
        source_name: &str,
        wildcard: &str,
    ) -> TypeDefGallery {
        let pattern = wildcard_to_regex(wildcard);
        let Ok(matcher) = Regex::new(&pattern) else {
            debug!(source_name, wildcard, "wildcard did not compile to a regex");
            return TypeDefGallery::default();
        };

        let snapshot = self.read_snapshot();
        TypeDefGallery {
            type_defs: snapshot
                .active_types
                .iter()
                .filter_map(|guid| snapshot.known_types.get(guid))
                .filter(|t| matcher.is_match(&t.name))
                .cloned()
                .collect(),
            attribute_type_defs: snapshot
                .active_attribute_types
                .iter()
                .filter_map(|guid| snapshot.known_attribute_types.get(guid))
                .filter(|t| matcher.is_match(&t.name))
                .cloned()
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // Predicates (advisory; never fail)
    // ------------------------------------------------------------------

    /// Is `type_name` an active type of the given category?
    pub fn is_valid_type_category(
        &self,
        _source_name: &str,
        category: TypeDefCategory,
        type_name: &str,
    ) -> bool {
        let snapshot = self.read_snapshot();
        snapshot
            .type_def_by_name(type_name)
            .filter(|t| snapshot.active_types.contains(&t.guid))
            .map(|t| t.category() == category)
            .unwrap_or(false)
    }

    /// May the named classification be attached to an entity of
    /// `entity_type_name`? Walks the entity's supertype chain. A
    /// classification with an empty valid-entity-type list applies to any
    /// entity type.
    pub fn is_valid_classification_for_entity(
        &self,
        source_name: &str,
        classification_name: &str,
        entity_type_name: &str,
    ) -> bool {
        let snapshot = self.read_snapshot();
        let Some(classification) = snapshot.type_def_by_name(classification_name) else {
            debug!(source_name, classification_name, "classification type not known");
            return false;
        };
        let TypeDefKind::ClassificationDef {
            valid_entity_types, ..
        } = &classification.kind
        else {
            return false;
        };
        if valid_entity_types.is_empty() {
            return true;
        }

        let mut current = snapshot.type_def_by_name(entity_type_name);
        while let Some(entity_type) = current {
            if valid_entity_types.iter().any(|l| l.name == entity_type.name) {
                return true;
            }
            current = entity_type
                .super_type
                .as_ref()
                .and_then(|link| snapshot.known_types.get(&link.guid));
        }
        false
    }

    pub fn is_known_type(&self, _source_name: &str, guid: &str, name: &str) -> bool {
        self.read_snapshot()
            .known_types
            .get(guid)
            .map(|t| t.name == name)
            .unwrap_or(false)
    }

    pub fn is_active_type(&self, _source_name: &str, guid: &str, name: &str) -> bool {
        let snapshot = self.read_snapshot();
        snapshot.active_types.contains(guid)
            && snapshot
                .known_types
                .get(guid)
                .map(|t| t.name == name)
                .unwrap_or(false)
    }

    /// A type is open when it was defined outside this repository, that is,
    /// its origin is an archive or a peer rather than the local collection
    pub fn is_open_type(&self, source_name: &str, guid: &str, name: &str) -> bool {
        self.is_known_type(source_name, guid, name)
            && self
                .read_snapshot()
                .known_types
                .get(guid)
                .map(|t| t.origin != self.local_metadata_collection_id)
                .unwrap_or(false)
    }

    /// Does the (guid, name, category) triple describe a known type
    /// consistently?
    pub fn valid_type_id(
        &self,
        _source_name: &str,
        guid: &str,
        name: &str,
        category: TypeDefCategory,
    ) -> bool {
        self.read_snapshot()
            .known_types
            .get(guid)
            .map(|t| t.name == name && t.category() == category)
            .unwrap_or(false)
    }

    pub fn valid_attribute_type_def_id(
        &self,
        _source_name: &str,
        guid: &str,
        name: &str,
        category: AttributeTypeDefCategory,
    ) -> bool {
        self.read_snapshot()
            .known_attribute_types
            .get(guid)
            .map(|t| t.name == name && t.category() == category)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Instance support
    // ------------------------------------------------------------------

    /// Build the [`InstanceType`] stamp for new instances of an active type
    pub fn get_instance_type(&self, source_name: &str, type_name: &str) -> Result<InstanceType> {
        let snapshot = self.read_snapshot();
        let type_def = snapshot
            .type_def_by_name(type_name)
            .filter(|t| snapshot.active_types.contains(&t.guid))
            .ok_or_else(|| {
                CoreError::type_error(
                    source_name,
                    "get_instance_type",
                    format!("type {type_name} is not active in this repository"),
                )
            })?;
        Ok(InstanceType {
            type_def_guid: type_def.guid.clone(),
            type_def_name: type_def.name.clone(),
            type_def_version: type_def.version,
            type_def_category: type_def.category(),
            valid_statuses: type_def.valid_statuses.clone(),
        })
    }

    /// Status stamped on new instances of the named type
    pub fn get_initial_status(&self, source_name: &str, type_name: &str) -> Result<InstanceStatus> {
        let snapshot = self.read_snapshot();
        snapshot
            .type_def_by_name(type_name)
            .filter(|t| snapshot.active_types.contains(&t.guid))
            .map(|t| t.initial_status)
            .ok_or_else(|| {
                CoreError::type_error(
                    source_name,
                    "get_initial_status",
                    format!("type {type_name} is not active in this repository"),
                )
            })
    }

    /// Browse URL for an instance, when a URL root is configured
    pub fn get_instance_url(&self, guid: &str) -> Option<String> {
        self.instance_url_root
            .as_ref()
            .map(|root| format!("{}/instances/{}", root.trim_end_matches('/'), guid))
    }

    // ------------------------------------------------------------------
    // Population
    // ------------------------------------------------------------------

    /// Add a new type definition and mark it active. The GUID and name must
    /// both be unused.
    pub fn add_type_def(&self, source_name: &str, type_def: TypeDef) -> Result<()> {
        if type_def.guid.is_empty() || type_def.name.is_empty() {
            return Err(CoreError::invalid_parameter(
                source_name,
                "add_type_def",
                "type definition must carry a non-empty GUID and name",
            ));
        }
        self.update_snapshot(|snapshot| {
            if snapshot.known_types.contains_key(&type_def.guid)
                || snapshot.type_guids_by_name.contains_key(&type_def.name)
            {
                return Err(CoreError::invalid_parameter(
                    source_name,
                    "add_type_def",
                    format!(
                        "type {} (GUID {}) is already defined",
                        type_def.name, type_def.guid
                    ),
                ));
            }
            info!(
                source_name,
                type_name = %type_def.name,
                guid = %type_def.guid,
                version = type_def.version,
                "type definition published"
            );
            snapshot
                .type_guids_by_name
                .insert(type_def.name.clone(), type_def.guid.clone());
            snapshot.active_types.insert(type_def.guid.clone());
            snapshot.known_types.insert(type_def.guid.clone(), type_def);
            Ok(())
        })
    }

    pub fn add_attribute_type_def(
        &self,
        source_name: &str,
        attr_type_def: AttributeTypeDef,
    ) -> Result<()> {
        if attr_type_def.guid.is_empty() || attr_type_def.name.is_empty() {
            return Err(CoreError::invalid_parameter(
                source_name,
                "add_attribute_type_def",
                "attribute type must carry a non-empty GUID and name",
            ));
        }
        self.update_snapshot(|snapshot| {
            if snapshot.known_attribute_types.contains_key(&attr_type_def.guid)
                || snapshot
                    .attribute_type_guids_by_name
                    .contains_key(&attr_type_def.name)
            {
                return Err(CoreError::invalid_parameter(
                    source_name,
                    "add_attribute_type_def",
                    format!(
                        "attribute type {} (GUID {}) is already defined",
                        attr_type_def.name, attr_type_def.guid
                    ),
                ));
            }
            snapshot
                .attribute_type_guids_by_name
                .insert(attr_type_def.name.clone(), attr_type_def.guid.clone());
            snapshot.active_attribute_types.insert(attr_type_def.guid.clone());
            snapshot
                .known_attribute_types
                .insert(attr_type_def.guid.clone(), attr_type_def);
            Ok(())
        })
    }

    /// Promote a known type (typically one accepted from a peer) to active
    pub fn activate_type_def(&self, source_name: &str, guid: &str) -> Result<()> {
        self.update_snapshot(|snapshot| {
            if !snapshot.known_types.contains_key(guid) {
                return Err(CoreError::type_error(
                    source_name,
                    "activate_type_def",
                    format!("type definition GUID {guid} is not known to this repository"),
                ));
            }
            snapshot.active_types.insert(guid.to_string());
            Ok(())
        })
    }

    /// Replace the stored definition with a patched successor version. The
    /// successor must be a strictly newer version of a known type.
    pub fn publish_type_def_update(&self, source_name: &str, updated: TypeDef) -> Result<()> {
        self.update_snapshot(|snapshot| {
            let current = snapshot.known_types.get(&updated.guid).ok_or_else(|| {
                CoreError::type_error(
                    source_name,
                    "publish_type_def_update",
                    format!("type definition GUID {} is not known", updated.guid),
                )
            })?;
            if updated.version <= current.version {
                return Err(CoreError::patch_error(
                    source_name,
                    "publish_type_def_update",
                    format!(
                        "update for {} carries version {} but the registry already holds {}",
                        updated.name, updated.version, current.version
                    ),
                ));
            }
            if updated.name != current.name {
                if snapshot
                    .type_guids_by_name
                    .get(&updated.name)
                    .is_some_and(|guid| *guid != updated.guid)
                {
                    return Err(CoreError::invalid_parameter(
                        source_name,
                        "publish_type_def_update",
                        format!(
                            "cannot rename {} to {}: that name already belongs to another type",
                            current.name, updated.name
                        ),
                    ));
                }
                snapshot.type_guids_by_name.remove(&current.name);
                snapshot
                    .type_guids_by_name
                    .insert(updated.name.clone(), updated.guid.clone());
            }
            info!(
                source_name,
                type_name = %updated.name,
                old_version = current.version,
                new_version = updated.version,
                "type definition updated"
            );
            snapshot.known_types.insert(updated.guid.clone(), updated);
            Ok(())
        })
    }

    /// Load every type in an archive, verifying fingerprints first. Returns
    /// the number of type definitions added. Types already known under the
    /// same GUID and name are skipped.
    pub fn load_archive(&self, source_name: &str, archive: &TypeArchive) -> Result<usize> {
        archive.verify(source_name)?;

        let mut added = 0;
        for attr_type_def in &archive.attribute_type_defs {
            if !self.is_known_attribute_type(&attr_type_def.guid) {
                self.add_attribute_type_def(source_name, attr_type_def.clone())?;
            }
        }
        for entry in &archive.type_defs {
            if !self.is_known_type(source_name, &entry.type_def.guid, &entry.type_def.name) {
                self.add_type_def(source_name, entry.type_def.clone())?;
                added += 1;
            }
        }
        info!(
            source_name,
            archive = %archive.archive_name,
            types_added = added,
            "archive loaded"
        );
        Ok(added)
    }

    fn is_known_attribute_type(&self, guid: &str) -> bool {
        self.read_snapshot().known_attribute_types.contains_key(guid)
    }

    // ------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------

    /// Compare a peer's gallery against the local registry and report every
    /// disagreement. Types the peer has and we do not are not conflicts.
    pub fn validate_against_local_type_defs(
        &self,
        source_name: &str,
        peer_gallery: &TypeDefGallery,
    ) -> Vec<TypeDefConflict> {
        let snapshot = self.read_snapshot();
        let mut conflicts = Vec::new();

        for peer in &peer_gallery.type_defs {
            let local = match snapshot.known_types.get(&peer.guid) {
                Some(local) => local,
                None => {
                    // Same name under a different GUID is still a clash
                    if let Some(local) = snapshot.type_def_by_name(&peer.name) {
                        conflicts.push(TypeDefConflict::IdentityClash {
                            guid: local.guid.clone(),
                            local_name: local.name.clone(),
                            peer_name: peer.name.clone(),
                        });
                    }
                    continue;
                }
            };

            if local.name != peer.name {
                conflicts.push(TypeDefConflict::IdentityClash {
                    guid: peer.guid.clone(),
                    local_name: local.name.clone(),
                    peer_name: peer.name.clone(),
                });
            } else if local.category() != peer.category() {
                conflicts.push(TypeDefConflict::CategoryMismatch {
                    name: peer.name.clone(),
                    local_category: local.category(),
                    peer_category: peer.category(),
                });
            } else if local.version != peer.version {
                conflicts.push(TypeDefConflict::VersionMismatch {
                    name: peer.name.clone(),
                    local_version: local.version,
                    peer_version: peer.version,
                });
            } else if !TypeFingerprint::of_type_def(local).matches(peer) {
                conflicts.push(TypeDefConflict::ContentDrift {
                    name: peer.name.clone(),
                    version: peer.version,
                });
            }
        }

        for peer in &peer_gallery.attribute_type_defs {
            let local = match snapshot.known_attribute_types.get(&peer.guid) {
                Some(local) => local,
                None => {
                    if let Some(local) = snapshot.attribute_type_def_by_name(&peer.name) {
                        conflicts.push(TypeDefConflict::IdentityClash {
                            guid: local.guid.clone(),
                            local_name: local.name.clone(),
                            peer_name: peer.name.clone(),
                        });
                    }
                    continue;
                }
            };

            if local.name != peer.name {
                conflicts.push(TypeDefConflict::IdentityClash {
                    guid: peer.guid.clone(),
                    local_name: local.name.clone(),
                    peer_name: peer.name.clone(),
                });
            } else if local.category() != peer.category() {
                conflicts.push(TypeDefConflict::AttributeCategoryMismatch {
                    name: peer.name.clone(),
                    local_category: local.category(),
                    peer_category: peer.category(),
                });
            } else if local.version != peer.version {
                conflicts.push(TypeDefConflict::VersionMismatch {
                    name: peer.name.clone(),
                    local_version: local.version,
                    peer_version: peer.version,
                });
            } else if TypeFingerprint::of_attribute_type_def(local)
                != TypeFingerprint::of_attribute_type_def(peer)
            {
                conflicts.push(TypeDefConflict::ContentDrift {
                    name: peer.name.clone(),
                    version: peer.version,
                });
            }
        }

        if !conflicts.is_empty() {
            debug!(
                source_name,
                conflicts = conflicts.len(),
                "peer gallery disagrees with local registry"
            );
        }
        conflicts
    }

    /// Accept a batch of types from the enterprise view of the federation.
    /// Genuinely new types grow the known (not active) set; any conflict
    /// with a known type rejects the whole batch before anything is added.
    pub fn validate_enterprise_type_defs(
        &self,
        source_name: &str,
        peer_gallery: &TypeDefGallery,
    ) -> Result<()> {
        let conflicts = self.validate_against_local_type_defs(source_name, peer_gallery);
        if let Some(first) = conflicts.first() {
            return Err(CoreError::type_error(
                source_name,
                "validate_enterprise_type_defs",
                format!(
                    "peer gallery conflicts with the local registry ({} conflict(s), first: {:?})",
                    conflicts.len(),
                    first
                ),
            ));
        }

        self.update_snapshot(|snapshot| {
            for peer in &peer_gallery.attribute_type_defs {
                if !snapshot.known_attribute_types.contains_key(&peer.guid) {
                    snapshot
                        .attribute_type_guids_by_name
                        .insert(peer.name.clone(), peer.guid.clone());
                    snapshot
                        .known_attribute_types
                        .insert(peer.guid.clone(), peer.clone());
                }
            }
            for peer in &peer_gallery.type_defs {
                if !snapshot.known_types.contains_key(&peer.guid) {
                    info!(
                        source_name,
                        type_name = %peer.name,
                        guid = %peer.guid,
                        "type accepted from federation peer"
                    );
                    snapshot
                        .type_guids_by_name
                        .insert(peer.name.clone(), peer.guid.clone());
                    snapshot.known_types.insert(peer.guid.clone(), peer.clone());
                }
            }
            Ok(())
        })
    }
}

/// Translate a `*` wildcard into an anchored regex; everything else is
/// matched literally
fn wildcard_to_regex(wildcard: &str) -> String {
    let mut pattern = String::with_capacity(wildcard.len() + 8);
    pattern.push('^');
    for (i, segment) in wildcard.split('*').enumerate() {
        if i > 0 {
            pattern.push_str(".*");
        }
        pattern.push_str(&regex::escape(segment));
    }
    pattern.push('$');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typedefs::{PrimitiveCategory, TypeDefLink};

    fn registry() -> TypeRegistry {
        TypeRegistry::new("local-mcid", Some("https://repo.example.org".to_string()))
    }

    #[test]
    fn test_wildcard_translation() {
        assert_eq!(wildcard_to_regex("Person"), "^Person$");
        assert_eq!(wildcard_to_regex("Data*"), "^Data.*$");
        assert_eq!(wildcard_to_regex("*Asset*"), "^.*Asset.*$");
        assert_eq!(wildcard_to_regex("*Person"), "^.*Person$");
        // Regex metacharacters in the name are literal
        assert_eq!(wildcard_to_regex("a.b"), "^a\\.b$");
    }

    #[test]
    fn test_add_then_lookup_by_name_and_guid() {
        let registry = registry();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g1", "Person", "archive"))
            .unwrap();

        assert!(registry.get_type_def_by_name("test", "Person").is_some());
        assert!(registry.get_type_def("test", "g1").is_ok());
        assert!(registry.get_type_def("test", "missing").is_err());
        assert!(registry.is_active_type("test", "g1", "Person"));
        assert!(!registry.is_active_type("test", "g1", "Organization"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = registry();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g1", "Person", "archive"))
            .unwrap();
        let err = registry
            .add_type_def("test", TypeDef::new_entity_def("g2", "Person", "archive"))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_wildcard_search_scopes_to_active() {
        let registry = registry();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g1", "DataSet", "archive"))
            .unwrap();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g2", "DataFile", "archive"))
            .unwrap();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g3", "Process", "archive"))
            .unwrap();

        let gallery = registry.get_active_types_by_wildcard_name("test", "Data*");
        let mut names: Vec<_> = gallery.type_defs.iter().map(|t| t.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["DataFile", "DataSet"]);
    }

    #[test]
    fn test_classification_applicability_walks_supertypes() {
        let registry = registry();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g1", "Asset", "archive"))
            .unwrap();
        let mut dataset = TypeDef::new_entity_def("g2", "DataSet", "archive");
        dataset.super_type = Some(TypeDefLink::new("g1", "Asset"));
        registry.add_type_def("test", dataset).unwrap();
        registry
            .add_type_def(
                "test",
                TypeDef::new_classification_def(
                    "g3",
                    "Confidential",
                    "archive",
                    vec![TypeDefLink::new("g1", "Asset")],
                    false,
                ),
            )
            .unwrap();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g4", "Person", "archive"))
            .unwrap();

        assert!(registry.is_valid_classification_for_entity("test", "Confidential", "Asset"));
        assert!(registry.is_valid_classification_for_entity("test", "Confidential", "DataSet"));
        assert!(!registry.is_valid_classification_for_entity("test", "Confidential", "Person"));
    }

    #[test]
    fn test_classification_with_no_listed_entity_types_applies_to_all() {
        let registry = registry();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g1", "Person", "archive"))
            .unwrap();
        registry
            .add_type_def(
                "test",
                TypeDef::new_classification_def("g2", "Anchors", "archive", vec![], true),
            )
            .unwrap();
        assert!(registry.is_valid_classification_for_entity("test", "Anchors", "Person"));
    }

    #[test]
    fn test_reconciliation_reports_drift_and_version_skew() {
        let registry = registry();
        let person = TypeDef::new_entity_def("g1", "Person", "archive");
        registry.add_type_def("test", person.clone()).unwrap();

        // Same version, different content
        let drifted = person.clone().with_description("changed elsewhere");
        let conflicts = registry.validate_against_local_type_defs(
            "test",
            &TypeDefGallery {
                type_defs: vec![drifted],
                attribute_type_defs: vec![],
            },
        );
        assert!(matches!(conflicts[0], TypeDefConflict::ContentDrift { .. }));

        // Newer version at the peer
        let mut newer = person.clone();
        newer.version = 2;
        let conflicts = registry.validate_against_local_type_defs(
            "test",
            &TypeDefGallery {
                type_defs: vec![newer],
                attribute_type_defs: vec![],
            },
        );
        assert!(matches!(conflicts[0], TypeDefConflict::VersionMismatch { .. }));
    }

    #[test]
    fn test_peer_attribute_type_name_collision_is_a_conflict() {
        let registry = registry();
        registry
            .add_attribute_type_def(
                "test",
                AttributeTypeDef::new_primitive("at-local", "string", PrimitiveCategory::String),
            )
            .unwrap();

        // Same name under a different GUID at the peer
        let peer_gallery = TypeDefGallery {
            type_defs: vec![],
            attribute_type_defs: vec![AttributeTypeDef::new_primitive(
                "at-peer",
                "string",
                PrimitiveCategory::String,
            )],
        };

        let conflicts = registry.validate_against_local_type_defs("test", &peer_gallery);
        assert!(matches!(conflicts[0], TypeDefConflict::IdentityClash { .. }));

        let err = registry
            .validate_enterprise_type_defs("test", &peer_gallery)
            .unwrap_err();
        assert!(matches!(err, CoreError::TypeError { .. }));

        // The local name index still resolves to the local definition
        let resolved = registry
            .get_attribute_type_def_by_name("test", "string")
            .unwrap();
        assert_eq!(resolved.guid, "at-local");
    }

    #[test]
    fn test_peer_attribute_type_drift_is_a_conflict() {
        let registry = registry();
        registry
            .add_attribute_type_def(
                "test",
                AttributeTypeDef::new_primitive("at1", "string", PrimitiveCategory::String),
            )
            .unwrap();

        // Same GUID and name, different category
        let peer_gallery = TypeDefGallery {
            type_defs: vec![],
            attribute_type_defs: vec![AttributeTypeDef::new_collection(
                "at1",
                "string",
                crate::typedefs::CollectionKind::Array,
            )],
        };
        let conflicts = registry.validate_against_local_type_defs("test", &peer_gallery);
        assert!(matches!(
            conflicts[0],
            TypeDefConflict::AttributeCategoryMismatch { .. }
        ));
    }

    #[test]
    fn test_rename_cannot_shadow_another_type() {
        let registry = registry();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g1", "Person", "archive"))
            .unwrap();
        registry
            .add_type_def("test", TypeDef::new_entity_def("g2", "Team", "archive"))
            .unwrap();

        let mut renamed = registry.require_type_def_by_name("test", "Team").unwrap();
        renamed.name = "Person".to_string();
        renamed.version = 2;
        let err = registry
            .publish_type_def_update("test", renamed)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidParameter { .. }));

        // Both names still resolve to their original definitions
        assert_eq!(
            registry.require_type_def_by_name("test", "Person").unwrap().guid,
            "g1"
        );
        assert_eq!(
            registry.require_type_def_by_name("test", "Team").unwrap().guid,
            "g2"
        );
    }

    #[test]
    fn test_enterprise_validation_grows_known_not_active() {
        let registry = registry();
        let peer_type = TypeDef::new_entity_def("g9", "GlossaryTerm", "peer-mcid");
        registry
            .validate_enterprise_type_defs(
                "test",
                &TypeDefGallery {
                    type_defs: vec![peer_type],
                    attribute_type_defs: vec![],
                },
            )
            .unwrap();

        assert!(registry.is_known_type("test", "g9", "GlossaryTerm"));
        assert!(!registry.is_active_type("test", "g9", "GlossaryTerm"));

        registry.activate_type_def("test", "g9").unwrap();
        assert!(registry.is_active_type("test", "g9", "GlossaryTerm"));
    }

    #[test]
    fn test_instance_type_requires_active_type() {
        let registry = registry();
        let err = registry.get_instance_type("test", "Person").unwrap_err();
        assert_eq!(err.status_code(), 404);

        registry
            .add_type_def("test", TypeDef::new_entity_def("g1", "Person", "archive"))
            .unwrap();
        let instance_type = registry.get_instance_type("test", "Person").unwrap();
        assert_eq!(instance_type.type_def_name, "Person");
        assert_eq!(instance_type.type_def_category, TypeDefCategory::EntityDef);
    }

    #[test]
    fn test_instance_url_uses_configured_root() {
        let registry = registry();
        assert_eq!(
            registry.get_instance_url("abc").as_deref(),
            Some("https://repo.example.org/instances/abc")
        );
        let bare = TypeRegistry::new("local-mcid", None);
        assert!(bare.get_instance_url("abc").is_none());
    }
}
