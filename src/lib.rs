//! Metadata Repository Core
//!
//! Type registry and instance validation core for an open, federated
//! metadata repository. Repositories in a federation exchange type
//! definitions and instance copies; this crate owns the local view of the
//! federation's type system and the structural rules instances must obey.
//!
//! ## Components
//!
//! - **TypeRegistry**: process-wide cache of TypeDefs and
//!   AttributeTypeDefs, with copy-on-write snapshots for lock-free reads
//! - **PatchEngine**: evolves immutable TypeDefs one version at a time
//! - **InstanceFactory**: stamps new entities, relationships and
//!   classifications with type, status, provenance and URL
//! - **Validator**: parameter guards and structural checks on instances
//! - **EventDistributor**: synchronous event fan-out with per-listener
//!   failure isolation
//!
//! ## Lifecycle
//!
//! ```text
//! archive (JSON) --load--> TypeRegistry --stamp--> InstanceFactory
//!                               |                        |
//!                         PatchEngine               Validator
//!                       (new versions)        (structural checks)
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod fingerprint;
pub mod instances;
pub mod patch;
pub mod registry;
pub mod typedefs;
pub mod validator;

pub use archive::TypeArchive;
pub use config::CoreConfig;
pub use error::{CoreError, PropertyErrorKind, Result};
pub use events::{EventDistributor, EventEnvelope, EventListener};
pub use factory::InstanceFactory;
pub use fingerprint::TypeFingerprint;
pub use instances::{
    Classification, EntityDetail, EntityProxy, EntitySummary, InstanceHeader, InstanceProperties,
    InstancePropertyValue, InstanceStatus, MatchCriteria, Relationship,
};
pub use patch::PatchEngine;
pub use registry::{TypeDefConflict, TypeRegistry};
pub use typedefs::{
    AttributeTypeDef, PatchAction, TypeDef, TypeDefAttribute, TypeDefGallery, TypeDefPatch,
};
pub use validator::Validator;
