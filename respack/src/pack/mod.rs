//! Resource pack definitions and the pack catalog.
//!
//! A [`ResourcePack`] is a named bundle of installable resources. Each
//! [`Resource`] carries a [`ResourceKind`] describing what it installs:
//!
//! - **Model**: a large binary file placed under the models directory
//! - **Plugin**: a source repository cloned into the plugins directory
//! - **Workflow**: a definition file placed in the workflows directory
//! - **Custom**: any file at an absolute or install-root relative path
//!
//! Packs are read from JSON by [`PackCatalog`] and checked by
//! [`validate_pack`] before they become visible.

mod catalog;
mod repository;
mod types;
mod validation;

pub use catalog::{CatalogReport, PackCatalog, RejectedPack, DEFAULT_REFRESH_INTERVAL};
pub use repository::RepositoryId;
pub use types::{
    CustomSpec, ModelSpec, PluginSpec, Resource, ResourceKind, ResourcePack, ResourceType,
    WorkflowSpec,
};
pub use validation::{validate_pack, validate_resource, ValidationError};
