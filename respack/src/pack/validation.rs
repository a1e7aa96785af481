//! Pack definition validation.
//!
//! Catalog entries are checked once when they are loaded, so installers can
//! rely on well-formed declarations (non-empty URLs, plain filenames, no
//! parent-directory escapes).

use std::collections::HashSet;
use std::path::{Component, Path};

use thiserror::Error;

use super::repository::RepositoryId;
use super::types::{Resource, ResourceKind, ResourcePack};

/// Reasons a pack definition is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("pack id must not be empty")]
    EmptyPackId,

    #[error("pack {0} has no name")]
    EmptyPackName(String),

    #[error("pack {0} declares no resources")]
    NoResources(String),

    #[error("pack {pack_id} contains a resource with an empty id")]
    EmptyResourceId { pack_id: String },

    #[error("resource {0} has no name")]
    EmptyResourceName(String),

    #[error("pack {pack_id} declares resource {resource_id} more than once")]
    DuplicateResource { pack_id: String, resource_id: String },

    #[error("resource {resource_id} is missing required field '{field}'")]
    MissingField {
        resource_id: String,
        field: &'static str,
    },

    #[error("resource {resource_id} has an invalid URL '{url}': {reason}")]
    InvalidUrl {
        resource_id: String,
        url: String,
        reason: String,
    },

    #[error("resource {resource_id} has an unsafe path '{path}'")]
    UnsafePath { resource_id: String, path: String },

    #[error("resource {resource_id} has an unrecognized repository '{repository}'")]
    InvalidRepository {
        resource_id: String,
        repository: String,
    },
}

/// Validate a whole pack.
///
/// Returns the first problem found.
pub fn validate_pack(pack: &ResourcePack) -> Result<(), ValidationError> {
    if pack.id.trim().is_empty() {
        return Err(ValidationError::EmptyPackId);
    }
    if pack.name.trim().is_empty() {
        return Err(ValidationError::EmptyPackName(pack.id.clone()));
    }
    if pack.resources.is_empty() {
        return Err(ValidationError::NoResources(pack.id.clone()));
    }

    let mut seen = HashSet::new();
    for resource in &pack.resources {
        if resource.id.trim().is_empty() {
            return Err(ValidationError::EmptyResourceId {
                pack_id: pack.id.clone(),
            });
        }
        if !seen.insert(resource.id.as_str()) {
            return Err(ValidationError::DuplicateResource {
                pack_id: pack.id.clone(),
                resource_id: resource.id.clone(),
            });
        }
        validate_resource(resource)?;
    }

    Ok(())
}

/// Validate a single resource declaration.
pub fn validate_resource(resource: &Resource) -> Result<(), ValidationError> {
    let id = resource.id.as_str();
    if resource.name.trim().is_empty() {
        return Err(ValidationError::EmptyResourceName(id.to_string()));
    }

    match &resource.kind {
        ResourceKind::Model(spec) => {
            if spec.urls.is_empty() {
                return Err(missing(id, "urls"));
            }
            for url in spec.urls.values() {
                check_url(id, url)?;
            }
            check_relative_dir(id, &spec.dir)?;
            check_filename(id, &spec.filename)?;
        }
        ResourceKind::Plugin(spec) => {
            if spec.repository.trim().is_empty() {
                return Err(missing(id, "repository"));
            }
            if RepositoryId::parse(&spec.repository).is_none() {
                return Err(ValidationError::InvalidRepository {
                    resource_id: id.to_string(),
                    repository: spec.repository.clone(),
                });
            }
        }
        ResourceKind::Workflow(spec) => {
            check_url(id, &spec.url)?;
            check_filename(id, &spec.filename)?;
        }
        ResourceKind::Custom(spec) => {
            check_url(id, &spec.url)?;
            if spec.destination.trim().is_empty() {
                return Err(missing(id, "destination"));
            }
            if has_parent_component(&spec.destination) {
                return Err(unsafe_path(id, &spec.destination));
            }
        }
    }

    Ok(())
}

fn missing(resource_id: &str, field: &'static str) -> ValidationError {
    ValidationError::MissingField {
        resource_id: resource_id.to_string(),
        field,
    }
}

fn unsafe_path(resource_id: &str, path: &str) -> ValidationError {
    ValidationError::UnsafePath {
        resource_id: resource_id.to_string(),
        path: path.to_string(),
    }
}

fn check_url(resource_id: &str, raw: &str) -> Result<(), ValidationError> {
    if raw.trim().is_empty() {
        return Err(missing(resource_id, "url"));
    }

    let invalid = |reason: String| ValidationError::InvalidUrl {
        resource_id: resource_id.to_string(),
        url: raw.to_string(),
        reason,
    };

    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

fn check_relative_dir(resource_id: &str, dir: &str) -> Result<(), ValidationError> {
    if dir.trim().is_empty() {
        return Err(missing(resource_id, "dir"));
    }
    let path = Path::new(dir);
    if path.is_absolute() || has_parent_component(dir) {
        return Err(unsafe_path(resource_id, dir));
    }
    Ok(())
}

fn check_filename(resource_id: &str, filename: &str) -> Result<(), ValidationError> {
    if filename.trim().is_empty() {
        return Err(missing(resource_id, "filename"));
    }
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !filename.contains(['/', '\\']) => Ok(()),
        _ => Err(unsafe_path(resource_id, filename)),
    }
}

fn has_parent_component(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pack::types::{CustomSpec, ModelSpec, PluginSpec, WorkflowSpec};

    fn model(id: &str) -> Resource {
        Resource::new(
            id,
            "Model",
            ResourceKind::Model(ModelSpec::new(
                "default",
                "https://example.com/m.bin",
                "checkpoints",
                "m.bin",
            )),
        )
    }

    fn pack_of(resources: Vec<Resource>) -> ResourcePack {
        ResourcePack::new("pack", "Pack", resources)
    }

    #[test]
    fn test_valid_pack() {
        let pack = pack_of(vec![
            model("m1"),
            Resource::new(
                "p1",
                "Plugin",
                ResourceKind::Plugin(PluginSpec {
                    repository: "git@github.com:acme/nodes.git".to_string(),
                    branch: Some("main".to_string()),
                }),
            ),
            Resource::new(
                "w1",
                "Workflow",
                ResourceKind::Workflow(WorkflowSpec {
                    url: "http://example.com/flow.json".to_string(),
                    filename: "flow.json".to_string(),
                }),
            ),
            Resource::new(
                "c1",
                "Custom",
                ResourceKind::Custom(CustomSpec {
                    url: "https://example.com/extra.txt".to_string(),
                    destination: "user/extra/".to_string(),
                }),
            ),
        ]);
        assert_eq!(validate_pack(&pack), Ok(()));
    }

    #[test]
    fn test_empty_pack_rejected() {
        let pack = pack_of(vec![]);
        assert_eq!(
            validate_pack(&pack),
            Err(ValidationError::NoResources("pack".to_string()))
        );
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let pack = pack_of(vec![model("m1"), model("m1")]);
        assert!(matches!(
            validate_pack(&pack),
            Err(ValidationError::DuplicateResource { resource_id, .. }) if resource_id == "m1"
        ));
    }

    #[test]
    fn test_model_without_urls() {
        let mut resource = model("m1");
        if let ResourceKind::Model(spec) = &mut resource.kind {
            spec.urls.clear();
        }
        assert!(matches!(
            validate_resource(&resource),
            Err(ValidationError::MissingField { field: "urls", .. })
        ));
    }

    #[test]
    fn test_model_dir_escape_rejected() {
        for dir in ["../outside", "checkpoints/../../etc", "/abs/dir"] {
            let mut resource = model("m1");
            if let ResourceKind::Model(spec) = &mut resource.kind {
                spec.dir = dir.to_string();
            }
            assert!(
                matches!(
                    validate_resource(&resource),
                    Err(ValidationError::UnsafePath { .. })
                ),
                "{} should be rejected",
                dir
            );
        }
    }

    #[test]
    fn test_filename_must_be_plain() {
        for filename in ["sub/m.bin", "..", "a\\b.bin"] {
            let mut resource = model("m1");
            if let ResourceKind::Model(spec) = &mut resource.kind {
                spec.filename = filename.to_string();
            }
            assert!(
                validate_resource(&resource).is_err(),
                "{} should be rejected",
                filename
            );
        }
    }

    #[test]
    fn test_non_http_url_rejected() {
        let resource = Resource::new(
            "w1",
            "Workflow",
            ResourceKind::Workflow(WorkflowSpec {
                url: "ftp://example.com/flow.json".to_string(),
                filename: "flow.json".to_string(),
            }),
        );
        let err = validate_resource(&resource).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_custom_destination_escape_rejected() {
        let resource = Resource::new(
            "c1",
            "Custom",
            ResourceKind::Custom(CustomSpec {
                url: "https://example.com/x".to_string(),
                destination: "../x".to_string(),
            }),
        );
        assert!(matches!(
            validate_resource(&resource),
            Err(ValidationError::UnsafePath { .. })
        ));
    }

    #[test]
    fn test_bad_repository_rejected() {
        let resource = Resource::new(
            "p1",
            "Plugin",
            ResourceKind::Plugin(PluginSpec {
                repository: "not-a-repo".to_string(),
                branch: None,
            }),
        );
        assert!(matches!(
            validate_resource(&resource),
            Err(ValidationError::InvalidRepository { .. })
        ));
    }
}
