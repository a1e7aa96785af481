//! Resource pack and resource declarations.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A named bundle of installable resources.
///
/// Packs are immutable catalog entries. The `id` is the lookup key and the
/// key used to deduplicate concurrent installations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePack {
    /// Unique pack identifier (e.g., "sdxl-starter").
    pub id: String,

    /// Human-readable pack name.
    pub name: String,

    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional pack version, free-form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Optional pack author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Free-form tags for filtering in user interfaces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Resources in installation order.
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ResourcePack {
    /// Create a pack with the given identity and resources.
    pub fn new(id: impl Into<String>, name: impl Into<String>, resources: Vec<Resource>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: None,
            author: None,
            tags: Vec::new(),
            resources,
        }
    }

    /// Look up a resource by id.
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// Iterate over resource ids in declaration order.
    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(|r| r.id.as_str())
    }

    /// Count resources of the given type.
    pub fn count_of(&self, resource_type: ResourceType) -> usize {
        self.resources
            .iter()
            .filter(|r| r.resource_type() == resource_type)
            .count()
    }
}

/// One installable unit within a pack.
///
/// Common fields live on the struct; the variant-specific fields live in
/// [`ResourceKind`], which is flattened so the JSON form is a single object
/// with a `type` tag:
///
/// ```
/// use respack::pack::{Resource, ResourceType};
///
/// let json = r#"{
///     "id": "sdxl-base",
///     "name": "SDXL base",
///     "type": "model",
///     "urls": { "huggingface": "https://huggingface.co/sdxl/base.safetensors" },
///     "dir": "checkpoints",
///     "filename": "sdxl_base.safetensors"
/// }"#;
///
/// let resource: Resource = serde_json::from_str(json).unwrap();
/// assert_eq!(resource.resource_type(), ResourceType::Model);
/// assert!(!resource.optional);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier, unique within its pack.
    pub id: String,

    /// Human-readable resource name.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Whether the resource may be deselected by the user.
    #[serde(default)]
    pub optional: bool,

    /// Variant-specific installation data.
    #[serde(flatten)]
    pub kind: ResourceKind,
}

impl Resource {
    /// Create a required resource.
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            optional: false,
            kind,
        }
    }

    /// Mark the resource as optional (builder pattern).
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Get the type tag of this resource.
    pub fn resource_type(&self) -> ResourceType {
        match self.kind {
            ResourceKind::Model(_) => ResourceType::Model,
            ResourceKind::Plugin(_) => ResourceType::Plugin,
            ResourceKind::Workflow(_) => ResourceType::Workflow,
            ResourceKind::Custom(_) => ResourceType::Custom,
        }
    }
}

/// Variant-specific resource data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResourceKind {
    /// Large binary model file.
    Model(ModelSpec),
    /// Source-controlled plugin repository.
    Plugin(PluginSpec),
    /// Workflow definition file.
    Workflow(WorkflowSpec),
    /// Arbitrary auxiliary file.
    Custom(CustomSpec),
}

/// Model file declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Download locations keyed by source name, in preference order.
    #[serde(default)]
    pub urls: IndexMap<String, String>,

    /// Directory relative to the models root (e.g., "checkpoints").
    #[serde(default)]
    pub dir: String,

    /// Output filename.
    #[serde(default)]
    pub filename: String,

    /// Advertised size, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl ModelSpec {
    /// Create a model declaration with a single source.
    pub fn new(
        source: impl Into<String>,
        url: impl Into<String>,
        dir: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        let mut urls = IndexMap::new();
        urls.insert(source.into(), url.into());
        Self {
            urls,
            dir: dir.into(),
            filename: filename.into(),
            size_bytes: None,
        }
    }

    /// Add another download source (builder pattern).
    pub fn with_source(mut self, source: impl Into<String>, url: impl Into<String>) -> Self {
        self.urls.insert(source.into(), url.into());
        self
    }

    /// Pick the download URL for a source preference.
    ///
    /// The preferred source wins when it is declared; otherwise the first
    /// declared source is used.
    ///
    /// ```
    /// use respack::pack::ModelSpec;
    ///
    /// let spec = ModelSpec::new("huggingface", "https://hf.co/a.bin", "vae", "a.bin")
    ///     .with_source("mirror", "https://mirror.example/a.bin");
    ///
    /// assert_eq!(spec.resolve_url(Some("mirror")), Some("https://mirror.example/a.bin"));
    /// assert_eq!(spec.resolve_url(Some("unknown")), Some("https://hf.co/a.bin"));
    /// assert_eq!(spec.resolve_url(None), Some("https://hf.co/a.bin"));
    /// ```
    pub fn resolve_url(&self, preference: Option<&str>) -> Option<&str> {
        preference
            .and_then(|source| self.urls.get(source))
            .or_else(|| self.urls.values().next())
            .map(String::as_str)
    }
}

/// Plugin repository declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    /// Repository URL, short (`git@host:owner/repo.git`) or long form.
    #[serde(default)]
    pub repository: String,

    /// Branch to check out; the remote default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Workflow file declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Download URL.
    #[serde(default)]
    pub url: String,

    /// Output filename inside the workflows directory.
    #[serde(default)]
    pub filename: String,
}

/// Arbitrary file declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomSpec {
    /// Download URL.
    #[serde(default)]
    pub url: String,

    /// Absolute path, or path relative to the install root.
    ///
    /// A trailing `/` names a directory; the filename then comes from the URL.
    #[serde(default)]
    pub destination: String,
}

/// Type tag of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Model,
    Plugin,
    Workflow,
    Custom,
}

impl ResourceType {
    /// Get the lowercase name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Plugin => "plugin",
            Self::Workflow => "workflow",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pack() -> ResourcePack {
        ResourcePack::new(
            "starter",
            "Starter",
            vec![
                Resource::new(
                    "base",
                    "Base model",
                    ResourceKind::Model(ModelSpec::new(
                        "default",
                        "https://example.com/base.bin",
                        "checkpoints",
                        "base.bin",
                    )),
                ),
                Resource::new(
                    "nodes",
                    "Extra nodes",
                    ResourceKind::Plugin(PluginSpec {
                        repository: "https://github.com/acme/nodes".to_string(),
                        branch: None,
                    }),
                )
                .with_optional(true),
            ],
        )
    }

    #[test]
    fn test_resource_lookup() {
        let pack = sample_pack();
        assert_eq!(pack.resource("nodes").unwrap().name, "Extra nodes");
        assert!(pack.resource("missing").is_none());
        assert_eq!(pack.resource_ids().collect::<Vec<_>>(), vec!["base", "nodes"]);
    }

    #[test]
    fn test_count_of_type() {
        let pack = sample_pack();
        assert_eq!(pack.count_of(ResourceType::Model), 1);
        assert_eq!(pack.count_of(ResourceType::Plugin), 1);
        assert_eq!(pack.count_of(ResourceType::Workflow), 0);
    }

    #[test]
    fn test_pack_json_shape() {
        let pack = sample_pack();
        let json = serde_json::to_value(&pack).unwrap();

        assert_eq!(json["resources"][0]["type"], "model");
        assert_eq!(json["resources"][0]["dir"], "checkpoints");
        assert_eq!(json["resources"][1]["type"], "plugin");
        assert_eq!(json["resources"][1]["optional"], true);

        let back: ResourcePack = serde_json::from_value(json).unwrap();
        assert_eq!(back, pack);
    }

    #[test]
    fn test_missing_fields_default_for_validation() {
        let json = r#"{ "id": "wf", "name": "Workflow", "type": "workflow" }"#;
        let resource: Resource = serde_json::from_str(json).unwrap();

        match resource.kind {
            ResourceKind::Workflow(spec) => {
                assert!(spec.url.is_empty());
                assert!(spec.filename.is_empty());
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let json = r#"{ "id": "x", "name": "X", "type": "archive" }"#;
        assert!(serde_json::from_str::<Resource>(json).is_err());
    }

    #[test]
    fn test_url_variant_order_preserved() {
        let json = r#"{
            "id": "m", "name": "M", "type": "model",
            "urls": { "zeta": "https://z.example/m", "alpha": "https://a.example/m" },
            "dir": "loras", "filename": "m.safetensors"
        }"#;
        let resource: Resource = serde_json::from_str(json).unwrap();
        let ResourceKind::Model(spec) = resource.kind else {
            panic!("expected model");
        };
        assert_eq!(spec.resolve_url(None), Some("https://z.example/m"));
    }

    #[test]
    fn test_resource_type_display() {
        assert_eq!(ResourceType::Custom.to_string(), "custom");
        assert_eq!(
            serde_json::to_string(&ResourceType::Workflow).unwrap(),
            "\"workflow\""
        );
    }
}
