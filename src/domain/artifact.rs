//! Build artifacts: immutable references to published container images.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A container image produced once per pipeline run.
///
/// Immutable after creation; downstream stages reference it, they never
/// mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Full registry reference, e.g. `ghcr.io/acme/hivebox:abc123`
    pub image_reference: String,

    /// Content digest reported by the registry after publish
    pub digest: Option<String>,

    /// Tags applied to this image
    pub tags: BTreeSet<String>,

    /// When the artifact was created
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Create a new artifact for an image reference
    pub fn new(image_reference: impl Into<String>) -> Self {
        Self {
            image_reference: image_reference.into(),
            digest: None,
            tags: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Attach the registry digest (if the registry reported one)
    pub fn with_digest(mut self, digest: Option<String>) -> Self {
        self.digest = digest;
        self
    }
}

/// Build the canonical registry reference for a pipeline artifact.
///
/// Registries require lower-case namespaces, so the owner segment is
/// normalized here; the tag is used verbatim.
pub fn image_reference(registry: &str, owner: &str, service: &str, tag: &str) -> String {
    format!("{}/{}/{}:{}", registry, owner.to_lowercase(), service, tag)
}
