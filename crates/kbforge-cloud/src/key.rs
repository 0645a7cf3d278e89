//! Resource naming and persisted attribute paths
//!
//! Every sub-resource of one provisioning unit shares the same external name,
//! `{namePrefix}-{nameSuffix}`. Persisted attributes live under
//! `/{namePrefix}-{nameSuffix}/{attribute}`.

use crate::error::{ProvisionError, Result};
use sha2::{Digest, Sha256};
use std::fmt;

/// Shortest name the search service accepts
const MIN_NAME_LEN: usize = 3;
/// Longest name the search service accepts
const MAX_NAME_LEN: usize = 32;

const LEASE_ATTRIBUTE: &str = "lease";

/// Stable external name shared by every sub-resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedResourceKey {
    prefix: String,
    suffix: String,
    name: String,
}

impl NamedResourceKey {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        let suffix = suffix.into();
        if prefix.is_empty() || suffix.is_empty() {
            return Err(ProvisionError::InvalidRequest(
                "namePrefix and nameSuffix must not be empty".to_string(),
            ));
        }

        let name = format!("{}-{}", prefix, suffix);
        validate_name(&name)?;

        Ok(Self {
            prefix,
            suffix,
            name,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `{prefix}-{suffix}`
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Name of the knn vector field inside the index
    pub fn vector_field(&self) -> String {
        format!("{}-vector", self.prefix)
    }

    /// State store path of a persisted attribute
    pub fn path(&self, attribute: Attribute) -> String {
        format!("/{}/{}", self.name, attribute.as_str())
    }

    /// State store path of the invocation lease
    pub fn lease_path(&self) -> String {
        format!("/{}/{}", self.name, LEASE_ATTRIBUTE)
    }

    /// Deterministic client token for one provisioning step of one request.
    ///
    /// A redelivered request carries the same nonce and therefore reuses the
    /// token, letting the provider deduplicate the call.
    pub fn idempotency_token(&self, step: &str, nonce: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(b":");
        hasher.update(step.as_bytes());
        hasher.update(b":");
        hasher.update(nonce.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for NamedResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.len() < MIN_NAME_LEN || name.len() > MAX_NAME_LEN {
        return Err(ProvisionError::InvalidRequest(format!(
            "resource name '{}' must be {}-{} characters",
            name, MIN_NAME_LEN, MAX_NAME_LEN
        )));
    }

    let mut chars = name.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_lowercase()) {
        return Err(ProvisionError::InvalidRequest(format!(
            "resource name '{}' must start with a lowercase letter",
            name
        )));
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err(ProvisionError::InvalidRequest(format!(
            "resource name '{}' may only contain lowercase letters, digits and hyphens",
            name
        )));
    }

    Ok(())
}

/// Attributes persisted across invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    CollectionId,
    CollectionArn,
    CollectionName,
    CollectionEndpoint,
    KnowledgeBaseId,
    KnowledgeBaseArn,
    DataSourceId,
}

impl Attribute {
    /// Every persisted attribute, in purge order
    pub const ALL: [Attribute; 7] = [
        Attribute::CollectionArn,
        Attribute::CollectionEndpoint,
        Attribute::CollectionId,
        Attribute::CollectionName,
        Attribute::DataSourceId,
        Attribute::KnowledgeBaseArn,
        Attribute::KnowledgeBaseId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::CollectionId => "collectionId",
            Attribute::CollectionArn => "collectionArn",
            Attribute::CollectionName => "collectionName",
            Attribute::CollectionEndpoint => "collectionEndpoint",
            Attribute::KnowledgeBaseId => "knowledgeBaseId",
            Attribute::KnowledgeBaseArn => "knowledgeBaseArn",
            Attribute::DataSourceId => "dataSourceId",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_and_paths() {
        let key = NamedResourceKey::new("acme", "ab12cd").unwrap();
        assert_eq!(key.as_str(), "acme-ab12cd");
        assert_eq!(key.vector_field(), "acme-vector");
        assert_eq!(
            key.path(Attribute::CollectionId),
            "/acme-ab12cd/collectionId"
        );
        assert_eq!(key.lease_path(), "/acme-ab12cd/lease");
    }

    #[test]
    fn test_key_rejects_bad_names() {
        assert!(NamedResourceKey::new("", "ab12cd").is_err());
        assert!(NamedResourceKey::new("Acme", "ab12cd").is_err());
        assert!(NamedResourceKey::new("1acme", "ab12cd").is_err());
        assert!(NamedResourceKey::new("acme", "ab_12").is_err());
        assert!(NamedResourceKey::new("a-very-long-knowledge-base", "suffix1").is_err());
        assert!(NamedResourceKey::new("kb", "x").is_ok());
    }

    #[test]
    fn test_idempotency_token_is_deterministic() {
        let key = NamedResourceKey::new("acme", "ab12cd").unwrap();
        let first = key.idempotency_token("collection", "req-1");
        let retry = key.idempotency_token("collection", "req-1");
        let other_step = key.idempotency_token("access-policy", "req-1");
        let other_request = key.idempotency_token("collection", "req-2");

        assert_eq!(first, retry);
        assert_ne!(first, other_step);
        assert_ne!(first, other_request);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_idempotency_token_is_sha256_hex() {
        let key = NamedResourceKey::new("acme", "ab12cd").unwrap();
        assert_eq!(
            key.idempotency_token("collection", "req-1"),
            "76d15a316ad7c464bff55b2a1b40179de5f263caac256c5522fc4e9ae1f69f95"
        );
    }

    #[test]
    fn test_all_attributes_distinct() {
        let mut names: Vec<_> = Attribute::ALL.iter().map(|a| a.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 7);
    }
}
