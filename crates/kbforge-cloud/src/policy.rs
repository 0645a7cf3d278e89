//! Access and security policies gating the collection

use crate::error::{ProvisionError, Result};
use crate::key::NamedResourceKey;
use crate::provider::{SearchServerlessApi, SecurityPolicyType};
use serde_json::{Value, json};
use std::sync::Arc;

const ACCESS_POLICY: &str = "data";

const COLLECTION_PERMISSIONS: [&str; 3] = [
    "aoss:DescribeCollectionItems",
    "aoss:CreateCollectionItems",
    "aoss:UpdateCollectionItems",
];

const INDEX_PERMISSIONS: [&str; 5] = [
    "aoss:UpdateIndex",
    "aoss:DescribeIndex",
    "aoss:ReadDocument",
    "aoss:WriteDocument",
    "aoss:CreateIndex",
];

/// Data access policy granting collection and index permissions to `principals`
pub fn access_policy_document(key: &NamedResourceKey, principals: &[String]) -> Value {
    json!([{
        "Rules": [
            {
                "Resource": [format!("collection/{}", key)],
                "Permission": COLLECTION_PERMISSIONS,
                "ResourceType": "collection",
            },
            {
                "Resource": [format!("index/{}/*", key)],
                "Permission": INDEX_PERMISSIONS,
                "ResourceType": "index",
            },
        ],
        "Principal": principals,
        "Description": "",
    }])
}

/// Network policy allowing public access to the collection and its dashboard
pub fn network_policy_document(key: &NamedResourceKey) -> Value {
    json!([{
        "AllowFromPublic": true,
        "Rules": [
            {
                "ResourceType": "dashboard",
                "Resource": [format!("collection/{}", key)],
            },
            {
                "ResourceType": "collection",
                "Resource": [format!("collection/{}", key)],
            },
        ],
    }])
}

/// Encryption policy using a provider-owned key
pub fn encryption_policy_document(key: &NamedResourceKey) -> Value {
    json!({
        "Rules": [{
            "ResourceType": "collection",
            "Resource": [format!("collection/{}", key)],
        }],
        "AWSOwnedKey": true,
    })
}

/// Creates and removes the three policies of a provisioning unit
pub struct PolicyManager {
    api: Arc<dyn SearchServerlessApi>,
}

impl PolicyManager {
    pub fn new(api: Arc<dyn SearchServerlessApi>) -> Self {
        Self { api }
    }

    /// Grant data access to the extra principals, the owner role and the
    /// custom resource role, in that order
    pub async fn create_access_policy(
        &self,
        key: &NamedResourceKey,
        owner_role_arn: &str,
        custom_resource_role_arn: &str,
        extra_principal_arns: &[String],
        client_token: &str,
    ) -> Result<()> {
        tracing::info!(key = %key, "Creating access policy");

        let mut principals = extra_principal_arns.to_vec();
        principals.push(owner_role_arn.to_string());
        principals.push(custom_resource_role_arn.to_string());

        let document = access_policy_document(key, &principals);
        tracing::debug!(key = %key, policy = %document, "Access policy document");

        self.api
            .create_access_policy(key.as_str(), &document.to_string(), client_token)
            .await
            .map_err(|source| ProvisionError::PolicyCreation {
                policy: ACCESS_POLICY.to_string(),
                name: key.to_string(),
                source,
            })
    }

    pub async fn create_network_security_policy(
        &self,
        key: &NamedResourceKey,
        client_token: &str,
    ) -> Result<()> {
        self.create_security_policy(
            key,
            SecurityPolicyType::Network,
            network_policy_document(key),
            client_token,
        )
        .await
    }

    pub async fn create_encryption_security_policy(
        &self,
        key: &NamedResourceKey,
        client_token: &str,
    ) -> Result<()> {
        self.create_security_policy(
            key,
            SecurityPolicyType::Encryption,
            encryption_policy_document(key),
            client_token,
        )
        .await
    }

    async fn create_security_policy(
        &self,
        key: &NamedResourceKey,
        policy_type: SecurityPolicyType,
        document: Value,
        client_token: &str,
    ) -> Result<()> {
        tracing::info!(key = %key, policy_type = %policy_type, "Creating security policy");
        self.api
            .create_security_policy(policy_type, key.as_str(), &document.to_string(), client_token)
            .await
            .map_err(|source| ProvisionError::PolicyCreation {
                policy: policy_type.to_string(),
                name: key.to_string(),
                source,
            })
    }

    pub async fn delete_access_policy(&self, key: &NamedResourceKey) -> Result<()> {
        tracing::info!(key = %key, "Deleting access policy");
        match self.api.delete_access_policy(key.as_str()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!(key = %key, "Access policy already deleted");
                Ok(())
            }
            Err(source) => Err(ProvisionError::PolicyDeletion {
                policy: ACCESS_POLICY.to_string(),
                name: key.to_string(),
                source,
            }),
        }
    }

    pub async fn delete_security_policy(
        &self,
        key: &NamedResourceKey,
        policy_type: SecurityPolicyType,
    ) -> Result<()> {
        tracing::info!(key = %key, policy_type = %policy_type, "Deleting security policy");
        match self.api.delete_security_policy(policy_type, key.as_str()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::info!(key = %key, policy_type = %policy_type, "Security policy already deleted");
                Ok(())
            }
            Err(source) => Err(ProvisionError::PolicyDeletion {
                policy: policy_type.to_string(),
                name: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> NamedResourceKey {
        NamedResourceKey::new("acme", "ab12cd").unwrap()
    }

    #[test]
    fn test_access_policy_document() {
        let principals = vec![
            "arn:aws:iam::123456789012:role/extra".to_string(),
            "arn:aws:iam::123456789012:role/kb".to_string(),
        ];
        let doc = access_policy_document(&key(), &principals);

        let rules = doc[0]["Rules"].as_array().unwrap();
        assert_eq!(rules[0]["Resource"][0], "collection/acme-ab12cd");
        assert_eq!(rules[0]["ResourceType"], "collection");
        assert_eq!(rules[1]["Resource"][0], "index/acme-ab12cd/*");
        assert_eq!(rules[1]["Permission"].as_array().unwrap().len(), 5);
        assert_eq!(doc[0]["Principal"], json!(principals));
    }

    #[test]
    fn test_security_policy_documents() {
        let network = network_policy_document(&key());
        assert_eq!(network[0]["AllowFromPublic"], true);
        assert_eq!(network[0]["Rules"][0]["ResourceType"], "dashboard");

        let encryption = encryption_policy_document(&key());
        assert_eq!(encryption["AWSOwnedKey"], true);
        assert_eq!(encryption["Rules"][0]["Resource"][0], "collection/acme-ab12cd");
    }
}
