//! OpenSearch Serverless control plane

use crate::error::api_error;
use async_trait::async_trait;
use aws_sdk_opensearchserverless::Client;
use aws_sdk_opensearchserverless::types::{
    AccessPolicyType, CollectionType, SecurityPolicyType as AossPolicyType,
};
use kbforge_cloud::{
    ApiError, ApiResult, CollectionDetail, CollectionStatus, SearchServerlessApi,
    SecurityPolicyType,
};

fn policy_type(policy_type: SecurityPolicyType) -> AossPolicyType {
    match policy_type {
        SecurityPolicyType::Network => AossPolicyType::Network,
        SecurityPolicyType::Encryption => AossPolicyType::Encryption,
    }
}

#[derive(Clone, Debug)]
pub struct OpenSearchServerlessClient {
    client: Client,
}

impl OpenSearchServerlessClient {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        let config = aws_sdk_opensearchserverless::config::Builder::from(sdk_config).build();
        Self::from_client(Client::from_conf(config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SearchServerlessApi for OpenSearchServerlessClient {
    async fn create_access_policy(
        &self,
        name: &str,
        policy: &str,
        client_token: &str,
    ) -> ApiResult<()> {
        self.client
            .create_access_policy()
            .name(name)
            .r#type(AccessPolicyType::Data)
            .policy(policy)
            .client_token(client_token)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn delete_access_policy(&self, name: &str) -> ApiResult<()> {
        self.client
            .delete_access_policy()
            .name(name)
            .r#type(AccessPolicyType::Data)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn create_security_policy(
        &self,
        kind: SecurityPolicyType,
        name: &str,
        policy: &str,
        client_token: &str,
    ) -> ApiResult<()> {
        self.client
            .create_security_policy()
            .name(name)
            .r#type(policy_type(kind))
            .policy(policy)
            .client_token(client_token)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn delete_security_policy(&self, kind: SecurityPolicyType, name: &str) -> ApiResult<()> {
        self.client
            .delete_security_policy()
            .name(name)
            .r#type(policy_type(kind))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn create_collection(&self, name: &str, client_token: &str) -> ApiResult<String> {
        let output = self
            .client
            .create_collection()
            .name(name)
            .r#type(CollectionType::Vectorsearch)
            .client_token(client_token)
            .send()
            .await
            .map_err(api_error)?;

        output
            .create_collection_detail()
            .and_then(|detail| detail.id())
            .map(str::to_string)
            .ok_or_else(|| ApiError::malformed("create collection response carried no id"))
    }

    async fn get_collection(&self, id: &str) -> ApiResult<Option<CollectionDetail>> {
        let output = self
            .client
            .batch_get_collection()
            .ids(id)
            .send()
            .await
            .map_err(api_error)?;

        let Some(detail) = output.collection_details().first() else {
            return Ok(None);
        };
        Ok(Some(CollectionDetail {
            id: detail.id().unwrap_or(id).to_string(),
            arn: detail.arn().map(str::to_string),
            name: detail.name().map(str::to_string),
            endpoint: detail.collection_endpoint().map(str::to_string),
            status: detail
                .status()
                .map(|s| CollectionStatus::parse(s.as_str()))
                .unwrap_or_else(|| CollectionStatus::Other("UNKNOWN".to_string())),
        }))
    }

    async fn delete_collection(&self, id: &str, client_token: &str) -> ApiResult<()> {
        self.client
            .delete_collection()
            .id(id)
            .client_token(client_token)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_type_mapping() {
        assert_eq!(policy_type(SecurityPolicyType::Network), AossPolicyType::Network);
        assert_eq!(
            policy_type(SecurityPolicyType::Encryption),
            AossPolicyType::Encryption
        );
    }
}
