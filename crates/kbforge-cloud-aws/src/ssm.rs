//! Parameter Store backed state

use crate::error::api_error;
use async_trait::async_trait;
use aws_sdk_ssm::Client;
use aws_sdk_ssm::types::ParameterType;
use kbforge_cloud::{ProvisionError, Result, StateStore};

/// Persists each attribute as a plain `String` parameter
#[derive(Clone, Debug)]
pub struct SsmStateStore {
    client: Client,
}

impl SsmStateStore {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        let config = aws_sdk_ssm::config::Builder::from(sdk_config).build();
        Self::from_client(Client::from_conf(config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StateStore for SsmStateStore {
    async fn put(&self, path: &str, value: &str) -> Result<()> {
        tracing::debug!(path, "Putting parameter");
        self.client
            .put_parameter()
            .name(path)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| ProvisionError::persistence(path, api_error(e).to_string()))?;
        Ok(())
    }

    async fn put_if_absent(&self, path: &str, value: &str) -> Result<bool> {
        let result = self
            .client
            .put_parameter()
            .name(path)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(false)
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_parameter_already_exists()) =>
            {
                Ok(false)
            }
            Err(e) => Err(ProvisionError::persistence(path, api_error(e).to_string())),
        }
    }

    async fn get(&self, path: &str) -> Result<String> {
        let output = match self.client.get_parameter().name(path).send().await {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_parameter_not_found()) => {
                return Err(ProvisionError::not_found(path));
            }
            Err(e) => return Err(ProvisionError::persistence(path, api_error(e).to_string())),
        };

        output
            .parameter()
            .and_then(|p| p.value())
            .map(str::to_string)
            .ok_or_else(|| ProvisionError::persistence(path, "parameter has no value"))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        tracing::debug!(path, "Deleting parameter");
        match self.client.delete_parameter().name(path).send().await {
            Ok(_) => Ok(()),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_parameter_not_found()) => {
                Ok(())
            }
            Err(e) => Err(ProvisionError::persistence(path, api_error(e).to_string())),
        }
    }
}
