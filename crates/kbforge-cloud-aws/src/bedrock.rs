//! Bedrock knowledge bases and their data sources

use crate::error::api_error;
use async_trait::async_trait;
use aws_sdk_bedrockagent::Client;
use aws_sdk_bedrockagent::error::BuildError;
use aws_sdk_bedrockagent::types::{
    DataSourceConfiguration, DataSourceType, KnowledgeBase, KnowledgeBaseConfiguration,
    KnowledgeBaseStorageType, KnowledgeBaseType, OpenSearchServerlessConfiguration,
    OpenSearchServerlessFieldMapping, S3DataSourceConfiguration, StorageConfiguration,
    VectorKnowledgeBaseConfiguration,
};
use kbforge_cloud::{
    ApiError, ApiResult, DataSourceRequest, IngestionJob, KnowledgeBaseApi, KnowledgeBaseRequest,
    KnowledgeBaseStatus, KnowledgeBaseSummary,
};

fn invalid(e: BuildError) -> ApiError {
    ApiError::service(format!("invalid request: {}", e))
}

fn summary(knowledge_base: &KnowledgeBase) -> KnowledgeBaseSummary {
    KnowledgeBaseSummary {
        id: knowledge_base.knowledge_base_id().to_string(),
        arn: knowledge_base.knowledge_base_arn().to_string(),
        status: KnowledgeBaseStatus::parse(knowledge_base.status().as_str()),
    }
}

fn knowledge_base_configuration(
    request: &KnowledgeBaseRequest,
) -> Result<KnowledgeBaseConfiguration, BuildError> {
    KnowledgeBaseConfiguration::builder()
        .r#type(KnowledgeBaseType::Vector)
        .vector_knowledge_base_configuration(
            VectorKnowledgeBaseConfiguration::builder()
                .embedding_model_arn(&request.embedding_model_arn)
                .build()?,
        )
        .build()
}

fn storage_configuration(
    request: &KnowledgeBaseRequest,
) -> Result<StorageConfiguration, BuildError> {
    let field_mapping = OpenSearchServerlessFieldMapping::builder()
        .vector_field(&request.vector_field)
        .text_field(&request.text_field)
        .metadata_field(&request.metadata_field)
        .build()?;

    StorageConfiguration::builder()
        .r#type(KnowledgeBaseStorageType::OpensearchServerless)
        .opensearch_serverless_configuration(
            OpenSearchServerlessConfiguration::builder()
                .collection_arn(&request.collection_arn)
                .vector_index_name(&request.vector_index_name)
                .field_mapping(field_mapping)
                .build()?,
        )
        .build()
}

fn data_source_configuration(
    request: &DataSourceRequest,
) -> Result<DataSourceConfiguration, BuildError> {
    DataSourceConfiguration::builder()
        .r#type(DataSourceType::S3)
        .s3_configuration(
            S3DataSourceConfiguration::builder()
                .bucket_arn(&request.bucket_arn)
                .build()?,
        )
        .build()
}

#[derive(Clone, Debug)]
pub struct BedrockAgentClient {
    client: Client,
}

impl BedrockAgentClient {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        let config = aws_sdk_bedrockagent::config::Builder::from(sdk_config).build();
        Self::from_client(Client::from_conf(config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KnowledgeBaseApi for BedrockAgentClient {
    async fn create_knowledge_base(
        &self,
        request: &KnowledgeBaseRequest,
        client_token: &str,
    ) -> ApiResult<Option<KnowledgeBaseSummary>> {
        let output = self
            .client
            .create_knowledge_base()
            .name(&request.name)
            .role_arn(&request.role_arn)
            .client_token(client_token)
            .knowledge_base_configuration(knowledge_base_configuration(request).map_err(invalid)?)
            .storage_configuration(storage_configuration(request).map_err(invalid)?)
            .send()
            .await
            .map_err(api_error)?;

        Ok(output.knowledge_base().map(summary))
    }

    async fn get_knowledge_base(&self, id: &str) -> ApiResult<Option<KnowledgeBaseSummary>> {
        let output = self
            .client
            .get_knowledge_base()
            .knowledge_base_id(id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(output.knowledge_base().map(summary))
    }

    async fn delete_knowledge_base(&self, id: &str) -> ApiResult<()> {
        self.client
            .delete_knowledge_base()
            .knowledge_base_id(id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn create_data_source(
        &self,
        request: &DataSourceRequest,
        client_token: &str,
    ) -> ApiResult<Option<String>> {
        let output = self
            .client
            .create_data_source()
            .knowledge_base_id(&request.knowledge_base_id)
            .name(&request.name)
            .client_token(client_token)
            .data_source_configuration(data_source_configuration(request).map_err(invalid)?)
            .send()
            .await
            .map_err(api_error)?;

        Ok(output
            .data_source()
            .map(|ds| ds.data_source_id().to_string()))
    }

    async fn delete_data_source(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
    ) -> ApiResult<()> {
        self.client
            .delete_data_source()
            .knowledge_base_id(knowledge_base_id)
            .data_source_id(data_source_id)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn start_ingestion_job(
        &self,
        knowledge_base_id: &str,
        data_source_id: &str,
        client_token: &str,
        description: Option<&str>,
    ) -> ApiResult<Option<IngestionJob>> {
        let output = self
            .client
            .start_ingestion_job()
            .knowledge_base_id(knowledge_base_id)
            .data_source_id(data_source_id)
            .client_token(client_token)
            .set_description(description.map(str::to_string))
            .send()
            .await
            .map_err(api_error)?;

        Ok(output.ingestion_job().map(|job| IngestionJob {
            id: job.ingestion_job_id().to_string(),
            status: job.status().as_str().to_string(),
        }))
    }
}
