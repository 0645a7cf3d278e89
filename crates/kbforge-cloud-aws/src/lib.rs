//! AWS backends for kbforge
//!
//! - [`SsmStateStore`]: Parameter Store as the state store
//! - [`OpenSearchServerlessClient`]: collections, access and security policies
//! - [`SignedIndexClient`]: vector index management on a collection endpoint
//! - [`BedrockAgentClient`]: knowledge bases, data sources, ingestion jobs
//!
//! All clients are built from one shared `SdkConfig`:
//!
//! ```ignore
//! let backends = AwsBackends::load(Some("us-east-1".into())).await?;
//! let provisioner = Provisioner::new(
//!     backends.search, backends.index, backends.knowledge_base, backends.state, settings,
//! );
//! ```

pub mod bedrock;
pub mod error;
pub mod index;
pub mod opensearch;
pub mod ssm;

pub use bedrock::BedrockAgentClient;
pub use error::{AwsError, Result};
pub use index::SignedIndexClient;
pub use opensearch::OpenSearchServerlessClient;
pub use ssm::SsmStateStore;

use aws_config::{BehaviorVersion, Region};
use std::sync::Arc;

/// Every AWS-backed implementation the provisioner needs
#[derive(Clone)]
pub struct AwsBackends {
    pub search: Arc<OpenSearchServerlessClient>,
    pub index: Arc<SignedIndexClient>,
    pub knowledge_base: Arc<BedrockAgentClient>,
    pub state: Arc<SsmStateStore>,
}

impl AwsBackends {
    /// Resolve region and credentials from the default provider chain
    pub async fn load(region: Option<String>) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;
        Self::from_sdk_config(&sdk_config)
    }

    pub fn from_sdk_config(sdk_config: &aws_config::SdkConfig) -> Result<Self> {
        if sdk_config.region().is_none() {
            return Err(AwsError::MissingRegion);
        }
        tracing::debug!(region = ?sdk_config.region(), "Building AWS clients");

        Ok(Self {
            search: Arc::new(OpenSearchServerlessClient::new(sdk_config)),
            index: Arc::new(SignedIndexClient::new(sdk_config)?),
            knowledge_base: Arc::new(BedrockAgentClient::new(sdk_config)),
            state: Arc::new(SsmStateStore::new(sdk_config)),
        })
    }
}
