//! kbforge provisioning core
//!
//! Provisions and tears down the resource chain behind a vector knowledge
//! base: a data access policy, network and encryption policies, a vector
//! search collection, its vector index, the knowledge base and its bucket
//! data source.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │          Lifecycle handler (Provisioner)         │
//! │        Create / Update / Delete dispatcher       │
//! └──────┬──────────┬──────────┬──────────┬─────────┘
//!        │          │          │          │
//! ┌──────▼───┐ ┌────▼─────┐ ┌──▼────┐ ┌───▼───────────────┐
//! │ policies │ │collection│ │ index │ │ knowledge base /  │
//! │          │ │ + poller │ │       │ │ data source       │
//! └──────┬───┘ └────┬─────┘ └──┬────┘ └───┬───────────────┘
//!        │          │          │          │
//! ┌──────▼──────────▼──────────▼──────────▼─────────┐
//! │   provider traits          │   StateStore        │
//! │   (kbforge-cloud-aws)      │   (parameters)      │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! Identifiers are persisted under `/{namePrefix}-{nameSuffix}/{attribute}`
//! so that Update and Delete, which run in separate invocations, can find
//! what Create made.

pub mod action;
pub mod collection;
pub mod data_source;
pub mod error;
pub mod index;
pub mod key;
pub mod knowledge_base;
pub mod lifecycle;
pub mod policy;
pub mod provider;
pub mod state;
#[cfg(feature = "test-utils")]
pub mod testing;
pub mod waiter;

// Re-exports
pub use action::{StepResult, TeardownReport, TeardownStep};
pub use collection::{CollectionManager, CollectionRecord};
pub use data_source::{DataSourceManager, DataSourceRecord};
pub use error::{ApiError, ApiErrorKind, ProvisionError, Result};
pub use index::{IndexManager, IndexOutcome};
pub use key::{Attribute, NamedResourceKey};
pub use knowledge_base::{KnowledgeBaseAttributes, KnowledgeBaseManager, KnowledgeBaseRecord};
pub use lifecycle::{
    LifecycleRequest, LifecycleResponse, ProvisionSettings, Provisioner, RequestType,
    ResourceProperties, ResponseData, ResponseStatus,
};
pub use policy::PolicyManager;
pub use provider::{
    ApiResult, CollectionDetail, CollectionStatus, DataSourceRequest, IngestionJob,
    KnowledgeBaseApi, KnowledgeBaseRequest, KnowledgeBaseStatus, KnowledgeBaseSummary,
    SearchServerlessApi, SecurityPolicyType, VectorIndexApi,
};
pub use state::{FileStateStore, Lease, MemoryStateStore, StateStore};
pub use waiter::{PollConfig, wait_until};
