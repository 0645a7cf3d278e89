use anyhow::Context;
use kbforge_cloud::{FileStateStore, Provisioner, StateStore};
use kbforge_cloud_aws::AwsBackends;
use kbforge_config::{Settings, StateBackend};
use std::sync::Arc;

/// Wire the AWS clients and the configured state store into a provisioner
pub async fn provisioner(settings: &Settings) -> anyhow::Result<Provisioner> {
    let aws = AwsBackends::load(settings.region.clone())
        .await
        .context("AWS client setup failed")?;

    let state: Arc<dyn StateStore> = match &settings.state_backend {
        StateBackend::Ssm => aws.state.clone(),
        StateBackend::File(dir) => {
            tracing::info!(dir = %dir.display(), "Using file state backend");
            Arc::new(FileStateStore::new(dir))
        }
    };

    Ok(Provisioner::new(
        aws.search,
        aws.index,
        aws.knowledge_base,
        state,
        settings.provision.clone(),
    ))
}
