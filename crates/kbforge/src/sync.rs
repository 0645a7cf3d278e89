//! Object change notifications that trigger a re-ingestion

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ObjectNotification {
    #[serde(rename = "detail-type", default)]
    pub detail_type: Option<String>,
    #[serde(default)]
    pub detail: Option<NotificationDetail>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationDetail {
    #[serde(default)]
    pub object: Option<ObjectRef>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectRef {
    pub key: String,
}

impl ObjectNotification {
    pub fn object_key(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(|d| d.object.as_ref())
            .map(|o| o.key.as_str())
    }

    /// Ingestion job description naming the changed object
    pub fn description(&self) -> Option<String> {
        self.object_key()
            .map(|key| format!("object added/deleted in data source: {}", key))
    }
}
