//! Collection data plane over SigV4-signed HTTPS

use crate::error::{AwsError, classify_status};
use async_trait::async_trait;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{
    PayloadChecksumKind, SignableBody, SignableRequest, SigningParams, SigningSettings, sign,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use kbforge_cloud::{ApiError, ApiErrorKind, ApiResult, VectorIndexApi};
use reqwest::Method;
use std::time::{Duration, SystemTime};

const SIGNING_NAME: &str = "aoss";

/// Index operations against a collection endpoint
#[derive(Clone, Debug)]
pub struct SignedIndexClient {
    http: reqwest::Client,
    credentials: SharedCredentialsProvider,
    region: String,
}

impl SignedIndexClient {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> crate::error::Result<Self> {
        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .ok_or(AwsError::MissingRegion)?;
        let credentials = sdk_config
            .credentials_provider()
            .ok_or(AwsError::MissingCredentials)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            credentials,
            region,
        })
    }

    fn url(endpoint: &str, index: &str) -> String {
        format!("{}/{}", endpoint.trim_end_matches('/'), index)
    }

    async fn send(&self, method: Method, url: &str, body: Vec<u8>) -> ApiResult<reqwest::Response> {
        let credentials = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|e| ApiError::new(ApiErrorKind::AccessDenied, e.to_string()))?;
        let identity: Identity = credentials.into();

        let mut settings = SigningSettings::default();
        settings.payload_checksum_kind = PayloadChecksumKind::XAmzSha256;
        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(SIGNING_NAME)
            .time(SystemTime::now())
            .settings(settings)
            .build()
            .map_err(|e| ApiError::service(format!("signing parameters: {}", e)))?
            .into();

        let headers = [("content-type", "application/json")];
        let signable = SignableRequest::new(
            method.as_str(),
            url,
            headers.iter().copied(),
            SignableBody::Bytes(&body),
        )
        .map_err(|e| ApiError::service(format!("signing request: {}", e)))?;
        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| ApiError::service(format!("signing request: {}", e)))?
            .into_parts();

        let mut request = self
            .http
            .request(method, url)
            .header("content-type", "application/json");
        let (signed_headers, _params) = instructions.into_parts();
        for header in signed_headers {
            request = request.header(header.name(), header.value());
        }

        request
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))
    }
}

async fn status_error(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ApiError::new(classify_status(status), format!("HTTP {}: {}", status, body))
}

#[async_trait]
impl VectorIndexApi for SignedIndexClient {
    async fn index_exists(&self, endpoint: &str, index: &str) -> ApiResult<bool> {
        let response = self
            .send(Method::HEAD, &Self::url(endpoint, index), Vec::new())
            .await?;
        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(status_error(response).await),
        }
    }

    async fn create_index(
        &self,
        endpoint: &str,
        index: &str,
        body: &serde_json::Value,
    ) -> ApiResult<()> {
        let body = serde_json::to_vec(body).map_err(|e| ApiError::service(e.to_string()))?;
        let response = self
            .send(Method::PUT, &Self::url(endpoint, index), body)
            .await?;
        if response.status().is_success() {
            tracing::debug!(endpoint, index, "Index accepted");
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn delete_index(&self, endpoint: &str, index: &str) -> ApiResult<()> {
        let response = self
            .send(Method::DELETE, &Self::url(endpoint, index), Vec::new())
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }
}
