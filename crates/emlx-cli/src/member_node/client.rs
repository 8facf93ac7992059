//! HTTP member node client
//!
//! Talks to the DataONE v2 MN REST API. Create and update are multipart
//! requests, reads return XML.

use super::endpoints;
use super::types::{ObjectList, ServiceError, SystemMetadata};
use super::MemberNode;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

// ============================================================================
// Client Constants
// ============================================================================

/// Default request timeout in seconds
///
/// Large data files go up in a single request, so this is generous.
pub const DEFAULT_TIMEOUT_SECS: u64 = 9999;

#[derive(Debug, Deserialize)]
struct Identifier {
    #[serde(rename = "$text")]
    value: String,
}

/// Member node reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpMemberNode {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpMemberNode {
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("emlx/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = base_url.into();
        info!(base_url = %base_url, authenticated = token.is_some(), "Member node client ready");
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> std::result::Result<Response, ServiceError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| ServiceError::from_transport(operation, &e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceError::from_response(operation, status.as_u16(), &body))
    }

    async fn read_xml<T: DeserializeOwned>(operation: &str, response: Response) -> std::result::Result<T, ServiceError> {
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::from_transport(operation, &e))?;
        quick_xml::de::from_str(&body)
            .map_err(|e| ServiceError::permanent(operation, format!("unreadable response: {e}")))
    }

    fn sysmeta_part(operation: &str, sysmeta: &SystemMetadata) -> std::result::Result<Part, ServiceError> {
        let xml = sysmeta
            .to_xml()
            .map_err(|e| ServiceError::permanent(operation, e.to_string()))?;
        Part::bytes(xml.into_bytes())
            .file_name("sysmeta.xml")
            .mime_str("text/xml")
            .map_err(|e| ServiceError::permanent(operation, e.to_string()))
    }
}

#[async_trait]
impl MemberNode for HttpMemberNode {
    async fn create(&self, pid: &str, object: &[u8], sysmeta: &SystemMetadata) -> std::result::Result<String, ServiceError> {
        const OP: &str = "create";
        let file_name = sysmeta.file_name.clone().unwrap_or_else(|| pid.to_string());
        let form = Form::new()
            .text("pid", pid.to_string())
            .part("object", Part::bytes(object.to_vec()).file_name(file_name))
            .part("sysmeta", Self::sysmeta_part(OP, sysmeta)?);

        debug!(pid, size = object.len(), format = %sysmeta.format_id, "Creating object");
        let url = endpoints::object_url(&self.base_url);
        let response = self.send(OP, self.client.post(&url).multipart(form)).await?;
        let identifier: Identifier = Self::read_xml(OP, response).await?;
        Ok(identifier.value.trim().to_string())
    }

    async fn get_system_metadata(&self, pid: &str) -> std::result::Result<SystemMetadata, ServiceError> {
        const OP: &str = "getSystemMetadata";
        let url = endpoints::meta_url(&self.base_url, pid);
        let response = self.send(OP, self.client.get(&url)).await?;
        Self::read_xml(OP, response).await
    }

    async fn update_system_metadata(&self, pid: &str, sysmeta: &SystemMetadata) -> std::result::Result<(), ServiceError> {
        const OP: &str = "updateSystemMetadata";
        let form = Form::new()
            .text("pid", pid.to_string())
            .part("sysmeta", Self::sysmeta_part(OP, sysmeta)?);

        debug!(pid, "Updating system metadata");
        let url = endpoints::meta_update_url(&self.base_url);
        self.send(OP, self.client.put(&url).multipart(form)).await?;
        Ok(())
    }

    async fn list_objects(
        &self,
        start: u32,
        count: u32,
        from_date: Option<DateTime<Utc>>,
    ) -> std::result::Result<ObjectList, ServiceError> {
        const OP: &str = "listObjects";
        let url = endpoints::list_objects_url(&self.base_url, start, count, from_date);
        let response = self.send(OP, self.client.get(&url)).await?;
        Self::read_xml(OP, response).await
    }
}
