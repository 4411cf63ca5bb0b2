use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::SourceError;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};

static VERSION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"version="([^"]+)""#).unwrap());

/// Body of the deploy status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployStatus {
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeployStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn succeeded() -> Self {
        Self {
            complete: true,
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            complete: true,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Reports the progress of the current deploy.
#[async_trait]
pub trait DeployStatusSource: Send + Sync {
    async fn deploy_status(&self) -> Result<DeployStatus, SourceError>;
}

/// Reports the version marker of the live site.
#[async_trait]
pub trait SiteVersionSource: Send + Sync {
    async fn site_version(&self) -> Result<String, SourceError>;
}

/// Extract the `version="..."` marker from a page. Missing marker is `""`.
pub fn extract_version(html: &str) -> String {
    VERSION_MARKER
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

async fn fetch(transport: &dyn HttpTransport, url: &str) -> Result<HttpResponse, SourceError> {
    let response = transport.send(HttpRequest::get(url)).await?;
    if !response.is_success() {
        return Err(SourceError::Status {
            url: url.to_string(),
            status: response.status,
        });
    }
    Ok(response)
}

/// Deploy status read from a JSON endpoint.
pub struct HttpDeployStatus {
    transport: Arc<dyn HttpTransport>,
    url: String,
}

impl HttpDeployStatus {
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl DeployStatusSource for HttpDeployStatus {
    async fn deploy_status(&self) -> Result<DeployStatus, SourceError> {
        let response = fetch(self.transport.as_ref(), &self.url).await?;
        Ok(response.json()?)
    }
}

/// Site version read from the live site's root page.
pub struct HttpSiteVersion {
    transport: Arc<dyn HttpTransport>,
    url: String,
}

impl HttpSiteVersion {
    pub fn new(transport: Arc<dyn HttpTransport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SiteVersionSource for HttpSiteVersion {
    async fn site_version(&self) -> Result<String, SourceError> {
        let response = fetch(self.transport.as_ref(), &self.url).await?;
        Ok(extract_version(&response.text()))
    }
}
