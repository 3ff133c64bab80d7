use std::time::Duration;

use anyhow::{Context, anyhow};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

const PIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Client for the `add` endpoint of an IPFS node's HTTP API.
pub struct IpfsClient {
    http: reqwest::Client,
    api_url: String,
    gateway_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PinnedFile {
    pub cid: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

impl IpfsClient {
    pub fn new(api_url: &str, gateway_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(PIN_TIMEOUT)
            .build()
            .context("Failed to build IPFS HTTP client")?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn gateway_url(&self, cid: &str) -> String {
        format!("{}/ipfs/{}", self.gateway_url, cid)
    }

    fn add_url(&self) -> String {
        format!("{}/api/v0/add?pin=true&cid-version=1", self.api_url)
    }

    pub async fn pin(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> anyhow::Result<PinnedFile> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .with_context(|| format!("Invalid content type `{}`", content_type))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.add_url())
            .multipart(form)
            .send()
            .await
            .context("IPFS request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("IPFS node answered {}: {}", status, detail));
        }

        let added: AddResponse = response
            .json()
            .await
            .context("Invalid IPFS add response")?;
        log::info!("Pinned {} to IPFS as {}", file_name, added.hash);

        Ok(PinnedFile {
            url: self.gateway_url(&added.hash),
            cid: added.hash,
        })
    }
}
