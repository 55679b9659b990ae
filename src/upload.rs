//! REST collaborator: file upload and the health ping.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ChatError, Result};
use crate::thread::ThreadKey;

/// What the upload endpoint returns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Uploaded {
    pub url: String,
    #[serde(default)]
    pub mime: String,
}

/// Thin client over the chat server's REST endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base: String,
    client: reqwest::Client,
}

/// Guess a mime type from the file extension.
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

/// Thread-scoping form fields sent with an upload. Main is explicit here.
pub fn upload_fields(thread: &ThreadKey, user: &str) -> Vec<(&'static str, String)> {
    let mut fields = vec![("thread", String::new())];
    match thread {
        ThreadKey::Main => fields[0].1 = "main".into(),
        ThreadKey::Dm(peer) => {
            fields[0].1 = "dm".into();
            fields.push(("peer", peer.clone()));
        }
        ThreadKey::Gc(gcid) => {
            fields[0].1 = "gc".into();
            fields.push(("gcid", gcid.clone()));
        }
    }
    fields.push(("user", user.to_string()));
    fields
}

impl ApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        ApiClient { base: base.into().trim_end_matches('/').to_string(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    /// Upload `path` for `thread` as `user`.
    ///
    /// # Returns
    /// - `Ok(Uploaded)` on a 2xx reply carrying `{url, mime}`.
    /// - `Err(ChatError::Upload)` on a non-2xx reply or a reply without a url.
    /// - `Err(ChatError::Io)` / `Err(ChatError::Http)` for local read or
    ///   transport failures.
    pub async fn upload_file(&self, path: &Path, thread: &ThreadKey, user: &str) -> Result<Uploaded> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let part = Part::bytes(bytes).file_name(name).mime_str(&mime_for(path))?;
        let mut form = Form::new().part("file", part);
        for (k, v) in upload_fields(thread, user) {
            form = form.text(k, v);
        }

        let resp = self.client.post(self.url("/upload")).multipart(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(ChatError::Upload { status: status.as_u16(), detail });
        }
        let up: Uploaded = resp.json().await?;
        if up.url.is_empty() {
            return Err(ChatError::Upload { status: status.as_u16(), detail: "no url in reply".into() });
        }
        debug!(url = %up.url, mime = %up.mime, "upload complete");
        Ok(up)
    }

    /// Best-effort `GET /health`; failures are logged and swallowed.
    pub async fn ping_health(&self) -> bool {
        match self.client.get(self.url("/health")).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "health check returned non-2xx");
                false
            }
            Err(e) => {
                warn!(error = %e, "health check failed");
                false
            }
        }
    }
}
