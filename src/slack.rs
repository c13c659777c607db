//! Slack Web API client.
//!
//! Covers the four calls the service makes: `chat.postMessage`, `auth.test`,
//! private file download, and the three-step external file upload
//! (`files.getUploadURLExternal`, raw `PUT`, `files.completeUploadExternal`).

use anyhow::{bail, Context, Result};
use serde_json::Value;

pub struct SlackClient {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl SlackClient {
    pub fn new(http: reqwest::Client, bot_token: String, api_base: String) -> Self {
        Self {
            http,
            bot_token,
            api_base,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), method)
    }

    /// Slack returns 200 for most app-level errors; the in-body `ok` field is
    /// the real verdict.
    async fn check(&self, method: &str, resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
        if !status.is_success() {
            bail!("Slack {method} failed ({status}): {body}");
        }
        let parsed: Value = serde_json::from_str(&body)
            .with_context(|| format!("Slack {method}: response is not valid JSON"))?;
        if parsed.get("ok") == Some(&Value::Bool(false)) {
            let err = parsed
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            bail!("Slack {method} failed: {err}");
        }
        Ok(parsed)
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.method_url(method))
            .bearer_auth(&self.bot_token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Slack {method} request failed"))?;
        self.check(method, resp).await
    }

    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({ "channel": channel, "text": text });
        self.call("chat.postMessage", &body).await.map(|_| ())
    }

    /// Resolve the bot's own user ID for the self-message filter.
    pub async fn auth_test(&self) -> Result<String> {
        let parsed = self.call("auth.test", &serde_json::json!({})).await?;
        parsed
            .get("user_id")
            .and_then(|u| u.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("Slack auth.test response missing user_id"))
    }

    /// Download a private file using the bot bearer token.
    pub async fn fetch_file(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .context("Slack file download request failed")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("Slack file download failed ({status})");
        }
        Ok(resp
            .bytes()
            .await
            .context("Slack file download: failed to read body")?
            .to_vec())
    }

    /// Upload a file into `channel` via Slack's external upload sequence.
    pub async fn upload_file(&self, channel: &str, filename: &str, bytes: Vec<u8>) -> Result<()> {
        // 1. Reserve an upload URL.
        let length = bytes.len().to_string();
        let resp = self
            .http
            .get(self.method_url("files.getUploadURLExternal"))
            .bearer_auth(&self.bot_token)
            .query(&[("filename", filename), ("length", length.as_str())])
            .send()
            .await
            .context("Slack files.getUploadURLExternal request failed")?;
        let parsed = self.check("files.getUploadURLExternal", resp).await?;
        let upload_url = parsed
            .get("upload_url")
            .and_then(|u| u.as_str())
            .ok_or_else(|| anyhow::anyhow!("upload reservation missing upload_url"))?
            .to_string();
        let file_id = parsed
            .get("file_id")
            .and_then(|f| f.as_str())
            .ok_or_else(|| anyhow::anyhow!("upload reservation missing file_id"))?
            .to_string();

        // 2. Push the raw bytes.
        let put = self
            .http
            .put(&upload_url)
            .body(bytes)
            .send()
            .await
            .context("Slack file upload PUT failed")?;
        let put_status = put.status();
        if !put_status.is_success() {
            bail!("Slack file upload PUT failed ({put_status})");
        }

        // 3. Attach the uploaded file to the channel.
        let body = serde_json::json!({
            "files": [{ "id": file_id, "title": filename }],
            "channel_id": channel,
        });
        self.call("files.completeUploadExternal", &body)
            .await
            .map(|_| ())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
