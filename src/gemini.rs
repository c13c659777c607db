//! Gemini generative API client.
//!
//! All calls go through `models/{model}:generateContent`. Text prompts use a
//! single user turn; image description attaches the image bytes as an
//! `inline_data` part; image generation asks for an IMAGE response modality
//! and decodes the base64 payload that comes back.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};

use crate::config::GeminiConfig;

pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

/// A generated image decoded from the API response.
pub struct GeneratedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, config: GeminiConfig) -> Self {
        Self { http, config }
    }

    fn model_url(&self, model: &str) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.config.api_base.trim_end_matches('/'),
            model,
            self.config.api_key
        )
    }

    async fn generate(&self, model: &str, body: Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.model_url(model))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            bail!("Gemini API {status}: {text}");
        }
        let value: Value =
            serde_json::from_str(&text).context("Gemini response is not valid JSON")?;
        if let Some(msg) = value["error"]["message"].as_str() {
            bail!("Gemini error: {msg}");
        }
        Ok(value)
    }

    /// Concatenated text of the first candidate's parts.
    fn response_text(value: &Value) -> Result<String> {
        let parts = value["candidates"][0]["content"]["parts"]
            .as_array()
            .context("Gemini response missing candidates")?;
        let mut out = String::new();
        for part in parts {
            if let Some(text) = part["text"].as_str() {
                out.push_str(text);
            }
        }
        if out.is_empty() {
            bail!("Gemini returned an empty response");
        }
        Ok(out)
    }

    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": self.config.max_output_tokens },
        });
        let value = self.generate(&self.config.text_model, body).await?;
        Self::response_text(&value)
    }

    /// Multi-modal call: prompt text plus raw image bytes.
    pub async fn describe_image(
        &self,
        mime_type: &str,
        bytes: &[u8],
        prompt: &str,
    ) -> Result<String> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [
                { "text": prompt },
                { "inline_data": { "mime_type": mime_type, "data": STANDARD.encode(bytes) } },
            ]}],
            "generationConfig": { "maxOutputTokens": self.config.max_output_tokens },
        });
        let value = self.generate(&self.config.text_model, body).await?;
        Self::response_text(&value)
    }

    /// Ask the image model for a new image and decode its payload.
    pub async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });
        let value = self.generate(&self.config.image_model, body).await?;
        let parts = value["candidates"][0]["content"]["parts"]
            .as_array()
            .context("Gemini image response missing candidates")?;
        for part in parts {
            // The REST API answers in camelCase; accept snake_case too.
            let inline = if part["inline_data"].is_object() {
                &part["inline_data"]
            } else {
                &part["inlineData"]
            };
            if let Some(data) = inline["data"].as_str() {
                let mime_type = inline["mime_type"]
                    .as_str()
                    .or_else(|| inline["mimeType"].as_str())
                    .unwrap_or("image/png")
                    .to_string();
                return Ok(GeneratedImage {
                    mime_type,
                    bytes: decode_image_payload(data)?,
                });
            }
        }
        bail!("Gemini image response contained no image data");
    }

    /// Single-keyword extraction used by the Drive search mode.
    pub async fn extract_keyword(&self, text: &str) -> Result<String> {
        let prompt = format!(
            "Extract the single most relevant folder search keyword from the \
             following message. Reply with the keyword only, no punctuation \
             or explanation.\n\n{text}"
        );
        let raw = self.generate_text(&prompt).await?;
        let keyword = raw
            .lines()
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches('"')
            .to_string();
        if keyword.is_empty() {
            bail!("Gemini returned an empty keyword");
        }
        Ok(keyword)
    }
}

/// Decode a base64 image payload, tolerating a `data:<mime>;base64,` prefix.
pub fn decode_image_payload(data: &str) -> Result<Vec<u8>> {
    let payload = match data.split_once("base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    STANDARD
        .decode(payload.trim())
        .context("generated image payload is not valid base64")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> GeminiConfig {
        GeminiConfig {
            api_key: "test-key".into(),
            api_base: server.uri(),
            text_model: "text-model".into(),
            image_model: "image-model".into(),
            max_output_tokens: 256,
            image_generation: true,
            narrative_prompt: "describe".into(),
        }
    }

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(reqwest::Client::new(), config(server))
    }

    fn text_response(text: &str) -> Value {
        json!({
            "candidates": [{ "content": { "role": "model",
                "parts": [{ "text": text }] } }]
        })
    }

    #[tokio::test]
    async fn generate_text_returns_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("a story")))
            .expect(1)
            .mount(&server)
            .await;
        assert_eq!(client(&server).generate_text("hi").await.unwrap(), "a story");
    }

    #[tokio::test]
    async fn generate_text_concatenates_parts() {
        let server = MockServer::start().await;
        let body = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "one " }, { "text": "two" }
            ]}}]
        });
        Mock::given(method("POST"))
            .and(path("/text-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        assert_eq!(client(&server).generate_text("hi").await.unwrap(), "one two");
    }

    #[tokio::test]
    async fn generate_text_surfaces_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": { "code": 400, "message": "API key not valid" }
            })))
            .mount(&server)
            .await;
        let err = client(&server).generate_text("hi").await.unwrap_err().to_string();
        assert!(err.contains("API key not valid"));
    }

    #[tokio::test]
    async fn generate_text_surfaces_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text-model:generateContent"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;
        let err = client(&server).generate_text("hi").await.unwrap_err().to_string();
        assert!(err.contains("429"));
    }

    #[tokio::test]
    async fn describe_image_sends_inline_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("a cat")))
            .mount(&server)
            .await;
        let story = client(&server)
            .describe_image("image/png", &[1, 2, 3], "describe")
            .await
            .unwrap();
        assert_eq!(story, "a cat");

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "describe");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], STANDARD.encode([1, 2, 3]));
    }

    #[tokio::test]
    async fn generate_image_decodes_inline_payload() {
        let server = MockServer::start().await;
        let payload = STANDARD.encode([9u8, 8, 7]);
        let body = json!({
            "candidates": [{ "content": { "parts": [
                { "text": "here you go" },
                { "inlineData": { "mimeType": "image/png", "data": payload } }
            ]}}]
        });
        Mock::given(method("POST"))
            .and(path("/image-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        let image = client(&server).generate_image("a cat").await.unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.bytes, vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn generate_image_without_image_part_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/image-model:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("no image")))
            .mount(&server)
            .await;
        assert!(client(&server).generate_image("a cat").await.is_err());
    }

    #[tokio::test]
    async fn extract_keyword_trims_to_first_line() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text-model:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(text_response("\"budget\"\nsecond line")),
            )
            .mount(&server)
            .await;
        assert_eq!(client(&server).extract_keyword("where is the budget folder").await.unwrap(), "budget");
    }

    // ── decode_image_payload ──────────────────────────────────────────────────

    #[test]
    fn decode_plain_base64() {
        let encoded = STANDARD.encode([1u8, 2, 3]);
        assert_eq!(decode_image_payload(&encoded).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn decode_data_uri_prefix_matches_plain() {
        let encoded = STANDARD.encode([1u8, 2, 3]);
        let prefixed = format!("data:image/png;base64,{encoded}");
        assert_eq!(
            decode_image_payload(&prefixed).unwrap(),
            decode_image_payload(&encoded).unwrap()
        );
    }

    #[test]
    fn decode_invalid_base64_fails() {
        assert!(decode_image_payload("!!not base64!!").is_err());
    }

    #[test]
    fn decode_non_data_prefix_is_not_stripped() {
        // "base64," inside ordinary payload text must not trigger stripping.
        let err = decode_image_payload("xbase64,####");
        assert!(err.is_err());
    }
}
