//! Worker-side event processing.
//!
//! One admitted event produces at most one generation call and one Slack
//! call. Failures never propagate out of the worker; they surface as a chat
//! message in the originating channel instead.

use crate::dedup::DedupCache;
use crate::drive::DriveClient;
use crate::event::{first_image, should_respond, strip_mentions, InboundEvent, SlackFile};
use crate::gemini::GeminiClient;
use crate::slack::SlackClient;

/// Fixed notice posted when an attached image cannot be fetched from Slack.
pub const IMAGE_FETCH_FAILURE_NOTICE: &str = "Sorry, I couldn't download that image from Slack.";

const GENERATED_IMAGE_FILENAME: &str = "generated.png";

pub struct Dispatcher {
    slack: SlackClient,
    gemini: GeminiClient,
    drive: Option<DriveClient>,
    /// Second dedup layer keyed by message `ts`: a mention in a channel is
    /// delivered both as `app_mention` and as `message`.
    ts_dedup: DedupCache,
    narrative_prompt: String,
    image_generation: bool,
}

impl Dispatcher {
    pub fn new(
        slack: SlackClient,
        gemini: GeminiClient,
        drive: Option<DriveClient>,
        ts_dedup: DedupCache,
        narrative_prompt: String,
        image_generation: bool,
    ) -> Self {
        Self {
            slack,
            gemini,
            drive,
            ts_dedup,
            narrative_prompt,
            image_generation,
        }
    }

    pub async fn handle(&self, event: InboundEvent) {
        tracing::info!(
            event_id = %event.event_id,
            kind = ?event.kind,
            channel = %event.channel,
            user = %event.user,
            "processing event"
        );

        let text = strip_mentions(&event.text);

        if !self.ts_dedup.insert(&event.ts) {
            tracing::debug!(ts = %event.ts, "message timestamp already handled, skipping");
            return;
        }

        if let Some(file) = first_image(&event.files) {
            let file = file.clone();
            self.handle_image(&event, &file).await;
            return;
        }

        if !should_respond(event.channel_kind, &text) {
            tracing::debug!(channel = %event.channel, "nothing to respond to, skipping");
            return;
        }

        match &self.drive {
            Some(drive) => self.handle_drive_search(&event, &text, drive).await,
            None => self.handle_text(&event, &text).await,
        }
    }

    async fn post_or_log(&self, channel: &str, text: &str) {
        if let Err(e) = self.slack.post_message(channel, text).await {
            tracing::error!(error = %e, channel, "failed to post message to Slack");
        }
    }

    async fn handle_text(&self, event: &InboundEvent, text: &str) {
        match self.gemini.generate_text(text).await {
            Ok(reply) => self.post_or_log(&event.channel, &reply).await,
            Err(e) => {
                tracing::error!(error = %e, "text generation failed");
                self.post_or_log(&event.channel, &format!("Sorry, I encountered an error: {e}"))
                    .await;
            }
        }
    }

    async fn handle_image(&self, event: &InboundEvent, file: &SlackFile) {
        let Some(url) = file.url_private.as_deref() else {
            tracing::warn!("image attachment has no private URL");
            self.post_or_log(&event.channel, IMAGE_FETCH_FAILURE_NOTICE).await;
            return;
        };

        let bytes = match self.slack.fetch_file(url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "image download failed");
                self.post_or_log(&event.channel, IMAGE_FETCH_FAILURE_NOTICE).await;
                return;
            }
        };

        let mime_type = file.mimetype.as_deref().unwrap_or("image/png");
        let story = match self
            .gemini
            .describe_image(mime_type, &bytes, &self.narrative_prompt)
            .await
        {
            Ok(story) => story,
            Err(e) => {
                tracing::error!(error = %e, "image description failed");
                self.post_or_log(&event.channel, &format!("Sorry, I encountered an error: {e}"))
                    .await;
                return;
            }
        };
        self.post_or_log(&event.channel, &story).await;

        if !self.image_generation {
            return;
        }
        match self.gemini.generate_image(&story).await {
            Ok(image) => {
                if let Err(e) = self
                    .slack
                    .upload_file(&event.channel, GENERATED_IMAGE_FILENAME, image.bytes)
                    .await
                {
                    tracing::error!(error = %e, "generated image upload failed");
                    self.post_or_log(
                        &event.channel,
                        &format!("Sorry, I couldn't upload the generated image: {e}"),
                    )
                    .await;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "image generation failed");
                self.post_or_log(&event.channel, &format!("Sorry, I encountered an error: {e}"))
                    .await;
            }
        }
    }

    async fn handle_drive_search(&self, event: &InboundEvent, text: &str, drive: &DriveClient) {
        let keyword = match self.gemini.extract_keyword(text).await {
            Ok(keyword) => keyword,
            Err(e) => {
                tracing::error!(error = %e, "keyword extraction failed");
                self.post_or_log(&event.channel, &format!("Sorry, I encountered an error: {e}"))
                    .await;
                return;
            }
        };

        match drive.search_folders(&keyword).await {
            Ok(folders) if folders.is_empty() => {
                self.post_or_log(
                    &event.channel,
                    &format!("No Drive folders matched \"{keyword}\"."),
                )
                .await;
            }
            Ok(folders) => {
                let mut lines = vec![format!("Drive folders matching \"{keyword}\":")];
                for folder in &folders {
                    lines.push(format!("• <{}|{}>", folder.link(), folder.name));
                }
                self.post_or_log(&event.channel, &lines.join("\n")).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Drive search failed");
                self.post_or_log(&event.channel, &format!("Sorry, I encountered an error: {e}"))
                    .await;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
