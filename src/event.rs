//! Slack Events API payload types and event normalization.
//!
//! Slack POSTs one of two envelope shapes: a `url_verification` handshake
//! carrying a `challenge`, or an `event_callback` carrying an `event_id`
//! plus the event object. Only `app_mention` and plain `message` events are
//! processed; everything else is absorbed.

use serde::Deserialize;

/// Top-level Events API envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum SlackEnvelope {
    #[serde(rename = "url_verification")]
    UrlVerification { challenge: String },
    #[serde(rename = "event_callback")]
    EventCallback {
        event_id: String,
        event: SlackEvent,
    },
    #[serde(other)]
    Unknown,
}

/// Inner event object of an `event_callback` envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum SlackEvent {
    #[serde(rename = "app_mention")]
    AppMention {
        user: Option<String>,
        text: Option<String>,
        ts: String,
        channel: String,
        #[serde(default)]
        files: Vec<SlackFile>,
    },
    #[serde(rename = "message")]
    Message {
        user: Option<String>,
        text: Option<String>,
        ts: String,
        channel: String,
        channel_type: Option<String>,
        subtype: Option<String>,
        bot_id: Option<String>,
        #[serde(default)]
        files: Vec<SlackFile>,
    },
    #[serde(other)]
    Other,
}

/// File attachment metadata as delivered inside message events.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackFile {
    pub id: Option<String>,
    pub name: Option<String>,
    pub mimetype: Option<String>,
    pub url_private: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Direct message (`im` or `mpim`).
    Im,
    /// Any shared channel or group.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Mention,
    Message,
}

/// Normalized inbound event handed to the worker pool.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub event_id: String,
    pub kind: EventKind,
    pub user: String,
    pub channel: String,
    pub channel_kind: ChannelKind,
    pub text: String,
    pub ts: String,
    pub files: Vec<SlackFile>,
    /// Present when the message originated from a bot integration.
    pub bot_id: Option<String>,
}

impl InboundEvent {
    /// Normalize a raw event. Returns `None` for event shapes the service
    /// never acts on (unknown types, edits, deletions, joins, ...).
    ///
    /// Bot-authored messages are kept so the caller can answer with the
    /// dedicated "ignored bot message" status instead of silently dropping
    /// them.
    pub fn from_event(event_id: String, event: SlackEvent) -> Option<Self> {
        match event {
            SlackEvent::AppMention {
                user,
                text,
                ts,
                channel,
                files,
            } => {
                let user = user?;
                Some(Self {
                    event_id,
                    kind: EventKind::Mention,
                    user,
                    channel,
                    channel_kind: ChannelKind::Other,
                    text: text.unwrap_or_default(),
                    ts,
                    files,
                    bot_id: None,
                })
            }
            SlackEvent::Message {
                user,
                text,
                ts,
                channel,
                channel_type,
                subtype,
                bot_id,
                files,
            } => {
                // bot_message is kept for the self-message filter; any other
                // subtype (message_changed, channel_join, ...) is dropped.
                match subtype.as_deref() {
                    None | Some("bot_message") => {}
                    Some(_) => return None,
                }
                if user.is_none() && bot_id.is_none() {
                    return None;
                }
                let channel_kind = match channel_type.as_deref() {
                    Some("im") | Some("mpim") => ChannelKind::Im,
                    _ => ChannelKind::Other,
                };
                Some(Self {
                    event_id,
                    kind: EventKind::Message,
                    user: user.unwrap_or_default(),
                    channel,
                    channel_kind,
                    text: text.unwrap_or_default(),
                    ts,
                    files,
                    bot_id,
                })
            }
            SlackEvent::Other => None,
        }
    }
}

/// Remove every `<@UXXXX>` mention token from the text and trim the result.
pub fn strip_mentions(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        match rest[start..].find('>') {
            Some(end) => {
                cleaned.push_str(&rest[..start]);
                rest = &rest[start + end + 1..];
            }
            None => break,
        }
    }
    cleaned.push_str(rest);
    cleaned.trim().to_string()
}

/// First attachment with an `image/*` MIME type, if any.
pub fn first_image(files: &[SlackFile]) -> Option<&SlackFile> {
    files.iter().find(|f| {
        f.mimetype
            .as_deref()
            .is_some_and(|m| m.starts_with("image/"))
    })
}

/// Text-branch response gate: always answer DMs; in shared channels answer
/// only when the cleaned text is non-empty (a bare mention says nothing).
pub fn should_respond(kind: ChannelKind, cleaned_text: &str) -> bool {
    kind == ChannelKind::Im || !cleaned_text.is_empty()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SlackEnvelope {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parse_url_verification() {
        let env = parse(r#"{"type":"url_verification","token":"t","challenge":"abc123"}"#);
        match env {
            SlackEnvelope::UrlVerification { challenge } => assert_eq!(challenge, "abc123"),
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn parse_event_callback_message() {
        let env = parse(
            r#"{
                "type": "event_callback",
                "event_id": "Ev001",
                "event": {
                    "type": "message",
                    "user": "U123",
                    "text": "hello",
                    "ts": "1700000000.000100",
                    "channel": "D456",
                    "channel_type": "im"
                }
            }"#,
        );
        let SlackEnvelope::EventCallback { event_id, event } = env else {
            panic!("expected event_callback");
        };
        assert_eq!(event_id, "Ev001");
        let ev = InboundEvent::from_event(event_id, event).unwrap();
        assert_eq!(ev.kind, EventKind::Message);
        assert_eq!(ev.channel_kind, ChannelKind::Im);
        assert_eq!(ev.user, "U123");
        assert_eq!(ev.text, "hello");
    }

    #[test]
    fn parse_event_callback_mention_with_files() {
        let env = parse(
            r#"{
                "type": "event_callback",
                "event_id": "Ev002",
                "event": {
                    "type": "app_mention",
                    "user": "U123",
                    "text": "<@UBOT> describe this",
                    "ts": "1700000000.000200",
                    "channel": "C789",
                    "files": [{"id": "F1", "name": "cat.png", "mimetype": "image/png",
                               "url_private": "https://files.example/cat.png"}]
                }
            }"#,
        );
        let SlackEnvelope::EventCallback { event_id, event } = env else {
            panic!("expected event_callback");
        };
        let ev = InboundEvent::from_event(event_id, event).unwrap();
        assert_eq!(ev.kind, EventKind::Mention);
        assert_eq!(ev.channel_kind, ChannelKind::Other);
        assert_eq!(ev.files.len(), 1);
        assert_eq!(ev.files[0].mimetype.as_deref(), Some("image/png"));
    }

    #[test]
    fn parse_unknown_envelope_type() {
        let env = parse(r#"{"type":"app_rate_limited","minute_rate_limited":1}"#);
        assert!(matches!(env, SlackEnvelope::Unknown));
    }

    #[test]
    fn unknown_event_type_is_dropped() {
        let env = parse(
            r#"{
                "type": "event_callback",
                "event_id": "Ev003",
                "event": {"type": "reaction_added", "user": "U1"}
            }"#,
        );
        let SlackEnvelope::EventCallback { event_id, event } = env else {
            panic!("expected event_callback");
        };
        assert!(InboundEvent::from_event(event_id, event).is_none());
    }

    #[test]
    fn message_subtype_is_dropped() {
        let event = SlackEvent::Message {
            user: Some("U1".into()),
            text: Some("edited".into()),
            ts: "1.0".into(),
            channel: "C1".into(),
            channel_type: Some("channel".into()),
            subtype: Some("message_changed".into()),
            bot_id: None,
            files: vec![],
        };
        assert!(InboundEvent::from_event("Ev".into(), event).is_none());
    }

    #[test]
    fn bot_message_subtype_is_kept_with_marker() {
        let event = SlackEvent::Message {
            user: None,
            text: Some("from a bot".into()),
            ts: "1.0".into(),
            channel: "C1".into(),
            channel_type: Some("channel".into()),
            subtype: Some("bot_message".into()),
            bot_id: Some("B99".into()),
            files: vec![],
        };
        let ev = InboundEvent::from_event("Ev".into(), event).unwrap();
        assert_eq!(ev.bot_id.as_deref(), Some("B99"));
    }

    #[test]
    fn message_without_user_or_bot_is_dropped() {
        let event = SlackEvent::Message {
            user: None,
            text: Some("?".into()),
            ts: "1.0".into(),
            channel: "C1".into(),
            channel_type: None,
            subtype: None,
            bot_id: None,
            files: vec![],
        };
        assert!(InboundEvent::from_event("Ev".into(), event).is_none());
    }

    #[test]
    fn mention_without_user_is_dropped() {
        let event = SlackEvent::AppMention {
            user: None,
            text: Some("hi".into()),
            ts: "1.0".into(),
            channel: "C1".into(),
            files: vec![],
        };
        assert!(InboundEvent::from_event("Ev".into(), event).is_none());
    }

    // ── strip_mentions ────────────────────────────────────────────────────────

    #[test]
    fn strip_leading_mention() {
        assert_eq!(strip_mentions("<@UBOT> hello"), "hello");
    }

    #[test]
    fn strip_multiple_mentions() {
        assert_eq!(strip_mentions("<@U1> ping <@U2> pong"), "ping  pong");
    }

    #[test]
    fn strip_mention_only_yields_empty() {
        assert_eq!(strip_mentions("<@UBOT>"), "");
        assert_eq!(strip_mentions("  <@UBOT>  "), "");
    }

    #[test]
    fn strip_no_mention_is_identity() {
        assert_eq!(strip_mentions("plain text"), "plain text");
    }

    #[test]
    fn strip_unterminated_mention_is_kept() {
        assert_eq!(strip_mentions("<@UBOT hello"), "<@UBOT hello");
    }

    // ── first_image ───────────────────────────────────────────────────────────

    fn file(mimetype: Option<&str>) -> SlackFile {
        SlackFile {
            id: None,
            name: None,
            mimetype: mimetype.map(str::to_string),
            url_private: None,
        }
    }

    #[test]
    fn first_image_skips_non_images() {
        let files = vec![file(Some("application/pdf")), file(Some("image/jpeg"))];
        assert_eq!(
            first_image(&files).unwrap().mimetype.as_deref(),
            Some("image/jpeg")
        );
    }

    #[test]
    fn first_image_none_when_absent() {
        assert!(first_image(&[]).is_none());
        assert!(first_image(&[file(Some("text/plain")), file(None)]).is_none());
    }

    // ── should_respond ────────────────────────────────────────────────────────

    #[test]
    fn dm_always_responds() {
        assert!(should_respond(ChannelKind::Im, ""));
        assert!(should_respond(ChannelKind::Im, "hi"));
    }

    #[test]
    fn channel_requires_text() {
        assert!(!should_respond(ChannelKind::Other, ""));
        assert!(should_respond(ChannelKind::Other, "hi"));
    }
}
