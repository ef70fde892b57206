use dealwatch_core::config::DispatchConfig;
use dealwatch_core::events::Payload;
use serde::Serialize;
use serde_json::Value;

/// Body of an incoming-webhook post. Icon fields are omitted when unset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookMessage {
    pub text: String,
    pub channel: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

impl WebhookMessage {
    pub fn new(text: impl Into<String>, config: &DispatchConfig) -> Self {
        Self {
            text: text.into(),
            channel: config.channel.clone(),
            username: config.identity_name.clone(),
            icon_emoji: non_empty(config.icon_emoji.as_deref()),
            icon_url: non_empty(config.icon_url.as_deref()),
        }
    }

    pub fn for_payload(payload: &Payload, config: &DispatchConfig) -> Self {
        Self::new(render_text(payload), config)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.text.clone())
    }
}

/// The payload's `message` when it is a non-blank string or a number/boolean, otherwise the
/// whole payload as compact JSON so nothing is dropped for lacking the field.
pub fn render_text(payload: &Payload) -> String {
    match payload.get("message") {
        Some(Value::String(message)) if !message.trim().is_empty() => message.clone(),
        Some(scalar @ (Value::Number(_) | Value::Bool(_))) => scalar.to_string(),
        _ => Value::Object(payload.clone()).to_string(),
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty()).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use dealwatch_core::config::DispatchConfig;
    use dealwatch_core::events::Payload;
    use serde_json::{json, Value};

    use super::{render_text, WebhookMessage};

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn config() -> DispatchConfig {
        DispatchConfig::new("https://hooks.example/x", "#sales", "bot")
    }

    #[test]
    fn message_field_is_used_verbatim() {
        let payload = payload(json!({"message": "Acme Co created in Proposal.", "extra": 1}));
        assert_eq!(render_text(&payload), "Acme Co created in Proposal.");
    }

    #[test]
    fn missing_or_blank_message_falls_back_to_payload_json() {
        let without = payload(json!({"deal": "Acme Co", "value": 250}));
        assert_eq!(render_text(&without), Value::Object(without.clone()).to_string());

        let blank = payload(json!({"message": "   "}));
        assert_eq!(render_text(&blank), r#"{"message":"   "}"#);

        let null = payload(json!({"message": null, "deal": 7}));
        assert_eq!(render_text(&null), Value::Object(null.clone()).to_string());
    }

    #[test]
    fn scalar_message_is_rendered_as_its_value() {
        assert_eq!(render_text(&payload(json!({"message": 42, "extra": "x"}))), "42");
        assert_eq!(render_text(&payload(json!({"message": 2.5}))), "2.5");
        assert_eq!(render_text(&payload(json!({"message": false}))), "false");
    }

    #[test]
    fn body_without_icons_has_only_required_keys() {
        let message = WebhookMessage::for_payload(
            &payload(json!({"message": "Acme Co created in Proposal."})),
            &config(),
        );

        assert_eq!(
            message.to_json(),
            r##"{"text":"Acme Co created in Proposal.","channel":"#sales","username":"bot"}"##
        );
    }

    #[test]
    fn icons_are_included_only_when_non_empty() {
        let emoji_only = WebhookMessage::new("hi", &config().with_icon_emoji(":moneybag:"));
        let body = serde_json::to_value(&emoji_only).expect("serializable");
        assert_eq!(body["icon_emoji"], ":moneybag:");
        assert!(body.get("icon_url").is_none());

        let both = WebhookMessage::new(
            "hi",
            &config().with_icon_emoji(":moneybag:").with_icon_url("https://img.example/a.png"),
        );
        let body = serde_json::to_value(&both).expect("serializable");
        assert_eq!(body["icon_emoji"], ":moneybag:");
        assert_eq!(body["icon_url"], "https://img.example/a.png");

        let empty = WebhookMessage::new("hi", &config().with_icon_emoji("").with_icon_url(" "));
        let body = serde_json::to_value(&empty).expect("serializable");
        assert!(body.get("icon_emoji").is_none());
        assert!(body.get("icon_url").is_none());
    }
}
