//! Flattening of Gmail MIME payloads to plain text.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// URL-safe base64 that accepts data with or without padding.
pub(crate) const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// A node of a Gmail message payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

impl MessagePart {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    fn data(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .filter(|d| !d.is_empty())
    }
}

/// Extract readable text from a payload, with HTML entities unescaped.
pub fn extract_body(payload: &MessagePart) -> String {
    unescape_entities(&extract_raw(payload))
}

fn extract_raw(part: &MessagePart) -> String {
    match part.mime_type.as_str() {
        "text/plain" => part.data().map(decode_data).unwrap_or_default(),
        "text/html" => part
            .data()
            .map(|data| html_to_text(&decode_data(data)))
            .unwrap_or_default(),
        _ => part
            .parts
            .iter()
            .map(extract_raw)
            .find(|text| !text.is_empty())
            .unwrap_or_default(),
    }
}

fn decode_data(data: &str) -> String {
    match URL_SAFE_LENIENT.decode(data.trim()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            warn!("Skipping undecodable message part: {}", e);
            String::new()
        }
    }
}

/// Visible text of an HTML document: trimmed text nodes joined by single spaces.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);

    document
        .root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .is_some_and(|name| matches!(name, "script" | "style" | "head" | "title"));
            if hidden {
                None
            } else {
                Some(text.trim())
            }
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decode HTML character references without treating the input as markup.
fn unescape_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let escaped = text.replace('<', "&lt;").replace('>', "&gt;");
    Html::parse_fragment(&escaped).root_element().text().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;

    fn leaf(mime_type: &str, text: &str) -> MessagePart {
        MessagePart {
            mime_type: mime_type.to_string(),
            body: Some(PartBody {
                data: Some(URL_SAFE.encode(text)),
                size: text.len() as u64,
            }),
            ..Default::default()
        }
    }

    fn multipart(parts: Vec<MessagePart>) -> MessagePart {
        MessagePart {
            mime_type: "multipart/alternative".to_string(),
            parts,
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_text_leaf() {
        assert_eq!(extract_body(&leaf("text/plain", "Hello world")), "Hello world");
    }

    #[test]
    fn test_html_only_multipart() {
        let payload = multipart(vec![leaf("text/html", "<p>Hi &amp; bye</p>")]);
        assert_eq!(extract_body(&payload), "Hi & bye");
    }

    #[test]
    fn test_html_text_nodes_are_joined() {
        let html = "<html><head><title>t</title><style>p{}</style></head>\
                    <body><h1> Headline </h1><p>First\n</p><script>var x;</script><p>Second</p></body></html>";
        assert_eq!(html_to_text(html), "Headline First Second");
    }

    #[test]
    fn test_first_non_empty_part_wins() {
        let payload = multipart(vec![
            MessagePart {
                mime_type: "text/plain".to_string(),
                ..Default::default()
            },
            multipart(vec![leaf("text/plain", "nested text")]),
            leaf("text/plain", "later text"),
        ]);
        assert_eq!(extract_body(&payload), "nested text");
    }

    #[test]
    fn test_unknown_leaf_is_empty() {
        assert_eq!(extract_body(&leaf("image/png", "binary")), "");
    }

    #[test]
    fn test_plain_text_keeps_angle_brackets() {
        let payload = leaf("text/plain", "AT&amp;T < Verizon > Sprint");
        assert_eq!(extract_body(&payload), "AT&T < Verizon > Sprint");
    }

    #[test]
    fn test_unpadded_data_decodes() {
        let payload = MessagePart {
            mime_type: "text/plain".to_string(),
            body: Some(PartBody {
                data: Some("SGk".to_string()),
                size: 2,
            }),
            ..Default::default()
        };
        assert_eq!(extract_body(&payload), "Hi");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let part = MessagePart {
            headers: vec![Header {
                name: "subject".to_string(),
                value: "Morning brief".to_string(),
            }],
            ..Default::default()
        };
        assert_eq!(part.header("Subject"), Some("Morning brief"));
        assert_eq!(part.header("From"), None);
    }
}
