//! Stored value codec.
//!
//! One store slot holds either a bare destination URL or a JSON object
//! carrying the URL plus campaign fields. Decoding tries the structured
//! form first and falls back to the literal form; it never fails.

use serde_json::{json, Map, Value};

use crate::{Mapping, NewMapping, UtmParams};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkValue {
    /// The whole stored string, trimmed, is the destination.
    Literal(String),
    /// `{"longUrl": .., "utm_source": .., "utm_medium": .., "utm_campaign": .., "tags": [..]}`
    Structured {
        long_url: String,
        utm: UtmParams,
        tags: Vec<String>,
    },
}

impl LinkValue {
    /// Decode a raw stored value.
    ///
    /// Only a JSON object with a string `longUrl` is structured. Any other
    /// input, including valid JSON of another shape, is a literal URL.
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(obj)) => match obj.get("longUrl").and_then(Value::as_str) {
                Some(long_url) => LinkValue::Structured {
                    long_url: long_url.to_string(),
                    utm: UtmParams::new(
                        string_field(&obj, "utm_source"),
                        string_field(&obj, "utm_medium"),
                        string_field(&obj, "utm_campaign"),
                    ),
                    tags: obj
                        .get("tags")
                        .and_then(Value::as_array)
                        .map(|arr| {
                            arr.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default(),
                },
                None => LinkValue::Literal(raw.trim().to_string()),
            },
            _ => LinkValue::Literal(raw.trim().to_string()),
        }
    }

    /// Build the structured value written by the admin surfaces.
    pub fn structured(input: &NewMapping) -> Self {
        LinkValue::Structured {
            long_url: input.long_url.trim().to_string(),
            utm: input.utm.clone(),
            tags: input.tags.clone(),
        }
    }

    /// Encode for storage. Missing campaign fields are written as empty
    /// strings, matching what older writers produced.
    pub fn encode(&self) -> String {
        match self {
            LinkValue::Literal(url) => url.clone(),
            LinkValue::Structured {
                long_url,
                utm,
                tags,
            } => json!({
                "longUrl": long_url,
                "utm_source": utm.source.as_deref().unwrap_or(""),
                "utm_medium": utm.medium.as_deref().unwrap_or(""),
                "utm_campaign": utm.campaign.as_deref().unwrap_or(""),
                "tags": tags,
            })
            .to_string(),
        }
    }

    pub fn destination(&self) -> &str {
        match self {
            LinkValue::Literal(url) => url,
            LinkValue::Structured { long_url, .. } => long_url,
        }
    }

    pub fn utm(&self) -> UtmParams {
        match self {
            LinkValue::Literal(_) => UtmParams::default(),
            LinkValue::Structured { utm, .. } => utm.clone(),
        }
    }

    pub fn into_mapping(self, short_code: &str) -> Mapping {
        match self {
            LinkValue::Literal(url) => Mapping {
                short_code: short_code.to_string(),
                long_url: url,
                ..Default::default()
            },
            LinkValue::Structured {
                long_url,
                utm,
                tags,
            } => Mapping {
                short_code: short_code.to_string(),
                long_url,
                utm_source: utm.source.unwrap_or_default(),
                utm_medium: utm.medium.unwrap_or_default(),
                utm_campaign: utm.campaign.unwrap_or_default(),
                tags,
            },
        }
    }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_url_is_literal_and_trimmed() {
        let v = LinkValue::parse("  https://example.com/page \n");
        assert_eq!(v, LinkValue::Literal("https://example.com/page".into()));
        assert!(v.utm().is_empty());
    }

    #[test]
    fn json_object_with_long_url_is_structured() {
        let v = LinkValue::parse(
            r#"{"longUrl":"https://example.com/x","utm_source":"news","utm_medium":"","tags":["a",1]}"#,
        );
        assert_eq!(v.destination(), "https://example.com/x");
        let utm = v.utm();
        assert_eq!(utm.source.as_deref(), Some("news"));
        assert!(utm.medium.is_none());
        assert!(utm.campaign.is_none());
        match v {
            LinkValue::Structured { tags, .. } => assert_eq!(tags, vec!["a".to_string()]),
            other => panic!("expected structured, got {:?}", other),
        }
    }

    #[test]
    fn other_json_shapes_fall_back_to_literal() {
        assert_eq!(
            LinkValue::parse(r#"{"url":"https://x"}"#),
            LinkValue::Literal(r#"{"url":"https://x"}"#.into())
        );
        assert_eq!(LinkValue::parse("12345"), LinkValue::Literal("12345".into()));
        assert_eq!(
            LinkValue::parse(r#"{"longUrl": 7}"#),
            LinkValue::Literal(r#"{"longUrl": 7}"#.into())
        );
    }

    #[test]
    fn encode_writes_empty_strings_for_missing_utm() {
        let v = LinkValue::structured(&NewMapping {
            long_url: " https://example.com ".into(),
            utm: UtmParams::new(None, Some("email".into()), None),
            ..Default::default()
        });
        let json: Value = serde_json::from_str(&v.encode()).unwrap();
        assert_eq!(json["longUrl"], "https://example.com");
        assert_eq!(json["utm_source"], "");
        assert_eq!(json["utm_medium"], "email");
        assert_eq!(json["tags"], json!([]));
        assert_eq!(LinkValue::parse(&v.encode()), v);
    }

    #[test]
    fn into_mapping_keeps_code_and_fields() {
        let m = LinkValue::parse(r#"{"longUrl":"https://e.com","utm_campaign":"spring"}"#)
            .into_mapping("spr");
        assert_eq!(m.short_code, "spr");
        assert_eq!(m.long_url, "https://e.com");
        assert_eq!(m.utm_campaign, "spring");
        assert_eq!(m.utm_source, "");
    }
}
