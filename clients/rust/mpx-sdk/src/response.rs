//! Response interpretation: exception envelopes and JSON clean-up

use crate::error::{ApiException, Error, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::OnceLock;

fn xml_field(body: &str, tag: &str) -> Option<String> {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        ["e:responseCode", "e:title", "e:description", "title", "summary", "e:correlationId"]
            .into_iter()
            .map(|tag| {
                let pattern = format!(r"(?s)<{tag}(?:\s[^>]*)?>(.*?)</{tag}>", tag = regex::escape(tag));
                (tag, Regex::new(&pattern).unwrap())
            })
            .collect()
    });

    let (_, re) = patterns.iter().find(|(t, _)| *t == tag)?;
    re.captures(body)
        .and_then(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str().trim()))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Extract a vendor exception from a JSON or XML body, if it carries one.
pub fn parse_exception(body: &[u8]) -> Option<ApiException> {
    let text = std::str::from_utf8(body).ok()?.trim_start();

    if text.starts_with('{') {
        let value: Value = serde_json::from_str(text).ok()?;
        return json_exception(&value);
    }

    if text.starts_with('<') {
        let code = xml_field(text, "e:responseCode")?.parse().ok()?;
        let title = xml_field(text, "e:title")
            .or_else(|| xml_field(text, "title"))
            .unwrap_or_default();
        let description = xml_field(text, "e:description")
            .or_else(|| xml_field(text, "summary"))
            .unwrap_or_default();
        return Some(ApiException {
            response_code: code,
            title,
            description,
            correlation_id: xml_field(text, "e:correlationId"),
        });
    }

    None
}

/// Exception fields of a parsed JSON body
pub fn json_exception(value: &Value) -> Option<ApiException> {
    let object = value.as_object()?;
    if !object.get("isException").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    let response_code = object
        .get("responseCode")
        .and_then(Value::as_u64)
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(500);
    let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

    Some(ApiException {
        response_code,
        title: text("title").unwrap_or_default(),
        description: text("description").unwrap_or_default(),
        correlation_id: text("correlationId"),
    })
}

/// Turn a raw response into an error when it signals one.
///
/// Envelopes win over the HTTP status since they carry the vendor's detail.
/// A non-2xx response without an envelope becomes [`Error::Status`].
pub fn check_response(status: u16, body: &[u8]) -> Result<()> {
    if let Some(exception) = parse_exception(body) {
        return Err(Error::Api(exception));
    }

    if !(200..300).contains(&status) {
        return Err(Error::Status {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }

    Ok(())
}

/// Remove explicit nulls from JSON objects, recursively.
///
/// mpx sends `null` for unset fields; dropping them lets serde fall back to
/// field defaults instead of failing on non-optional types.
pub fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                strip_nulls(v);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                strip_nulls(item);
            }
        }
        _ => {}
    }
}

/// Decode a successful body into `T`, filtering nulls first.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let mut value: Value = serde_json::from_slice(body)?;
    strip_nulls(&mut value);
    Ok(serde_json::from_value(value)?)
}
