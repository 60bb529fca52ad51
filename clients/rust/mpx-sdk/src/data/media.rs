use super::{HasGuid, ObjectBase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Media object from the Media Data Service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(flatten)]
    pub base: ObjectBase,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub keywords: Option<String>,
    #[serde(default)]
    pub categories: Vec<serde_json::Value>,
    #[serde(default)]
    pub content: Vec<MediaFile>,
    #[serde(default)]
    pub default_thumbnail_url: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub available_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub expiration_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub pub_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub public_url: Option<String>,
}

impl HasGuid for Media {
    fn guid(&self) -> Option<&str> {
        self.base.guid.as_deref()
    }
}

/// A rendition of a Media object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaFile {
    pub id: Option<String>,
    pub url: Option<String>,
    pub content_type: Option<String>,
    pub format: Option<String>,
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bitrate: Option<u64>,
    pub file_size: Option<u64>,
}
