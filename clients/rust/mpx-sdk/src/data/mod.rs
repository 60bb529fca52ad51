//! Typed mpx objects
//!
//! Only a few object types are modelled here. Each embeds [`ObjectBase`] for
//! the fields every mpx object shares. Any other type can be read as
//! `serde_json::Value` or a caller-defined struct.

mod media;
mod player;

pub use media::{Media, MediaFile};
pub use player::Player;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fields common to all mpx data objects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObjectBase {
    /// Object URI
    pub id: Option<String>,
    pub guid: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Owning account URI
    pub owner_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub added: Option<DateTime<Utc>>,
    pub added_by_user_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub updated: Option<DateTime<Utc>>,
    pub updated_by_user_id: Option<String>,
    pub locked: Option<bool>,
    pub version: Option<i64>,
}

impl ObjectBase {
    /// Numeric id, the last segment of the object URI
    pub fn numeric_id(&self) -> Option<&str> {
        self.id.as_deref().and_then(|id| id.rsplit('/').next())
    }
}

/// Objects with a caller-assigned GUID
pub trait HasGuid {
    fn guid(&self) -> Option<&str>;
}

/// Objects with a public id used in player URLs
pub trait HasPublicId {
    fn public_id(&self) -> Option<&str>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_fields_and_dates() {
        let base: ObjectBase = serde_json::from_str(
            r#"{"id":"http://data.media.theplatform.com/media/data/Media/2602559","title":"Video","added":1510000000000,"locked":false}"#,
        )
        .unwrap();
        assert_eq!(base.numeric_id(), Some("2602559"));
        assert_eq!(base.added.unwrap().timestamp(), 1_510_000_000);
        assert_eq!(base.locked, Some(false));
    }
}
