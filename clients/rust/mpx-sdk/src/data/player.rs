use super::{HasGuid, HasPublicId, ObjectBase};
use serde::{Deserialize, Serialize};

/// A Player object from the Player Data Service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    #[serde(flatten)]
    pub base: ObjectBase,
    #[serde(default)]
    pub pid: Option<String>,
    #[serde(default)]
    pub disabled: Option<bool>,
    #[serde(default)]
    pub player_url: Option<String>,
    #[serde(default)]
    pub embed_width: Option<u32>,
    #[serde(default)]
    pub embed_height: Option<u32>,
}

impl HasGuid for Player {
    fn guid(&self) -> Option<&str> {
        self.base.guid.as_deref()
    }
}

impl HasPublicId for Player {
    fn public_id(&self) -> Option<&str> {
        self.pid.as_deref()
    }
}
