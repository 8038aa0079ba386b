//! Session record models.
//!
//! This module defines the per-visit session record shared between the
//! orchestrator and the stage programs, plus the partial form used to merge
//! stage output into it.

use serde::{Deserialize, Serialize};

/// Maximum number of visitor names a session can hold.
pub const MAX_NAMES: usize = 5;

/// Keys of the name fields in a user-input `DATA` payload, in order.
pub const NAME_KEYS: [&str; MAX_NAMES] = ["NAME_A", "NAME_B", "NAME_C", "NAME_D", "NAME_E"];

/// The visitors taking part in one session.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Users {
    /// Ordered, non-empty visitor names (at most [`MAX_NAMES`]).
    #[serde(default)]
    pub names: Vec<String>,

    /// Prop labels reported by the detection stage. Kept free of duplicates.
    #[serde(default)]
    pub detected_props: Vec<String>,

    /// Reserved for appearance descriptions.
    #[serde(default)]
    pub appearance: String,
}

/// The accumulated record for one visitor pass.
///
/// Temp (`temp_user_data_<session_id>.json`) and permanent
/// (`session_<timestamp>.json`) files share this exact shape.
///
/// # Example
///
/// ```json
/// {
///   "session_id": "20240512_143000_125",
///   "story_id": 1,
///   "users": { "names": ["Alice"], "detected_props": ["hat"], "appearance": "" },
///   "timestamp": "",
///   "image_path": "snapshots/snapshot_20240512_143012.jpg",
///   "cache_image_path": ""
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Timestamp-derived identifier, fixed for one UserInput→Review cycle.
    pub session_id: String,

    /// Story picked in the user-input stage.
    #[serde(default)]
    pub story_id: Option<i64>,

    #[serde(default)]
    pub users: Users,

    /// Set only when the session is persisted permanently.
    #[serde(default)]
    pub timestamp: String,

    /// Full-resolution snapshot. Empty until the photo stage produced one.
    #[serde(default)]
    pub image_path: String,

    /// Half-resolution cache image. Empty until populated.
    #[serde(default)]
    pub cache_image_path: String,
}

impl Session {
    /// Create an empty session with the given id.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    /// Apply a partial record with field-wise overwrite semantics.
    ///
    /// A field that is `Some` in `patch` replaces the corresponding field;
    /// `None` fields are left untouched. Applying the same patch twice is
    /// the same as applying it once.
    pub fn merge(&mut self, patch: &SessionPatch) {
        if let Some(story_id) = patch.story_id {
            self.story_id = Some(story_id);
        }
        if let Some(users) = &patch.users {
            if let Some(names) = &users.names {
                self.users.names = names.clone();
            }
            if let Some(props) = &users.detected_props {
                self.users.detected_props = dedup_preserving_order(props);
            }
            if let Some(appearance) = &users.appearance {
                self.users.appearance = appearance.clone();
            }
        }
        if let Some(timestamp) = &patch.timestamp {
            self.timestamp = timestamp.clone();
        }
        if let Some(image_path) = &patch.image_path {
            self.image_path = image_path.clone();
        }
        if let Some(cache_image_path) = &patch.cache_image_path {
            self.cache_image_path = cache_image_path.clone();
        }
    }

    /// Whether a snapshot path has been recorded.
    pub fn has_image(&self) -> bool {
        !self.image_path.is_empty()
    }
}

/// Partial form of [`Users`] nested in a [`SessionPatch`].
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct UsersPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_props: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appearance: Option<String>,
}

/// A partial session record.
///
/// Stage artifacts (`detection_data_*.json`, `photo_data_*.json`) are read
/// into this type; keys that are absent or `null` deserialize to `None`.
/// The photo stage historically writes `cache_img_path`, which is accepted
/// as an alias.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<UsersPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(
        default,
        alias = "cache_img_path",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_image_path: Option<String>,
}

impl SessionPatch {
    /// Build a patch from a user-input `DATA` payload.
    ///
    /// `STORY_ID` may be a number or a numeric string. Names are taken from
    /// `NAME_A`..`NAME_E` in order, skipping blank entries. A payload that is
    /// not a JSON object yields a patch that only clears the name list.
    pub fn from_user_data(payload: &serde_json::Value) -> Self {
        let story_id = payload.get("STORY_ID").and_then(|value| match value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        let names = NAME_KEYS
            .iter()
            .filter_map(|key| payload.get(*key).and_then(|v| v.as_str()))
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .collect();

        Self {
            story_id,
            users: Some(UsersPatch {
                names: Some(names),
                ..UsersPatch::default()
            }),
            ..Self::default()
        }
    }

    /// Restrict an artifact patch to the fields stage artifacts may contribute.
    ///
    /// Artifacts never override visitor names, and only supply a story id
    /// when the session does not have one yet.
    pub fn artifact_fields(&self, session: &Session) -> Self {
        Self {
            story_id: if session.story_id.is_none() {
                self.story_id
            } else {
                None
            },
            users: self
                .users
                .as_ref()
                .and_then(|users| users.detected_props.clone())
                .filter(|props| !props.is_empty())
                .map(|props| UsersPatch {
                    detected_props: Some(props),
                    ..UsersPatch::default()
                }),
            timestamp: None,
            image_path: self.image_path.clone().filter(|p| !p.is_empty()),
            cache_image_path: self.cache_image_path.clone().filter(|p| !p.is_empty()),
        }
    }

    /// Whether the patch carries no fields at all.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// The default payload used when the user-input stage cannot be launched.
pub fn fallback_user_data() -> serde_json::Value {
    serde_json::json!({
        "STORY_ID": 1,
        "NAME_A": "User A",
        "NAME_B": "User B",
        "NAME_C": "",
        "NAME_D": "",
        "NAME_E": "",
    })
}

fn dedup_preserving_order(values: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(values.len());
    for value in values {
        if !seen.contains(value) {
            seen.push(value.clone());
        }
    }
    seen
}
