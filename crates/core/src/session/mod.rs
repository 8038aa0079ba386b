//! Session record storage.
//!
//! The [`SessionStore`] owns the on-disk forms of the per-visit record:
//! - `temp_user_data_<session_id>.json`: the in-flight record stage
//!   programs read to learn about the current visitors
//! - `session_<timestamp>.json`: the permanent record of a finished visit
//! - stage artifacts (`detection_data_*`, `photo_data_*`), written by the
//!   stage programs themselves and merged back into the session

pub mod error;
pub mod store;

pub use error::{SessionError, SessionResult};
pub use store::{
    SessionStore, DETECTION_ARTIFACT_PREFIX, PHOTO_ARTIFACT_PREFIX, SESSION_RECORD_PREFIX,
    TEMP_RECORD_PREFIX,
};
