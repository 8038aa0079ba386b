//! Stage invocation parameters.
//!
//! Each stage gets its configured command plus the arguments and
//! environment it needs for the current session.

use crate::supervisor::StageRequest;
use pb_protocol::config_models::KioskConfig;
use pb_protocol::session_models::Session;
use pb_protocol::stage_models::StageKind;
use serde::Serialize;

/// Environment variable carrying [`DetectionArgs`] as JSON.
pub const DETECTION_ARGS_ENV: &str = "DETECTION_ARGS";

/// Session context handed to the detection stage.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct DetectionArgs<'a> {
    pub json_id: &'a str,
    pub cache_path: Option<&'a str>,
    pub prop_list: &'a [String],
}

fn base(config: &KioskConfig, stage: StageKind) -> StageRequest {
    StageRequest::from_command(stage, config.stages.get(stage))
}

pub fn idle(config: &KioskConfig) -> StageRequest {
    base(config, StageKind::Idle)
}

pub fn user_input(config: &KioskConfig) -> StageRequest {
    base(config, StageKind::UserInput)
}

/// `-i <input_source>`, with `DETECTION_ARGS` and a `DISPLAY` fallback.
pub fn detection(config: &KioskConfig, session: &Session) -> StageRequest {
    let args = DetectionArgs {
        json_id: &session.session_id,
        cache_path: Some(session.cache_image_path.as_str()).filter(|p| !p.is_empty()),
        prop_list: &session.users.detected_props,
    };
    let args_json = serde_json::to_string(&args).unwrap_or_else(|_| "{}".to_string());

    let mut request = base(config, StageKind::Detection)
        .arg("-i")
        .arg(&config.detection.input_source)
        .env(DETECTION_ARGS_ENV, args_json);

    if std::env::var_os("DISPLAY").is_none() && !request.env.contains_key("DISPLAY") {
        request = request.env("DISPLAY", &config.detection.display);
    }
    request
}

/// `--countdown <n> [--fullscreen] --json-id <id> [--cache-path <p>]`
pub fn photo(config: &KioskConfig, session: &Session) -> StageRequest {
    let mut request = base(config, StageKind::Photo)
        .arg("--countdown")
        .arg(config.photo.countdown_secs.to_string());
    if config.photo.fullscreen {
        request = request.arg("--fullscreen");
    }
    request = request.arg("--json-id").arg(&session.session_id);
    if !session.cache_image_path.is_empty() {
        request = request.arg("--cache-path").arg(&session.cache_image_path);
    }
    request
}

/// `--image <path>`
pub fn review(config: &KioskConfig, session: &Session) -> StageRequest {
    base(config, StageKind::Review)
        .arg("--image")
        .arg(&session.image_path)
}
