//! Session and task identifiers.
//!
//! Both are generated without any shared counter: writers in different
//! processes never coordinate, so uniqueness comes from OS randomness.
//!
//! - Session: `sess_20260210T143005_9f86d081884c7d65` (UTC creation time + 64 random bits).
//!   Lexicographic order follows creation order to the second.
//! - Task: `t9f86d081884c7d65` (64 random bits).

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use regex::Regex;

const SESSION_PREFIX: &str = "sess_";
const TASK_PREFIX: &str = "t";

/// Accepts current ids and the older minute-resolution / 4-hex form.
static RE_SESSION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^sess_\d{8}T\d{4}(\d{2})?_[0-9a-f]{4,16}$").unwrap());

fn random_hex() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn new_session_id(now: DateTime<Utc>) -> String {
    format!(
        "{}{}_{}",
        SESSION_PREFIX,
        now.format("%Y%m%dT%H%M%S"),
        random_hex()
    )
}

pub fn new_task_id() -> String {
    format!("{}{}", TASK_PREFIX, random_hex())
}

/// Also rejects anything that could escape the sessions directory.
pub fn is_valid_session_id(session_id: &str) -> bool {
    RE_SESSION_ID.is_match(session_id)
}
