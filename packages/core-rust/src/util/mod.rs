//! Pure functions shared by the service and every adapter: wire-format
//! encoding/parsing that must behave identically regardless of backend.

pub mod cursor;
pub mod if_match;
pub mod json;
pub mod limits;

pub use cursor::{decode_cursor, encode_cursor};
pub use if_match::parse_if_match;
pub use json::canonical_json_len;
pub use limits::clamp_limit;
