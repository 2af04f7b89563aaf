//! Small helpers shared by the client, storage and the headless harness.
//!
//! - **Text**: control-character stripping for provider text, width-aware truncation
//! - **Base URL**: HTTPS enforcement for the content provider endpoint

mod base_url;
mod text;

pub use base_url::{validate_base_url, BaseUrlError};
pub use text::{strip_control_chars, truncate_to_width};
