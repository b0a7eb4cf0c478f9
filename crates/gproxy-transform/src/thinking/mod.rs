//! Provider-neutral "reasoning effort" normalization: the thinking engine
//! (spec §4.2). Request bodies are opaque JSON bytes; every function here
//! takes and returns bytes or a `serde_json::Value` rather than a typed
//! dialect struct, so the engine stays decoupled from `gproxy-protocol`.
//!
//! Entry points a provider executor needs: [`apply_thinking`] (the sole
//! mutating entry point) and [`strip_thinking_config`] (used when the
//! selected model cannot support thinking at all).

mod apply;
mod capability;
mod config;
mod error;
mod extract;
pub(crate) mod json_path;
mod suffix;
mod validate;

pub use apply::{apply_thinking, strip_thinking_config, try_apply_thinking};
pub use capability::default_support_for;
pub use config::{Capability, Level, Mode, ThinkingConfig, ThinkingSupport};
pub use error::ThinkingError;
pub use extract::extract_thinking_config;
pub use suffix::{
    SpecialSuffix, parse_level_suffix, parse_numeric_suffix, parse_special_suffix, parse_suffix,
    parse_suffix_lenient,
};
pub use validate::validate_config;
