use thiserror::Error;

/// Thinking-configuration errors. All of these are swallowed at the applier
/// boundary (`apply_thinking` returns the original body unchanged on error)
/// per the spec's failure policy — many dialects treat an absent thinking
/// config as "use the default", so a validation failure should not break the
/// request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ThinkingError {
    #[error("invalid thinking suffix")]
    InvalidSuffix,
    #[error("unknown thinking level: {0}")]
    UnknownLevel(String),
    #[error("thinking level '{0}' is not supported by this model")]
    LevelNotSupported(String),
    #[error("model does not support thinking configuration")]
    ThinkingNotSupported,
    #[error("provider mismatch: {0}")]
    ProviderMismatch(String),
}
