//! Per-model `ThinkingSupport` lookup. Spec §3 defines the capability shape
//! but leaves populating it per model to the deployment; this gives
//! `apply_thinking` callers a sane default table instead of always passing
//! `None` (which would reject every non-`None` config per §4.2 step 1).
//!
//! Grounded on the model families the spec itself uses as worked examples in
//! §8 (a `Levels`-only model coerced from a budget, a `Min`/`Max` budget-only
//! model coerced from a level) rather than an exhaustive upstream catalog.

use super::config::ThinkingSupport;

fn hybrid(min: i64, max: i64, zero_allowed: bool) -> ThinkingSupport {
    ThinkingSupport {
        min,
        max,
        zero_allowed,
        dynamic_allowed: true,
        levels: Vec::new(),
    }
}

fn level_only(levels: &[&str]) -> ThinkingSupport {
    ThinkingSupport {
        min: 0,
        max: 0,
        zero_allowed: true,
        dynamic_allowed: true,
        levels: levels.iter().map(|s| s.to_string()).collect(),
    }
}

/// Returns `None` for models with no reasoning/thinking capability at all,
/// in which case `apply_thinking` leaves a non-`None` request unchanged and
/// logs a warning rather than fabricating a config the model would reject.
pub fn default_support_for(provider: &str, model: &str) -> Option<ThinkingSupport> {
    let m = model.to_ascii_lowercase();
    match provider {
        "claude" | "claudecode" | "anthropic" => claude_support(&m),
        "openai" | "codex" => openai_support(&m),
        "gemini" | "vertex" | "vertexexpress" | "aistudio" | "gemini-cli" | "geminicli"
        | "antigravity" => gemini_support(&m),
        "iflow" => iflow_support(&m),
        _ => None,
    }
}

/// iFlow has no numeric budget or discrete level dial of its own — GLM and
/// MiniMax families only ever turn thinking on or off (§4.2). A wide-open
/// budget range lets `validate_config` pass any requested mode through
/// untouched rather than rejecting it for want of a capability match; the
/// `iflow` applier only reads `cfg.mode`, never `cfg.budget`.
fn iflow_support(model: &str) -> Option<ThinkingSupport> {
    if model.contains("glm") || model.contains("minimax") {
        Some(hybrid(0, 1_000_000, true))
    } else {
        None
    }
}

fn claude_support(model: &str) -> Option<ThinkingSupport> {
    // Claude 3 (non-".5"/"-3-7") models predate extended thinking.
    if model.contains("claude-3-opus") || model.contains("claude-3-sonnet")
        || model.contains("claude-3-haiku")
    {
        return None;
    }
    Some(hybrid(1024, 128_000, true))
}

fn openai_support(model: &str) -> Option<ThinkingSupport> {
    if model.starts_with("gpt-5") || model.starts_with("o1") || model.starts_with("o3")
        || model.starts_with("o4")
    {
        return Some(level_only(&["minimal", "low", "medium", "high"]));
    }
    None
}

const NO_THINKING_GEMINI_MODELS: &[&str] = &[
    "gemini-2.5-flash-image-preview",
    "gemini-2.5-flash-image",
];

fn gemini_support(model: &str) -> Option<ThinkingSupport> {
    if NO_THINKING_GEMINI_MODELS.iter().any(|m| model == *m) {
        return None;
    }
    if model.contains("gemini-3") {
        return Some(level_only(&["low", "medium", "high"]));
    }
    if model.contains("gemini-2.5-pro") {
        return Some(hybrid(128, 32768, false));
    }
    if model.contains("gemini-2.5-flash") {
        return Some(hybrid(0, 24576, true));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::config::Capability;

    #[test]
    fn claude_3_has_no_thinking_support() {
        assert!(claude_support("claude-3-opus-20240229").is_none());
    }

    #[test]
    fn claude_sonnet_4_is_budget_capable() {
        let support = claude_support("claude-sonnet-4-5").unwrap();
        assert_eq!(support.capability(), Capability::BudgetOnly);
    }

    #[test]
    fn gpt5_is_level_only() {
        let support = openai_support("gpt-5").unwrap();
        assert_eq!(support.capability(), Capability::LevelOnly);
    }

    #[test]
    fn gemini_flash_image_preview_has_no_thinking() {
        assert!(gemini_support("gemini-2.5-flash-image-preview").is_none());
    }

    #[test]
    fn gemini_2_5_pro_is_hybrid_budget_only_shape() {
        let support = gemini_support("gemini-2.5-pro").unwrap();
        assert_eq!(support.capability(), Capability::BudgetOnly);
    }
}
