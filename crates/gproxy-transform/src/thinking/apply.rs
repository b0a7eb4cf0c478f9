//! Per-provider thinking appliers, the `apply_thinking` entry point, and
//! `strip_thinking_config`.

use serde_json::{Value, json};
use tracing::warn;

use super::config::{Level, Mode, ThinkingConfig, ThinkingSupport};
use super::error::ThinkingError;
use super::extract::extract_thinking_config;
use super::json_path;
use super::suffix::parse_suffix;
use super::validate::validate_config;

/// The sole entry point: normalizes whatever thinking config the body (or a
/// `model(suffix)` override) carries, validates it against `support`, and
/// writes the provider-shaped fields back in. Never fails — on any error the
/// original body is returned unchanged and a warning is logged, per the
/// spec's "thinking validation errors are swallowed at the applier boundary"
/// policy.
pub fn apply_thinking(
    body: &[u8],
    model: &str,
    provider: &str,
    support: Option<&ThinkingSupport>,
) -> Vec<u8> {
    match try_apply_thinking(body, model, provider, support) {
        Ok(out) => out,
        Err(err) => {
            warn!(provider, model, error = %err, "thinking config not applied, passing body through");
            body.to_vec()
        }
    }
}

/// Fallible variant for callers that want to surface the error (e.g. to
/// return a 400 for a malformed suffix) instead of swallowing it.
pub fn try_apply_thinking(
    body: &[u8],
    model: &str,
    provider: &str,
    support: Option<&ThinkingSupport>,
) -> Result<Vec<u8>, ThinkingError> {
    let mut value: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return Ok(body.to_vec()),
    };

    let (base_model, suffix_override) = parse_suffix(model)?;
    let existing = extract_thinking_config(provider, &value)?;
    let chosen = suffix_override.or(existing).unwrap_or_default();
    let validated = validate_config(chosen, support)?;

    apply_in_place(provider, &base_model, &mut value, validated);

    Ok(serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec()))
}

fn apply_in_place(provider: &str, model: &str, value: &mut Value, cfg: ThinkingConfig) {
    match provider {
        "claude" | "claudecode" | "anthropic" => apply_claude(value, cfg),
        "openai" | "codex" => apply_openai(value, cfg),
        "gemini" | "vertex" | "vertexexpress" | "aistudio" => {
            apply_gemini_at(value, "generationConfig.thinkingConfig", cfg)
        }
        "gemini-cli" | "geminicli" | "antigravity" => {
            apply_gemini_at(value, "request.generationConfig.thinkingConfig", cfg)
        }
        "iflow" => apply_iflow(value, model, cfg),
        _ => {}
    }
}

fn apply_claude(value: &mut Value, cfg: ThinkingConfig) {
    if cfg.mode == Mode::None {
        json_path::set(value, "thinking.type", json!("disabled"));
        json_path::delete(value, "thinking.budget_tokens");
        return;
    }
    json_path::set(value, "thinking.type", json!("enabled"));
    match cfg.mode {
        Mode::Auto => json_path::delete(value, "thinking.budget_tokens"),
        Mode::Budget => json_path::set(value, "thinking.budget_tokens", json!(cfg.budget)),
        Mode::Level => {
            let budget = cfg.level.map(|l| l.to_budget()).unwrap_or(cfg.budget);
            json_path::set(value, "thinking.budget_tokens", json!(budget));
        }
        Mode::None => unreachable!("handled above"),
    }
}

fn apply_openai(value: &mut Value, cfg: ThinkingConfig) {
    let effort = match cfg.mode {
        Mode::None => "none".to_string(),
        Mode::Auto => "auto".to_string(),
        Mode::Level => cfg.level.unwrap_or(Level::Medium).as_str().to_string(),
        Mode::Budget => Level::from_budget(cfg.budget).as_str().to_string(),
    };
    json_path::set(value, "reasoning_effort", json!(effort));
}

fn apply_gemini_at(value: &mut Value, path: &str, cfg: ThinkingConfig) {
    let budget_path = format!("{path}.thinkingBudget");
    let level_path = format!("{path}.thinkingLevel");
    let include_path = format!("{path}.includeThoughts");

    let effective_budget = match cfg.mode {
        Mode::Level => cfg.level.map(|l| l.to_budget()).unwrap_or(0),
        _ => cfg.budget,
    };

    if cfg.mode == Mode::Level {
        json_path::set(value, &level_path, json!(cfg.level.unwrap_or(Level::Medium).as_str()));
        json_path::delete(value, &budget_path);
    } else {
        let budget = match cfg.mode {
            Mode::Auto => -1,
            Mode::None => 0,
            Mode::Budget => cfg.budget,
            Mode::Level => unreachable!("handled above"),
        };
        json_path::set(value, &budget_path, json!(budget));
        json_path::delete(value, &level_path);
    }

    let include_thoughts = cfg.mode != Mode::None && effective_budget != 0;
    json_path::set(value, &include_path, json!(include_thoughts));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IflowFamily {
    Glm,
    MiniMax,
    Other,
}

fn classify_iflow_model(model: &str) -> IflowFamily {
    let lower = model.to_ascii_lowercase();
    if lower.contains("glm") {
        IflowFamily::Glm
    } else if lower.contains("minimax") {
        IflowFamily::MiniMax
    } else {
        IflowFamily::Other
    }
}

fn apply_iflow(value: &mut Value, model: &str, cfg: ThinkingConfig) {
    let enabled = cfg.mode != Mode::None;
    match classify_iflow_model(model) {
        IflowFamily::Glm => {
            json_path::set(value, "chat_template_kwargs.enable_thinking", json!(enabled));
            json_path::set(value, "chat_template_kwargs.clear_thinking", json!(false));
            json_path::delete(value, "reasoning_effort");
        }
        IflowFamily::MiniMax => {
            json_path::set(value, "reasoning_split", json!(enabled));
            json_path::delete(value, "reasoning_effort");
        }
        IflowFamily::Other => {}
    }
}

/// Removes the provider-specific thinking fields without touching sibling
/// fields. Idempotent: deleting an already-absent path is a no-op.
pub fn strip_thinking_config(body: &[u8], provider: &str) -> Vec<u8> {
    let Ok(mut value) = serde_json::from_slice::<Value>(body) else {
        return body.to_vec();
    };
    strip_in_place(provider, &mut value);
    serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec())
}

fn strip_in_place(provider: &str, value: &mut Value) {
    match provider {
        "claude" | "claudecode" | "anthropic" => {
            json_path::delete(value, "thinking");
        }
        "openai" | "codex" => {
            json_path::delete(value, "reasoning_effort");
            json_path::delete(value, "reasoning.effort");
        }
        "gemini" | "vertex" | "vertexexpress" | "aistudio" => {
            json_path::delete(value, "generationConfig.thinkingConfig");
        }
        "gemini-cli" | "geminicli" | "antigravity" => {
            json_path::delete(value, "request.generationConfig.thinkingConfig");
            json_path::delete(value, "generationConfig.thinkingConfig");
        }
        "iflow" => {
            json_path::delete(value, "chat_template_kwargs.enable_thinking");
            json_path::delete(value, "chat_template_kwargs.clear_thinking");
            json_path::delete(value, "reasoning_split");
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Wide-open budget-capable support: doesn't constrain clamping, so
    /// tests can focus on the applier shape rather than capability
    /// coercion (covered separately in `validate::tests`).
    fn permissive_budget() -> ThinkingSupport {
        ThinkingSupport {
            min: 0,
            max: 1_000_000,
            zero_allowed: true,
            dynamic_allowed: true,
            levels: vec![],
        }
    }

    /// Hybrid support (non-empty levels plus a budget range) so a `Level`
    /// mode config is preserved rather than coerced to `Budget`.
    fn permissive_hybrid(levels: &[&str]) -> ThinkingSupport {
        ThinkingSupport {
            min: 1,
            max: 1_000_000,
            zero_allowed: true,
            dynamic_allowed: true,
            levels: levels.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn suffix_overrides_body_level_config_gemini() {
        let body = json!({"generationConfig": {"thinkingConfig": {"thinkingBudget": 1000}}});
        let support = permissive_budget();
        let out = apply_thinking(
            &serde_json::to_vec(&body).unwrap(),
            "gemini-2.5-pro(8192)",
            "gemini",
            Some(&support),
        );
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["generationConfig"]["thinkingConfig"]["thinkingBudget"], 8192);
        assert_eq!(out["generationConfig"]["thinkingConfig"]["includeThoughts"], true);
    }

    #[test]
    fn suffix_none_disables_and_clears_include_thoughts() {
        let body = json!({"generationConfig": {"thinkingConfig": {"thinkingBudget": 1000}}});
        let support = permissive_budget();
        let out = apply_thinking(
            &serde_json::to_vec(&body).unwrap(),
            "gemini-2.5-pro(none)",
            "gemini",
            Some(&support),
        );
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["generationConfig"]["thinkingConfig"]["thinkingBudget"], 0);
        assert_eq!(out["generationConfig"]["thinkingConfig"]["includeThoughts"], false);
    }

    #[test]
    fn writing_budget_removes_conflicting_level_field() {
        let body = json!({"generationConfig": {"thinkingConfig": {"thinkingLevel": "high"}}});
        let support = permissive_hybrid(&["low", "medium", "high"]);
        let out = apply_thinking(
            &serde_json::to_vec(&body).unwrap(),
            "gemini-2.5-pro(1024)",
            "gemini",
            Some(&support),
        );
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert!(out["generationConfig"]["thinkingConfig"].get("thinkingLevel").is_none());
        assert_eq!(out["generationConfig"]["thinkingConfig"]["thinkingBudget"], 1024);
    }

    #[test]
    fn claude_applier_round_trip() {
        let body = json!({});
        let support = permissive_budget();
        let out = apply_thinking(
            &serde_json::to_vec(&body).unwrap(),
            "claude-3(4096)",
            "claude",
            Some(&support),
        );
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["thinking"]["type"], "enabled");
        assert_eq!(out["thinking"]["budget_tokens"], 4096);
    }

    #[test]
    fn openai_applier_writes_effort() {
        let body = json!({});
        let support = permissive_hybrid(&["low", "medium", "high"]);
        let out = apply_thinking(&serde_json::to_vec(&body).unwrap(), "o3(high)", "openai", Some(&support));
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["reasoning_effort"], "high");
    }

    #[test]
    fn iflow_glm_writes_chat_template_kwargs() {
        let body = json!({});
        let support = permissive_budget();
        let out = apply_thinking(
            &serde_json::to_vec(&body).unwrap(),
            "glm-4.6(auto)",
            "iflow",
            Some(&support),
        );
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["chat_template_kwargs"]["enable_thinking"], true);
        assert_eq!(out["chat_template_kwargs"]["clear_thinking"], false);
    }

    #[test]
    fn iflow_minimax_writes_reasoning_split() {
        let body = json!({});
        let support = permissive_budget();
        let out = apply_thinking(
            &serde_json::to_vec(&body).unwrap(),
            "minimax-text(none)",
            "iflow",
            Some(&support),
        );
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["reasoning_split"], false);
    }

    #[test]
    fn strip_is_idempotent_and_preserves_siblings() {
        let body = json!({"thinking": {"type": "enabled", "budget_tokens": 1024}, "messages": [1, 2]});
        let once = strip_thinking_config(&serde_json::to_vec(&body).unwrap(), "claude");
        let twice = strip_thinking_config(&once, "claude");
        let twice: Value = serde_json::from_slice(&twice).unwrap();
        assert!(twice.get("thinking").is_none());
        assert_eq!(twice["messages"], json!([1, 2]));
        assert_eq!(once, serde_json::to_vec(&twice).unwrap());
    }

    #[test]
    fn invalid_suffix_falls_back_to_original_body_unchanged() {
        let body = json!({"reasoning_effort": "high"});
        let bytes = serde_json::to_vec(&body).unwrap();
        let support = permissive_hybrid(&["high"]);
        let out = apply_thinking(&bytes, "o3(bogus", "openai", Some(&support));
        assert_eq!(out, bytes);
    }

    #[test]
    fn no_support_rejects_explicit_override_but_applies_default_none() {
        let body = json!({});
        let bytes = serde_json::to_vec(&body).unwrap();
        // A model with no declared thinking support: an explicit override
        // is rejected (swallowed) and the body is returned unchanged.
        let out = apply_thinking(&bytes, "legacy-model(8192)", "claude", None);
        assert_eq!(out, bytes);
        // No override and nothing in the body: the default `None` config
        // validates even with no support info, and the applier still
        // writes the explicit disabled state.
        let out = apply_thinking(&bytes, "legacy-model", "claude", None);
        let out: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["thinking"]["type"], "disabled");
    }

    #[test]
    fn apply_is_idempotent_on_fields_it_controls() {
        let body = json!({});
        let support = permissive_budget();
        let once = apply_thinking(
            &serde_json::to_vec(&body).unwrap(),
            "gemini-2.5-pro(8192)",
            "gemini",
            Some(&support),
        );
        let twice = apply_thinking(&once, "gemini-2.5-pro(8192)", "gemini", Some(&support));
        assert_eq!(once, twice);
    }
}
