//! Reads an existing body-level thinking config out of a dialect-shaped
//! request body, before normalization and validation. Each provider reads a
//! different set of fields; see spec §4.2 "Extraction per provider".

use serde_json::Value;

use super::config::{Level, ThinkingConfig};
use super::error::ThinkingError;
use super::json_path;

/// Extracts a `ThinkingConfig` from a request body already shaped for
/// `provider`. Returns `Ok(None)` when the body carries no thinking fields
/// at all (not an error — most requests simply don't configure it).
pub fn extract_thinking_config(
    provider: &str,
    body: &Value,
) -> Result<Option<ThinkingConfig>, ThinkingError> {
    match provider {
        "claude" | "claudecode" | "anthropic" => extract_claude(body),
        "openai" | "codex" => extract_openai(body),
        "gemini" | "vertex" | "vertexexpress" | "aistudio" => {
            extract_gemini_at(body, "generationConfig.thinkingConfig")
        }
        "gemini-cli" | "geminicli" | "antigravity" => {
            extract_gemini_at(body, "request.generationConfig.thinkingConfig")
                .or_else(|_| extract_gemini_at(body, "generationConfig.thinkingConfig"))
        }
        "iflow" => extract_iflow(body),
        other => Err(ThinkingError::ProviderMismatch(other.to_string())),
    }
}

fn extract_claude(body: &Value) -> Result<Option<ThinkingConfig>, ThinkingError> {
    let Some(thinking) = json_path::get(body, "thinking") else {
        return Ok(None);
    };
    let ty = thinking.get("type").and_then(Value::as_str).unwrap_or("");
    match ty {
        "disabled" => Ok(Some(ThinkingConfig::none())),
        "enabled" => match thinking.get("budget_tokens").and_then(Value::as_i64) {
            Some(budget) => Ok(Some(ThinkingConfig::budget(budget))),
            None => Ok(Some(ThinkingConfig::auto())),
        },
        _ => Ok(None),
    }
}

fn extract_openai(body: &Value) -> Result<Option<ThinkingConfig>, ThinkingError> {
    let effort = json_path::get(body, "reasoning_effort")
        .and_then(Value::as_str)
        .or_else(|| json_path::get(body, "reasoning.effort").and_then(Value::as_str));
    let Some(effort) = effort else {
        return Ok(None);
    };
    if effort.eq_ignore_ascii_case("none") {
        return Ok(Some(ThinkingConfig::none()));
    }
    match Level::parse(effort) {
        Some(level) => Ok(Some(ThinkingConfig::level(level))),
        None => Err(ThinkingError::UnknownLevel(effort.to_string())),
    }
}

fn extract_gemini_at(body: &Value, path: &str) -> Result<Option<ThinkingConfig>, ThinkingError> {
    let Some(cfg) = json_path::get(body, path) else {
        return Ok(None);
    };
    if let Some(level_str) = cfg.get("thinkingLevel").and_then(Value::as_str) {
        return match Level::parse(level_str) {
            Some(level) => Ok(Some(ThinkingConfig::level(level))),
            None => Err(ThinkingError::UnknownLevel(level_str.to_string())),
        };
    }
    if let Some(budget) = cfg.get("thinkingBudget").and_then(Value::as_i64) {
        return Ok(Some(if budget == -1 {
            ThinkingConfig::auto()
        } else {
            ThinkingConfig::budget(budget)
        }));
    }
    Ok(None)
}

fn extract_iflow(body: &Value) -> Result<Option<ThinkingConfig>, ThinkingError> {
    if let Some(enabled) = json_path::get(body, "chat_template_kwargs.enable_thinking").and_then(Value::as_bool) {
        return Ok(Some(if enabled { ThinkingConfig::auto() } else { ThinkingConfig::none() }));
    }
    if let Some(enabled) = json_path::get(body, "reasoning_split").and_then(Value::as_bool) {
        return Ok(Some(if enabled { ThinkingConfig::auto() } else { ThinkingConfig::none() }));
    }
    // A client may hit the iflow gateway through the OpenAI chat dialect
    // (iflow's dispatch rule is Native there), in which case the only
    // thinking hint on the wire is still OpenAI's own `reasoning_effort` —
    // the native fields above only appear once a prior pass has shaped them.
    extract_openai(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn claude_enabled_without_budget_is_auto() {
        let body = json!({"thinking": {"type": "enabled"}});
        assert_eq!(extract_claude(&body).unwrap(), Some(ThinkingConfig::auto()));
    }

    #[test]
    fn claude_enabled_with_budget() {
        let body = json!({"thinking": {"type": "enabled", "budget_tokens": 4096}});
        assert_eq!(extract_claude(&body).unwrap(), Some(ThinkingConfig::budget(4096)));
    }

    #[test]
    fn claude_disabled_is_none() {
        let body = json!({"thinking": {"type": "disabled"}});
        assert_eq!(extract_claude(&body).unwrap(), Some(ThinkingConfig::none()));
    }

    #[test]
    fn openai_reasoning_effort_none() {
        let body = json!({"reasoning_effort": "none"});
        assert_eq!(extract_openai(&body).unwrap(), Some(ThinkingConfig::none()));
    }

    #[test]
    fn openai_nested_reasoning_effort() {
        let body = json!({"reasoning": {"effort": "high"}});
        assert_eq!(extract_openai(&body).unwrap().unwrap().level, Some(Level::High));
    }

    #[test]
    fn gemini_budget_minus_one_is_auto() {
        let body = json!({"generationConfig": {"thinkingConfig": {"thinkingBudget": -1}}});
        assert_eq!(
            extract_thinking_config("gemini", &body).unwrap(),
            Some(ThinkingConfig::auto())
        );
    }

    #[test]
    fn gemini_cli_reads_under_request_prefix() {
        let body = json!({"request": {"generationConfig": {"thinkingConfig": {"thinkingLevel": "low"}}}});
        let cfg = extract_thinking_config("gemini-cli", &body).unwrap().unwrap();
        assert_eq!(cfg.level, Some(Level::Low));
    }

    #[test]
    fn iflow_glm_enable_thinking() {
        let body = json!({"chat_template_kwargs": {"enable_thinking": true}});
        assert_eq!(extract_iflow(&body).unwrap(), Some(ThinkingConfig::auto()));
    }

    #[test]
    fn no_thinking_fields_returns_none() {
        assert_eq!(extract_thinking_config("gemini", &json!({})).unwrap(), None);
    }
}
