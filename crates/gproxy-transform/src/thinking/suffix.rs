//! Trailing `(...)` model-name suffix grammar: `"name(8192)"`, `"name(high)"`,
//! `"name(auto)"`/`"name(-1)"`, `"name(none)"`/`"name(0)"`.

use super::config::{Level, Mode, ThinkingConfig};
use super::error::ThinkingError;

/// Parses a bare integer budget suffix, e.g. `"8192"`, `"-1"`, `"0"`.
pub fn parse_numeric_suffix(inner: &str) -> Option<i64> {
    inner.parse::<i64>().ok()
}

/// Parses a canonical level name suffix, e.g. `"high"`. Does not accept
/// `"auto"` or `"none"` — those are special suffixes, handled separately so
/// the two keywords map onto `Mode` directly rather than `Mode::Level`.
pub fn parse_level_suffix(inner: &str) -> Option<Level> {
    match Level::parse(inner) {
        Some(Level::Auto) | Some(Level::None) => None,
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialSuffix {
    Auto,
    None,
}

/// Parses the `"auto"` / `"none"` keyword suffixes.
pub fn parse_special_suffix(inner: &str) -> Option<SpecialSuffix> {
    match inner.to_ascii_lowercase().as_str() {
        "auto" => Some(SpecialSuffix::Auto),
        "none" => Some(SpecialSuffix::None),
        _ => None,
    }
}

/// Splits `"name(inner)"` into `(name, inner)` when the string ends with a
/// balanced trailing parenthesized group. Returns `None` when there is no
/// `(` at all (no suffix attempted).
fn split_trailing_paren(name: &str) -> Option<(&str, &str)> {
    name.rfind('(').map(|open| (&name[..open], &name[open..]))
}

/// Parses a model-name suffix strictly: an unmatched `(` or trailing text
/// after the closing `)` is a malformed suffix attempt and returns
/// `Err(InvalidSuffix)` rather than silently treating the whole string as a
/// plain model name. Returns `(base_model_name, override_config)`; the
/// override is `None` when the name carries no suffix at all.
pub fn parse_suffix(name: &str) -> Result<(String, Option<ThinkingConfig>), ThinkingError> {
    let Some((base, paren)) = split_trailing_paren(name) else {
        return Ok((name.to_string(), None));
    };
    if !paren.ends_with(')') {
        return Err(ThinkingError::InvalidSuffix);
    }
    let inner = &paren[1..paren.len() - 1];
    if inner.contains('(') || inner.contains(')') {
        return Err(ThinkingError::InvalidSuffix);
    }

    if let Some(special) = parse_special_suffix(inner) {
        let cfg = match special {
            SpecialSuffix::Auto => ThinkingConfig::auto(),
            SpecialSuffix::None => ThinkingConfig::none(),
        };
        return Ok((base.to_string(), Some(cfg)));
    }

    if let Some(budget) = parse_numeric_suffix(inner) {
        let cfg = if budget == -1 {
            ThinkingConfig::auto()
        } else if budget == 0 {
            ThinkingConfig::none()
        } else {
            ThinkingConfig::budget(budget)
        };
        return Ok((base.to_string(), Some(cfg)));
    }

    if let Some(level) = parse_level_suffix(inner) {
        return Ok((base.to_string(), Some(ThinkingConfig::level(level))));
    }

    Err(ThinkingError::InvalidSuffix)
}

/// Non-strict convenience wrapper: malformed suffixes fall back to "no
/// suffix" rather than surfacing an error, for call sites (alias resolution)
/// that only care about overrides when present and well-formed.
pub fn parse_suffix_lenient(name: &str) -> (String, Option<ThinkingConfig>) {
    parse_suffix(name).unwrap_or_else(|_| (name.to_string(), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_budget_suffix() {
        let (base, cfg) = parse_suffix("gemini-2.5-pro(8192)").unwrap();
        assert_eq!(base, "gemini-2.5-pro");
        assert_eq!(cfg.unwrap(), ThinkingConfig::budget(8192));
    }

    #[test]
    fn level_suffix() {
        let (base, cfg) = parse_suffix("o3(high)").unwrap();
        assert_eq!(base, "o3");
        assert_eq!(cfg.unwrap().level, Some(Level::High));
        assert_eq!(cfg.unwrap().mode, Mode::Level);
    }

    #[test]
    fn auto_and_none_keyword_and_numeric_equivalents() {
        assert_eq!(parse_suffix("m(auto)").unwrap().1.unwrap(), ThinkingConfig::auto());
        assert_eq!(parse_suffix("m(-1)").unwrap().1.unwrap(), ThinkingConfig::auto());
        assert_eq!(parse_suffix("m(none)").unwrap().1.unwrap(), ThinkingConfig::none());
        assert_eq!(parse_suffix("m(0)").unwrap().1.unwrap(), ThinkingConfig::none());
    }

    #[test]
    fn plain_name_has_no_suffix() {
        let (base, cfg) = parse_suffix("gemini-2.5-pro").unwrap();
        assert_eq!(base, "gemini-2.5-pro");
        assert!(cfg.is_none());
    }

    #[test]
    fn unmatched_open_paren_is_invalid_suffix() {
        assert_eq!(parse_suffix("m(abc"), Err(ThinkingError::InvalidSuffix));
    }

    #[test]
    fn unknown_suffix_word_is_invalid() {
        assert_eq!(parse_suffix("m(bogus)"), Err(ThinkingError::InvalidSuffix));
    }

    #[test]
    fn lenient_wrapper_falls_back_on_malformed_suffix() {
        let (base, cfg) = parse_suffix_lenient("m(abc");
        assert_eq!(base, "m(abc");
        assert!(cfg.is_none());
    }
}
