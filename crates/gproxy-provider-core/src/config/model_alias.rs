use serde::{Deserialize, Serialize};

use gproxy_transform::thinking::{Mode, parse_suffix_lenient};

/// A single `(channel, alias) -> upstream_model` mapping (Conductor step 3,
/// spec §4.7). `channel` is implicit: a table lives on one `ProviderConfig`
/// variant, so the provider already selected in dispatch step 1 is the
/// channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelAlias {
    /// Model name as the client sends it, suffix stripped.
    pub alias: String,
    /// Upstream model used when the resolved request wants thinking.
    pub to_thinking: String,
    /// Upstream model used when thinking is not requested.
    pub to_non_thinking: String,
    /// When set, the stream/response rewriter strips thinking content from
    /// the response regardless of what the upstream model itself emits.
    #[serde(default)]
    pub strip_thinking_response: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelAliasTable {
    pub aliases: Vec<ModelAlias>,
}

impl ModelAliasTable {
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    fn find(&self, alias: &str) -> Option<&ModelAlias> {
        self.aliases
            .iter()
            .find(|a| a.alias.eq_ignore_ascii_case(alias))
    }
}

/// Outcome of resolving a client-requested model name against a
/// [`ModelAliasTable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModelAlias {
    /// Model name to send upstream, suffix re-attached.
    pub upstream_model: String,
    /// The alias the client asked for; response `model` fields get
    /// rewritten back to this so the client never sees the upstream name.
    pub original_alias: String,
    pub strip_thinking_response: bool,
}

fn split_suffix(name: &str) -> (&str, &str) {
    match name.rfind('(') {
        Some(idx) if name.ends_with(')') => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

/// Conductor step 3 (spec §4.7): resolves `requested_model` (as sent by the
/// client, possibly carrying a thinking suffix like `"alias(1024)"`) against
/// `table`. Returns `None` when nothing matches, meaning the caller should
/// send `requested_model` upstream unchanged.
///
/// A suffix on the requested name is preserved verbatim onto the resolved
/// upstream model (`alias(1024)` -> `upstream(1024)`) unless the mapping
/// target already specifies its own suffix. Whether thinking was requested
/// is read from that same suffix — picking `to_thinking` when it decodes to
/// anything other than `Mode::None`, `to_non_thinking` otherwise — since the
/// suffix is the one signal available this early, before the per-dialect
/// body is built.
pub fn resolve_model_alias(
    table: &ModelAliasTable,
    requested_model: &str,
) -> Option<ResolvedModelAlias> {
    let (base, suffix) = split_suffix(requested_model);
    let record = table.find(base)?;

    let (_, cfg) = parse_suffix_lenient(requested_model);
    let wants_thinking = matches!(&cfg, Some(c) if c.mode != Mode::None);
    let target = if wants_thinking {
        &record.to_thinking
    } else {
        &record.to_non_thinking
    };

    let upstream_model = if suffix.is_empty() || target.contains('(') {
        target.clone()
    } else {
        format!("{target}{suffix}")
    };

    Some(ResolvedModelAlias {
        upstream_model,
        original_alias: requested_model.to_string(),
        strip_thinking_response: record.strip_thinking_response,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ModelAliasTable {
        ModelAliasTable {
            aliases: vec![
                ModelAlias {
                    alias: "my-model".to_string(),
                    to_thinking: "gpt-5-high".to_string(),
                    to_non_thinking: "gpt-5".to_string(),
                    strip_thinking_response: false,
                },
                ModelAlias {
                    alias: "quiet-model".to_string(),
                    to_thinking: "claude-opus".to_string(),
                    to_non_thinking: "claude-opus".to_string(),
                    strip_thinking_response: true,
                },
            ],
        }
    }

    #[test]
    fn unmatched_alias_returns_none() {
        assert!(resolve_model_alias(&table(), "unknown-model").is_none());
    }

    #[test]
    fn plain_alias_resolves_to_non_thinking_destination() {
        let resolved = resolve_model_alias(&table(), "my-model").unwrap();
        assert_eq!(resolved.upstream_model, "gpt-5");
        assert_eq!(resolved.original_alias, "my-model");
        assert!(!resolved.strip_thinking_response);
    }

    #[test]
    fn suffix_selects_thinking_destination_and_is_preserved() {
        let resolved = resolve_model_alias(&table(), "my-model(8192)").unwrap();
        assert_eq!(resolved.upstream_model, "gpt-5-high(8192)");
        assert_eq!(resolved.original_alias, "my-model(8192)");
    }

    #[test]
    fn none_suffix_selects_non_thinking_destination() {
        let resolved = resolve_model_alias(&table(), "my-model(none)").unwrap();
        assert_eq!(resolved.upstream_model, "gpt-5(none)");
    }

    #[test]
    fn mapping_target_with_its_own_suffix_is_not_double_suffixed() {
        let mut t = table();
        t.aliases[0].to_thinking = "gpt-5(high)".to_string();
        let resolved = resolve_model_alias(&t, "my-model(8192)").unwrap();
        assert_eq!(resolved.upstream_model, "gpt-5(high)");
    }

    #[test]
    fn strip_thinking_response_flag_is_carried_through_regardless_of_destination() {
        let resolved = resolve_model_alias(&table(), "quiet-model(high)").unwrap();
        assert_eq!(resolved.upstream_model, "claude-opus(high)");
        assert!(resolved.strip_thinking_response);
    }
}
