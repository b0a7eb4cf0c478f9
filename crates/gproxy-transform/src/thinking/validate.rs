use tracing::warn;

use super::config::{Capability, Level, Mode, ThinkingConfig, ThinkingSupport};
use super::error::ThinkingError;

/// Coerces and clamps a normalized `ThinkingConfig` against a model's
/// declared capability, per spec §4.2 steps 1-7. Idempotent: running the
/// output back through `validate_config` with the same support returns the
/// same config (asserted in the test below and exercised in the middleware
/// round-trip tests).
pub fn validate_config(
    cfg: ThinkingConfig,
    support: Option<&ThinkingSupport>,
) -> Result<ThinkingConfig, ThinkingError> {
    let Some(support) = support else {
        if cfg.mode == Mode::None {
            return Ok(cfg);
        }
        return Err(ThinkingError::ThinkingNotSupported);
    };

    let mut cfg = coerce_capability(cfg, support)?;
    cfg = collapse_redundant_modes(cfg);

    if cfg.mode == Mode::Level {
        let level = cfg.level.expect("Mode::Level always carries a level");
        if !support.levels.is_empty() && !support.allows_level(level) {
            return Err(ThinkingError::LevelNotSupported(level.as_str().to_string()));
        }
    }

    if cfg.mode == Mode::Auto && !support.dynamic_allowed {
        cfg = collapse_unsupported_auto(support);
    }

    cfg = clamp_budget(cfg, support);

    if cfg.mode == Mode::None
        && !matches!(support.capability(), Capability::BudgetOnly)
        && cfg.budget > 0
        && !support.levels.is_empty()
    {
        if let Some(first) = support.levels.first() {
            cfg.level = Level::parse(first);
        }
    }

    Ok(cfg)
}

fn coerce_capability(
    cfg: ThinkingConfig,
    support: &ThinkingSupport,
) -> Result<ThinkingConfig, ThinkingError> {
    match (support.capability(), cfg.mode) {
        (Capability::BudgetOnly, Mode::Level) => {
            let level = cfg.level.expect("Mode::Level always carries a level");
            Ok(ThinkingConfig {
                mode: Mode::Budget,
                budget: level.to_budget(),
                level: None,
            })
        }
        (Capability::LevelOnly, Mode::Budget) => Ok(ThinkingConfig {
            mode: Mode::Level,
            budget: 0,
            level: Some(Level::from_budget(cfg.budget)),
        }),
        _ => Ok(cfg),
    }
}

fn collapse_redundant_modes(mut cfg: ThinkingConfig) -> ThinkingConfig {
    if cfg.mode == Mode::Level {
        match cfg.level {
            Some(Level::None) => return ThinkingConfig::none(),
            Some(Level::Auto) => return ThinkingConfig::auto(),
            _ => {}
        }
    }
    if cfg.mode == Mode::Budget && cfg.budget == 0 {
        cfg = ThinkingConfig::none();
    }
    cfg
}

fn collapse_unsupported_auto(support: &ThinkingSupport) -> ThinkingConfig {
    if matches!(support.capability(), Capability::LevelOnly) {
        return ThinkingConfig::level(Level::Medium);
    }
    let midpoint = (support.min + support.max) / 2;
    if midpoint <= 0 {
        if support.zero_allowed {
            return ThinkingConfig::none();
        }
        return ThinkingConfig::budget(support.min);
    }
    ThinkingConfig::budget(midpoint)
}

fn clamp_budget(mut cfg: ThinkingConfig, support: &ThinkingSupport) -> ThinkingConfig {
    if cfg.mode != Mode::Budget && cfg.mode != Mode::None {
        return cfg;
    }
    let mut budget = cfg.budget;
    if support.max > 0 && budget > support.max {
        budget = support.max;
    }
    if support.min > 0 && budget < support.min && budget != 0 {
        budget = support.min;
    }
    if budget == 0 && !support.zero_allowed {
        warn!(min = support.min, "thinking budget 0 not allowed, clamping to min");
        budget = support.min;
    }
    cfg.budget = budget;
    if cfg.mode == Mode::None && budget != 0 {
        cfg.mode = Mode::Budget;
    }
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget_only() -> ThinkingSupport {
        ThinkingSupport {
            min: 1024,
            max: 100_000,
            zero_allowed: false,
            dynamic_allowed: true,
            levels: vec![],
        }
    }

    fn level_only() -> ThinkingSupport {
        ThinkingSupport {
            min: 0,
            max: 0,
            zero_allowed: false,
            dynamic_allowed: true,
            levels: vec!["low".into(), "medium".into(), "high".into()],
        }
    }

    #[test]
    fn no_support_rejects_any_non_none_config() {
        assert_eq!(
            validate_config(ThinkingConfig::budget(1024), None),
            Err(ThinkingError::ThinkingNotSupported)
        );
        assert_eq!(validate_config(ThinkingConfig::none(), None), Ok(ThinkingConfig::none()));
    }

    #[test]
    fn level_only_coerces_budget_to_medium() {
        let out = validate_config(ThinkingConfig::budget(5000), Some(&level_only())).unwrap();
        assert_eq!(out.mode, Mode::Level);
        assert_eq!(out.level, Some(Level::Medium));
    }

    #[test]
    fn budget_only_coerces_level_to_high_budget() {
        let out = validate_config(ThinkingConfig::level(Level::High), Some(&budget_only())).unwrap();
        assert_eq!(out.mode, Mode::Budget);
        assert_eq!(out.budget, 24576);
    }

    #[test]
    fn unsupported_level_is_rejected() {
        let out = validate_config(ThinkingConfig::level(Level::Xhigh), Some(&level_only()));
        assert_eq!(out, Err(ThinkingError::LevelNotSupported("xhigh".to_string())));
    }

    #[test]
    fn auto_collapses_when_dynamic_not_allowed_on_level_only() {
        let mut support = level_only();
        support.dynamic_allowed = false;
        let out = validate_config(ThinkingConfig::auto(), Some(&support)).unwrap();
        assert_eq!(out, ThinkingConfig::level(Level::Medium));
    }

    #[test]
    fn auto_collapses_to_midpoint_budget_when_dynamic_not_allowed() {
        let mut support = budget_only();
        support.dynamic_allowed = false;
        let out = validate_config(ThinkingConfig::auto(), Some(&support)).unwrap();
        assert_eq!(out.mode, Mode::Budget);
        assert_eq!(out.budget, (1024 + 100_000) / 2);
    }

    #[test]
    fn zero_budget_disallowed_clamps_to_min() {
        let out = validate_config(ThinkingConfig::budget(0), Some(&budget_only())).unwrap();
        assert_eq!(out.mode, Mode::Budget);
        assert_eq!(out.budget, 1024);
    }

    #[test]
    fn clamp_respects_max() {
        let out = validate_config(ThinkingConfig::budget(999_999), Some(&budget_only())).unwrap();
        assert_eq!(out.budget, 100_000);
    }

    #[test]
    fn validate_is_idempotent() {
        let support = level_only();
        let once = validate_config(ThinkingConfig::budget(5000), Some(&support)).unwrap();
        let twice = validate_config(once, Some(&support)).unwrap();
        assert_eq!(once, twice);

        let support = budget_only();
        let once = validate_config(ThinkingConfig::auto(), Some(&support)).unwrap();
        let twice = validate_config(once, Some(&support)).unwrap();
        assert_eq!(once, twice);
    }
}
