use serde::{Deserialize, Serialize};

/// Provider-neutral shape of a "reasoning effort" config. `Budget` is always
/// populated so downstream appliers never need to re-derive it from `Level`:
/// `Mode::Auto` implies `budget == -1`, `Mode::None` implies `budget == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    None,
    Auto,
    Budget,
    Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Auto,
    None,
    Minimal,
    Low,
    Medium,
    High,
    Xhigh,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Auto => "auto",
            Level::None => "none",
            Level::Minimal => "minimal",
            Level::Low => "low",
            Level::Medium => "medium",
            Level::High => "high",
            Level::Xhigh => "xhigh",
        }
    }

    /// Case-insensitive parse of a canonical level name. Does not accept
    /// arbitrary whitespace; callers trim first.
    pub fn parse(s: &str) -> Option<Level> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Some(Level::Auto),
            "none" => Some(Level::None),
            "minimal" => Some(Level::Minimal),
            "low" => Some(Level::Low),
            "medium" => Some(Level::Medium),
            "high" => Some(Level::High),
            "xhigh" => Some(Level::Xhigh),
            _ => None,
        }
    }

    /// Canonical level -> budget mapping from spec §3.
    pub fn to_budget(&self) -> i64 {
        match self {
            Level::None => 0,
            Level::Minimal => 512,
            Level::Low => 1024,
            Level::Medium => 8192,
            Level::High => 24576,
            Level::Xhigh => 32768,
            Level::Auto => -1,
        }
    }

    /// Reverse threshold mapping used when coercing a budget onto a
    /// level-only model: `-1->auto`, `0->none`, `1..512->minimal`,
    /// `513..1024->low`, `1025..8192->medium`, `8193..24576->high`,
    /// `>24576->xhigh`.
    pub fn from_budget(budget: i64) -> Level {
        if budget < 0 {
            Level::Auto
        } else if budget == 0 {
            Level::None
        } else if budget <= 512 {
            Level::Minimal
        } else if budget <= 1024 {
            Level::Low
        } else if budget <= 8192 {
            Level::Medium
        } else if budget <= 24576 {
            Level::High
        } else {
            Level::Xhigh
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    pub mode: Mode,
    pub budget: i64,
    pub level: Option<Level>,
}

impl ThinkingConfig {
    pub const fn none() -> Self {
        ThinkingConfig {
            mode: Mode::None,
            budget: 0,
            level: None,
        }
    }

    pub const fn auto() -> Self {
        ThinkingConfig {
            mode: Mode::Auto,
            budget: -1,
            level: None,
        }
    }

    pub const fn budget(budget: i64) -> Self {
        ThinkingConfig {
            mode: Mode::Budget,
            budget,
            level: None,
        }
    }

    pub const fn level(level: Level) -> Self {
        ThinkingConfig {
            mode: Mode::Level,
            budget: 0,
            level: Some(level),
        }
    }

    /// Invariants from spec §3: `Mode::Auto => budget == -1`,
    /// `Mode::None => budget == 0`.
    pub fn is_well_formed(&self) -> bool {
        match self.mode {
            Mode::Auto => self.budget == -1,
            Mode::None => self.budget == 0,
            _ => true,
        }
    }
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        ThinkingConfig::none()
    }
}

/// Per-model thinking capability declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkingSupport {
    pub min: i64,
    pub max: i64,
    pub zero_allowed: bool,
    pub dynamic_allowed: bool,
    pub levels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    BudgetOnly,
    LevelOnly,
    Hybrid,
}

impl ThinkingSupport {
    pub fn capability(&self) -> Capability {
        if self.levels.is_empty() && (self.min > 0 || self.max > 0) {
            Capability::BudgetOnly
        } else if !self.levels.is_empty() && self.min == 0 && self.max == 0 {
            Capability::LevelOnly
        } else {
            Capability::Hybrid
        }
    }

    /// Case-insensitive membership check used by validation step 4.
    pub fn allows_level(&self, level: Level) -> bool {
        self.levels
            .iter()
            .any(|l| l.eq_ignore_ascii_case(level.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_budget_round_trip_for_every_canonical_level() {
        for level in [
            Level::None,
            Level::Minimal,
            Level::Low,
            Level::Medium,
            Level::High,
            Level::Xhigh,
            Level::Auto,
        ] {
            let budget = level.to_budget();
            assert_eq!(Level::from_budget(budget), level, "level {level:?} budget {budget}");
        }
    }

    #[test]
    fn capability_classification() {
        let budget_only = ThinkingSupport {
            min: 1024,
            max: 100_000,
            levels: vec![],
            ..Default::default()
        };
        assert_eq!(budget_only.capability(), Capability::BudgetOnly);

        let level_only = ThinkingSupport {
            min: 0,
            max: 0,
            levels: vec!["low".into(), "medium".into(), "high".into()],
            ..Default::default()
        };
        assert_eq!(level_only.capability(), Capability::LevelOnly);

        let hybrid = ThinkingSupport {
            min: 0,
            max: 32768,
            levels: vec!["low".into()],
            ..Default::default()
        };
        assert_eq!(hybrid.capability(), Capability::Hybrid);
    }
}
