//! Runtime configuration for the procurement services.

use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::warn;

use procura_purchasing::MatchTolerances;

pub const ENV_QTY_TOLERANCE: &str = "PROCURA_QTY_TOLERANCE_PCT";
pub const ENV_PRICE_TOLERANCE: &str = "PROCURA_PRICE_TOLERANCE_PCT";
pub const ENV_AMOUNT_TOLERANCE: &str = "PROCURA_AMOUNT_TOLERANCE_PCT";
pub const ENV_MISMATCH_THRESHOLD: &str = "PROCURA_MISMATCH_THRESHOLD_PCT";
pub const ENV_MAX_COMMIT_ATTEMPTS: &str = "PROCURA_MAX_COMMIT_ATTEMPTS";

/// Procurement service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcurementConfig {
    /// Three-way match tolerance bands (percent).
    pub tolerances: MatchTolerances,
    /// How many times a unit of work runs before a commit conflict is surfaced.
    pub max_commit_attempts: u32,
}

impl Default for ProcurementConfig {
    fn default() -> Self {
        Self {
            tolerances: MatchTolerances::default(),
            max_commit_attempts: 3,
        }
    }
}

impl ProcurementConfig {
    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`; unset keys keep their defaults and
    /// unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let percent = |key: &str, fallback: Decimal| {
            parse_or(&lookup, key, fallback, |v: &Decimal| *v >= Decimal::ZERO)
        };

        Self {
            tolerances: MatchTolerances {
                quantity_pct: percent(ENV_QTY_TOLERANCE, defaults.tolerances.quantity_pct),
                price_pct: percent(ENV_PRICE_TOLERANCE, defaults.tolerances.price_pct),
                amount_pct: percent(ENV_AMOUNT_TOLERANCE, defaults.tolerances.amount_pct),
                mismatch_threshold_pct: percent(
                    ENV_MISMATCH_THRESHOLD,
                    defaults.tolerances.mismatch_threshold_pct,
                ),
            },
            max_commit_attempts: parse_or(
                &lookup,
                ENV_MAX_COMMIT_ATTEMPTS,
                defaults.max_commit_attempts,
                |v: &u32| *v >= 1,
            ),
        }
    }

    pub fn with_tolerances(mut self, tolerances: MatchTolerances) -> Self {
        self.tolerances = tolerances;
        self
    }

    pub fn with_quantity_tolerance(mut self, pct: Decimal) -> Self {
        self.tolerances.quantity_pct = pct;
        self
    }

    pub fn with_price_tolerance(mut self, pct: Decimal) -> Self {
        self.tolerances.price_pct = pct;
        self
    }

    pub fn with_amount_tolerance(mut self, pct: Decimal) -> Self {
        self.tolerances.amount_pct = pct;
        self
    }

    /// Values below one are clamped to a single attempt.
    pub fn with_max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    fallback: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr + Copy + core::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return fallback;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(key, value = %raw, default = %fallback, "ignoring invalid configuration value");
            fallback
        }
    }
}
