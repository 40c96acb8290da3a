//! Composable option filters.
//!
//! Filter configurations arrive as loosely typed `{type, params}` objects
//! ([`RawFilterConfig`]) and are parsed once into the closed [`FilterConfig`]
//! enum. A [`FilterChain`] is the strict conjunction of its filters, evaluated
//! in caller order with short-circuiting.
//!
//! Most filters judge single contracts. `pop` and `spread_width` judge the
//! spread candidates built from the survivors and are skipped by
//! [`FilterChain::run`]; [`FilterChain::filter_spreads`] applies them.

use crate::contract::{OptionContract, OptionType};
use crate::scanner::SpreadCandidate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use utoipa::ToSchema;

#[cfg(test)]
mod tests;

/// Filter configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// The filter kind is not one of the supported kinds.
    #[error("unknown filter kind: {0}")]
    UnknownKind(String),

    /// The parameters do not match the shape expected for the kind.
    #[error("malformed parameters for {kind} filter: {reason}")]
    MalformedParams {
        /// Filter kind.
        kind: String,
        /// Decoder message.
        reason: String,
    },

    /// The parameters decode but describe an impossible range.
    #[error("invalid range for {kind} filter: {reason}")]
    InvalidRange {
        /// Filter kind.
        kind: &'static str,
        /// What is wrong with the range.
        reason: String,
    },
}

/// Untyped filter configuration as supplied by API callers and config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RawFilterConfig {
    /// Filter kind, e.g. `delta`, `dte`, `bid_ask_spread`.
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    /// Kind-specific parameters. Missing parameters take non-restrictive defaults.
    #[serde(default, alias = "parameters")]
    #[schema(value_type = Object)]
    pub params: Value,
}

impl RawFilterConfig {
    /// Creates a raw configuration from a kind and a JSON parameter object.
    #[must_use]
    pub fn new(kind: &str, params: Value) -> Self {
        Self {
            kind: kind.to_string(),
            params,
        }
    }
}

/// Delta range. Bounds are compared against `|delta|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeltaRange {
    /// Lower bound (-1.0 to 1.0).
    #[serde(default = "default_min_delta")]
    pub min: f64,
    /// Upper bound (-1.0 to 1.0).
    #[serde(default = "default_max_delta")]
    pub max: f64,
}

/// Days-to-expiration range, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DteRange {
    /// Minimum days.
    #[serde(default)]
    pub min: u32,
    /// Maximum days.
    #[serde(default = "default_max_dte")]
    pub max: u32,
}

/// Minimum count threshold used by the volume and open interest filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinCount {
    /// Minimum accepted value.
    #[serde(default)]
    pub min: u64,
}

/// Implied volatility percentile range, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IvPercentileRange {
    /// Minimum percentile (0 to 100).
    #[serde(default)]
    pub min: f64,
    /// Maximum percentile (0 to 100).
    #[serde(default = "default_max_iv_percentile")]
    pub max: f64,
}

/// Maximum bid-ask spread as a fraction of mid. `None` accepts everything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaxSpread {
    /// Maximum accepted `bid_ask_spread_pct`.
    #[serde(default)]
    pub max: Option<f64>,
}

/// Restricts the chain to calls or puts. Empty accepts both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptionTypes {
    /// Accepted option types.
    #[serde(default)]
    pub types: Vec<OptionType>,
}

/// Minimum liquidity score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinLiquidity {
    /// Minimum accepted `liquidity`.
    #[serde(default)]
    pub min: f64,
}

/// Optional inclusive bounds on a raw contract or spread value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValueRange {
    /// Lower bound. Absent means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound. Absent means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ValueRange {
    fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }
}

/// Probability-of-profit range, inclusive, within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbabilityRange {
    /// Minimum probability.
    #[serde(default)]
    pub min: f64,
    /// Maximum probability.
    #[serde(default = "default_max_probability")]
    pub max: f64,
}

fn default_max_probability() -> f64 {
    1.0
}

fn default_min_delta() -> f64 {
    -1.0
}

fn default_max_delta() -> f64 {
    1.0
}

fn default_max_dte() -> u32 {
    365
}

fn default_max_iv_percentile() -> f64 {
    100.0
}

/// A validated filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum FilterConfig {
    /// `|delta|` within the absolute image of `[min, max]`.
    Delta(DeltaRange),
    /// `min <= dte <= max`.
    Dte(DteRange),
    /// `volume >= min`.
    Volume(MinCount),
    /// `open_interest >= min`.
    OpenInterest(MinCount),
    /// `min <= iv_percentile <= max`.
    IvPercentile(IvPercentileRange),
    /// `bid_ask_spread_pct <= max`.
    BidAskSpread(MaxSpread),
    /// Option type is one of `types`.
    OptionType(OptionTypes),
    /// `liquidity >= min`.
    Liquidity(MinLiquidity),
    /// `theta` within the optional bounds.
    Theta(ValueRange),
    /// `vega` within the optional bounds.
    Vega(ValueRange),
    /// Implied volatility within the optional bounds.
    Iv(ValueRange),
    /// Spread `probability_of_profit` within `[min, max]`.
    Pop(ProbabilityRange),
    /// Spread strike width within the optional bounds.
    SpreadWidth(ValueRange),
}

impl FilterConfig {
    /// Parses and validates an untyped configuration.
    ///
    /// # Errors
    /// Returns [`FilterError::UnknownKind`] for unsupported kinds,
    /// [`FilterError::MalformedParams`] when parameters have the wrong shape
    /// and [`FilterError::InvalidRange`] when they describe an empty range.
    pub fn parse(raw: &RawFilterConfig) -> Result<Self, FilterError> {
        let params = match &raw.params {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };
        let kind = raw.kind.trim().to_ascii_lowercase();

        let config = match kind.as_str() {
            "delta" => Self::Delta(decode(&kind, params)?),
            "dte" => Self::Dte(decode(&kind, params)?),
            "volume" => Self::Volume(decode(&kind, params)?),
            "open_interest" => Self::OpenInterest(decode(&kind, params)?),
            "iv_percentile" => Self::IvPercentile(decode(&kind, params)?),
            "bid_ask_spread" => Self::BidAskSpread(decode(&kind, params)?),
            "option_type" => Self::OptionType(decode(&kind, params)?),
            "liquidity" => Self::Liquidity(decode(&kind, params)?),
            "theta" => Self::Theta(decode(&kind, params)?),
            "vega" => Self::Vega(decode(&kind, params)?),
            "iv" => Self::Iv(decode(&kind, params)?),
            "pop" => Self::Pop(decode(&kind, params)?),
            "spread_width" => Self::SpreadWidth(decode(&kind, params)?),
            _ => return Err(FilterError::UnknownKind(raw.kind.clone())),
        };

        config.validate()?;
        Ok(config.normalized())
    }

    /// Rewrites equivalent parameter sets into one form.
    ///
    /// Option types are sorted and deduplicated; listing both types is the
    /// same as listing none.
    #[must_use]
    pub fn normalized(self) -> Self {
        match self {
            Self::OptionType(OptionTypes { mut types }) => {
                types.sort();
                types.dedup();
                if types.contains(&OptionType::Call) && types.contains(&OptionType::Put) {
                    types.clear();
                }
                Self::OptionType(OptionTypes { types })
            }
            other => other,
        }
    }

    /// Whether the filter judges spread candidates rather than contracts.
    #[must_use]
    pub fn is_spread_level(&self) -> bool {
        matches!(self, Self::Pop(_) | Self::SpreadWidth(_))
    }

    /// Stable kind name, used for metrics labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delta(_) => "delta",
            Self::Dte(_) => "dte",
            Self::Volume(_) => "volume",
            Self::OpenInterest(_) => "open_interest",
            Self::IvPercentile(_) => "iv_percentile",
            Self::BidAskSpread(_) => "bid_ask_spread",
            Self::OptionType(_) => "option_type",
            Self::Liquidity(_) => "liquidity",
            Self::Theta(_) => "theta",
            Self::Vega(_) => "vega",
            Self::Iv(_) => "iv",
            Self::Pop(_) => "pop",
            Self::SpreadWidth(_) => "spread_width",
        }
    }

    /// Checks that the parameters describe a satisfiable range.
    ///
    /// # Errors
    /// Returns [`FilterError::InvalidRange`] on non-finite or inverted bounds.
    pub fn validate(&self) -> Result<(), FilterError> {
        let kind = self.kind();
        let invalid = |reason: String| Err(FilterError::InvalidRange { kind, reason });

        match self {
            Self::Delta(r) => {
                if !r.min.is_finite() || !r.max.is_finite() {
                    return invalid("bounds must be finite".to_string());
                }
                if r.min < -1.0 || r.max > 1.0 {
                    return invalid(format!("bounds [{}, {}] outside [-1, 1]", r.min, r.max));
                }
                if r.min > r.max {
                    return invalid(format!("min {} greater than max {}", r.min, r.max));
                }
            }
            Self::Dte(r) => {
                if r.min > r.max {
                    return invalid(format!("min {} greater than max {}", r.min, r.max));
                }
            }
            Self::IvPercentile(r) => {
                if !(0.0..=100.0).contains(&r.min) || !(0.0..=100.0).contains(&r.max) {
                    return invalid(format!("bounds [{}, {}] outside [0, 100]", r.min, r.max));
                }
                if r.min > r.max {
                    return invalid(format!("min {} greater than max {}", r.min, r.max));
                }
            }
            Self::BidAskSpread(s) => {
                if let Some(max) = s.max
                    && (!max.is_finite() || max < 0.0)
                {
                    return invalid(format!("max {} must be a non-negative number", max));
                }
            }
            Self::Liquidity(l) => {
                if !l.min.is_finite() || l.min < 0.0 {
                    return invalid(format!("min {} must be a non-negative number", l.min));
                }
            }
            Self::Theta(r) | Self::Vega(r) | Self::Iv(r) | Self::SpreadWidth(r) => {
                if r.min.is_some_and(|v| !v.is_finite()) || r.max.is_some_and(|v| !v.is_finite())
                {
                    return invalid("bounds must be finite".to_string());
                }
                if let (Some(min), Some(max)) = (r.min, r.max)
                    && min > max
                {
                    return invalid(format!("min {} greater than max {}", min, max));
                }
                if matches!(self, Self::Iv(_) | Self::SpreadWidth(_))
                    && r.min.is_some_and(|v| v < 0.0)
                {
                    return invalid("min must be non-negative".to_string());
                }
            }
            Self::Pop(r) => {
                if !(0.0..=1.0).contains(&r.min) || !(0.0..=1.0).contains(&r.max) {
                    return invalid(format!("bounds [{}, {}] outside [0, 1]", r.min, r.max));
                }
                if r.min > r.max {
                    return invalid(format!("min {} greater than max {}", r.min, r.max));
                }
            }
            Self::Volume(_) | Self::OpenInterest(_) | Self::OptionType(_) => {}
        }

        Ok(())
    }

    /// Evaluates the filter against one contract. Spread-level filters
    /// accept every contract.
    #[must_use]
    pub fn accepts(&self, contract: &OptionContract) -> bool {
        match self {
            Self::Delta(r) => {
                let (lo, hi) = absolute_bounds(r.min, r.max);
                let delta = contract.delta.abs();
                delta >= lo && delta <= hi
            }
            Self::Dte(r) => contract.dte >= r.min && contract.dte <= r.max,
            Self::Volume(m) => contract.volume >= m.min,
            Self::OpenInterest(m) => contract.open_interest >= m.min,
            Self::IvPercentile(r) => {
                contract.iv_percentile >= r.min && contract.iv_percentile <= r.max
            }
            Self::BidAskSpread(s) => s.max.is_none_or(|max| contract.bid_ask_spread_pct <= max),
            Self::OptionType(t) => t.types.is_empty() || t.types.contains(&contract.option_type),
            Self::Liquidity(l) => contract.liquidity >= l.min,
            Self::Theta(r) => r.contains(contract.theta),
            Self::Vega(r) => r.contains(contract.vega),
            Self::Iv(r) => r.contains(contract.iv),
            Self::Pop(_) | Self::SpreadWidth(_) => true,
        }
    }

    /// Evaluates the filter against one spread candidate. Contract-level
    /// filters accept every spread.
    #[must_use]
    pub fn accepts_spread(&self, spread: &SpreadCandidate) -> bool {
        match self {
            Self::Pop(r) => {
                spread.probability_of_profit >= r.min && spread.probability_of_profit <= r.max
            }
            Self::SpreadWidth(r) => r.contains(spread.width),
            _ => true,
        }
    }
}

/// Image of `[min, max]` under `abs`.
fn absolute_bounds(min: f64, max: f64) -> (f64, f64) {
    let (a, b) = (min.abs(), max.abs());
    if min <= 0.0 && max >= 0.0 {
        (0.0, a.max(b))
    } else {
        (a.min(b), a.max(b))
    }
}

fn decode<T: DeserializeOwned>(kind: &str, params: Value) -> Result<T, FilterError> {
    serde_json::from_value(params).map_err(|e| FilterError::MalformedParams {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// Per-filter pass counts from one chain evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStat {
    /// Filter kind.
    pub kind: &'static str,
    /// Position of the filter in the chain.
    pub position: usize,
    /// Contracts that reached this filter.
    pub evaluated: usize,
    /// Contracts that passed it.
    pub passed: usize,
}

impl FilterStat {
    /// Fraction of evaluated contracts rejected by this filter.
    #[must_use]
    pub fn reduction(&self) -> f64 {
        if self.evaluated == 0 {
            0.0
        } else {
            1.0 - self.passed as f64 / self.evaluated as f64
        }
    }
}

/// Result of running a chain over a batch of contracts.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// Contracts accepted by every filter, in input order.
    pub survivors: Vec<OptionContract>,
    /// Per-filter counts in chain order.
    pub stats: Vec<FilterStat>,
    /// Number of contracts evaluated.
    pub input_count: usize,
    /// Wall time spent evaluating.
    pub elapsed: Duration,
}

/// Ordered conjunction of filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    filters: Vec<FilterConfig>,
}

impl FilterChain {
    /// Builds a chain from typed configurations, validating each.
    ///
    /// # Errors
    /// Returns the first validation error.
    pub fn build(configs: Vec<FilterConfig>) -> Result<Self, FilterError> {
        for config in &configs {
            config.validate()?;
        }
        Ok(Self {
            filters: configs.into_iter().map(FilterConfig::normalized).collect(),
        })
    }

    /// Parses untyped configurations and builds a chain. Fails on the first
    /// unknown kind or malformed parameter set.
    ///
    /// # Errors
    /// Returns the first parse or validation error.
    pub fn from_raw(raw: &[RawFilterConfig]) -> Result<Self, FilterError> {
        let filters = raw
            .iter()
            .map(FilterConfig::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    /// Returns the filters in evaluation order.
    #[must_use]
    pub fn filters(&self) -> &[FilterConfig] {
        &self.filters
    }

    /// Number of filters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain accepts everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// True iff every filter accepts the contract. Stops at the first rejection.
    #[must_use]
    pub fn apply(&self, contract: &OptionContract) -> bool {
        self.filters.iter().all(|f| f.accepts(contract))
    }

    /// Whether any filter judges spread candidates.
    #[must_use]
    pub fn has_spread_filters(&self) -> bool {
        self.filters.iter().any(FilterConfig::is_spread_level)
    }

    /// Runs the contract-level filters over a batch and collects their
    /// per-filter counts.
    #[must_use]
    pub fn run(&self, contracts: Vec<OptionContract>) -> FilterOutcome {
        let started = Instant::now();
        let input_count = contracts.len();
        let (survivors, stats) = self.evaluate(contracts, false, |f, c| f.accepts(c));

        FilterOutcome {
            survivors,
            stats,
            input_count,
            elapsed: started.elapsed(),
        }
    }

    /// Keeps the spreads accepted by every spread-level filter, in input
    /// order, with per-filter counts.
    #[must_use]
    pub fn filter_spreads(
        &self,
        spreads: Vec<SpreadCandidate>,
    ) -> (Vec<SpreadCandidate>, Vec<FilterStat>) {
        self.evaluate(spreads, true, |f, s| f.accepts_spread(s))
    }

    fn evaluate<T>(
        &self,
        items: Vec<T>,
        spread_level: bool,
        accepts: impl Fn(&FilterConfig, &T) -> bool,
    ) -> (Vec<T>, Vec<FilterStat>) {
        let active: Vec<(usize, &FilterConfig)> = self
            .filters
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_spread_level() == spread_level)
            .collect();
        let mut evaluated = vec![0usize; active.len()];
        let mut passed = vec![0usize; active.len()];

        let survivors = items
            .into_iter()
            .filter(|item| {
                for (i, (_, filter)) in active.iter().enumerate() {
                    evaluated[i] += 1;
                    if !accepts(filter, item) {
                        return false;
                    }
                    passed[i] += 1;
                }
                true
            })
            .collect();

        let stats = active
            .iter()
            .enumerate()
            .map(|(i, (position, f))| FilterStat {
                kind: f.kind(),
                position: *position,
                evaluated: evaluated[i],
                passed: passed[i],
            })
            .collect();

        (survivors, stats)
    }

    /// Order-independent canonical JSON of the chain.
    ///
    /// Two chains with the same filters in any order, written with any
    /// whitespace, omitted defaults or reordered option types, produce the
    /// same string.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        let mut parts: Vec<String> = self
            .filters
            .iter()
            .map(|f| serde_json::to_string(f).unwrap_or_default())
            .collect();
        parts.sort();
        format!("[{}]", parts.join(","))
    }
}
