//! Option contract model shared by providers, filters and the spread constructor.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Call option.
    Call,
    /// Put option.
    Put,
}

impl OptionType {
    /// Single-letter code used in identifiers.
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

/// A single option contract as fetched from the market-data provider.
///
/// Contracts are immutable once fetched and identified by
/// `(underlying, strike, expiration, option_type)`. The derived fields are
/// recomputed by [`OptionContract::refresh_derived`] so feeds may omit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OptionContract {
    /// Underlying symbol.
    pub underlying: String,
    /// Strike price.
    pub strike: f64,
    /// Expiration date.
    #[schema(value_type = String, format = Date)]
    pub expiration: NaiveDate,
    /// Call or put.
    pub option_type: OptionType,
    /// Days to expiration.
    #[serde(default)]
    pub dte: u32,

    /// Best bid.
    pub bid: f64,
    /// Best ask.
    pub ask: f64,
    /// Last traded price.
    #[serde(default)]
    pub last: f64,
    /// Session volume.
    #[serde(default)]
    pub volume: u64,
    /// Open interest.
    #[serde(default)]
    pub open_interest: u64,

    /// Delta.
    pub delta: f64,
    /// Gamma.
    #[serde(default)]
    pub gamma: f64,
    /// Theta (per day).
    #[serde(default)]
    pub theta: f64,
    /// Vega.
    #[serde(default)]
    pub vega: f64,
    /// Implied volatility (annualised, 0.25 = 25%).
    #[serde(default)]
    pub iv: f64,
    /// Implied volatility percentile (0 to 100).
    #[serde(default)]
    pub iv_percentile: f64,

    /// Absolute bid-ask spread.
    #[serde(default)]
    pub bid_ask_spread: f64,
    /// Bid-ask spread as a fraction of the mid price.
    #[serde(default)]
    pub bid_ask_spread_pct: f64,
    /// Combined volume/open-interest liquidity score.
    #[serde(default)]
    pub liquidity: f64,
    /// Probability of finishing in the money, approximated by `|delta|`.
    #[serde(default)]
    pub probability_itm: f64,
}

impl OptionContract {
    /// Mid price of the quote.
    #[must_use]
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Recomputes days to expiration and every derived field.
    ///
    /// # Arguments
    /// * `today` - Reference date for the DTE calculation.
    pub fn refresh_derived(&mut self, today: NaiveDate) {
        self.dte = u32::try_from((self.expiration - today).num_days().max(0)).unwrap_or(u32::MAX);

        self.bid_ask_spread = (self.ask - self.bid).max(0.0);
        let mid = self.mid();
        // A one-sided or crossed-to-zero quote is as illiquid as it gets.
        self.bid_ask_spread_pct = if mid > 0.0 {
            self.bid_ask_spread / mid
        } else {
            1.0
        };

        self.liquidity = liquidity_score(self.volume, self.open_interest);
        self.probability_itm = self.delta.abs().min(1.0);
    }

    /// Stable identity of the contract within a chain.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}-{}-{}-{:.2}",
            self.underlying,
            self.expiration.format("%Y%m%d"),
            self.option_type.code(),
            self.strike
        )
    }
}

/// Geometric mean of volume and open interest.
#[must_use]
pub fn liquidity_score(volume: u64, open_interest: u64) -> f64 {
    ((volume as f64) * (open_interest as f64)).sqrt()
}
