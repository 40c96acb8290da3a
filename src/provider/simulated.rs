//! Simulated option chains priced with Black-Scholes.

use super::{FetchError, MarketDataProvider};
use crate::config::AssetConfig;
use crate::contract::{OptionContract, OptionType};
use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Black-Scholes pricer for European options.
#[derive(Debug, Clone, Copy)]
pub struct BlackScholes {
    /// Risk-free rate (annualized).
    risk_free_rate: f64,
}

impl BlackScholes {
    /// Creates a new pricer.
    ///
    /// # Arguments
    /// * `risk_free_rate` - Annualized risk-free rate (e.g., 0.05 for 5%)
    #[must_use]
    pub fn new(risk_free_rate: f64) -> Self {
        Self { risk_free_rate }
    }

    fn d1_d2(&self, spot: f64, strike: f64, t: f64, sigma: f64) -> (f64, f64) {
        let d1 = ((spot / strike).ln() + (self.risk_free_rate + sigma * sigma / 2.0) * t)
            / (sigma * t.sqrt());
        (d1, d1 - sigma * t.sqrt())
    }

    /// Theoretical value of an option.
    ///
    /// # Arguments
    /// * `spot` - Current underlying price
    /// * `strike` - Option strike price
    /// * `t` - Time to expiration in years
    /// * `sigma` - Implied volatility
    /// * `option_type` - Call or Put
    #[must_use]
    pub fn value(&self, spot: f64, strike: f64, t: f64, sigma: f64, option_type: OptionType) -> f64 {
        if t <= 0.0 {
            return match option_type {
                OptionType::Call => (spot - strike).max(0.0),
                OptionType::Put => (strike - spot).max(0.0),
            };
        }

        let (d1, d2) = self.d1_d2(spot, strike, t, sigma);
        let discount = (-self.risk_free_rate * t).exp();

        match option_type {
            OptionType::Call => spot * norm_cdf(d1) - strike * discount * norm_cdf(d2),
            OptionType::Put => strike * discount * norm_cdf(-d2) - spot * norm_cdf(-d1),
        }
    }

    /// Delta of an option.
    #[must_use]
    pub fn delta(&self, spot: f64, strike: f64, t: f64, sigma: f64, option_type: OptionType) -> f64 {
        if t <= 0.0 {
            return match option_type {
                OptionType::Call if spot > strike => 1.0,
                OptionType::Put if spot < strike => -1.0,
                _ => 0.0,
            };
        }

        let (d1, _) = self.d1_d2(spot, strike, t, sigma);
        match option_type {
            OptionType::Call => norm_cdf(d1),
            OptionType::Put => norm_cdf(d1) - 1.0,
        }
    }

    /// Gamma of an option.
    #[must_use]
    pub fn gamma(&self, spot: f64, strike: f64, t: f64, sigma: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let (d1, _) = self.d1_d2(spot, strike, t, sigma);
        norm_pdf(d1) / (spot * sigma * t.sqrt())
    }

    /// Vega per 1% volatility change.
    #[must_use]
    pub fn vega(&self, spot: f64, strike: f64, t: f64, sigma: f64) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }
        let (d1, _) = self.d1_d2(spot, strike, t, sigma);
        spot * norm_pdf(d1) * t.sqrt() / 100.0
    }

    /// Daily theta.
    #[must_use]
    pub fn theta(&self, spot: f64, strike: f64, t: f64, sigma: f64, option_type: OptionType) -> f64 {
        if t <= 0.0 {
            return 0.0;
        }

        let (d1, d2) = self.d1_d2(spot, strike, t, sigma);
        let discount = (-self.risk_free_rate * t).exp();
        let decay = -spot * norm_pdf(d1) * sigma / (2.0 * t.sqrt());

        let theta = match option_type {
            OptionType::Call => decay - self.risk_free_rate * strike * discount * norm_cdf(d2),
            OptionType::Put => decay + self.risk_free_rate * strike * discount * norm_cdf(-d2),
        };

        theta / 365.0
    }
}

impl Default for BlackScholes {
    fn default() -> Self {
        Self::new(0.05)
    }
}

/// Standard normal CDF.
fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal PDF.
fn norm_pdf(x: f64) -> f64 {
    (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Abramowitz-Stegun error function approximation.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Provider that synthesises a full chain for each configured asset.
///
/// Chains are deterministic for a given date: strikes are centred on the
/// configured spot, implied volatility carries a simple smile, quotes are
/// theoretical value plus or minus a proportional half spread, and activity
/// decays with distance from the money.
#[derive(Debug)]
pub struct SimulatedProvider {
    assets: HashMap<String, AssetConfig>,
    pricer: BlackScholes,
    latency: Duration,
}

impl SimulatedProvider {
    /// Creates a simulated provider.
    ///
    /// # Arguments
    /// * `assets` - Assets the provider knows about.
    /// * `risk_free_rate` - Rate used for pricing.
    /// * `latency` - Artificial delay added to every fetch.
    #[must_use]
    pub fn new(assets: Vec<AssetConfig>, risk_free_rate: f64, latency: Duration) -> Self {
        let assets = assets
            .into_iter()
            .map(|a| (a.symbol.to_ascii_uppercase(), a))
            .collect();
        Self {
            assets,
            pricer: BlackScholes::new(risk_free_rate),
            latency,
        }
    }

    /// Builds the chain for one asset as of `today`.
    #[must_use]
    pub fn generate_chain(&self, asset: &AssetConfig, today: NaiveDate) -> Vec<OptionContract> {
        let strikes = asset.generate_strikes();
        let mut chain = Vec::with_capacity(asset.expirations.len() * strikes.len() * 2);

        for &days in &asset.expirations {
            let expiration = today + Days::new(u64::from(days));
            let t = f64::from(days) / 365.0;

            for &strike in &strikes {
                let moneyness = (strike / asset.spot).ln();
                let sigma = asset.volatility * (1.0 + asset.smile * moneyness * moneyness);
                let activity = (-8.0 * moneyness.abs()).exp();

                for option_type in [OptionType::Call, OptionType::Put] {
                    let theo = self.pricer.value(asset.spot, strike, t, sigma, option_type);
                    let half_spread =
                        (theo * asset.spread_bps as f64 / 20_000.0).max(0.01);
                    let bid = round_cents((theo - half_spread).max(0.0));
                    let ask = round_cents((theo + half_spread).max(bid + 0.01));
                    let volume = (asset.base_volume as f64 * activity).round() as u64;

                    let mut contract = OptionContract {
                        underlying: asset.symbol.to_ascii_uppercase(),
                        strike,
                        expiration,
                        option_type,
                        dte: days,
                        bid,
                        ask,
                        last: round_cents(theo),
                        volume,
                        open_interest: volume * 4,
                        delta: self.pricer.delta(asset.spot, strike, t, sigma, option_type),
                        gamma: self.pricer.gamma(asset.spot, strike, t, sigma),
                        theta: self.pricer.theta(asset.spot, strike, t, sigma, option_type),
                        vega: self.pricer.vega(asset.spot, strike, t, sigma),
                        iv: sigma,
                        iv_percentile: asset.iv_percentile,
                        bid_ask_spread: 0.0,
                        bid_ask_spread_pct: 0.0,
                        liquidity: 0.0,
                        probability_itm: 0.0,
                    };
                    contract.refresh_derived(today);
                    chain.push(contract);
                }
            }
        }

        chain
    }
}

#[async_trait]
impl MarketDataProvider for SimulatedProvider {
    async fn fetch_chain(&self, symbol: &str) -> Result<Vec<OptionContract>, FetchError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let key = symbol.trim().to_ascii_uppercase();
        let asset = self
            .assets
            .get(&key)
            .ok_or_else(|| FetchError::UnknownSymbol(key.clone()))?;

        let chain = self.generate_chain(asset, Utc::now().date_naive());
        debug!("Simulated {} contracts for {}", chain.len(), key);
        Ok(chain)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
