//! Vertical spread construction and ranking.

use super::SpreadStrategy;
use crate::config::SpreadConfig;
use crate::contract::{OptionContract, OptionType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// A two-leg vertical spread on one underlying and expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SpreadCandidate {
    /// `{underlying}-{expiration}-{C|P}-{long strike}-{short strike}-{strategy}`.
    pub id: String,
    /// Debit or credit.
    pub strategy: SpreadStrategy,
    /// Call or put spread.
    pub option_type: OptionType,
    /// Underlying symbol.
    pub underlying: String,
    /// Shared expiration.
    #[schema(value_type = String, format = Date)]
    pub expiration: NaiveDate,
    /// Bought leg.
    pub long_leg: OptionContract,
    /// Sold leg.
    pub short_leg: OptionContract,
    /// Strike distance.
    pub width: f64,
    /// Premium paid to open (0 for credit spreads).
    pub net_debit: f64,
    /// Premium received to open (0 for debit spreads).
    pub net_credit: f64,
    /// Best-case payoff at expiration.
    pub max_profit: f64,
    /// Worst-case loss at expiration.
    pub max_loss: f64,
    /// Underlying price at which the position breaks even at expiration.
    pub breakeven: f64,
    /// `max_profit / max_loss`.
    pub risk_reward: f64,
    /// Approximate probability of profit derived from the short leg's delta.
    pub probability_of_profit: f64,
    /// Ranking score; higher is better.
    pub score: f64,
}

impl SpreadCandidate {
    /// Sum of both legs' absolute bid-ask spreads.
    #[must_use]
    pub fn combined_bid_ask(&self) -> f64 {
        self.long_leg.bid_ask_spread + self.short_leg.bid_ask_spread
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Pairs filtered contracts into ranked vertical spreads.
#[derive(Debug, Clone)]
pub struct SpreadConstructor {
    config: SpreadConfig,
}

impl SpreadConstructor {
    /// Creates a constructor.
    #[must_use]
    pub fn new(config: SpreadConfig) -> Self {
        Self { config }
    }

    /// Builds, scores, sorts and truncates spread candidates.
    ///
    /// Contracts are grouped by underlying, expiration and option type. Every
    /// strike pair inside a group whose width lies within the configured
    /// bounds is priced at natural fills (long pays the ask, short receives
    /// the bid). Pairs whose net premium has the wrong sign for `strategy`, or
    /// whose payoff is degenerate, are dropped.
    ///
    /// # Arguments
    /// * `options` - Contracts that survived the filter chain.
    /// * `strategy` - Debit or credit.
    /// * `limit` - Maximum number of candidates returned.
    #[must_use]
    pub fn build(
        &self,
        options: &[OptionContract],
        strategy: SpreadStrategy,
        limit: usize,
    ) -> Vec<SpreadCandidate> {
        let mut groups: BTreeMap<(&str, NaiveDate, OptionType), Vec<&OptionContract>> =
            BTreeMap::new();
        for option in options {
            groups
                .entry((option.underlying.as_str(), option.expiration, option.option_type))
                .or_default()
                .push(option);
        }

        let mut candidates = Vec::new();
        for ((_, _, option_type), mut legs) in groups {
            legs.sort_by(|a, b| a.strike.total_cmp(&b.strike));

            for (i, lower) in legs.iter().enumerate() {
                for upper in &legs[i + 1..] {
                    let width = upper.strike - lower.strike;
                    if width > self.config.max_width {
                        break;
                    }
                    if width <= 0.0 || width < self.config.min_width {
                        continue;
                    }

                    let (long, short) = match (option_type, strategy) {
                        (OptionType::Call, SpreadStrategy::Debit)
                        | (OptionType::Put, SpreadStrategy::Credit) => (*lower, *upper),
                        (OptionType::Call, SpreadStrategy::Credit)
                        | (OptionType::Put, SpreadStrategy::Debit) => (*upper, *lower),
                    };

                    if let Some(candidate) = self.price(long, short, strategy, width) {
                        candidates.push(candidate);
                    }
                }
            }
        }

        candidates.sort_by(rank);
        candidates.truncate(limit);
        candidates
    }

    fn price(
        &self,
        long: &OptionContract,
        short: &OptionContract,
        strategy: SpreadStrategy,
        width: f64,
    ) -> Option<SpreadCandidate> {
        let option_type = long.option_type;
        let premium = round4(match strategy {
            SpreadStrategy::Debit => long.ask - short.bid,
            SpreadStrategy::Credit => short.bid - long.ask,
        });
        if premium <= 0.0 {
            return None;
        }

        let (net_debit, net_credit, max_profit, max_loss) = match strategy {
            SpreadStrategy::Debit => (premium, 0.0, round4(width - premium), premium),
            SpreadStrategy::Credit => (0.0, premium, premium, round4(width - premium)),
        };
        if max_profit <= 0.0 || max_loss <= 0.0 {
            return None;
        }

        let breakeven = round4(match (strategy, option_type) {
            (SpreadStrategy::Debit, OptionType::Call) => long.strike + premium,
            (SpreadStrategy::Debit, OptionType::Put) => long.strike - premium,
            (SpreadStrategy::Credit, OptionType::Call) => short.strike + premium,
            (SpreadStrategy::Credit, OptionType::Put) => short.strike - premium,
        });

        // Delta-based estimate, not a market-implied probability.
        let short_delta = short.delta.abs().min(1.0);
        let probability_of_profit = match strategy {
            SpreadStrategy::Credit => 1.0 - short_delta,
            SpreadStrategy::Debit => short_delta,
        }
        .clamp(0.0, 1.0);

        let risk_reward = max_profit / max_loss;
        let score = self.score(risk_reward, probability_of_profit);

        Some(SpreadCandidate {
            id: format!(
                "{}-{}-{}-{:.2}-{:.2}-{}",
                long.underlying,
                long.expiration.format("%Y%m%d"),
                option_type.code(),
                long.strike,
                short.strike,
                strategy
            ),
            strategy,
            option_type,
            underlying: long.underlying.clone(),
            expiration: long.expiration,
            long_leg: long.clone(),
            short_leg: short.clone(),
            width: round4(width),
            net_debit,
            net_credit,
            max_profit,
            max_loss,
            breakeven,
            risk_reward,
            probability_of_profit,
            score,
        })
    }

    /// Weighted sum of capped risk/reward and probability of profit.
    #[must_use]
    pub fn score(&self, risk_reward: f64, probability_of_profit: f64) -> f64 {
        let rr = if self.config.risk_reward_cap > 0.0 {
            (risk_reward / self.config.risk_reward_cap).min(1.0)
        } else {
            0.0
        };
        self.config.risk_reward_weight * rr + self.config.probability_weight * probability_of_profit
    }
}

/// Score descending, then tighter markets, nearer expiration, id.
fn rank(a: &SpreadCandidate, b: &SpreadCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.combined_bid_ask().total_cmp(&b.combined_bid_ask()))
        .then_with(|| a.expiration.cmp(&b.expiration))
        .then_with(|| a.id.cmp(&b.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::fixtures::quoted;

    fn constructor() -> SpreadConstructor {
        SpreadConstructor::new(SpreadConfig {
            min_width: 1.0,
            max_width: 10.0,
            risk_reward_weight: 0.5,
            probability_weight: 0.5,
            risk_reward_cap: 3.0,
        })
    }

    fn calls() -> Vec<OptionContract> {
        vec![
            quoted(OptionType::Call, 95.0, 0.70, 30, 6.90, 7.10),
            quoted(OptionType::Call, 100.0, 0.50, 30, 3.90, 4.10),
            quoted(OptionType::Call, 105.0, 0.30, 30, 1.90, 2.10),
            quoted(OptionType::Call, 110.0, 0.15, 30, 0.80, 0.90),
        ]
    }

    fn puts() -> Vec<OptionContract> {
        vec![
            quoted(OptionType::Put, 90.0, -0.15, 30, 0.80, 0.90),
            quoted(OptionType::Put, 95.0, -0.30, 30, 1.90, 2.10),
            quoted(OptionType::Put, 100.0, -0.50, 30, 3.90, 4.10),
        ]
    }

    #[test]
    fn test_call_debit_spread_metrics() {
        let spreads = constructor().build(&calls(), SpreadStrategy::Debit, 100);
        let spread = spreads
            .iter()
            .find(|s| s.long_leg.strike == 100.0 && s.short_leg.strike == 105.0)
            .unwrap();

        // long pays 4.10, short receives 1.90
        assert!((spread.net_debit - 2.20).abs() < 1e-9);
        assert_eq!(spread.net_credit, 0.0);
        assert!((spread.max_profit - 2.80).abs() < 1e-9);
        assert!((spread.max_loss - 2.20).abs() < 1e-9);
        assert!((spread.breakeven - 102.20).abs() < 1e-9);
        assert!((spread.probability_of_profit - 0.30).abs() < 1e-9);
        assert!((spread.risk_reward - 2.80 / 2.20).abs() < 1e-9);
        assert_eq!(spread.id, "AAPL-20250201-C-100.00-105.00-debit");
    }

    #[test]
    fn test_put_credit_spread_metrics() {
        let spreads = constructor().build(&puts(), SpreadStrategy::Credit, 100);
        let spread = spreads
            .iter()
            .find(|s| s.short_leg.strike == 100.0 && s.long_leg.strike == 95.0)
            .unwrap();

        // short receives 3.90, long pays 2.10
        assert!((spread.net_credit - 1.80).abs() < 1e-9);
        assert!((spread.max_profit - 1.80).abs() < 1e-9);
        assert!((spread.max_loss - 3.20).abs() < 1e-9);
        assert!((spread.breakeven - 98.20).abs() < 1e-9);
        assert!((spread.probability_of_profit - 0.50).abs() < 1e-9);
    }

    #[test]
    fn test_leg_orientation() {
        for s in constructor().build(&calls(), SpreadStrategy::Debit, 100) {
            assert!(s.long_leg.strike < s.short_leg.strike);
        }
        for s in constructor().build(&calls(), SpreadStrategy::Credit, 100) {
            assert!(s.short_leg.strike < s.long_leg.strike);
        }
        for s in constructor().build(&puts(), SpreadStrategy::Debit, 100) {
            assert!(s.long_leg.strike > s.short_leg.strike);
        }
        for s in constructor().build(&puts(), SpreadStrategy::Credit, 100) {
            assert!(s.short_leg.strike > s.long_leg.strike);
        }
    }

    #[test]
    fn test_sign_invariant_holds_for_every_candidate() {
        let mut chain = calls();
        chain.extend(puts());
        // A crossed pair that would price negative must be dropped, not emitted.
        chain.push(quoted(OptionType::Call, 101.0, 0.45, 30, 4.50, 4.60));

        for s in constructor().build(&chain, SpreadStrategy::Debit, 1_000) {
            assert!(s.net_debit > 0.0, "{}", s.id);
            assert!(s.max_profit > 0.0 && s.max_loss > 0.0);
        }
        for s in constructor().build(&chain, SpreadStrategy::Credit, 1_000) {
            assert!(s.net_credit > 0.0, "{}", s.id);
            assert!(s.max_profit > 0.0 && s.max_loss > 0.0);
        }
    }

    #[test]
    fn test_width_bounds() {
        let narrow = SpreadConstructor::new(SpreadConfig {
            min_width: 5.0,
            max_width: 5.0,
            ..constructor().config
        });
        let spreads = narrow.build(&calls(), SpreadStrategy::Debit, 100);
        assert!(!spreads.is_empty());
        assert!(spreads.iter().all(|s| (s.width - 5.0).abs() < 1e-9));
    }

    #[test]
    fn test_legs_never_cross_expirations_or_types() {
        let mut chain = calls();
        chain.push(quoted(OptionType::Call, 105.0, 0.35, 60, 2.90, 3.10));
        chain.extend(puts());

        for strategy in [SpreadStrategy::Debit, SpreadStrategy::Credit] {
            for s in constructor().build(&chain, strategy, 1_000) {
                assert_eq!(s.long_leg.expiration, s.short_leg.expiration);
                assert_eq!(s.long_leg.option_type, s.short_leg.option_type);
                assert_eq!(s.long_leg.underlying, s.short_leg.underlying);
                assert_ne!(s.long_leg.strike, s.short_leg.strike);
            }
        }
    }

    #[test]
    fn test_sorted_by_score_and_truncated() {
        let all = constructor().build(&calls(), SpreadStrategy::Debit, 100);
        for pair in all.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }

        let top = constructor().build(&calls(), SpreadStrategy::Debit, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].id, all[0].id);
        assert_eq!(top[1].id, all[1].id);
    }

    #[test]
    fn test_ties_prefer_tighter_markets_then_nearer_expiration() {
        // Same strikes and premiums in two expirations; the near one has wider quotes.
        let chain = vec![
            quoted(OptionType::Call, 100.0, 0.5, 30, 3.80, 4.10),
            quoted(OptionType::Call, 105.0, 0.3, 30, 1.90, 2.20),
            quoted(OptionType::Call, 100.0, 0.5, 60, 3.95, 4.10),
            quoted(OptionType::Call, 105.0, 0.3, 60, 1.90, 2.05),
        ];
        let spreads = constructor().build(&chain, SpreadStrategy::Debit, 10);
        assert_eq!(spreads.len(), 2);
        assert_eq!(spreads[0].long_leg.dte, 60);

        let even = vec![
            quoted(OptionType::Call, 100.0, 0.5, 60, 3.90, 4.10),
            quoted(OptionType::Call, 105.0, 0.3, 60, 1.90, 2.10),
            quoted(OptionType::Call, 100.0, 0.5, 30, 3.90, 4.10),
            quoted(OptionType::Call, 105.0, 0.3, 30, 1.90, 2.10),
        ];
        let spreads = constructor().build(&even, SpreadStrategy::Debit, 10);
        assert_eq!(spreads[0].long_leg.dte, 30);
    }

    #[test]
    fn test_score_caps_risk_reward() {
        let c = constructor();
        assert!((c.score(6.0, 0.2) - (0.5 + 0.1)).abs() < 1e-9);
        assert!((c.score(1.5, 0.4) - (0.25 + 0.2)).abs() < 1e-9);
    }

    #[test]
    fn test_empty_input() {
        assert!(constructor().build(&[], SpreadStrategy::Credit, 10).is_empty());
    }
}
