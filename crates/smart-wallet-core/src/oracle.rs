//! Price oracle gateway
//!
//! Reads aggregator-style feeds and enforces the freshness rules: an answer
//! must be positive, must come from a completed round, and must not be older
//! than the staleness window at the instant it is used. Quotes are never
//! cached across operations.

use crate::host::RoundData;
use crate::{Error, Result};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Read side of the price feed interface
pub trait PriceFeedSource {
    /// `decimals()` of the feed
    fn decimals(&self, feed: &Address) -> Result<u8>;

    /// `latestRoundData()` of the feed
    fn latest_round_data(&self, feed: &Address) -> Result<RoundData>;

    /// Current block timestamp
    fn now(&self) -> u64;
}

/// A validated price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Feed the quote came from
    pub feed: Address,
    /// Positive price with `decimals` fractional digits
    pub price: U256,
    /// Feed-declared precision
    pub decimals: u8,
    /// Round update time
    pub updated_at: u64,
}

/// Gateway enforcing the staleness policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceOracleGateway {
    staleness_window: u64,
}

impl PriceOracleGateway {
    pub fn new(staleness_window: u64) -> Self {
        Self { staleness_window }
    }

    pub fn staleness_window(&self) -> u64 {
        self.staleness_window
    }

    /// Fetch and validate the latest answer of `feed`
    pub fn quote(&self, source: &impl PriceFeedSource, feed: Address) -> Result<PriceQuote> {
        let decimals = source.decimals(&feed)?;
        let round = source.latest_round_data(&feed)?;
        let now = source.now();

        if round.answer <= 0 {
            warn!(feed = %feed, answer = round.answer, "Rejected non-positive price");
            return Err(Error::InvalidPrice {
                feed,
                answer: round.answer,
            });
        }

        let incomplete_round = round.answered_in_round < round.round_id || round.updated_at == 0;
        let age = now.saturating_sub(round.updated_at);
        if incomplete_round || age > self.staleness_window {
            warn!(
                feed = %feed,
                updated_at = round.updated_at,
                now,
                window = self.staleness_window,
                "Rejected stale price"
            );
            return Err(Error::StalePrice {
                feed,
                updated_at: round.updated_at,
                now,
            });
        }

        debug!(feed = %feed, answer = round.answer, decimals, age, "Price quote accepted");

        Ok(PriceQuote {
            feed,
            price: U256::from(round.answer as u128),
            decimals,
            updated_at: round.updated_at,
        })
    }
}

/// 10^exp with overflow detection
pub fn pow10(exp: u32) -> Result<U256> {
    U256::from(10u64)
        .checked_pow(U256::from(exp))
        .ok_or(Error::ArithmeticOverflow("power of ten"))
}

/// Convert a USD-cents amount into units of a token priced by `quote`
///
/// `units = cents * 10^token_decimals * 10^feed_decimals / (100 * price)`,
/// rounded down.
pub fn usd_cents_to_token_units(cents: u64, quote: &PriceQuote, token_decimals: u8) -> Result<U256> {
    let numerator = U256::from(cents)
        .checked_mul(pow10(token_decimals as u32)?)
        .and_then(|v| v.checked_mul(pow10(quote.decimals as u32).ok()?))
        .ok_or(Error::ArithmeticOverflow("fee conversion"))?;
    let denominator = quote
        .price
        .checked_mul(U256::from(100u64))
        .ok_or(Error::ArithmeticOverflow("fee conversion"))?;

    Ok(numerator / denominator)
}

/// Convert `amount_in` of one token into the equivalent amount of another
/// at the ratio of their USD quotes, rounded down
pub fn convert_amount(
    amount_in: U256,
    quote_in: &PriceQuote,
    decimals_in: u8,
    quote_out: &PriceQuote,
    decimals_out: u8,
) -> Result<U256> {
    let overflow = Error::ArithmeticOverflow("price conversion");

    let numerator = amount_in
        .checked_mul(quote_in.price)
        .and_then(|v| v.checked_mul(pow10(quote_out.decimals as u32).ok()?))
        .and_then(|v| v.checked_mul(pow10(decimals_out as u32).ok()?))
        .ok_or_else(|| overflow.clone())?;
    let denominator = quote_out
        .price
        .checked_mul(pow10(quote_in.decimals as u32)?)
        .and_then(|v| v.checked_mul(pow10(decimals_in as u32).ok()?))
        .ok_or(overflow)?;

    Ok(numerator / denominator)
}
