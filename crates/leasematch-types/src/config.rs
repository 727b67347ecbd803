//! Marketplace parameters and ledger configuration.

use serde::{Deserialize, Serialize};

use crate::{DecCoin, GroupSpec, LedgerError, Result, constants};

/// How the ceiling price of an order is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeilingPriceRule {
    /// Sum over resource units of `price × count`.
    #[default]
    GroupSpecPrice,
    /// Any price in the order's denomination is accepted.
    Unbounded,
}

/// Marketplace parameters, read once per command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    /// Minimum deposit a provider escrows with each bid.
    pub bid_min_deposit: DecCoin,
    /// Maximum number of Open+Active bids per order.
    pub order_max_bids: u32,
    #[serde(default)]
    pub ceiling_price: CeilingPriceRule,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            bid_min_deposit: DecCoin::from_int(
                constants::DEFAULT_DENOM,
                constants::DEFAULT_BID_MIN_DEPOSIT_AMOUNT,
            ),
            order_max_bids: constants::DEFAULT_ORDER_MAX_BIDS,
            ceiling_price: CeilingPriceRule::GroupSpecPrice,
        }
    }
}

impl MarketParams {
    /// # Errors
    /// `Configuration` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !self.bid_min_deposit.is_valid() {
            return Err(LedgerError::Configuration(format!(
                "invalid bid_min_deposit {}",
                self.bid_min_deposit
            )));
        }
        if self.order_max_bids == 0 || self.order_max_bids > constants::MAX_ORDER_MAX_BIDS {
            return Err(LedgerError::Configuration(format!(
                "order_max_bids must be in 1..={}, got {}",
                constants::MAX_ORDER_MAX_BIDS,
                self.order_max_bids
            )));
        }
        Ok(())
    }

    /// The highest price a bid on an order with `spec` may ask, or `None`
    /// when unbounded.
    ///
    /// # Errors
    /// Propagates [`GroupSpec::price`] failures.
    pub fn ceiling_price(&self, spec: &GroupSpec) -> Result<Option<DecCoin>> {
        match self.ceiling_price {
            CeilingPriceRule::GroupSpecPrice => spec.price().map(Some),
            CeilingPriceRule::Unbounded => Ok(None),
        }
    }
}

/// Read-only parameter lookup.
pub trait ParamSource {
    fn market_params(&self) -> MarketParams;
}

impl ParamSource for MarketParams {
    fn market_params(&self) -> MarketParams {
        self.clone()
    }
}

/// Top-level ledger configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub market: MarketParams,
}

impl LedgerConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    /// `Configuration` on malformed JSON or invalid parameters.
    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(raw).map_err(|e| LedgerError::Configuration(e.to_string()))?;
        cfg.market.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let params = MarketParams::default();
        assert_eq!(params.bid_min_deposit, DecCoin::from_int("uakt", 500_000));
        assert_eq!(params.order_max_bids, 20);
        assert_eq!(params.ceiling_price, CeilingPriceRule::GroupSpecPrice);
        params.validate().unwrap();
    }

    #[test]
    fn invalid_params_rejected() {
        let mut params = MarketParams::default();
        params.order_max_bids = 0;
        assert!(matches!(params.validate().unwrap_err(), LedgerError::Configuration(_)));

        let mut params = MarketParams::default();
        params.bid_min_deposit = DecCoin::from_int("uakt", -1);
        assert!(params.validate().is_err());
    }

    #[test]
    fn ceiling_rule() {
        let spec = GroupSpec::dummy("web", 10);
        let mut params = MarketParams::default();
        assert_eq!(
            params.ceiling_price(&spec).unwrap(),
            Some(DecCoin::from_int("uakt", 10))
        );
        params.ceiling_price = CeilingPriceRule::Unbounded;
        assert_eq!(params.ceiling_price(&spec).unwrap(), None);
    }

    #[test]
    fn config_from_json() {
        let raw = r#"{
            "market": {
                "bid_min_deposit": { "denom": "uakt", "amount": "500" },
                "order_max_bids": 3,
                "ceiling_price": "unbounded"
            }
        }"#;
        let cfg = LedgerConfig::from_json(raw).unwrap();
        assert_eq!(cfg.market.order_max_bids, 3);
        assert_eq!(cfg.market.ceiling_price, CeilingPriceRule::Unbounded);

        let cfg = LedgerConfig::from_json("{}").unwrap();
        assert_eq!(cfg, LedgerConfig::default());

        let raw = r#"{"market": {"bid_min_deposit": {"denom": "uakt", "amount": "1"}, "order_max_bids": 0}}"#;
        let err = LedgerConfig::from_json(raw).unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(_)));
        assert!(LedgerConfig::from_json("not json").is_err());
    }
}
