//! Genesis configuration for the auction module.
//!
//! This module defines the parameters an auction is created with. They are
//! fixed for the auction's lifetime.

use auction_crypto::CostTable;
use auction_engine::EngineConfig;
use auction_types::{Address, TieBreakPolicy};
use serde::{Deserialize, Serialize};

/// Genesis configuration for one auction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionGenesisConfig {
    /// Supply offered (Q)
    pub total_quantity: u64,
    /// Maximum number of bids accepted
    pub max_bid_count: u32,
    #[serde(default)]
    pub tie_break: TieBreakPolicy,
    /// Charged to a bidder whose bid validated to zero
    pub penalty: u64,
    /// Receives payments, penalties and unsold supply
    pub beneficiary: Address,
    /// The only sender allowed to deliver decryption callbacks
    pub oracle: Address,
    /// Blocks the oracle has to answer a decryption request
    pub decryption_window: u64,
    /// Per-operation cost of the oblivious primitives
    #[serde(default)]
    pub costs: CostTable,
    /// Seed for the simulated backend's random stream
    #[serde(default)]
    pub backend_seed: [u8; 32],
    /// Cost units initialization may spend, including the tie-break shuffle
    #[serde(default = "default_init_budget")]
    pub init_budget: u64,
}

/// Covers the shuffle of [`auction_engine::MAX_BID_COUNT`] slots at default costs.
pub const DEFAULT_INIT_BUDGET: u64 = 16_000_000;

fn default_init_budget() -> u64 {
    DEFAULT_INIT_BUDGET
}

impl Default for AuctionGenesisConfig {
    fn default() -> Self {
        Self {
            total_quantity: 1_000_000,
            max_bid_count: 64,
            tie_break: TieBreakPolicy::default(),
            penalty: 0,
            beneficiary: [0xBE; 32],
            oracle: [0x0A; 32],
            decryption_window: 100,
            costs: CostTable::default(),
            backend_seed: [0u8; 32],
            init_budget: DEFAULT_INIT_BUDGET,
        }
    }
}

impl AuctionGenesisConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, GenesisValidationError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GenesisValidationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Engine parameters derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            total_quantity: self.total_quantity,
            max_bid_count: self.max_bid_count,
            tie_break: self.tie_break,
            costs: self.costs,
        }
    }

    /// Validate the genesis configuration.
    pub fn validate(&self) -> Result<(), GenesisValidationError> {
        self.engine_config()
            .validate()
            .map_err(|e| GenesisValidationError::InvalidEngineParams(e.to_string()))?;

        if self.decryption_window == 0 {
            return Err(GenesisValidationError::InvalidDecryptionWindow);
        }

        if self.oracle == self.beneficiary {
            return Err(GenesisValidationError::OracleIsBeneficiary);
        }

        Ok(())
    }
}

/// Errors that can occur during genesis validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenesisValidationError {
    #[error("Invalid engine parameters: {0}")]
    InvalidEngineParams(String),

    #[error("Decryption window cannot be zero")]
    InvalidDecryptionWindow,

    #[error("Oracle and beneficiary must differ")]
    OracleIsBeneficiary,

    #[error("Failed to parse genesis config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuctionGenesisConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_quantity() {
        let config = AuctionGenesisConfig {
            total_quantity: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::InvalidEngineParams(_))
        ));
    }

    #[test]
    fn test_invalid_window() {
        let config = AuctionGenesisConfig {
            decryption_window: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::InvalidDecryptionWindow)
        ));
    }

    #[test]
    fn test_oracle_cannot_be_beneficiary() {
        let config = AuctionGenesisConfig {
            beneficiary: [5u8; 32],
            oracle: [5u8; 32],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::OracleIsBeneficiary)
        ));
    }

    #[test]
    fn test_zero_addresses_are_not_exempt() {
        let config = AuctionGenesisConfig {
            beneficiary: [0u8; 32],
            oracle: [0u8; 32],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::OracleIsBeneficiary)
        ));

        let defaults = AuctionGenesisConfig::default();
        assert_ne!(defaults.oracle, defaults.beneficiary);
    }

    #[test]
    fn test_oversized_bid_count_rejected() {
        let config = AuctionGenesisConfig {
            total_quantity: 1,
            max_bid_count: u32::MAX - 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::InvalidEngineParams(_))
        ));
    }

    #[test]
    fn test_from_json_uses_defaults() {
        let json = r#"{
            "total_quantity": 500,
            "max_bid_count": 8,
            "penalty": 3,
            "beneficiary": [1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1],
            "oracle": [2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2],
            "decryption_window": 10
        }"#;

        let config = AuctionGenesisConfig::from_json(json).unwrap();
        assert_eq!(config.total_quantity, 500);
        assert_eq!(config.tie_break, TieBreakPolicy::QuantityThenRegistration);
        assert_eq!(config.costs, CostTable::default());
        assert_eq!(config.init_budget, DEFAULT_INIT_BUDGET);
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(matches!(
            AuctionGenesisConfig::from_json("{}"),
            Err(GenesisValidationError::Parse(_))
        ));
    }
}
