//! Wire types exchanged with the quoter and order book

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::secrets::Hash32;
use crate::swap::Preset;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quote request parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapParams {
    #[serde(rename = "srcChain")]
    pub src_chain_id: u64,
    #[serde(rename = "dstChain")]
    pub dst_chain_id: u64,
    pub src_token_address: String,
    pub dst_token_address: String,
    /// Amount in the source token's smallest unit
    pub amount: String,
    pub wallet_address: String,
    #[serde(default)]
    pub enable_estimate: bool,
}

/// Terms of one preset within a quote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetTerms {
    pub secrets_count: u32,
    #[serde(default)]
    pub auction_duration_secs: u64,
    #[serde(default)]
    pub allow_partial_fills: bool,
    #[serde(default)]
    pub allow_multiple_fills: bool,
    #[serde(default)]
    pub cost_in_dst_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub quote_id: String,
    pub presets: BTreeMap<Preset, PresetTerms>,
    #[serde(default)]
    pub recommended_preset: Option<Preset>,
    #[serde(default)]
    pub src_token_amount: Option<String>,
    #[serde(default)]
    pub dst_token_amount: Option<String>,
}

impl Quote {
    pub fn preset(&self, preset: Preset) -> CoordinatorResult<&PresetTerms> {
        self.presets
            .get(&preset)
            .ok_or_else(|| CoordinatorError::PresetUnavailable {
                preset: preset.to_string(),
                quote_id: self.quote_id.clone(),
            })
    }

    /// Preset used when the caller does not pick one
    pub fn default_preset(&self) -> Preset {
        self.recommended_preset.unwrap_or(Preset::Fast)
    }
}

/// Order submitted to the book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub quote_id: String,
    pub preset: Preset,
    pub src_chain_id: u64,
    pub dst_chain_id: u64,
    pub maker: String,
    /// Single hash or Merkle root
    pub hash_lock: Hash32,
    pub secret_hashes: Vec<Hash32>,
    pub src_token_address: String,
    pub dst_token_address: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAck {
    pub order_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBookStatus {
    Pending,
    Executed,
    Expired,
    Refunding,
    Refunded,
    Cancelled,
    Failed,
}

/// Escrow visibility of one fill as reported by the book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillReport {
    pub idx: u32,
    #[serde(default)]
    pub src_escrow_deployed: bool,
    #[serde(default)]
    pub dst_escrow_deployed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatus {
    pub order_hash: String,
    pub status: OrderBookStatus,
    #[serde(default)]
    pub fills: Vec<FillReport>,
    /// Hash lock the escrows were deployed with, when the book reports it
    #[serde(default)]
    pub hash_lock: Option<Hash32>,
}

/// Fill whose escrows are deployed on both chains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyFill {
    pub idx: u32,
    #[serde(default)]
    pub src_escrow_deploy_tx_hash: Option<String>,
    #[serde(default)]
    pub dst_escrow_deploy_tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyFills {
    pub fills: Vec<ReadyFill>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_wire_format() {
        let json = r#"{
            "quoteId": "q-1",
            "presets": {
                "fast": { "secretsCount": 1, "auctionDurationSecs": 180 },
                "slow": { "secretsCount": 4, "allowPartialFills": true }
            },
            "recommendedPreset": "slow"
        }"#;
        let quote: Quote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.preset(Preset::Fast).unwrap().secrets_count, 1);
        assert!(quote.preset(Preset::Slow).unwrap().allow_partial_fills);
        assert_eq!(quote.default_preset(), Preset::Slow);

        let err = quote.preset(Preset::Medium).unwrap_err();
        assert!(matches!(err, CoordinatorError::PresetUnavailable { .. }));
    }

    #[test]
    fn test_default_preset_falls_back_to_fast() {
        let quote = Quote {
            quote_id: "q".to_string(),
            presets: BTreeMap::new(),
            recommended_preset: None,
            src_token_amount: None,
            dst_token_amount: None,
        };
        assert_eq!(quote.default_preset(), Preset::Fast);
    }

    #[test]
    fn test_swap_params_field_names() {
        let params = SwapParams {
            src_chain_id: 1,
            dst_chain_id: 137,
            src_token_address: "0xa".to_string(),
            dst_token_address: "0xb".to_string(),
            amount: "1000000".to_string(),
            wallet_address: "0xw".to_string(),
            enable_estimate: true,
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["srcChain"], 1);
        assert_eq!(value["dstChain"], 137);
        assert_eq!(value["srcTokenAddress"], "0xa");
        assert_eq!(value["walletAddress"], "0xw");
    }
}
