use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenBalance {
    pub balance: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPrice {
    pub price: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GasPrice {
    pub price: String,
    pub unit: String,
}

/// Receipt of a plain token transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub tx_hash: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SwapReceipt {
    pub tx_hash: String,
    pub status: String,
    pub amount_out: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityReceipt {
    pub tx_hash: String,
    pub status: String,
    pub liquidity_tokens: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionExplanation {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub method: String,
    pub status: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub gas_limit: String,
    pub gas_price: String,
    pub unit: String,
    pub estimated_fee: String,
}

/// What a capability returned. Serialized without a tag so the payload the
/// model sees is just the record itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum CapabilityResult {
    TokenBalance(TokenBalance),
    TokenPrice(TokenPrice),
    GasPrice(GasPrice),
    Transfer(TransferReceipt),
    Swap(SwapReceipt),
    Liquidity(LiquidityReceipt),
    Explanation(TransactionExplanation),
    GasEstimate(GasEstimate),
}

impl CapabilityResult {
    /// Hash of the on-chain transaction this result produced, if any.
    pub fn transaction_hash(&self) -> Option<&str> {
        match self {
            Self::Transfer(receipt) => Some(&receipt.tx_hash),
            Self::Swap(receipt) => Some(&receipt.tx_hash),
            Self::Liquidity(receipt) => Some(&receipt.tx_hash),
            Self::TokenBalance(_)
            | Self::TokenPrice(_)
            | Self::GasPrice(_)
            | Self::Explanation(_)
            | Self::GasEstimate(_) => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            Self::Transfer(receipt) => Some(&receipt.status),
            Self::Swap(receipt) => Some(&receipt.status),
            Self::Liquidity(receipt) => Some(&receipt.status),
            Self::Explanation(explanation) => Some(&explanation.status),
            Self::TokenBalance(_) | Self::TokenPrice(_) | Self::GasPrice(_) | Self::GasEstimate(_) => {
                None
            }
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        // plain structs of strings always serialize
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
