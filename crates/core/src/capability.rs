//! The closed set of capabilities the tutor may invoke, and their effect class.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bumped whenever a capability is added, removed or renamed.
pub const CAPABILITY_REGISTRY_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum EffectClass {
    ReadOnly,
    Mutating,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    GetTokenBalance,
    GetTokenPrice,
    GetGasPrice,
    SendToken,
    SwapTokens,
    AddLiquidity,
    ExplainTransaction,
    EstimateGas,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::GetTokenBalance,
        Capability::GetTokenPrice,
        Capability::GetGasPrice,
        Capability::SendToken,
        Capability::SwapTokens,
        Capability::AddLiquidity,
        Capability::ExplainTransaction,
        Capability::EstimateGas,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|capability| capability.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::GetTokenBalance => "get_token_balance",
            Self::GetTokenPrice => "get_token_price",
            Self::GetGasPrice => "get_gas_price",
            Self::SendToken => "send_token",
            Self::SwapTokens => "swap_tokens",
            Self::AddLiquidity => "add_liquidity",
            Self::ExplainTransaction => "explain_transaction",
            Self::EstimateGas => "estimate_gas",
        }
    }

    pub fn effect(self) -> EffectClass {
        match self {
            Self::GetTokenBalance
            | Self::GetTokenPrice
            | Self::GetGasPrice
            | Self::ExplainTransaction
            | Self::EstimateGas => EffectClass::ReadOnly,
            Self::SendToken | Self::SwapTokens | Self::AddLiquidity => EffectClass::Mutating,
        }
    }

    pub fn required_arguments(self) -> &'static [&'static str] {
        match self {
            Self::GetTokenBalance => &["token_address", "wallet_address"],
            Self::GetTokenPrice => &["token_symbol"],
            Self::GetGasPrice => &["chain"],
            Self::SendToken => &["token_address", "to_address", "amount"],
            Self::SwapTokens => &["token_in", "token_out", "amount_in"],
            Self::AddLiquidity => &["token_a", "token_b", "amount_a", "amount_b"],
            Self::ExplainTransaction => &["transaction_hash", "chain_id"],
            Self::EstimateGas => &["from_address", "to_address", "data", "value"],
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Effect class of a capability name. Names outside the table are treated as
/// mutating so they can never run without a human approving them.
pub fn classify(name: &str) -> EffectClass {
    Capability::from_name(name)
        .map(Capability::effect)
        .unwrap_or(EffectClass::Mutating)
}
