use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tutor_core::{Arguments, Capability};

use crate::error::ArgumentError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenBalanceArgs {
    /// Contract address, or `native` for the chain's own coin.
    pub token_address: String,
    pub wallet_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenPriceArgs {
    pub token_symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GasPriceArgs {
    pub chain: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SendTokenArgs {
    pub token_address: String,
    pub to_address: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapTokensArgs {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddLiquidityArgs {
    pub token_a: String,
    pub token_b: String,
    pub amount_a: String,
    pub amount_b: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplainTransactionArgs {
    pub transaction_hash: String,
    pub chain_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EstimateGasArgs {
    pub from_address: String,
    pub to_address: String,
    /// Hex calldata, `0x` for a plain transfer.
    pub data: String,
    /// Value in wei.
    pub value: String,
}

/// Typed arguments for one capability invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityRequest {
    TokenBalance(TokenBalanceArgs),
    TokenPrice(TokenPriceArgs),
    GasPrice(GasPriceArgs),
    SendToken(SendTokenArgs),
    SwapTokens(SwapTokensArgs),
    AddLiquidity(AddLiquidityArgs),
    ExplainTransaction(ExplainTransactionArgs),
    EstimateGas(EstimateGasArgs),
}

impl CapabilityRequest {
    /// Checks that every required key is present and scalar, then decodes the
    /// arguments. Numbers and booleans are accepted as their text form; keys
    /// outside the capability's table are ignored.
    pub fn decode(capability: Capability, arguments: &Arguments) -> Result<Self, ArgumentError> {
        let normalized = normalize(capability.required_arguments(), arguments)?;

        Ok(match capability {
            Capability::GetTokenBalance => Self::TokenBalance(from_map(normalized)?),
            Capability::GetTokenPrice => Self::TokenPrice(from_map(normalized)?),
            Capability::GetGasPrice => Self::GasPrice(from_map(normalized)?),
            Capability::SendToken => Self::SendToken(from_map(normalized)?),
            Capability::SwapTokens => Self::SwapTokens(from_map(normalized)?),
            Capability::AddLiquidity => Self::AddLiquidity(from_map(normalized)?),
            Capability::ExplainTransaction => Self::ExplainTransaction(from_map(normalized)?),
            Capability::EstimateGas => Self::EstimateGas(from_map(normalized)?),
        })
    }

    pub fn capability(&self) -> Capability {
        match self {
            Self::TokenBalance(_) => Capability::GetTokenBalance,
            Self::TokenPrice(_) => Capability::GetTokenPrice,
            Self::GasPrice(_) => Capability::GetGasPrice,
            Self::SendToken(_) => Capability::SendToken,
            Self::SwapTokens(_) => Capability::SwapTokens,
            Self::AddLiquidity(_) => Capability::AddLiquidity,
            Self::ExplainTransaction(_) => Capability::ExplainTransaction,
            Self::EstimateGas(_) => Capability::EstimateGas,
        }
    }
}

fn normalize(
    required: &'static [&'static str],
    arguments: &Arguments,
) -> Result<Map<String, Value>, ArgumentError> {
    let missing: Vec<&'static str> = required
        .iter()
        .copied()
        .filter(|key| matches!(arguments.get(*key), None | Some(Value::Null)))
        .collect();
    if !missing.is_empty() {
        return Err(ArgumentError::Missing(missing));
    }

    let mut normalized = Map::new();
    for key in required {
        let text = match &arguments[*key] {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return Err(ArgumentError::NotScalar(*key)),
        };
        normalized.insert((*key).to_string(), Value::String(text));
    }
    Ok(normalized)
}

fn from_map<T: DeserializeOwned>(map: Map<String, Value>) -> Result<T, ArgumentError> {
    // every required key is present as a string, so this only fails if the
    // struct and the capability table disagree
    serde_json::from_value(Value::Object(map)).map_err(|_| ArgumentError::Missing(Vec::new()))
}
