//! The tool catalog handed to the model so it knows what it may call.

use serde_json::{json, Map, Value};
use tutor_core::{Capability, EffectClass};

pub struct ToolSpec {
    pub capability: Capability,
    pub description: &'static str,
    pub parameters: &'static [(&'static str, &'static str)],
}

pub const TOOLS: [ToolSpec; 8] = [
    ToolSpec {
        capability: Capability::GetTokenBalance,
        description: "Get the balance of a token held by a wallet",
        parameters: &[
            ("token_address", "The token address (use 'native' for BNB, ETH, etc.)"),
            ("wallet_address", "The wallet to inspect"),
        ],
    },
    ToolSpec {
        capability: Capability::GetTokenPrice,
        description: "Get the price of a token in USD",
        parameters: &[("token_symbol", "The token symbol (e.g., ETH, BTC, BNB)")],
    },
    ToolSpec {
        capability: Capability::GetGasPrice,
        description: "Get the current gas price in Gwei",
        parameters: &[("chain", "The blockchain to get gas price for (e.g., ethereum, binance)")],
    },
    ToolSpec {
        capability: Capability::SendToken,
        description: "Send tokens to an address",
        parameters: &[
            ("token_address", "The token address (use 'native' for ETH, BNB, etc.)"),
            ("to_address", "The recipient address"),
            ("amount", "The amount to send"),
        ],
    },
    ToolSpec {
        capability: Capability::SwapTokens,
        description: "Swap tokens on a decentralized exchange",
        parameters: &[
            ("token_in", "The input token address or symbol"),
            ("token_out", "The output token address or symbol"),
            ("amount_in", "The input amount"),
        ],
    },
    ToolSpec {
        capability: Capability::AddLiquidity,
        description: "Add liquidity to a DEX pool",
        parameters: &[
            ("token_a", "First token address or symbol"),
            ("token_b", "Second token address or symbol"),
            ("amount_a", "Amount of the first token"),
            ("amount_b", "Amount of the second token"),
        ],
    },
    ToolSpec {
        capability: Capability::ExplainTransaction,
        description: "Explain what a transaction did",
        parameters: &[
            ("transaction_hash", "The transaction hash"),
            ("chain_id", "The chain the transaction was sent on"),
        ],
    },
    ToolSpec {
        capability: Capability::EstimateGas,
        description: "Estimate the gas a transaction will use",
        parameters: &[
            ("from_address", "The sender address"),
            ("to_address", "The recipient or contract address"),
            ("data", "Hex encoded calldata, 0x for a plain transfer"),
            ("value", "Value in wei"),
        ],
    },
];

fn group(capability: Capability) -> &'static str {
    match capability.effect() {
        EffectClass::ReadOnly => "blockchain_tools",
        EffectClass::Mutating => "transaction_tools",
    }
}

/// Catalog grouped into read-only `blockchain_tools` and state-changing
/// `transaction_tools`.
pub fn tool_catalog() -> Value {
    let mut groups: Map<String, Value> = Map::new();
    for tool in &TOOLS {
        let parameters: Map<String, Value> = tool
            .parameters
            .iter()
            .map(|(name, description)| {
                (
                    name.to_string(),
                    json!({"type": "string", "description": description}),
                )
            })
            .collect();

        let entry = groups
            .entry(group(tool.capability))
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(tools) = entry {
            tools.insert(
                tool.capability.name().to_string(),
                json!({"description": tool.description, "parameters": parameters}),
            );
        }
    }
    Value::Object(groups)
}

/// One line per tool, for inlining into a system prompt.
pub fn prompt_summary() -> String {
    TOOLS
        .iter()
        .map(|tool| {
            let params: Vec<&str> = tool.parameters.iter().map(|(name, _)| *name).collect();
            format!(
                "- {}({}): {}",
                tool.capability.name(),
                params.join(", "),
                tool.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
