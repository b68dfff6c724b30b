//! Deterministic explanations used whenever the model cannot interpret a
//! result. Every function here returns non-empty text and cannot fail.

use serde_json::Value;
use tutor_core::{Capability, FunctionCall};

use crate::topic::Topic;

fn field(result: &Value, key: &str) -> Option<String> {
    match result.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_or(result: &Value, key: &str, default: &str) -> String {
    field(result, key).unwrap_or_else(|| default.to_string())
}

fn argument_or(call: &FunctionCall, key: &str, default: &str) -> String {
    call.argument_str(key).unwrap_or_else(|| default.to_string())
}

fn native_or(call: &FunctionCall, other: &str) -> String {
    if call.argument_str("token_address").as_deref() == Some("native") {
        "BNB".to_string()
    } else {
        other.to_string()
    }
}

pub fn fallback_explanation(call: &FunctionCall, result: &Value, topic: &Topic) -> String {
    let section = &topic.name;
    let id = topic.id.as_str();

    let Some(capability) = Capability::from_name(call.name()) else {
        return generic(call.name(), result, section);
    };

    match capability {
        Capability::GetTokenBalance => {
            let token = field_or(result, "token", "token");
            let unit = native_or(call, &field_or(result, "token", "tokens"));
            let aside = match id {
                "lending" => "For lending protocols, your balance determines how much you can lend or use as collateral.",
                "dex" => "When using decentralized exchanges, knowing your balance is essential for planning trades.",
                _ => "This information is fundamental to participating in any DeFi activity.",
            };
            format!(
                "Your {token} balance is {balance} {unit}.\n\nIn {section}, understanding your token balances is important because it helps you track your assets and make informed decisions. {aside}",
                balance = field_or(result, "balance", "unknown"),
            )
        }
        Capability::GetTokenPrice => {
            let aside = match id {
                "dex" => "When trading on DEXs, price data helps you determine if you're getting a fair exchange rate.",
                "staking" => "For staking and yield farming, token prices help calculate your actual APY in dollar terms.",
                _ => "Monitoring prices helps you make better decisions about when to buy, sell, or hold assets.",
            };
            format!(
                "The current price of {symbol} is ${price}.\n\nPrice information is crucial in {section} as it affects the value of your assets and potential returns on investments. {aside}",
                symbol = argument_or(call, "token_symbol", "this token"),
                price = field_or(result, "price", "unknown"),
            )
        }
        Capability::GetGasPrice => {
            let aside = match id {
                "dex" => "When using DEXs, high gas prices can significantly impact the profitability of smaller trades.",
                "lending" => "For lending platforms, understanding gas costs helps you determine if smaller deposits or withdrawals are economical.",
                _ => "Being aware of gas prices helps you time your transactions to minimize fees.",
            };
            format!(
                "The current gas price is {price} {unit}.\n\nGas prices are important to monitor in {section} because they affect the cost of transactions on the blockchain. {aside}",
                price = field_or(result, "price", "unknown"),
                unit = field_or(result, "unit", "gwei"),
            )
        }
        Capability::SendToken => {
            let aside = if id == "wallets" {
                "This demonstrates how your wallet interacts with the blockchain to transfer assets securely."
            } else {
                "This transaction has been recorded on the blockchain and is now immutable and transparent - key principles of DeFi."
            };
            format!(
                "Transaction sent! {amount} {unit} have been sent to {to}. Transaction hash: {hash}\n\nIn {section}, transactions like this represent the fundamental way value moves between addresses on the blockchain. {aside}",
                amount = argument_or(call, "amount", "the requested amount of"),
                unit = native_or(call, "tokens"),
                to = argument_or(call, "to_address", "the recipient"),
                hash = field_or(result, "txHash", "unavailable"),
            )
        }
        Capability::SwapTokens => {
            let aside = if id == "dex" {
                "This swap was executed through liquidity pools rather than a traditional order book, demonstrating how AMMs (Automated Market Makers) work."
            } else {
                "This demonstrates how DeFi enables permissionless trading without intermediaries, one of the key innovations of decentralized finance."
            };
            format!(
                "Swap completed! You received {amount_out} {token_out} in exchange for {amount_in} {token_in}. Transaction hash: {hash}\n\nToken swaps are a core function in {section}, especially for decentralized exchanges. {aside}",
                amount_out = field_or(result, "amountOut", "some"),
                token_out = argument_or(call, "token_out", "tokens"),
                amount_in = argument_or(call, "amount_in", "your"),
                token_in = argument_or(call, "token_in", "tokens"),
                hash = field_or(result, "txHash", "unavailable"),
            )
        }
        Capability::AddLiquidity => {
            let aside = match id {
                "dex" => "Your deposit now backs the pool that traders swap against, and you earn a share of the trading fees.",
                "staking" => "Liquidity positions like this are the starting point for most yield farming strategies.",
                _ => "Liquidity providers keep decentralized markets running, but should understand impermanent loss before depositing.",
            };
            format!(
                "Liquidity added! You deposited {amount_a} {token_a} and {amount_b} {token_b} and received {lp} pool tokens. Transaction hash: {hash}\n\nProviding liquidity is how markets in {section} are funded without a central market maker. {aside}",
                amount_a = argument_or(call, "amount_a", "some"),
                token_a = argument_or(call, "token_a", "tokens"),
                amount_b = argument_or(call, "amount_b", "some"),
                token_b = argument_or(call, "token_b", "tokens"),
                lp = field_or(result, "liquidityTokens", "your"),
                hash = field_or(result, "txHash", "unavailable"),
            )
        }
        Capability::ExplainTransaction => {
            let aside = if id == "wallets" {
                "Reading a transaction before and after you sign it is one of the best habits for keeping a wallet safe."
            } else {
                "Anyone can inspect a transaction like this, which is what makes DeFi activity transparent and auditable."
            };
            format!(
                "Transaction {hash} called {method} from {from} to {to} with value {value}. Status: {status}. {summary}\n\nIn {section}, every action leaves a public record like this one. {aside}",
                hash = field_or(result, "hash", &argument_or(call, "transaction_hash", "unknown")),
                method = field_or(result, "method", "an unknown method"),
                from = field_or(result, "from", "an unknown sender"),
                to = field_or(result, "to", "an unknown recipient"),
                value = field_or(result, "value", "0"),
                status = field_or(result, "status", "unknown"),
                summary = field_or(result, "summary", ""),
            )
        }
        Capability::EstimateGas => {
            let aside = if id == "dex" {
                "On DEXs, comparing this fee with the trade size tells you whether a small swap is worth it."
            } else {
                "Estimating gas before sending helps you avoid failed transactions and unexpected fees."
            };
            format!(
                "This transaction would use about {limit} gas at {price} {unit}, costing roughly {fee}.\n\nGas estimates matter in {section} because every on-chain step costs a fee. {aside}",
                limit = field_or(result, "gasLimit", "an unknown amount of"),
                price = field_or(result, "gasPrice", "the current"),
                unit = field_or(result, "unit", "gwei"),
                fee = field_or(result, "estimatedFee", "an unknown amount"),
            )
        }
    }
}

fn generic(name: &str, result: &Value, section: &str) -> String {
    let rendered = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    format!(
        "Function {name} executed successfully: {rendered}\n\nThis information is relevant to {section} because it provides data that can help you make more informed decisions in the DeFi ecosystem."
    )
}

/// Explanation for a call the executor could not complete. The call stays
/// approved, so the learner can approve it again to retry.
pub fn failure_explanation(call: &FunctionCall, reason: &str, topic: &Topic) -> String {
    format!(
        "I couldn't complete {name}: {reason}. Nothing was changed on-chain, and you can approve the call again to retry.\n\nFailures like this are common in {section}; checking inputs and network conditions before resubmitting is part of using DeFi safely.",
        name = call.name(),
        section = topic.name,
    )
}
