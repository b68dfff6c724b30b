//! In-process chain used by the CLI, the API server and tests. Keeps balances
//! for a single wallet, prices from a fixed table and a log of the
//! transactions it has "mined" so they can be explained later.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::backend::ChainBackend;
use crate::error::BackendError;
use crate::requests::{
    AddLiquidityArgs, EstimateGasArgs, ExplainTransactionArgs, GasPriceArgs, SendTokenArgs,
    SwapTokensArgs, TokenBalanceArgs, TokenPriceArgs,
};
use crate::results::{
    GasEstimate, GasPrice, LiquidityReceipt, SwapReceipt, TokenBalance, TokenPrice,
    TransactionExplanation, TransferReceipt,
};

pub const NATIVE_SYMBOL: &str = "BNB";
const SWAP_FEE: f64 = 0.003;
const TRANSFER_GAS: u64 = 21_000;

const PRICES_USD: &[(&str, f64)] = &[
    ("BNB", 600.0),
    ("ETH", 3500.0),
    ("BTC", 65_000.0),
    ("USDT", 1.0),
    ("USDC", 1.0),
    ("CAKE", 2.5),
    ("UNI", 8.0),
];

const GAS_GWEI: &[(&str, &str)] = &[
    ("ethereum", "20"),
    ("bsc", "5"),
    ("binance", "5"),
    ("polygon", "30"),
    ("arbitrum", "0.1"),
];

const KNOWN_TOKENS: &[(&str, &str)] = &[
    ("0x55d398326f99059ff775485246999027b3197955", "USDT"),
    ("0x8ac76a51cc950d9822d68b83fe1ad97b32cd580d", "USDC"),
    ("0x0e09fabb73bd3ade0a17ecc321fd13a19e81ce82", "CAKE"),
    ("0x2170ed0880ac9a755fd29b2688956bd959f933f8", "ETH"),
];

#[derive(Default)]
struct Ledger {
    balances: HashMap<(String, &'static str), f64>,
    transactions: HashMap<String, TransactionExplanation>,
    nonce: u64,
}

pub struct SimulatedChain {
    wallet: String,
    ledger: Mutex<Ledger>,
}

impl SimulatedChain {
    /// A chain where `wallet` starts with a small demo portfolio.
    pub fn new(wallet: impl Into<String>) -> Self {
        let wallet = wallet.into().to_lowercase();
        let mut ledger = Ledger::default();
        for (symbol, amount) in [("BNB", 10.0), ("USDT", 1000.0), ("CAKE", 250.0), ("ETH", 2.0)] {
            ledger.balances.insert((wallet.clone(), symbol), amount);
        }
        Self {
            wallet,
            ledger: Mutex::new(ledger),
        }
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // a panic mid-update leaves plain numbers behind, still usable
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn balance_of(ledger: &Ledger, wallet: &str, symbol: &'static str) -> f64 {
        ledger
            .balances
            .get(&(wallet.to_string(), symbol))
            .copied()
            .unwrap_or(0.0)
    }

    fn debit(ledger: &mut Ledger, wallet: &str, symbol: &'static str, amount: f64) -> Result<(), BackendError> {
        let available = Self::balance_of(ledger, wallet, symbol);
        if available < amount {
            return Err(BackendError::Reverted(format!(
                "insufficient {symbol} balance: have {}, need {}",
                format_amount(available),
                format_amount(amount)
            )));
        }
        ledger
            .balances
            .insert((wallet.to_string(), symbol), available - amount);
        Ok(())
    }

    fn credit(ledger: &mut Ledger, wallet: &str, symbol: &'static str, amount: f64) {
        *ledger
            .balances
            .entry((wallet.to_string(), symbol))
            .or_insert(0.0) += amount;
    }

    fn mine(
        &self,
        ledger: &mut Ledger,
        to: &str,
        value: String,
        method: &str,
        summary: String,
    ) -> String {
        ledger.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(ledger.nonce.to_be_bytes());
        hasher.update(self.wallet.as_bytes());
        hasher.update(method.as_bytes());
        hasher.update(summary.as_bytes());
        let hash = format!("0x{}", hex(&hasher.finalize()));

        debug!(%hash, method, "mined simulated transaction");
        ledger.transactions.insert(
            hash.clone(),
            TransactionExplanation {
                hash: hash.clone(),
                from: self.wallet.clone(),
                to: to.to_string(),
                value,
                method: method.to_string(),
                status: "confirmed".to_string(),
                summary,
            },
        );
        hash
    }
}

#[async_trait]
impl ChainBackend for SimulatedChain {
    async fn token_balance(&self, args: &TokenBalanceArgs) -> Result<TokenBalance, BackendError> {
        let symbol = resolve_token(&args.token_address)?;
        let ledger = self.ledger();
        let balance = Self::balance_of(&ledger, &args.wallet_address.to_lowercase(), symbol);
        Ok(TokenBalance {
            balance: format_amount(balance),
            token: symbol.to_string(),
        })
    }

    async fn token_price(&self, args: &TokenPriceArgs) -> Result<TokenPrice, BackendError> {
        let symbol = args.token_symbol.to_uppercase();
        let price = price_of(&symbol)?;
        Ok(TokenPrice {
            price: format_amount(price),
            currency: "USD".to_string(),
        })
    }

    async fn gas_price(&self, args: &GasPriceArgs) -> Result<GasPrice, BackendError> {
        Ok(GasPrice {
            price: gas_gwei(&args.chain)?.to_string(),
            unit: "gwei".to_string(),
        })
    }

    async fn send_token(&self, args: &SendTokenArgs) -> Result<TransferReceipt, BackendError> {
        let symbol = resolve_token(&args.token_address)?;
        let amount = parse_amount("amount", &args.amount)?;
        let to = require_address("to_address", &args.to_address)?;

        let mut ledger = self.ledger();
        Self::debit(&mut ledger, &self.wallet, symbol, amount)?;
        Self::credit(&mut ledger, &to, symbol, amount);
        let summary = format!("Transfer of {} {symbol} to {to}", format_amount(amount));
        let tx_hash = self.mine(&mut ledger, &to, format_amount(amount), "send_token", summary);

        Ok(TransferReceipt {
            tx_hash,
            status: "confirmed".to_string(),
        })
    }

    async fn swap_tokens(&self, args: &SwapTokensArgs) -> Result<SwapReceipt, BackendError> {
        let token_in = resolve_token(&args.token_in)?;
        let token_out = resolve_token(&args.token_out)?;
        if token_in == token_out {
            return Err(BackendError::InvalidInput(format!(
                "cannot swap {token_in} for itself"
            )));
        }
        let amount_in = parse_amount("amount_in", &args.amount_in)?;
        let amount_out = amount_in * price_of(token_in)? / price_of(token_out)? * (1.0 - SWAP_FEE);

        let mut ledger = self.ledger();
        Self::debit(&mut ledger, &self.wallet, token_in, amount_in)?;
        let wallet = self.wallet.clone();
        Self::credit(&mut ledger, &wallet, token_out, amount_out);
        let summary = format!(
            "Swap of {} {token_in} for {} {token_out} through the simulated router",
            format_amount(amount_in),
            format_amount(amount_out)
        );
        let tx_hash = self.mine(&mut ledger, "router", format_amount(amount_in), "swap_tokens", summary);

        Ok(SwapReceipt {
            tx_hash,
            status: "confirmed".to_string(),
            amount_out: format_amount(amount_out),
        })
    }

    async fn add_liquidity(&self, args: &AddLiquidityArgs) -> Result<LiquidityReceipt, BackendError> {
        let token_a = resolve_token(&args.token_a)?;
        let token_b = resolve_token(&args.token_b)?;
        let amount_a = parse_amount("amount_a", &args.amount_a)?;
        let amount_b = parse_amount("amount_b", &args.amount_b)?;

        let mut ledger = self.ledger();
        // check both legs before touching either balance
        for (symbol, amount) in [(token_a, amount_a), (token_b, amount_b)] {
            let available = Self::balance_of(&ledger, &self.wallet, symbol);
            if available < amount {
                return Err(BackendError::Reverted(format!(
                    "insufficient {symbol} balance: have {}, need {}",
                    format_amount(available),
                    format_amount(amount)
                )));
            }
        }
        Self::debit(&mut ledger, &self.wallet, token_a, amount_a)?;
        Self::debit(&mut ledger, &self.wallet, token_b, amount_b)?;

        let liquidity = (amount_a * amount_b).sqrt();
        let summary = format!(
            "Deposit of {} {token_a} and {} {token_b} into the {token_a}/{token_b} pool",
            format_amount(amount_a),
            format_amount(amount_b)
        );
        let tx_hash = self.mine(&mut ledger, "pool", "0".to_string(), "add_liquidity", summary);

        Ok(LiquidityReceipt {
            tx_hash,
            status: "confirmed".to_string(),
            liquidity_tokens: format_amount(liquidity),
        })
    }

    async fn explain_transaction(
        &self,
        args: &ExplainTransactionArgs,
    ) -> Result<TransactionExplanation, BackendError> {
        let hash = args.transaction_hash.to_lowercase();
        let well_formed = hash.len() == 66
            && hash.starts_with("0x")
            && hash[2..].chars().all(|c| c.is_ascii_hexdigit());
        if !well_formed {
            return Err(BackendError::InvalidInput(format!(
                "{} is not a transaction hash",
                args.transaction_hash
            )));
        }

        self.ledger()
            .transactions
            .get(&hash)
            .cloned()
            .ok_or_else(|| {
                BackendError::NotFound(format!(
                    "transaction {hash} on chain {}",
                    args.chain_id
                ))
            })
    }

    async fn estimate_gas(&self, args: &EstimateGasArgs) -> Result<GasEstimate, BackendError> {
        require_address("from_address", &args.from_address)?;
        require_address("to_address", &args.to_address)?;
        let data = args.data.trim_start_matches("0x");
        if data.len() % 2 != 0 || !data.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BackendError::InvalidInput("data must be hex encoded".to_string()));
        }

        let calldata_gas: u64 = data
            .as_bytes()
            .chunks(2)
            .map(|byte| if byte == b"00" { 4 } else { 16 })
            .sum();
        let gas_limit = TRANSFER_GAS + calldata_gas;
        let gwei: f64 = gas_gwei("bsc")?.parse().unwrap_or(0.0);
        let fee = gas_limit as f64 * gwei / 1e9;

        Ok(GasEstimate {
            gas_limit: gas_limit.to_string(),
            gas_price: format_amount(gwei),
            unit: "gwei".to_string(),
            estimated_fee: format!("{} {NATIVE_SYMBOL}", format_amount(fee)),
        })
    }
}

fn resolve_token(token: &str) -> Result<&'static str, BackendError> {
    let lowered = token.trim().to_lowercase();
    if lowered == "native" || lowered == "0x0000000000000000000000000000000000000000" {
        return Ok(NATIVE_SYMBOL);
    }
    if let Some((_, symbol)) = KNOWN_TOKENS.iter().find(|(address, _)| *address == lowered) {
        return Ok(*symbol);
    }
    let upper = lowered.to_uppercase();
    PRICES_USD
        .iter()
        .find(|(symbol, _)| *symbol == upper)
        .map(|(symbol, _)| *symbol)
        .ok_or_else(|| BackendError::NotFound(format!("token {token}")))
}

fn price_of(symbol: &str) -> Result<f64, BackendError> {
    PRICES_USD
        .iter()
        .find(|(known, _)| *known == symbol)
        .map(|(_, price)| *price)
        .ok_or_else(|| BackendError::NotFound(format!("no price feed for {symbol}")))
}

fn gas_gwei(chain: &str) -> Result<&'static str, BackendError> {
    let chain = chain.trim().to_lowercase();
    GAS_GWEI
        .iter()
        .find(|(name, _)| *name == chain)
        .map(|(_, gwei)| *gwei)
        .ok_or_else(|| BackendError::Unsupported(format!("chain {chain}")))
}

fn parse_amount(key: &str, raw: &str) -> Result<f64, BackendError> {
    match raw.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount > 0.0 => Ok(amount),
        _ => Err(BackendError::InvalidInput(format!(
            "{key} must be a positive number, got {raw:?}"
        ))),
    }
}

fn require_address(key: &str, raw: &str) -> Result<String, BackendError> {
    let address = raw.trim().to_lowercase();
    if address.starts_with("0x") && address.len() > 2 && address[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(address)
    } else {
        Err(BackendError::InvalidInput(format!("{key} {raw:?} is not an address")))
    }
}

/// Up to six decimals, trailing zeros removed.
fn format_amount(value: f64) -> String {
    let text = format!("{value:.6}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() || text == "-" {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WALLET: &str = "0xAbC0000000000000000000000000000000000001";
    const FRIEND: &str = "0x2222222222222222222222222222222222222222";

    fn chain() -> SimulatedChain {
        SimulatedChain::new(WALLET)
    }

    #[test]
    fn amounts_are_trimmed() {
        assert_eq!(format_amount(10.0), "10");
        assert_eq!(format_amount(0.5), "0.5");
        assert_eq!(format_amount(1.0 / 3.0), "0.333333");
        assert_eq!(format_amount(0.0), "0");
    }

    #[tokio::test]
    async fn native_balance_of_the_demo_wallet() {
        let balance = chain()
            .token_balance(&TokenBalanceArgs {
                token_address: "native".into(),
                wallet_address: WALLET.into(),
            })
            .await
            .unwrap();
        assert_eq!(balance, TokenBalance { balance: "10".into(), token: "BNB".into() });
    }

    #[tokio::test]
    async fn transfer_moves_funds_and_can_be_explained() {
        let chain = chain();
        let receipt = chain
            .send_token(&SendTokenArgs {
                token_address: "native".into(),
                to_address: FRIEND.into(),
                amount: "2.5".into(),
            })
            .await
            .unwrap();
        assert_eq!(receipt.status, "confirmed");
        assert_eq!(receipt.tx_hash.len(), 66);

        let friend = chain
            .token_balance(&TokenBalanceArgs {
                token_address: "BNB".into(),
                wallet_address: FRIEND.into(),
            })
            .await
            .unwrap();
        assert_eq!(friend.balance, "2.5");

        let explanation = chain
            .explain_transaction(&ExplainTransactionArgs {
                transaction_hash: receipt.tx_hash.clone(),
                chain_id: "56".into(),
            })
            .await
            .unwrap();
        assert_eq!(explanation.method, "send_token");
        assert_eq!(explanation.to, FRIEND.to_lowercase());
    }

    #[tokio::test]
    async fn overspending_reverts() {
        let err = chain()
            .send_token(&SendTokenArgs {
                token_address: "native".into(),
                to_address: FRIEND.into(),
                amount: "11".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Reverted(_)));
    }

    #[tokio::test]
    async fn swap_applies_price_ratio_and_fee() {
        let receipt = chain()
            .swap_tokens(&SwapTokensArgs {
                token_in: "BNB".into(),
                token_out: "USDT".into(),
                amount_in: "1".into(),
            })
            .await
            .unwrap();
        assert_eq!(receipt.amount_out, "598.2");
    }

    #[tokio::test]
    async fn failed_liquidity_leaves_balances_alone() {
        let chain = chain();
        let err = chain
            .add_liquidity(&AddLiquidityArgs {
                token_a: "CAKE".into(),
                token_b: "BNB".into(),
                amount_a: "100".into(),
                amount_b: "50".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Reverted(_)));

        let cake = chain
            .token_balance(&TokenBalanceArgs {
                token_address: "CAKE".into(),
                wallet_address: WALLET.into(),
            })
            .await
            .unwrap();
        assert_eq!(cake.balance, "250");
    }

    #[tokio::test]
    async fn unknown_hash_is_not_found() {
        let err = chain()
            .explain_transaction(&ExplainTransactionArgs {
                transaction_hash: format!("0x{}", "ab".repeat(32)),
                chain_id: "1".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn plain_transfer_estimate() {
        let estimate = chain()
            .estimate_gas(&EstimateGasArgs {
                from_address: WALLET.into(),
                to_address: FRIEND.into(),
                data: "0x".into(),
                value: "1000".into(),
            })
            .await
            .unwrap();
        assert_eq!(estimate.gas_limit, "21000");
        assert_eq!(estimate.estimated_fee, "0.000105 BNB");
    }
}
