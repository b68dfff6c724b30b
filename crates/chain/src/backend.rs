use async_trait::async_trait;

use crate::error::BackendError;
use crate::requests::{
    AddLiquidityArgs, EstimateGasArgs, ExplainTransactionArgs, GasPriceArgs, SendTokenArgs,
    SwapTokensArgs, TokenBalanceArgs, TokenPriceArgs,
};
use crate::results::{
    GasEstimate, GasPrice, LiquidityReceipt, SwapReceipt, TokenBalance, TokenPrice,
    TransactionExplanation, TransferReceipt,
};

/// The external capability interface: whatever actually talks to the chain
/// (wallet provider, RPC node, price oracle).
#[async_trait]
pub trait ChainBackend: Send + Sync {
    async fn token_balance(&self, args: &TokenBalanceArgs) -> Result<TokenBalance, BackendError>;

    async fn token_price(&self, args: &TokenPriceArgs) -> Result<TokenPrice, BackendError>;

    async fn gas_price(&self, args: &GasPriceArgs) -> Result<GasPrice, BackendError>;

    async fn send_token(&self, args: &SendTokenArgs) -> Result<TransferReceipt, BackendError>;

    async fn swap_tokens(&self, args: &SwapTokensArgs) -> Result<SwapReceipt, BackendError>;

    async fn add_liquidity(&self, args: &AddLiquidityArgs)
        -> Result<LiquidityReceipt, BackendError>;

    async fn explain_transaction(
        &self,
        args: &ExplainTransactionArgs,
    ) -> Result<TransactionExplanation, BackendError>;

    async fn estimate_gas(&self, args: &EstimateGasArgs) -> Result<GasEstimate, BackendError>;
}
