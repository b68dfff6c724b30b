use std::sync::Arc;
use tracing::{info, instrument, warn};
use tutor_core::{CallStatus, Capability, FunctionCall};

use crate::backend::ChainBackend;
use crate::error::ExecutionError;
use crate::requests::CapabilityRequest;
use crate::results::CapabilityResult;

/// Runs approved function calls against a [`ChainBackend`]. One attempt per
/// call; retrying is the caller's decision.
#[derive(Clone)]
pub struct Executor {
    backend: Arc<dyn ChainBackend>,
}

impl Executor {
    pub fn new(backend: Arc<dyn ChainBackend>) -> Self {
        Self { backend }
    }

    #[instrument(skip(self, call), fields(call_id = %call.id(), function = %call.name()))]
    pub async fn execute(&self, call: &FunctionCall) -> Result<CapabilityResult, ExecutionError> {
        if call.status() != CallStatus::Approved {
            return Err(ExecutionError::NotApproved(call.status()));
        }

        let capability = Capability::from_name(call.name())
            .ok_or_else(|| ExecutionError::UnknownCapability(call.name().to_string()))?;

        let request = CapabilityRequest::decode(capability, call.arguments()).map_err(|source| {
            ExecutionError::InvalidArguments {
                capability: capability.name(),
                source,
            }
        })?;

        info!(arguments = %serde_json::Value::Object(call.arguments().clone()), "dispatching capability");

        let outcome = self.dispatch(request).await;
        match &outcome {
            Ok(result) => info!(
                tx_hash = result.transaction_hash().unwrap_or("-"),
                "capability completed"
            ),
            Err(error) => warn!(%error, "capability failed"),
        }

        outcome.map_err(|source| ExecutionError::Backend {
            capability: capability.name(),
            source,
        })
    }

    async fn dispatch(
        &self,
        request: CapabilityRequest,
    ) -> Result<CapabilityResult, crate::error::BackendError> {
        let backend = self.backend.as_ref();
        Ok(match request {
            CapabilityRequest::TokenBalance(args) => {
                CapabilityResult::TokenBalance(backend.token_balance(&args).await?)
            }
            CapabilityRequest::TokenPrice(args) => {
                CapabilityResult::TokenPrice(backend.token_price(&args).await?)
            }
            CapabilityRequest::GasPrice(args) => {
                CapabilityResult::GasPrice(backend.gas_price(&args).await?)
            }
            CapabilityRequest::SendToken(args) => {
                CapabilityResult::Transfer(backend.send_token(&args).await?)
            }
            CapabilityRequest::SwapTokens(args) => {
                CapabilityResult::Swap(backend.swap_tokens(&args).await?)
            }
            CapabilityRequest::AddLiquidity(args) => {
                CapabilityResult::Liquidity(backend.add_liquidity(&args).await?)
            }
            CapabilityRequest::ExplainTransaction(args) => {
                CapabilityResult::Explanation(backend.explain_transaction(&args).await?)
            }
            CapabilityRequest::EstimateGas(args) => {
                CapabilityResult::GasEstimate(backend.estimate_gas(&args).await?)
            }
        })
    }
}
