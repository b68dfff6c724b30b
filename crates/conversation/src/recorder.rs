use chain_tools::CapabilityResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tutor_core::FunctionCall;

/// Wallet and chain the conversation acts for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub wallet_address: Option<String>,
    pub chain_id: u64,
}

/// What the transaction list receives for every capability that produced an
/// on-chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub chain_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub method: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub description: String,
}

impl TransactionRecord {
    /// `None` unless the result carries a transaction hash.
    pub fn from_execution(
        call: &FunctionCall,
        result: &CapabilityResult,
        context: &SessionContext,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        let hash = result.transaction_hash()?.to_string();
        let amount = call.argument_str("amount");
        let unit = if call.argument_str("token_address").as_deref() == Some("native") {
            "BNB"
        } else {
            "tokens"
        };

        Some(Self {
            hash,
            from: context.wallet_address.clone().unwrap_or_default(),
            to: call.argument_str("to_address").unwrap_or_default(),
            value: amount.clone().unwrap_or_else(|| "0".to_string()),
            chain_id: context.chain_id.to_string(),
            kind: call.name().to_string(),
            status: result.status().unwrap_or("confirmed").to_string(),
            method: call.name().to_string(),
            timestamp: at.timestamp_millis(),
            description: format!(
                "{} - {} {unit}",
                call.name(),
                amount.unwrap_or_default()
            ),
        })
    }
}

/// Sink for transaction records. Deduplication is up to the implementation.
pub trait TransactionRecorder: Send + Sync {
    fn append(&self, record: TransactionRecord);
}

/// In-memory recorder shared by the front-ends.
#[derive(Debug, Default)]
pub struct TransactionLedger {
    records: Mutex<Vec<TransactionRecord>>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TransactionRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Newest first.
    pub fn records(&self) -> Vec<TransactionRecord> {
        self.lock().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl TransactionRecorder for TransactionLedger {
    fn append(&self, record: TransactionRecord) {
        self.lock().push(record);
    }
}
