//! Append-only store of function calls and their approval state machine.
//!
//! ```text
//! pending  --approve--> approved
//! pending  --reject---> rejected   (terminal)
//! approved --execute--> executed   (terminal)
//! ```
//!
//! An executor failure is not a transition: the call stays `approved` and the
//! failure text is kept on the record for display.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capability::{classify, EffectClass};
use crate::types::{Arguments, CallId, CallStatus, FunctionCall};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown function call {0}")]
    UnknownCall(CallId),
    #[error("function call {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: CallId,
        from: CallStatus,
        to: CallStatus,
    },
    #[error("function call {0} cannot be marked executed without a result")]
    MissingResult(CallId),
    #[error("function call {id} only carries a result when executed, not {status}")]
    UnexpectedResult { id: CallId, status: CallStatus },
}

#[derive(Debug, Default, Clone)]
pub struct FunctionCallRegistry {
    calls: Vec<FunctionCall>,
    index: HashMap<CallId, usize>,
}

impl FunctionCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new call as `pending`, approving it straight away when the
    /// capability is read-only.
    pub fn enqueue(&mut self, name: impl Into<String>, arguments: Arguments) -> &FunctionCall {
        let mut call = FunctionCall::new(name, arguments);
        let effect = classify(call.name());
        if effect == EffectClass::ReadOnly {
            call.apply_status(CallStatus::Approved, None);
        }

        info!(
            call_id = %call.id(),
            function = %call.name(),
            ?effect,
            status = %call.status(),
            "function call enqueued"
        );

        let position = self.calls.len();
        self.index.insert(call.id().clone(), position);
        self.calls.push(call);
        &self.calls[position]
    }

    pub fn set_status(
        &mut self,
        id: &CallId,
        status: CallStatus,
        result: Option<Value>,
    ) -> Result<&FunctionCall, RegistryError> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| RegistryError::UnknownCall(id.clone()))?;
        let call = &mut self.calls[position];
        let from = call.status();

        if !is_allowed(from, status) {
            warn!(call_id = %id, %from, to = %status, "refused illegal status transition");
            return Err(RegistryError::IllegalTransition {
                id: id.clone(),
                from,
                to: status,
            });
        }

        match (status, result.is_some()) {
            (CallStatus::Executed, false) => return Err(RegistryError::MissingResult(id.clone())),
            (CallStatus::Executed, true) => {}
            (_, true) => {
                return Err(RegistryError::UnexpectedResult {
                    id: id.clone(),
                    status,
                })
            }
            (_, false) => {}
        }

        call.apply_status(status, result);
        debug!(call_id = %id, %from, to = %status, "function call status changed");
        Ok(&*call)
    }

    /// Keeps the latest executor failure on an approved call without moving it.
    pub fn record_failure(
        &mut self,
        id: &CallId,
        error: impl Into<String>,
    ) -> Result<&FunctionCall, RegistryError> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| RegistryError::UnknownCall(id.clone()))?;
        let call = &mut self.calls[position];
        if call.status() != CallStatus::Approved {
            return Err(RegistryError::IllegalTransition {
                id: id.clone(),
                from: call.status(),
                to: CallStatus::Approved,
            });
        }
        call.apply_failure(error.into());
        Ok(&*call)
    }

    pub fn get(&self, id: &CallId) -> Option<&FunctionCall> {
        self.index.get(id).map(|&position| &self.calls[position])
    }

    /// All calls in creation order.
    pub fn calls(&self) -> &[FunctionCall] {
        &self.calls
    }

    pub fn awaiting_approval(&self) -> impl Iterator<Item = &FunctionCall> {
        self.calls
            .iter()
            .filter(|call| call.status() == CallStatus::Pending)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Drops every record. Only the conversation reset calls this.
    pub fn clear(&mut self) {
        self.calls.clear();
        self.index.clear();
    }
}

fn is_allowed(from: CallStatus, to: CallStatus) -> bool {
    matches!(
        (from, to),
        (CallStatus::Pending, CallStatus::Approved)
            | (CallStatus::Pending, CallStatus::Rejected)
            | (CallStatus::Approved, CallStatus::Executed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn args(pairs: &[(&str, &str)]) -> Arguments {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn read_only_calls_are_approved_on_enqueue() {
        let mut registry = FunctionCallRegistry::new();
        let call = registry.enqueue("get_token_price", args(&[("token_symbol", "ETH")]));
        assert_eq!(call.status(), CallStatus::Approved);
    }

    #[test]
    fn mutating_calls_wait_for_a_human() {
        let mut registry = FunctionCallRegistry::new();
        let id = registry
            .enqueue(
                "send_token",
                args(&[("token_address", "native"), ("to_address", "0xabc"), ("amount", "1")]),
            )
            .id()
            .clone();
        assert_eq!(registry.get(&id).unwrap().status(), CallStatus::Pending);
        assert_eq!(registry.awaiting_approval().count(), 1);

        registry.set_status(&id, CallStatus::Approved, None).unwrap();
        assert_eq!(registry.get(&id).unwrap().status(), CallStatus::Approved);
        assert_eq!(registry.awaiting_approval().count(), 0);
    }

    #[test]
    fn unknown_capabilities_are_not_auto_approved() {
        let mut registry = FunctionCallRegistry::new();
        let call = registry.enqueue("bridge_everything", Arguments::new());
        assert_eq!(call.status(), CallStatus::Pending);
    }

    #[test]
    fn executed_requires_a_result() {
        let mut registry = FunctionCallRegistry::new();
        let id = registry.enqueue("get_gas_price", Arguments::new()).id().clone();

        let err = registry.set_status(&id, CallStatus::Executed, None).unwrap_err();
        assert_eq!(err, RegistryError::MissingResult(id.clone()));
        assert_eq!(registry.get(&id).unwrap().status(), CallStatus::Approved);

        let call = registry
            .set_status(&id, CallStatus::Executed, Some(json!({"price": "20", "unit": "gwei"})))
            .unwrap();
        assert_eq!(call.status(), CallStatus::Executed);
        assert_eq!(call.result(), Some(&json!({"price": "20", "unit": "gwei"})));
    }

    #[test]
    fn results_are_refused_outside_execution() {
        let mut registry = FunctionCallRegistry::new();
        let id = registry.enqueue("swap_tokens", Arguments::new()).id().clone();
        let err = registry
            .set_status(&id, CallStatus::Approved, Some(json!({})))
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnexpectedResult { .. }));
        assert_eq!(registry.get(&id).unwrap().status(), CallStatus::Pending);
    }

    #[test]
    fn terminal_states_refuse_every_transition() {
        let mut registry = FunctionCallRegistry::new();
        let rejected = registry.enqueue("send_token", Arguments::new()).id().clone();
        registry.set_status(&rejected, CallStatus::Rejected, None).unwrap();

        let executed = registry.enqueue("get_gas_price", Arguments::new()).id().clone();
        registry
            .set_status(&executed, CallStatus::Executed, Some(json!({"price": "1"})))
            .unwrap();

        for id in [&rejected, &executed] {
            let before = registry.get(id).unwrap().clone();
            for status in [
                CallStatus::Pending,
                CallStatus::Approved,
                CallStatus::Rejected,
                CallStatus::Executed,
            ] {
                let result = (status == CallStatus::Executed).then(|| json!({"x": 1}));
                assert!(registry.set_status(id, status, result).is_err());
            }
            assert_eq!(registry.get(id).unwrap(), &before);
        }
    }

    #[test]
    fn approved_calls_cannot_be_rejected() {
        let mut registry = FunctionCallRegistry::new();
        let id = registry.enqueue("get_gas_price", Arguments::new()).id().clone();
        let err = registry.set_status(&id, CallStatus::Rejected, None).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::IllegalTransition {
                from: CallStatus::Approved,
                to: CallStatus::Rejected,
                ..
            }
        ));
    }

    #[test]
    fn failures_keep_the_call_approved() {
        let mut registry = FunctionCallRegistry::new();
        let id = registry.enqueue("get_gas_price", Arguments::new()).id().clone();
        let call = registry.record_failure(&id, "rpc unreachable").unwrap();
        assert_eq!(call.status(), CallStatus::Approved);
        assert_eq!(call.last_error(), Some("rpc unreachable"));

        let pending = registry.enqueue("send_token", Arguments::new()).id().clone();
        assert!(registry.record_failure(&pending, "nope").is_err());
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut registry = FunctionCallRegistry::new();
        let missing = CallId::from("missing");
        assert_eq!(
            registry.set_status(&missing, CallStatus::Approved, None).unwrap_err(),
            RegistryError::UnknownCall(missing)
        );
    }

    #[test]
    fn clear_empties_the_registry() {
        let mut registry = FunctionCallRegistry::new();
        let id = registry.enqueue("get_gas_price", Arguments::new()).id().clone();
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get(&id).is_none());
    }

    const NAMES: [&str; 4] = ["get_gas_price", "send_token", "swap_tokens", "mystery"];

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(usize),
        Set { target: usize, status: CallStatus, with_result: bool },
        Fail(usize),
    }

    fn status_strategy() -> impl Strategy<Value = CallStatus> {
        prop_oneof![
            Just(CallStatus::Pending),
            Just(CallStatus::Approved),
            Just(CallStatus::Rejected),
            Just(CallStatus::Executed),
        ]
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..NAMES.len()).prop_map(Op::Enqueue),
            (0..8usize, status_strategy(), any::<bool>()).prop_map(|(target, status, with_result)| {
                Op::Set { target, status, with_result }
            }),
            (0..8usize).prop_map(Op::Fail),
        ]
    }

    fn rank(status: CallStatus) -> u8 {
        match status {
            CallStatus::Pending => 0,
            CallStatus::Approved => 1,
            CallStatus::Rejected | CallStatus::Executed => 2,
        }
    }

    proptest! {
        #[test]
        fn state_machine_invariants_hold(ops in proptest::collection::vec(op_strategy(), 1..40)) {
            let mut registry = FunctionCallRegistry::new();
            let mut ids: Vec<CallId> = Vec::new();

            for op in ops {
                let before: Vec<FunctionCall> = registry.calls().to_vec();
                match op {
                    Op::Enqueue(name) => {
                        let id = registry.enqueue(NAMES[name], Arguments::new()).id().clone();
                        prop_assert!(!ids.contains(&id));
                        ids.push(id);
                    }
                    Op::Set { target, status, with_result } => {
                        if ids.is_empty() { continue; }
                        let id = ids[target % ids.len()].clone();
                        let from = registry.get(&id).unwrap().status();
                        let result = with_result.then(|| serde_json::json!({"ok": true}));
                        let outcome = registry.set_status(&id, status, result);
                        if from.is_terminal() {
                            prop_assert!(outcome.is_err());
                        }
                        if outcome.is_err() {
                            prop_assert_eq!(registry.calls(), before.as_slice());
                        }
                    }
                    Op::Fail(target) => {
                        if ids.is_empty() { continue; }
                        let id = ids[target % ids.len()].clone();
                        let _ = registry.record_failure(&id, "boom");
                        prop_assert_eq!(
                            registry.get(&id).unwrap().status(),
                            before.iter().find(|c| c.id() == &id).unwrap().status()
                        );
                    }
                }

                for call in registry.calls() {
                    prop_assert_eq!(call.result().is_some(), call.status() == CallStatus::Executed);
                    if let Some(old) = before.iter().find(|c| c.id() == call.id()) {
                        prop_assert!(rank(call.status()) >= rank(old.status()));
                    }
                }
                prop_assert!(registry.len() >= before.len());
            }
        }
    }
}
