use chain_tools::NATIVE_SYMBOL;
use llm_gateway::{truncate_for_log, ChatModel, ChatRequest, NO_VALID_RESPONSE};
use serde_json::Value;
use tracing::{info, instrument, warn};
use tutor_core::{Capability, FunctionCall, Message};

use crate::fallback::fallback_explanation;
use crate::prompt::interpretation_prompt;
use crate::topic::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub text: String,
    pub source: Source,
}

/// A reply is usable when it has content and is not the local model's
/// placeholder.
pub fn usable_reply(text: &str) -> bool {
    !text.trim().is_empty() && !text.contains(NO_VALID_RESPONSE)
}

/// The result as the model sees it: the stored result plus the call arguments
/// that say what it is about. Keys already present in the result win.
pub fn function_payload(call: &FunctionCall, result: &Value) -> Value {
    let Value::Object(fields) = result else {
        return result.clone();
    };
    let capability = Capability::from_name(call.name());
    let context: &[(&str, &str)] = match capability {
        Some(Capability::GetTokenBalance) => &[("wallet_address", "wallet_address")],
        Some(Capability::GetTokenPrice) => &[("token_symbol", "token_symbol")],
        Some(Capability::GetGasPrice) => &[("chain", "chain")],
        Some(Capability::SendToken) => &[("amount", "amount"), ("to_address", "to_address")],
        Some(Capability::SwapTokens) => &[
            ("amountIn", "amount_in"),
            ("tokenIn", "token_in"),
            ("tokenOut", "token_out"),
        ],
        Some(Capability::AddLiquidity) => &[
            ("tokenA", "token_a"),
            ("tokenB", "token_b"),
            ("amountA", "amount_a"),
            ("amountB", "amount_b"),
        ],
        Some(Capability::ExplainTransaction) => &[("chainId", "chain_id")],
        Some(Capability::EstimateGas) => &[("from", "from_address"), ("to", "to_address")],
        None => &[],
    };

    let mut fields = fields.clone();
    for (key, argument) in context {
        if let Some(value) = call.argument_str(argument) {
            fields.entry(*key).or_insert(Value::String(value));
        }
    }
    if capability == Some(Capability::SendToken) {
        let token = match call.argument_str("token_address") {
            Some(address) if address == "native" => NATIVE_SYMBOL.to_string(),
            Some(address) => address,
            None => "TOKEN".to_string(),
        };
        fields.entry("token").or_insert(Value::String(token));
    }
    Value::Object(fields)
}

/// The turn sent to the model: an instruction, then the result as a
/// `function` message.
pub fn interpretation_request(call: &FunctionCall, result_content: &str, topic: &Topic) -> ChatRequest {
    ChatRequest::new(vec![
        Message::system(interpretation_prompt(topic, call.name())),
        Message::function(call.name(), result_content),
    ])
}

/// Explains an executed call's result. Falls back to a fixed template when
/// the model errors or has nothing usable to say, so this always yields text.
#[instrument(skip_all, fields(call_id = %call.id(), function = %call.name(), model = model.label()))]
pub async fn interpret(
    model: &dyn ChatModel,
    call: &FunctionCall,
    result: &Value,
    topic: &Topic,
) -> Interpretation {
    let content = result.to_string();
    let request = interpretation_request(call, &content, topic);

    match model.complete(&request).await {
        Ok(text) if usable_reply(&text) => {
            info!(reply = %truncate_for_log(&text, 120), "model interpreted result");
            Interpretation {
                text,
                source: Source::Model,
            }
        }
        Ok(text) => {
            warn!(reply = %truncate_for_log(&text, 120), "unusable interpretation, using fallback");
            fallback(call, result, topic)
        }
        Err(error) => {
            warn!(%error, "interpretation failed, using fallback");
            fallback(call, result, topic)
        }
    }
}

fn fallback(call: &FunctionCall, result: &Value, topic: &Topic) -> Interpretation {
    Interpretation {
        text: fallback_explanation(call, result, topic),
        source: Source::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llm_gateway::{ModelError, UnavailableModel};
    use serde_json::json;
    use std::sync::Mutex;
    use tutor_core::{Arguments, FunctionCallRegistry, Role};

    struct Canned {
        reply: Result<String, ModelError>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatModel for Canned {
        fn label(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
            self.seen.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn canned(reply: Result<String, ModelError>) -> Canned {
        Canned {
            reply,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn gas_call() -> FunctionCall {
        let mut arguments = Arguments::new();
        arguments.insert("chain".into(), json!("ethereum"));
        FunctionCallRegistry::new().enqueue("get_gas_price", arguments).clone()
    }

    #[tokio::test]
    async fn model_reply_is_used_verbatim() {
        let model = canned(Ok("Gas is cheap right now.".into()));
        let result = json!({"price": "20", "unit": "gwei"});
        let interpretation = interpret(&model, &gas_call(), &result, &Topic::general()).await;

        assert_eq!(interpretation.source, Source::Model);
        assert_eq!(interpretation.text, "Gas is cheap right now.");

        let seen = model.seen.lock().unwrap();
        let messages = &seen[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::Function);
        assert_eq!(messages[1].name.as_deref(), Some("get_gas_price"));
        assert_eq!(messages[1].content, r#"{"price":"20","unit":"gwei"}"#);
    }

    #[test]
    fn payload_names_what_the_result_is_about() {
        let mut arguments = Arguments::new();
        arguments.insert("token_symbol".into(), json!("ETH"));
        let call = FunctionCallRegistry::new().enqueue("get_token_price", arguments).clone();

        let payload = function_payload(&call, &json!({"price": "3500", "currency": "USD"}));
        assert_eq!(
            payload,
            json!({"price": "3500", "currency": "USD", "token_symbol": "ETH"})
        );
    }

    #[test]
    fn payload_describes_native_transfers() {
        let mut arguments = Arguments::new();
        arguments.insert("token_address".into(), json!("native"));
        arguments.insert("to_address".into(), json!("0xfriend"));
        arguments.insert("amount".into(), json!(1.5));
        let call = FunctionCallRegistry::new().enqueue("send_token", arguments).clone();

        let payload = function_payload(&call, &json!({"txHash": "0xabc", "status": "confirmed"}));
        assert_eq!(
            payload,
            json!({
                "txHash": "0xabc",
                "status": "confirmed",
                "amount": "1.5",
                "token": "BNB",
                "to_address": "0xfriend",
            })
        );
    }

    #[test]
    fn payload_keeps_result_fields_and_unknown_calls() {
        let result = json!({"price": "20", "unit": "gwei", "chain": "bsc"});
        assert_eq!(function_payload(&gas_call(), &result)["chain"], "bsc");

        let unknown = FunctionCallRegistry::new().enqueue("mint_nft", Arguments::new()).clone();
        assert_eq!(function_payload(&unknown, &json!({"tokenId": 7})), json!({"tokenId": 7}));
        assert_eq!(function_payload(&gas_call(), &json!("plain")), json!("plain"));
    }

    #[tokio::test]
    async fn unavailable_model_falls_back() {
        let model = UnavailableModel::new("test");
        let result = json!({"price": "20", "unit": "gwei"});
        let interpretation = interpret(&model, &gas_call(), &result, &Topic::general()).await;

        assert_eq!(interpretation.source, Source::Fallback);
        assert!(interpretation.text.contains("20"));
        assert!(interpretation.text.contains("gwei"));
    }

    #[tokio::test]
    async fn placeholder_and_blank_replies_fall_back() {
        for reply in [NO_VALID_RESPONSE.to_string(), "   ".to_string()] {
            let model = canned(Ok(reply));
            let result = json!({"price": "20", "unit": "gwei"});
            let interpretation = interpret(&model, &gas_call(), &result, &Topic::general()).await;
            assert_eq!(interpretation.source, Source::Fallback);
        }
    }
}
