use chain_tools::catalog::prompt_summary;

use crate::topic::Topic;

/// System prompt for ordinary chat turns.
pub fn tutor_prompt(topic: &Topic, wallet: Option<&str>) -> String {
    let mut prompt = format!(
        "You are a helpful Web3 educator specializing in DeFi topics. You're currently teaching about {name}.
Provide clear, educational responses that help users understand {name} concepts.
{context}

When explaining concepts:
- Use simple language and avoid jargon when possible
- Provide real-world examples
- Explain risks and benefits
- Mention relevant protocols or projects

When you receive function results, interpret them and respond in a natural, conversational way that incorporates the data and relates it back to the {name} concepts being taught.

If the user asks about blockchain data or operations that require Web3 functions, inform them that you'll use functions to help answer their question.

If you need to call a Web3 function, include [FUNCTION_CALL:function_name] in your response, directly followed by a JSON object with its arguments, for example [FUNCTION_CALL:get_gas_price] {{\"chain\": \"ethereum\"}}. Call at most one function per reply. Available functions:
{tools}",
        name = topic.name,
        context = topic.context_line(),
        tools = prompt_summary(),
    );

    if let Some(wallet) = wallet {
        prompt.push_str(&format!("\n\nThe learner's connected wallet address is {wallet}."));
    }
    prompt
}

/// System prompt asking the model to explain one capability result.
pub fn interpretation_prompt(topic: &Topic, function: &str) -> String {
    format!(
        "You are a helpful Web3 educator specializing in {name} topics.

You've just received the result of a {function} function call. Interpret this data and explain it to the user in the context of {name}.

{context}

Respond in a natural, conversational way that:
1. Explains what the data means in plain language
2. Relates it back to the {name} concepts being taught
3. Provides educational context about why this information is important

Be concise but informative. Don't just repeat the raw data - explain its significance in the context of the current lesson.",
        name = topic.name,
        context = topic.context_line(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tutor_prompt_lists_the_marker_and_tools() {
        let prompt = tutor_prompt(&Topic::general(), None);
        assert!(prompt.contains("[FUNCTION_CALL:function_name]"));
        assert!(prompt.contains("{\"chain\": \"ethereum\"}"));
        assert!(prompt.contains("- estimate_gas(from_address, to_address, data, value)"));
        assert!(!prompt.contains("wallet address is"));
    }

    #[test]
    fn wallet_is_mentioned_when_connected() {
        let prompt = tutor_prompt(&Topic::general(), Some("0xabc"));
        assert!(prompt.ends_with("The learner's connected wallet address is 0xabc."));
    }

    #[test]
    fn interpretation_prompt_names_function_and_topic() {
        let topic = Topic::find("dex").unwrap();
        let prompt = interpretation_prompt(&topic, "swap_tokens");
        assert!(prompt.contains("result of a swap_tokens function call"));
        assert!(prompt.contains("in the context of Decentralized Exchanges"));
    }
}
