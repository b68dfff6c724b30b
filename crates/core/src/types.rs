use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Capability arguments as emitted by the model.
pub type Arguments = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Executed)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
        };
        f.write_str(label)
    }
}

/// One requested capability invocation and where it is in its lifecycle.
///
/// Status and result are only changed through the registry, which keeps
/// `result` present exactly when the call is executed.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    id: CallId,
    name: String,
    arguments: Arguments,
    status: CallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

impl FunctionCall {
    pub(crate) fn new(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: CallId::generate(),
            name: name.into(),
            arguments,
            status: CallStatus::Pending,
            result: None,
            created_at: Utc::now(),
            last_error: None,
        }
    }

    pub fn id(&self) -> &CallId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// String view of an argument; numbers and booleans are rendered as text.
    pub fn argument_str(&self, key: &str) -> Option<String> {
        match self.arguments.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub(crate) fn apply_status(&mut self, status: CallStatus, result: Option<Value>) {
        self.status = status;
        self.result = result;
        if status == CallStatus::Executed {
            self.last_error = None;
        }
    }

    pub(crate) fn apply_failure(&mut self, error: String) {
        self.last_error = Some(error);
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Function,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Function => "function",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Only set on `function` messages: the capability whose result they carry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: content.into(),
            name: Some(name.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn function_messages_carry_a_name_and_others_do_not() {
        let function = Message::function("get_gas_price", r#"{"price":"20"}"#);
        assert_eq!(function.role, Role::Function);
        assert_eq!(function.name.as_deref(), Some("get_gas_price"));

        let user = Message::user("hi");
        assert!(user.name.is_none());
        let encoded = serde_json::to_value(&user).unwrap();
        assert_eq!(encoded, json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn argument_str_renders_numbers() {
        let mut arguments = Arguments::new();
        arguments.insert("amount".into(), json!(1.5));
        arguments.insert("to_address".into(), json!("0xabc"));
        arguments.insert("memo".into(), Value::Null);
        let call = FunctionCall::new("send_token", arguments);

        assert_eq!(call.argument_str("amount").as_deref(), Some("1.5"));
        assert_eq!(call.argument_str("to_address").as_deref(), Some("0xabc"));
        assert_eq!(call.argument_str("memo"), None);
        assert_eq!(call.status(), CallStatus::Pending);
        assert!(call.result().is_none());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = FunctionCall::new("get_gas_price", Arguments::new());
        let b = FunctionCall::new("get_gas_price", Arguments::new());
        assert_ne!(a.id(), b.id());
    }
}
