use serde::Serialize;
use tutor_core::{FunctionCall, FunctionCallRegistry, Message, Role};

use crate::topic::Topic;

/// Everything one conversation remembers. Messages and function calls are
/// one unit: they are only ever cleared together.
#[derive(Debug, Clone, Default)]
pub struct Session {
    topic: Topic,
    messages: Vec<Message>,
    registry: FunctionCallRegistry,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub topic: Topic,
    pub messages: Vec<Message>,
    pub calls: Vec<FunctionCall>,
    /// Model or capability work issued but not yet applied.
    pub busy: bool,
}

impl Session {
    pub fn new(topic: Topic) -> Self {
        Self {
            topic,
            ..Self::default()
        }
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn registry(&self) -> &FunctionCallRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionCallRegistry {
        &mut self.registry
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.registry.clear();
    }

    /// Starts over on a new topic with the topic's greeting.
    pub fn select_topic(&mut self, topic: Topic) {
        self.reset();
        self.messages.push(Message::assistant(topic.greeting()));
        self.topic = topic;
    }

    /// History for an ordinary chat turn: the system prompt, then every
    /// message except raw function results.
    pub fn turn_messages(&self, system_prompt: String) -> Vec<Message> {
        std::iter::once(Message::system(system_prompt))
            .chain(
                self.messages
                    .iter()
                    .filter(|message| message.role != Role::Function)
                    .cloned(),
            )
            .collect()
    }

    pub fn snapshot(&self, id: &str, busy: bool) -> SessionSnapshot {
        SessionSnapshot {
            id: id.to_string(),
            topic: self.topic.clone(),
            messages: self.messages.clone(),
            calls: self.registry.calls().to_vec(),
            busy,
        }
    }
}
