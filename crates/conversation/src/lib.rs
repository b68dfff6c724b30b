//! The tutoring conversation: prompt building, marker parsing, approval
//! flow, result interpretation and the actor that ties them together.

pub mod engine;
pub mod fallback;
pub mod interpreter;
pub mod parser;
pub mod prompt;
pub mod recorder;
pub mod session;
pub mod topic;

pub use engine::{Conversation, ConversationHandle, Dependencies, EngineError};
pub use interpreter::{interpret, Interpretation, Source};
pub use parser::{parse, Invocation, ParsedResponse};
pub use recorder::{SessionContext, TransactionLedger, TransactionRecord, TransactionRecorder};
pub use session::{Session, SessionSnapshot};
pub use topic::Topic;
