//! The conversation actor.
//!
//! Each conversation runs as one tokio task that owns its [`Session`]. All
//! mutations happen on that task, one command or completion at a time.
//! Model and capability calls run on their own tasks.
//!
//! Work is grouped into turns. A user message opens a turn for the model
//! reply, and an approval opens one for the execution. Automatic follow-ups
//! (an auto-approved call, then the interpretation of its result) stay in the
//! turn that caused them. Each turn has at most one step in flight, and
//! completions of a later turn are held back until every earlier turn has no
//! step left, so turn N is fully applied before anything from turn N+1. A
//! turn that stops at a call awaiting approval is finished. A reset starts a
//! new generation and drops late completions from the old one.

use chain_tools::{CapabilityResult, ExecutionError, Executor};
use chrono::Utc;
use llm_gateway::{ChatModel, ChatRequest, ModelError};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use tutor_core::{CallId, CallStatus, FunctionCall, Message, RegistryError};
use uuid::Uuid;

use crate::fallback::failure_explanation;
use crate::interpreter::{function_payload, interpret, usable_reply, Interpretation, Source};
use crate::parser::parse;
use crate::prompt::tutor_prompt;
use crate::recorder::{SessionContext, TransactionRecord, TransactionRecorder};
use crate::session::{Session, SessionSnapshot};
use crate::topic::Topic;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("conversation has shut down")]
    Closed,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("function call {0} is already running")]
    InFlight(CallId),
}

/// Collaborators a conversation talks to.
#[derive(Clone)]
pub struct Dependencies {
    pub model: Arc<dyn ChatModel>,
    pub executor: Executor,
    pub recorder: Arc<dyn TransactionRecorder>,
    pub context: SessionContext,
}

enum Command {
    UserMessage {
        text: String,
        reply: oneshot::Sender<()>,
    },
    Approve {
        id: CallId,
        reply: oneshot::Sender<Result<FunctionCall, EngineError>>,
    },
    Reject {
        id: CallId,
        reply: oneshot::Sender<Result<FunctionCall, EngineError>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    SelectTopic {
        topic: Topic,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    WhenIdle {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket {
    generation: u64,
    turn: u64,
}

enum Work {
    Reply(Result<String, ModelError>),
    Execution {
        call: FunctionCall,
        outcome: Result<CapabilityResult, ExecutionError>,
    },
    Interpretation(Interpretation),
}

struct Completion {
    ticket: Ticket,
    work: Work,
}

/// Cheap, cloneable way to talk to a running conversation.
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    id: String,
    commands: mpsc::Sender<Command>,
}

pub struct Conversation;

impl Conversation {
    /// Starts the actor on the current runtime. It stops once every handle
    /// has been dropped or [`ConversationHandle::close`] is called.
    pub fn spawn(dependencies: Dependencies, topic: Topic) -> ConversationHandle {
        let id = Uuid::new_v4().to_string();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        let actor = Actor {
            id: id.clone(),
            session: Session::new(topic),
            dependencies,
            generation: 0,
            next_turn: 0,
            open: BTreeSet::new(),
            ready: HashMap::new(),
            running: HashSet::new(),
            idle_waiters: Vec::new(),
            completions: completion_tx,
        };
        tokio::spawn(actor.run(command_rx, completion_rx));

        ConversationHandle {
            id,
            commands: command_tx,
        }
    }
}

impl ConversationHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, EngineError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| EngineError::Closed)?;
        response.await.map_err(|_| EngineError::Closed)
    }

    /// Appends the message and asks the model for a reply. Returns once the
    /// message is recorded; the reply arrives later.
    pub async fn send_user_message(&self, text: impl Into<String>) -> Result<(), EngineError> {
        let text = text.into();
        self.request(|reply| Command::UserMessage { text, reply }).await
    }

    /// Approves a pending call, or retries an approved one whose last
    /// attempt failed.
    pub async fn approve(&self, id: &CallId) -> Result<FunctionCall, EngineError> {
        let id = id.clone();
        self.request(|reply| Command::Approve { id, reply }).await?
    }

    pub async fn reject(&self, id: &CallId) -> Result<FunctionCall, EngineError> {
        let id = id.clone();
        self.request(|reply| Command::Reject { id, reply }).await?
    }

    pub async fn reset(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub async fn select_topic(&self, topic: Topic) -> Result<(), EngineError> {
        self.request(|reply| Command::SelectTopic { topic, reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Resolves once every issued model or capability call has been applied.
    pub async fn when_idle(&self) -> Result<SessionSnapshot, EngineError> {
        self.request(|reply| Command::WhenIdle { reply }).await
    }

    /// Stops the actor. Every other clone of this handle sees
    /// [`EngineError::Closed`] afterwards; work still in flight is dropped.
    pub async fn close(&self) -> Result<(), EngineError> {
        self.request(|reply| Command::Close { reply }).await
    }
}

struct Actor {
    id: String,
    session: Session,
    dependencies: Dependencies,
    generation: u64,
    next_turn: u64,
    /// Turns with a step in flight, oldest first.
    open: BTreeSet<u64>,
    /// Completed steps waiting for every earlier turn to finish.
    ready: HashMap<u64, Work>,
    /// Calls with an execution in flight.
    running: HashSet<CallId>,
    idle_waiters: Vec<oneshot::Sender<SessionSnapshot>>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        info!(conversation = %self.id, topic = %self.session.topic().id, "conversation started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if self.on_command(command).is_break() {
                            break;
                        }
                    }
                    None => break,
                },
                Some(completion) = completions.recv() => self.on_completion(completion),
            }
        }

        info!(conversation = %self.id, "conversation stopped");
    }

    fn busy(&self) -> bool {
        !self.open.is_empty()
    }

    fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot(&self.id, self.busy())
    }

    fn on_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::UserMessage { text, reply } => {
                self.user_message(text);
                let _ = reply.send(());
            }
            Command::Approve { id, reply } => {
                let _ = reply.send(self.approve(id));
            }
            Command::Reject { id, reply } => {
                let outcome = self
                    .session
                    .registry_mut()
                    .set_status(&id, CallStatus::Rejected, None)
                    .cloned()
                    .map_err(EngineError::from);
                let _ = reply.send(outcome);
            }
            Command::Reset { reply } => {
                self.start_generation();
                self.session.reset();
                info!(conversation = %self.id, "conversation reset");
                let _ = reply.send(());
            }
            Command::SelectTopic { topic, reply } => {
                self.start_generation();
                info!(conversation = %self.id, topic = %topic.id, "topic selected");
                self.session.select_topic(topic);
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::WhenIdle { reply } => {
                if self.busy() {
                    self.idle_waiters.push(reply);
                } else {
                    let _ = reply.send(self.snapshot());
                }
            }
            Command::Close { reply } => {
                info!(conversation = %self.id, "conversation closing");
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        self.notify_if_idle();
        ControlFlow::Continue(())
    }

    fn on_completion(&mut self, completion: Completion) {
        if completion.ticket.generation != self.generation {
            debug!(
                conversation = %self.id,
                turn = completion.ticket.turn,
                "dropping completion from before reset"
            );
            return;
        }

        self.ready.insert(completion.ticket.turn, completion.work);
        while let Some(turn) = self.open.first().copied() {
            let Some(work) = self.ready.remove(&turn) else {
                break;
            };
            self.open.remove(&turn);
            self.apply(turn, work);
        }
        self.notify_if_idle();
    }

    fn notify_if_idle(&mut self) {
        if self.busy() || self.idle_waiters.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(snapshot.clone());
        }
    }

    fn start_generation(&mut self) {
        self.generation += 1;
        self.open.clear();
        self.ready.clear();
        self.running.clear();
    }

    fn begin_turn(&mut self) -> u64 {
        let turn = self.next_turn;
        self.next_turn += 1;
        turn
    }

    /// Runs the next step of `turn`. The turn stays open until that step has
    /// been applied.
    fn issue<F>(&mut self, turn: u64, task: F)
    where
        F: Future<Output = Work> + Send + 'static,
    {
        let inserted = self.open.insert(turn);
        debug_assert!(inserted, "turn {turn} already has a step in flight");
        let ticket = Ticket {
            generation: self.generation,
            turn,
        };

        let completions = self.completions.clone();
        tokio::spawn(async move {
            let work = task.await;
            // the actor may be gone; nothing left to update then
            let _ = completions.send(Completion { ticket, work });
        });
    }

    fn user_message(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        self.session.push(Message::user(text));

        let prompt = tutor_prompt(
            self.session.topic(),
            self.dependencies.context.wallet_address.as_deref(),
        );
        let request = ChatRequest::new(self.session.turn_messages(prompt));
        let model = self.dependencies.model.clone();
        let turn = self.begin_turn();
        self.issue(turn, async move { Work::Reply(model.complete(&request).await) });
    }

    fn approve(&mut self, id: CallId) -> Result<FunctionCall, EngineError> {
        let status = self
            .session
            .registry()
            .get(&id)
            .map(FunctionCall::status)
            .ok_or_else(|| RegistryError::UnknownCall(id.clone()))?;

        let call = if status == CallStatus::Approved {
            if self.running.contains(&id) {
                return Err(EngineError::InFlight(id));
            }
            info!(call_id = %id, "retrying approved call");
            self.session
                .registry()
                .get(&id)
                .cloned()
                .ok_or_else(|| RegistryError::UnknownCall(id.clone()))?
        } else {
            self.session
                .registry_mut()
                .set_status(&id, CallStatus::Approved, None)?
                .clone()
        };

        let turn = self.begin_turn();
        self.dispatch(turn, call.clone());
        Ok(call)
    }

    fn dispatch(&mut self, turn: u64, call: FunctionCall) {
        self.running.insert(call.id().clone());
        let executor = self.dependencies.executor.clone();
        self.issue(turn, async move {
            let outcome = executor.execute(&call).await;
            Work::Execution { call, outcome }
        });
    }

    fn apply(&mut self, turn: u64, work: Work) {
        match work {
            Work::Reply(Ok(text)) if usable_reply(&text) => self.apply_reply(turn, &text),
            Work::Reply(Ok(_)) => {
                warn!(conversation = %self.id, "model returned no usable reply");
                self.session
                    .push(Message::assistant("Error: the model returned no usable response"));
            }
            Work::Reply(Err(error)) => {
                warn!(conversation = %self.id, %error, "model call failed");
                self.session.push(Message::assistant(format!("Error: {error}")));
            }
            Work::Execution { call, outcome } => {
                self.running.remove(call.id());
                match outcome {
                    Ok(result) => self.apply_result(turn, call, result),
                    Err(error) => self.apply_failure(call, error),
                }
            }
            Work::Interpretation(interpretation) => {
                if interpretation.source == Source::Fallback {
                    debug!(conversation = %self.id, "fallback explanation appended");
                }
                self.session.push(Message::assistant(interpretation.text));
            }
        }
    }

    fn apply_reply(&mut self, turn: u64, text: &str) {
        let parsed = parse(text);
        let Some(invocation) = parsed.invocation else {
            self.session.push(Message::assistant(parsed.display_text));
            return;
        };

        if !parsed.display_text.trim().is_empty() {
            self.session.push(Message::assistant(parsed.display_text));
        }

        let call = self
            .session
            .registry_mut()
            .enqueue(invocation.name, invocation.arguments)
            .clone();

        if call.status() == CallStatus::Approved {
            self.dispatch(turn, call);
        } else {
            info!(call_id = %call.id(), function = %call.name(), "awaiting approval");
        }
    }

    fn apply_result(&mut self, turn: u64, call: FunctionCall, result: CapabilityResult) {
        let value = result.to_value();
        let executed = match self.session.registry_mut().set_status(
            call.id(),
            CallStatus::Executed,
            Some(value.clone()),
        ) {
            Ok(executed) => executed.clone(),
            Err(error) => {
                warn!(call_id = %call.id(), %error, "could not record result");
                return;
            }
        };

        let payload = function_payload(&executed, &value);
        self.session
            .push(Message::function(call.name(), payload.to_string()));

        if let Some(record) = TransactionRecord::from_execution(
            &executed,
            &result,
            &self.dependencies.context,
            Utc::now(),
        ) {
            info!(call_id = %call.id(), hash = %record.hash, "transaction recorded");
            self.dependencies.recorder.append(record);
        }

        let model = self.dependencies.model.clone();
        let topic = self.session.topic().clone();
        self.issue(turn, async move {
            Work::Interpretation(interpret(model.as_ref(), &executed, &payload, &topic).await)
        });
    }

    fn apply_failure(&mut self, call: FunctionCall, error: ExecutionError) {
        let reason = error.to_string();
        warn!(call_id = %call.id(), function = %call.name(), %reason, "execution failed");

        if let Err(error) = self.session.registry_mut().record_failure(call.id(), reason.clone()) {
            warn!(call_id = %call.id(), %error, "could not record failure");
        }
        let text = failure_explanation(&call, &reason, self.session.topic());
        self.session.push(Message::assistant(text));
    }
}
