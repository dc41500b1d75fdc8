//! Conversational runtime for the advocado agent.
//!
//! This crate answers visitor questions from the memory index and runs the contact
//! workflow that ends in at most one email per conversation:
//! - Parses each visitor message into a contact-flow event (`conversation`)
//! - Grounds answers in citable context and strips unapproved links (`guardrails`)
//! - Declares and executes the `send_email` tool (`tools`)
//! - Drives sessions through retrieval, completion and the flow engine (`runtime`)
//! - Publishes the composed pipe configuration as a unit (`publisher`)
//!
//! # Safety Principle
//!
//! The language model only writes answers. It never sends email: a `send_email` tool
//! call it produces is treated as contact intent, and the email goes out only after the
//! visitor has confirmed every field in the deterministic flow.

pub mod conversation;
pub mod guardrails;
pub mod llm;
pub mod publisher;
pub mod reply;
pub mod runtime;
pub mod tools;

pub use conversation::TurnParser;
pub use guardrails::{GroundingDecision, GroundingGuard};
pub use llm::{ChatMessage, Completion, CompletionRequest, LanguageModel, ToolCall};
pub use publisher::{compose_configuration, PipeHost, PipePublisher, PublishOutcome};
pub use reply::ReplyStatus;
pub use runtime::{
    assemble_agent, AgentAssembly, AgentRuntime, Capabilities, ConversationSession, RuntimeLimits,
    TurnReply,
};
pub use tools::{EmailSender, SendEmailTool, ToolRegistry, SEND_EMAIL_TOOL};
