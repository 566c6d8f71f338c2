//! Legal chat agent: turn assembly, the bounded tool loop and answer
//! parsing.

pub mod answer;
pub mod orchestrator;
pub mod prompt;
pub mod turn;

pub use answer::{parse_answer, ParsedAnswer, STRUCTURED_FIELDS};
pub use orchestrator::{AgentAction, AgentPhase, AgentReply, Orchestrator, ToolInvocation};
pub use turn::{TurnAttachment, UserTurn};
