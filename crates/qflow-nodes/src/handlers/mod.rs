//! Node dispatch handlers.
//!
//! Every node consumes one inbound [`Message`] at a time and answers with a
//! [`Dispatch`]:
//!
//! ```text
//!   Message ──→ Inbound::parse ──→ validate ──→ render fragment ──→ execute ──→ Dispatch
//!                 (sync)            (sync)         (sync)            (async)
//! ```
//!
//! Validation happens before anything is submitted, so an invalid token
//! never produces a partial script. A failed input yields an error and no
//! output at all.
//!
//! | Node | Kind | Input | Output |
//! |------|------|-------|--------|
//! | [`CircuitInitNode`] | circuit-init | trigger | one token per qubit or register |
//! | [`QuantumRegisterNode`] | register-declare | register token | one qubit token per qubit |
//! | [`ClassicalRegisterNode`] | register-declare | register token | nothing |
//! | [`GateNode`] | gate-apply | qubit token(s) | the same qubits, one per wire |
//! | [`MeasureNode`] | measure | qubit token | the same qubit |
//! | [`LocalSimulatorNode`] | simulate | qubit tokens | counts |
//! | [`CircuitDiagramNode`] | visualize | qubit tokens | base64 PNG of the circuit |
//! | [`FactorNode`] | simulate | integer | list of factors |
//! | [`GroverNode`] | simulate | bit string | top measurement and iterations |

use std::fmt;

use async_trait::async_trait;

use crate::context::FlowContext;
use crate::error::NodeResult;
use crate::message::Message;

pub mod circuit;
pub mod diagram;
pub mod factor;
pub mod gate;
pub mod grover;
pub mod measure;
pub mod register;
pub mod simulator;

pub use circuit::CircuitInitNode;
pub use diagram::CircuitDiagramNode;
pub use factor::FactorNode;
pub use gate::{Axis, Gate, GateNode, PiAngle};
pub use grover::{GroverNode, SearchOutcome};
pub use measure::{MeasureConfig, MeasureNode};
pub use register::{ClassicalRegisterNode, QuantumRegisterNode, RegisterConfig};
pub use simulator::{LocalSimulatorNode, SimulatorConfig};

/// Operation family of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    CircuitInit,
    RegisterDeclare,
    GateApply,
    Measure,
    Simulate,
    Visualize,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::CircuitInit => write!(f, "circuit-init"),
            NodeKind::RegisterDeclare => write!(f, "register-declare"),
            NodeKind::GateApply => write!(f, "gate-apply"),
            NodeKind::Measure => write!(f, "measure"),
            NodeKind::Simulate => write!(f, "simulate"),
            NodeKind::Visualize => write!(f, "visualize"),
        }
    }
}

/// What a node hands back to the flow runtime for one input.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Input absorbed, nothing to send yet.
    Pending,
    /// One message per output wire.
    Forward(Vec<Message>),
    /// Terminal result.
    Result(Message),
}

impl Dispatch {
    /// Messages to send, in wire order.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Dispatch::Pending => Vec::new(),
            Dispatch::Forward(messages) => messages,
            Dispatch::Result(message) => vec![message],
        }
    }
}

/// A circuit-building node.
#[async_trait]
pub trait Node: Send + Sync {
    /// Operation family.
    fn kind(&self) -> NodeKind;

    /// Handle one inbound message.
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch>;
}

/// Serialize each token into a pipeline message.
pub(crate) fn forward<T: serde::Serialize>(tokens: &[T]) -> NodeResult<Dispatch> {
    tokens
        .iter()
        .map(Message::pipeline)
        .collect::<NodeResult<Vec<_>>>()
        .map(Dispatch::Forward)
}

/// Run `script` in a fresh sibling of the flow's session, stopping it
/// afterwards whatever the outcome.
pub(crate) async fn run_isolated(ctx: &FlowContext, script: &str) -> NodeResult<String> {
    let session = ctx.session.sibling();
    session.start().await?;
    let outcome = session.execute(script).await;
    session.stop().await;
    Ok(outcome?)
}

/// The last non-empty line of interpreter output.
pub(crate) fn last_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}
