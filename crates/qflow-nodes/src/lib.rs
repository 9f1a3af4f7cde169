//! qflow circuit nodes
//!
//! Building blocks for assembling a quantum circuit out of independent flow
//! nodes. Each node renders a script fragment, runs it in a shared
//! [`InterpreterSession`](qflow_shell::InterpreterSession) and forwards
//! tokens to the next node.
//!
//! # Overview
//!
//! - [`token`]: circuit identities, structures and the tokens nodes exchange.
//! - [`message`]: wire messages and their classification into [`Inbound`].
//! - [`snippets`]: the script fragment table.
//! - [`aggregate`]: waits for every qubit of a circuit.
//! - [`registry`]: tracks register declarations per circuit.
//! - [`handlers`]: the nodes themselves.
//!
//! # Example
//!
//! ```ignore
//! use qflow_nodes::{CircuitInitNode, CircuitStructure, FlowConfig, FlowContext, Message, Node};
//! use qflow_shell::{InterpreterSession, ShellConfig};
//!
//! let session = InterpreterSession::new(ShellConfig::default());
//! let ctx = FlowContext::new(session, FlowConfig::default());
//! let init = CircuitInitNode::new(ctx, CircuitStructure::Qubits { qubits: 2, cbits: 2 })?;
//! let tokens = init.on_input(Message::new("", serde_json::Value::Null)).await?;
//! ```

pub mod aggregate;
pub mod context;
pub mod error;
pub mod handlers;
pub mod message;
pub mod registry;
pub mod snippets;
pub mod token;

pub use aggregate::{Progress, QubitAggregator};
pub use context::{FlowConfig, FlowContext};
pub use error::{NodeError, NodeResult};
pub use handlers::{
    Axis, CircuitDiagramNode, CircuitInitNode, ClassicalRegisterNode, Dispatch, FactorNode, Gate,
    GateNode, GroverNode, LocalSimulatorNode, MeasureConfig, MeasureNode, Node, NodeKind, PiAngle,
    QuantumRegisterNode, RegisterConfig, SearchOutcome, SimulatorConfig,
};
pub use message::{Inbound, Message, PIPELINE_TOPIC};
pub use registry::{CircuitDeclaration, CircuitRegistry, Declaration};
pub use token::{
    BitString, CircuitId, CircuitStructure, QubitToken, RegisterKind, RegisterRef, RegisterToken,
};
