//! Shared state injected into every node of a flow.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use qflow_shell::InterpreterSession;

use crate::registry::CircuitRegistry;

/// Flow-wide tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// How long a register node waits for its circuit to be fully declared.
    pub circuit_ready_timeout_ms: u64,
    /// How long gate and simulator nodes hold tokens of a circuit that
    /// stopped advancing. `None` keeps them until the circuit completes.
    pub stale_circuit_timeout_ms: Option<u64>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            circuit_ready_timeout_ms: 30_000,
            stale_circuit_timeout_ms: Some(600_000),
        }
    }
}

impl FlowConfig {
    pub fn circuit_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_ready_timeout_ms)
    }

    pub fn stale_circuit_timeout(&self) -> Option<Duration> {
        self.stale_circuit_timeout_ms.map(Duration::from_millis)
    }
}

/// Everything nodes of one flow share: the interpreter session and the
/// register declaration table.
#[derive(Clone)]
pub struct FlowContext {
    pub session: Arc<InterpreterSession>,
    pub circuits: Arc<CircuitRegistry>,
    pub config: FlowConfig,
}

impl FlowContext {
    pub fn new(session: InterpreterSession, config: FlowConfig) -> Self {
        Self {
            session: Arc::new(session),
            circuits: Arc::new(CircuitRegistry::new()),
            config,
        }
    }
}
