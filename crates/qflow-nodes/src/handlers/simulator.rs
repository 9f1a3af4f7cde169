//! Local simulation of a complete circuit.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::aggregate::{Progress, QubitAggregator};
use crate::context::FlowContext;
use crate::error::{NodeError, NodeResult};
use crate::handlers::{Dispatch, Node, NodeKind, last_line};
use crate::message::{Inbound, Message};
use crate::snippets::{self, Arg};

/// Measured bit-string → number of shots.
pub type Counts = BTreeMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub shots: u32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { shots: 1 }
    }
}

/// Waits for every qubit of a circuit, then runs it and returns the counts.
pub struct LocalSimulatorNode {
    ctx: FlowContext,
    config: SimulatorConfig,
    aggregator: Mutex<QubitAggregator>,
}

impl LocalSimulatorNode {
    pub fn new(ctx: FlowContext, config: SimulatorConfig) -> NodeResult<Self> {
        if config.shots == 0 {
            return Err(NodeError::InvalidParameter("shots must be positive".into()));
        }
        let aggregator = QubitAggregator::with_stale_after(ctx.config.stale_circuit_timeout());
        Ok(Self {
            ctx,
            config,
            aggregator: Mutex::new(aggregator),
        })
    }
}

/// Decode the counts printed by the simulation fragment.
///
/// Accepts JSON as well as a Python dict repr with single quotes.
pub fn decode_counts(output: &str) -> NodeResult<Counts> {
    let line = last_line(output);
    serde_json::from_str(line)
        .or_else(|_| serde_json::from_str(&line.replace('\'', "\"")))
        .map_err(|e| NodeError::Decode(format!("{e}: {line:?}")))
}

#[async_trait]
impl Node for LocalSimulatorNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Simulate
    }

    #[instrument(skip(self, msg), fields(shots = self.config.shots))]
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch> {
        let token = Inbound::parse(&msg)?.into_qubit()?;
        let progress = self
            .aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accept(token)?;

        let Progress::Ready(tokens) = progress else {
            return Ok(Dispatch::Pending);
        };

        let script = snippets::LOCAL_SIMULATOR.render(&[Arg::Int(self.config.shots.into())])?;
        let output = self.ctx.session.execute(&script).await?;
        let counts = decode_counts(&output)?;
        info!(qubits = tokens.len(), outcomes = counts.len(), "Simulation finished");
        Ok(Dispatch::Result(Message::pipeline(&counts)?))
    }
}
