//! Circuit initiation.

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::context::FlowContext;
use crate::error::{NodeError, NodeResult};
use crate::handlers::{Dispatch, Node, NodeKind, forward};
use crate::message::{Inbound, Message};
use crate::snippets::{self, Arg};
use crate::token::{BitString, CircuitId, CircuitStructure, QubitToken, RegisterToken};

/// Starts a new circuit instance for every trigger it receives.
///
/// In qubit layout the circuit is declared immediately and one qubit token
/// per qubit is emitted. In register layout one register token per register
/// is emitted; the register nodes declare the circuit later.
///
/// A bit-string trigger (or an `initialState` field) prepares the qubits in
/// that basis state right after the circuit is declared.
pub struct CircuitInitNode {
    ctx: FlowContext,
    structure: CircuitStructure,
}

impl CircuitInitNode {
    pub fn new(ctx: FlowContext, structure: CircuitStructure) -> NodeResult<Self> {
        structure.validate()?;
        Ok(Self { ctx, structure })
    }

    pub fn structure(&self) -> CircuitStructure {
        self.structure
    }

    async fn prepare(
        &self,
        structure: CircuitStructure,
        initial_state: Option<&BitString>,
    ) -> NodeResult<()> {
        let mut script = snippets::IMPORTS.render(&[])?;
        if let CircuitStructure::Qubits { qubits, cbits } = structure {
            script.push('\n');
            script.push_str(
                &snippets::QUANTUM_CIRCUIT_FLAT
                    .render(&[Arg::Int(qubits.into()), Arg::Int(cbits.into())])?,
            );
            if let Some(bits) = initial_state {
                script.push('\n');
                script.push_str(&snippets::INITIALIZE.render(&[Arg::Str(bits.to_string())])?);
            }
        }

        if let Some(banner) = self.ctx.session.start().await? {
            info!("Interpreter ready: {}", banner.lines().next().unwrap_or_default());
        }
        self.ctx.session.execute(&script).await?;
        Ok(())
    }
}

#[async_trait]
impl Node for CircuitInitNode {
    fn kind(&self) -> NodeKind {
        NodeKind::CircuitInit
    }

    #[instrument(skip(self, msg))]
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch> {
        let (structure, initial_state) = match Inbound::parse(&msg)? {
            Inbound::CircuitInit(request) => (
                request.structure.unwrap_or(self.structure),
                request.initial_state,
            ),
            Inbound::Bits(bits) => (self.structure, Some(bits)),
            Inbound::Simulation(_) => (self.structure, None),
            Inbound::Qubit(_) | Inbound::Register(_) => {
                return Err(NodeError::InvalidParameter(
                    "a circuit cannot be started from another circuit's token".into(),
                ));
            }
        };
        structure.validate()?;
        if let (CircuitStructure::Qubits { qubits, .. }, Some(bits)) = (structure, &initial_state) {
            bits.check_width(qubits)?;
        }

        let circuit = CircuitId::generate();
        if structure.uses_registers() {
            self.ctx
                .circuits
                .begin_with_state(circuit.clone(), structure, initial_state.clone())?;
        }

        if let Err(e) = self.prepare(structure, initial_state.as_ref()).await {
            self.ctx.circuits.discard(&circuit);
            return Err(e);
        }
        info!(%circuit, ?structure, "Circuit started");

        match structure {
            CircuitStructure::Qubits { qubits, .. } => {
                let tokens: Vec<QubitToken> = (0..qubits)
                    .map(|q| QubitToken::flat(circuit.clone(), structure, q))
                    .collect();
                forward(&tokens)
            }
            CircuitStructure::Registers { .. } => {
                let tokens: Vec<RegisterToken> = (0..structure.fan_out())
                    .map(|register_index| RegisterToken {
                        circuit_id: circuit.clone(),
                        structure,
                        register_index,
                    })
                    .collect();
                forward(&tokens)
            }
        }
    }
}
