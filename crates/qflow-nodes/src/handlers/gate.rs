//! Gate application.
//!
//! Single-qubit gates act on each token as it arrives. Multi-qubit gates
//! buffer tokens per circuit until their arity is reached, order them by
//! register variable then qubit index, and address positions in that order.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::context::FlowContext;
use crate::error::{NodeError, NodeResult};
use crate::handlers::{Dispatch, Node, NodeKind, forward};
use crate::message::{Inbound, Message};
use crate::snippets::{self, Arg, Template};
use crate::token::{CircuitId, QubitToken};

/// An angle in units of π.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct PiAngle(f64);

impl PiAngle {
    pub fn new(turns: f64) -> NodeResult<Self> {
        if turns.is_finite() {
            Ok(Self(turns))
        } else {
            Err(NodeError::InvalidParameter(format!(
                "{turns} is not a finite angle"
            )))
        }
    }

    pub const ZERO: PiAngle = PiAngle(0.0);

    /// Multiples of π.
    pub fn turns(self) -> f64 {
        self.0
    }

    pub fn radians(self) -> f64 {
        self.0 * std::f64::consts::PI
    }

    fn arg(self) -> Arg {
        Arg::Angle(self.0)
    }
}

impl TryFrom<f64> for PiAngle {
    type Error = NodeError;

    fn try_from(turns: f64) -> NodeResult<Self> {
        Self::new(turns)
    }
}

impl From<PiAngle> for f64 {
    fn from(angle: PiAngle) -> f64 {
        angle.0
    }
}

impl fmt::Display for PiAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}π", self.0)
    }
}

/// Rotation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn letter(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        }
    }
}

/// A gate and its static parameters.
///
/// `target` fields index into the ordered inputs; the remaining inputs are
/// controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum Gate {
    Hadamard,
    Not,
    PauliY,
    PauliZ,
    S,
    T,
    Identity,
    Reset,
    Phase {
        phi: PiAngle,
    },
    Rotation {
        axis: Axis,
        theta: PiAngle,
    },
    U {
        theta: PiAngle,
        phi: PiAngle,
        lambda: PiAngle,
    },
    Cnot {
        target: usize,
    },
    Toffoli {
        target: usize,
    },
    Swap,
    MultiControlledU {
        controls: u32,
        target: usize,
        theta: PiAngle,
        phi: PiAngle,
        lambda: PiAngle,
    },
    Barrier {
        qubits: u32,
    },
}

impl Gate {
    /// Number of qubits the gate acts on.
    pub fn arity(&self) -> usize {
        match self {
            Gate::Cnot { .. } | Gate::Swap => 2,
            Gate::Toffoli { .. } => 3,
            Gate::MultiControlledU { controls, .. } => *controls as usize + 1,
            Gate::Barrier { qubits } => *qubits as usize,
            _ => 1,
        }
    }

    /// Reject parameters that address no qubit.
    pub fn validate(&self) -> NodeResult<()> {
        let target = match self {
            Gate::Cnot { target } | Gate::Toffoli { target } => Some(*target),
            Gate::MultiControlledU {
                controls, target, ..
            } => {
                if *controls == 0 {
                    return Err(NodeError::InvalidParameter(
                        "a controlled gate needs at least one control".into(),
                    ));
                }
                Some(*target)
            }
            Gate::Barrier { qubits: 0 } => {
                return Err(NodeError::InvalidParameter(
                    "a barrier needs at least one qubit".into(),
                ));
            }
            _ => None,
        };
        match target {
            Some(t) if t >= self.arity() => Err(NodeError::InvalidParameter(format!(
                "target position {t} is outside {} inputs",
                self.arity()
            ))),
            _ => Ok(()),
        }
    }

    /// Render the fragment for `qubits`, given in input order.
    pub fn render(&self, qubits: &[String]) -> NodeResult<String> {
        if qubits.len() != self.arity() {
            return Err(NodeError::InvalidParameter(format!(
                "gate takes {} qubits, got {}",
                self.arity(),
                qubits.len()
            )));
        }
        let expr = |i: usize| Arg::Expr(qubits[i].clone());

        match *self {
            Gate::Hadamard => single(&snippets::HADAMARD, qubits),
            Gate::Not => single(&snippets::NOT, qubits),
            Gate::PauliY => single(&snippets::PAULI_Y, qubits),
            Gate::PauliZ => single(&snippets::PAULI_Z, qubits),
            Gate::S => single(&snippets::S_GATE, qubits),
            Gate::T => single(&snippets::T_GATE, qubits),
            Gate::Identity => single(&snippets::IDENTITY, qubits),
            Gate::Reset => single(&snippets::RESET, qubits),
            Gate::Phase { phi } => snippets::PHASE.render(&[phi.arg(), expr(0)]),
            Gate::Rotation { axis, theta } => snippets::ROTATION.render(&[
                Arg::Ident(axis.letter().to_string()),
                theta.arg(),
                expr(0),
            ]),
            Gate::U { theta, phi, lambda } => {
                snippets::U_GATE.render(&[theta.arg(), phi.arg(), lambda.arg(), expr(0)])
            }
            Gate::Cnot { target } => snippets::CNOT.render(&exprs(qubits, target)),
            Gate::Toffoli { target } => snippets::TOFFOLI.render(&exprs(qubits, target)),
            Gate::Swap => snippets::SWAP.render(&[expr(0), expr(1)]),
            Gate::MultiControlledU {
                controls,
                target,
                theta,
                phi,
                lambda,
            } => snippets::MULTI_CONTROLLED_U.render(&[
                theta.arg(),
                phi.arg(),
                lambda.arg(),
                Arg::Int(controls.into()),
                Arg::ExprList(controls_then_target(qubits, target)),
            ]),
            Gate::Barrier { .. } => snippets::BARRIER.render(&[Arg::ExprList(qubits.to_vec())]),
        }
    }
}

fn single(template: &Template, qubits: &[String]) -> NodeResult<String> {
    template.render(&[Arg::Expr(qubits[0].clone())])
}

fn controls_then_target(qubits: &[String], target: usize) -> Vec<String> {
    let mut ordered: Vec<String> = qubits
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != target)
        .map(|(_, q)| q.clone())
        .collect();
    ordered.push(qubits[target].clone());
    ordered
}

fn exprs(qubits: &[String], target: usize) -> Vec<Arg> {
    controls_then_target(qubits, target)
        .into_iter()
        .map(Arg::Expr)
        .collect()
}

/// Inputs of a multi-qubit gate still waiting for the rest of its wires.
#[derive(Debug)]
struct PendingInputs {
    since: Instant,
    tokens: Vec<QubitToken>,
}

/// Applies one gate.
pub struct GateNode {
    ctx: FlowContext,
    gate: Gate,
    pending: Mutex<FxHashMap<CircuitId, PendingInputs>>,
}

impl GateNode {
    pub fn new(ctx: FlowContext, gate: Gate) -> NodeResult<Self> {
        gate.validate()?;
        Ok(Self {
            ctx,
            gate,
            pending: Mutex::new(FxHashMap::default()),
        })
    }

    pub fn gate(&self) -> Gate {
        self.gate
    }

    fn pending(&self) -> MutexGuard<'_, FxHashMap<CircuitId, PendingInputs>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Circuits with inputs buffered.
    pub fn buffered(&self) -> usize {
        self.pending().len()
    }

    /// Drop buffered inputs that have waited longer than the stale timeout.
    fn evict_stale(
        pending: &mut FxHashMap<CircuitId, PendingInputs>,
        limit: Option<std::time::Duration>,
        now: Instant,
    ) {
        let Some(limit) = limit else {
            return;
        };
        pending.retain(|circuit, inputs| {
            let fresh = now.saturating_duration_since(inputs.since) <= limit;
            if !fresh {
                warn!(%circuit, held = inputs.tokens.len(), "Dropping stale gate inputs");
            }
            fresh
        });
    }

    /// Buffer `token`; returns the full, ordered input set once complete.
    fn collect(&self, token: QubitToken) -> NodeResult<Option<Vec<QubitToken>>> {
        let arity = self.gate.arity();
        if arity == 1 {
            return Ok(Some(vec![token]));
        }

        let now = Instant::now();
        let circuit = token.circuit_id.clone();
        let mut pending = self.pending();
        Self::evict_stale(&mut pending, self.ctx.config.stale_circuit_timeout(), now);
        let inputs = &mut pending
            .entry(circuit.clone())
            .or_insert_with(|| PendingInputs {
                since: now,
                tokens: Vec::new(),
            })
            .tokens;

        let error = if inputs.iter().any(|t| t.structure != token.structure) {
            Some(NodeError::RegisterStructureMismatch {
                circuit: circuit.clone(),
                reason: "gate inputs disagree about the circuit structure".into(),
            })
        } else if inputs.iter().any(|t| t.position() == token.position()) {
            Some(NodeError::QubitsFromDifferentCircuits(circuit.clone()))
        } else {
            None
        };
        if let Some(e) = error {
            pending.remove(&circuit);
            return Err(e);
        }

        inputs.push(token);
        if inputs.len() < arity {
            debug!(%circuit, buffered = inputs.len(), arity, "Waiting for gate inputs");
            return Ok(None);
        }

        let mut ready = pending
            .remove(&circuit)
            .map(|inputs| inputs.tokens)
            .unwrap_or_default();
        ready.sort_by(|a, b| a.position().cmp(&b.position()));
        Ok(Some(ready))
    }
}

#[async_trait]
impl Node for GateNode {
    fn kind(&self) -> NodeKind {
        NodeKind::GateApply
    }

    #[instrument(skip(self, msg), fields(gate = ?self.gate))]
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch> {
        let token = Inbound::parse(&msg)?.into_qubit()?;
        token.structure.validate()?;

        let Some(inputs) = self.collect(token)? else {
            return Ok(Dispatch::Pending);
        };

        let refs: Vec<String> = inputs.iter().map(QubitToken::script_ref).collect();
        let script = self.gate.render(&refs)?;
        self.ctx.session.execute(&script).await?;
        forward(&inputs)
    }
}
