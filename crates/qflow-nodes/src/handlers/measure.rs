//! Measurement into a classical bit.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::context::FlowContext;
use crate::error::{NodeError, NodeResult};
use crate::handlers::{Dispatch, Node, NodeKind, forward};
use crate::message::{Inbound, Message};
use crate::snippets::{self, Arg};
use crate::token::{CircuitStructure, QubitToken, RegisterKind};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MeasureConfig {
    /// Classical register variable (`cr<i>`); required in register layout.
    #[serde(default)]
    pub classical_register: Option<String>,
    /// Bit within the register, or within the circuit in qubit layout.
    pub bit: u32,
}

impl MeasureConfig {
    pub fn bit(bit: u32) -> Self {
        Self {
            classical_register: None,
            bit,
        }
    }

    pub fn in_register(register: impl Into<String>, bit: u32) -> Self {
        Self {
            classical_register: Some(register.into()),
            bit,
        }
    }
}

/// Measures each incoming qubit and passes it on.
pub struct MeasureNode {
    ctx: FlowContext,
    config: MeasureConfig,
    /// Register index parsed from `config.classical_register`.
    register_index: Option<u32>,
}

impl MeasureNode {
    pub fn new(ctx: FlowContext, config: MeasureConfig) -> NodeResult<Self> {
        let register_index = match &config.classical_register {
            Some(register) => Some(
                register
                    .strip_prefix(RegisterKind::Classical.prefix())
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| {
                        NodeError::InvalidParameter(format!(
                            "{register:?} is not a classical register variable"
                        ))
                    })?,
            ),
            None => None,
        };
        Ok(Self {
            ctx,
            config,
            register_index,
        })
    }

    fn classical_target(&self, token: &QubitToken) -> NodeResult<String> {
        match token.structure {
            CircuitStructure::Qubits { cbits, .. } => {
                if self.config.bit >= cbits {
                    return Err(NodeError::InvalidParameter(format!(
                        "bit {} is outside a circuit of {cbits} classical bits",
                        self.config.bit
                    )));
                }
                Ok(self.config.bit.to_string())
            }
            CircuitStructure::Registers { .. } => {
                let (Some(register), Some(index)) =
                    (&self.config.classical_register, self.register_index)
                else {
                    return Err(NodeError::InvalidParameter(
                        "measuring a circuit with registers needs a classical register".into(),
                    ));
                };
                let own_register = token.register.as_ref().and_then(|r| r.index());
                if index >= token.structure.fan_out() || own_register == Some(index) {
                    return Err(NodeError::UndeclaredRegister {
                        circuit: token.circuit_id.clone(),
                        register: register.clone(),
                    });
                }
                Ok(format!("{register}[{}]", self.config.bit))
            }
        }
    }
}

#[async_trait]
impl Node for MeasureNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Measure
    }

    #[instrument(skip(self, msg))]
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch> {
        let token = Inbound::parse(&msg)?.into_qubit()?;
        token.structure.validate()?;
        let target = self.classical_target(&token)?;

        let script =
            snippets::MEASURE.render(&[Arg::Expr(token.script_ref()), Arg::Expr(target)])?;
        self.ctx.session.execute(&script).await?;
        forward(&[token])
    }
}
