//! Quantum and classical register declaration.
//!
//! Both node types reserve their slot in the [`CircuitRegistry`] before
//! submitting anything, then run their declaration fragment and confirm.
//! Whichever node confirms last also runs the circuit declaration, followed
//! by the initial state preparation when the circuit was started with one.
//!
//! [`CircuitRegistry`]: crate::registry::CircuitRegistry

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::context::FlowContext;
use crate::error::{NodeError, NodeResult};
use crate::handlers::{Dispatch, Node, NodeKind, forward};
use crate::message::{Inbound, Message};
use crate::registry::{CircuitRegistry, Declaration, DeclaredRegister};
use crate::snippets::{self, Arg};
use crate::token::{MAX_QUBITS, QubitToken, RegisterKind, RegisterRef, RegisterToken};

/// Configuration of one register node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterConfig {
    /// Display name; defaults to the script variable.
    #[serde(default)]
    pub name: Option<String>,
    /// Qubits or bits in the register.
    pub size: u32,
}

impl RegisterConfig {
    pub fn new(size: u32) -> Self {
        Self { name: None, size }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn validate(&self) -> NodeResult<()> {
        if self.size == 0 {
            return Err(NodeError::InvalidParameter(
                "a register needs at least one bit".into(),
            ));
        }
        if self.size > MAX_QUBITS {
            return Err(NodeError::InvalidParameter(format!(
                "a register holds at most {MAX_QUBITS} bits"
            )));
        }
        Ok(())
    }

    fn display_name(&self, kind: RegisterKind, index: u32) -> String {
        let name = self
            .name
            .as_deref()
            .map(|n| n.trim().to_lowercase().replace(' ', "_"))
            .unwrap_or_default();
        if name.is_empty() {
            kind.var(index)
        } else {
            name
        }
    }
}

/// Reserve, declare and confirm one register. Returns the declared register
/// and a receiver for the circuit's readiness.
async fn declare(
    ctx: &FlowContext,
    kind: RegisterKind,
    config: &RegisterConfig,
    token: &RegisterToken,
) -> NodeResult<(DeclaredRegister, watch::Receiver<bool>)> {
    let circuit = &token.circuit_id;
    let index = token.register_index;
    let register = DeclaredRegister {
        kind,
        var: kind.var(index),
        name: config.display_name(kind, index),
        size: config.size,
    };

    let template = match kind {
        RegisterKind::Quantum => &snippets::QUANTUM_REGISTER,
        RegisterKind::Classical => &snippets::CLASSICAL_REGISTER,
    };
    let script = template.render(&[
        Arg::Ident(register.var.clone()),
        Arg::Int(register.size.into()),
        Arg::Str(register.name.clone()),
    ])?;

    let ready = ctx
        .circuits
        .reserve(circuit, token.structure, index, register.clone())?;

    let outcome = async {
        ctx.session.execute(&script).await?;
        if let Declaration::Complete(declared) = ctx.circuits.confirm(circuit, index)? {
            let mut script = snippets::QUANTUM_CIRCUIT.render(&[Arg::ExprList(declared.vars)])?;
            if let Some(bits) = &declared.initial_state {
                bits.check_width(declared.qubits)?;
                script.push('\n');
                script.push_str(&snippets::INITIALIZE.render(&[Arg::Str(bits.to_string())])?);
            }
            ctx.session.execute(&script).await?;
            ctx.circuits.complete(circuit);
        }
        Ok::<_, NodeError>(())
    }
    .await;

    if let Err(e) = outcome {
        ctx.circuits.discard(circuit);
        return Err(e);
    }
    debug!(%circuit, var = %register.var, "Register declared");
    Ok((register, ready))
}

/// Declares a quantum register and emits one qubit token per qubit once the
/// whole circuit is declared.
pub struct QuantumRegisterNode {
    ctx: FlowContext,
    config: RegisterConfig,
}

impl QuantumRegisterNode {
    pub fn new(ctx: FlowContext, config: RegisterConfig) -> NodeResult<Self> {
        config.validate()?;
        Ok(Self { ctx, config })
    }
}

#[async_trait]
impl Node for QuantumRegisterNode {
    fn kind(&self) -> NodeKind {
        NodeKind::RegisterDeclare
    }

    #[instrument(skip(self, msg))]
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch> {
        let token = Inbound::parse(&msg)?.into_register()?;
        let (register, ready) =
            declare(&self.ctx, RegisterKind::Quantum, &self.config, &token).await?;

        CircuitRegistry::wait_ready(
            &token.circuit_id,
            ready,
            self.ctx.config.circuit_ready_timeout(),
        )
        .await?;

        let reference = RegisterRef {
            name: register.name,
            var: register.var,
            total_qubits: register.size,
        };
        let qubits: Vec<QubitToken> = (0..register.size)
            .map(|q| {
                QubitToken::in_register(
                    token.circuit_id.clone(),
                    token.structure,
                    reference.clone(),
                    q,
                )
            })
            .collect();
        forward(&qubits)
    }
}

/// Declares a classical register. Terminal: nothing is forwarded.
pub struct ClassicalRegisterNode {
    ctx: FlowContext,
    config: RegisterConfig,
}

impl ClassicalRegisterNode {
    pub fn new(ctx: FlowContext, config: RegisterConfig) -> NodeResult<Self> {
        config.validate()?;
        Ok(Self { ctx, config })
    }
}

#[async_trait]
impl Node for ClassicalRegisterNode {
    fn kind(&self) -> NodeKind {
        NodeKind::RegisterDeclare
    }

    #[instrument(skip(self, msg))]
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch> {
        let token = Inbound::parse(&msg)?.into_register()?;
        declare(&self.ctx, RegisterKind::Classical, &self.config, &token).await?;
        Ok(Dispatch::Forward(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let config = RegisterConfig::new(2).with_name("  My Ancilla ");
        assert_eq!(config.display_name(RegisterKind::Quantum, 0), "my_ancilla");

        let config = RegisterConfig::new(2);
        assert_eq!(config.display_name(RegisterKind::Classical, 3), "cr3");

        let config = RegisterConfig::new(2).with_name("   ");
        assert_eq!(config.display_name(RegisterKind::Quantum, 1), "qr1");
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(RegisterConfig::new(0).validate().is_err());
        assert!(RegisterConfig::new(MAX_QUBITS + 1).validate().is_err());
    }
}
