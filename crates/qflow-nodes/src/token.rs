//! Tokens that flow between circuit nodes.
//!
//! A circuit-initiation node mints one [`CircuitId`] and fans out either
//! [`QubitToken`]s (flat layout) or [`RegisterToken`]s (register layout).
//! Register nodes turn register tokens into qubit tokens. Tokens are
//! immutable; nodes forward fresh copies.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NodeError, NodeResult};

/// Identity of one circuit instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CircuitId(pub String);

impl CircuitId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CircuitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Most qubits, or classical bits, a flat circuit may declare.
pub const MAX_QUBITS: u32 = 1024;

/// Most registers, quantum and classical together, a circuit may declare.
pub const MAX_REGISTERS: u32 = 256;

/// Declared shape of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CircuitStructure {
    /// Plain qubits and classical bits, no named registers.
    Qubits { qubits: u32, cbits: u32 },
    /// A number of quantum and classical registers declared by register nodes.
    Registers { quantum: u32, classical: u32 },
}

impl CircuitStructure {
    /// Reject shapes that cannot hold a circuit or exceed the size limits.
    pub fn validate(&self) -> NodeResult<()> {
        match *self {
            CircuitStructure::Qubits { qubits: 0, .. } => Err(NodeError::InvalidStructure(
                "a circuit needs at least one qubit".into(),
            )),
            CircuitStructure::Qubits { qubits, cbits } if qubits.max(cbits) > MAX_QUBITS => {
                Err(NodeError::InvalidStructure(format!(
                    "a circuit holds at most {MAX_QUBITS} qubits and {MAX_QUBITS} bits"
                )))
            }
            CircuitStructure::Registers { quantum: 0, .. } => Err(NodeError::InvalidStructure(
                "a circuit needs at least one quantum register".into(),
            )),
            CircuitStructure::Registers { quantum, classical } => {
                match quantum.checked_add(classical) {
                    Some(total) if total <= MAX_REGISTERS => Ok(()),
                    _ => Err(NodeError::InvalidStructure(format!(
                        "a circuit holds at most {MAX_REGISTERS} registers"
                    ))),
                }
            }
            CircuitStructure::Qubits { .. } => Ok(()),
        }
    }

    /// Whether qubits live in named registers.
    pub fn uses_registers(&self) -> bool {
        matches!(self, CircuitStructure::Registers { .. })
    }

    /// Number of output wires of the circuit-initiation node. For register
    /// layouts this is also the number of register indices.
    pub fn fan_out(&self) -> u32 {
        match *self {
            CircuitStructure::Qubits { qubits, .. } => qubits,
            CircuitStructure::Registers { quantum, classical } => {
                quantum.saturating_add(classical)
            }
        }
    }
}

/// A computational basis state as a string of `0`s and `1`s, most
/// significant qubit first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BitString(String);

impl BitString {
    pub fn parse(bits: &str) -> NodeResult<Self> {
        let bits = bits.trim();
        if bits.is_empty() || !bits.chars().all(|c| c == '0' || c == '1') {
            return Err(NodeError::InvalidParameter(format!(
                "{bits:?} is not a string of 0s and 1s"
            )));
        }
        if bits.len() > MAX_QUBITS as usize {
            return Err(NodeError::InvalidParameter(format!(
                "a bit string holds at most {MAX_QUBITS} bits"
            )));
        }
        Ok(Self(bits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of qubits the state addresses.
    pub fn width(&self) -> u32 {
        // Bounded by MAX_QUBITS in `parse`.
        self.0.len() as u32
    }

    /// Require exactly `qubits` bits.
    pub fn check_width(&self, qubits: u32) -> NodeResult<()> {
        if self.width() == qubits {
            Ok(())
        } else {
            Err(NodeError::InvalidParameter(format!(
                "initial state {} has {} bits but the circuit has {qubits} qubits",
                self.0,
                self.width()
            )))
        }
    }
}

impl TryFrom<String> for BitString {
    type Error = NodeError;

    fn try_from(bits: String) -> NodeResult<Self> {
        Self::parse(&bits)
    }
}

impl From<BitString> for String {
    fn from(bits: BitString) -> Self {
        bits.0
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterKind {
    Quantum,
    Classical,
}

impl RegisterKind {
    /// Script variable prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            RegisterKind::Quantum => "qr",
            RegisterKind::Classical => "cr",
        }
    }

    /// Script variable for the register at `index`.
    pub fn var(&self, index: u32) -> String {
        format!("{}{}", self.prefix(), index)
    }
}

/// Owning register of a qubit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRef {
    /// User-facing register name.
    pub name: String,
    /// Script variable (`qr<index>`).
    pub var: String,
    /// Qubits in the register.
    pub total_qubits: u32,
}

impl RegisterRef {
    /// Register index encoded in the variable name, if it is a quantum register.
    pub fn index(&self) -> Option<u32> {
        self.var
            .strip_prefix(RegisterKind::Quantum.prefix())
            .and_then(|n| n.parse().ok())
    }
}

/// One qubit position of one circuit instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QubitToken {
    pub circuit_id: CircuitId,
    pub structure: CircuitStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register: Option<RegisterRef>,
    /// Index within the register, or within the circuit for flat layouts.
    pub qubit: u32,
}

impl QubitToken {
    /// Token for a circuit without registers.
    pub fn flat(circuit_id: CircuitId, structure: CircuitStructure, qubit: u32) -> Self {
        Self {
            circuit_id,
            structure,
            register: None,
            qubit,
        }
    }

    /// Token for a qubit inside a named register.
    pub fn in_register(
        circuit_id: CircuitId,
        structure: CircuitStructure,
        register: RegisterRef,
        qubit: u32,
    ) -> Self {
        Self {
            circuit_id,
            structure,
            register: Some(register),
            qubit,
        }
    }

    /// How the generated script refers to this qubit: `qr0[1]` or `1`.
    pub fn script_ref(&self) -> String {
        match &self.register {
            Some(register) => format!("{}[{}]", register.var, self.qubit),
            None => self.qubit.to_string(),
        }
    }

    /// Ordering key: register variable first, then index.
    pub fn position(&self) -> (&str, u32) {
        let var = self.register.as_ref().map_or("", |r| r.var.as_str());
        (var, self.qubit)
    }
}

/// One register slot emitted by a circuit in register layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterToken {
    pub circuit_id: CircuitId,
    pub structure: CircuitStructure,
    pub register_index: u32,
}
