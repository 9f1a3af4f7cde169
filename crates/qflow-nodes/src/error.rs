//! Error handling for circuit nodes.

use thiserror::Error;

use qflow_shell::ShellError;

use crate::token::CircuitId;

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// Errors raised while handling a node input.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NodeError {
    /// The message did not come from a quantum node.
    #[error("Quantum nodes must be connected to nodes from the quantum library only")]
    NotQuantumToken,

    /// A register node received something other than a register token.
    #[error("Missing register field: {0}")]
    MissingRegisterField(String),

    /// The payload is not a well-formed qubit token.
    #[error("Not a qubit object: {0}")]
    NotQubitObject(String),

    /// Tokens overflowed a register or introduced an unexpected one.
    #[error("Qubits from different quantum circuits were mixed in circuit {0}")]
    QubitsFromDifferentCircuits(CircuitId),

    /// Two tokens of one circuit disagree about its structure.
    #[error("Register structure mismatch in circuit {circuit}: {reason}")]
    RegisterStructureMismatch { circuit: CircuitId, reason: String },

    /// The declared circuit shape is unusable.
    #[error("Invalid circuit structure: {0}")]
    InvalidStructure(String),

    /// A token names a register the circuit never declared.
    #[error("Register {register} is not declared by circuit {circuit}")]
    UndeclaredRegister { circuit: CircuitId, register: String },

    /// A register token refers to a circuit the registry does not know.
    #[error("Circuit not found: {0}")]
    CircuitNotFound(CircuitId),

    /// The circuit was discarded while a handler waited for it.
    #[error("Circuit {0} was abandoned before all registers were declared")]
    CircuitAbandoned(CircuitId),

    /// Not every register was declared in time.
    #[error("Circuit {0} was not fully declared in time")]
    CircuitNotReady(CircuitId),

    /// Handler configuration is invalid.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A script template was rendered with the wrong arguments.
    #[error("Template {template}: {reason}")]
    Template {
        template: &'static str,
        reason: String,
    },

    /// Interpreter output could not be decoded.
    #[error("Cannot decode interpreter output: {0}")]
    Decode(String),

    /// Interpreter session failure, including interpreter-side errors.
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NodeError {
    /// Whether the error was detected before anything reached the interpreter.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            NodeError::Shell(_) | NodeError::Decode(_) | NodeError::CircuitNotReady(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = CircuitId::new("c-1");
        assert_eq!(
            NodeError::QubitsFromDifferentCircuits(id.clone()).to_string(),
            "Qubits from different quantum circuits were mixed in circuit c-1"
        );
        assert_eq!(
            NodeError::UndeclaredRegister {
                circuit: id,
                register: "qr7".into()
            }
            .to_string(),
            "Register qr7 is not declared by circuit c-1"
        );
    }

    #[test]
    fn test_interpreter_errors_pass_through() {
        let err = NodeError::from(ShellError::Interpreter("SyntaxError".into()));
        assert_eq!(err.to_string(), "Interpreter error: SyntaxError");
        assert!(!err.is_validation());
        assert!(NodeError::NotQuantumToken.is_validation());
    }
}
