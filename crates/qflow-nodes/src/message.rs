//! Wire messages and their one-time classification.
//!
//! The flow runtime hands nodes untyped `{ topic, payload }` messages.
//! [`Inbound::parse`] inspects a message once at the boundary and turns it
//! into a tagged variant; handlers pattern-match on that instead of probing
//! payload fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{NodeError, NodeResult};
use crate::token::{BitString, CircuitStructure, QubitToken, RegisterToken};

/// Topic carried by every message produced inside the circuit pipeline.
pub const PIPELINE_TOPIC: &str = "Quantum Circuit";

/// A message as exchanged with the flow runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    /// Build a message with an arbitrary topic.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Build a pipeline message from a serializable payload.
    pub fn pipeline<T: Serialize>(payload: &T) -> NodeResult<Self> {
        Ok(Self::new(PIPELINE_TOPIC, serde_json::to_value(payload)?))
    }

    /// Whether the message was produced by a circuit node.
    pub fn is_pipeline(&self) -> bool {
        self.topic == PIPELINE_TOPIC
    }
}

/// Request that starts a new circuit.
///
/// A structure in the payload overrides the node's configured one. An
/// initial state prepares the qubits once the circuit is declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitInitRequest {
    #[serde(default)]
    pub structure: Option<CircuitStructure>,
    #[serde(default)]
    pub initial_state: Option<BitString>,
}

/// Numeric input for analytic routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationRequest {
    pub value: u64,
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Qubit(QubitToken),
    Register(RegisterToken),
    CircuitInit(CircuitInitRequest),
    Simulation(SimulationRequest),
    /// A bare string of `0`s and `1`s.
    Bits(BitString),
}

impl Inbound {
    /// Classify `msg`.
    ///
    /// Pipeline messages must carry a well-formed token. Anything else is
    /// an external trigger. A string made only of `0`s and `1`s is a basis
    /// state. Any other number or numeric string requests an analytic run.
    /// Every other payload starts a circuit.
    pub fn parse(msg: &Message) -> NodeResult<Self> {
        if msg.is_pipeline() {
            return Self::parse_token(&msg.payload);
        }

        match &msg.payload {
            Value::Number(n) => n
                .as_u64()
                .map(|value| Inbound::Simulation(SimulationRequest { value }))
                .ok_or_else(|| {
                    NodeError::InvalidParameter(format!("{n} is not a non-negative integer"))
                }),
            Value::String(s) => Ok(if let Ok(bits) = BitString::parse(s) {
                Inbound::Bits(bits)
            } else if let Ok(value) = s.trim().parse::<u64>() {
                Inbound::Simulation(SimulationRequest { value })
            } else {
                Inbound::CircuitInit(CircuitInitRequest::default())
            }),
            Value::Object(_) => serde_json::from_value(msg.payload.clone())
                .map(Inbound::CircuitInit)
                .map_err(|e| NodeError::InvalidStructure(e.to_string())),
            _ => Ok(Inbound::CircuitInit(CircuitInitRequest::default())),
        }
    }

    fn parse_token(payload: &Value) -> NodeResult<Self> {
        let Some(fields) = payload.as_object() else {
            return Err(NodeError::NotQubitObject("payload is not an object".into()));
        };

        if fields.contains_key("registerIndex") {
            serde_json::from_value(payload.clone())
                .map(Inbound::Register)
                .map_err(|e| NodeError::MissingRegisterField(e.to_string()))
        } else if fields.contains_key("qubit") {
            serde_json::from_value(payload.clone())
                .map(Inbound::Qubit)
                .map_err(|e| NodeError::NotQubitObject(e.to_string()))
        } else {
            Err(NodeError::NotQubitObject(
                "payload carries neither a qubit nor a register".into(),
            ))
        }
    }

    /// Require a qubit token.
    pub fn into_qubit(self) -> NodeResult<QubitToken> {
        match self {
            Inbound::Qubit(token) => Ok(token),
            Inbound::Register(token) => Err(NodeError::NotQubitObject(format!(
                "register {} of circuit {} must pass through a register node first",
                token.register_index, token.circuit_id
            ))),
            _ => Err(NodeError::NotQuantumToken),
        }
    }

    /// Require a register token.
    pub fn into_register(self) -> NodeResult<RegisterToken> {
        match self {
            Inbound::Register(token) => Ok(token),
            Inbound::Qubit(token) => Err(NodeError::MissingRegisterField(format!(
                "qubit {} of circuit {} is not a register slot",
                token.script_ref(),
                token.circuit_id
            ))),
            _ => Err(NodeError::NotQuantumToken),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::token::CircuitId;

    fn qubit_payload() -> Value {
        json!({
            "circuitId": "c-1",
            "structure": {"kind": "qubits", "qubits": 2, "cbits": 2},
            "qubit": 1
        })
    }

    #[test]
    fn test_parse_qubit() {
        let msg = Message::new(PIPELINE_TOPIC, qubit_payload());
        let token = Inbound::parse(&msg).unwrap().into_qubit().unwrap();
        assert_eq!(token.circuit_id, CircuitId::new("c-1"));
        assert_eq!(token.qubit, 1);
        assert!(token.register.is_none());
    }

    #[test]
    fn test_parse_register() {
        let msg = Message::new(
            PIPELINE_TOPIC,
            json!({
                "circuitId": "c-2",
                "structure": {"kind": "registers", "quantum": 2, "classical": 1},
                "registerIndex": 1
            }),
        );
        let token = Inbound::parse(&msg).unwrap().into_register().unwrap();
        assert_eq!(token.register_index, 1);
    }

    #[test]
    fn test_foreign_topic_is_not_a_token() {
        let msg = Message::new("something else", qubit_payload());
        let err = Inbound::parse(&msg).unwrap().into_qubit().unwrap_err();
        assert!(matches!(err, NodeError::NotQuantumToken));
    }

    #[test]
    fn test_qubit_where_register_expected() {
        let msg = Message::new(PIPELINE_TOPIC, qubit_payload());
        let err = Inbound::parse(&msg).unwrap().into_register().unwrap_err();
        assert!(matches!(err, NodeError::MissingRegisterField(_)));
    }

    #[test]
    fn test_malformed_pipeline_payload() {
        let msg = Message::new(PIPELINE_TOPIC, json!({"circuitId": "c"}));
        assert!(matches!(
            Inbound::parse(&msg),
            Err(NodeError::NotQubitObject(_))
        ));

        let msg = Message::new(PIPELINE_TOPIC, json!({"qubit": "zero"}));
        assert!(matches!(
            Inbound::parse(&msg),
            Err(NodeError::NotQubitObject(_))
        ));

        let msg = Message::new(PIPELINE_TOPIC, json!(42));
        assert!(matches!(
            Inbound::parse(&msg),
            Err(NodeError::NotQubitObject(_))
        ));
    }

    #[test]
    fn test_external_triggers() {
        let msg = Message::new("", json!(15));
        assert_eq!(
            Inbound::parse(&msg).unwrap(),
            Inbound::Simulation(SimulationRequest { value: 15 })
        );

        let msg = Message::new("", json!(" 21 "));
        assert_eq!(
            Inbound::parse(&msg).unwrap(),
            Inbound::Simulation(SimulationRequest { value: 21 })
        );

        let msg = Message::new("", json!("go"));
        assert_eq!(
            Inbound::parse(&msg).unwrap(),
            Inbound::CircuitInit(CircuitInitRequest::default())
        );

        let msg = Message::new(
            "",
            json!({"structure": {"kind": "qubits", "qubits": 3, "cbits": 1}}),
        );
        assert_eq!(
            Inbound::parse(&msg).unwrap(),
            Inbound::CircuitInit(CircuitInitRequest {
                structure: Some(CircuitStructure::Qubits { qubits: 3, cbits: 1 }),
                initial_state: None,
            })
        );
    }

    #[test]
    fn test_bit_string_triggers() {
        let msg = Message::new("", json!("0110"));
        assert_eq!(
            Inbound::parse(&msg).unwrap(),
            Inbound::Bits(BitString::parse("0110").unwrap())
        );

        let msg = Message::new("", json!({"initialState": "10"}));
        let Inbound::CircuitInit(request) = Inbound::parse(&msg).unwrap() else {
            panic!("expected a circuit trigger");
        };
        assert_eq!(request.initial_state.unwrap().as_str(), "10");

        let msg = Message::new("", json!({"initialState": "12"}));
        assert!(matches!(
            Inbound::parse(&msg),
            Err(NodeError::InvalidStructure(_))
        ));
    }

    #[test]
    fn test_oversized_structure_is_rejected_by_consumers() {
        let msg = Message::new(
            PIPELINE_TOPIC,
            json!({
                "circuitId": "c",
                "structure": {"kind": "registers", "quantum": 4294967295u64, "classical": 1},
                "register": {"name": "qr0", "var": "qr0", "totalQubits": 1},
                "qubit": 0
            }),
        );
        let token = Inbound::parse(&msg).unwrap().into_qubit().unwrap();
        assert!(matches!(
            token.structure.validate(),
            Err(NodeError::InvalidStructure(_))
        ));
    }
}
