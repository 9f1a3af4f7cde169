//! Per-circuit qubit aggregation.
//!
//! A terminal node only advances once every qubit of a circuit has reached
//! it. [`QubitAggregator`] keeps one record per circuit identity:
//!
//! ```text
//!   EMPTY ──accept──→ ACCUMULATING ──accept──→ READY (record removed)
//!     │                    │
//!     └────────────────────┴──invalid token──→ ERROR (record removed)
//! ```
//!
//! Records are dropped on READY and on every error, so a failed circuit
//! never blocks the next one. A record that has not advanced within the
//! configured stale timeout is dropped as well: its circuit failed upstream
//! and the remaining tokens will never arrive.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{NodeError, NodeResult};
use crate::token::{CircuitId, CircuitStructure, QubitToken};

/// Outcome of accepting one token.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// More tokens are needed.
    Accumulating { received: usize, expected: usize },
    /// Every qubit has arrived; tokens in arrival order.
    Ready(Vec<QubitToken>),
}

#[derive(Debug, Clone, Copy)]
struct RegisterCount {
    count: u32,
    total: u32,
}

#[derive(Debug)]
struct CircuitRecord {
    structure: CircuitStructure,
    registers: BTreeMap<String, RegisterCount>,
    received: Vec<QubitToken>,
    touched: Instant,
}

impl CircuitRecord {
    fn new(structure: CircuitStructure, now: Instant) -> Self {
        Self {
            structure,
            registers: BTreeMap::new(),
            received: Vec::new(),
            touched: now,
        }
    }

    fn expected(&self) -> usize {
        match self.structure {
            CircuitStructure::Qubits { qubits, .. } => qubits as usize,
            CircuitStructure::Registers { .. } => {
                // Unknown until every register has shown up once.
                let known: u32 = self.registers.values().map(|r| r.total).sum();
                known as usize
            }
        }
    }

    fn is_ready(&self) -> bool {
        match self.structure {
            CircuitStructure::Qubits { qubits, .. } => self.received.len() == qubits as usize,
            CircuitStructure::Registers { quantum, .. } => {
                self.registers.len() == quantum as usize
                    && self.registers.values().all(|r| r.count == r.total)
            }
        }
    }
}

/// Collects qubit tokens until their circuit is complete.
#[derive(Debug, Default)]
pub struct QubitAggregator {
    circuits: FxHashMap<CircuitId, CircuitRecord>,
    stale_after: Option<Duration>,
}

impl QubitAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An aggregator that drops circuits idle for longer than `stale_after`.
    pub fn with_stale_after(stale_after: Option<Duration>) -> Self {
        Self {
            circuits: FxHashMap::default(),
            stale_after,
        }
    }

    /// Drop every circuit that has not advanced since `now - stale_after`.
    /// Returns how many were dropped.
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let Some(limit) = self.stale_after else {
            return 0;
        };
        let before = self.circuits.len();
        self.circuits.retain(|circuit, record| {
            let fresh = now.saturating_duration_since(record.touched) <= limit;
            if !fresh {
                warn!(%circuit, held = record.received.len(), "Dropping stale circuit");
            }
            fresh
        });
        before - self.circuits.len()
    }

    /// Number of circuits with tokens outstanding.
    pub fn len(&self) -> usize {
        self.circuits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.circuits.is_empty()
    }

    /// Tokens held for `circuit`.
    pub fn received(&self, circuit: &CircuitId) -> usize {
        self.circuits.get(circuit).map_or(0, |r| r.received.len())
    }

    /// Forget everything held for `circuit`.
    pub fn clear(&mut self, circuit: &CircuitId) {
        self.circuits.remove(circuit);
    }

    /// Record `token` and report whether its circuit is complete.
    ///
    /// On any error the circuit's record is discarded before returning.
    pub fn accept(&mut self, token: QubitToken) -> NodeResult<Progress> {
        let now = Instant::now();
        self.evict_stale(now);

        let circuit = token.circuit_id.clone();
        match self.advance(token, now) {
            Ok(false) => {
                let record = &self.circuits[&circuit];
                let progress = Progress::Accumulating {
                    received: record.received.len(),
                    expected: record.expected(),
                };
                debug!(%circuit, ?progress, "Qubit accepted");
                Ok(progress)
            }
            Ok(true) => {
                let record = self
                    .circuits
                    .remove(&circuit)
                    .ok_or_else(|| NodeError::CircuitNotFound(circuit.clone()))?;
                validate_same_circuit(&circuit, &record.received)?;
                debug!(%circuit, qubits = record.received.len(), "Circuit complete");
                Ok(Progress::Ready(record.received))
            }
            Err(e) => {
                warn!(%circuit, "Discarding circuit: {}", e);
                self.circuits.remove(&circuit);
                Err(e)
            }
        }
    }

    /// Returns whether the circuit became ready.
    fn advance(&mut self, token: QubitToken, now: Instant) -> NodeResult<bool> {
        token.structure.validate()?;

        let circuit = token.circuit_id.clone();
        let record = self
            .circuits
            .entry(circuit.clone())
            .or_insert_with(|| CircuitRecord::new(token.structure, now));

        if record.structure != token.structure {
            return Err(NodeError::RegisterStructureMismatch {
                circuit,
                reason: format!(
                    "token declares {:?}, circuit declared {:?}",
                    token.structure, record.structure
                ),
            });
        }

        match (token.structure, &token.register) {
            (CircuitStructure::Qubits { qubits, .. }, None) => {
                if token.qubit >= qubits {
                    return Err(NodeError::NotQubitObject(format!(
                        "qubit {} is outside a circuit of {} qubits",
                        token.qubit, qubits
                    )));
                }
                if record.received.iter().any(|t| t.qubit == token.qubit) {
                    return Err(NodeError::QubitsFromDifferentCircuits(circuit));
                }
            }
            (CircuitStructure::Registers { quantum, .. }, Some(register)) => {
                match register.index() {
                    Some(i) if i < token.structure.fan_out() => {}
                    _ => {
                        return Err(NodeError::UndeclaredRegister {
                            circuit,
                            register: register.var.clone(),
                        });
                    }
                }
                if register.total_qubits == 0 || token.qubit >= register.total_qubits {
                    return Err(NodeError::NotQubitObject(format!(
                        "qubit {} is outside register {} of {} qubits",
                        token.qubit, register.var, register.total_qubits
                    )));
                }

                match record.registers.get(&register.var) {
                    None if record.registers.len() == quantum as usize => {
                        return Err(NodeError::QubitsFromDifferentCircuits(circuit));
                    }
                    Some(seen) if seen.count == seen.total => {
                        return Err(NodeError::QubitsFromDifferentCircuits(circuit));
                    }
                    Some(seen) if seen.total != register.total_qubits => {
                        return Err(NodeError::RegisterStructureMismatch {
                            circuit,
                            reason: format!(
                                "register {} has {} qubits, token claims {}",
                                register.var, seen.total, register.total_qubits
                            ),
                        });
                    }
                    _ => {}
                }
                if record
                    .received
                    .iter()
                    .any(|t| t.position() == token.position())
                {
                    return Err(NodeError::QubitsFromDifferentCircuits(circuit));
                }

                record
                    .registers
                    .entry(register.var.clone())
                    .or_insert(RegisterCount {
                        count: 0,
                        total: register.total_qubits,
                    })
                    .count += 1;
            }
            (CircuitStructure::Registers { .. }, None) => {
                return Err(NodeError::MissingRegisterField(format!(
                    "circuit {circuit} uses registers but qubit {} names none",
                    token.qubit
                )));
            }
            (CircuitStructure::Qubits { .. }, Some(register)) => {
                return Err(NodeError::RegisterStructureMismatch {
                    circuit,
                    reason: format!("circuit has no registers but token names {}", register.var),
                });
            }
        }

        record.received.push(token);
        record.touched = now;
        Ok(record.is_ready())
    }
}

/// Every token must belong to `circuit`.
pub fn validate_same_circuit(circuit: &CircuitId, tokens: &[QubitToken]) -> NodeResult<()> {
    if tokens.iter().all(|t| &t.circuit_id == circuit) {
        Ok(())
    } else {
        Err(NodeError::QubitsFromDifferentCircuits(circuit.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::RegisterRef;

    fn flat(id: &str, qubits: u32, qubit: u32) -> QubitToken {
        QubitToken::flat(
            CircuitId::new(id),
            CircuitStructure::Qubits { qubits, cbits: qubits },
            qubit,
        )
    }

    fn registered(id: &str, quantum: u32, var: &str, total: u32, qubit: u32) -> QubitToken {
        QubitToken::in_register(
            CircuitId::new(id),
            CircuitStructure::Registers {
                quantum,
                classical: 0,
            },
            RegisterRef {
                name: var.to_string(),
                var: var.to_string(),
                total_qubits: total,
            },
            qubit,
        )
    }

    #[test]
    fn test_flat_circuit_becomes_ready() {
        let mut agg = QubitAggregator::new();
        assert_eq!(
            agg.accept(flat("a", 3, 2)).unwrap(),
            Progress::Accumulating {
                received: 1,
                expected: 3
            }
        );
        assert!(matches!(
            agg.accept(flat("a", 3, 0)).unwrap(),
            Progress::Accumulating { received: 2, .. }
        ));
        match agg.accept(flat("a", 3, 1)).unwrap() {
            Progress::Ready(tokens) => {
                let order: Vec<u32> = tokens.iter().map(|t| t.qubit).collect();
                assert_eq!(order, vec![2, 0, 1]);
            }
            other => panic!("expected ready, got {other:?}"),
        }
        assert!(agg.is_empty());
    }

    #[test]
    fn test_stale_circuits_are_evicted() {
        let mut agg = QubitAggregator::with_stale_after(Some(Duration::from_secs(60)));
        agg.accept(flat("abandoned", 2, 0)).unwrap();
        assert_eq!(agg.evict_stale(Instant::now()), 0);

        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(agg.evict_stale(later), 1);
        assert!(agg.is_empty());
    }

    #[test]
    fn test_no_eviction_without_limit() {
        let mut agg = QubitAggregator::new();
        agg.accept(flat("a", 2, 0)).unwrap();
        assert_eq!(agg.evict_stale(Instant::now() + Duration::from_secs(86_400)), 0);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn test_overflowing_structure_is_rejected() {
        let mut agg = QubitAggregator::new();
        let token = registered("a", u32::MAX, "qr0", 1, 0);
        let token = QubitToken {
            structure: CircuitStructure::Registers {
                quantum: u32::MAX,
                classical: 1,
            },
            ..token
        };
        assert!(matches!(agg.accept(token), Err(NodeError::InvalidStructure(_))));
        assert!(agg.is_empty());
    }

    #[test]
    fn test_circuits_are_independent() {
        let mut agg = QubitAggregator::new();
        agg.accept(flat("a", 2, 0)).unwrap();
        agg.accept(flat("b", 2, 0)).unwrap();
        assert_eq!(agg.len(), 2);
        assert!(matches!(agg.accept(flat("b", 2, 1)).unwrap(), Progress::Ready(_)));
        assert_eq!(agg.received(&CircuitId::new("a")), 1);
    }

    #[test]
    fn test_duplicate_flat_qubit() {
        let mut agg = QubitAggregator::new();
        agg.accept(flat("a", 2, 0)).unwrap();
        let err = agg.accept(flat("a", 2, 0)).unwrap_err();
        assert!(matches!(err, NodeError::QubitsFromDifferentCircuits(_)));
        assert!(agg.is_empty());
    }

    #[test]
    fn test_structure_mismatch() {
        let mut agg = QubitAggregator::new();
        agg.accept(flat("a", 2, 0)).unwrap();
        let err = agg.accept(flat("a", 3, 1)).unwrap_err();
        assert!(matches!(err, NodeError::RegisterStructureMismatch { .. }));
        assert!(agg.is_empty());
    }

    #[test]
    fn test_zero_qubits_rejected_before_aggregation() {
        let mut agg = QubitAggregator::new();
        let err = agg.accept(flat("a", 0, 0)).unwrap_err();
        assert!(matches!(err, NodeError::InvalidStructure(_)));
        assert!(agg.is_empty());
    }

    #[test]
    fn test_register_overflow() {
        let mut agg = QubitAggregator::new();
        agg.accept(registered("a", 2, "qr0", 1, 0)).unwrap();
        // Second token for a full register.
        let err = agg.accept(registered("a", 2, "qr0", 1, 0)).unwrap_err();
        assert!(matches!(err, NodeError::QubitsFromDifferentCircuits(_)));
    }

    #[test]
    fn test_unexpected_extra_register() {
        let mut agg = QubitAggregator::new();
        agg.accept(registered("a", 1, "qr0", 2, 0)).unwrap();
        let err = agg.accept(registered("a", 1, "qr1", 2, 0)).unwrap_err();
        // qr1 is out of range for a single-register circuit.
        assert!(matches!(err, NodeError::UndeclaredRegister { .. }));
    }

    #[test]
    fn test_undeclared_register_var() {
        let mut agg = QubitAggregator::new();
        let err = agg.accept(registered("a", 2, "bogus", 1, 0)).unwrap_err();
        assert!(matches!(
            err,
            NodeError::UndeclaredRegister { ref register, .. } if register == "bogus"
        ));
    }

    #[test]
    fn test_layout_mismatch() {
        let mut agg = QubitAggregator::new();
        let mut token = registered("a", 1, "qr0", 1, 0);
        token.register = None;
        assert!(matches!(
            agg.accept(token).unwrap_err(),
            NodeError::MissingRegisterField(_)
        ));

        let mut token = flat("b", 1, 0);
        token.register = Some(RegisterRef {
            name: "r".into(),
            var: "qr0".into(),
            total_qubits: 1,
        });
        assert!(matches!(
            agg.accept(token).unwrap_err(),
            NodeError::RegisterStructureMismatch { .. }
        ));
    }

    #[test]
    fn test_mixed_circuit_ids_rejected() {
        let tokens = vec![flat("a", 2, 0), flat("b", 2, 1)];
        assert!(validate_same_circuit(&CircuitId::new("a"), &tokens).is_err());
        assert!(validate_same_circuit(&CircuitId::new("a"), &tokens[..1]).is_ok());
    }
}
