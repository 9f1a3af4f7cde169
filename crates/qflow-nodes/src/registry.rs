//! Register declarations for circuits in register layout.
//!
//! Each register node of a circuit reserves its register index before
//! submitting its declaration fragment and confirms it once the fragment
//! has run. The node that confirms the last register also declares the
//! circuit itself and marks it complete; quantum register nodes wait for
//! that signal before handing out qubits.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{NodeError, NodeResult};
use crate::token::{BitString, CircuitId, CircuitStructure, RegisterKind};

/// One register as declared by its node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredRegister {
    pub kind: RegisterKind,
    pub var: String,
    pub name: String,
    pub size: u32,
}

/// Everything needed to declare a circuit once all registers have run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitDeclaration {
    /// Script variables in register-index order.
    pub vars: Vec<String>,
    /// Qubits across all quantum registers.
    pub qubits: u32,
    pub initial_state: Option<BitString>,
}

/// Declaration progress after a register was confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Partial { confirmed: usize, expected: usize },
    /// Every register has run.
    Complete(CircuitDeclaration),
}

#[derive(Debug)]
struct Slot {
    register: DeclaredRegister,
    confirmed: bool,
}

#[derive(Debug)]
struct CircuitEntry {
    structure: CircuitStructure,
    initial_state: Option<BitString>,
    slots: BTreeMap<u32, Slot>,
    ready: watch::Sender<bool>,
}

/// Shared table of circuits whose registers are being declared.
#[derive(Debug, Default)]
pub struct CircuitRegistry {
    circuits: Mutex<FxHashMap<CircuitId, CircuitEntry>>,
}

impl CircuitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<CircuitId, CircuitEntry>> {
        self.circuits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `circuit` is still being declared.
    pub fn contains(&self, circuit: &CircuitId) -> bool {
        self.lock().contains_key(circuit)
    }

    /// Open a new circuit in register layout.
    pub fn begin(&self, circuit: CircuitId, structure: CircuitStructure) -> NodeResult<()> {
        self.begin_with_state(circuit, structure, None)
    }

    /// Open a new circuit whose qubits start in `initial_state`.
    pub fn begin_with_state(
        &self,
        circuit: CircuitId,
        structure: CircuitStructure,
        initial_state: Option<BitString>,
    ) -> NodeResult<()> {
        structure.validate()?;
        if !structure.uses_registers() {
            return Err(NodeError::InvalidStructure(
                "only circuits with registers declare them".into(),
            ));
        }

        let (ready, _) = watch::channel(false);
        debug!(%circuit, ?structure, "Circuit opened");
        self.lock().insert(
            circuit,
            CircuitEntry {
                structure,
                initial_state,
                slots: BTreeMap::new(),
                ready,
            },
        );
        Ok(())
    }

    /// Reserve register `index` of `circuit`.
    ///
    /// Returns a receiver that turns `true` once the whole circuit has been
    /// declared. Any validation failure discards the circuit.
    pub fn reserve(
        &self,
        circuit: &CircuitId,
        structure: CircuitStructure,
        index: u32,
        register: DeclaredRegister,
    ) -> NodeResult<watch::Receiver<bool>> {
        let mut circuits = self.lock();
        let entry = circuits
            .get_mut(circuit)
            .ok_or_else(|| NodeError::CircuitNotFound(circuit.clone()))?;

        match Self::check(circuit, entry, structure, index, &register) {
            Ok(()) => {
                debug!(%circuit, index, var = %register.var, "Register reserved");
                let ready = entry.ready.subscribe();
                entry.slots.insert(
                    index,
                    Slot {
                        register,
                        confirmed: false,
                    },
                );
                Ok(ready)
            }
            Err(e) => {
                warn!(%circuit, "Discarding circuit: {}", e);
                circuits.remove(circuit);
                Err(e)
            }
        }
    }

    fn check(
        circuit: &CircuitId,
        entry: &CircuitEntry,
        structure: CircuitStructure,
        index: u32,
        register: &DeclaredRegister,
    ) -> NodeResult<()> {
        if entry.structure != structure {
            return Err(NodeError::RegisterStructureMismatch {
                circuit: circuit.clone(),
                reason: format!(
                    "register declares {:?}, circuit declared {:?}",
                    structure, entry.structure
                ),
            });
        }
        let CircuitStructure::Registers { quantum, classical } = entry.structure else {
            return Err(NodeError::InvalidStructure(
                "only circuits with registers declare them".into(),
            ));
        };

        if index >= entry.structure.fan_out() {
            return Err(NodeError::UndeclaredRegister {
                circuit: circuit.clone(),
                register: register.var.clone(),
            });
        }
        if entry.slots.contains_key(&index) {
            return Err(NodeError::QubitsFromDifferentCircuits(circuit.clone()));
        }

        let limit = match register.kind {
            RegisterKind::Quantum => quantum,
            RegisterKind::Classical => classical,
        };
        let same_kind = entry
            .slots
            .values()
            .filter(|s| s.register.kind == register.kind)
            .count();
        if same_kind >= limit as usize {
            return Err(NodeError::RegisterStructureMismatch {
                circuit: circuit.clone(),
                reason: format!("circuit declares only {limit} {:?} registers", register.kind),
            });
        }
        Ok(())
    }

    /// Mark register `index` as executed.
    pub fn confirm(&self, circuit: &CircuitId, index: u32) -> NodeResult<Declaration> {
        let mut circuits = self.lock();
        let entry = circuits
            .get_mut(circuit)
            .ok_or_else(|| NodeError::CircuitAbandoned(circuit.clone()))?;
        let slot = entry
            .slots
            .get_mut(&index)
            .ok_or_else(|| NodeError::CircuitAbandoned(circuit.clone()))?;
        slot.confirmed = true;

        let expected = entry.structure.fan_out() as usize;
        let confirmed = entry.slots.values().filter(|s| s.confirmed).count();
        if confirmed < expected {
            return Ok(Declaration::Partial {
                confirmed,
                expected,
            });
        }

        let vars = entry
            .slots
            .values()
            .map(|s| s.register.var.clone())
            .collect();
        let qubits = entry
            .slots
            .values()
            .filter(|s| s.register.kind == RegisterKind::Quantum)
            .map(|s| s.register.size)
            .sum();
        Ok(Declaration::Complete(CircuitDeclaration {
            vars,
            qubits,
            initial_state: entry.initial_state.clone(),
        }))
    }

    /// Signal waiters that the circuit is declared and drop its entry.
    pub fn complete(&self, circuit: &CircuitId) {
        if let Some(entry) = self.lock().remove(circuit) {
            entry.ready.send_replace(true);
            info!(%circuit, registers = entry.slots.len(), "Circuit declared");
        }
    }

    /// Drop `circuit`; anyone waiting on it fails.
    pub fn discard(&self, circuit: &CircuitId) {
        if self.lock().remove(circuit).is_some() {
            debug!(%circuit, "Circuit discarded");
        }
    }

    /// Wait until the circuit behind `ready` has been declared.
    pub async fn wait_ready(
        circuit: &CircuitId,
        mut ready: watch::Receiver<bool>,
        timeout: Duration,
    ) -> NodeResult<()> {
        match tokio::time::timeout(timeout, ready.wait_for(|declared| *declared)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(NodeError::CircuitAbandoned(circuit.clone())),
            Err(_) => Err(NodeError::CircuitNotReady(circuit.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_BY_ONE: CircuitStructure = CircuitStructure::Registers {
        quantum: 2,
        classical: 1,
    };

    fn quantum(index: u32) -> DeclaredRegister {
        DeclaredRegister {
            kind: RegisterKind::Quantum,
            var: RegisterKind::Quantum.var(index),
            name: format!("q{index}"),
            size: 2,
        }
    }

    fn classical(index: u32) -> DeclaredRegister {
        DeclaredRegister {
            kind: RegisterKind::Classical,
            var: RegisterKind::Classical.var(index),
            name: format!("c{index}"),
            size: 2,
        }
    }

    #[tokio::test]
    async fn test_full_declaration() {
        let registry = CircuitRegistry::new();
        let id = CircuitId::new("c");
        registry.begin(id.clone(), TWO_BY_ONE).unwrap();

        let rx = registry.reserve(&id, TWO_BY_ONE, 2, classical(2)).unwrap();
        registry.reserve(&id, TWO_BY_ONE, 0, quantum(0)).unwrap();
        registry.reserve(&id, TWO_BY_ONE, 1, quantum(1)).unwrap();

        assert_eq!(
            registry.confirm(&id, 1).unwrap(),
            Declaration::Partial {
                confirmed: 1,
                expected: 3
            }
        );
        registry.confirm(&id, 2).unwrap();
        assert_eq!(
            registry.confirm(&id, 0).unwrap(),
            Declaration::Complete(CircuitDeclaration {
                vars: vec!["qr0".into(), "qr1".into(), "cr2".into()],
                qubits: 4,
                initial_state: None,
            })
        );

        registry.complete(&id);
        assert!(!registry.contains(&id));
        CircuitRegistry::wait_ready(&id, rx, Duration::from_millis(10))
            .await
            .unwrap();
    }

    #[test]
    fn test_initial_state_travels_with_declaration() {
        let registry = CircuitRegistry::new();
        let id = CircuitId::new("c");
        let structure = CircuitStructure::Registers {
            quantum: 1,
            classical: 0,
        };
        let bits = BitString::parse("10").unwrap();
        registry
            .begin_with_state(id.clone(), structure, Some(bits.clone()))
            .unwrap();
        registry.reserve(&id, structure, 0, quantum(0)).unwrap();

        let Declaration::Complete(declared) = registry.confirm(&id, 0).unwrap() else {
            panic!("single register should complete the circuit");
        };
        assert_eq!(declared.qubits, 2);
        assert_eq!(declared.initial_state, Some(bits));
    }

    #[test]
    fn test_duplicate_index_discards() {
        let registry = CircuitRegistry::new();
        let id = CircuitId::new("c");
        registry.begin(id.clone(), TWO_BY_ONE).unwrap();
        registry.reserve(&id, TWO_BY_ONE, 0, quantum(0)).unwrap();

        let err = registry.reserve(&id, TWO_BY_ONE, 0, quantum(0)).unwrap_err();
        assert!(matches!(err, NodeError::QubitsFromDifferentCircuits(_)));
        assert!(!registry.contains(&id));

        let err = registry.reserve(&id, TWO_BY_ONE, 1, quantum(1)).unwrap_err();
        assert!(matches!(err, NodeError::CircuitNotFound(_)));
    }

    #[test]
    fn test_reserve_validation() {
        let registry = CircuitRegistry::new();
        let id = CircuitId::new("c");

        registry.begin(id.clone(), TWO_BY_ONE).unwrap();
        let err = registry.reserve(&id, TWO_BY_ONE, 3, quantum(3)).unwrap_err();
        assert!(matches!(err, NodeError::UndeclaredRegister { .. }));

        registry.begin(id.clone(), TWO_BY_ONE).unwrap();
        registry.reserve(&id, TWO_BY_ONE, 0, classical(0)).unwrap();
        let err = registry.reserve(&id, TWO_BY_ONE, 1, classical(1)).unwrap_err();
        assert!(matches!(err, NodeError::RegisterStructureMismatch { .. }));

        registry.begin(id.clone(), TWO_BY_ONE).unwrap();
        let other = CircuitStructure::Registers {
            quantum: 1,
            classical: 1,
        };
        let err = registry.reserve(&id, other, 0, quantum(0)).unwrap_err();
        assert!(matches!(err, NodeError::RegisterStructureMismatch { .. }));

        let flat = CircuitStructure::Qubits { qubits: 1, cbits: 0 };
        assert!(registry.begin(id, flat).is_err());
    }

    #[tokio::test]
    async fn test_discard_wakes_waiters() {
        let registry = CircuitRegistry::new();
        let id = CircuitId::new("c");
        registry.begin(id.clone(), TWO_BY_ONE).unwrap();
        let rx = registry.reserve(&id, TWO_BY_ONE, 0, quantum(0)).unwrap();

        registry.discard(&id);
        let err = CircuitRegistry::wait_ready(&id, rx, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::CircuitAbandoned(_)));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let registry = CircuitRegistry::new();
        let id = CircuitId::new("c");
        registry.begin(id.clone(), TWO_BY_ONE).unwrap();
        let rx = registry.reserve(&id, TWO_BY_ONE, 0, quantum(0)).unwrap();

        let err = CircuitRegistry::wait_ready(&id, rx, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::CircuitNotReady(_)));
    }
}
