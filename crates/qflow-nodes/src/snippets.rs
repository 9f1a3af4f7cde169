//! Script fragment templates.
//!
//! Every circuit-building operation has one [`Template`]: a text with `{}`
//! placeholders and an ordered, typed parameter list. [`Template::render`]
//! checks arity and kinds before substituting, so a handler can never send
//! a half-filled fragment to the interpreter.

use std::f64::consts::PI;
use std::fmt::Write as _;

use crate::error::{NodeError, NodeResult};

/// Kind of a template parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    /// Integer literal.
    Int,
    /// Angle given in units of π, rendered in radians.
    Angle,
    /// Quoted string literal.
    Str,
    /// Script identifier.
    Ident,
    /// Single-line expression, e.g. a qubit reference.
    Expr,
    /// Comma-separated expressions.
    ExprList,
}

/// A value substituted for one placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Angle(f64),
    Str(String),
    Ident(String),
    Expr(String),
    ExprList(Vec<String>),
}

impl Arg {
    fn kind(&self) -> Param {
        match self {
            Arg::Int(_) => Param::Int,
            Arg::Angle(_) => Param::Angle,
            Arg::Str(_) => Param::Str,
            Arg::Ident(_) => Param::Ident,
            Arg::Expr(_) => Param::Expr,
            Arg::ExprList(_) => Param::ExprList,
        }
    }
}

/// A parameterized script fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub name: &'static str,
    pub text: &'static str,
    pub params: &'static [Param],
}

impl Template {
    /// Number of `{}` placeholders in the text.
    pub fn placeholders(&self) -> usize {
        self.text.matches("{}").count()
    }

    /// Substitute `args` into the template.
    pub fn render(&self, args: &[Arg]) -> NodeResult<String> {
        if args.len() != self.params.len() {
            return Err(self.error(format!(
                "expected {} arguments, got {}",
                self.params.len(),
                args.len()
            )));
        }

        let mut out = String::with_capacity(self.text.len() + 16 * args.len());
        let mut pieces = self.text.split("{}");
        if let Some(head) = pieces.next() {
            out.push_str(head);
        }

        for (position, ((arg, param), piece)) in
            args.iter().zip(self.params).zip(pieces).enumerate()
        {
            if arg.kind() != *param {
                return Err(self.error(format!(
                    "argument {position} must be {param:?}, got {:?}",
                    arg.kind()
                )));
            }
            self.render_arg(&mut out, position, arg)?;
            out.push_str(piece);
        }

        Ok(out)
    }

    fn render_arg(&self, out: &mut String, position: usize, arg: &Arg) -> NodeResult<()> {
        match arg {
            Arg::Int(value) => {
                let _ = write!(out, "{value}");
            }
            Arg::Angle(turns) => {
                if !turns.is_finite() {
                    return Err(self.error(format!("argument {position} is not a finite angle")));
                }
                let _ = write!(out, "{}", turns * PI);
            }
            Arg::Str(text) => quote_into(out, text),
            Arg::Ident(ident) => {
                if !is_identifier(ident) {
                    return Err(self.error(format!("{ident:?} is not an identifier")));
                }
                out.push_str(ident);
            }
            Arg::Expr(expr) => {
                if !is_expression(expr) {
                    return Err(self.error(format!("{expr:?} is not a single-line expression")));
                }
                out.push_str(expr);
            }
            Arg::ExprList(items) => {
                if items.is_empty() || !items.iter().all(|e| is_expression(e)) {
                    return Err(
                        self.error(format!("argument {position} is not an expression list"))
                    );
                }
                out.push_str(&items.join(", "));
            }
        }
        Ok(())
    }

    fn error(&self, reason: String) -> NodeError {
        NodeError::Template {
            template: self.name,
            reason,
        }
    }
}

fn quote_into(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_expression(s: &str) -> bool {
    !s.trim().is_empty() && !s.contains(['\n', '\r'])
}

pub const IMPORTS: Template = Template {
    name: "IMPORTS",
    text: "import json\n\
           import numpy as np\n\
           from qiskit import *\n\
           from qiskit.circuit.library import UGate\n\
           from qiskit_aer import AerSimulator",
    params: &[],
};

pub const QUANTUM_CIRCUIT_FLAT: Template = Template {
    name: "QUANTUM_CIRCUIT_FLAT",
    text: "qc = QuantumCircuit({}, {})",
    params: &[Param::Int, Param::Int],
};

pub const QUANTUM_CIRCUIT: Template = Template {
    name: "QUANTUM_CIRCUIT",
    text: "qc = QuantumCircuit({})",
    params: &[Param::ExprList],
};

/// Prepares every qubit of `qc` in the given basis state.
pub const INITIALIZE: Template = Template {
    name: "INITIALIZE",
    text: "qc.initialize({}, qc.qubits)",
    params: &[Param::Str],
};

pub const QUANTUM_REGISTER: Template = Template {
    name: "QUANTUM_REGISTER",
    text: "{} = QuantumRegister({}, {})",
    params: &[Param::Ident, Param::Int, Param::Str],
};

pub const CLASSICAL_REGISTER: Template = Template {
    name: "CLASSICAL_REGISTER",
    text: "{} = ClassicalRegister({}, {})",
    params: &[Param::Ident, Param::Int, Param::Str],
};

pub const HADAMARD: Template = Template {
    name: "HADAMARD",
    text: "qc.h({})",
    params: &[Param::Expr],
};

pub const NOT: Template = Template {
    name: "NOT",
    text: "qc.x({})",
    params: &[Param::Expr],
};

pub const PAULI_Y: Template = Template {
    name: "PAULI_Y",
    text: "qc.y({})",
    params: &[Param::Expr],
};

pub const PAULI_Z: Template = Template {
    name: "PAULI_Z",
    text: "qc.z({})",
    params: &[Param::Expr],
};

pub const S_GATE: Template = Template {
    name: "S_GATE",
    text: "qc.s({})",
    params: &[Param::Expr],
};

pub const T_GATE: Template = Template {
    name: "T_GATE",
    text: "qc.t({})",
    params: &[Param::Expr],
};

pub const IDENTITY: Template = Template {
    name: "IDENTITY",
    text: "qc.id({})",
    params: &[Param::Expr],
};

pub const RESET: Template = Template {
    name: "RESET",
    text: "qc.reset({})",
    params: &[Param::Expr],
};

pub const PHASE: Template = Template {
    name: "PHASE",
    text: "qc.p({}, {})",
    params: &[Param::Angle, Param::Expr],
};

/// `qc.rx`, `qc.ry` or `qc.rz`; the first argument is the axis letter.
pub const ROTATION: Template = Template {
    name: "ROTATION",
    text: "qc.r{}({}, {})",
    params: &[Param::Ident, Param::Angle, Param::Expr],
};

pub const U_GATE: Template = Template {
    name: "U_GATE",
    text: "qc.u({}, {}, {}, {})",
    params: &[Param::Angle, Param::Angle, Param::Angle, Param::Expr],
};

pub const CNOT: Template = Template {
    name: "CNOT",
    text: "qc.cx({}, {})",
    params: &[Param::Expr, Param::Expr],
};

pub const TOFFOLI: Template = Template {
    name: "TOFFOLI",
    text: "qc.ccx({}, {}, {})",
    params: &[Param::Expr, Param::Expr, Param::Expr],
};

pub const SWAP: Template = Template {
    name: "SWAP",
    text: "qc.swap({}, {})",
    params: &[Param::Expr, Param::Expr],
};

/// Controls first, target last in the qubit list.
pub const MULTI_CONTROLLED_U: Template = Template {
    name: "MULTI_CONTROLLED_U",
    text: "qc.append(UGate({}, {}, {}).control({}), [{}])",
    params: &[
        Param::Angle,
        Param::Angle,
        Param::Angle,
        Param::Int,
        Param::ExprList,
    ],
};

pub const BARRIER: Template = Template {
    name: "BARRIER",
    text: "qc.barrier({})",
    params: &[Param::ExprList],
};

pub const MEASURE: Template = Template {
    name: "MEASURE",
    text: "qc.measure({}, {})",
    params: &[Param::Expr, Param::Expr],
};

/// Prints the measured counts as one JSON object.
pub const LOCAL_SIMULATOR: Template = Template {
    name: "LOCAL_SIMULATOR",
    text: "simulator = AerSimulator()\n\
           job = simulator.run(transpile(qc, simulator), shots={})\n\
           print(json.dumps(job.result().get_counts()))",
    params: &[Param::Int],
};

/// Prints the factors of an integer as one JSON list.
pub const SHORS: Template = Template {
    name: "SHORS",
    text: "import json\n\
           from qiskit_aer import AerSimulator\n\
           from qiskit.utils import QuantumInstance\n\
           from qiskit.algorithms import Shor\n\
           shor = Shor(quantum_instance=QuantumInstance(AerSimulator(), shots=1000))\n\
           print(json.dumps([[int(f) for f in pair] for pair in shor.factor({}).factors]))",
    params: &[Param::Int],
};

/// Draws `qc` with matplotlib; pair with [`ENCODE_IMAGE`].
pub const CIRCUIT_DIAGRAM: Template = Template {
    name: "CIRCUIT_DIAGRAM",
    text: "import io\n\
           import base64\n\
           import matplotlib\n\
           matplotlib.use(\"Agg\")\n\
           diagram = qc.draw(output=\"mpl\")",
    params: &[],
};

/// Prints the last drawn figure as one line of base64 PNG.
pub const ENCODE_IMAGE: Template = Template {
    name: "ENCODE_IMAGE",
    text: "buffer = io.BytesIO()\n\
           diagram.savefig(buffer, format=\"png\")\n\
           print(base64.b64encode(buffer.getvalue()).decode(\"ascii\"))\n\
           buffer.close()",
    params: &[],
};

/// Searches for one marked basis state and prints the top measurement and
/// the iteration count on two lines.
pub const GROVERS: Template = Template {
    name: "GROVERS",
    text: "from qiskit.algorithms import AmplificationProblem, Grover\n\
           from qiskit.primitives import Sampler\n\
           from qiskit.quantum_info import Statevector\n\
           good_state = {}\n\
           oracle = Statevector.from_label(good_state)\n\
           problem = AmplificationProblem(oracle, is_good_state=[good_state])\n\
           width = len(good_state)\n\
           iterations = Grover.optimal_num_iterations(num_solutions=1, num_qubits=width)\n\
           result = Grover(iterations=iterations, sampler=Sampler()).amplify(problem)\n\
           print(\"Top measurement:\", result.top_measurement)\n\
           print(\"iterations =\", iterations)",
    params: &[Param::Str],
};

/// Every template, for lookup by name.
pub static CATALOGUE: &[Template] = &[
    IMPORTS,
    QUANTUM_CIRCUIT_FLAT,
    QUANTUM_CIRCUIT,
    INITIALIZE,
    QUANTUM_REGISTER,
    CLASSICAL_REGISTER,
    HADAMARD,
    NOT,
    PAULI_Y,
    PAULI_Z,
    S_GATE,
    T_GATE,
    IDENTITY,
    RESET,
    PHASE,
    ROTATION,
    U_GATE,
    CNOT,
    TOFFOLI,
    SWAP,
    MULTI_CONTROLLED_U,
    BARRIER,
    MEASURE,
    LOCAL_SIMULATOR,
    SHORS,
    CIRCUIT_DIAGRAM,
    ENCODE_IMAGE,
    GROVERS,
];

/// Find a template by name.
pub fn lookup(name: &str) -> Option<&'static Template> {
    CATALOGUE.iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_arity() {
        for template in CATALOGUE {
            assert_eq!(
                template.placeholders(),
                template.params.len(),
                "{} placeholder count",
                template.name
            );
        }
    }

    #[test]
    fn test_catalogue_names_unique() {
        for (i, a) in CATALOGUE.iter().enumerate() {
            assert!(CATALOGUE[i + 1..].iter().all(|b| b.name != a.name));
        }
        assert_eq!(lookup("CNOT"), Some(&CNOT));
        assert!(lookup("NOPE").is_none());
    }

    #[test]
    fn test_render_register() {
        let out = QUANTUM_REGISTER
            .render(&[
                Arg::Ident("qr0".into()),
                Arg::Int(3),
                Arg::Str("my \"reg\"".into()),
            ])
            .unwrap();
        assert_eq!(out, r#"qr0 = QuantumRegister(3, "my \"reg\"")"#);
    }

    #[test]
    fn test_render_angles_in_radians() {
        let out = PHASE.render(&[Arg::Angle(0.5), Arg::Expr("0".into())]).unwrap();
        assert_eq!(out, format!("qc.p({}, 0)", PI / 2.0));

        let out = ROTATION
            .render(&[Arg::Ident("y".into()), Arg::Angle(1.0), Arg::Expr("qr0[1]".into())])
            .unwrap();
        assert_eq!(out, format!("qc.ry({PI}, qr0[1])"));

        let err = PHASE
            .render(&[Arg::Angle(f64::NAN), Arg::Expr("0".into())])
            .unwrap_err();
        assert!(matches!(err, NodeError::Template { template: "PHASE", .. }));
    }

    #[test]
    fn test_render_rejects_wrong_arguments() {
        assert!(HADAMARD.render(&[]).is_err());
        assert!(HADAMARD.render(&[Arg::Int(0)]).is_err());
        assert!(HADAMARD.render(&[Arg::Expr("0\nimport os".into())]).is_err());
        assert!(QUANTUM_REGISTER
            .render(&[Arg::Ident("1qr".into()), Arg::Int(1), Arg::Str("a".into())])
            .is_err());
        assert!(BARRIER.render(&[Arg::ExprList(vec![])]).is_err());
    }

    #[test]
    fn test_render_lists() {
        let out = MULTI_CONTROLLED_U
            .render(&[
                Arg::Angle(0.0),
                Arg::Angle(0.0),
                Arg::Angle(0.0),
                Arg::Int(2),
                Arg::ExprList(vec!["0".into(), "1".into(), "2".into()]),
            ])
            .unwrap();
        assert_eq!(out, "qc.append(UGate(0, 0, 0).control(2), [0, 1, 2])");
    }

    #[test]
    fn test_render_initialize_and_search() {
        let out = INITIALIZE.render(&[Arg::Str("0101".into())]).unwrap();
        assert_eq!(out, r#"qc.initialize("0101", qc.qubits)"#);

        let out = GROVERS.render(&[Arg::Str("111".into())]).unwrap();
        assert!(out.contains(r#"good_state = "111""#));
        assert!(out.lines().all(|l| !l.starts_with(' ')));

        let drawing = format!(
            "{}\n{}",
            CIRCUIT_DIAGRAM.render(&[]).unwrap(),
            ENCODE_IMAGE.render(&[]).unwrap()
        );
        assert!(drawing.contains("qc.draw(output=\"mpl\")"));
        assert!(drawing.ends_with("buffer.close()"));
    }

    #[test]
    fn test_render_multiline() {
        let out = LOCAL_SIMULATOR.render(&[Arg::Int(1024)]).unwrap();
        assert!(out.contains("shots=1024"));
        assert_eq!(out.lines().count(), 3);
        assert!(IMPORTS.render(&[]).unwrap().lines().all(|l| !l.starts_with(' ')));
    }
}
