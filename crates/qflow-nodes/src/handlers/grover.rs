//! Grover's search for one marked basis state.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::context::FlowContext;
use crate::error::{NodeError, NodeResult};
use crate::handlers::{Dispatch, Node, NodeKind, run_isolated};
use crate::message::{Inbound, Message, PIPELINE_TOPIC};
use crate::snippets::{self, Arg};
use crate::token::BitString;

/// Widest search the node will start.
pub const MAX_SEARCH_QUBITS: u32 = 20;

const TOP_MEASUREMENT: &str = "Top measurement:";
const ITERATIONS: &str = "iterations =";

/// Result of one search run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub top_measurement: String,
    pub iterations: u32,
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{TOP_MEASUREMENT} {}\n{ITERATIONS} {}",
            self.top_measurement, self.iterations
        )
    }
}

/// Pick the two report lines out of interpreter output.
pub fn decode_search(output: &str) -> NodeResult<SearchOutcome> {
    let mut top_measurement = None;
    let mut iterations = None;
    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(TOP_MEASUREMENT) {
            top_measurement = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix(ITERATIONS) {
            iterations = rest.trim().parse().ok();
        }
    }

    match (top_measurement, iterations) {
        (Some(top_measurement), Some(iterations)) if !top_measurement.is_empty() => {
            Ok(SearchOutcome {
                top_measurement,
                iterations,
            })
        }
        _ => Err(NodeError::Decode(format!("no search report in {output:?}"))),
    }
}

/// Amplifies the basis state named by a bit-string payload and reports the
/// most frequent measurement.
///
/// Like [`FactorNode`](crate::handlers::FactorNode), every request runs on
/// its own interpreter.
pub struct GroverNode {
    ctx: FlowContext,
}

impl GroverNode {
    pub fn new(ctx: FlowContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Node for GroverNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Simulate
    }

    #[instrument(skip(self, msg))]
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch> {
        let Inbound::Bits(target) = Inbound::parse(&msg)? else {
            return Err(NodeError::InvalidParameter(
                "Grover's search takes a string of 0s and 1s".into(),
            ));
        };
        validate(&target)?;

        let script = snippets::GROVERS.render(&[Arg::Str(target.to_string())])?;
        let outcome = decode_search(&run_isolated(&self.ctx, &script).await?)?;

        info!(
            %target,
            top = %outcome.top_measurement,
            iterations = outcome.iterations,
            "Search finished"
        );
        Ok(Dispatch::Result(Message::new(
            PIPELINE_TOPIC,
            Value::String(outcome.to_string()),
        )))
    }
}

fn validate(target: &BitString) -> NodeResult<()> {
    if target.width() > MAX_SEARCH_QUBITS {
        return Err(NodeError::InvalidParameter(format!(
            "search is limited to {MAX_SEARCH_QUBITS} qubits, got {}",
            target.width()
        )));
    }
    Ok(())
}
