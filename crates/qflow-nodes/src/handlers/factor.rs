//! Integer factoring on a dedicated interpreter.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::context::FlowContext;
use crate::error::{NodeError, NodeResult};
use crate::handlers::{Dispatch, Node, NodeKind, last_line, run_isolated};
use crate::message::{Inbound, Message, PIPELINE_TOPIC};
use crate::snippets::{self, Arg};

/// Factors the integer it receives with Shor's algorithm.
///
/// Each request gets its own interpreter, started and stopped around the
/// run, so a long factoring job never holds the circuit session.
pub struct FactorNode {
    ctx: FlowContext,
}

impl FactorNode {
    pub fn new(ctx: FlowContext) -> Self {
        Self { ctx }
    }
}

fn validate(n: u64) -> NodeResult<i64> {
    if n < 3 || n % 2 == 0 {
        return Err(NodeError::InvalidParameter(format!(
            "{n} must be an odd integer greater than 2"
        )));
    }
    i64::try_from(n).map_err(|_| NodeError::InvalidParameter(format!("{n} is too large")))
}

#[async_trait]
impl Node for FactorNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Simulate
    }

    #[instrument(skip(self, msg))]
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch> {
        let n = match Inbound::parse(&msg)? {
            Inbound::Simulation(request) => validate(request.value)?,
            _ => {
                return Err(NodeError::InvalidParameter(
                    "factoring takes an integer payload".into(),
                ));
            }
        };
        let script = snippets::SHORS.render(&[Arg::Int(n)])?;

        let output = run_isolated(&self.ctx, &script).await?;

        let line = last_line(&output);
        let factors: Value =
            serde_json::from_str(line).map_err(|e| NodeError::Decode(format!("{e}: {line:?}")))?;
        if !factors.is_array() {
            return Err(NodeError::Decode(format!("expected a list, got {line:?}")));
        }

        info!(n, %factors, "Factoring finished");
        Ok(Dispatch::Result(Message::new(
            PIPELINE_TOPIC,
            json!({ "listOfFactors": factors }),
        )))
    }
}
