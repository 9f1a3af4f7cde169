//! Circuit diagrams.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};

use crate::aggregate::{Progress, QubitAggregator};
use crate::context::FlowContext;
use crate::error::{NodeError, NodeResult};
use crate::handlers::{Dispatch, Node, NodeKind, last_line};
use crate::message::{Inbound, Message, PIPELINE_TOPIC};
use crate::snippets;

/// Waits for every qubit of a circuit, then draws it and returns the image
/// as base64-encoded PNG.
pub struct CircuitDiagramNode {
    ctx: FlowContext,
    aggregator: Mutex<QubitAggregator>,
}

impl CircuitDiagramNode {
    pub fn new(ctx: FlowContext) -> Self {
        let aggregator = QubitAggregator::with_stale_after(ctx.config.stale_circuit_timeout());
        Self {
            ctx,
            aggregator: Mutex::new(aggregator),
        }
    }
}

/// Extract the base64 image from the drawing fragment's output.
///
/// Tolerates the `b'...'` wrapper Python prints for a bytes object.
pub fn decode_image(output: &str) -> NodeResult<String> {
    let line = last_line(output);
    let image = line
        .strip_prefix("b'")
        .and_then(|rest| rest.strip_suffix('\''))
        .unwrap_or(line);

    let is_base64 = image
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='));
    if image.is_empty() || !is_base64 || image.len() % 4 != 0 {
        return Err(NodeError::Decode(format!("not a base64 image: {line:?}")));
    }
    Ok(image.to_string())
}

#[async_trait]
impl Node for CircuitDiagramNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Visualize
    }

    #[instrument(skip(self, msg))]
    async fn on_input(&self, msg: Message) -> NodeResult<Dispatch> {
        let token = Inbound::parse(&msg)?.into_qubit()?;
        let progress = self
            .aggregator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accept(token)?;

        let Progress::Ready(tokens) = progress else {
            return Ok(Dispatch::Pending);
        };

        let script = format!(
            "{}\n{}",
            snippets::CIRCUIT_DIAGRAM.render(&[])?,
            snippets::ENCODE_IMAGE.render(&[])?
        );
        let image = decode_image(&self.ctx.session.execute(&script).await?)?;
        info!(qubits = tokens.len(), bytes = image.len(), "Circuit drawn");
        Ok(Dispatch::Result(Message::new(
            PIPELINE_TOPIC,
            Value::String(image),
        )))
    }
}
