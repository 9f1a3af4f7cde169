//! Bell command implementation.
//!
//! Wires circuit-init → H → CNOT → measure ×2 → local simulator by hand,
//! the way a flow runtime would deliver the messages.

use anyhow::{Context, Result};
use console::style;
use serde_json::Value;

use qflow_nodes::{
    CircuitInitNode, CircuitStructure, Dispatch, FlowContext, Gate, GateNode, LocalSimulatorNode,
    MeasureConfig, MeasureNode, Message, Node, SimulatorConfig,
};
use qflow_shell::InterpreterSession;

use super::common::QflowConfig;

/// Execute the bell command.
pub async fn execute(config: &QflowConfig, shots: u32) -> Result<()> {
    println!(
        "{} Simulating a Bell pair ({} shots)",
        style("→").cyan().bold(),
        shots
    );

    let ctx = FlowContext::new(
        InterpreterSession::new(config.shell.clone()),
        config.flow.clone(),
    );
    let outcome = run(&ctx, shots).await;
    ctx.session.stop().await;
    let counts = outcome?;

    print_counts(&counts, shots);
    Ok(())
}

async fn run(ctx: &FlowContext, shots: u32) -> Result<Value> {
    let init = CircuitInitNode::new(ctx.clone(), CircuitStructure::Qubits { qubits: 2, cbits: 2 })?;
    let hadamard = GateNode::new(ctx.clone(), Gate::Hadamard)?;
    let cnot = GateNode::new(ctx.clone(), Gate::Cnot { target: 1 })?;
    let measures = [
        MeasureNode::new(ctx.clone(), MeasureConfig::bit(0))?,
        MeasureNode::new(ctx.clone(), MeasureConfig::bit(1))?,
    ];
    let simulator = LocalSimulatorNode::new(ctx.clone(), SimulatorConfig { shots })?;

    let wires = single_wires(init.on_input(Message::new("bell", Value::Null)).await?)?;
    let [q0, q1] = <[Message; 2]>::try_from(wires)
        .map_err(|_| anyhow::anyhow!("circuit did not produce two qubits"))?;

    let q0 = single_wires(hadamard.on_input(q0).await?)?;
    let mut pair = Vec::new();
    for msg in q0.into_iter().chain([q1]) {
        pair = single_wires(cnot.on_input(msg).await?)?;
    }

    let mut result = None;
    for (measure, msg) in measures.iter().zip(pair) {
        for measured in single_wires(measure.on_input(msg).await?)? {
            if let Dispatch::Result(counts) = simulator.on_input(measured).await? {
                result = Some(counts.payload);
            }
        }
    }
    result.context("simulator produced no counts")
}

fn single_wires(dispatch: Dispatch) -> Result<Vec<Message>> {
    match dispatch {
        Dispatch::Pending => Ok(Vec::new()),
        Dispatch::Forward(messages) => Ok(messages),
        Dispatch::Result(_) => anyhow::bail!("unexpected terminal result"),
    }
}

fn print_counts(counts: &Value, shots: u32) {
    println!();
    println!("  {:<10} {:>8} {:>8}", "Outcome", "Count", "Share");
    if let Some(map) = counts.as_object() {
        for (outcome, count) in map {
            let count = count.as_u64().unwrap_or(0);
            let share = count as f64 / f64::from(shots.max(1)) * 100.0;
            println!(
                "  {:<10} {:>8} {:>7.1}%",
                style(outcome).green(),
                count,
                share
            );
        }
    }
}
