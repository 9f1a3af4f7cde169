//! Check command implementation.

use anyhow::Result;
use console::style;

use super::common::{QflowConfig, started_session};

/// Execute the check command.
pub async fn execute(config: &QflowConfig) -> Result<()> {
    println!(
        "{} Starting {}",
        style("→").cyan().bold(),
        style(config.shell.interpreter.display()).green()
    );

    let (session, banner) = started_session(config).await?;
    session.stop().await;

    for line in banner.lines() {
        println!("  {}", style(line).dim());
    }
    println!("{} Interpreter is usable", style("✓").green().bold());
    Ok(())
}
