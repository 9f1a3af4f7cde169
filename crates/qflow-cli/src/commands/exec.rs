//! Exec command implementation.

use anyhow::Result;
use console::style;

use super::common::{QflowConfig, read_script, started_session};

/// Execute the exec command.
pub async fn execute(config: &QflowConfig, file: Option<&str>, code: Option<&str>) -> Result<()> {
    let script = read_script(file, code)?;
    let (session, _) = started_session(config).await?;

    let outcome = session.execute(&script).await;
    session.stop().await;

    let output = outcome?;
    if !output.is_empty() {
        println!("{output}");
    }
    eprintln!("{} Done", style("✓").green().bold());
    Ok(())
}
