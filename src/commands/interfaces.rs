//! Interfaces command: list network interfaces and mark the selection.

use anyhow::Result;

use crate::cmd_abstraction::RealCommandExecutor;
use crate::config::Config;
use crate::fs_abstraction::real_fs;
use crate::interfaces::{format_candidates, InterfaceSelector};

/// Run interfaces command
pub async fn run(config: &Config) -> Result<()> {
    let cmd = RealCommandExecutor::new();
    let selector = InterfaceSelector::new(
        &cmd,
        real_fs(),
        &config.preferred_interfaces,
        config.interface.as_deref(),
    );

    let candidates = selector.candidates();
    if candidates.is_empty() {
        println!("No network interfaces found.");
        return Ok(());
    }

    let chosen = selector.choose();
    print!("{}", format_candidates(&candidates, chosen.as_deref().ok()));
    match chosen {
        Ok(name) => println!("\n* = interface setup would configure ({})", name),
        Err(e) => println!("\nNo interface would be selected: {}", e),
    }
    Ok(())
}
