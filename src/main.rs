//! chiplinkd: daemon entry point.
//!
//! Wires together the ambient stack (logging, configuration, the TDF
//! fixture loader) the rest of the crate is built on. The USB probe
//! transport and the GDB RSP socket listener are external collaborators
//! (spec §6, "process interfaces out of scope") this binary does not
//! implement; what's here is the startup sequence a real run-loop would be
//! built on top of.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use chiplink_core::config::DaemonConfig;
use chiplink_core::target_descriptor::tdf;

fn main() -> Result<()> {
    pretty_env_logger::init();

    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("chiplinkd.toml"));

    let config = DaemonConfig::load(&config_path)
        .with_context(|| format!("loading config from '{}'", config_path.display()))?;

    info!("chiplinkd starting, listen_address={}", config.listen_address);

    let target = tdf::load(&config.target_description_path).with_context(|| {
        format!(
            "loading target description from '{}'",
            config.target_description_path.display()
        )
    })?;
    info!("loaded target description for '{}'", target.device.name);

    if let Some(probe_selector) = &config.probe_selector {
        info!("probe selector: {probe_selector}");
    }

    info!(
        "chiplinkd ready; probe transport and RSP socket wiring are external to this crate (spec §6)"
    );
    Ok(())
}
