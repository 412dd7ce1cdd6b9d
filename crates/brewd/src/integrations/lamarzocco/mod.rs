//! La Marzocco espresso machines.
//!
//! One integration instance per `[integrations.lamarzocco.<entry_id>]`
//! table. Each instance talks to its machine over the vendor cloud, the
//! machine's local API when a host is configured, and Bluetooth when
//! enabled and paired.

mod client;
mod coordinator;
mod device;
mod discovery;
mod entity;
mod entry;
mod error;
mod firmware;
mod integration;
mod migration;
mod model;

use std::sync::Arc;

use anyhow::Context;
pub use integration::LaMarzoccoIntegration;
use linkme::distributed_slice;
use tracing::info;

use crate::engine;

pub const DOMAIN: &str = "lamarzocco";

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_lamarzocco(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let machines = &ctx.config.integrations.lamarzocco;
    if machines.is_empty() {
        return Ok(Vec::new());
    }

    // One HTTP client shared by every machine.
    let transports: Arc<dyn client::Transports> =
        Arc::new(client::HttpTransports::new().context("Failed to create HTTP client")?);

    Ok(machines
        .iter()
        .map(|(entry_id, config)| {
            info!("Configuring {} machine {}", DOMAIN, entry_id);
            Box::new(LaMarzoccoIntegration::new(
                entry_id,
                config.clone(),
                ctx.store.clone(),
                transports.clone(),
            )) as Box<dyn engine::Integration>
        })
        .collect())
}
