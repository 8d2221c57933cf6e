// ganglion-node/src/main.rs
//
// CLI entrypoint: parse config, wire up tracing the way the teacher's own
// `cells/consensus` binary does, build the supervisor and run until a
// shutdown signal. No application services of its own are started here
// (spec.md's application-services step is left to whatever embeds this
// core; the binary carries only the coordination core itself).

mod config;
mod supervisor;

use clap::Parser;
use config::CliArgs;
use ganglion_consensus::{NullApplicationFsm, NullLeadershipHooks};
use ganglion_core::node::SERVICE_ROLE;
use ganglion_core::NodeDetails;
use ganglion_membership::MembershipHooks;
use std::sync::Arc;
use supervisor::Supervisor;

struct LoggingMembershipHooks;

impl MembershipHooks for LoggingMembershipHooks {
    fn on_join(&self, node: &NodeDetails) {
        tracing::info!(node = %node.id, "member joined");
    }

    fn on_leave(&self, node: &NodeDetails) {
        tracing::info!(node = %node.id, "member left");
    }

    fn on_fail(&self, node: &NodeDetails) {
        tracing::warn!(node = %node.id, "member failed");
    }

    fn on_reap(&self, node: &NodeDetails) {
        tracing::warn!(node = %node.id, "member reaped");
    }

    fn on_leader_elected(&self, leader_name: &str) {
        tracing::info!(leader = leader_name, "new leader elected");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = CliArgs::parse();
    let config = cli.load()?;

    let services = config
        .parsed_services()
        .map_err(|err| anyhow::anyhow!("invalid services tag: {err}"))?;

    let local = NodeDetails {
        id: config.node_id.clone(),
        name: config.node_name.clone(),
        role: SERVICE_ROLE.to_string(),
        data_center: config.data_center.clone(),
        bootstrap: config.bootstrap,
        address: config.gossip_bind_addr,
        port: config.gossip_bind_port,
        services,
        status: ganglion_core::MemberStatus::Alive,
    };

    let supervisor = Supervisor::start(
        config,
        local,
        Arc::new(LoggingMembershipHooks),
        Arc::new(NullLeadershipHooks),
        Arc::new(NullApplicationFsm),
    )
    .await?;

    tracing::info!("ganglion-node started");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    supervisor.stop().await;
    Ok(())
}
