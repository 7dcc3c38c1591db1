mod addon;
mod agent;
mod apply;
mod assets;
mod chart;
mod csr;
mod errors;
mod factory;
mod manager;
mod permission;
mod values;

use errors::Error;
use manager::AddonManager;

use clap::Parser;
use kube::Client as KubeClient;
use kube::Config as KubeConfig;
use log;

#[derive(Parser, Debug)]
#[command(version, about = "application-manager addon manager for the hub cluster")]
struct Args {
    /* image of the agent deployed on managed clusters */
    #[arg(long, env = "ADDON_AGENT_IMAGE")]
    agent_image: Option<String>,

    /* namespace the agent is installed into when the addon doesn't set one */
    #[arg(long, env = "ADDON_INSTALL_NAMESPACE")]
    install_namespace: Option<String>,

    /* seconds between two reconciliations of the same object */
    #[arg(long, default_value_t = 60)]
    reconcile_interval: u64,
}

/*
 * The manager watches the application-manager ManagedClusterAddOns of the
 * hub, deploys the agent through a ManifestWork, grants the agent its hub
 * permissions and approves its client certificates.
 */
#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let args = Args::parse();
    let kube_config = KubeConfig::infer().await?;
    let kube_client = KubeClient::try_from(kube_config.clone())?;

    let agent = addon::new_agent_addon(kube_config, args.agent_image.as_deref(), args.install_namespace.as_deref())?;
    log::info!("starting addon manager for {}", agent.name());

    let mgr = AddonManager::new(kube_client, agent, args.reconcile_interval);
    tokio::select! {
	_ = mgr.controller() => {},
	_ = mgr.csr_controller() => {},

	// handle CTRL^C as gracefully as we can.
	_ = tokio::signal::ctrl_c() => {},
    }

    log::info!("addon manager stopped");
    Ok(())
}
