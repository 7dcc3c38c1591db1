use crate::apply::FIELD_MANAGER;
use crate::csr;
use crate::errors::Error;
use crate::factory::HelmAgentAddon;
use ocm_api as api;

use futures::StreamExt;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::Resource;
use kube::ResourceExt;
use kube::api::Patch as KubePatch;
use kube::api::PatchParams as KubePatchParams;
use kube::runtime::controller::Action as KubeAction;
use kube::runtime::controller::Controller as KubeController;
use kube::runtime::watcher::Config as KubeWatcherConfig;
use log;
use serde_json::json;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/*
 * AddonManager runs the agent addon on the hub: it keeps one ManifestWork
 * per cluster enabling the addon, provisions the agent permissions, and
 * approves the CSRs the agents issue.
 */
#[derive(Clone)]
pub struct AddonManager {
    reconciliation_interval: u64,
    agent: Arc<HelmAgentAddon>,

    kube_client: KubeClient,
    addon_api: KubeApi<api::ManagedClusterAddOn>,
    cluster_api: KubeApi<api::ManagedCluster>,
    csr_api: KubeApi<CertificateSigningRequest>,
}

#[derive(Clone)]
struct AddonManagerCtx {
    manager: AddonManager,
}

pub fn work_name(addon_name: &str) -> String {
    format!("addon-{}-deploy", addon_name)
}

fn requeue_after(interval: u64) -> KubeAction {
    KubeAction::requeue(Duration::from_secs(interval))
}

/* `object`, or the action to take while it doesn't exist yet */
fn found_or_requeue<T>(object: Option<T>, interval: u64) -> Result<T, KubeAction> {
    object.ok_or_else(|| requeue_after(interval))
}

/*
 * Cluster and addon names of a CSR that is still waiting for a decision and
 * was issued for `addon_name`. Anything else is left alone.
 */
pub fn pending_csr_target(csr: &CertificateSigningRequest, addon_name: &str) -> Option<(String, String)> {
    if csr::is_decided(csr) {
	return None;
    }

    let labels = csr.labels();
    match (labels.get(csr::CLUSTER_NAME_LABEL), labels.get(csr::ADDON_NAME_LABEL)) {
	(Some(cluster_name), Some(name)) if name == addon_name => Some((cluster_name.clone(), name.clone())),
	_ => None,
    }
}

async fn reconcile(addon: Arc<api::ManagedClusterAddOn>, ctx: Arc<AddonManagerCtx>) -> Result<KubeAction, Error> {
    let mgr = &ctx.manager;
    let name = addon.name_any();

    let cluster_name = match addon.cluster_name() {
	Some(cluster_name) => cluster_name,
	None => return Ok(KubeAction::await_change()),
    };

    let cluster = match found_or_requeue(mgr.cluster_api.get_opt(&cluster_name).await?, mgr.reconciliation_interval) {
	Ok(cluster) => cluster,
	Err(action) => {
	    log::warn!("ManagedCluster {} not found, skipping addon {}/{}", cluster_name, cluster_name, name);
	    return Ok(action);
	}
    };

    if let Some(registration) = &mgr.agent.options().registration {
	let registrations = (registration.csr_configurations)(&cluster);
	mgr.patch_registrations(&cluster_name, &name, registrations).await?;

	if let Some(permission_config) = &registration.permission_config {
	    permission_config(cluster.clone(), addon.as_ref().clone()).await?;
	}
    }

    let objects = mgr.agent.manifests(&cluster, &addon)?;
    log::debug!("Rendered {} objects of addon {} for cluster {}", objects.len(), name, cluster_name);

    let mut manifests: Vec<serde_json::Value> = vec![];
    for object in objects {
	manifests.push(serde_json::to_value(object)?);
    }
    mgr.apply_work(&addon, &cluster_name, manifests).await?;

    Ok(mgr.requeue())
}

fn error_policy(addon: Arc<api::ManagedClusterAddOn>, error: &Error, ctx: Arc<AddonManagerCtx>) -> KubeAction {
    log::error!("Unable to reconcile addon {}/{}: {}", addon.namespace().unwrap_or_default(), addon.name_any(), error);
    ctx.manager.requeue()
}

async fn csr_reconcile(csr: Arc<CertificateSigningRequest>, ctx: Arc<AddonManagerCtx>) -> Result<KubeAction, Error> {
    let mgr = &ctx.manager;
    let csr_name = csr.name_any();

    let (cluster_name, addon_name) = match pending_csr_target(&csr, mgr.agent.name()) {
	Some(target) => target,
	None => return Ok(KubeAction::await_change()),
    };

    let approve_check = match mgr.agent.options().registration.as_ref().and_then(|r| r.csr_approve_check.clone()) {
	Some(approve_check) => approve_check,
	None => return Ok(KubeAction::await_change()),
    };

    let cluster = mgr.cluster_api.get_opt(&cluster_name).await?;
    let addons: KubeApi<api::ManagedClusterAddOn> = KubeApi::namespaced(mgr.kube_client.clone(), &cluster_name);
    let addon = addons.get_opt(&addon_name).await?;

    let (cluster, addon) = match found_or_requeue(cluster.zip(addon), mgr.reconciliation_interval) {
	Ok(found) => found,
	Err(action) => {
	    log::debug!("CSR {} waits for cluster {} and addon {}", csr_name, cluster_name, addon_name);
	    return Ok(action);
	}
    };

    if !approve_check(&cluster, &addon, &csr) {
	return Ok(KubeAction::await_change());
    }

    mgr.approve_csr(&csr_name).await?;
    log::info!("Approved CSR {} of addon {} for cluster {}", csr_name, addon_name, cluster_name);

    Ok(KubeAction::await_change())
}

fn csr_error_policy(csr: Arc<CertificateSigningRequest>, error: &Error, ctx: Arc<AddonManagerCtx>) -> KubeAction {
    log::error!("Unable to approve CSR {}: {}", csr.name_any(), error);
    ctx.manager.requeue()
}

impl AddonManager {

    /*
     * controller reconciles the ManagedClusterAddOns named after the agent.
     */
    pub fn controller(&self) -> impl Future<Output = ()> {
	let ctx = Arc::new(AddonManagerCtx{
	    manager: self.clone()
	});

	let config = KubeWatcherConfig::default().fields(&format!("metadata.name={}", self.agent.name()));
	KubeController::new(self.addon_api.clone(), config)
	    .run(reconcile, error_policy, ctx)
	    .for_each(|reconcile| async move {
		match reconcile {
		    Ok((addon, _)) => log::debug!("Reconciled addon {}/{}", addon.namespace.unwrap_or_default(), addon.name),
		    Err(err) => log::error!("Failed to reconcile with error {:?}", err),
		}
	    })
    }

    /*
     * csr_controller approves the CSRs labelled with the agent name.
     */
    pub fn csr_controller(&self) -> impl Future<Output = ()> {
	let ctx = Arc::new(AddonManagerCtx{
	    manager: self.clone()
	});

	let config = KubeWatcherConfig::default().labels(&format!("{}={}", csr::ADDON_NAME_LABEL, self.agent.name()));
	KubeController::new(self.csr_api.clone(), config)
	    .run(csr_reconcile, csr_error_policy, ctx)
	    .for_each(|reconcile| async move {
		if let Err(err) = reconcile {
		    log::error!("Failed to reconcile CSR with error {:?}", err);
		}
	    })
    }

    pub async fn patch_registrations(&self, cluster_name: &str, addon_name: &str, registrations: Vec<api::RegistrationConfig>) -> Result<(), Error> {
	let addons: KubeApi<api::ManagedClusterAddOn> = KubeApi::namespaced(self.kube_client.clone(), cluster_name);
	let patch = json!({
	    "status": {
		"registrations": registrations,
	    },
	});

	addons.patch_status(addon_name, &KubePatchParams::default(), &KubePatch::Merge(&patch)).await?;
	Ok(())
    }

    /*
     * Server-side applies the ManifestWork carrying the agent objects. The
     * work is owned by the addon, removing the addon removes the agent.
     */
    pub async fn apply_work(&self, addon: &api::ManagedClusterAddOn, cluster_name: &str, manifests: Vec<serde_json::Value>) -> Result<(), Error> {
	let name = work_name(self.agent.name());

	let mut labels = BTreeMap::new();
	labels.insert(String::from(csr::ADDON_NAME_LABEL), self.agent.name().to_string());

	let mut work = api::manifestwork::new(&name, cluster_name, labels, manifests);
	work.metadata.owner_references = addon.controller_owner_ref(&()).map(|owner| vec![owner]);

	let works: KubeApi<api::ManifestWork> = KubeApi::namespaced(self.kube_client.clone(), cluster_name);
	let params = KubePatchParams::apply(FIELD_MANAGER).force();
	works.patch(&name, &params, &KubePatch::Apply(&work)).await?;

	Ok(())
    }

    pub async fn approve_csr(&self, name: &str) -> Result<(), Error> {
	let approval = json!({
	    "status": {
		"conditions": [{
		    "type": "Approved",
		    "status": "True",
		    "reason": "AutoApprovedByHubCSRApprovingController",
		    "message": "Auto approving addon agent certificate.",
		}],
	    },
	});

	self.csr_api.patch_approval(name, &KubePatchParams::default(), &KubePatch::Merge(&approval)).await?;
	Ok(())
    }

    pub fn requeue(&self) -> KubeAction {
	requeue_after(self.reconciliation_interval)
    }

    pub fn new(kube_client: KubeClient, agent: HelmAgentAddon, interval: u64) -> Self {
	Self{
	    reconciliation_interval: interval,
	    agent: Arc::new(agent),

	    /* k8s internal references */
	    kube_client: kube_client.clone(),
	    addon_api: KubeApi::all(kube_client.clone()),
	    cluster_api: KubeApi::all(kube_client.clone()),
	    csr_api: KubeApi::all(kube_client.clone()),
	}
    }
}
