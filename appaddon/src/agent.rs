use crate::errors::Error;
use ocm_api as api;

use futures::future::BoxFuture;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use std::sync::Arc;

/* the signer for client certificates that authenticate against the hub apiserver */
pub const KUBE_APISERVER_CLIENT_SIGNER: &str = "kubernetes.io/kube-apiserver-client";

pub type CsrConfigurationsFunc = Arc<dyn Fn(&api::ManagedCluster) -> Vec<api::RegistrationConfig> + Send + Sync>;

pub type CsrApproveFunc = Arc<dyn Fn(&api::ManagedCluster, &api::ManagedClusterAddOn, &CertificateSigningRequest) -> bool + Send + Sync>;

/*
 * Grants the agent of a cluster its permissions on the hub. Called on every
 * reconcile, so it must be safe to run more than once.
 */
pub type PermissionConfigFunc = Arc<dyn Fn(api::ManagedCluster, api::ManagedClusterAddOn) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>;

/*
 * RegistrationOption tells the addon manager how the agent registers with
 * the hub: which certificates it asks for, which CSRs can be approved, and
 * how the hub side permissions are set up.
 */
#[derive(Clone)]
pub struct RegistrationOption {
    pub csr_configurations: CsrConfigurationsFunc,
    pub csr_approve_check: Option<CsrApproveFunc>,
    pub permission_config: Option<PermissionConfigFunc>,
}

pub struct AgentAddonOptions {
    pub addon_name: String,
    pub registration: Option<RegistrationOption>,
}

pub fn default_groups(cluster_name: &str, addon_name: &str) -> Vec<String> {
    vec![
	format!("system:open-cluster-management:cluster:{}:addon:{}", cluster_name, addon_name),
	format!("system:open-cluster-management:addon:{}", addon_name),
	String::from("system:authenticated"),
    ]
}

pub fn default_user(cluster_name: &str, addon_name: &str, agent_name: &str) -> String {
    format!("system:open-cluster-management:cluster:{}:addon:{}:agent:{}", cluster_name, addon_name, agent_name)
}

/*
 * Returns a single registration requesting a hub client certificate with the
 * default user and groups of the cluster's agent.
 */
pub fn kube_client_signer_configurations(addon_name: &str, agent_name: &str) -> CsrConfigurationsFunc {
    let addon_name = addon_name.to_string();
    let agent_name = agent_name.to_string();

    Arc::new(move |cluster: &api::ManagedCluster| {
	let cluster_name = cluster.metadata.name.clone().unwrap_or_default();

	vec![api::RegistrationConfig{
	    signer_name: String::from(KUBE_APISERVER_CLIENT_SIGNER),
	    subject: Some(api::Subject{
		user: default_user(&cluster_name, &addon_name, &agent_name),
		groups: Some(default_groups(&cluster_name, &addon_name)),
		organization_unit: None,
	    }),
	}]
    })
}
