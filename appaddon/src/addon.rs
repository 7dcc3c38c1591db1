use crate::agent;
use crate::agent::RegistrationOption;
use crate::apply::Connect;
use crate::assets::{APP_CHART_DIR, APP_CHART_FS};
use crate::csr;
use crate::errors::Result;
use crate::factory::{AgentAddonFactory, HelmAgentAddon};
use crate::permission::PermissionProvisioner;
use crate::values;
use crate::values::{GetValuesFunc, ValuesProvider};
use ocm_api as api;

use futures::future::BoxFuture;
use std::sync::Arc;

pub const APP_ADDON_NAME: &str = "application-manager";

/*
 * The agent asks for a hub client certificate with its default subject,
 * such CSRs are approved, and the hub side permissions are provisioned
 * through `connector`.
 */
pub fn new_registration_option<C: Connect + 'static>(connector: C, addon_name: &str) -> RegistrationOption {
    let provisioner = Arc::new(PermissionProvisioner::new(connector, addon_name));

    RegistrationOption{
	csr_configurations: agent::kube_client_signer_configurations(addon_name, addon_name),
	csr_approve_check: Some(csr::default_csr_approver(addon_name)),
	permission_config: Some(Arc::new(move |cluster: api::ManagedCluster, addon: api::ManagedClusterAddOn| -> BoxFuture<'static, Result<()>> {
	    let provisioner = provisioner.clone();
	    Box::pin(async move {
		provisioner.provision(&cluster, &addon).await
	    })
	})),
    }
}

/*
 * Builds the application-manager agent addon. Values from the addon
 * annotation override the defaults, since the klusterlet-addon-controller
 * uses it to change images, node selector and proxy settings.
 */
pub fn new_agent_addon<C: Connect + 'static>(connector: C, agent_image: Option<&str>, install_namespace: Option<&str>) -> Result<HelmAgentAddon> {
    let get_values_funcs: Vec<GetValuesFunc> = vec![
	ValuesProvider::new(agent_image).into_get_values_func(),
	Arc::new(values::get_values_from_addon_annotation) as GetValuesFunc,
    ];

    let mut factory = AgentAddonFactory::new(APP_ADDON_NAME, APP_CHART_FS, APP_CHART_DIR)
	.with_get_values_funcs(get_values_funcs)
	.with_agent_registration_option(new_registration_option(connector, APP_ADDON_NAME));
    if let Some(namespace) = install_namespace.filter(|ns| !ns.is_empty()) {
	factory = factory.with_install_namespace(namespace);
    }

    factory.build_helm_agent_addon()
}
