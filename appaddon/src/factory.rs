use crate::agent::{AgentAddonOptions, RegistrationOption};
use crate::assets::EmbedFs;
use crate::chart::{Chart, ReleaseOptions};
use crate::errors::Result;
use crate::values;
use crate::values::{AddonValues, GetValuesFunc};
use ocm_api as api;

use kube::api::DynamicObject;
use log;
use serde_json::Value;

/*
 * AgentAddonFactory assembles a HelmAgentAddon out of an embedded chart,
 * a list of values providers and the registration option of the agent.
 */
pub struct AgentAddonFactory {
    addon_name: String,
    fs: EmbedFs,
    chart_dir: String,
    get_values_funcs: Vec<GetValuesFunc>,
    registration: Option<RegistrationOption>,
    install_namespace: Option<String>,
}

impl AgentAddonFactory {

    pub fn new(addon_name: &str, fs: EmbedFs, chart_dir: &str) -> Self {
	Self{
	    addon_name: addon_name.to_string(),
	    fs: fs,
	    chart_dir: chart_dir.to_string(),
	    get_values_funcs: vec![],
	    registration: None,
	    install_namespace: None,
	}
    }

    /*
     * Values from a later function override the ones from an earlier one.
     */
    pub fn with_get_values_funcs(mut self, funcs: Vec<GetValuesFunc>) -> Self {
	self.get_values_funcs = funcs;
	self
    }

    pub fn with_agent_registration_option(mut self, registration: RegistrationOption) -> Self {
	self.registration = Some(registration);
	self
    }

    /*
     * Overrides the install namespace for addons that don't set one.
     */
    pub fn with_install_namespace(mut self, namespace: &str) -> Self {
	self.install_namespace = Some(namespace.to_string());
	self
    }

    pub fn build_helm_agent_addon(self) -> Result<HelmAgentAddon> {
	let chart = Chart::load(&self.fs, &self.chart_dir)?;
	log::debug!("Loaded chart {} {} for addon {}", chart.metadata.name, chart.metadata.version, self.addon_name);

	Ok(HelmAgentAddon{
	    options: AgentAddonOptions{
		addon_name: self.addon_name,
		registration: self.registration,
	    },
	    chart: chart,
	    get_values_funcs: self.get_values_funcs,
	    install_namespace: self.install_namespace,
	})
    }
}

pub struct HelmAgentAddon {
    options: AgentAddonOptions,
    chart: Chart,
    get_values_funcs: Vec<GetValuesFunc>,
    install_namespace: Option<String>,
}

impl HelmAgentAddon {

    pub fn options(&self) -> &AgentAddonOptions {
	&self.options
    }

    pub fn name(&self) -> &str {
	&self.options.addon_name
    }

    fn install_namespace(&self, addon: &api::ManagedClusterAddOn) -> String {
	match (&addon.spec.install_namespace, &self.install_namespace) {
	    (Some(ns), _) if !ns.is_empty() => ns.clone(),
	    (_, Some(ns)) => ns.clone(),
	    _ => addon.install_namespace(),
	}
    }

    /*
     * Merges the values of every provider, in order, then sets the built-in
     * values the chart relies on.
     */
    pub fn values(&self, cluster: &api::ManagedCluster, addon: &api::ManagedClusterAddOn) -> Result<AddonValues> {
	let mut merged = AddonValues::new();
	for get_values in &self.get_values_funcs {
	    values::merge_values(&mut merged, get_values(cluster, addon)?);
	}

	let cluster_name = cluster.metadata.name.clone().unwrap_or_default();
	merged.insert(String::from("clusterName"), Value::String(cluster_name));
	merged.insert(String::from("addonInstallNamespace"), Value::String(self.install_namespace(addon)));
	merged.insert(String::from("hubKubeConfigSecret"), Value::String(format!("{}-hub-kubeconfig", self.name())));

	Ok(merged)
    }

    /*
     * Renders the objects to deploy on `cluster` for `addon`.
     */
    pub fn manifests(&self, cluster: &api::ManagedCluster, addon: &api::ManagedClusterAddOn) -> Result<Vec<DynamicObject>> {
	let values = self.values(cluster, addon)?;
	let release = ReleaseOptions{
	    name: self.name().to_string(),
	    namespace: self.install_namespace(addon),
	};

	self.chart.render(&values, &release, cluster.kube_version().as_deref())
    }
}
