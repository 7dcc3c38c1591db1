use kube::api::ObjectMeta;
use kube::ResourceExt;
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/* annotation holding user supplied chart values, encoded as a JSON object */
pub const VALUES_ANNOTATION: &str = "addon.open-cluster-management.io/values";

/* where the agent gets installed when the addon doesn't say otherwise */
pub const DEFAULT_INSTALL_NAMESPACE: &str = "open-cluster-management-agent-addon";

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subject {

    // the user name in the certificate subject (common name)
    pub user: String,

    // the groups in the certificate subject (organization)
    pub groups: Option<Vec<String>>,

    pub organization_unit: Option<Vec<String>>,
}

/*
 * RegistrationConfig tells the agent which signer to request a client
 * certificate from, and with which subject.
 */
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationConfig {
    pub signer_name: String,

    pub subject: Option<Subject>,
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(group = "addon.open-cluster-management.io", version = "v1alpha1", kind = "ManagedClusterAddOn", namespaced)]
#[serde(rename_all = "camelCase")]
#[kube(status = "ManagedClusterAddOnStatus")]
pub struct ManagedClusterAddOnSpec {

    // the namespace on the managed cluster the agent is deployed into
    pub install_namespace: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnStatus {

    // the client certificates the agent should request from the hub
    pub registrations: Option<Vec<RegistrationConfig>>,
}

impl ManagedClusterAddOn {

    pub fn install_namespace(&self) -> String {
	match &self.spec.install_namespace {
	    Some(ns) if !ns.is_empty() => ns.clone(),
	    _ => String::from(DEFAULT_INSTALL_NAMESPACE),
	}
    }

    /*
     * Returns the raw JSON values from the values annotation, when set and
     * not blank.
     */
    pub fn values_annotation(&self) -> Option<&str> {
	self.annotations()
	    .get(VALUES_ANNOTATION)
	    .map(|values| values.as_str())
	    .filter(|values| !values.trim().is_empty())
    }

    /* the managed cluster name is the namespace the addon lives in */
    pub fn cluster_name(&self) -> Option<String> {
	self.metadata.namespace.clone()
    }
}

pub fn new(name: &str, cluster_name: &str, install_namespace: &str, values: &str) -> ManagedClusterAddOn {
    let mut metadata = ObjectMeta::default();
    metadata.name = Some(name.to_string());
    metadata.namespace = Some(cluster_name.to_string());
    if !values.is_empty() {
	let mut annotations = BTreeMap::new();
	annotations.insert(String::from(VALUES_ANNOTATION), values.to_string());
	metadata.annotations = Some(annotations);
    }

    ManagedClusterAddOn{
	metadata: metadata,
	spec: ManagedClusterAddOnSpec{
	    install_namespace: Some(install_namespace.to_string()),
	},
	status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_namespace_falls_back_to_default() {
	let mut addon = new("application-manager", "cluster1", "", "");
	assert_eq!(addon.install_namespace(), DEFAULT_INSTALL_NAMESPACE);

	addon.spec.install_namespace = Some(String::from("custom"));
	assert_eq!(addon.install_namespace(), "custom");
    }

    #[test]
    fn blank_values_annotation_is_ignored() {
	let addon = new("application-manager", "cluster1", DEFAULT_INSTALL_NAMESPACE, "  ");
	assert_eq!(addon.values_annotation(), None);

	let addon = new("application-manager", "cluster1", DEFAULT_INSTALL_NAMESPACE, "{}");
	assert_eq!(addon.values_annotation(), Some("{}"));
	assert_eq!(addon.cluster_name(), Some(String::from("cluster1")));
    }
}
