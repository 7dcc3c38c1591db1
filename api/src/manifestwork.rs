use kube::api::ObjectMeta;
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ManifestsTemplate {

    // raw kubernetes objects to be created on the managed cluster
    pub manifests: Vec<serde_json::Value>,
}

/*
 * ManifestWork carries a set of objects from the hub to the work agent of a
 * managed cluster. It lives in the managed cluster namespace on the hub.
 */
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(group = "work.open-cluster-management.io", version = "v1", kind = "ManifestWork", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkSpec {
    pub workload: ManifestsTemplate,
}

pub fn new(name: &str, cluster_name: &str, labels: BTreeMap<String, String>, manifests: Vec<serde_json::Value>) -> ManifestWork {
    let mut work = ManifestWork::new(name, ManifestWorkSpec{
	workload: ManifestsTemplate{
	    manifests: manifests,
	},
    });

    work.metadata = ObjectMeta{
	name: Some(name.to_string()),
	namespace: Some(cluster_name.to_string()),
	labels: if labels.is_empty() { None } else { Some(labels) },
	..ObjectMeta::default()
    };
    work
}
