use kube::api::ObjectMeta;
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/*
 * ManagedCluster represents a cluster registered with the hub. It is owned by
 * the cluster registration controllers, the addon only reads it.
 */
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(group = "cluster.open-cluster-management.io", version = "v1", kind = "ManagedCluster")]
#[serde(rename_all = "camelCase")]
#[kube(status = "ManagedClusterStatus")]
pub struct ManagedClusterSpec {

    // whether the hub accepts the klusterlet of this cluster
    pub hub_accepts_client: Option<bool>,

    // how often the klusterlet renews its lease
    pub lease_duration_seconds: Option<i32>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ManagedClusterVersion {

    // the kubernetes version reported by the klusterlet, e.g: v1.29.1
    pub kubernetes: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
pub struct ManagedClusterStatus {
    pub version: Option<ManagedClusterVersion>,
}

impl ManagedCluster {

    /*
     * Returns the kubernetes version reported on the status, if any.
     */
    pub fn kube_version(&self) -> Option<String> {
	self.status.as_ref()
	    .and_then(|status| status.version.as_ref())
	    .and_then(|version| version.kubernetes.clone())
	    .filter(|version| !version.is_empty())
    }
}

pub fn new(name: &str, kube_version: &str) -> ManagedCluster {
    let mut metadata = ObjectMeta::default();
    metadata.name = Some(name.to_string());

    ManagedCluster{
	metadata: metadata,
	spec: ManagedClusterSpec{
	    hub_accepts_client: Some(true),
	    lease_duration_seconds: None,
	},
	status: Some(ManagedClusterStatus{
	    version: Some(ManagedClusterVersion{
		kubernetes: Some(kube_version.to_string()),
	    }),
	}),
    }
}
