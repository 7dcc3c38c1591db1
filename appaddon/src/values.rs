use crate::errors::{Error, Result};
use ocm_api as api;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_AGENT_IMAGE: &str = "quay.io/open-cluster-management/multicluster_operators_subscription:latest";
pub const DEFAULT_IMAGE_PULL_POLICY: &str = "IfNotPresent";
pub const DEFAULT_IMAGE_PULL_SECRET: &str = "open-cluster-management-image-pull-credentials";
pub const FULLNAME_OVERRIDE: &str = "application-manager";

/* key of the agent image in imageOverrides */
pub const SUBSCRIPTION_IMAGE_KEY: &str = "multicluster_operators_subscription";

pub const PROXY_VARIABLES: [&str; 3] = ["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"];

/*
 * Chart values in their generic form, as a JSON object.
 */
pub type AddonValues = serde_json::Map<String, Value>;

pub type GetValuesFunc = Arc<dyn Fn(&api::ManagedCluster, &api::ManagedClusterAddOn) -> Result<AddonValues> + Send + Sync>;

/*
 * Field names are part of the contract with the klusterlet-addon-controller,
 * which overrides them through the values annotation.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalValues {
    pub image_pull_policy: String,
    pub image_pull_secret: String,
    pub image_overrides: BTreeMap<String, String>,
    pub node_selector: BTreeMap<String, String>,
    pub proxy_config: BTreeMap<String, String>,
}

/*
 * clusterName, addonInstallNamespace and hubKubeConfigSecret are built-in
 * values the addon manager fills for every cluster, they don't belong here.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Values {
    #[serde(rename = "fullnameOverride")]
    pub full_name_override: String,

    pub global: GlobalValues,
}

impl Values {

    pub fn new(agent_image: &str) -> Self {
	let mut image_overrides = BTreeMap::new();
	image_overrides.insert(String::from(SUBSCRIPTION_IMAGE_KEY), agent_image.to_string());

	let proxy_config = PROXY_VARIABLES.iter()
	    .map(|name| (name.to_string(), String::new()))
	    .collect();

	Values{
	    full_name_override: String::from(FULLNAME_OVERRIDE),
	    global: GlobalValues{
		image_pull_policy: String::from(DEFAULT_IMAGE_PULL_POLICY),
		image_pull_secret: String::from(DEFAULT_IMAGE_PULL_SECRET),
		image_overrides: image_overrides,
		node_selector: BTreeMap::new(),
		proxy_config: proxy_config,
	    },
	}
    }
}

/*
 * Returns `image` unless it is unset or empty, in which case the default
 * agent image is used.
 */
pub fn resolve_image(image: Option<&str>) -> String {
    match image {
	Some(image) if !image.is_empty() => image.to_string(),
	_ => String::from(DEFAULT_AGENT_IMAGE),
    }
}

/*
 * ValuesProvider yields the default chart values of the agent. The image is
 * resolved once, when the provider is built.
 */
#[derive(Clone, Debug)]
pub struct ValuesProvider {
    agent_image: String,
}

impl ValuesProvider {

    pub fn new(agent_image: Option<&str>) -> Self {
	Self{
	    agent_image: resolve_image(agent_image),
	}
    }

    pub fn get_values(&self, _cluster: &api::ManagedCluster, _addon: &api::ManagedClusterAddOn) -> Result<AddonValues> {
	to_values(&Values::new(&self.agent_image))
    }

    pub fn into_get_values_func(self) -> GetValuesFunc {
	Arc::new(move |cluster: &api::ManagedCluster, addon: &api::ManagedClusterAddOn| self.get_values(cluster, addon))
    }
}

pub fn to_values<T: Serialize>(values: &T) -> Result<AddonValues> {
    match serde_json::to_value(values)? {
	Value::Object(values) => Ok(values),
	other => Err(Error::AddonError(format!("values must serialize to an object, got: {}", other))),
    }
}

/*
 * Reads the values annotation of the addon. No annotation means no values.
 */
pub fn get_values_from_addon_annotation(_cluster: &api::ManagedCluster, addon: &api::ManagedClusterAddOn) -> Result<AddonValues> {
    let raw = match addon.values_annotation() {
	Some(raw) => raw,
	None => return Ok(AddonValues::new()),
    };

    match serde_json::from_str::<Value>(raw)? {
	Value::Object(values) => Ok(values),
	other => Err(Error::AddonError(format!("annotation {} must be a JSON object, got: {}",
					       api::managedclusteraddon::VALUES_ANNOTATION, other))),
    }
}

/*
 * Merges `src` into `dst`. Objects present on both sides are merged key by
 * key, anything else from `src` replaces what `dst` holds.
 */
pub fn merge_values(dst: &mut AddonValues, src: AddonValues) {
    for (key, value) in src {
	let replaced = match (dst.get_mut(&key), value) {
	    (Some(Value::Object(dst_inner)), Value::Object(src_inner)) => {
		merge_values(dst_inner, src_inner);
		None
	    },
	    (_, value) => Some(value),
	};

	if let Some(value) = replaced {
	    dst.insert(key, value);
	}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs() -> (api::ManagedCluster, api::ManagedClusterAddOn) {
	(api::managedcluster::new("cluster1", "1.10.1"),
	 api::managedclusteraddon::new("application-manager", "cluster1", "open-cluster-management-agent-addon", ""))
    }

    fn image_override(values: &AddonValues) -> Value {
	values["global"]["imageOverrides"][SUBSCRIPTION_IMAGE_KEY].clone()
    }

    #[test]
    fn image_falls_back_to_default_when_unset_or_empty() {
	let (cluster, addon) = inputs();

	for image in [None, Some("")] {
	    let values = ValuesProvider::new(image).get_values(&cluster, &addon).unwrap();
	    assert_eq!(image_override(&values), json!(DEFAULT_AGENT_IMAGE));
	}

	let values = ValuesProvider::new(Some("quay.io/test:test")).get_values(&cluster, &addon).unwrap();
	assert_eq!(image_override(&values), json!("quay.io/test:test"));
	assert_eq!(values["global"]["imageOverrides"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn default_values_shape() {
	let (cluster, addon) = inputs();
	let values = ValuesProvider::new(None).get_values(&cluster, &addon).unwrap();

	assert_eq!(Value::Object(values), json!({
	    "fullnameOverride": "application-manager",
	    "global": {
		"imagePullPolicy": "IfNotPresent",
		"imagePullSecret": "open-cluster-management-image-pull-credentials",
		"imageOverrides": { "multicluster_operators_subscription": DEFAULT_AGENT_IMAGE },
		"nodeSelector": {},
		"proxyConfig": { "HTTP_PROXY": "", "HTTPS_PROXY": "", "NO_PROXY": "" },
	    },
	}));
    }

    #[test]
    fn proxy_variables_are_always_present() {
	let (cluster, addon) = inputs();
	let values = ValuesProvider::new(Some("quay.io/test:test")).get_values(&cluster, &addon).unwrap();

	for name in PROXY_VARIABLES {
	    assert_eq!(values["global"]["proxyConfig"][name], json!(""));
	}
    }

    #[test]
    fn values_are_idempotent() {
	let (cluster, addon) = inputs();
	let provider = ValuesProvider::new(None);

	assert_eq!(provider.get_values(&cluster, &addon).unwrap(), provider.get_values(&cluster, &addon).unwrap());
    }

    #[test]
    fn annotation_values_are_parsed() {
	let cluster = api::managedcluster::new("cluster1", "1.10.1");

	let addon = api::managedclusteraddon::new("application-manager", "cluster1", "", "");
	assert!(get_values_from_addon_annotation(&cluster, &addon).unwrap().is_empty());

	let addon = api::managedclusteraddon::new("application-manager", "cluster1", "",
						  r#"{"global":{"nodeSelector":{"a":"b"}}}"#);
	let values = get_values_from_addon_annotation(&cluster, &addon).unwrap();
	assert_eq!(values["global"]["nodeSelector"]["a"], json!("b"));

	let addon = api::managedclusteraddon::new("application-manager", "cluster1", "", "{not json");
	assert!(matches!(get_values_from_addon_annotation(&cluster, &addon), Err(Error::Json(_))));

	let addon = api::managedclusteraddon::new("application-manager", "cluster1", "", "[1, 2]");
	assert!(matches!(get_values_from_addon_annotation(&cluster, &addon), Err(Error::AddonError(_))));
    }

    #[test]
    fn merge_keeps_siblings_and_overrides_leaves() {
	let mut dst = to_values(&Values::new(DEFAULT_AGENT_IMAGE)).unwrap();
	let src = json!({
	    "global": {
		"imageOverrides": { "multicluster_operators_subscription": "quay.io/test:test" },
		"nodeSelector": { "node-role.kubernetes.io/infra": "" },
	    },
	    "extra": 1,
	});

	merge_values(&mut dst, src.as_object().unwrap().clone());

	assert_eq!(image_override(&dst), json!("quay.io/test:test"));
	assert_eq!(dst["global"]["nodeSelector"], json!({ "node-role.kubernetes.io/infra": "" }));
	assert_eq!(dst["global"]["imagePullPolicy"], json!("IfNotPresent"));
	assert_eq!(dst["global"]["proxyConfig"]["NO_PROXY"], json!(""));
	assert_eq!(dst["extra"], json!(1));
    }
}
