use crate::errors::{Error, Result};

use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::Config as KubeConfig;
use kube::api::DynamicObject;
use kube::api::GroupVersionKind;
use kube::api::Patch as KubePatch;
use kube::api::PatchParams as KubePatchParams;
use kube::discovery::ApiResource;
use log;
use serde::Deserialize;
use std::future::Future;

/* field manager used for every server-side apply done by the addon */
pub const FIELD_MANAGER: &str = "application-manager";

/*
 * ResourceApplier creates or updates a single object on a cluster.
 */
pub trait ResourceApplier: Send + Sync {
    fn apply(&self, object: &DynamicObject) -> impl Future<Output = Result<()>> + Send;
}

/*
 * Connect builds a ResourceApplier for the cluster it was configured for.
 */
pub trait Connect: Send + Sync {
    type Applier: ResourceApplier;

    fn connect(&self) -> Result<Self::Applier>;
}

#[derive(Clone)]
pub struct KubeApplier {
    kube_client: KubeClient,
}

impl KubeApplier {

    pub fn new(kube_client: KubeClient) -> Self {
	Self{
	    kube_client: kube_client,
	}
    }
}

fn gvk_of(object: &DynamicObject) -> Result<GroupVersionKind> {
    let types = match &object.types {
	Some(types) => types,
	None => {
	    let errmsg = format!("object {:?} has no apiVersion or kind", object.metadata.name);
	    return Err(Error::AddonError(errmsg));
	}
    };

    let (group, version) = match types.api_version.split_once('/') {
	Some((group, version)) => (group, version),
	None => ("", types.api_version.as_str()),
    };

    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

impl ResourceApplier for KubeApplier {

    async fn apply(&self, object: &DynamicObject) -> Result<()> {
	let gvk = gvk_of(object)?;
	let name = match &object.metadata.name {
	    Some(name) => name,
	    None => {
		let errmsg = format!("{} object without metadata.name", gvk.kind);
		return Err(Error::AddonError(errmsg));
	    }
	};

	let resource = ApiResource::from_gvk(&gvk);
	let api: KubeApi<DynamicObject> = match &object.metadata.namespace {
	    Some(namespace) => KubeApi::namespaced_with(self.kube_client.clone(), namespace, &resource),
	    None => KubeApi::all_with(self.kube_client.clone(), &resource),
	};

	let params = KubePatchParams::apply(FIELD_MANAGER).force();
	api.patch(name, &params, &KubePatch::Apply(object)).await?;

	log::debug!("Applied {} {}", gvk.kind, name);
	Ok(())
    }
}

impl Connect for KubeConfig {
    type Applier = KubeApplier;

    fn connect(&self) -> Result<KubeApplier> {
	let kube_client = KubeClient::try_from(self.clone())?;
	Ok(KubeApplier::new(kube_client))
    }
}

/*
 * Outcome of applying one object of a manifest file. When the file itself
 * couldn't be read or decoded, kind and name are unknown.
 */
#[derive(Debug)]
pub struct ApplyResult {
    pub file: String,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub error: Option<Error>,
}

/*
 * Decodes every non-empty YAML document of `data` into an object.
 */
pub fn decode_objects(data: &[u8]) -> Result<Vec<DynamicObject>> {
    let mut objects: Vec<DynamicObject> = vec![];

    for document in serde_yaml::Deserializer::from_slice(data) {
	let value = serde_json::Value::deserialize(document)?;
	if value.is_null() {
	    continue;
	}
	objects.push(serde_json::from_value(value)?);
    }

    Ok(objects)
}

/*
 * Applies every object found in `files`, in order. `manifests` returns the
 * content of a file. A failure doesn't stop the remaining objects from being
 * applied, it is only recorded in the result of that object.
 */
pub async fn apply_directly<A, F>(applier: &A, manifests: F, files: &[&str]) -> Vec<ApplyResult>
where
    A: ResourceApplier,
    F: Fn(&str) -> Result<Vec<u8>>,
{
    let mut results: Vec<ApplyResult> = vec![];

    for file in files {
	let objects = match manifests(file).and_then(|data| decode_objects(&data)) {
	    Ok(objects) => objects,
	    Err(err) => {
		results.push(ApplyResult{
		    file: file.to_string(),
		    kind: None,
		    name: None,
		    error: Some(err),
		});
		continue;
	    }
	};

	for object in objects {
	    let error = applier.apply(&object).await.err();
	    if let Some(err) = &error {
		log::error!("Unable to apply {:?} from {}: {}", object.metadata.name, file, err);
	    }

	    results.push(ApplyResult{
		file: file.to_string(),
		kind: object.types.map(|types| types.kind),
		name: object.metadata.name,
		error: error,
	    });
	}
    }

    results
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::sync::{Arc, Mutex};

    /*
     * Records applied objects, and fails objects of `fail_kind`.
     */
    #[derive(Clone, Default)]
    pub struct RecordingApplier {
	pub applied: Arc<Mutex<Vec<DynamicObject>>>,
	pub fail_kind: Option<String>,
    }

    impl RecordingApplier {

	pub fn failing(kind: &str) -> Self {
	    Self{
		applied: Arc::default(),
		fail_kind: Some(kind.to_string()),
	    }
	}

	pub fn kinds(&self) -> Vec<String> {
	    self.applied.lock().unwrap().iter()
		.filter_map(|object| object.types.as_ref().map(|types| types.kind.clone()))
		.collect()
	}
    }

    impl ResourceApplier for RecordingApplier {

	async fn apply(&self, object: &DynamicObject) -> Result<()> {
	    self.applied.lock().unwrap().push(object.clone());

	    let kind = object.types.as_ref().map(|types| types.kind.clone());
	    if kind.is_some() && kind == self.fail_kind {
		return Err(Error::AddonError(format!("{} is forbidden", self.fail_kind.clone().unwrap_or_default())));
	    }
	    Ok(())
	}
    }

    /*
     * Hands out clones of the same applier, or fails to connect when no
     * applier was given.
     */
    #[derive(Clone, Default)]
    pub struct FakeConnector {
	pub applier: Option<RecordingApplier>,
    }

    impl Connect for FakeConnector {
	type Applier = RecordingApplier;

	fn connect(&self) -> Result<RecordingApplier> {
	    self.applier.clone()
		.ok_or_else(|| Error::AddonError(String::from("cluster is unreachable")))
	}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::fake::RecordingApplier;

    const ROLES: &str = "apiVersion: rbac.authorization.k8s.io/v1\nkind: ClusterRole\nmetadata:\n  name: a\n---\n# nothing here\n---\napiVersion: rbac.authorization.k8s.io/v1\nkind: Role\nmetadata:\n  name: b\n  namespace: ns\n";

    const BINDING: &str = "apiVersion: rbac.authorization.k8s.io/v1\nkind: RoleBinding\nmetadata:\n  name: c\n  namespace: ns\n";

    fn manifests(file: &str) -> Result<Vec<u8>> {
	match file {
	    "roles.yaml" => Ok(ROLES.as_bytes().to_vec()),
	    "binding.yaml" => Ok(BINDING.as_bytes().to_vec()),
	    other => Err(Error::AssetNotFound(other.to_string())),
	}
    }

    #[test]
    fn empty_documents_are_skipped() {
	let objects = decode_objects(ROLES.as_bytes()).unwrap();

	assert_eq!(objects.len(), 2);
	assert_eq!(objects[1].metadata.namespace.as_deref(), Some("ns"));
	assert_eq!(gvk_of(&objects[0]).unwrap().group, "rbac.authorization.k8s.io");
    }

    #[test]
    fn core_group_has_no_group() {
	let objects = decode_objects(b"apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: a\n").unwrap();
	let gvk = gvk_of(&objects[0]).unwrap();

	assert_eq!(gvk.group, "");
	assert_eq!(gvk.version, "v1");
    }

    #[tokio::test]
    async fn one_result_per_object() {
	let applier = RecordingApplier::default();
	let results = apply_directly(&applier, manifests, &["roles.yaml", "binding.yaml"]).await;

	assert_eq!(results.len(), 3);
	assert!(results.iter().all(|result| result.error.is_none()));
	assert_eq!(applier.kinds(), vec!["ClusterRole", "Role", "RoleBinding"]);
    }

    #[tokio::test]
    async fn failures_are_recorded_and_the_rest_is_applied() {
	let applier = RecordingApplier::failing("ClusterRole");
	let results = apply_directly(&applier, manifests, &["missing.yaml", "roles.yaml", "binding.yaml"]).await;

	assert_eq!(results.len(), 4);
	assert!(matches!(results[0].error, Some(Error::AssetNotFound(_))));
	assert_eq!(results[1].kind.as_deref(), Some("ClusterRole"));
	assert!(results[1].error.is_some());
	assert!(results[2..].iter().all(|result| result.error.is_none()));
	assert_eq!(applier.kinds(), vec!["ClusterRole", "Role", "RoleBinding"]);
    }
}
