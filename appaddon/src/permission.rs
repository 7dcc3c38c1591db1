use crate::agent;
use crate::apply;
use crate::apply::Connect;
use crate::assets;
use crate::assets::{EmbedFs, PERMISSION_FILES, PERMISSION_FS};
use crate::errors::Result;
use ocm_api as api;

use log;
use serde::Serialize;

/* what the permission templates can refer to */
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct PermissionContext {
    managed_cluster_name: String,
    group: String,
}

/*
 * PermissionProvisioner grants the agent of a managed cluster its
 * permissions on the hub, by applying the permission templates with the
 * cluster name and the agent group filled in.
 *
 * Templates are applied one file at a time and the first error is returned
 * as is. Nothing applied before the error is rolled back, so a failure can
 * leave the role in place without its binding.
 */
pub struct PermissionProvisioner<C> {
    addon_name: String,
    connector: C,
    fs: EmbedFs,
    files: Vec<&'static str>,
}

impl<C: Connect> PermissionProvisioner<C> {

    pub fn new(connector: C, addon_name: &str) -> Self {
	Self{
	    addon_name: addon_name.to_string(),
	    connector: connector,
	    fs: PERMISSION_FS,
	    files: PERMISSION_FILES.to_vec(),
	}
    }

    /*
     * Replaces the embedded permission templates, `files` are applied in
     * the given order.
     */
    #[cfg(test)]
    pub fn with_files(mut self, fs: EmbedFs, files: &[&'static str]) -> Self {
	self.fs = fs;
	self.files = files.to_vec();
	self
    }

    pub async fn provision(&self, cluster: &api::ManagedCluster, _addon: &api::ManagedClusterAddOn) -> Result<()> {
	let cluster_name = cluster.metadata.name.clone().unwrap_or_default();
	let groups = agent::default_groups(&cluster_name, &self.addon_name);
	let context = PermissionContext{
	    managed_cluster_name: cluster_name.clone(),
	    group: groups[0].clone(),
	};

	let applier = self.connector.connect()?;

	for file in &self.files {
	    let manifests = |name: &str| -> Result<Vec<u8>> {
		let template = self.fs.read_file(name)?;
		Ok(assets::create_asset_from_template(name, template, &context)?.data)
	    };

	    for result in apply::apply_directly(&applier, manifests, &[*file]).await {
		if let Some(err) = result.error {
		    return Err(err);
		}
	    }
	}

	log::info!("Permissions of addon {} granted for cluster {}", self.addon_name, cluster_name);
	Ok(())
    }
}
