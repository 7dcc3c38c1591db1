use crate::apply;
use crate::assets;
use crate::assets::EmbedFs;
use crate::errors::{Error, Result};
use crate::values;
use crate::values::AddonValues;

use kube::api::DynamicObject;
use log;
use minijinja::UndefinedBehavior;
use serde::Deserialize;
use serde_json::json;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
    pub app_version: Option<String>,
}

/*
 * Release information exposed to templates as `.Release`.
 */
#[derive(Clone, Debug)]
pub struct ReleaseOptions {
    pub name: String,
    pub namespace: String,
}

/*
 * Chart is a chart loaded from an embedded filesystem: its metadata, the
 * defaults from values.yaml and the templates. Only the template subset the
 * embedded charts use is supported, templates are rendered by minijinja.
 */
#[derive(Clone, Debug)]
pub struct Chart {
    pub metadata: ChartMetadata,
    default_values: AddonValues,
    templates: Vec<(&'static str, &'static str)>,
}

impl Chart {

    pub fn load(fs: &EmbedFs, dir: &str) -> Result<Self> {
	let dir = dir.trim_end_matches('/');
	let metadata: ChartMetadata = serde_yaml::from_str(fs.read_file(&format!("{}/Chart.yaml", dir))?)?;

	let default_values = match fs.read_file(&format!("{}/values.yaml", dir)) {
	    Ok(raw) => match serde_yaml::from_str::<serde_json::Value>(raw)? {
		serde_json::Value::Object(defaults) => defaults,
		serde_json::Value::Null => AddonValues::new(),
		_ => {
		    let errmsg = format!("values.yaml of chart {} is not a map", metadata.name);
		    return Err(Error::AddonError(errmsg));
		}
	    },
	    Err(Error::AssetNotFound(_)) => AddonValues::new(),
	    Err(err) => return Err(err),
	};

	let templates = fs.read_dir(&format!("{}/templates", dir))
	    .into_iter()
	    .filter(|(path, _)| {
		let file = path.rsplit('/').next().unwrap_or_default();
		!file.starts_with('_') && (file.ends_with(".yaml") || file.ends_with(".yml"))
	    })
	    .collect();

	Ok(Self{
	    metadata: metadata,
	    default_values: default_values,
	    templates: templates,
	})
    }

    /*
     * Renders all templates, in path order, with `values` merged over the
     * chart defaults. The first failing template aborts the render.
     */
    pub fn render(&self, values: &AddonValues, release: &ReleaseOptions, kube_version: Option<&str>) -> Result<Vec<DynamicObject>> {
	let mut merged = self.default_values.clone();
	values::merge_values(&mut merged, values.clone());

	let context = json!({
	    "Values": merged,
	    "Release": {
		"Name": release.name,
		"Namespace": release.namespace,
	    },
	    "Chart": {
		"Name": self.metadata.name,
		"Version": self.metadata.version,
		"AppVersion": self.metadata.app_version,
	    },
	    "Capabilities": {
		"KubeVersion": {
		    "Version": kube_version.unwrap_or_default(),
		},
	    },
	});

	let env = assets::environment(UndefinedBehavior::Lenient);
	let mut objects: Vec<DynamicObject> = vec![];
	for (path, template) in &self.templates {
	    let rendered = assets::render(&env, path, template, &context)?;
	    let mut rendered_objects = apply::decode_objects(rendered.as_bytes())?;

	    log::debug!("Rendered {} objects from {}", rendered_objects.len(), path);
	    objects.append(&mut rendered_objects);
	}

	Ok(objects)
    }
}
