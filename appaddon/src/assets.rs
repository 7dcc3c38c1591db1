use crate::errors::{Error, Result};

use minijinja::AutoEscape;
use minijinja::Environment;
use minijinja::UndefinedBehavior;
use serde::Serialize;

pub const APP_CHART_DIR: &str = "manifests/charts/application-manager";

/* applied in this order, the binding refers to the role */
pub const PERMISSION_FILES: [&str; 2] = [
    "manifests/permission/clusterRole.yaml",
    "manifests/permission/rolebinding.yaml",
];

/*
 * EmbedFs is a read-only set of files compiled into the binary, addressed by
 * their path relative to the crate root.
 */
#[derive(Clone, Copy, Debug)]
pub struct EmbedFs {
    files: &'static [(&'static str, &'static str)],
}

impl EmbedFs {

    pub const fn new(files: &'static [(&'static str, &'static str)]) -> Self {
	Self{ files: files }
    }

    pub fn read_file(&self, path: &str) -> Result<&'static str> {
	self.files.iter()
	    .find(|(name, _)| *name == path)
	    .map(|(_, content)| *content)
	    .ok_or_else(|| Error::AssetNotFound(path.to_string()))
    }

    /*
     * Returns every file under `dir`, recursively, sorted by path.
     */
    pub fn read_dir(&self, dir: &str) -> Vec<(&'static str, &'static str)> {
	let prefix = format!("{}/", dir.trim_end_matches('/'));
	let mut files: Vec<(&'static str, &'static str)> = self.files.iter()
	    .filter(|(name, _)| name.starts_with(&prefix))
	    .copied()
	    .collect();

	files.sort_by(|a, b| a.0.cmp(b.0));
	files
    }
}

pub static APP_CHART_FS: EmbedFs = EmbedFs::new(&[
    ("manifests/charts/application-manager/Chart.yaml",
     include_str!("../manifests/charts/application-manager/Chart.yaml")),
    ("manifests/charts/application-manager/values.yaml",
     include_str!("../manifests/charts/application-manager/values.yaml")),
    ("manifests/charts/application-manager/templates/_helpers.tpl",
     include_str!("../manifests/charts/application-manager/templates/_helpers.tpl")),
    ("manifests/charts/application-manager/templates/clusterrole.yaml",
     include_str!("../manifests/charts/application-manager/templates/clusterrole.yaml")),
    ("manifests/charts/application-manager/templates/clusterrolebinding.yaml",
     include_str!("../manifests/charts/application-manager/templates/clusterrolebinding.yaml")),
    ("manifests/charts/application-manager/templates/deployment.yaml",
     include_str!("../manifests/charts/application-manager/templates/deployment.yaml")),
    ("manifests/charts/application-manager/templates/serviceaccount.yaml",
     include_str!("../manifests/charts/application-manager/templates/serviceaccount.yaml")),
]);

pub static PERMISSION_FS: EmbedFs = EmbedFs::new(&[
    ("manifests/permission/clusterRole.yaml",
     include_str!("../manifests/permission/clusterRole.yaml")),
    ("manifests/permission/rolebinding.yaml",
     include_str!("../manifests/permission/rolebinding.yaml")),
]);

#[derive(Clone, Debug)]
pub struct Asset {
    pub name: String,
    pub data: Vec<u8>,
}

/*
 * Renders a permission template. Every placeholder must resolve against
 * `context`, an unknown field fails the render.
 */
pub fn create_asset_from_template<C: Serialize>(name: &str, template: &str, context: C) -> Result<Asset> {
    let env = environment(UndefinedBehavior::Strict);
    let data = render(&env, name, template, context)?;

    Ok(Asset{
	name: name.to_string(),
	data: data.into_bytes(),
    })
}

pub fn environment(undefined: UndefinedBehavior) -> Environment<'static> {
    let mut env = Environment::new();
    env.set_undefined_behavior(undefined);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env
}

pub fn render<C: Serialize>(env: &Environment<'static>, name: &str, template: &str, context: C) -> Result<String> {
    let normalized = normalize_field_references(template);
    let rendered = env.render_named_str(name, &normalized, context)?;

    Ok(rendered)
}

/*
 * Templates are written with Go-style field references (`{{ .Values.x }}`,
 * `{% if .Values.y %}`). minijinja has no leading-dot syntax, so the dot that
 * starts a reference is dropped inside tags. Dots between identifiers and
 * inside quoted strings are kept.
 */
fn normalize_field_references(template: &str) -> String {
    let mut result = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(start) = find_tag_start(remaining) {
	result.push_str(&remaining[..start + 2]);
	remaining = &remaining[start + 2..];

	let close = if template_tag(&result) == "{{" { "}}" } else { "%}" };
	match remaining.find(close) {
	    Some(end) => {
		result.push_str(&normalize_expression(&remaining[..end]));
		result.push_str(close);
		remaining = &remaining[end + 2..];
	    },
	    None => {
		// unterminated, minijinja will report it
		result.push_str(remaining);
		remaining = "";
	    }
	}
    }

    result.push_str(remaining);
    result
}

fn find_tag_start(s: &str) -> Option<usize> {
    match (s.find("{{"), s.find("{%")) {
	(Some(a), Some(b)) => Some(a.min(b)),
	(a, b) => a.or(b),
    }
}

fn template_tag(rendered: &str) -> &str {
    &rendered[rendered.len() - 2..]
}

fn normalize_expression(expr: &str) -> String {
    let mut result = String::with_capacity(expr.len());
    let mut chars = expr.chars().peekable();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    while let Some(ch) = chars.next() {
	match ch {
	    '\'' if !in_double_quote => {
		in_single_quote = !in_single_quote;
		result.push(ch);
	    },
	    '"' if !in_single_quote => {
		in_double_quote = !in_double_quote;
		result.push(ch);
	    },
	    '.' if !in_single_quote && !in_double_quote => {
		let starts_reference = result.chars()
		    .last()
		    .map_or(true, |c| c.is_whitespace() || c == '(' || c == ',' || c == '-' || c == '[');
		let next_is_ident = chars.peek()
		    .is_some_and(|c| c.is_ascii_alphabetic() || *c == '_');

		if !(starts_reference && next_is_ident) {
		    result.push('.');
		}
	    },
	    _ => result.push(ch),
	}
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn leading_dots_are_dropped_inside_tags() {
	assert_eq!(normalize_field_references("{{ .Values.global.x }}"), "{{ Values.global.x }}");
	assert_eq!(normalize_field_references("{{- .Group }}"), "{{- Group }}");
	assert_eq!(normalize_field_references("{%- if .Values.a %}x{% endif %}"), "{%- if Values.a %}x{% endif %}");
	assert_eq!(normalize_field_references("{% for k, v in .Values.m | items %}"), "{% for k, v in Values.m | items %}");
    }

    #[test]
    fn text_outside_tags_and_quoted_strings_are_untouched() {
	assert_eq!(normalize_field_references("a .b {{ c }}"), "a .b {{ c }}");
	assert_eq!(normalize_field_references("{{ \" .x\" }}"), "{{ \" .x\" }}");
	assert_eq!(normalize_field_references("{{ 1.5 }}"), "{{ 1.5 }}");
	assert_eq!(normalize_field_references("{{ .x"), "{{ .x");
    }

    #[test]
    fn embedded_files_are_readable() {
	for file in PERMISSION_FILES {
	    assert!(PERMISSION_FS.read_file(file).is_ok());
	}

	assert!(matches!(PERMISSION_FS.read_file("manifests/permission/nope.yaml"), Err(Error::AssetNotFound(_))));

	let templates = APP_CHART_FS.read_dir(&format!("{}/templates", APP_CHART_DIR));
	assert_eq!(templates.len(), 5);
	assert!(templates.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn permission_template_is_rendered_with_context() {
	let template = PERMISSION_FS.read_file(PERMISSION_FILES[1]).unwrap();
	let asset = create_asset_from_template(PERMISSION_FILES[1], template, json!({
	    "ManagedClusterName": "cluster1",
	    "Group": "system:open-cluster-management:cluster:cluster1:addon:application-manager",
	})).unwrap();

	assert_eq!(asset.name, PERMISSION_FILES[1]);
	let rendered = String::from_utf8(asset.data).unwrap();
	assert!(rendered.contains("namespace: cluster1"));
	assert!(rendered.contains("name: system:open-cluster-management:cluster:cluster1:addon:application-manager"));
	assert!(!rendered.contains("{{"));
    }

    #[test]
    fn missing_context_field_fails_the_render() {
	let template = PERMISSION_FS.read_file(PERMISSION_FILES[1]).unwrap();
	let result = create_asset_from_template("rolebinding", template, json!({ "ManagedClusterName": "cluster1" }));

	assert!(matches!(result, Err(Error::Template(_))));
    }
}
