use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    /* encapsulate a kube-rust error */
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    /* unable to find a kubeconfig or in-cluster configuration */
    #[error("kube config error: {0}")]
    KubeConfig(#[from] kube::config::InferConfigError),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("asset {0} not found")]
    AssetNotFound(String),

    #[error("Addon Error: {0}")]
    AddonError(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
