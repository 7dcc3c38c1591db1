use crate::agent;
use crate::agent::CsrApproveFunc;
use ocm_api as api;

use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use log;
use std::sync::Arc;
use x509_parser::prelude::FromDer;
use x509_parser::prelude::X509CertificationRequest;

pub const CLUSTER_NAME_LABEL: &str = "open-cluster-management.io/cluster-name";
pub const ADDON_NAME_LABEL: &str = "open-cluster-management.io/addon-name";

const CERTIFICATE_REQUEST_TAG: &str = "CERTIFICATE REQUEST";

struct RequestedSubject {
    common_name: String,
    organizations: Vec<String>,
}

fn requested_subject(request: &[u8]) -> Result<RequestedSubject, String> {
    let block = pem::parse(request).map_err(|err| format!("not a PEM block: {}", err))?;
    if block.tag() != CERTIFICATE_REQUEST_TAG {
	return Err(format!("PEM block type is {}, expected {}", block.tag(), CERTIFICATE_REQUEST_TAG));
    }

    let (_, request) = X509CertificationRequest::from_der(block.contents())
	.map_err(|err| format!("unable to parse certificate request: {}", err))?;
    let subject = &request.certification_request_info.subject;

    let common_name = subject.iter_common_name()
	.next()
	.and_then(|cn| cn.as_str().ok())
	.unwrap_or_default()
	.to_string();
    let organizations = subject.iter_organization()
	.filter_map(|org| org.as_str().ok())
	.map(|org| org.to_string())
	.collect();

    Ok(RequestedSubject{ common_name, organizations })
}

/*
 * Approves CSRs the agent of a cluster issues with its default user and
 * groups against the kube-apiserver client signer. The request must come from
 * that cluster's registration agent.
 */
pub fn default_csr_approver(agent_name: &str) -> CsrApproveFunc {
    let agent_name = agent_name.to_string();

    Arc::new(move |cluster: &api::ManagedCluster, addon: &api::ManagedClusterAddOn, csr: &CertificateSigningRequest| {
	let cluster_name = cluster.metadata.name.clone().unwrap_or_default();
	let addon_name = addon.metadata.name.clone().unwrap_or_default();
	let csr_name = csr.metadata.name.clone().unwrap_or_default();

	if csr.spec.signer_name != agent::KUBE_APISERVER_CLIENT_SIGNER {
	    log::info!("CSR {} is not approved: unexpected signer {}", csr_name, csr.spec.signer_name);
	    return false;
	}

	let subject = match requested_subject(&csr.spec.request.0) {
	    Ok(subject) => subject,
	    Err(err) => {
		log::info!("CSR {} is not approved: {}", csr_name, err);
		return false;
	    }
	};

	let groups = agent::default_groups(&cluster_name, &addon_name);
	if subject.organizations.is_empty()
	    || !subject.organizations.iter().all(|org| groups.contains(org))
	    || !subject.organizations.contains(&groups[0]) {
	    log::info!("CSR {} is not approved: requested organizations {:?}", csr_name, subject.organizations);
	    return false;
	}

	let user = agent::default_user(&cluster_name, &addon_name, &agent_name);
	if subject.common_name != user {
	    log::info!("CSR {} is not approved: requested common name {}", csr_name, subject.common_name);
	    return false;
	}

	let requester_prefix = format!("system:open-cluster-management:{}:", cluster_name);
	match &csr.spec.username {
	    Some(username) if username.starts_with(&requester_prefix) => true,
	    username => {
		log::info!("CSR {} is not approved: requested by {:?}", csr_name, username);
		false
	    }
	}
    })
}

/* true once the CSR carries an Approved or Denied condition */
pub fn is_decided(csr: &CertificateSigningRequest) -> bool {
    csr.status.as_ref()
	.and_then(|status| status.conditions.as_ref())
	.is_some_and(|conditions| conditions.iter().any(|c| c.type_ == "Approved" || c.type_ == "Denied"))
}
