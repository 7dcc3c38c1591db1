/*
 * ocm-api - the open-cluster-management objects the application-manager
 * addon reads and writes on the hub.
 */

pub mod managedcluster;
pub use managedcluster::ManagedCluster;
pub use managedcluster::ManagedClusterStatus;
pub use managedcluster::ManagedClusterVersion;

pub mod managedclusteraddon;
pub use managedclusteraddon::ManagedClusterAddOn;
pub use managedclusteraddon::ManagedClusterAddOnStatus;
pub use managedclusteraddon::RegistrationConfig;
pub use managedclusteraddon::Subject;

pub mod manifestwork;
pub use manifestwork::ManifestWork;
