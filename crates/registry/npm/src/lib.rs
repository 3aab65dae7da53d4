mod registry;

use std::sync::Arc;

use age_guard_core::RegistryClient;
pub use registry::NpmRegistryClient;

pub fn create_client() -> Arc<dyn RegistryClient> {
    Arc::new(NpmRegistryClient::new())
}
