pub mod config;
pub mod evaluate;
pub mod github;
pub mod host;
pub mod owners_client;
pub mod webhook;

use std::sync::Arc;

use crate::config::PolicyStore;
use crate::evaluate::{EvaluationLocks, LinkConfig};
use crate::host::HostApi;
use crate::owners_client::OwnersProvider;

pub struct AppState {
    pub host: Arc<dyn HostApi>,
    pub owners: Arc<dyn OwnersProvider>,
    pub webhook_secret: String,
    pub policies: PolicyStore,
    pub links: LinkConfig,
    pub locks: EvaluationLocks,
}
