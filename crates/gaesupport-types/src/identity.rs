//! Application identity of the running deployment.

use serde::{Deserialize, Serialize};

/// Environment variable carrying the application id (e.g. `s~my-app`).
pub const APPLICATION_ID_ENV: &str = "APPLICATION_ID";

/// Environment variable carrying the module (service) id.
pub const MODULE_ID_ENV: &str = "CURRENT_MODULE_ID";

/// Identity of the deployed application instance.
///
/// Two deployments sharing one cache or datastore are kept apart by the
/// session key prefix derived from this identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Application id, possibly carrying a partition prefix (`s~my-app`).
    pub application_id: String,
    /// Module (service) id.
    pub module_id: String,
}

impl AppIdentity {
    pub fn new(application_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            module_id: module_id.into(),
        }
    }

    /// Cloud project id: the application id without its partition prefix.
    pub fn project_id(&self) -> &str {
        match self.application_id.find('~') {
            Some(pos) => &self.application_id[pos + 1..],
            None => &self.application_id,
        }
    }

    /// Prefix prepended to every session id: `_<app>_<module>_sess_`.
    pub fn session_prefix(&self) -> String {
        format!("_{}_{}_sess_", self.application_id, self.module_id)
    }
}
