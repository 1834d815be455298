use serde::{Deserialize, Serialize};

/// Which side of the agency/client relationship the session user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTarget {
    Agency,
    Client,
}

/// Read-only session context handed to controllers and backends.
///
/// Created once per session and passed explicitly; nothing reads it from
/// ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub organization_id: String,
    pub user_id: String,
    pub role: String,
    #[serde(default)]
    pub workspace_name: Option<String>,
}

impl SessionContext {
    pub fn new(
        organization_id: impl Into<String>,
        user_id: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: user_id.into(),
            role: role.into(),
            workspace_name: None,
        }
    }

    /// Agency roles look at their clients' records; everyone else is a client.
    pub fn target(&self) -> SessionTarget {
        if self.role.starts_with("agency_") {
            SessionTarget::Agency
        } else {
            SessionTarget::Client
        }
    }

    /// Cache scope for `collection`, namespaced by organization and target.
    pub fn scope(&self, collection: &str) -> String {
        let target = match self.target() {
            SessionTarget::Agency => "agency",
            SessionTarget::Client => "client",
        };
        format!("{}:{}:{}", self.organization_id, target, collection)
    }
}
