use serde::{Deserialize, Serialize};

/// One conversation thread with an agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub agent_config_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Unix timestamp in milliseconds
    pub updated_at: i64,
    #[serde(default)]
    pub archived: bool,
}

/// Optional attributes supplied when creating a session
#[derive(Clone, Debug, Default)]
pub struct SessionOverrides {
    pub avatar: Option<String>,
    pub cwd: Option<String>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        agent_config_id: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            avatar: None,
            agent_config_id: agent_config_id.into(),
            cwd: None,
            created_at: now,
            updated_at: now,
            archived: false,
        }
    }

    pub fn with_overrides(mut self, overrides: SessionOverrides) -> Self {
        self.avatar = overrides.avatar;
        self.cwd = overrides.cwd;
        self
    }

    /// Bump `updated_at`, never moving it backwards
    pub fn touch(&mut self, now: i64) {
        self.updated_at = self.updated_at.max(now);
    }
}
