use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Structured configuration the backend needs to run an agent
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    /// Tool names the agent may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_params: HashMap<String, String>,
}

impl AgentConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            model: None,
            system_prompt: String::new(),
            tools: Vec::new(),
            extra_params: HashMap::new(),
        }
    }
}

pub type SharedAgentConfigRegistry = Arc<RwLock<AgentConfigRegistry>>;

#[derive(Clone, Default)]
pub struct AgentConfigRegistry {
    configs: Vec<AgentConfig>,
}

impl AgentConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(configs: Vec<AgentConfig>) -> SharedAgentConfigRegistry {
        Arc::new(RwLock::new(Self { configs }))
    }

    /// Add a config, replacing any existing entry with the same id
    pub fn upsert(&mut self, config: AgentConfig) {
        match self.configs.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => *existing = config,
            None => self.configs.push(config),
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let initial_len = self.configs.len();
        self.configs.retain(|c| c.id != id);
        self.configs.len() < initial_len
    }

    pub fn get(&self, id: &str) -> Option<&AgentConfig> {
        self.configs.iter().find(|c| c.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&AgentConfig> {
        self.configs.iter().find(|c| c.name == name)
    }

    /// Lookup by id, then by name
    pub fn resolve(&self, id_or_name: &str) -> Option<&AgentConfig> {
        self.get(id_or_name).or_else(|| self.find_by_name(id_or_name))
    }

    pub fn configs(&self) -> &[AgentConfig] {
        &self.configs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_id_over_name() {
        let mut registry = AgentConfigRegistry::new();
        registry.upsert(AgentConfig::new("coder", "Reviewer"));
        registry.upsert(AgentConfig::new("reviewer-1", "coder"));

        assert_eq!(registry.resolve("coder").map(|c| c.name.as_str()), Some("Reviewer"));
        assert_eq!(
            registry.resolve("Reviewer").map(|c| c.id.as_str()),
            Some("coder")
        );
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let mut registry = AgentConfigRegistry::new();
        registry.upsert(AgentConfig::new("a", "First"));
        registry.upsert(AgentConfig::new("a", "Second"));

        assert_eq!(registry.configs().len(), 1);
        assert_eq!(registry.get("a").map(|c| c.name.as_str()), Some("Second"));
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
    }
}
