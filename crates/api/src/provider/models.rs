//! Chat model aliases
//!
//! The UI selects models by alias (`chat-model-fast`); the gateway wants the
//! upstream model identifier (`google/gemini-2.0-flash-001`). The mapping
//! comes from `OPENROUTER_MODEL`, either `Name=provider/model` pairs or bare
//! identifiers assigned positionally (first is Fast, second is Reasoning).

/// Hard fallback when nothing resolves
const FALLBACK_MODEL: &str = "openai/gpt-4o";

#[derive(Debug, Clone)]
pub struct ModelEntry {
    /// Alias the API accepts, e.g. `chat-model-fast`
    pub alias: String,
    /// Display name, e.g. `Fast`
    pub name: String,
    /// Upstream model identifier
    pub model_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModelMap {
    entries: Vec<ModelEntry>,
}

impl ModelMap {
    /// Parse the `OPENROUTER_MODEL` environment string
    pub fn from_env_string(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
            tracing::warn!("OPENROUTER_MODEL not set, model aliases will fall back to the default");
            return Self::default();
        };

        let mut entries = Vec::new();
        for (index, part) in raw.split(',').map(str::trim).filter(|p| !p.is_empty()).enumerate() {
            let (name, model_id) = match part.split_once('=') {
                Some((name, model_id)) => (name.trim().to_string(), model_id.trim().to_string()),
                None => {
                    let name = match index {
                        0 => "Fast".to_string(),
                        1 => "Reasoning".to_string(),
                        n => format!("Model{}", n + 1),
                    };
                    (name, part.to_string())
                }
            };

            entries.push(ModelEntry {
                alias: format!("chat-model-{}", name.to_lowercase()),
                name,
                model_id,
            });
        }

        Self { entries }
    }

    /// Alias of the default model (the first configured one)
    pub fn default_alias(&self) -> String {
        self.entries
            .first()
            .map(|e| e.alias.clone())
            .unwrap_or_else(|| "chat-model-default".to_string())
    }

    /// Resolve an alias to the upstream model identifier.
    /// Unknown aliases resolve to the default model, then to the fallback.
    pub fn resolve(&self, alias: &str) -> String {
        self.entries
            .iter()
            .find(|e| e.alias == alias)
            .or_else(|| self.entries.first())
            .map(|e| e.model_id.clone())
            .unwrap_or_else(|| FALLBACK_MODEL.to_string())
    }

    /// Display name for an alias, used for reasoning-capability checks
    pub fn display_name(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.alias == alias)
            .map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[ModelEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_value_format() {
        let map = ModelMap::from_env_string(Some(
            "Fast=google/gemini-2.0-flash-001, Reasoning=deepseek/deepseek-r1",
        ));
        assert_eq!(map.resolve("chat-model-fast"), "google/gemini-2.0-flash-001");
        assert_eq!(map.resolve("chat-model-reasoning"), "deepseek/deepseek-r1");
        assert_eq!(map.default_alias(), "chat-model-fast");
    }

    #[test]
    fn test_positional_format() {
        let map = ModelMap::from_env_string(Some(
            "google/gemini-2.0-flash-001,deepseek/deepseek-r1,openai/o3-mini",
        ));
        assert_eq!(map.resolve("chat-model-fast"), "google/gemini-2.0-flash-001");
        assert_eq!(map.resolve("chat-model-reasoning"), "deepseek/deepseek-r1");
        assert_eq!(map.resolve("chat-model-model3"), "openai/o3-mini");
    }

    #[test]
    fn test_unknown_alias_falls_back_to_default() {
        let map = ModelMap::from_env_string(Some("Fast=google/gemini-2.0-flash-001"));
        assert_eq!(map.resolve("chat-model-nonsense"), "google/gemini-2.0-flash-001");
    }

    #[test]
    fn test_empty_map_uses_fallback() {
        let map = ModelMap::from_env_string(None);
        assert_eq!(map.resolve("chat-model-anything"), FALLBACK_MODEL);
        assert_eq!(map.default_alias(), "chat-model-default");
    }
}
