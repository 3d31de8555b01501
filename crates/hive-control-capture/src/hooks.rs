//! Webhook target configuration.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use serde::Deserialize;

/// Process-wide hook configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookConfig {
    pub global_enabled: bool,
    /// Empty means unset.
    pub global_url: String,
    pub per_context_url: HashMap<String, String>,
}

impl HookConfig {
    /// Target URL for records of a context.
    ///
    /// A non-empty per-context URL wins regardless of the global flag.
    #[must_use]
    pub fn resolve_url(&self, context_id: &str) -> Option<&str> {
        if let Some(url) = self.per_context_url.get(context_id).filter(|u| !u.is_empty()) {
            return Some(url.as_str());
        }
        if self.global_enabled && !self.global_url.is_empty() {
            return Some(self.global_url.as_str());
        }
        None
    }
}

/// Partial update; only the provided keys are applied.
///
/// Field names follow the host application's settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HookConfigUpdate {
    #[serde(rename = "globalHookEnabled", default)]
    pub global_enabled: Option<bool>,
    #[serde(rename = "globalHookUrl", default)]
    pub global_url: Option<String>,
    /// Replaces the whole per-context map when present.
    #[serde(rename = "pageHookUrls", default)]
    pub per_context_url: Option<HashMap<String, String>>,
}

impl HookConfigUpdate {
    /// Whether the update carries no keys.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.global_enabled.is_none() && self.global_url.is_none() && self.per_context_url.is_none()
    }
}

/// Holder of the current [`HookConfig`].
///
/// Each `configure` builds a fresh config and swaps it in whole, so a
/// forward running concurrently sees either the old or the new map.
#[derive(Debug, Default)]
pub struct HookConfigStore {
    current: RwLock<Arc<HookConfig>>,
}

impl HookConfigStore {
    /// Create a store with forwarding disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a partial update into the current configuration.
    pub fn configure(&self, update: HookConfigUpdate) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = HookConfig::clone(&current);

        if let Some(enabled) = update.global_enabled {
            next.global_enabled = enabled;
        }
        if let Some(url) = update.global_url {
            next.global_url = url.trim().to_string();
        }
        if let Some(urls) = update.per_context_url {
            next.per_context_url = urls
                .into_iter()
                .map(|(context_id, url)| (context_id, url.trim().to_string()))
                .filter(|(_, url)| !url.is_empty())
                .collect();
        }

        tracing::debug!(
            global_enabled = next.global_enabled,
            per_context = next.per_context_url.len(),
            "hook configuration updated"
        );
        *current = Arc::new(next);
    }

    /// Current configuration.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HookConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Target URL for records of a context, if any.
    #[must_use]
    pub fn resolve_url(&self, context_id: &str) -> Option<String> {
        self.snapshot().resolve_url(context_id).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_context_url_wins() {
        let store = HookConfigStore::new();
        store.configure(HookConfigUpdate {
            global_enabled: Some(true),
            global_url: Some("https://b".to_string()),
            per_context_url: Some(HashMap::from([("7".to_string(), "https://a".to_string())])),
        });

        assert_eq!(store.resolve_url("7").as_deref(), Some("https://a"));
        assert_eq!(store.resolve_url("8").as_deref(), Some("https://b"));

        // Still wins with the global hook switched off.
        store.configure(HookConfigUpdate {
            global_enabled: Some(false),
            ..HookConfigUpdate::default()
        });
        assert_eq!(store.resolve_url("7").as_deref(), Some("https://a"));
        assert_eq!(store.resolve_url("8"), None);
    }

    #[test]
    fn test_configure_merges_only_provided_keys() {
        let store = HookConfigStore::new();
        store.configure(HookConfigUpdate {
            global_enabled: Some(true),
            global_url: Some("https://global".to_string()),
            per_context_url: None,
        });
        store.configure(HookConfigUpdate {
            global_url: Some(String::new()),
            ..HookConfigUpdate::default()
        });

        let config = store.snapshot();
        assert!(config.global_enabled);
        assert!(config.global_url.is_empty());
        assert_eq!(config.resolve_url("any"), None);
    }

    #[test]
    fn test_per_context_map_is_replaced_and_filtered() {
        let store = HookConfigStore::new();
        store.configure(HookConfigUpdate {
            per_context_url: Some(HashMap::from([
                ("1".to_string(), "https://one".to_string()),
                ("2".to_string(), "https://two".to_string()),
            ])),
            ..HookConfigUpdate::default()
        });
        store.configure(HookConfigUpdate {
            per_context_url: Some(HashMap::from([
                ("2".to_string(), "https://two-b".to_string()),
                ("3".to_string(), "  ".to_string()),
            ])),
            ..HookConfigUpdate::default()
        });

        let config = store.snapshot();
        assert_eq!(
            config.per_context_url,
            HashMap::from([("2".to_string(), "https://two-b".to_string())])
        );
    }

    #[test]
    fn test_update_parses_settings_names() {
        let update: HookConfigUpdate = serde_json::from_value(serde_json::json!({
            "globalHookEnabled": true,
            "pageHookUrls": { "c1": "https://hook" }
        }))
        .unwrap();

        assert_eq!(update.global_enabled, Some(true));
        assert_eq!(update.global_url, None);
        assert!(!update.is_empty());
        assert!(HookConfigUpdate::default().is_empty());
    }
}
