//! Provider selection and restriction handling.
//!
//! The current provider must reference a non-restricted provider after any
//! state mutation; `reconcile` is the invariant-restoring step and runs after
//! every persona change, explicit pick, and admin restriction change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upstream model vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    #[default]
    Anthropic,
    Openai,
}

/// Fallback order when the current provider is restricted.
pub const PROVIDER_PRIORITY: [Provider; 3] =
    [Provider::Google, Provider::Anthropic, Provider::Openai];

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::Anthropic, Provider::Openai];

    /// Wire key used by the backend.
    pub fn key(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::Anthropic => "anthropic",
            Provider::Openai => "openai",
        }
    }

    pub fn from_key(key: &str) -> Option<Provider> {
        match key.trim().to_ascii_lowercase().as_str() {
            "google" => Some(Provider::Google),
            "anthropic" => Some(Provider::Anthropic),
            "openai" => Some(Provider::Openai),
            _ => None,
        }
    }

    /// Display name shown as the assistant sender label.
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Openai => "GPT",
            Provider::Google => "Gemini",
            Provider::Anthropic => "Claude",
        }
    }
}

/// Server-reported provider availability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    #[default]
    Active,
    Restricted,
}

/// Result of one `reconcile` pass: the selectable affordance per provider and
/// the replacement that was switched to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// `(provider, restricted)` in `Provider::ALL` order.
    pub availability: Vec<(Provider, bool)>,
    pub switched_to: Option<Provider>,
}

/// Current provider plus the restriction matrix it must stay valid under.
#[derive(Debug, Clone)]
pub struct ProviderState {
    current: Provider,
    statuses: HashMap<Provider, ProviderStatus>,
    persona_restrictions: HashMap<Provider, bool>,
}

impl Default for ProviderState {
    fn default() -> Self {
        Self::new(Provider::default())
    }
}

impl ProviderState {
    pub fn new(current: Provider) -> Self {
        Self {
            current,
            statuses: Provider::ALL
                .iter()
                .map(|p| (*p, ProviderStatus::Active))
                .collect(),
            persona_restrictions: HashMap::new(),
        }
    }

    pub fn current(&self) -> Provider {
        self.current
    }

    /// Set the current provider without validation; callers run `reconcile`
    /// afterwards to restore the invariant.
    pub fn set_current(&mut self, provider: Provider) {
        self.current = provider;
    }

    pub fn status(&self, provider: Provider) -> ProviderStatus {
        self.statuses
            .get(&provider)
            .copied()
            .unwrap_or(ProviderStatus::Active)
    }

    /// Merge server-reported statuses. A fetch failure never reaches this
    /// point; the previous state stays in place (fail-open).
    pub fn apply_statuses(&mut self, statuses: HashMap<Provider, ProviderStatus>) {
        for (provider, status) in statuses {
            self.statuses.insert(provider, status);
        }
    }

    /// Replace persona-specific overrides for the active persona.
    pub fn apply_persona_restrictions(&mut self, restrictions: HashMap<Provider, bool>) {
        self.persona_restrictions = restrictions;
    }

    /// Whether a provider is selectable right now. In image mode every
    /// provider except google is treated as restricted regardless of status.
    pub fn effective_restricted(&self, provider: Provider, image_mode: bool) -> bool {
        if image_mode && provider != Provider::Google {
            return true;
        }
        self.status(provider) == ProviderStatus::Restricted
            || self
                .persona_restrictions
                .get(&provider)
                .copied()
                .unwrap_or(false)
    }

    /// Recompute the selectable affordance and, when the current provider is
    /// effectively restricted, switch to a replacement: google in image mode,
    /// otherwise the first status-non-restricted entry of the fixed priority.
    /// The fallback loop consults only server statuses.
    pub fn reconcile(&mut self, image_mode: bool) -> ReconcileOutcome {
        let availability: Vec<(Provider, bool)> = Provider::ALL
            .iter()
            .map(|p| (*p, self.effective_restricted(*p, image_mode)))
            .collect();

        let mut switched_to = None;
        if self.effective_restricted(self.current, image_mode) {
            let replacement = if image_mode {
                Some(Provider::Google)
            } else {
                PROVIDER_PRIORITY
                    .iter()
                    .copied()
                    .find(|p| self.status(*p) != ProviderStatus::Restricted)
            };
            if let Some(next) = replacement {
                if next != self.current {
                    log::info!(
                        "provider {} is restricted, switching to {}",
                        self.current.key(),
                        next.key()
                    );
                    self.current = next;
                    switched_to = Some(next);
                }
            }
        }

        ReconcileOutcome {
            availability,
            switched_to,
        }
    }
}
