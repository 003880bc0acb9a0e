//! Content mutation events.
//!
//! Hosts emit many differently named hooks when content changes. They are normalized here into
//! the two kinds the invalidation listener understands.

use std::fmt;

/// Hooks a host should forward to the invalidation listener.
pub const FORWARDED_HOOKS: [&str; 9] = [
    "actionCategoryAdd",
    "actionCategoryUpdate",
    "actionCategoryDelete",
    "actionProductAdd",
    "actionProductUpdate",
    "actionProductDelete",
    "actionProductSave",
    "actionClearCache",
    "actionEmptySmartyCache",
];

const HOOK_PREFIX: &str = "hook";
const ACTION_PREFIX: &str = "action";
// Request lifecycle hooks drive the gate, never invalidation.
const LIFECYCLE_ACTIONS: [&str; 2] = ["dispatcher", "requestcomplete"];

/// Normalized invalidation trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationEvent {
    /// Catalog or other rendered content changed.
    ContentMutated,
    /// The host asked for its caches to be emptied.
    CacheClearRequested,
}

impl MutationEvent {
    /// Map a host hook name onto an event.
    ///
    /// Any `action*` hook (optionally written as `hookAction*`) other than the request lifecycle
    /// hooks counts as a content mutation; hooks that name a cache clear map to
    /// [`MutationEvent::CacheClearRequested`]. Other names are not invalidation triggers.
    pub fn from_hook_name(name: &str) -> Option<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        let unprefixed = lowered.strip_prefix(HOOK_PREFIX).unwrap_or(&lowered);
        let action = unprefixed.strip_prefix(ACTION_PREFIX)?;
        if action.is_empty() || LIFECYCLE_ACTIONS.contains(&action) {
            return None;
        }

        let clears_cache = action.contains("emptysmartycache")
            || (action.contains("clear") && action.contains("cache"));

        Some(if clears_cache {
            MutationEvent::CacheClearRequested
        } else {
            MutationEvent::ContentMutated
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MutationEvent::ContentMutated => "content_mutated",
            MutationEvent::CacheClearRequested => "cache_clear_requested",
        }
    }
}

impl fmt::Display for MutationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
