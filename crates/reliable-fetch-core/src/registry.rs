use crate::{Job, DEFAULT_MAX_INTERRUPTIONS, INTERRUPTIONS_UNLIMITED};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback invoked when a job exhausts its interruption budget, before it
/// is diverted to the interrupted holding list. Errors are logged by the
/// caller and never stop the diversion.
pub type ExhaustionCallback = Arc<dyn Fn(&Job) -> anyhow::Result<()> + Send + Sync>;

/// Per-type interruption settings.
#[derive(Clone, Default)]
pub struct JobTypeConfig {
    /// Maximum interruptions before diversion; `None` falls back to the
    /// registry-wide default, [`INTERRUPTIONS_UNLIMITED`] disables the
    /// budget for this type entirely.
    pub max_interruptions: Option<i64>,
    pub on_exhausted: Option<ExhaustionCallback>,
}

/// Lookup table from job class name to its interruption settings,
/// populated at process start.
pub struct JobTypeRegistry {
    entries: RwLock<HashMap<String, JobTypeConfig>>,
    default_max: i64,
}

impl JobTypeRegistry {
    pub fn new(default_max: i64) -> Self {
        JobTypeRegistry {
            entries: RwLock::new(HashMap::new()),
            default_max,
        }
    }

    /// Register settings for a job class.
    pub fn register(&self, class: impl Into<String>, config: JobTypeConfig) {
        let mut entries = self.entries.write();
        entries.insert(class.into(), config);
    }

    /// Effective interruption budget for a class.
    pub fn max_interruptions(&self, class: &str) -> i64 {
        let entries = self.entries.read();
        entries
            .get(class)
            .and_then(|c| c.max_interruptions)
            .unwrap_or(self.default_max)
    }

    /// Whether the budget is disabled for a class.
    pub fn budget_disabled(&self, class: &str) -> bool {
        self.max_interruptions(class) == INTERRUPTIONS_UNLIMITED
    }

    /// Exhaustion callback for a class, if one is registered.
    pub fn on_exhausted(&self, class: &str) -> Option<ExhaustionCallback> {
        let entries = self.entries.read();
        entries.get(class).and_then(|c| c.on_exhausted.clone())
    }
}

impl Default for JobTypeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INTERRUPTIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_default_budget_fallback() {
        let registry = JobTypeRegistry::new(3);
        assert_eq!(registry.max_interruptions("Unregistered"), 3);
        assert!(!registry.budget_disabled("Unregistered"));
    }

    #[test]
    fn test_per_type_budget_and_sentinel() {
        let registry = JobTypeRegistry::new(3);
        registry.register(
            "Heavy",
            JobTypeConfig {
                max_interruptions: Some(10),
                on_exhausted: None,
            },
        );
        registry.register(
            "NeverDivert",
            JobTypeConfig {
                max_interruptions: Some(INTERRUPTIONS_UNLIMITED),
                on_exhausted: None,
            },
        );

        assert_eq!(registry.max_interruptions("Heavy"), 10);
        assert!(registry.budget_disabled("NeverDivert"));
    }

    #[test]
    fn test_exhaustion_callback_dispatch() {
        let registry = JobTypeRegistry::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        registry.register(
            "Mailer",
            JobTypeConfig {
                max_interruptions: None,
                on_exhausted: Some(Arc::new(move |_job| {
                    calls_clone.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
            },
        );

        let job = Job::from_bytes(br#"{"class":"Mailer"}"#).unwrap();
        let callback = registry.on_exhausted("Mailer").unwrap();
        callback(&job).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.on_exhausted("Other").is_none());
    }
}
