//! Small persisted lists behind the input affordances: recent questions,
//! table scope, metric rules and the demo question cursor.

use std::sync::Arc;

use tracing::warn;

use sqlchat_core::{load_json, save_json, KeyValueStore};

use crate::error::ChatError;
use crate::keys;

/// Maximum number of remembered questions.
pub const MAX_RECENTS: usize = 5;

// =============================================================================
// Recent questions
// =============================================================================

/// Most-recent-first, deduplicated question history.
pub struct RecentQuestions {
    store: Arc<dyn KeyValueStore>,
    items: Vec<String>,
}

impl RecentQuestions {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let mut items: Vec<String> = load_json(store.as_ref(), keys::RECENTS).unwrap_or_default();
        items.truncate(MAX_RECENTS);
        Self { store, items }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Move `question` to the front, dropping duplicates and overflow.
    pub fn add(&mut self, question: &str) -> Result<(), ChatError> {
        let q = question.trim();
        if q.is_empty() {
            return Ok(());
        }
        self.items.retain(|item| item != q);
        self.items.insert(0, q.to_string());
        self.items.truncate(MAX_RECENTS);
        save_json(self.store.as_ref(), keys::RECENTS, &self.items)?;
        Ok(())
    }
}

// =============================================================================
// Table scope
// =============================================================================

/// Tables the user has placed in scope, in selection order.
pub struct TableScope {
    store: Arc<dyn KeyValueStore>,
    selected: Vec<String>,
}

impl TableScope {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let raw: Vec<String> = load_json(store.as_ref(), keys::SCOPE).unwrap_or_default();
        let mut selected = Vec::with_capacity(raw.len());
        for name in raw {
            if !selected.contains(&name) {
                selected.push(name);
            }
        }
        Self { store, selected }
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn contains(&self, table: &str) -> bool {
        self.selected.iter().any(|t| t == table)
    }

    /// Add or remove `table`. Returns whether it is now selected.
    pub fn toggle(&mut self, table: &str) -> Result<bool, ChatError> {
        let now_selected = if let Some(pos) = self.selected.iter().position(|t| t == table) {
            self.selected.remove(pos);
            false
        } else {
            self.selected.push(table.to_string());
            true
        };
        save_json(self.store.as_ref(), keys::SCOPE, &self.selected)?;
        Ok(now_selected)
    }

    pub fn clear(&mut self) -> Result<(), ChatError> {
        self.selected.clear();
        save_json(self.store.as_ref(), keys::SCOPE, &self.selected)?;
        Ok(())
    }
}

/// Case-insensitive substring filter over table names. A blank query keeps
/// everything.
pub fn filter_tables<'a>(tables: &'a [String], query: &str) -> Vec<&'a str> {
    let q = query.trim().to_lowercase();
    tables
        .iter()
        .filter(|t| q.is_empty() || t.to_lowercase().contains(&q))
        .map(String::as_str)
        .collect()
}

// =============================================================================
// Metric rules
// =============================================================================

/// Free-form metric rule text kept verbatim.
pub struct MetricRules {
    store: Arc<dyn KeyValueStore>,
}

impl MetricRules {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> Option<String> {
        load_json(self.store.as_ref(), keys::METRIC_RULES)
    }

    pub fn save(&self, text: &str) -> Result<(), ChatError> {
        save_json(self.store.as_ref(), keys::METRIC_RULES, text)?;
        Ok(())
    }
}

// =============================================================================
// Demo questions
// =============================================================================

pub const DEMO_QUESTIONS: [&str; 10] = [
    "Are we on track to hit this month margin target?",
    "Which are our top 5 pipeline deals this month, and what percentage of total pipeline margin does each contribute?",
    "How much pipeline is in Commit vs Best Case vs Early Stage?",
    "How much margin we create last month vs budget",
    "Show top 5 deals in Pipeline by margin with deal name",
    "What is our pipeline coverage revenue for next quarter with revenue type name",
    "list top 10 sales person with their first name and last name this year",
    "show 10 deals revenue in pipeline this year with deal name",
    "compare q3 and q4 revenue for last year for each revenue type",
    "what to expect as a revenue and margin for next month",
];

/// Rotating cursor over [`DEMO_QUESTIONS`].
pub struct DemoQuestions {
    store: Arc<dyn KeyValueStore>,
}

impl DemoQuestions {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Return the question under the cursor and advance it.
    pub fn next_question(&self) -> &'static str {
        let raw: usize = load_json(self.store.as_ref(), keys::DEMO_IDX).unwrap_or(0);
        let idx = raw % DEMO_QUESTIONS.len();
        let next = (idx + 1) % DEMO_QUESTIONS.len();
        if let Err(e) = save_json(self.store.as_ref(), keys::DEMO_IDX, &next) {
            warn!(error = %e, "Failed to persist demo cursor");
        }
        DEMO_QUESTIONS[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlchat_core::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    // ---- Recents ----

    #[test]
    fn test_recents_dedup_and_cap() {
        let store = store();
        let mut recents = RecentQuestions::load(store.clone());
        for q in ["a", "b", "c", "d", "e", "f"] {
            recents.add(q).unwrap();
        }
        recents.add(" c ").unwrap();
        assert_eq!(recents.items(), ["c", "f", "e", "d", "b"]);

        let reloaded = RecentQuestions::load(store);
        assert_eq!(reloaded.items(), recents.items());
    }

    #[test]
    fn test_recents_ignore_blank() {
        let mut recents = RecentQuestions::load(store());
        recents.add("   ").unwrap();
        assert!(recents.items().is_empty());
    }

    #[test]
    fn test_recents_malformed_json() {
        let store = store();
        store.set(keys::RECENTS, "not json").unwrap();
        assert!(RecentQuestions::load(store).items().is_empty());
    }

    // ---- Table scope ----

    #[test]
    fn test_scope_toggle_persists() {
        let store = store();
        let mut scope = TableScope::load(store.clone());
        assert!(scope.toggle("dbo.Deals").unwrap());
        assert!(scope.toggle("dbo.Budget").unwrap());
        assert!(!scope.toggle("dbo.Deals").unwrap());

        let reloaded = TableScope::load(store);
        assert_eq!(reloaded.selected(), ["dbo.Budget"]);
        assert!(reloaded.contains("dbo.Budget"));
    }

    #[test]
    fn test_scope_load_dedups() {
        let store = store();
        store.set(keys::SCOPE, r#"["a","b","a"]"#).unwrap();
        assert_eq!(TableScope::load(store).selected(), ["a", "b"]);
    }

    #[test]
    fn test_filter_tables() {
        let tables: Vec<String> = ["dbo.Deals", "dbo.Budget", "sales.DealLines"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(filter_tables(&tables, "DEAL"), vec!["dbo.Deals", "sales.DealLines"]);
        assert_eq!(filter_tables(&tables, "  ").len(), 3);
        assert!(filter_tables(&tables, "zzz").is_empty());
    }

    // ---- Metric rules ----

    #[test]
    fn test_metric_rules_verbatim() {
        let rules = MetricRules::new(store());
        assert!(rules.load().is_none());
        let text = "margin = revenue - cost\n\"quoted\"";
        rules.save(text).unwrap();
        assert_eq!(rules.load().as_deref(), Some(text));
    }

    // ---- Demo ----

    #[test]
    fn test_demo_rotation_wraps() {
        let store = store();
        let demo = DemoQuestions::new(store.clone());
        let first = demo.next_question();
        assert_eq!(first, DEMO_QUESTIONS[0]);
        for _ in 1..DEMO_QUESTIONS.len() {
            demo.next_question();
        }
        assert_eq!(demo.next_question(), DEMO_QUESTIONS[0]);
        assert_eq!(DemoQuestions::new(store).next_question(), DEMO_QUESTIONS[1]);
    }

    #[test]
    fn test_demo_cursor_out_of_range() {
        let store = store();
        store.set(keys::DEMO_IDX, "23").unwrap();
        assert_eq!(DemoQuestions::new(store).next_question(), DEMO_QUESTIONS[3]);
    }
}
