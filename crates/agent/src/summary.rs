//! Memory digest injected into every prompt.
//!
//! The digest is line-oriented and always in this order:
//!
//! ```text
//! Chats: 3 | Online: Yes
//! User: {"name":"Sam"}
//! Facts learned: 2
//! Procedures: make tea, greet
//! Recent:
//! [14:02] U: hi
//! [14:02] A: Hello!
//! ```
//!
//! Only the first line is unconditional. Sections with nothing to show are
//! left out entirely.

use chrono::Local;
use keepsake_core::memory::{INTERACTION_COUNT, MemoryStore};
use keepsake_core::message::ConversationEntry;
use tracing::warn;

/// Number of conversation entries (two exchanges) shown by default.
pub const DEFAULT_WINDOW: usize = 4;

/// Builds the compact memory summary.
#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    window: usize,
}

impl ContextBuilder {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Summarize the store. Only reads; a failed read drops its section.
    pub async fn summarize(&self, store: &dyn MemoryStore, online: bool) -> String {
        let mut lines = Vec::new();

        let chats = read_interaction_count(store).await;
        lines.push(format!(
            "Chats: {chats} | Online: {}",
            if online { "Yes" } else { "No" }
        ));

        let attributes = store.user_attributes().await.unwrap_or_else(|e| {
            warn!(error = %e, "Skipping user attributes in summary");
            Default::default()
        });
        if !attributes.is_empty() {
            let rendered = serde_json::to_string(&attributes).unwrap_or_default();
            lines.push(format!("User: {rendered}"));
        }

        match store.count_facts().await {
            Ok(0) => {}
            Ok(n) => lines.push(format!("Facts learned: {n}")),
            Err(e) => warn!(error = %e, "Skipping fact count in summary"),
        }

        match store.list_procedure_names().await {
            Ok(names) if !names.is_empty() => {
                lines.push(format!("Procedures: {}", names.join(", ")));
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Skipping procedures in summary"),
        }

        if self.window > 0 {
            match store.recent_conversation(self.window).await {
                Ok(entries) if !entries.is_empty() => {
                    lines.push("Recent:".to_string());
                    lines.extend(entries.iter().map(render_entry));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping recent conversation in summary"),
            }
        }

        lines.join("\n")
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

/// The stored interaction counter, or 0 when missing or unreadable.
pub async fn read_interaction_count(store: &dyn MemoryStore) -> u64 {
    match store.get_metadata(INTERACTION_COUNT).await {
        Ok(Some(raw)) => raw.trim().parse().unwrap_or(0),
        Ok(None) => 0,
        Err(e) => {
            warn!(error = %e, "Could not read interaction count");
            0
        }
    }
}

fn render_entry(entry: &ConversationEntry) -> String {
    let time = entry.timestamp.with_timezone(&Local).format("%H:%M");
    format!("[{time}] {}: {}", entry.role.letter(), entry.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepsake_core::message::Role;
    use keepsake_memory::SqliteStore;

    async fn store() -> SqliteStore {
        SqliteStore::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn empty_store_has_only_counter_line() {
        let db = store().await;
        let summary = ContextBuilder::default().summarize(&db, true).await;
        assert_eq!(summary, "Chats: 0 | Online: Yes");
    }

    #[tokio::test]
    async fn offline_flag() {
        let db = store().await;
        let summary = ContextBuilder::default().summarize(&db, false).await;
        assert_eq!(summary, "Chats: 0 | Online: No");
    }

    #[tokio::test]
    async fn sections_appear_in_fixed_order() {
        let db = store().await;
        db.increment_interaction_count().await.unwrap();
        db.increment_interaction_count().await.unwrap();
        db.set_user_attribute("name", "Sam").await.unwrap();
        db.learn_fact("color", "blue").await.unwrap();
        db.learn_procedure("greet", &["wave".to_string()]).await.unwrap();
        db.append_conversation(Role::User, "hi").await.unwrap();
        db.append_conversation(Role::Assistant, "Hello!").await.unwrap();

        let summary = ContextBuilder::default().summarize(&db, true).await;
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "Chats: 2 | Online: Yes");
        assert_eq!(lines[1], r#"User: {"name":"Sam"}"#);
        assert_eq!(lines[2], "Facts learned: 1");
        assert_eq!(lines[3], "Procedures: greet");
        assert_eq!(lines[4], "Recent:");
        assert!(lines[5].starts_with('[') && lines[5].ends_with("] U: hi"));
        assert!(lines[6].ends_with("] A: Hello!"));
        assert_eq!(lines.len(), 7);
    }

    #[tokio::test]
    async fn recent_window_is_bounded() {
        let db = store().await;
        for i in 0..10 {
            db.append_conversation(Role::User, &format!("m{i}")).await.unwrap();
        }

        let summary = ContextBuilder::default().summarize(&db, true).await;
        let recent: Vec<&str> = summary.lines().skip_while(|l| *l != "Recent:").skip(1).collect();
        assert_eq!(recent.len(), 4);
        assert!(recent[0].ends_with("U: m6"));
        assert!(recent[3].ends_with("U: m9"));
    }

    #[tokio::test]
    async fn zero_window_hides_history() {
        let db = store().await;
        db.append_conversation(Role::User, "hello").await.unwrap();
        let summary = ContextBuilder::new(0).summarize(&db, true).await;
        assert!(!summary.contains("Recent:"));
    }

    #[tokio::test]
    async fn closed_store_degrades_to_counter_line() {
        let db = store().await;
        db.learn_fact("color", "blue").await.unwrap();
        db.close().await;
        let summary = ContextBuilder::default().summarize(&db, true).await;
        assert_eq!(summary, "Chats: 0 | Online: Yes");
    }

    #[test]
    fn renders_time_and_role_letter() {
        let entry = ConversationEntry {
            id: 1,
            timestamp: chrono::Utc::now(),
            role: Role::Assistant,
            text: "sure".into(),
        };
        let line = render_entry(&entry);
        assert_eq!(line.len(), "[00:00] A: sure".len());
        assert!(line.ends_with("] A: sure"));
    }
}
