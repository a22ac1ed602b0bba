use std::ops::Deref;
use std::sync::Arc;

use parley_llm::{ProviderMessage, Role as ProviderRole};

/// Speaker of one committed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

impl From<Role> for ProviderRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ProviderRole::User,
            Role::Assistant => ProviderRole::Assistant,
        }
    }
}

/// One immutable message in conversation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn to_provider_message(&self) -> ProviderMessage {
        ProviderMessage::new(self.role.into(), self.text.clone())
    }
}

/// Append-only, ordered conversation log.
///
/// Turns live behind an `Arc`, so snapshots are cheap to take and stay frozen: an append
/// while a snapshot is held copies the backing vector first.
#[derive(Debug, Clone, Default)]
pub struct History {
    turns: Arc<Vec<Turn>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// The only mutator.
    pub fn append(&mut self, turn: Turn) {
        Arc::make_mut(&mut self.turns).push(turn);
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot(Arc::clone(&self.turns))
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Read-only view of the history at the moment it was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySnapshot(Arc<Vec<Turn>>);

impl HistorySnapshot {
    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    pub fn to_provider_messages(&self) -> Vec<ProviderMessage> {
        self.0.iter().map(Turn::to_provider_message).collect()
    }
}

impl Deref for HistorySnapshot {
    type Target = [Turn];

    fn deref(&self) -> &[Turn] {
        &self.0
    }
}

impl PartialEq<[Turn]> for HistorySnapshot {
    fn eq(&self, other: &[Turn]) -> bool {
        self.0.as_slice() == other
    }
}

impl<const N: usize> PartialEq<[Turn; N]> for HistorySnapshot {
    fn eq(&self, other: &[Turn; N]) -> bool {
        self.0.as_slice() == other.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_insertion_order() {
        let mut history = History::new();
        history.append(Turn::user("one"));
        history.append(Turn::assistant("two"));
        history.append(Turn::user("three"));

        let texts = history
            .snapshot()
            .iter()
            .map(|turn| turn.text().to_string())
            .collect::<Vec<_>>();
        assert_eq!(texts, ["one", "two", "three"]);
        assert_eq!(history.last(), Some(&Turn::user("three")));
    }

    #[test]
    fn snapshot_is_not_mutated_by_later_appends() {
        let mut history = History::new();
        history.append(Turn::user("hi"));
        let before = history.snapshot();

        history.append(Turn::assistant("hello"));

        assert_eq!(before, [Turn::user("hi")]);
        assert_eq!(history.snapshot(), [Turn::user("hi"), Turn::assistant("hello")]);
    }

    #[test]
    fn provider_messages_keep_roles() {
        let mut history = History::new();
        history.append(Turn::user("q"));
        history.append(Turn::assistant("a"));

        let messages = history.snapshot().to_provider_messages();
        assert_eq!(messages[0].role, ProviderRole::User);
        assert_eq!(messages[1].role, ProviderRole::Assistant);
        assert_eq!(messages[1].content, "a");
    }

    #[test]
    fn empty_history_reports_empty() {
        let history = History::new();
        assert!(history.is_empty());
        assert_eq!(history.len(), 0);
        assert!(history.snapshot().turns().is_empty());
    }
}
