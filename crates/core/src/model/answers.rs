use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Selected option per question index. Unanswered indices are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerStore {
    selected: BTreeMap<usize, usize>,
}

impl AnswerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a selection, returning the option it replaced.
    pub fn select(&mut self, question_index: usize, option_index: usize) -> Option<usize> {
        self.selected.insert(question_index, option_index)
    }

    #[must_use]
    pub fn get(&self, question_index: usize) -> Option<usize> {
        self.selected.get(&question_index).copied()
    }

    #[must_use]
    pub fn is_answered(&self, question_index: usize) -> bool {
        self.selected.contains_key(&question_index)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.selected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.selected.iter().map(|(q, o)| (*q, *o))
    }
}

impl FromIterator<(usize, usize)> for AnswerStore {
    fn from_iter<I: IntoIterator<Item = (usize, usize)>>(iter: I) -> Self {
        Self {
            selected: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_overwrites_previous_answer() {
        let mut store = AnswerStore::new();
        assert_eq!(store.select(2, 1), None);
        assert_eq!(store.select(2, 3), Some(1));
        assert_eq!(store.get(2), Some(3));
        assert_eq!(store.answered_count(), 1);
        assert!(!store.is_answered(0));
    }

    #[test]
    fn serializes_as_plain_map() {
        let store: AnswerStore = [(0, 1), (4, 2)].into_iter().collect();
        let json = serde_json::to_string(&store).unwrap();
        assert_eq!(json, r#"{"0":1,"4":2}"#);
        let back: AnswerStore = serde_json::from_str(&json).unwrap();
        assert_eq!(back, store);
    }
}
