pub mod codec;

use serde::Serialize;
use serde_yaml::Mapping;

/// The fixed name ↔ filename rule. A record's name is slugified once at
/// create time, and its file is `<table>/<name>.md` — so the stored name
/// and the file stem are always identical, making the mapping reversible.
pub fn normalize_name(name: &str) -> String {
    slug::slugify(name)
}

/// Lifecycle of a record relative to its backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Created in memory, never persisted.
    Transient,
    /// Matches the last loaded/saved disk state.
    Clean,
    /// Mutated since the last load/save.
    Dirty,
    /// Marked for deletion; file removed at next save. Invisible to
    /// lookups, but its name stays reserved until the save purges it.
    Removed,
}

/// One named item in a table: typed header fields plus opaque body text.
#[derive(Debug, Clone)]
pub struct Record {
    name: String,
    properties: Mapping,
    content: String,
    state: RecordState,
}

impl Record {
    pub(crate) fn new(
        name: String,
        properties: Mapping,
        content: String,
        state: RecordState,
    ) -> Self {
        Record {
            name,
            properties,
            content,
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &Mapping {
        &self.properties
    }

    pub(crate) fn properties_mut(&mut self) -> &mut Mapping {
        &mut self.properties
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub(crate) fn set_content(&mut self, content: String) {
        self.content = content;
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: RecordState) {
        self.state = state;
    }

    /// Clean records become Dirty on mutation; Transient records stay
    /// Transient (there is no disk state to diverge from yet).
    pub(crate) fn mark_dirty(&mut self) {
        if self.state == RecordState::Clean {
            self.state = RecordState::Dirty;
        }
    }

    pub fn is_live(&self) -> bool {
        self.state != RecordState::Removed
    }

    /// Detached copy for callers. Mutating it never touches the store.
    pub fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            name: self.name.clone(),
            properties: self.properties.clone(),
            content: self.content.clone(),
        }
    }
}

/// A detached copy of one record's visible state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSnapshot {
    pub name: String,
    pub properties: Mapping,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_name_is_stable() {
        assert_eq!(normalize_name("My Note"), "my-note");
        assert_eq!(normalize_name("a/b.c"), "a-b-c");
        assert_eq!(normalize_name("n1"), "n1");
        // Already-normalized names pass through unchanged.
        assert_eq!(normalize_name("my-note"), "my-note");
    }

    #[test]
    fn dirty_marking_only_affects_clean() {
        let mut r = Record::new("x".into(), Mapping::new(), String::new(), RecordState::Clean);
        r.mark_dirty();
        assert_eq!(r.state(), RecordState::Dirty);

        let mut t = Record::new(
            "y".into(),
            Mapping::new(),
            String::new(),
            RecordState::Transient,
        );
        t.mark_dirty();
        assert_eq!(t.state(), RecordState::Transient);
    }
}
