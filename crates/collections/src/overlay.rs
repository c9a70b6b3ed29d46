use crate::model::{CollectionEntry, CollectionId, EntryId, StudyProgress};
use crate::user_defaults::UserDefaults;
use serde::Serialize;
use wordbook_dictionary::{Example, WordDefinition};

/// Which level of the override stack produced an [`EffectiveWord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlaySource {
    /// The entry was edited in this collection; shown verbatim.
    Customized,
    /// A global user default replaced the snapshot.
    UserDefault,
    /// The snapshot taken when the word was added.
    Base,
}

/// What a collection actually shows for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveWord {
    pub collection_id: CollectionId,
    pub entry_id: EntryId,
    pub word: String,
    pub definition: WordDefinition,
    pub custom_note: Option<String>,
    pub custom_examples: Vec<Example>,
    pub tags: Vec<String>,
    pub progress: StudyProgress,
    pub source: OverlaySource,
}

/// Resolves the effective content of `entry`.
///
/// Exactly one level wins: a customized entry, else the user default for the
/// word, else the entry's snapshot. Fields are never merged across levels;
/// only per-entry bookkeeping (id, tags, progress) is carried through.
#[must_use]
pub fn view(
    collection_id: CollectionId,
    entry: &CollectionEntry,
    defaults: &UserDefaults,
) -> EffectiveWord {
    let (definition, custom_note, custom_examples, source) = if entry.is_customized {
        (
            entry.definition.clone(),
            entry.custom_note.clone(),
            Vec::new(),
            OverlaySource::Customized,
        )
    } else if let Some(default) = defaults.get(&entry.word) {
        (
            default.to_definition(),
            default.custom_note.clone(),
            default.custom_examples.clone(),
            OverlaySource::UserDefault,
        )
    } else {
        (
            entry.definition.clone(),
            entry.custom_note.clone(),
            Vec::new(),
            OverlaySource::Base,
        )
    };

    EffectiveWord {
        collection_id,
        entry_id: entry.id,
        word: entry.word.clone(),
        definition,
        custom_note,
        custom_examples,
        tags: entry.tags.clone(),
        progress: entry.progress.clone(),
        source,
    }
}

#[must_use]
pub fn view_all(
    collection_id: CollectionId,
    entries: &[CollectionEntry],
    defaults: &UserDefaults,
) -> Vec<EffectiveWord> {
    entries
        .iter()
        .map(|entry| view(collection_id, entry, defaults))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryOrigin, UserDefaultEntry};
    use pretty_assertions::assert_eq;
    use wordbook_dictionary::testing::simple_definition;

    fn defaults_with(word: &str, gloss: &str) -> UserDefaults {
        let mut entry = UserDefaultEntry::from_definition(&simple_definition(word, gloss));
        entry.custom_note = Some("my note".to_string());
        UserDefaults::from([(word.to_string(), entry)])
    }

    #[test]
    fn default_replaces_snapshot_of_plain_entry() {
        let entry = CollectionEntry::new(1, simple_definition("run", "뛰다"), EntryOrigin::Remote, 0);
        let defaults = defaults_with("run", "to move fast");

        let effective = view(7, &entry, &defaults);

        assert_eq!(effective.source, OverlaySource::UserDefault);
        assert_eq!(effective.definition.meanings[0].native, "to move fast");
        assert_eq!(effective.custom_note.as_deref(), Some("my note"));
        assert_eq!(effective.collection_id, 7);
    }

    #[test]
    fn customized_entry_ignores_defaults() {
        let mut entry =
            CollectionEntry::new(1, simple_definition("run", "내 뜻"), EntryOrigin::Remote, 0);
        entry.is_customized = true;
        let defaults = defaults_with("run", "to move fast");

        let effective = view(7, &entry, &defaults);

        assert_eq!(effective.source, OverlaySource::Customized);
        assert_eq!(effective.definition, entry.definition);
        assert_eq!(effective.custom_note, None);
    }

    #[test]
    fn no_default_means_base() {
        let entry = CollectionEntry::new(3, simple_definition("walk", "걷다"), EntryOrigin::Bundled, 0);
        let views = view_all(1, &[entry.clone()], &UserDefaults::new());
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].source, OverlaySource::Base);
        assert_eq!(views[0].definition, entry.definition);
    }
}
