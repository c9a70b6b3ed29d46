//! # Wordbook Collections
//!
//! User-facing word storage on top of the durable store: collections of
//! entries, global per-word overrides, the overlay that decides what a
//! collection shows, and the derived mastery index.
//!
//! ## Features
//!
//! - **Collections** with ordered entries and per-entry study progress ([`CollectionStore`])
//! - **User defaults**: global overrides keyed by normalized word ([`UserDefaultsStore`])
//! - **Overlay view**: customized entry > user default > snapshot, never merged ([`view`])
//! - **Mastery index**: O(1) "mastered anywhere" checks with single-flight init ([`MasteryIndex`])
//! - **Candidate filtering** of raw text-detection output ([`CandidateFilter`])
//! - **Export/import** of a collection as a portable JSON document ([`SharedCollection`])
//!
//! ## Architecture
//!
//! ```text
//! collections            → Vec<CollectionMeta>
//! collection:{id}        → Vec<CollectionEntry>   ──scan──┐
//! user-defaults          → map word → override            │
//! mastery-index          → Vec<word>  <── MasteryIndex <──┘
//!
//! view(entry, defaults):
//!     entry.is_customized  → entry verbatim      (Customized)
//!     defaults[entry.word] → override projection (UserDefault)
//!     otherwise            → entry snapshot      (Base)
//! ```
//!
//! Each store mutates one key per call through the transactional writer.
//! Keeping the mastery index in step with collection writes is the caller's
//! job; [`MasteryIndex::rebuild`] repairs any drift.

mod candidates;
mod collection_store;
mod error;
mod exchange;
mod mastery;
mod model;
mod overlay;
mod user_defaults;

pub use candidates::{CandidateFilter, DEFAULT_MIN_LENGTH};
pub use collection_store::{CollectionStore, DEFAULT_COLLECTION_NAME};
pub use error::{CollectionError, Result};
pub use exchange::{ImportReport, SharedCollection, SharedMetadata, SharedWord, EXPORT_CONFIDENCE};
pub use mastery::{MasteryIndex, MasterySource, MasteryStats};
pub use model::{
    AddOutcome, CollectionEntry, CollectionId, CollectionMeta, CollectionStatistics,
    CollectionUpdate, EntryId, EntryOrigin, EntryPatch, StudyProgress, UserDefaultEntry,
};
pub use overlay::{view, view_all, EffectiveWord, OverlaySource};
pub use user_defaults::{UserDefaults, UserDefaultsStatistics, UserDefaultsStore};
