//! Core scheduling and reconciliation engine for a day-planner built around
//! fixed 15-minute time slots.
//!
//! The crate is split into three layers:
//!
//! - [`domain`]: pure data and logic — the interval records, the 96-slot day
//!   grid, and the gesture state machine that turns slot presses and drags
//!   into interval intents.
//! - [`application`]: the session, the day view reconciliation engine
//!   ([`DayViewService`]) and the category manager ([`CategoryService`]).
//!   Reads degrade to the local cache when the remote store is unreachable;
//!   creates and updates fall back to local-only records; deletes stay
//!   strict.
//! - [`infrastructure`]: the [`RemoteStore`] and [`LocalCache`] seams with
//!   their REST and SQLite implementations, plus the crate-wide error type.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::categories::CategoryService;
pub use application::day_view::{DayView, DayViewService, LoadMeta};
pub use application::session::Session;
pub use domain::gesture::{GestureIntent, GestureTranslator};
pub use domain::models::{
    BlockCandidate, Category, CategoryDraft, CategoryKind, CategoryPatch, Draft, TimeBlock,
};
pub use domain::slot_grid::{day_slots, occupying_block, SLOTS_PER_DAY, SLOT_MINUTES};
pub use infrastructure::error::CoreError;
pub use infrastructure::local_cache::{InMemoryLocalCache, LocalCache, SqliteLocalCache};
pub use infrastructure::remote_store::{BlockQuery, RemoteStore, RestRemoteStore};
