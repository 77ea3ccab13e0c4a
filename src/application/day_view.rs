use crate::application::session::Session;
use crate::domain::models::{
    next_local_id, BlockCandidate, BlockPatch, Category, CategoryDraft, CategoryKind, Draft,
    TimeBlock,
};
use crate::domain::slot_grid::day_start;
use crate::infrastructure::error::CoreError;
use crate::infrastructure::local_cache::{blocks_key, categories_key, draft_key, LocalCache};
use crate::infrastructure::remote_store::{BlockQuery, RemoteStore};
use chrono::{Duration, NaiveDate};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const META_SAMPLE_SIZE: usize = 3;
const META_NOTE_PREFIX_CHARS: usize = 50;

const DEFAULT_CATEGORY_SEEDS: [(&str, &str); 2] =
    [("entertainment", "#60a5fa"), ("rest", "#fbbf24")];

/// Diagnostics attached to every loaded view: block count plus a small sample
/// of note prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadMeta {
    pub day: NaiveDate,
    pub count: usize,
    pub sample: Vec<String>,
}

/// The authoritative view for one selected day: merged categories and the
/// blocks of the surrounding 3-day window. `warning` is set when the view was
/// served degraded (from cache) instead of from the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayView {
    pub day: NaiveDate,
    pub categories: Vec<Category>,
    pub blocks: Vec<TimeBlock>,
    pub meta: LoadMeta,
    pub warning: Option<String>,
}

/// Reconciliation engine. Owns the authoritative view for the currently
/// selected day; every other component sees cloned snapshots and mutates only
/// through these operations.
pub struct DayViewService<R, C>
where
    R: RemoteStore,
    C: LocalCache,
{
    session: Arc<Session<R, C>>,
    state: Mutex<Option<DayView>>,
    write_in_flight: AtomicBool,
}

pub(crate) struct WriteGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl<R, C> DayViewService<R, C>
where
    R: RemoteStore,
    C: LocalCache,
{
    pub fn new(session: Arc<Session<R, C>>) -> Self {
        Self {
            session,
            state: Mutex::new(None),
            write_in_flight: AtomicBool::new(false),
        }
    }

    pub(crate) fn session(&self) -> &Session<R, C> {
        &self.session
    }

    /// Read-only snapshot of the current authoritative view, if a day has
    /// been loaded.
    pub fn snapshot(&self) -> Option<DayView> {
        self.state.lock().expect("day view state lock").clone()
    }

    /// Rejects a second interactive write while one is still running. One
    /// in-flight mutation per session; the surrounding surface serializes
    /// gestures anyway, so contention here means a double submit.
    pub(crate) fn begin_write(&self, operation: &str) -> Result<WriteGuard<'_>, CoreError> {
        if self.write_in_flight.swap(true, Ordering::SeqCst) {
            return Err(CoreError::OperationInProgress(operation.to_string()));
        }
        Ok(WriteGuard {
            flag: &self.write_in_flight,
        })
    }

    /// Loads the authoritative view for `day`: remote query over the 3-day
    /// window, admission filtering, merge with the cache (cache wins ties),
    /// lazy default seeding, and a cache write-back. Remote failure degrades
    /// to cached data with a warning instead of failing the read.
    pub async fn load_day(&self, day: NaiveDate) -> Result<DayView, CoreError> {
        let owner = self.session.owner_id();
        let window_start = day_start(day - Duration::days(1));
        let window_end = day_start(day + Duration::days(2));

        let cached_categories: Vec<Category> = self
            .session
            .cache_read_json(&categories_key(owner))
            .unwrap_or_default();
        let cached_blocks: Vec<TimeBlock> = self
            .session
            .cache_read_json(&blocks_key(owner, day))
            .unwrap_or_default();

        let remote = async {
            let categories = self
                .session
                .remote_call("category list", self.session.remote().list_categories(owner))
                .await?;
            let query = BlockQuery::for_owner(owner).overlapping(window_start, window_end);
            let blocks = self
                .session
                .remote_call("time block list", self.session.remote().list_blocks(&query))
                .await?;
            Ok::<_, CoreError>((categories, blocks))
        }
        .await;

        let (mut categories, mut blocks, warning) = match remote {
            Ok((category_rows, block_rows)) => {
                let remote_categories = admit_categories(category_rows);
                let remote_blocks = admit_blocks(block_rows);
                let categories =
                    merge_by_id(remote_categories, cached_categories, |c: &Category| {
                        c.id.as_str()
                    });
                let blocks =
                    merge_by_id(remote_blocks, cached_blocks, |b: &TimeBlock| b.id.as_str());
                (categories, blocks, None)
            }
            Err(error) => {
                warn!(%error, %day, "remote load failed, serving cached data");
                (cached_categories, cached_blocks, Some(error.to_string()))
            }
        };

        if categories.is_empty() && warning.is_none() {
            categories = self.seed_default_categories().await;
        }

        // 3-day filter: cached entries from other sessions may fall outside
        // the window.
        blocks.retain(|block| block.end_time >= window_start && block.start_time <= window_end);

        categories.sort_by(|a, b| a.id.cmp(&b.id));
        blocks.sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));

        self.session
            .cache_write_json(&categories_key(owner), &categories);
        self.session
            .cache_write_json(&blocks_key(owner, day), &blocks);

        let meta = LoadMeta {
            day,
            count: blocks.len(),
            sample: blocks
                .iter()
                .take(META_SAMPLE_SIZE)
                .map(|block| {
                    block
                        .notes
                        .as_deref()
                        .unwrap_or_default()
                        .chars()
                        .take(META_NOTE_PREFIX_CHARS)
                        .collect()
                })
                .collect(),
        };
        info!(%day, count = meta.count, degraded = warning.is_some(), "day view loaded");

        let view = DayView {
            day,
            categories,
            blocks,
            meta,
            warning,
        };
        *self.state.lock().expect("day view state lock") = Some(view.clone());
        Ok(view)
    }

    /// Persists a candidate interval. Create path inserts remotely and adopts
    /// the server-assigned id; edit path updates by id and owner. Remote
    /// failure on either path degrades to a local-only record so the edit is
    /// never lost; the divergence stands until a later sync reconciles it.
    pub async fn save_block(&self, candidate: BlockCandidate) -> Result<TimeBlock, CoreError> {
        candidate.validate().map_err(CoreError::Validation)?;
        if candidate.user_id != self.session.owner_id() {
            return Err(CoreError::Validation(
                "candidate.user_id does not match the session owner".to_string(),
            ));
        }

        let _guard = self.begin_write("save_block")?;
        let block = match candidate.id.clone() {
            None => {
                match self
                    .session
                    .remote_call(
                        "time block insert",
                        self.session.remote().insert_block(&candidate),
                    )
                    .await
                {
                    Ok(block) => block,
                    Err(error) if error.allows_local_fallback() => {
                        warn!(%error, "block insert failed, keeping local-only record");
                        candidate.into_block(next_local_id())
                    }
                    Err(error) => return Err(error),
                }
            }
            Some(id) => {
                let patch = BlockPatch::from_candidate(&candidate);
                match self
                    .session
                    .remote_call(
                        "time block update",
                        self.session.remote().update_block(&id, self.session.owner_id(), &patch),
                    )
                    .await
                {
                    Ok(()) => {}
                    Err(error) if error.allows_local_fallback() => {
                        warn!(%error, block_id = %id, "block update failed, applying locally");
                    }
                    Err(error) => return Err(error),
                }
                candidate.into_block(id)
            }
        };

        self.apply_block_locally(block.clone());
        info!(block_id = %block.id, "block saved");

        self.refresh_after_mutation(block.start_time.date_naive())
            .await;
        Ok(block)
    }

    /// Deletes a block. Strict: a remote failure propagates and local state
    /// is left untouched, since deleting without remote confirmation risks
    /// permanent loss on a later reconcile.
    pub async fn delete_block(&self, block_id: &str) -> Result<(), CoreError> {
        let _guard = self.begin_write("delete_block")?;
        self.session
            .remote_call(
                "time block delete",
                self.session.remote().delete_block(block_id, self.session.owner_id()),
            )
            .await?;

        let refresh_day = {
            let mut state = self.state.lock().expect("day view state lock");
            let Some(view) = state.as_mut() else {
                return Ok(());
            };
            view.blocks.retain(|block| block.id != block_id);
            self.session
                .cache_write_json(&blocks_key(self.session.owner_id(), view.day), &view.blocks);
            view.day
        };
        info!(%block_id, "block deleted");

        self.refresh_after_mutation(refresh_day).await;
        Ok(())
    }

    /// Persists the in-progress draft so an interrupted session can recover
    /// it. Called on every field change while an edit dialog is open.
    pub fn save_draft(&self, draft: &Draft) {
        let key = draft_key(self.session.owner_id(), draft.start_time.date_naive());
        self.session.cache_write_json(&key, draft);
    }

    pub fn load_draft(&self, day: NaiveDate) -> Option<Draft> {
        self.session
            .cache_read_json(&draft_key(self.session.owner_id(), day))
    }

    /// Discards the cached draft on successful save or explicit cancel.
    pub fn clear_draft(&self, day: NaiveDate) {
        self.session
            .cache_remove(&draft_key(self.session.owner_id(), day));
    }

    /// Category list as the category manager sees it: the loaded view when
    /// present, the cache otherwise.
    pub(crate) fn current_categories(&self) -> Vec<Category> {
        if let Some(view) = self.state.lock().expect("day view state lock").as_ref() {
            return view.categories.clone();
        }
        self.session
            .cache_read_json(&categories_key(self.session.owner_id()))
            .unwrap_or_default()
    }

    pub(crate) fn apply_category_locally(&self, category: Category) {
        let mut categories = self.current_categories();
        match categories.iter_mut().find(|c| c.id == category.id) {
            Some(existing) => *existing = category,
            None => categories.push(category),
        }
        categories.sort_by(|a, b| a.id.cmp(&b.id));
        self.store_categories(categories);
    }

    pub(crate) fn remove_category_locally(&self, category_id: &str) {
        let mut categories = self.current_categories();
        categories.retain(|category| category.id != category_id);
        self.store_categories(categories);
    }

    fn store_categories(&self, categories: Vec<Category>) {
        self.session
            .cache_write_json(&categories_key(self.session.owner_id()), &categories);
        let mut state = self.state.lock().expect("day view state lock");
        if let Some(view) = state.as_mut() {
            view.categories = categories;
        }
    }

    fn apply_block_locally(&self, block: TimeBlock) {
        let mut state = self.state.lock().expect("day view state lock");
        match state.as_mut() {
            Some(view) => {
                match view.blocks.iter_mut().find(|b| b.id == block.id) {
                    Some(existing) => *existing = block,
                    None => view.blocks.push(block),
                }
                view.blocks
                    .sort_by(|a, b| a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id)));
                self.session
                    .cache_write_json(&blocks_key(self.session.owner_id(), view.day), &view.blocks);
            }
            None => {
                let day = block.start_time.date_naive();
                let key = blocks_key(self.session.owner_id(), day);
                let mut cached: Vec<TimeBlock> =
                    self.session.cache_read_json(&key).unwrap_or_default();
                match cached.iter_mut().find(|b| b.id == block.id) {
                    Some(existing) => *existing = block,
                    None => cached.push(block),
                }
                self.session.cache_write_json(&key, &cached);
            }
        }
    }

    /// Non-incremental refresh after every successful or fallback mutation,
    /// reconciling any server-side effects. Refresh failure is logged, never
    /// surfaced: the mutation itself already succeeded.
    async fn refresh_after_mutation(&self, fallback_day: NaiveDate) {
        let day = self
            .snapshot()
            .map(|view| view.day)
            .unwrap_or(fallback_day);
        if let Err(error) = self.load_day(day).await {
            warn!(%error, %day, "post-mutation refresh failed");
        }
    }

    async fn seed_default_categories(&self) -> Vec<Category> {
        let mut seeded = Vec::with_capacity(DEFAULT_CATEGORY_SEEDS.len());
        for (name, color) in DEFAULT_CATEGORY_SEEDS {
            let draft = CategoryDraft {
                user_id: self.session.owner_id().to_string(),
                name: name.to_string(),
                color: color.to_string(),
                kind: CategoryKind::Rest,
            };
            let category = match self
                .session
                .remote_call("category seed insert", self.session.remote().insert_category(&draft))
                .await
            {
                Ok(category) => category,
                Err(error) => {
                    warn!(%error, name, "seed insert failed, synthesizing local category");
                    Category {
                        id: next_local_id(),
                        user_id: draft.user_id,
                        name: draft.name,
                        color: draft.color,
                        kind: draft.kind,
                    }
                }
            };
            seeded.push(category);
        }
        info!(count = seeded.len(), "seeded default categories");
        seeded
    }
}

pub(crate) fn admit_categories(rows: Vec<serde_json::Value>) -> Vec<Category> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<Category>(row) {
            Ok(category) => match category.validate() {
                Ok(()) => Some(category),
                Err(reason) => {
                    warn!(reason, "dropping invalid category record");
                    None
                }
            },
            Err(error) => {
                debug!(%error, "dropping malformed category record");
                None
            }
        })
        .collect()
}

pub(crate) fn admit_blocks(rows: Vec<serde_json::Value>) -> Vec<TimeBlock> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<TimeBlock>(row) {
            Ok(block) => match block.validate() {
                Ok(()) => Some(block),
                Err(reason) => {
                    warn!(reason, "dropping invalid time block record");
                    None
                }
            },
            Err(error) => {
                debug!(%error, "dropping malformed time block record");
                None
            }
        })
        .collect()
}

fn merge_by_id<T, F>(remote: Vec<T>, cached: Vec<T>, id_of: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut merged = remote;
    for record in cached {
        // Cache wins ties: it records the last known-good local write.
        match merged.iter().position(|existing| id_of(existing) == id_of(&record)) {
            Some(index) => merged[index] = record,
            None => merged.push(record),
        }
    }
    merged
}
