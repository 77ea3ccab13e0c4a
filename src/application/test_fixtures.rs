use crate::domain::models::{
    BlockCandidate, BlockPatch, Category, CategoryDraft, CategoryPatch, TimeBlock,
};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::remote_store::{BlockQuery, RemoteStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Functional in-memory remote store for application tests. Rows are kept as
/// raw JSON so malformed records can be seeded to exercise admission
/// filtering. Failure toggles simulate an unreachable or misbehaving remote.
#[derive(Debug, Default)]
pub(crate) struct FakeRemoteStore {
    categories: Mutex<Vec<serde_json::Value>>,
    blocks: Mutex<Vec<serde_json::Value>>,
    next_id: AtomicU64,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub insert_returns_no_id: AtomicBool,
    pub list_block_calls: AtomicUsize,
    pub insert_category_calls: AtomicUsize,
}

impl FakeRemoteStore {
    fn server_id(&self, prefix: &str) -> String {
        format!("srv-{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn read_gate(&self, context: &str) -> Result<(), CoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CoreError::RemoteUnavailable(format!(
                "simulated network error while {context}"
            )));
        }
        Ok(())
    }

    fn write_gate(&self, context: &str) -> Result<(), CoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CoreError::RemoteUnavailable(format!(
                "simulated network error while {context}"
            )));
        }
        Ok(())
    }

    pub fn seed_category(&self, category: &Category) {
        self.seed_raw_category(serde_json::to_value(category).expect("serialize category"));
    }

    pub fn seed_raw_category(&self, row: serde_json::Value) {
        self.categories.lock().expect("categories lock").push(row);
    }

    pub fn seed_block(&self, block: &TimeBlock) {
        self.seed_raw_block(serde_json::to_value(block).expect("serialize block"));
    }

    pub fn seed_raw_block(&self, row: serde_json::Value) {
        self.blocks.lock().expect("blocks lock").push(row);
    }

    pub fn categories_snapshot(&self) -> Vec<Category> {
        self.categories
            .lock()
            .expect("categories lock")
            .iter()
            .filter_map(|row| serde_json::from_value(row.clone()).ok())
            .collect()
    }

    pub fn blocks_snapshot(&self) -> Vec<TimeBlock> {
        self.blocks
            .lock()
            .expect("blocks lock")
            .iter()
            .filter_map(|row| serde_json::from_value(row.clone()).ok())
            .collect()
    }

    fn row_matches_owner(row: &serde_json::Value, owner_id: &str) -> bool {
        row.get("user_id").and_then(serde_json::Value::as_str) == Some(owner_id)
    }
}

#[async_trait]
impl RemoteStore for FakeRemoteStore {
    async fn list_categories(&self, owner_id: &str) -> Result<Vec<serde_json::Value>, CoreError> {
        self.read_gate("listing categories")?;
        let categories = self.categories.lock().expect("categories lock");
        Ok(categories
            .iter()
            .filter(|row| Self::row_matches_owner(row, owner_id))
            .cloned()
            .collect())
    }

    async fn insert_category(&self, draft: &CategoryDraft) -> Result<Category, CoreError> {
        self.insert_category_calls.fetch_add(1, Ordering::SeqCst);
        self.write_gate("inserting category")?;
        if self.insert_returns_no_id.load(Ordering::SeqCst) {
            return Err(CoreError::ReconciliationConflict(
                "category insert returned a record without an id".to_string(),
            ));
        }
        let category = Category {
            id: self.server_id("cat"),
            user_id: draft.user_id.clone(),
            name: draft.name.clone(),
            color: draft.color.clone(),
            kind: draft.kind,
        };
        self.seed_category(&category);
        Ok(category)
    }

    async fn update_category(
        &self,
        id: &str,
        owner_id: &str,
        patch: &CategoryPatch,
    ) -> Result<(), CoreError> {
        self.write_gate("updating category")?;
        let mut categories = self.categories.lock().expect("categories lock");
        for row in categories.iter_mut() {
            if row.get("id").and_then(serde_json::Value::as_str) == Some(id)
                && Self::row_matches_owner(row, owner_id)
            {
                let mut category: Category =
                    serde_json::from_value(row.clone()).expect("stored category is well-formed");
                patch.apply(&mut category);
                *row = serde_json::to_value(&category).expect("serialize category");
            }
        }
        Ok(())
    }

    async fn delete_category(&self, id: &str, owner_id: &str) -> Result<(), CoreError> {
        self.write_gate("deleting category")?;
        let mut categories = self.categories.lock().expect("categories lock");
        categories.retain(|row| {
            row.get("id").and_then(serde_json::Value::as_str) != Some(id)
                || !Self::row_matches_owner(row, owner_id)
        });
        Ok(())
    }

    async fn list_blocks(&self, query: &BlockQuery) -> Result<Vec<serde_json::Value>, CoreError> {
        self.list_block_calls.fetch_add(1, Ordering::SeqCst);
        self.read_gate("listing time blocks")?;
        let blocks = self.blocks.lock().expect("blocks lock");
        Ok(blocks
            .iter()
            .filter(|row| Self::row_matches_owner(row, &query.owner_id))
            .filter(|row| {
                if let Some(category_id) = query.category_id.as_deref() {
                    if row.get("category_id").and_then(serde_json::Value::as_str)
                        != Some(category_id)
                    {
                        return false;
                    }
                }
                // Rows whose timestamps do not parse are returned anyway so
                // admission filtering sees them.
                let Ok(block) = serde_json::from_value::<TimeBlock>((*row).clone()) else {
                    return true;
                };
                if let Some(ends_after) = query.ends_after {
                    if block.end_time < ends_after {
                        return false;
                    }
                }
                if let Some(starts_before) = query.starts_before {
                    if block.start_time > starts_before {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect())
    }

    async fn insert_block(&self, candidate: &BlockCandidate) -> Result<TimeBlock, CoreError> {
        self.write_gate("inserting time block")?;
        if self.insert_returns_no_id.load(Ordering::SeqCst) {
            return Err(CoreError::ReconciliationConflict(
                "time block insert returned a record without an id".to_string(),
            ));
        }
        let block = candidate.clone().into_block(self.server_id("blk"));
        self.seed_block(&block);
        Ok(block)
    }

    async fn update_block(
        &self,
        id: &str,
        owner_id: &str,
        patch: &BlockPatch,
    ) -> Result<(), CoreError> {
        self.write_gate("updating time block")?;
        let mut blocks = self.blocks.lock().expect("blocks lock");
        for row in blocks.iter_mut() {
            if row.get("id").and_then(serde_json::Value::as_str) == Some(id)
                && Self::row_matches_owner(row, owner_id)
            {
                let mut block: TimeBlock =
                    serde_json::from_value(row.clone()).expect("stored block is well-formed");
                patch.apply(&mut block);
                *row = serde_json::to_value(&block).expect("serialize block");
            }
        }
        Ok(())
    }

    async fn delete_block(&self, id: &str, owner_id: &str) -> Result<(), CoreError> {
        self.write_gate("deleting time block")?;
        let mut blocks = self.blocks.lock().expect("blocks lock");
        blocks.retain(|row| {
            row.get("id").and_then(serde_json::Value::as_str) != Some(id)
                || !Self::row_matches_owner(row, owner_id)
        });
        Ok(())
    }
}
