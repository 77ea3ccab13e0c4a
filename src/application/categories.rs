use crate::application::day_view::{admit_blocks, admit_categories, DayViewService};
use crate::domain::models::{
    is_local_only, next_local_id, normalize_color, BlockPatch, Category, CategoryDraft,
    CategoryKind, CategoryPatch,
};
use crate::infrastructure::error::CoreError;
use crate::infrastructure::local_cache::LocalCache;
use crate::infrastructure::remote_store::{BlockQuery, RemoteStore};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) const FALLBACK_CATEGORY_NAME: &str = "uncategorized";
pub(crate) const FALLBACK_CATEGORY_COLOR: &str = "#94a3b8";

/// Category lifecycle on top of the day view engine. Creation and updates are
/// optimistic; deletion is strict because it cascades into block reassignment.
pub struct CategoryService<R, C>
where
    R: RemoteStore,
    C: LocalCache,
{
    engine: Arc<DayViewService<R, C>>,
}

impl<R, C> CategoryService<R, C>
where
    R: RemoteStore,
    C: LocalCache,
{
    pub fn new(engine: Arc<DayViewService<R, C>>) -> Self {
        Self { engine }
    }

    pub fn categories(&self) -> Vec<Category> {
        self.engine.current_categories()
    }

    /// Creates a category and returns the stored record so a caller can
    /// select it for an open draft. Remote-first; an unreachable remote
    /// yields a local-only record instead of a failed save.
    pub async fn create_category(
        &self,
        name: &str,
        color: &str,
        kind: CategoryKind,
    ) -> Result<Category, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::Validation(
                "category name must not be blank".to_string(),
            ));
        }
        let color = normalize_color(color).ok_or_else(|| {
            CoreError::Validation(format!("unrecognized color value: {color}"))
        })?;

        let _guard = self.engine.begin_write("create_category")?;
        let session = self.engine.session();
        let draft = CategoryDraft {
            user_id: session.owner_id().to_string(),
            name: name.to_string(),
            color,
            kind,
        };
        draft.validate().map_err(CoreError::Validation)?;

        let category = match session
            .remote_call("category insert", session.remote().insert_category(&draft))
            .await
        {
            Ok(category) => category,
            Err(error) if error.allows_local_fallback() => {
                warn!(%error, name, "category insert failed, keeping local-only record");
                Category {
                    id: next_local_id(),
                    user_id: draft.user_id,
                    name: draft.name,
                    color: draft.color,
                    kind: draft.kind,
                }
            }
            Err(error) => return Err(error),
        };

        self.engine.apply_category_locally(category.clone());
        info!(category_id = %category.id, "category created");
        self.refresh_view().await;
        Ok(category)
    }

    /// Applies a partial update. The local view is patched even when the
    /// remote write fails; the cache shadow carries the edit until a later
    /// sync reconciles it.
    pub async fn update_category(
        &self,
        category_id: &str,
        patch: &CategoryPatch,
    ) -> Result<Category, CoreError> {
        patch.validate().map_err(CoreError::Validation)?;
        let mut category = self
            .categories()
            .into_iter()
            .find(|category| category.id == category_id)
            .ok_or_else(|| {
                CoreError::Validation(format!("unknown category: {category_id}"))
            })?;

        let _guard = self.engine.begin_write("update_category")?;
        let session = self.engine.session();
        if !is_local_only(category_id) {
            match session
                .remote_call(
                    "category update",
                    session
                        .remote()
                        .update_category(category_id, session.owner_id(), patch),
                )
                .await
            {
                Ok(()) => {}
                Err(error) if error.allows_local_fallback() => {
                    warn!(%error, %category_id, "category update failed, applying locally");
                }
                Err(error) => return Err(error),
            }
        }

        patch.apply(&mut category);
        self.engine.apply_category_locally(category.clone());
        info!(%category_id, "category updated");
        self.refresh_view().await;
        Ok(category)
    }

    /// Deletes a category. Blocks still referencing it are first reassigned
    /// to the owner's fallback category; every remote step must succeed, and
    /// a final re-query confirms nothing references the deleted id.
    pub async fn delete_category(&self, category_id: &str) -> Result<(), CoreError> {
        if is_local_only(category_id) {
            // Never reached the remote store; nothing to reassign.
            self.engine.remove_category_locally(category_id);
            info!(%category_id, "local-only category removed");
            self.refresh_view().await;
            return Ok(());
        }

        let _guard = self.engine.begin_write("delete_category")?;
        let session = self.engine.session();
        let owner = session.owner_id();

        let referencing = admit_blocks(
            session
                .remote_call(
                    "referencing block list",
                    session
                        .remote()
                        .list_blocks(&BlockQuery::for_owner(owner).with_category(category_id)),
                )
                .await?,
        );

        if !referencing.is_empty() {
            let fallback = self.get_or_create_fallback_category().await?;
            info!(
                %category_id,
                fallback_id = %fallback.id,
                count = referencing.len(),
                "reassigning blocks before category delete"
            );
            for block in &referencing {
                let mut patch = BlockPatch::from_block(block);
                patch.category_id = fallback.id.clone();
                session
                    .remote_call(
                        "block reassign",
                        session.remote().update_block(&block.id, owner, &patch),
                    )
                    .await?;
            }
        }

        session
            .remote_call(
                "category delete",
                session.remote().delete_category(category_id, owner),
            )
            .await?;

        self.verify_category_gone(category_id).await?;

        self.engine.remove_category_locally(category_id);
        info!(%category_id, "category deleted");
        self.refresh_view().await;
        Ok(())
    }

    /// Re-queries the remote store after a delete: the category must be gone
    /// and no block may still reference it. A stale reference here means the
    /// reassignment raced another writer.
    async fn verify_category_gone(&self, category_id: &str) -> Result<(), CoreError> {
        let session = self.engine.session();
        let owner = session.owner_id();

        let still_listed = session
            .remote_call(
                "category delete verify",
                session.remote().list_categories(owner),
            )
            .await?
            .iter()
            .any(|row| row.get("id").and_then(|id| id.as_str()) == Some(category_id));
        if still_listed {
            return Err(CoreError::ReconciliationConflict(format!(
                "category {category_id} still listed after delete"
            )));
        }

        let still_referenced = session
            .remote_call(
                "block reassign verify",
                session
                    .remote()
                    .list_blocks(&BlockQuery::for_owner(owner).with_category(category_id)),
            )
            .await?;
        if !still_referenced.is_empty() {
            return Err(CoreError::ReconciliationConflict(format!(
                "{} blocks still reference deleted category {category_id}",
                still_referenced.len()
            )));
        }
        Ok(())
    }

    /// The owner's single "uncategorized" category, created remotely on first
    /// use. Matches by exact name so repeated deletes reuse one record.
    async fn get_or_create_fallback_category(&self) -> Result<Category, CoreError> {
        if let Some(existing) = self
            .categories()
            .into_iter()
            .find(|category| category.name == FALLBACK_CATEGORY_NAME)
        {
            return Ok(existing);
        }

        let session = self.engine.session();
        let remote = admit_categories(
            session
                .remote_call(
                    "fallback category lookup",
                    session.remote().list_categories(session.owner_id()),
                )
                .await?,
        );
        if let Some(existing) = remote
            .into_iter()
            .find(|category| category.name == FALLBACK_CATEGORY_NAME)
        {
            return Ok(existing);
        }

        let draft = CategoryDraft {
            user_id: session.owner_id().to_string(),
            name: FALLBACK_CATEGORY_NAME.to_string(),
            color: FALLBACK_CATEGORY_COLOR.to_string(),
            kind: CategoryKind::Other,
        };
        let created = session
            .remote_call(
                "fallback category insert",
                session.remote().insert_category(&draft),
            )
            .await?;
        self.engine.apply_category_locally(created.clone());
        Ok(created)
    }

    async fn refresh_view(&self) {
        if let Some(view) = self.engine.snapshot() {
            if let Err(error) = self.engine.load_day(view.day).await {
                warn!(%error, "post-mutation refresh failed");
            }
        }
    }
}
