use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::db::ModerationStore;
use crate::error::{ModerationError, Result};
use crate::models::*;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Registry of confidence-scored content signals
pub struct ContentFlagService {
    store: Arc<dyn ModerationStore>,
    threshold: f64,
}

impl ContentFlagService {
    pub fn new(store: Arc<dyn ModerationStore>) -> Self {
        Self {
            store,
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    /// Default cut-off used when callers pass no explicit threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub async fn create_content_flag(&self, input: NewContentFlag) -> Result<ContentFlag> {
        input.validate()?;
        // Range validation lets NaN through.
        if !input.confidence.is_finite() {
            return Err(ModerationError::Validation(format!(
                "confidence must be a number within [0, 1], got {}",
                input.confidence
            )));
        }

        let flag = self.store.insert_flag(ContentFlag::new(input)).await?;
        info!(
            flag_id = %flag.id,
            content_id = %flag.content_id,
            flag_type = flag.flag_type.as_str(),
            confidence = flag.confidence,
            "Content flag created"
        );
        Ok(flag)
    }

    pub async fn get_content_flag(&self, id: Uuid) -> Result<ContentFlag> {
        self.store
            .get_flag(id)
            .await?
            .ok_or_else(|| ModerationError::not_found("ContentFlag", id))
    }

    pub async fn get_content_flags(&self, filter: &FlagFilter, page: Pagination) -> Result<Vec<ContentFlag>> {
        self.store.list_flags(filter, page).await
    }

    /// Every flag recorded for one content id, newest first.
    pub async fn get_flags_for_content(&self, content_id: &str) -> Result<Vec<ContentFlag>> {
        let filter = FlagFilter {
            content_id: Some(content_id.to_string()),
            ..Default::default()
        };

        let mut flags = Vec::new();
        let mut page = Pagination::new(0, Pagination::MAX_TAKE);
        loop {
            let batch = self.store.list_flags(&filter, page).await?;
            let done = (batch.len() as i64) < page.take;
            flags.extend(batch);
            if done {
                return Ok(flags);
            }
            page = Pagination::new(page.skip + page.take, page.take);
        }
    }

    /// Idempotent: resolving an already resolved flag keeps the first resolution.
    pub async fn resolve_content_flag(&self, id: Uuid, resolver_id: Uuid) -> Result<ContentFlag> {
        let flag = self
            .store
            .resolve_flags(&[id], resolver_id, Utc::now())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModerationError::not_found("ContentFlag", id))?;

        info!(flag_id = %id, resolver_id = %resolver_id, "Content flag resolved");
        Ok(flag)
    }

    /// Resolves every existing flag among `ids`; unknown ids are skipped.
    pub async fn bulk_resolve_flags(&self, ids: &[Uuid], resolver_id: Uuid) -> Result<Vec<ContentFlag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let flags = self.store.resolve_flags(ids, resolver_id, Utc::now()).await?;
        info!(
            requested = ids.len(),
            resolved = flags.len(),
            resolver_id = %resolver_id,
            "Content flags bulk resolved"
        );
        Ok(flags)
    }

    /// `confidence >= threshold`, falling back to the configured threshold.
    pub fn should_flag_content(&self, confidence: f64, threshold: Option<f64>) -> bool {
        should_flag_content(confidence, threshold.unwrap_or(self.threshold))
    }

    /// Unresolved flags at or above the threshold, most confident first.
    pub async fn get_high_confidence_flags(&self, threshold: Option<f64>, limit: i64) -> Result<Vec<ContentFlag>> {
        let threshold = threshold.unwrap_or(self.threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ModerationError::Validation(format!(
                "threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if limit <= 0 {
            return Ok(Vec::new());
        }

        self.store
            .high_confidence_flags(threshold, limit.min(Pagination::MAX_TAKE))
            .await
    }

    pub async fn delete_content_flag(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_flag(id).await? {
            return Err(ModerationError::not_found("ContentFlag", id));
        }
        info!(flag_id = %id, "Content flag deleted");
        Ok(())
    }

    pub async fn get_flag_stats(&self, range: DateRange) -> Result<FlagStats> {
        self.store.flag_stats(range).await
    }
}
