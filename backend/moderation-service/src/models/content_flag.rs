use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

use super::common::ContentType;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "flag_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagType {
    Spam,
    HateSpeech,
    Violence,
    Nudity,
    Harassment,
    Misinformation,
    Copyright,
    Other,
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagType::Spam => "SPAM",
            FlagType::HateSpeech => "HATE_SPEECH",
            FlagType::Violence => "VIOLENCE",
            FlagType::Nudity => "NUDITY",
            FlagType::Harassment => "HARASSMENT",
            FlagType::Misinformation => "MISINFORMATION",
            FlagType::Copyright => "COPYRIGHT",
            FlagType::Other => "OTHER",
        }
    }
}

/// Confidence-scored signal attached to a content item. Resolved flags are history.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContentFlag {
    pub id: Uuid,
    pub content_id: String,
    pub content_type: ContentType,
    pub flag_type: FlagType,
    pub confidence: f64,
    pub is_resolved: bool,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ContentFlag {
    pub fn new(input: NewContentFlag) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_id: input.content_id,
            content_type: input.content_type,
            flag_type: input.flag_type,
            confidence: input.confidence,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    /// Returns false when the flag was already resolved; the first resolution is kept.
    pub fn resolve(&mut self, resolver_id: Uuid, now: DateTime<Utc>) -> bool {
        if self.is_resolved {
            return false;
        }
        self.is_resolved = true;
        self.resolved_by = Some(resolver_id);
        self.resolved_at = Some(now);
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewContentFlag {
    #[validate(length(min = 1, max = 255))]
    pub content_id: String,
    pub content_type: ContentType,
    pub flag_type: FlagType,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagFilter {
    pub content_id: Option<String>,
    pub content_type: Option<ContentType>,
    pub flag_type: Option<FlagType>,
    pub is_resolved: Option<bool>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
}

impl FlagFilter {
    pub fn matches(&self, flag: &ContentFlag) -> bool {
        self.content_id.as_ref().map_or(true, |id| &flag.content_id == id)
            && self
                .content_type
                .as_ref()
                .map_or(true, |t| &flag.content_type == t)
            && self.flag_type.map_or(true, |t| flag.flag_type == t)
            && self.is_resolved.map_or(true, |r| flag.is_resolved == r)
            && self.min_confidence.map_or(true, |min| flag.confidence >= min)
            && self.max_confidence.map_or(true, |max| flag.confidence <= max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagStats {
    pub total: i64,
    pub unresolved: i64,
    pub by_type: BTreeMap<FlagType, i64>,
    pub average_confidence: Option<f64>,
}

/// Whether an automated signal is strong enough to become a flag.
pub fn should_flag_content(confidence: f64, threshold: f64) -> bool {
    confidence >= threshold
}
