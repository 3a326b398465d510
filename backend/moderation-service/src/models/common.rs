//! Value types shared by every moderation aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::decode::Decode;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgArgumentBuffer, PgTypeInfo, PgValueRef, Postgres};
use std::fmt;

use crate::error::{ModerationError, Result};

/// Review urgency band, always within 1 (low) ..= 4 (critical).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(try_from = "i16", into = "i16")]
#[sqlx(transparent)]
pub struct Priority(i16);

impl Priority {
    pub const LOW: Priority = Priority(1);
    pub const MEDIUM: Priority = Priority(2);
    pub const HIGH: Priority = Priority(3);
    pub const CRITICAL: Priority = Priority(4);

    pub fn new(value: i16) -> Result<Self> {
        if (Self::LOW.0..=Self::CRITICAL.0).contains(&value) {
            Ok(Priority(value))
        } else {
            Err(ModerationError::Validation(format!(
                "priority must be between 1 and 4, got {}",
                value
            )))
        }
    }

    /// Saturating constructor for computed priorities.
    pub fn clamped(value: i64) -> Self {
        Priority(value.clamp(Self::LOW.0 as i64, Self::CRITICAL.0 as i64) as i16)
    }

    pub fn value(self) -> i16 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::LOW
    }
}

impl TryFrom<i16> for Priority {
    type Error = ModerationError;

    fn try_from(value: i16) -> Result<Self> {
        Priority::new(value)
    }
}

impl From<Priority> for i16 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of content a flag, report or queue item points at.
///
/// Unknown kinds are carried verbatim in `Other` so audit rows keep the
/// caller's label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    Post,
    Comment,
    UserProfile,
    Media,
    Message,
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Post => "POST",
            ContentType::Comment => "COMMENT",
            ContentType::UserProfile => "USER_PROFILE",
            ContentType::Media => "MEDIA",
            ContentType::Message => "MESSAGE",
            ContentType::Other(label) => label.as_str(),
        }
    }

    /// Queue priority before flag escalation.
    pub fn base_priority(&self) -> Priority {
        match self {
            ContentType::UserProfile => Priority::HIGH,
            ContentType::Post | ContentType::Media => Priority::MEDIUM,
            ContentType::Comment | ContentType::Message | ContentType::Other(_) => Priority::LOW,
        }
    }
}

impl From<&str> for ContentType {
    fn from(value: &str) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "POST" => ContentType::Post,
            "COMMENT" => ContentType::Comment,
            "USER_PROFILE" => ContentType::UserProfile,
            "MEDIA" => ContentType::Media,
            "MESSAGE" => ContentType::Message,
            _ => ContentType::Other(value.to_string()),
        }
    }
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        ContentType::from(value.as_str())
    }
}

impl From<ContentType> for String {
    fn from(value: ContentType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Stored as TEXT so unknown kinds survive a round trip through Postgres.
impl sqlx::Type<Postgres> for ContentType {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Postgres> for ContentType {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

impl<'r> Decode<'r, Postgres> for ContentType {
    fn decode(value: PgValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let label = <&str as Decode<Postgres>>::decode(value)?;
        Ok(ContentType::from(label))
    }
}

/// Offset pagination (skip/take).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub skip: i64,
    pub take: i64,
}

impl Pagination {
    pub const DEFAULT_TAKE: i64 = 20;
    pub const MAX_TAKE: i64 = 100;

    pub fn new(skip: i64, take: i64) -> Self {
        Self {
            skip: skip.max(0),
            take: take.clamp(1, Self::MAX_TAKE),
        }
    }

    pub fn first(take: i64) -> Self {
        Self::new(0, take)
    }

    /// Applies the window to an already ordered iterator.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.skip.max(0) as usize)
            .take(self.take.max(0) as usize)
            .collect()
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_TAKE)
    }
}

/// Half-open `[from, to)` window over creation timestamps; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at < to)
    }
}
