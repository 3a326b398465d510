pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::Config;
pub use db::{MemoryStore, ModerationStore, PgStore};
pub use error::{ModerationError, Result};
pub use events::{DomainEvent, EventDispatcher, EventPayload, EventType, NoopDispatcher, TracingDispatcher};
pub use metrics::ModerationMetrics;
pub use services::{
    calculate_priority, AppealService, ContentFlagService, ModerationCore, QueueService, ReportService,
};
