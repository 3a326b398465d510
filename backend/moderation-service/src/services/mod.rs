pub mod appeal_service;
pub mod content_flag_service;
pub mod pipeline;
pub mod queue_service;
pub mod report_service;

pub use appeal_service::AppealService;
pub use content_flag_service::ContentFlagService;
pub use pipeline::ModerationCore;
pub use queue_service::{calculate_priority, QueueService};
pub use report_service::ReportService;
