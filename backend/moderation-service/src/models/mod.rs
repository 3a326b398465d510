pub mod action_log;
pub mod appeal;
pub mod common;
pub mod content_flag;
pub mod queue;
pub mod report;

pub use action_log::*;
pub use appeal::*;
pub use common::*;
pub use content_flag::*;
pub use queue::*;
pub use report::*;
