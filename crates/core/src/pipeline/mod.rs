pub mod config;
pub mod infrastructure;
pub mod pipeline_logger;
pub mod recognition_pipeline;
pub mod stages;
