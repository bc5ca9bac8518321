// Domain layer - Pure dashboard types and generation rules
pub mod dashboard;
pub mod device;
pub mod error;
pub mod mapping;
pub mod placeholder;
pub mod report;
pub mod template;
