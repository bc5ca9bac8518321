// Presentation layer - Command line surface and operator summary
pub mod cli;
pub mod summary;
