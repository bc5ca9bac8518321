// Application layer - Generation use cases and external seams
pub mod dashboard_uploader;
pub mod discovery;
pub mod generation_service;
pub mod instantiator;
pub mod publish_service;
pub mod topic_source;
pub mod validator;
