pub mod aws;
pub mod config;
pub mod doctor;
pub mod github;
pub mod homebrew;
pub mod orchestrator;
pub mod plan;
pub mod privilege;
pub mod probe;
pub mod prompt;
pub mod runner;
pub mod session_log;
pub mod shellrc;
pub mod step;
