pub mod actions;
pub mod arbiter;
pub mod context;
pub mod engine;
pub mod event_bus;
pub mod pause;
pub mod recovery;
pub mod reverify;
pub mod state;
pub mod stats;
pub mod tasks;
