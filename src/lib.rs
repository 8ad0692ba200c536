pub mod channel;
pub mod config;
pub mod engine;
pub mod recorder;
pub mod scenario;
pub mod store;
