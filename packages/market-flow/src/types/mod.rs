pub mod config;
pub mod record;
pub mod state;
pub mod summary;
