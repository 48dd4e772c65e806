pub mod model;
pub mod history;

// History compaction and drill-down
pub mod compact;
pub mod focus;

// Execution list: filters, rows, pagination
pub mod query;
pub mod sync;

pub mod confirm;

// Event loop state
pub mod app;

pub mod backend;
pub mod config;
pub mod format;
