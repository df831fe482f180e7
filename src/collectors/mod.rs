//! Batch jobs: each fetches its source, extracts the figures and updates a
//! history file

pub mod investor_type;
pub mod participants;
pub mod sectors;
pub mod shutai;
