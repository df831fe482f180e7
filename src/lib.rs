pub mod api;
pub mod chart;
pub mod collectors;
pub mod extract;
pub mod history;
pub mod models;
pub mod utils;
