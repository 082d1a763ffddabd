//! CSV export feature slice: initiate, status, download, cancel.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::exports_routes;
