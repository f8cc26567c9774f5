//! Piazza reader library.
//!
//! Fetches course feeds from a Piazza-style forum, caches them per course,
//! searches them semantically or by keyword, and flattens discussion threads
//! into scrollable text for a terminal front end.

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod courses;
pub mod embedding;
pub mod fetcher;
pub mod forum;
pub mod search;
pub mod text;
pub mod thread;
