//! taskview - per-member task views over a multi-tenant task store
//!
//! The view engine turns a company's tasks into what one member sees:
//! their stats, a filtered and sorted task list, and the projects they
//! can filter by.

pub mod api;
pub mod clock;
pub mod config;
pub mod db;
pub mod engine;
pub mod models;
