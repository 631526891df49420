//! SeaORM entity definitions for PostgreSQL database.

pub mod job;
pub mod project;
pub mod user;
