//! `univote-server` runs university elections and polls: voters log in, see
//! the items their faculty may vote on, cast one ballot per item and read the
//! results once an item closes. Administrators manage items, candidates and
//! accounts through the `/api/admin` routes.
//!
//! Data lives in PostgreSQL ([`db::PgStore`]) or, for development and tests,
//! in memory ([`memory::MemoryStore`]).

mod admin;
pub mod app;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
mod items;
pub mod log;
pub mod memory;
pub mod results;
pub mod session;
pub mod state;
pub mod store;
pub mod vote;
