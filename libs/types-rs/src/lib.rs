//! Shared types for the university voting system, used by the server and its
//! clients.

pub mod univote;
