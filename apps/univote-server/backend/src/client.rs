pub use univote_server_client::{Client, Error, Result};
