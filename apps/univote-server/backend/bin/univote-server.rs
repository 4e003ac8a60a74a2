//! `univote-server` is the application server for university elections and
//! polls. Voters and administrators talk to it over a JSON HTTP API.
//!
//! The server uses Postgres as its database server and SQLx to connect to it.
//! Pass `--in-memory` to run without a database.

#![warn(
    clippy::all,
    clippy::todo,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::mem_forget,
    clippy::unused_self,
    clippy::filter_map_next,
    clippy::needless_continue,
    clippy::needless_borrow,
    clippy::match_wildcard_for_single_variants,
    clippy::if_let_mutex,
    clippy::await_holding_lock,
    clippy::imprecise_flops,
    clippy::suboptimal_flops,
    clippy::lossy_float_literal,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::fn_params_excessive_bools,
    clippy::exit,
    clippy::inefficient_to_string,
    clippy::linkedlist,
    clippy::macro_use_imports,
    clippy::option_option,
    clippy::verbose_file_reads,
    clippy::unnested_or_patterns,
    clippy::str_to_string,
    rust_2018_idioms,
    future_incompatible,
    nonstandard_style,
    missing_debug_implementations,
    missing_docs
)]
#![deny(unreachable_pub)]
#![allow(elided_lifetimes_in_paths, clippy::type_complexity)]
#![forbid(unsafe_code)]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::eyre;
use univote_server::{app, config::Config, db, log, memory::MemoryStore, store::Store};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();
    let config = Config::parse();
    log::setup(&config)?;

    let store: Arc<dyn Store> = if config.in_memory {
        tracing::warn!("Using in-memory storage; all data is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| eyre!("DATABASE_URL is required without --in-memory"))?;
        Arc::new(db::PgStore::new(db::setup(database_url).await?))
    };

    let app = app::setup(
        store,
        config.default_eligibility,
        config.session_duration(),
    )
    .await;
    app::run(app, &config).await
}
