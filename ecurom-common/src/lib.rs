// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! ecurom-common
//!
//! Shared by the ECU ROM command line tools: argument parsers and the
//! definition library.

pub mod args;
pub mod library;

/// Initialises logging.  `RUST_LOG` takes precedence; otherwise warnings,
/// or debug output when `verbose` is set.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}
