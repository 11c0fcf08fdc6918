// /////////////////////////////////////////////////////////////////////////////
// GeoFlow RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Bootstrap Logger
//!
//! Installs the `tracing` subscriber for the whole process. Stages and the
//! driver log through the `tracing` macros with their stage id; this module
//! only decides the filter and the output format.

use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the default log filter.
pub const LOG_ENV_VAR: &str = "GEOFLOW_LOG";

/// Installs the global tracing subscriber.
///
/// The filter is taken from `level` when given, otherwise from the
/// `GEOFLOW_LOG` environment variable, otherwise `info`. Calling this a
/// second time in one process is a no-op (the first subscriber wins),
/// which keeps test binaries well-behaved.
pub fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
