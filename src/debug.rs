/*
 * debug.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of callback-ws, a WebSocket callback client.
 *
 * callback-ws is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * callback-ws is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with callback-ws.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Logging setup with two levels of verbosity:
//!
//!  - default: only `warn` and above. Rejected registrations and transport
//!    failures.
//!  - `CALLBACK_WS_DEBUG=1` (or `true`): `trace` for this crate. Handshake
//!    progress, frame dispatch, connection lifecycle.
//!
//! `RUST_LOG` always wins when set.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "CALLBACK_WS_DEBUG";

/// Returns true if verbose debug logging is enabled (`CALLBACK_WS_DEBUG=1` or `true`).
pub fn is_debug() -> bool {
    static DEBUG: OnceLock<bool> = OnceLock::new();
    *DEBUG.get_or_init(|| std::env::var(DEBUG_ENV).map(|v| flag_enabled(&v)).unwrap_or(false))
}

fn flag_enabled(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn default_directive(debug: bool) -> &'static str {
    if debug {
        "warn,callback_ws=trace"
    } else {
        "warn"
    }
}

/// Install the global `fmt` subscriber. Safe to call more than once.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(is_debug())));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_values() {
        assert!(flag_enabled("1"));
        assert!(flag_enabled("TRUE"));
        assert!(flag_enabled("true"));
        assert!(!flag_enabled("0"));
        assert!(!flag_enabled("yes"));
    }

    #[test]
    fn directive_follows_flag() {
        assert_eq!(default_directive(false), "warn");
        assert!(default_directive(true).contains("callback_ws=trace"));
    }
}
