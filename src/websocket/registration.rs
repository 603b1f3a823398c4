/*
 * registration.rs
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

//! Write-once registration outcome shared between the connection task and
//! whoever is waiting for the client to be registered.

use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{Result, WebSocketError};

type Outcome = Option<Result<String>>;

/// Single-resolution completion sink. Clones share the same slot.
///
/// The first `resolve_*` call wins; later calls return `false` and change nothing.
#[derive(Clone, Debug)]
pub struct Registration {
    slot: Arc<watch::Sender<Outcome>>,
}

impl Default for Registration {
    fn default() -> Self {
        Self::new()
    }
}

impl Registration {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Registration { slot: Arc::new(slot) }
    }

    /// Resolve with the registered client id. Returns true if this call resolved it.
    pub fn resolve_success(&self, client_id: impl Into<String>) -> bool {
        self.resolve(Ok(client_id.into()))
    }

    /// Resolve with a failure. Returns true if this call resolved it.
    pub fn resolve_failure(&self, error: WebSocketError) -> bool {
        self.resolve(Err(error))
    }

    fn resolve(&self, outcome: Result<String>) -> bool {
        self.slot.send_if_modified(move |slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(outcome);
            true
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Snapshot of the outcome, None while unresolved.
    pub fn result(&self) -> Option<Result<String>> {
        self.slot.borrow().clone()
    }

    /// Wait until resolved and return the outcome.
    pub async fn wait(&self) -> Result<String> {
        let mut rx = self.slot.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| WebSocketError::ConnectionClosed)?;
        match &*outcome {
            Some(result) => result.clone(),
            None => Err(WebSocketError::ConnectionClosed),
        }
    }
}
