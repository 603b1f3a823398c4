/*
 * main.rs
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

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;

use callback_ws::config::{self, ClientConfig};
use callback_ws::{debug, WebSocketClient};

/// Register with a callback endpoint and print every text frame it sends.
#[derive(Debug, Parser)]
#[command(name = "callback-ws", version)]
struct Args {
    /// JSON config file; command line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    context_path: Option<String>,

    /// Connect with wss://.
    #[arg(long)]
    secure: bool,

    #[arg(long)]
    client_id: Option<String>,
}

impl Args {
    fn into_config(self) -> std::io::Result<ClientConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_config(path)?,
            None => ClientConfig::default(),
        };
        if let Some(host) = self.host {
            cfg.host = host;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(context_path) = self.context_path {
            cfg.context_path = context_path;
        }
        if self.secure {
            cfg.secure = true;
        }
        if let Some(client_id) = self.client_id {
            cfg.client_id = client_id;
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    debug::init_logging();
    let cfg = match Args::parse().into_config() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = match WebSocketClient::connect(&cfg, Box::new(tx)).await {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    match handle.registered().await {
        Ok(client_id) => tracing::info!("registered as {}", client_id),
        Err(e) => {
            tracing::error!("registration failed: {}", e);
            handle.join().await;
            return ExitCode::FAILURE;
        }
    }

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(text) => println!("{}", text),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.close();
                break;
            }
        }
    }
    handle.join().await;
    ExitCode::SUCCESS
}
