//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//


//! Linerelay server binary
//!
//! Accepts TCP clients, relays every chunk they send through a single
//! queue and prints each message on stdout.

mod prompt;

use clap::Parser;
use linerelay_service::{
    DEFAULT_BACKLOG, DEFAULT_QUEUE_CAPACITY, DEFAULT_READ_CHUNK_SIZE, RelayServer, ServerConfig,
    StdoutHandler,
};
use prompt::ConsolePrompt;
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "linerelay")]
#[command(about = "Multi-client TCP message relay")]
struct Cli {
    /// Port to listen on
    #[arg(short, long)]
    port: u16,

    /// IPv4 address to bind
    #[arg(long, default_value_t = Ipv4Addr::UNSPECIFIED)]
    bind: Ipv4Addr,

    /// Pending connection backlog
    #[arg(long, default_value_t = DEFAULT_BACKLOG)]
    backlog: u32,

    /// Largest chunk read from a client at once
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK_SIZE)]
    chunk_size: usize,

    /// Messages buffered between clients and the printer
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.port)
            .with_bind_ip(self.bind)
            .with_backlog(self.backlog)
            .with_read_chunk_size(self.chunk_size)
            .with_queue_capacity(self.queue_capacity)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let server = RelayServer::tcp(cli.server_config(), Arc::new(StdoutHandler));
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.shutdown();
        }
    });

    match server.run(ConsolePrompt::stdio()).await {
        Ok(report) => {
            tracing::info!("{}", report);
            match report.last_error {
                Some(_) => ExitCode::FAILURE,
                None => ExitCode::SUCCESS,
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "Server failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["linerelay", "--port", "4000"]).unwrap();
        let config = cli.server_config();
        assert_eq!(config.port, 4000);
        assert_eq!(config.bind_ip, Ipv4Addr::UNSPECIFIED);
        assert_eq!(config.backlog, DEFAULT_BACKLOG);
        assert_eq!(config.read_chunk_size, DEFAULT_READ_CHUNK_SIZE);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "linerelay", "-p", "5000", "--bind", "127.0.0.1", "--backlog", "4", "--chunk-size",
            "16", "--queue-capacity", "8", "-v",
        ])
        .unwrap();
        let config = cli.server_config();
        assert_eq!(config.bind_address().to_string(), "127.0.0.1:5000");
        assert_eq!(config.backlog, 4);
        assert_eq!(config.read_chunk_size, 16);
        assert_eq!(config.queue_capacity, 8);
        assert!(cli.verbose);
    }

    #[test]
    fn test_cli_requires_port() {
        assert!(Cli::try_parse_from(["linerelay"]).is_err());
    }
}
