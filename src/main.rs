//! emberkv server binary.
//!
//! Parses command-line options, sets up logging, and hands control to
//! the event loop. The loop only returns if the readiness primitive
//! itself fails, which is fatal.

use anyhow::Context;
use emberkv::commands::CommandDispatcher;
use emberkv::server::EventLoop;
use emberkv::storage::Store;
use std::net::{SocketAddr, ToSocketAddrs};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: emberkv::DEFAULT_HOST.to_string(),
            port: emberkv::DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    if i + 1 < args.len() {
                        config.host = args[i + 1].clone();
                        i += 2;
                    } else {
                        eprintln!("Error: --host requires a value");
                        std::process::exit(1);
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        config.port = args[i + 1].parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                        i += 2;
                    } else {
                        eprintln!("Error: --port requires a value");
                        std::process::exit(1);
                    }
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("emberkv version {}", emberkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn print_help() {
    println!(
        r#"
emberkv - A Single-Threaded, Event-Driven Key-Value Server

USAGE:
    emberkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>    Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>    Port to listen on (default: 1234)
    -v, --version        Print version information
        --help           Print this help message

EXAMPLES:
    emberkv                        # Start on 127.0.0.1:1234
    emberkv --port 4000            # Start on port 4000
    emberkv --host 0.0.0.0         # Listen on all interfaces

The server speaks a length-prefixed binary protocol; see the crate
documentation for the frame layout and the GET/SET/DEL commands.
"#
    );
}

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    println!(
        "emberkv v{} - in-memory key-value server on {}",
        emberkv::VERSION,
        config.bind_address()
    );

    // Resolve the bind address (allows hostnames, not just IP literals)
    let addr: SocketAddr = config
        .bind_address()
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}", config.bind_address()))?
        .next()
        .with_context(|| format!("no addresses for {}", config.bind_address()))?;

    // One store, one dispatcher, one loop, one thread
    let dispatcher = CommandDispatcher::new(Store::new());
    let mut server =
        EventLoop::bind(addr, dispatcher).with_context(|| format!("failed to bind {addr}"))?;
    info!("listening on {}", server.local_addr());

    // Runs until the process is killed; an error here means the
    // readiness primitive failed and there is no way to carry on.
    server.run().context("event loop terminated")?;
    Ok(())
}
