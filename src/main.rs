//! Argopost - A Line-Oriented Mail Submission Server
//!
//! This is the main entry point for the Argopost server.
//! It sets up logging, the delivery worker and the TCP listener, and hands
//! each accepted connection to its own session task.

use argopost::connection::{handle_connection, Connection, SessionManager};
use argopost::delivery::{DeliveryQueue, DeliveryWorker};
use argopost::session::{SessionConfig, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_REPLY_TIMEOUT};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    /// Host to bind to
    host: String,
    /// Port to listen on
    port: u16,
    /// Inactivity timeout after each reply
    timeout: Duration,
    /// Optional 220 greeting text
    banner: Option<String>,
    /// Largest accepted message body in bytes
    max_message_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: argopost::DEFAULT_HOST.to_string(),
            port: argopost::DEFAULT_PORT,
            timeout: DEFAULT_REPLY_TIMEOUT,
            banner: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
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
                    config.host = required_value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = required_value(&args, i, "--port")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid port number");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--timeout" | "-t" => {
                    let secs: u64 = required_value(&args, i, "--timeout")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid timeout (seconds)");
                            std::process::exit(1);
                        });
                    config.timeout = Duration::from_secs(secs);
                    i += 2;
                }
                "--banner" => {
                    config.banner = Some(required_value(&args, i, "--banner").to_string());
                    i += 2;
                }
                "--max-size" => {
                    config.max_message_size = required_value(&args, i, "--max-size")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid message size (bytes)");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("Argopost version {}", argopost::VERSION);
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

    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reply_timeout: self.timeout,
            banner: self.banner.clone(),
            max_message_size: self.max_message_size,
        }
    }
}

fn required_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
Argopost - A Line-Oriented Mail Submission Server

USAGE:
    argopost [OPTIONS]

OPTIONS:
    -h, --host <HOST>       Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>       Port to listen on (default: 2525)
    -t, --timeout <SECS>    Inactivity timeout after each reply (default: 100)
        --banner <TEXT>     Send "220 <TEXT>" when a client connects
        --max-size <BYTES>  Largest accepted message body (default: 10485760)
    -v, --version           Print version information
        --help              Print this help message

ENVIRONMENT:
    RUST_LOG                Log filter (default: info)

EXAMPLE SESSION:
    $ nc 127.0.0.1 2525
    HELO client.example
    250 Hello client.example
    MAIL FROM <a@b.com>
    250 Accepting mail from a@b.com
    RCPT TO <c@d.com>
    250 Will deliver mail to c@d.com
    DATA
    354 Enter data with a terminating .
    hello
    .
    250 Ok: queued
    QUIT
    221 Goodnight and good luck
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Start the stub delivery backend
    let (queue, rx) = DeliveryQueue::channel();
    let worker = DeliveryWorker::start(rx);

    let manager = Arc::new(SessionManager::new(config.session_config(), queue));

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(
        version = argopost::VERSION,
        timeout_secs = config.timeout.as_secs(),
        "Listening on {}",
        config.bind_address()
    );

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&manager)) => {}
        _ = shutdown => {}
    }

    let stats = manager.stats();
    info!(
        sessions = stats.sessions_opened.load(Ordering::Relaxed),
        still_open = manager.len(),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        queued = stats.messages_queued.load(Ordering::Relaxed),
        delivered = worker.delivered(),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, manager: Arc<SessionManager>) {
    loop {
        let stream = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let connection = match Connection::from_tcp(stream) {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Dropping connection without endpoint addresses: {}", e);
                continue;
            }
        };

        // Register the session, then spawn a task to run it
        match manager.create_session(connection) {
            Ok(session) => {
                tokio::spawn(handle_connection(Arc::clone(&manager), session));
            }
            Err(e) => warn!(error = %e, "Rejected connection"),
        }
    }
}
