//! FlashKV Client - command-line entry point
//!
//! Sends one command to the server and prints the reply. `SUBSCRIBE` and
//! `PSUBSCRIBE` keep listening and print every message until Ctrl+C.

use anyhow::Context;
use flashkv_client::pubsub::{Handler, PubSubEvent, SubscriptionManager};
use flashkv_client::{ClientConfig, CommandChannel, Error, DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Command-line configuration
struct Config {
    client: ClientConfig,
    /// Command keyword and its arguments
    command: Vec<String>,
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut client = ClientConfig::default();
        let mut command = Vec::new();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            if !command.is_empty() {
                command.push(args[i].clone());
                i += 1;
                continue;
            }
            match args[i].as_str() {
                "--host" | "-h" => {
                    client.host = value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    client.port = value(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--password" | "-a" => {
                    client.password = Some(value(&args, i, "--password").to_string());
                    i += 2;
                }
                "--db" | "-n" => {
                    let index = value(&args, i, "--db").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid database index");
                        std::process::exit(1);
                    });
                    client.database = Some(index);
                    i += 2;
                }
                "--timeout" => {
                    let millis: u64 = value(&args, i, "--timeout").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid timeout");
                        std::process::exit(1);
                    });
                    client.send_timeout = Some(Duration::from_millis(millis));
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("flashkv-client version {}", flashkv_client::VERSION);
                    std::process::exit(0);
                }
                flag if flag.starts_with('-') => {
                    eprintln!("Unknown argument: {}", flag);
                    print_help();
                    std::process::exit(1);
                }
                _ => {
                    command.push(args[i].clone());
                    i += 1;
                }
            }
        }

        if command.is_empty() {
            print_help();
            std::process::exit(1);
        }

        Self { client, command }
    }
}

/// The value following flag `args[i]`, or exit.
fn value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
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
FlashKV Client - An Async RESP Client

USAGE:
    flashkv-client [OPTIONS] <COMMAND> [ARGS...]

OPTIONS:
    -h, --host <HOST>          Server host (default: {})
    -p, --port <PORT>          Server port (default: {})
    -a, --password <PASSWORD>  Password sent with AUTH after connecting
    -n, --db <INDEX>           Database selected after connecting
        --timeout <MS>         Send timeout in milliseconds
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    flashkv-client PING
    flashkv-client -p 6380 SET name Ariz
    flashkv-client -n 2 KEYS 'user:*'
    flashkv-client SUBSCRIBE news 'alerts.*'

Logging goes to stderr and is controlled with RUST_LOG (default: warn).
"#,
        DEFAULT_HOST, DEFAULT_PORT
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    // Set up logging
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let name = config.command[0].to_ascii_uppercase();
    let args = &config.command[1..];

    match name.as_str() {
        "SUBSCRIBE" | "PSUBSCRIBE" => listen(config.client, args).await,
        _ => run_command(config.client, &name, args).await,
    }
}

/// Sends one command and prints its reply.
async fn run_command(client: ClientConfig, name: &str, args: &[String]) -> anyhow::Result<()> {
    let address = client.address();
    let mut channel = CommandChannel::new(client);

    channel
        .send_command(name, args)
        .await
        .with_context(|| format!("could not send {} to {}", name, address))?;

    match channel.read_reply().await {
        Ok(reply) => println!("{}", reply),
        Err(Error::Server(message)) => println!("(error) {}", message),
        Err(e) => return Err(e).context("could not read reply"),
    }

    channel.quit().await;
    Ok(())
}

/// Subscribes to every key in `keys` and prints messages until Ctrl+C.
async fn listen(client: ClientConfig, keys: &[String]) -> anyhow::Result<()> {
    if keys.is_empty() {
        anyhow::bail!("SUBSCRIBE needs at least one channel or pattern");
    }

    let mut subs = SubscriptionManager::new(client);
    let mut events = subs.events();
    for key in keys {
        let handler = Handler::callback(|message| match &message.pattern {
            Some(pattern) => println!(
                "{} ({}): {}",
                message.channel_str(),
                String::from_utf8_lossy(pattern),
                String::from_utf8_lossy(&message.payload)
            ),
            None => println!(
                "{}: {}",
                message.channel_str(),
                String::from_utf8_lossy(&message.payload)
            ),
        });
        subs.subscribe(key, handler)
            .await
            .with_context(|| format!("could not subscribe to {}", key))?;
    }
    info!(count = keys.len(), "Listening, press Ctrl+C to stop");

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("could not install Ctrl+C handler")?;
            info!("Shutdown signal received");
        }
        failure = wait_for_failure(&mut events) => {
            eprintln!("Subscription failed: {}", failure);
        }
    }

    subs.close().await?;
    Ok(())
}

/// Resolves when the listener reports a fatal error.
async fn wait_for_failure(
    events: &mut broadcast::Receiver<PubSubEvent>,
) -> String {
    loop {
        match events.recv().await {
            Ok(PubSubEvent::ListenerFailed(message)) => return message,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => return "event stream closed".to_string(),
        }
    }
}
