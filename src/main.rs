//! Chat Listener - Main entry point
//!
//! Listens to chat windows and prints every delivered message as a JSON line.
//! Live UI automation is supplied by host-specific glue; this binary drives the
//! listener from a recorded replay script.
//!
//! # Usage
//!
//! ```bash
//! chat-listener --replay session.json
//! chat-listener --replay session.json --window Alice --window "Book club"
//! chat-listener --config ~/my-config.toml --replay session.json
//! ```

use chat_listener::{Config, EventPublisher, Listener, Message, ScriptedAutomation, WindowRef};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Default)]
struct Args {
    config_path: Option<PathBuf>,
    replay_path: Option<PathBuf>,
    windows: Vec<String>,
}

/// Parse command line arguments
fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("Chat Listener v{}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    parsed.config_path = Some(PathBuf::from(&args[i]));
                }
            }
            "--replay" | "-r" => {
                i += 1;
                if i < args.len() {
                    parsed.replay_path = Some(PathBuf::from(&args[i]));
                }
            }
            "--window" | "-w" => {
                i += 1;
                if i < args.len() {
                    parsed.windows.push(args[i].clone());
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("Use --help for usage information.");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!(
        r#"Chat Listener - incremental message listener for desktop chat windows

USAGE:
    chat-listener [OPTIONS] --replay <FILE>

OPTIONS:
    -h, --help              Show this help message
    -v, --version           Show version
    -c, --config <PATH>     Path to configuration file
    -r, --replay <FILE>     Replay a recorded session (JSON script)
    -w, --window <TITLE>    Listen to this window (repeatable; default: [listen] windows
                            from the config, or every window in the script)

OUTPUT:
    One JSON object per delivered message on stdout.
"#
    );
}

/// Pick the windows to listen to: command line, then config, then everything
fn select_windows(available: Vec<WindowRef>, requested: &[String]) -> Vec<WindowRef> {
    if requested.is_empty() {
        return available;
    }
    requested
        .iter()
        .filter_map(|title| {
            let found = available.iter().find(|w| &w.title == title).cloned();
            if found.is_none() {
                warn!("⚠️  No window titled {:?} in the replay script", title);
            }
            found
        })
        .collect()
}

fn print_message(message: &Message) {
    match serde_json::to_string(message) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to serialize message: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args();

    let config = match &args.config_path {
        Some(path) => Config::load_from_path(path.clone()),
        None => Config::load(),
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Chat Listener");

    if !config.general.enabled {
        info!("Listener is disabled in configuration, exiting");
        return Ok(());
    }

    let replay_path = match &args.replay_path {
        Some(path) => path.clone(),
        None => {
            error!("No automation backend available; pass --replay <FILE>");
            std::process::exit(1);
        }
    };
    let automation = Arc::new(ScriptedAutomation::from_path(&replay_path, &config.timing)?);

    let requested = if args.windows.is_empty() {
        config.listen.windows.clone()
    } else {
        args.windows.clone()
    };
    let windows = select_windows(automation.window_refs(), &requested);
    if windows.is_empty() {
        error!("Nothing to listen to");
        std::process::exit(1);
    }

    let publisher = Arc::new(EventPublisher::new());
    let mut messages = publisher.subscribe_channel(true);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n🛑 Shutting down...");
        r.store(false, Ordering::SeqCst);
    })?;

    let listener = Arc::new(Listener::new(config, automation, Arc::clone(&publisher)));
    listener.init_listen(windows).await?;
    info!("👂 Listening to {:?}", listener.windows().await);

    let worker = listener.take_worker();
    loop {
        tokio::select! {
            Some((message, _window)) = messages.recv() => print_message(&message),
            _ = tokio::time::sleep(Duration::from_millis(200)) => {
                let finished = worker.as_ref().map_or(true, |w| w.is_finished());
                if finished || !running.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
    }

    // Everything published before the worker stopped is already queued
    while let Ok((message, _window)) = messages.try_recv() {
        print_message(&message);
    }

    if let Some(worker) = worker.filter(|w| w.is_finished()) {
        match worker.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Listener stopped: {}", e);
                std::process::exit(2);
            }
            Err(e) => {
                error!("Listener task failed: {}", e);
                std::process::exit(2);
            }
        }
    }

    let status = listener.status().await;
    info!(
        "Delivered {} message(s), skipped {}",
        status.delivered_total, status.skipped_total
    );
    Ok(())
}
