// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ICS daemon (icsd)
//!
//! Per-node server process that owns the engine and its queues.
//!
//! Architecture:
//! - Listener task: Unix-socket + TCP I/O, dispatching into the cluster layer
//! - Engine loop: main task processing events sequentially
//! - Poll tick: 1-second sweep reaping children and scheduling monitors
//! - Alert handler and config persister: independent background tasks

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fs2::FileExt;
use ics_core::clock::SystemClock;
use ics_daemon::cluster::{Cluster, TcpPeer};
use ics_daemon::{env, listener::Listener};
use ics_engine::{AlertHandler, AlertSettings, EventSender, NodeEngine, Persister, SendmailMailer};
use parking_lot::Mutex;
use tokio::net::{TcpListener, UnixListener};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("icsd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("icsd {}", env!("CARGO_PKG_VERSION"));
                println!("ICS daemon - per-node service-group supervisor");
                println!();
                println!("USAGE:");
                println!("    icsd");
                println!();
                println!("The daemon listens on a Unix socket for the `ics` CLI and on");
                println!("TCP port $ICS_PORT (default 9090) for cluster peers. Paths are");
                println!("taken from ICS_HOME, ICS_LOG, ICS_CONF, ICS_VAR and ICS_UDS.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: icsd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    for dir in [env::ics_var(), env::ics_log(), env::ics_conf(), env::ics_uds()] {
        std::fs::create_dir_all(&dir)?;
    }

    // Single-instance lock
    let lock_path = env::lock_file();
    let mut lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)?;
    if lock_file.try_lock_exclusive().is_err() {
        eprintln!("icsd is already running");
        std::process::exit(1);
    }
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    let level_setter = setup_logging()?;
    info!("server starting up");

    // Queues
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    let dirty = Arc::new(AtomicBool::new(false));

    let engine = NodeEngine::new(
        Arc::new(SystemClock),
        EventSender::new(event_tx),
        alert_tx.clone(),
        dirty.clone(),
        &env::ics_log(),
    );
    let engine = Arc::new(Mutex::new(engine));
    let alerts = Arc::new(Mutex::new(AlertSettings::default()));

    // Configuration load failure is fatal at startup.
    info!("loading configuration");
    match ics_engine::read_config(&env::conf_file()) {
        Ok(Some(data)) => {
            let mut engine_guard = engine.lock();
            let mut alerts_guard = alerts.lock();
            if let Err(e) = ics_engine::apply(&mut engine_guard, &mut alerts_guard, &data) {
                error!(error = %e, "error reading config file");
                std::process::exit(1);
            }
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "error reading config file");
            std::process::exit(1);
        }
    }
    // Loading is not a modification.
    dirty.store(false, Ordering::SeqCst);

    // Alert handler
    let template = env::alert_template();
    let handler = AlertHandler::new(
        alert_rx,
        alerts.clone(),
        &env::ics_log(),
        Some(template.as_path()),
        Box::new(SendmailMailer::new()),
    );
    tokio::spawn(handler.run());

    // Cluster layer with peers reconstructed from NodeList
    let port = env::listen_port();
    let cluster = Arc::new(Cluster::new(
        engine.clone(),
        alerts.clone(),
        alert_tx,
        Box::new(move |host| Arc::new(TcpPeer::new(host, port))),
        level_setter,
        &env::ics_log(),
        dirty.clone(),
    ));
    cluster.connect_peers();

    // Listener on the local socket and the peer port
    let socket_path = env::uds_socket();
    let _ = std::fs::remove_file(&socket_path);
    let unix = UnixListener::bind(&socket_path)?;
    let tcp = TcpListener::bind(("0.0.0.0", port)).await?;
    tokio::spawn(Listener::new(unix, tcp, Arc::clone(&cluster)).run());

    // Config persister
    let persister = Arc::new(Persister::new(
        env::conf_file(),
        engine.clone(),
        alerts.clone(),
        dirty.clone(),
    ));
    tokio::spawn({
        let persister = Arc::clone(&persister);
        async move { persister.run().await }
    });

    // Probe every resource once, then AutoStart groups come online.
    engine.lock().begin_startup_probe();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %socket_path.display(), port, "server startup complete");

    // NOTE: Must be created outside the loop - tokio::select! re-evaluates
    // branches on each iteration, so using sleep() inside would reset on
    // every event and the poll tick would starve under load.
    let mut poll_tick = tokio::time::interval(Duration::from_secs(1));
    poll_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                match event {
                    Some(event) => engine.lock().dispatch(event),
                    None => {
                        info!("event queue closed, shutting down");
                        break;
                    }
                }
            }

            _ = poll_tick.tick() => {
                engine.lock().poll_tick();
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    // Graceful shutdown: persist config, drop the socket and the lock.
    if let Err(e) = persister.persist_now() {
        error!(error = %e, "unable to persist config at shutdown");
    }
    let _ = std::fs::remove_file(&socket_path);
    let _ = std::fs::remove_file(&lock_path);
    info!("server shutdown complete");
    Ok(())
}

/// Install the tracing subscriber and return a closure that maps ICS log
/// levels onto the filter at runtime.
fn setup_logging() -> Result<ics_daemon::cluster::LevelSetter, Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, reload_handle) = reload::Layer::new(filter);

    let (writer, guard) = if env::console_log() {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        let appender = tracing_appender::rolling::never(env::ics_log(), "icsserver.log");
        tracing_appender::non_blocking(appender)
    };
    // The guard must outlive the process; the daemon never tears logging down.
    Box::leak(Box::new(guard));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_writer(writer))
        .init();

    Ok(Box::new(move |level: &str| {
        let directive = match level.to_ascii_uppercase().as_str() {
            "CRITICAL" | "ERROR" => "error",
            "WARNING" => "warn",
            "INFO" => "info",
            "DEBUG" => "debug",
            "NOTSET" => "trace",
            _ => return false,
        };
        tracing::info!(level = %level.to_ascii_uppercase(), "log level set");
        reload_handle.reload(EnvFilter::new(directive)).is_ok()
    }))
}
