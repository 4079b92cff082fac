//! Exchange server entry point.
//!
//! Binds the one stream-socket listening endpoint, spawns one thread
//! per accepted connection running a session loop,
//! and wires the shared `InstrumentRegistry`, global order index,
//! `orders_lock`, and `ReportBus` every session and book needs.

use std::io;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use common::logging::{LogLevel, Logger};
use common::net::tcp::TcpListener;
use parking_lot::Mutex;

use exchange::concurrent_index::ConcurrentIndex;
use exchange::registry::InstrumentRegistry;
use exchange::report::ReportBus;
use exchange::session::{Session, SessionIdAllocator, SharedState};

/// Concurrent limit-order matching engine server.
#[derive(Parser, Debug)]
#[command(name = "exchange")]
#[command(about = "Concurrent limit-order matching engine")]
struct Args {
    /// TCP port to listen on for client connections.
    #[arg(long, default_value_t = 12345)]
    port: u16,

    /// IP address to bind the listening socket to.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let logger = Arc::new(Logger::with_level(LogLevel::Info));

    let (bus, _printer) = ReportBus::spawn(io::stdout());
    let shared = SharedState {
        registry: Arc::new(InstrumentRegistry::new()),
        global_orders: Arc::new(ConcurrentIndex::new()),
        orders_lock: Arc::new(Mutex::new(())),
        bus,
        logger: logger.clone(),
    };

    let listener = Arc::new(TcpListener::bind(&args.bind, args.port)?);
    logger.log_with_u64(LogLevel::Info, "listening on port", args.port as u64);

    {
        let logger = logger.clone();
        ctrlc::set_handler(move || {
            logger.log(LogLevel::Warn, "shutdown signal received, exiting");
            logger.flush();
            std::process::exit(0);
        })
        .expect("failed to install ctrl-c handler");
    }

    let session_ids = Arc::new(SessionIdAllocator::new());

    loop {
        let socket = match listener.accept() {
            Ok(socket) => socket,
            Err(e) => {
                logger.log_with_i64(LogLevel::Warn, "accept failed", e.raw_os_error().unwrap_or(-1) as i64);
                continue;
            }
        };

        let session_id = session_ids.next();
        let shared = shared.clone();
        let logger = logger.clone();

        thread::Builder::new()
            .name(format!("session-{}", session_id))
            .spawn(move || run_session(socket, session_id, shared, logger))
            .expect("failed to spawn session thread");
    }
}

fn run_session(
    socket: common::net::tcp::TcpSocket,
    session_id: u32,
    shared: SharedState,
    logger: Arc<Logger>,
) {
    logger.log_with_u64(LogLevel::Info, "session connected", session_id as u64);
    let session = Session::new(socket, session_id, shared);
    // `Session::run` only ever returns via `Err`. `Ok(())` has no
    // reachable path since the loop only exits on EOF/malformed/IO
    // error, each mapped to a `SessionError`.
    let _ = session.run();
    logger.log_with_u64(LogLevel::Info, "session disconnected", session_id as u64);
}
