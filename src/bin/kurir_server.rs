//! Kurir Server Binary
//!
//! Melayani interface demo untuk setiap koneksi dan mencetak statistik
//! berkala.
//!
//! Usage:
//!   cargo run --release --bin kurir_server -- [OPTIONS]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::info;

use kurir::demo;
use kurir::network::{EventLoop, LoopHandle, Server};
use kurir::Config;

#[derive(Parser, Debug)]
#[command(name = "kurir_server", version, about = "Kurir RPC demo server")]
struct Args {
    /// Alamat bind
    #[arg(short, long, default_value = "0.0.0.0:7777")]
    bind: String,

    /// Batas session aktif
    #[arg(long, default_value_t = 1024)]
    max_connections: usize,

    /// SO_SNDBUF/SO_RCVBUF dalam KiB (0 = default OS)
    #[arg(long, default_value_t = 256)]
    socket_buffer_kb: usize,

    /// Interval statistik dalam detik (0 = mati)
    #[arg(long, default_value_t = 5)]
    stats_interval: u64,

    /// Log level debug
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            max_connections: self.max_connections,
            socket_buffer_size: (self.socket_buffer_kb > 0).then(|| self.socket_buffer_kb * 1024),
            ..Config::default()
        }
        .with_bind_addr(self.bind.clone())
    }
}

fn print_stats(handle: &LoopHandle, server: &Server, uptime: Duration) {
    let sessions = handle.stats();
    let acceptor = server.stats();
    let secs = uptime.as_secs_f64().max(f64::EPSILON);

    info!(
        uptime_s = format!("{:.1}", secs),
        active = handle.session_count(),
        accepted = acceptor.accepted,
        rejected = acceptor.rejected,
        accept_errors = acceptor.accept_errors,
        msgs_in = sessions.messages_received,
        msgs_out = sessions.messages_sent,
        rate_in = format!("{:.1}/s", sessions.messages_received as f64 / secs),
        bytes_in = sessions.bytes_received,
        bytes_out = sessions.bytes_sent,
        queued = sessions.queued,
        "📊 server stats"
    );
}

fn main() -> kurir::Result<()> {
    let args = Args::parse();
    kurir::logging::init(args.verbose);
    let config = args.config();

    println!("🚀 Kurir Server - v{}", env!("CARGO_PKG_VERSION"));
    println!("====================================\n");
    println!("Configuration:");
    println!("  Bind:         {}", config.bind_addr);
    println!("  Max conns:    {}", config.max_connections);
    println!("  TCP_NODELAY:  {}", config.nodelay);
    println!();

    let (handle, thread) = EventLoop::spawn(config)?;
    let table = Arc::new(demo::dispatch_table());
    let server = handle.serve(move |session| {
        demo::connection(session, table.clone())
    })?;
    println!("📡 Listening on {}\n", server.local_addr());

    if args.stats_interval > 0 {
        let started = Instant::now();
        let interval = Duration::from_secs(args.stats_interval);
        let stats_handle = handle.clone();
        thread::Builder::new()
            .name("kurir-stats".to_string())
            .spawn(move || {
                while stats_handle.is_running() {
                    thread::sleep(interval);
                    print_stats(&stats_handle, &server, started.elapsed());
                }
            })?;
    }

    match thread.join() {
        Ok(result) => result?,
        Err(_) => tracing::error!("event loop thread panicked"),
    }
    Ok(())
}
