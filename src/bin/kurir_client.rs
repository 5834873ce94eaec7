//! Kurir Client Binary
//!
//! Connect ke server dan jalankan command loop interaktif:
//!   sendInt <n> | createAccount <id> <name> | ping | square <x> | quit
//! Input lain dikirim sebagai teks NUL-terminated.
//!
//! Usage:
//!   cargo run --release --bin kurir_client -- [OPTIONS]

use std::io;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use kurir::demo;
use kurir::network::EventLoop;
use kurir::Config;

#[derive(Parser, Debug)]
#[command(name = "kurir_client", version, about = "Kurir RPC interactive client")]
struct Args {
    /// Alamat server
    #[arg(short = 'H', long, default_value = "127.0.0.1:7777")]
    host: String,

    /// Timeout untuk call yang menunggu hasil (ms)
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Log level debug
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> kurir::Result<()> {
    let args = Args::parse();
    kurir::logging::init(args.verbose);

    println!("🦀 Kurir Client - v{}", env!("CARGO_PKG_VERSION"));
    println!("====================================\n");

    let (handle, thread) = EventLoop::spawn(Config::default())?;

    println!("🔌 Connecting to {}...", args.host);
    let table = Arc::new(demo::dispatch_table());
    let (session, conn) = handle.connect(args.host.as_str(), |session| {
        demo::connection(session, table)
    })?;
    println!("   Connected from {}\n", session.local_addr()?);

    let stdin = io::stdin();
    demo::run_repl(
        stdin.lock(),
        io::stdout(),
        &conn,
        Duration::from_millis(args.timeout_ms),
    )?;

    if !session.is_open() {
        println!("⚠️  Connection closed by server");
    }

    handle.shutdown();
    let _ = thread.join();
    Ok(())
}
