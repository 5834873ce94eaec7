//! Kurir - server dan client interaktif dalam satu proses
//!
//! Listen di port demo, connect ke diri sendiri, lalu jalankan command loop
//! dari stdin.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use kurir::demo::{self, DEFAULT_PORT};
use kurir::network::EventLoop;
use kurir::Config;

#[derive(Parser, Debug)]
#[command(name = "kurir", version, about = "Kurir RPC demo (server + client)")]
struct Args {
    /// Port listener
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

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

    println!("🚀 Kurir RPC - v{}", env!("CARGO_PKG_VERSION"));
    println!("====================================\n");

    let config = Config::default().with_bind_addr(format!("127.0.0.1:{}", args.port));

    let (handle, thread) = EventLoop::spawn(config)?;
    let table = Arc::new(demo::dispatch_table());

    let server_table = table.clone();
    let server = handle.serve(move |session| {
        demo::connection(session, server_table.clone())
    })?;
    println!("📡 Listening on {}", server.local_addr());

    let (_session, conn) =
        handle.connect(server.local_addr(), |session| demo::connection(session, table))?;
    println!("🔌 Connected. Commands: sendInt <n>, createAccount <id> <name>, ping, square <x>, quit\n");

    let stdin = io::stdin();
    demo::run_repl(
        stdin.lock(),
        io::stdout(),
        &conn,
        Duration::from_millis(args.timeout_ms),
    )?;

    handle.shutdown();
    let _ = thread.join();
    println!("\n✅ Bye!");
    Ok(())
}
