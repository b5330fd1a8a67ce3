//! Connects to a SockJS server and prints every message it sends.
//!
//! Usage:
//!
//! ```text
//! cargo run --example read_messages -- --addr http://127.0.0.1:8081/echo [--ws] [--debug]
//! ```
//!
//! Without `--ws` the xhr polling transport is used directly.

// ============================================================================
// Imports
// ============================================================================

use sockjs_client::{Client, Result};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    addr: String,
    ws: bool,
    debug: bool,
}

impl Args {
    /// Parse command-line arguments.
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let addr = args
            .iter()
            .position(|a| a == "--addr")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_default();

        Self {
            addr,
            ws: args.iter().any(|a| a == "--ws"),
            debug: args.iter().any(|a| a == "--debug"),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
fn init_logging(debug: bool) {
    let filter = if debug {
        "sockjs_client=trace"
    } else {
        "sockjs_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let client = Client::builder()
        .address(args.addr)
        .websocket(args.ws)
        .build()?;

    client.connect().await?;
    println!(
        "Connected via {}",
        if client.is_websocket() { "websocket" } else { "xhr" }
    );

    loop {
        let msg = client.read_msg().await?;
        println!("{}", String::from_utf8_lossy(&msg));
    }
}
