use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gazette_nntp_stub::{StubConfig, StubError, StubServer, load_fixtures};

#[derive(Parser, Debug)]
#[command(
    name = "gazette-nntp-stub",
    about = "Scriptable NNTP reader server for exercising the gazette client"
)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:3119")]
    bind: std::net::SocketAddr,

    #[arg(long, default_value = "fixtures/nntp/fixtures-basic.json")]
    fixtures: PathBuf,

    #[arg(long, default_value_t = false)]
    require_auth: bool,

    #[arg(long, default_value = "test")]
    username: String,

    #[arg(long, default_value = "secret")]
    password: String,

    /// Drop the connection after this many commands (0 disables).
    #[arg(long, default_value_t = 0)]
    disconnect_after: usize,

    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), StubError> {
    let args = Args::parse();
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let fixtures = load_fixtures(&args.fixtures)?;
    let config = StubConfig {
        bind: args.bind,
        require_auth: args.require_auth,
        username: args.username,
        password: args.password,
        disconnect_after: args.disconnect_after,
        delay_ms: args.delay_ms,
    };
    let server = StubServer::new(config, fixtures);
    tracing::info!(bind = %args.bind, "NNTP stub listening");
    server.serve().await
}
