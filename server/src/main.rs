use clap::Parser;
use log::info;
use server::config::Config;
use server::network::Server;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Authoritative arena game server")]
struct Args {
    /// Address to bind to
    #[clap(short = 'H', long, default_value = "0.0.0.0")]
    host: String,
    /// Port to listen on
    #[clap(short, long, default_value = "21001")]
    port: u16,
    /// Simulation rate (ticks per second)
    #[clap(short, long, default_value = "60", value_parser = clap::value_parser!(u32).range(1..=1000))]
    tick_rate: u32,
    /// Snapshot broadcast rate (per second)
    #[clap(short, long, default_value = "20", value_parser = clap::value_parser!(u32).range(1..=1000))]
    snapshot_rate: u32,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = Config {
        tick_hz: args.tick_rate,
        snapshot_hz: args.snapshot_rate,
        ..Config::default()
    };

    info!(
        "Starting server at {} ticks/s, {} snapshots/s",
        config.tick_hz, config.snapshot_hz
    );

    let addr = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&addr, config).await?;
    server.run().await
}
