use clap::Parser;
use client::network::NetworkClient;
use log::info;
use shared::InputState;
use std::time::Duration;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Headless arena client")]
struct Args {
    /// Server address
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[clap(short, long, default_value = "21001")]
    port: u16,
    /// How long to run before exiting, in seconds
    #[clap(short, long, default_value = "30")]
    duration: u64,
}

/// Drives a scripted session against a running server: sweeps the aim in
/// a circle, strafes, and fires in bursts, printing the score as
/// snapshots arrive.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let addr = format!("{}:{}", args.host, args.port);
    let mut net = NetworkClient::connect(&addr).await?;
    info!("Playing as player {}", net.player_id);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.duration);
    let mut ticker = interval(Duration::from_millis(16));
    let mut t: f32 = 0.0;
    let mut last_printed_tick = 0u64;

    while tokio::time::Instant::now() < deadline && net.is_connected() {
        ticker.tick().await;
        t += 0.016;

        let input = InputState {
            seq: 0,
            up: t.sin() > 0.0,
            down: t.sin() <= 0.0,
            left: t.cos() <= 0.0,
            right: t.cos() > 0.0,
            // Fire in one-second bursts with one-second pauses.
            shoot: (t as u64) % 2 == 0,
            angle: t * 0.8,
        };
        net.send_input(input).await?;

        if let Some(snap) = net.latest_snapshot() {
            if snap.tick >= last_printed_tick + 60 {
                last_printed_tick = snap.tick;
                let score = snap
                    .players
                    .get(&net.player_id)
                    .map(|p| p.score)
                    .unwrap_or(0);
                println!(
                    "tick {:>6}  score {:>5}  npcs {:>2}  bullets {:>2}",
                    snap.tick,
                    score,
                    snap.npcs.len(),
                    snap.bullets.len()
                );
            }
        }
    }

    info!("Session finished");
    Ok(())
}
