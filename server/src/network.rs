//! TCP network layer: connection accept, handshake, per-session readers
//! and writers, and the fixed-timestep tick loop with snapshot broadcast.
//!
//! All mutable server state sits behind one `tokio::sync::Mutex`. Session
//! tasks and the tick loop take the lock briefly per event and never hold
//! it across socket I/O: outbound frames go through an unbounded channel
//! per session, drained by a writer task that owns the socket's write
//! half. A peer that stops reading stalls only its own writer task; the
//! simulation keeps ticking and the session is torn down when its socket
//! eventually errors.

use crate::config::Config;
use crate::world::World;
use log::{debug, info, warn};
use shared::{
    decode_message, encode_message, snapshot_interval, InputState, LineBuffer, Message,
    PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{sleep_until, Instant};

/// Everything the tick loop and session tasks share, guarded by a single
/// coarse lock.
pub struct Shared {
    /// Outbound frame queue per live connection, keyed by player id.
    sessions: HashMap<u32, mpsc::UnboundedSender<Vec<u8>>>,
    /// Latest input per player. Last write wins.
    inputs: HashMap<u32, InputState>,
    world: World,
    next_player_id: u32,
}

impl Shared {
    fn new(config: &Config) -> Self {
        Self {
            sessions: HashMap::new(),
            inputs: HashMap::new(),
            world: World::new(
                config.world_w,
                config.world_h,
                config.starting_npcs,
                config.max_npcs,
            ),
            next_player_id: 1,
        }
    }
}

pub struct Server {
    listener: TcpListener,
    shared: Arc<Mutex<Shared>>,
    config: Config,
}

impl Server {
    pub async fn bind(addr: &str, config: Config) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        let shared = Arc::new(Mutex::new(Shared::new(&config)));
        Ok(Self {
            listener,
            shared,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the acceptor and tick loop until the process exits.
    pub async fn run(self) -> std::io::Result<()> {
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        tokio::spawn(async move {
            tick_loop(shared, config).await;
        });
        accept_loop(self.listener, self.shared, self.config).await
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<Mutex<Shared>>,
    config: Config,
) -> std::io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let shared = Arc::clone(&shared);
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = register_session(stream, addr, shared, &config).await {
                warn!("Handshake with {} failed: {}", addr, e);
            }
        });
    }
}

/// Completes the handshake for a new connection: assigns the next player
/// id, sends the welcome record, and only then registers the session,
/// input slot, and world entity. A connection that dies before the
/// welcome is written leaves no trace in the world.
async fn register_session(
    stream: TcpStream,
    addr: SocketAddr,
    shared: Arc<Mutex<Shared>>,
    config: &Config,
) -> std::io::Result<()> {
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();

    let id = {
        let mut guard = shared.lock().await;
        let id = guard.next_player_id;
        guard.next_player_id += 1;
        id
    };

    let welcome = Message::Welcome {
        protocol: PROTOCOL_VERSION,
        id,
        tick_hz: config.tick_hz,
        snapshot_hz: config.snapshot_hz,
        w: config.world_w,
        h: config.world_h,
    };
    let frame = encode_message(&welcome)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    write_half.write_all(&frame).await?;

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    {
        let mut guard = shared.lock().await;
        guard.sessions.insert(id, frame_tx);
        guard.inputs.insert(id, InputState::default());
        guard.world.add_player(id);
    }

    info!("Player {} connected from {}", id, addr);
    tokio::spawn(session_writer(id, write_half, frame_rx, Arc::clone(&shared)));
    tokio::spawn(session_reader(id, read_half, shared));
    Ok(())
}

/// Reads newline-delimited frames from one connection until EOF or error,
/// replacing the player's input slot on each valid input record.
/// Malformed frames are dropped without affecting the connection.
async fn session_reader(id: u32, mut read_half: OwnedReadHalf, shared: Arc<Mutex<Shared>>) {
    let mut chunk = [0u8; 4096];
    let mut lines = LineBuffer::new();

    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) => {
                info!("Player {} disconnected", id);
                break;
            }
            Ok(n) => {
                lines.push(&chunk[..n]);
                while let Some(frame) = lines.next_frame() {
                    match decode_message(&frame) {
                        Ok(Message::Input(input)) => {
                            let mut guard = shared.lock().await;
                            guard.inputs.insert(id, input);
                        }
                        Ok(other) => {
                            debug!("Ignoring unexpected record from player {}: {:?}", id, other);
                        }
                        Err(e) => {
                            debug!("Dropping malformed frame from player {}: {}", id, e);
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Read error on player {}: {}", id, e);
                break;
            }
        }
    }

    teardown_session(id, &shared).await;
}

/// Drains one session's outbound queue onto its socket. Only this task
/// ever awaits a write, so a stalled peer backs up its own queue without
/// touching the lock or the tick loop. Exits when the queue's sender is
/// dropped at teardown or the socket fails.
async fn session_writer(
    id: u32,
    mut write_half: OwnedWriteHalf,
    mut frame_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Arc<Mutex<Shared>>,
) {
    while let Some(frame) = frame_rx.recv().await {
        if let Err(e) = write_half.write_all(&frame).await {
            warn!("Dropping player {} on send failure: {}", id, e);
            break;
        }
    }
    teardown_session(id, &shared).await;
}

/// Removes every trace of a session: the outbound queue, the input slot,
/// the player entity, and its bullets. Safe to call more than once.
async fn teardown_session(id: u32, shared: &Arc<Mutex<Shared>>) {
    let mut guard = shared.lock().await;
    guard.sessions.remove(&id);
    guard.inputs.remove(&id);
    guard.world.remove_player(id);
}

/// Fixed-timestep simulation loop. The deadline accumulates by exactly
/// one tick duration per iteration, so a late tick is followed by
/// immediate catch-up ticks rather than a permanently shifted schedule.
async fn tick_loop(shared: Arc<Mutex<Shared>>, config: Config) {
    let dt = 1.0 / config.tick_hz as f32;
    let tick_duration = Duration::from_secs_f32(dt);
    let broadcast_every = snapshot_interval(config.tick_hz, config.snapshot_hz);
    let mut next_deadline = Instant::now() + tick_duration;

    loop {
        sleep_until(next_deadline).await;
        next_deadline += tick_duration;

        let mut guard = shared.lock().await;
        let inputs = guard.inputs.clone();
        guard.world.step(dt, &inputs);

        if guard.world.tick % broadcast_every == 0 {
            broadcast_snapshot(&mut guard);
        }
    }
}

/// Encodes the current snapshot once and queues it on every session. A
/// closed queue means the writer task already gave up on that socket, so
/// the session is torn down inline; the rest of the broadcast proceeds.
fn broadcast_snapshot(guard: &mut Shared) {
    if guard.sessions.is_empty() {
        return;
    }

    let msg = Message::Snapshot(guard.world.snapshot());
    let frame = match encode_message(&msg) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to encode snapshot: {}", e);
            return;
        }
    };

    let mut dead: Vec<u32> = Vec::new();
    for (&id, session) in guard.sessions.iter() {
        if session.send(frame.clone()).is_err() {
            dead.push(id);
        }
    }

    for id in dead {
        guard.sessions.remove(&id);
        guard.inputs.remove(&id);
        guard.world.remove_player(id);
    }
}
