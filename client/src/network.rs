use log::{debug, info, warn};
use shared::{
    decode_message, encode_message, InputState, LineBuffer, Message, Snapshot, PROTOCOL_VERSION,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

#[derive(Debug)]
pub enum ConnectError {
    Io(std::io::Error),
    /// Server speaks a different protocol version; connecting would only
    /// produce undefined behavior, so the client refuses before play.
    ProtocolMismatch {
        server: u32,
        client: u32,
    },
    /// The first record from the server was not a welcome.
    BadHandshake,
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectError::Io(e) => write!(f, "connection error: {}", e),
            ConnectError::ProtocolMismatch { server, client } => write!(
                f,
                "protocol mismatch: server speaks v{}, client speaks v{}",
                server, client
            ),
            ConnectError::BadHandshake => write!(f, "server did not send a welcome record"),
        }
    }
}

impl std::error::Error for ConnectError {}

impl From<std::io::Error> for ConnectError {
    fn from(e: std::io::Error) -> Self {
        ConnectError::Io(e)
    }
}

/// Connection handle. The background reader task keeps `snapshot`
/// updated with the newest full state; older snapshots are discarded.
pub struct NetworkClient {
    pub player_id: u32,
    pub world_w: f32,
    pub world_h: f32,
    write_half: OwnedWriteHalf,
    snapshot: Arc<Mutex<Option<Snapshot>>>,
    connected: Arc<AtomicBool>,
    seq: u32,
}

impl NetworkClient {
    /// Connects and completes the handshake. Fails fast on a protocol
    /// version mismatch rather than letting an incompatible session limp
    /// along.
    pub async fn connect(addr: &str) -> Result<Self, ConnectError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut read_half, write_half) = stream.into_split();

        let mut lines = LineBuffer::new();
        let welcome = read_record(&mut read_half, &mut lines).await?;
        let (protocol, player_id, world_w, world_h) = match welcome {
            Message::Welcome {
                protocol, id, w, h, ..
            } => (protocol, id, w, h),
            _ => return Err(ConnectError::BadHandshake),
        };

        if protocol != PROTOCOL_VERSION {
            return Err(ConnectError::ProtocolMismatch {
                server: protocol,
                client: PROTOCOL_VERSION,
            });
        }

        info!("Connected to {} as player {}", addr, player_id);

        let snapshot = Arc::new(Mutex::new(None));
        let connected = Arc::new(AtomicBool::new(true));
        tokio::spawn(snapshot_reader(
            read_half,
            lines,
            Arc::clone(&snapshot),
            Arc::clone(&connected),
        ));

        Ok(Self {
            player_id,
            world_w,
            world_h,
            write_half,
            snapshot,
            connected,
            seq: 0,
        })
    }

    /// Sends one input record with an auto-incremented sequence number.
    pub async fn send_input(&mut self, mut input: InputState) -> std::io::Result<()> {
        self.seq += 1;
        input.seq = self.seq;
        let frame = encode_message(&Message::Input(input))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        self.write_half.write_all(&frame).await
    }

    /// Newest snapshot received so far, if any.
    pub fn latest_snapshot(&self) -> Option<Snapshot> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

/// Reads frames until the first complete record is decoded. Buffered
/// bytes past the record stay in `lines` for the snapshot reader.
async fn read_record(
    read_half: &mut OwnedReadHalf,
    lines: &mut LineBuffer,
) -> Result<Message, ConnectError> {
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(frame) = lines.next_frame() {
            return decode_message(&frame).map_err(|_| ConnectError::BadHandshake);
        }
        let n = read_half.read(&mut chunk).await?;
        if n == 0 {
            return Err(ConnectError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed during handshake",
            )));
        }
        lines.push(&chunk[..n]);
    }
}

async fn snapshot_reader(
    mut read_half: OwnedReadHalf,
    mut lines: LineBuffer,
    snapshot: Arc<Mutex<Option<Snapshot>>>,
    connected: Arc<AtomicBool>,
) {
    let mut chunk = [0u8; 16384];
    loop {
        match read_half.read(&mut chunk).await {
            Ok(0) => {
                info!("Server closed the connection");
                break;
            }
            Ok(n) => {
                lines.push(&chunk[..n]);
                while let Some(frame) = lines.next_frame() {
                    match decode_message(&frame) {
                        Ok(Message::Snapshot(snap)) => {
                            if let Ok(mut guard) = snapshot.lock() {
                                *guard = Some(snap);
                            }
                        }
                        Ok(other) => debug!("Ignoring unexpected record: {:?}", other),
                        Err(e) => debug!("Dropping malformed frame: {}", e),
                    }
                }
            }
            Err(e) => {
                warn!("Read error: {}", e);
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
}
