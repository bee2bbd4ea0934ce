use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const PROTOCOL_VERSION: u32 = 1;

pub const TICK_HZ: u32 = 60;
pub const SNAPSHOT_HZ: u32 = 20;
pub const WORLD_WIDTH: f32 = 1000.0;
pub const WORLD_HEIGHT: f32 = 600.0;

pub const PLAYER_SPEED: f32 = 260.0;
pub const PLAYER_RADIUS: f32 = 15.0;
pub const PLAYER_MAX_HP: i32 = 100;
pub const FIRE_RATE: f32 = 0.18;

pub const BULLET_SPEED: f32 = 420.0;
pub const BULLET_RADIUS: f32 = 4.0;
pub const BULLET_MAX_LIFE: f32 = 2.5;
pub const MUZZLE_OFFSET: f32 = 6.0;

pub const SPAWN_EVERY: f32 = 2.0;
pub const SPAWN_MARGIN: f32 = 40.0;
pub const STARTING_NPCS: usize = 5;
pub const MAX_NPCS: usize = 40;

pub const COMBO_WINDOW: f32 = 1.25;
pub const STREAK_STEP: u32 = 5;
pub const MAX_MULTIPLIER: u32 = 6;

/// Latest movement/aim/fire intent for one player. The server keeps only
/// the most recent value per connection; `seq` is client-assigned and
/// used for diagnostics only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputState {
    pub seq: u32,
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub shoot: bool,
    pub angle: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub hp: i32,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulletView {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub owner: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NpcView {
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub hp: i32,
    pub hp_max: i32,
    pub color: [u8; 3],
    pub points: u32,
}

/// Complete world state as broadcast every snapshot interval. Full state,
/// not a delta: a receiver that misses snapshots resynchronizes on the
/// next one it sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    #[serde(deserialize_with = "players_from_string_keys")]
    pub players: HashMap<u32, PlayerView>,
    pub bullets: Vec<BulletView>,
    pub npcs: Vec<NpcView>,
}

/// JSON object keys are strings, and the internally tagged `Message`
/// enum buffers them as strings before this struct sees them, so the
/// numeric player ids must be parsed back explicitly on decode.
fn players_from_string_keys<'de, D>(de: D) -> Result<HashMap<u32, PlayerView>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, PlayerView>::deserialize(de)?;
    raw.into_iter()
        .map(|(k, v)| k.parse::<u32>().map(|k| (k, v)))
        .collect::<Result<_, _>>()
        .map_err(serde::de::Error::custom)
}

/// Wire message, one JSON record per newline-delimited frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    Welcome {
        protocol: u32,
        id: u32,
        tick_hz: u32,
        snapshot_hz: u32,
        w: f32,
        h: f32,
    },
    Input(InputState),
    Snapshot(Snapshot),
}

/// Reassembles newline-delimited frames from a byte stream. A read may
/// carry zero, one, or many complete records plus a partial tail, which
/// stays buffered for the next read.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next complete frame without its trailing newline, or None while
    /// only a partial record remains. Empty lines are skipped.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        loop {
            let idx = self.buf.iter().position(|&b| b == b'\n')?;
            let mut line: Vec<u8> = self.buf.drain(..=idx).collect();
            line.pop();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }
}

/// Serializes a message as one newline-terminated JSON frame.
pub fn encode_message(msg: &Message) -> serde_json::Result<Vec<u8>> {
    let mut data = serde_json::to_vec(msg)?;
    data.push(b'\n');
    Ok(data)
}

pub fn decode_message(frame: &[u8]) -> serde_json::Result<Message> {
    serde_json::from_slice(frame)
}

/// Circle intersection via squared-distance comparison (no square root).
pub fn circles_collide(x1: f32, y1: f32, r1: f32, x2: f32, y2: f32, r2: f32) -> bool {
    let dx = x1 - x2;
    let dy = y1 - y2;
    let r = r1 + r2;
    dx * dx + dy * dy <= r * r
}

/// Ticks between snapshot broadcasts for the given rates.
pub fn snapshot_interval(tick_hz: u32, snapshot_hz: u32) -> u64 {
    ((tick_hz as f32 / snapshot_hz as f32).round() as u64).max(1)
}
