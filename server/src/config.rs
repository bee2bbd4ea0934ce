use shared::{MAX_NPCS, SNAPSHOT_HZ, STARTING_NPCS, TICK_HZ, WORLD_HEIGHT, WORLD_WIDTH};

/// Fixed server configuration. Built once at startup and treated as
/// immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    /// Simulation rate in ticks per second.
    pub tick_hz: u32,
    /// Snapshot broadcast rate per second.
    pub snapshot_hz: u32,
    pub world_w: f32,
    pub world_h: f32,
    /// NPCs spawned when the first player joins an empty world.
    pub starting_npcs: usize,
    /// Hard cap on concurrent NPCs.
    pub max_npcs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_hz: TICK_HZ,
            snapshot_hz: SNAPSHOT_HZ,
            world_w: WORLD_WIDTH,
            world_h: WORLD_HEIGHT,
            starting_npcs: STARTING_NPCS,
            max_npcs: MAX_NPCS,
        }
    }
}
