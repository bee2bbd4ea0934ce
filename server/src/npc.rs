//! NPC tiers and the difficulty-scaled spawn policy.
//!
//! Behavior (movement, hits) is shared across tiers; everything that
//! differs per tier lives in a constant `TierSpec` record, so adding a
//! tier means adding a table entry, not a type.

use rand::Rng;
use shared::NpcView;

/// Best-score threshold where the tier weights shift toward heavier NPCs.
pub const TIER_SHIFT_SCORE: u32 = 40;
/// Best-score threshold that unlocks the Boss spawn override.
pub const BOSS_UNLOCK_SCORE: u32 = 120;
/// Per-spawn chance of a Boss once unlocked. This is a coin-flip override
/// applied before the weighted draw, not a fourth weighted option.
pub const BOSS_CHANCE: f64 = 0.15;

const WEIGHTS_EARLY: [f32; 3] = [0.55, 0.35, 0.10];
const WEIGHTS_LATE: [f32; 3] = [0.40, 0.35, 0.25];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Small,
    Medium,
    Large,
    Boss,
}

/// Per-tier constant overrides.
#[derive(Debug)]
pub struct TierSpec {
    pub radius: f32,
    pub speed_min: f32,
    pub speed_max: f32,
    pub points: u32,
    pub hp_max: i32,
    pub color: [u8; 3],
}

const SMALL: TierSpec = TierSpec {
    radius: 12.0,
    speed_min: 60.0,
    speed_max: 160.0,
    points: 1,
    hp_max: 1,
    color: [90, 200, 120],
};

const MEDIUM: TierSpec = TierSpec {
    radius: 18.0,
    speed_min: 45.0,
    speed_max: 120.0,
    points: 3,
    hp_max: 2,
    color: [230, 180, 60],
};

const LARGE: TierSpec = TierSpec {
    radius: 26.0,
    speed_min: 30.0,
    speed_max: 90.0,
    points: 6,
    hp_max: 4,
    color: [220, 90, 60],
};

const BOSS: TierSpec = TierSpec {
    radius: 36.0,
    speed_min: 25.0,
    speed_max: 70.0,
    points: 15,
    hp_max: 7,
    color: [180, 60, 220],
};

impl Tier {
    pub fn spec(self) -> &'static TierSpec {
        match self {
            Tier::Small => &SMALL,
            Tier::Medium => &MEDIUM,
            Tier::Large => &LARGE,
            Tier::Boss => &BOSS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Small => "small",
            Tier::Medium => "medium",
            Tier::Large => "large",
            Tier::Boss => "boss",
        }
    }
}

/// Picks a tier for the next spawn given the current best player score.
pub fn choose_tier(best_score: u32, rng: &mut impl Rng) -> Tier {
    if best_score >= BOSS_UNLOCK_SCORE && rng.gen_bool(BOSS_CHANCE) {
        return Tier::Boss;
    }

    let weights = if best_score >= TIER_SHIFT_SCORE {
        WEIGHTS_LATE
    } else {
        WEIGHTS_EARLY
    };

    let roll: f32 = rng.gen();
    if roll < weights[0] {
        Tier::Small
    } else if roll < weights[0] + weights[1] {
        Tier::Medium
    } else {
        Tier::Large
    }
}

fn velocity_component(spec: &TierSpec, rng: &mut impl Rng) -> f32 {
    let magnitude = rng.gen_range(spec.speed_min..=spec.speed_max);
    if rng.gen_bool(0.5) {
        magnitude
    } else {
        -magnitude
    }
}

#[derive(Debug, Clone)]
pub struct Npc {
    pub tier: Tier,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub hp: i32,
}

impl Npc {
    /// Spawns an NPC at the given position. Each velocity component is
    /// drawn independently from the tier's speed range with an
    /// independently randomized sign.
    pub fn spawn(tier: Tier, x: f32, y: f32, rng: &mut impl Rng) -> Self {
        let spec = tier.spec();
        let vx = velocity_component(spec, rng);
        let vy = velocity_component(spec, rng);
        Npc {
            tier,
            x,
            y,
            vx,
            vy,
            hp: spec.hp_max,
        }
    }

    pub fn radius(&self) -> f32 {
        self.tier.spec().radius
    }

    pub fn points(&self) -> u32 {
        self.tier.spec().points
    }

    /// Advances by velocity and reflects off world bounds: the center is
    /// clamped one radius inside and that velocity component inverted.
    pub fn advance(&mut self, dt: f32, world_w: f32, world_h: f32) {
        self.x += self.vx * dt;
        self.y += self.vy * dt;

        let r = self.radius();
        if self.x < r {
            self.x = r;
            self.vx = -self.vx;
        } else if self.x > world_w - r {
            self.x = world_w - r;
            self.vx = -self.vx;
        }
        if self.y < r {
            self.y = r;
            self.vy = -self.vy;
        } else if self.y > world_h - r {
            self.y = world_h - r;
            self.vy = -self.vy;
        }
    }

    /// Applies one hit. Returns true when this destroys the NPC.
    pub fn take_hit(&mut self) -> bool {
        self.hp = (self.hp - 1).max(0);
        self.hp == 0
    }

    pub fn view(&self) -> NpcView {
        let spec = self.tier.spec();
        NpcView {
            kind: self.tier.name().to_string(),
            x: self.x,
            y: self.y,
            vx: self.vx,
            vy: self.vy,
            radius: spec.radius,
            hp: self.hp,
            hp_max: spec.hp_max,
            color: spec.color,
            points: spec.points,
        }
    }
}
