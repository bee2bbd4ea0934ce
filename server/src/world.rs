//! The authoritative world simulation.
//!
//! All entity state lives here and is only ever mutated by `step`, which
//! runs once per fixed timestep with a snapshot of the latest inputs.
//! Tick order is deterministic for a given input snapshot: spawn policy,
//! NPC motion, player motion/firing, bullet motion, collision resolution.

use crate::npc::{choose_tier, Npc};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    circles_collide, BulletView, InputState, PlayerView, Snapshot, BULLET_MAX_LIFE, BULLET_RADIUS,
    BULLET_SPEED, COMBO_WINDOW, FIRE_RATE, MAX_MULTIPLIER, MUZZLE_OFFSET, PLAYER_MAX_HP,
    PLAYER_RADIUS, PLAYER_SPEED, SPAWN_EVERY, SPAWN_MARGIN, STREAK_STEP,
};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Player {
    pub x: f32,
    pub y: f32,
    pub angle: f32,
    pub radius: f32,
    pub hp: i32,
    pub score: u32,
    pub fire_cd: f32,
    streak: u32,
    last_kill_time: f32,
}

impl Player {
    fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            angle: 0.0,
            radius: PLAYER_RADIUS,
            hp: PLAYER_MAX_HP,
            score: 0,
            fire_cd: 0.0,
            streak: 0,
            last_kill_time: f32::NEG_INFINITY,
        }
    }

    /// Registers a destroyed NPC at `now` and returns the score credit
    /// multiplier for it. Kills inside the combo window extend the
    /// streak; otherwise the streak restarts at one.
    fn kill_credit(&mut self, now: f32) -> u32 {
        if now - self.last_kill_time > COMBO_WINDOW {
            self.streak = 1;
        } else {
            self.streak += 1;
        }
        self.last_kill_time = now;
        (1 + self.streak / STREAK_STEP).min(MAX_MULTIPLIER)
    }

    fn view(&self) -> PlayerView {
        PlayerView {
            x: self.x,
            y: self.y,
            angle: self.angle,
            hp: self.hp,
            score: self.score,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bullet {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub owner: u32,
    pub age: f32,
}

pub struct World {
    pub tick: u64,
    pub time: f32,
    pub width: f32,
    pub height: f32,
    pub players: HashMap<u32, Player>,
    pub bullets: Vec<Bullet>,
    pub npcs: Vec<Npc>,
    spawn_timer: f32,
    starting_npcs: usize,
    max_npcs: usize,
    rng: StdRng,
}

impl World {
    pub fn new(width: f32, height: f32, starting_npcs: usize, max_npcs: usize) -> Self {
        Self::with_rng(width, height, starting_npcs, max_npcs, StdRng::from_entropy())
    }

    /// Deterministic construction for tests.
    pub fn seeded(width: f32, height: f32, starting_npcs: usize, max_npcs: usize, seed: u64) -> Self {
        Self::with_rng(
            width,
            height,
            starting_npcs,
            max_npcs,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(width: f32, height: f32, starting_npcs: usize, max_npcs: usize, rng: StdRng) -> Self {
        Self {
            tick: 0,
            time: 0.0,
            width,
            height,
            players: HashMap::new(),
            bullets: Vec::new(),
            npcs: Vec::new(),
            spawn_timer: 0.0,
            starting_npcs,
            max_npcs,
            rng,
        }
    }

    pub fn add_player(&mut self, id: u32) {
        // Spawn near center, offset per id so joiners do not stack.
        let x = self.width * 0.5 + (id % 5) as f32 * 30.0;
        let y = self.height * 0.5 + ((id / 5) % 5) as f32 * 30.0;
        self.players.insert(id, Player::new(x, y));
        info!("Added player {} at ({:.0}, {:.0})", id, x, y);

        // Populate the arena once the first player arrives.
        if self.players.len() == 1 && self.npcs.is_empty() {
            for _ in 0..self.starting_npcs {
                self.spawn_npc();
            }
        }
    }

    /// Removes the player and every bullet it owns; nothing else changes.
    pub fn remove_player(&mut self, id: u32) {
        if self.players.remove(&id).is_some() {
            self.bullets.retain(|b| b.owner != id);
            info!("Removed player {}", id);
        }
    }

    pub fn best_score(&self) -> u32 {
        self.players.values().map(|p| p.score).max().unwrap_or(0)
    }

    fn spawn_npc(&mut self) {
        if self.npcs.len() >= self.max_npcs {
            return;
        }

        let x = self.rng.gen_range(SPAWN_MARGIN..=self.width - SPAWN_MARGIN);
        let y = self.rng.gen_range(SPAWN_MARGIN..=self.height - SPAWN_MARGIN);
        let best = self.best_score();
        let tier = choose_tier(best, &mut self.rng);
        let npc = Npc::spawn(tier, x, y, &mut self.rng);
        debug!("Spawned {} npc at ({:.0}, {:.0})", tier.name(), x, y);
        self.npcs.push(npc);
    }

    /// Advances the world one fixed timestep using a snapshot of the
    /// latest inputs. Players without an entry use the neutral input.
    pub fn step(&mut self, dt: f32, inputs: &HashMap<u32, InputState>) {
        self.tick += 1;
        self.time += dt;

        // 1. Spawn policy.
        self.spawn_timer += dt;
        if self.spawn_timer >= SPAWN_EVERY && self.npcs.len() < self.max_npcs {
            self.spawn_npc();
            self.spawn_timer = 0.0;
        }

        // 2. NPC motion with boundary reflection.
        let (w, h) = (self.width, self.height);
        for npc in &mut self.npcs {
            npc.advance(dt, w, h);
        }

        // 3. Player motion, aim, and firing.
        let neutral = InputState::default();
        let mut fired: Vec<Bullet> = Vec::new();
        for (&id, p) in self.players.iter_mut() {
            let inp = inputs.get(&id).unwrap_or(&neutral);
            p.angle = inp.angle;

            let dx = (inp.right as i32 - inp.left as i32) as f32;
            let dy = (inp.down as i32 - inp.up as i32) as f32;
            if dx != 0.0 || dy != 0.0 {
                // Unit-normalize so diagonals match axis-aligned speed.
                let len = (dx * dx + dy * dy).sqrt();
                p.x += dx / len * PLAYER_SPEED * dt;
                p.y += dy / len * PLAYER_SPEED * dt;
                p.x = p.x.clamp(p.radius, w - p.radius);
                p.y = p.y.clamp(p.radius, h - p.radius);
            }

            p.fire_cd = (p.fire_cd - dt).max(0.0);
            if inp.shoot && p.fire_cd == 0.0 {
                let (fx, fy) = (p.angle.cos(), p.angle.sin());
                let dist = p.radius + MUZZLE_OFFSET;
                fired.push(Bullet {
                    x: p.x + fx * dist,
                    y: p.y + fy * dist,
                    vx: fx * BULLET_SPEED,
                    vy: fy * BULLET_SPEED,
                    owner: id,
                    age: 0.0,
                });
                p.fire_cd = FIRE_RATE;
            }
        }
        self.bullets.extend(fired);

        // 4. Bullet motion, aging, pruning.
        for b in &mut self.bullets {
            b.x += b.vx * dt;
            b.y += b.vy * dt;
            b.age += dt;
        }
        self.bullets.retain(|b| {
            b.age < BULLET_MAX_LIFE
                && b.x >= -BULLET_RADIUS
                && b.x <= w + BULLET_RADIUS
                && b.y >= -BULLET_RADIUS
                && b.y <= h + BULLET_RADIUS
        });

        // 5. Bullet vs NPC collisions.
        self.resolve_collisions();
    }

    /// One collision pass per tick. For each NPC the first intersecting
    /// bullet in collection order is consumed and deals one hit; an NPC
    /// takes at most one hit per tick and a bullet damages at most one
    /// NPC. Consumed bullets are removed afterwards.
    fn resolve_collisions(&mut self) {
        let mut consumed = vec![false; self.bullets.len()];
        let mut surviving = Vec::with_capacity(self.npcs.len());

        for mut npc in self.npcs.drain(..) {
            let mut destroyed = false;
            for (j, b) in self.bullets.iter().enumerate() {
                if consumed[j] {
                    continue;
                }
                if !circles_collide(npc.x, npc.y, npc.radius(), b.x, b.y, BULLET_RADIUS) {
                    continue;
                }

                consumed[j] = true;
                destroyed = npc.take_hit();
                if destroyed {
                    if let Some(owner) = self.players.get_mut(&b.owner) {
                        let credit = owner.kill_credit(self.time);
                        let gained = npc.points() * credit;
                        owner.score += gained;
                        debug!(
                            "Player {} destroyed {} npc for {} points (x{})",
                            b.owner,
                            npc.tier.name(),
                            gained,
                            credit
                        );
                    }
                }
                break;
            }

            if !destroyed {
                surviving.push(npc);
            }
        }
        self.npcs = surviving;

        let mut idx = 0;
        self.bullets.retain(|_| {
            let keep = !consumed[idx];
            idx += 1;
            keep
        });
    }

    /// Full-state snapshot of every entity for broadcast.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tick: self.tick,
            players: self.players.iter().map(|(id, p)| (*id, p.view())).collect(),
            bullets: self
                .bullets
                .iter()
                .map(|b| BulletView {
                    x: b.x,
                    y: b.y,
                    vx: b.vx,
                    vy: b.vy,
                    owner: b.owner,
                })
                .collect(),
            npcs: self.npcs.iter().map(Npc::view).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npc::Tier;
    use assert_approx_eq::assert_approx_eq;

    const DT: f32 = 1.0 / 60.0;

    fn empty_world() -> World {
        World::seeded(1000.0, 600.0, 0, 0, 42)
    }

    fn input(up: bool, down: bool, left: bool, right: bool, shoot: bool, angle: f32) -> InputState {
        InputState {
            seq: 0,
            up,
            down,
            left,
            right,
            shoot,
            angle,
        }
    }

    fn place_npc(world: &mut World, tier: Tier, x: f32, y: f32, hp: i32) {
        world.npcs.push(Npc {
            tier,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            hp,
        });
    }

    fn place_bullet(world: &mut World, x: f32, y: f32, owner: u32) {
        world.bullets.push(Bullet {
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            owner,
            age: 0.0,
        });
    }

    #[test]
    fn test_diagonal_movement_is_normalized() {
        let mut world = empty_world();
        world.add_player(1);
        let (x0, y0) = {
            let p = &world.players[&1];
            (p.x, p.y)
        };

        let mut inputs = HashMap::new();
        inputs.insert(1, input(false, true, false, true, false, 0.0));
        world.step(DT, &inputs);

        let p = &world.players[&1];
        let moved = ((p.x - x0).powi(2) + (p.y - y0).powi(2)).sqrt();
        assert_approx_eq!(moved, PLAYER_SPEED * DT, 1e-3);
    }

    #[test]
    fn test_player_clamped_to_bounds_inset_by_radius() {
        let mut world = empty_world();
        world.add_player(1);
        world.players.get_mut(&1).unwrap().x = 20.0;

        let mut inputs = HashMap::new();
        inputs.insert(1, input(false, false, true, false, false, 0.0));
        for _ in 0..60 {
            world.step(DT, &inputs);
        }

        assert_eq!(world.players[&1].x, PLAYER_RADIUS);
    }

    #[test]
    fn test_fire_spawns_owned_bullet_with_cooldown() {
        let mut world = empty_world();
        world.add_player(1);

        let mut inputs = HashMap::new();
        inputs.insert(1, input(false, false, false, false, true, 0.0));
        world.step(DT, &inputs);

        assert_eq!(world.bullets.len(), 1);
        let b = &world.bullets[0];
        assert_eq!(b.owner, 1);
        assert_approx_eq!(b.vx, BULLET_SPEED, 1e-3);
        assert_approx_eq!(b.vy, 0.0, 1e-3);

        // Holding fire through the cooldown must not spawn another.
        world.step(DT, &inputs);
        assert_eq!(world.bullets.len(), 1);

        // After the cooldown elapses the next shot goes out.
        let cooldown_ticks = (FIRE_RATE / DT).ceil() as u32 + 1;
        for _ in 0..cooldown_ticks {
            world.step(DT, &inputs);
        }
        assert_eq!(world.bullets.len(), 2);
    }

    #[test]
    fn test_bullet_spawns_at_muzzle_offset() {
        let mut world = empty_world();
        world.add_player(1);
        let px = world.players[&1].x;

        let mut inputs = HashMap::new();
        inputs.insert(1, input(false, false, false, false, true, 0.0));
        world.step(DT, &inputs);

        // One tick of travel on top of the muzzle offset.
        let expected = px + PLAYER_RADIUS + MUZZLE_OFFSET + BULLET_SPEED * DT;
        assert_approx_eq!(world.bullets[0].x, expected, 1e-3);
    }

    #[test]
    fn test_bullet_pruned_on_lifetime_regardless_of_position() {
        let mut world = empty_world();
        world.add_player(1);
        // Stationary bullet mid-world: only the age can kill it.
        place_bullet(&mut world, 500.0, 300.0, 1);

        let inputs = HashMap::new();
        let ticks_to_expire = (BULLET_MAX_LIFE / DT).ceil() as u32;
        // Stay clear of the exact expiry tick: accumulated f32 age can
        // land a hair on either side of the threshold.
        for _ in 0..ticks_to_expire - 3 {
            world.step(DT, &inputs);
            assert_eq!(world.bullets.len(), 1);
        }
        for _ in 0..6 {
            world.step(DT, &inputs);
        }
        assert!(world.bullets.is_empty());
    }

    #[test]
    fn test_bullet_pruned_when_out_of_bounds() {
        let mut world = empty_world();
        world.add_player(1);
        world.bullets.push(Bullet {
            x: 990.0,
            y: 300.0,
            vx: BULLET_SPEED,
            vy: 0.0,
            owner: 1,
            age: 0.0,
        });

        let inputs = HashMap::new();
        for _ in 0..5 {
            world.step(DT, &inputs);
        }
        assert!(world.bullets.is_empty());
    }

    #[test]
    fn test_bullet_expiry_scenario_after_max_lifetime() {
        let mut world = empty_world();
        world.add_player(1);
        world.add_player(2);

        let mut inputs = HashMap::new();
        inputs.insert(1, input(false, false, false, false, true, 0.0));
        world.step(DT, &inputs);
        assert!(world.bullets.iter().any(|b| b.owner == 1));

        inputs.insert(1, input(false, false, false, false, false, 0.0));
        let mut elapsed = DT;
        while elapsed < BULLET_MAX_LIFE + 0.1 {
            world.step(DT, &inputs);
            elapsed += DT;
        }
        assert!(world.bullets.is_empty());
    }

    #[test]
    fn test_kill_awards_points_on_hp_transition_only() {
        let mut world = empty_world();
        world.add_player(1);
        place_npc(&mut world, Tier::Medium, 800.0, 300.0, 2);
        place_bullet(&mut world, 800.0, 300.0, 1);

        let inputs = HashMap::new();
        world.step(DT, &inputs);

        // First hit wounds but does not destroy: no score yet.
        assert_eq!(world.players[&1].score, 0);
        assert_eq!(world.npcs.len(), 1);
        assert_eq!(world.npcs[0].hp, 1);
        assert!(world.bullets.is_empty());

        let (nx, ny) = (world.npcs[0].x, world.npcs[0].y);
        place_bullet(&mut world, nx, ny, 1);
        world.step(DT, &inputs);

        assert!(world.npcs.is_empty());
        assert_eq!(world.players[&1].score, Tier::Medium.spec().points);
    }

    #[test]
    fn test_one_bullet_damages_at_most_one_npc_per_tick() {
        let mut world = empty_world();
        world.add_player(1);
        // Two overlapping small NPCs, one bullet covering both.
        place_npc(&mut world, Tier::Small, 400.0, 300.0, 1);
        place_npc(&mut world, Tier::Small, 405.0, 300.0, 1);
        place_bullet(&mut world, 402.0, 300.0, 1);

        let inputs = HashMap::new();
        world.step(DT, &inputs);

        // The single bullet destroys the first NPC in iteration order only.
        assert_eq!(world.npcs.len(), 1);
        assert_eq!(world.players[&1].score, Tier::Small.spec().points);
    }

    #[test]
    fn test_npc_takes_at_most_one_hit_per_tick() {
        let mut world = empty_world();
        world.add_player(1);
        place_npc(&mut world, Tier::Large, 400.0, 300.0, 4);
        place_bullet(&mut world, 400.0, 300.0, 1);
        place_bullet(&mut world, 401.0, 300.0, 1);

        let inputs = HashMap::new();
        world.step(DT, &inputs);

        // One bullet consumed, one hit applied; the second bullet remains
        // and can still strike another NPC this tick.
        assert_eq!(world.npcs[0].hp, 3);
        assert_eq!(world.bullets.len(), 1);
    }

    #[test]
    fn test_leftover_bullet_still_scans_other_npcs_same_tick() {
        let mut world = empty_world();
        world.add_player(1);
        place_npc(&mut world, Tier::Small, 400.0, 300.0, 1);
        place_npc(&mut world, Tier::Small, 404.0, 300.0, 1);
        place_bullet(&mut world, 400.0, 300.0, 1);
        place_bullet(&mut world, 404.0, 300.0, 1);

        let inputs = HashMap::new();
        world.step(DT, &inputs);

        assert!(world.npcs.is_empty());
        assert!(world.bullets.is_empty());
        assert_eq!(world.players[&1].score, 2 * Tier::Small.spec().points);
    }

    #[test]
    fn test_boss_destroyed_exactly_on_seventh_hit() {
        let mut world = empty_world();
        world.add_player(1);
        place_npc(&mut world, Tier::Boss, 500.0, 300.0, 7);

        let inputs = HashMap::new();
        for hit in 1..=6 {
            let (nx, ny) = (world.npcs[0].x, world.npcs[0].y);
            place_bullet(&mut world, nx, ny, 1);
            world.step(DT, &inputs);
            assert_eq!(world.npcs.len(), 1, "destroyed early on hit {}", hit);
            assert_eq!(world.npcs[0].hp, 7 - hit);
        }

        let (nx, ny) = (world.npcs[0].x, world.npcs[0].y);
        place_bullet(&mut world, nx, ny, 1);
        world.step(DT, &inputs);
        assert!(world.npcs.is_empty());
    }

    #[test]
    fn test_streak_multiplies_kill_credit() {
        let mut world = empty_world();
        world.add_player(1);
        let inputs = HashMap::new();

        // Five quick kills: the fifth lifts the streak past the step, so
        // it pays double points.
        for _ in 0..5 {
            place_npc(&mut world, Tier::Small, 300.0, 300.0, 1);
            place_bullet(&mut world, 300.0, 300.0, 1);
            world.step(DT, &inputs);
        }

        let points = Tier::Small.spec().points;
        assert_eq!(world.players[&1].score, 4 * points + 2 * points);
    }

    #[test]
    fn test_streak_resets_outside_combo_window() {
        let mut world = empty_world();
        world.add_player(1);
        let inputs = HashMap::new();

        place_npc(&mut world, Tier::Small, 300.0, 300.0, 1);
        place_bullet(&mut world, 300.0, 300.0, 1);
        world.step(DT, &inputs);

        // Let the combo window lapse.
        let idle_ticks = (COMBO_WINDOW / DT).ceil() as u32 + 2;
        for _ in 0..idle_ticks {
            world.step(DT, &inputs);
        }

        place_npc(&mut world, Tier::Small, 300.0, 300.0, 1);
        place_bullet(&mut world, 300.0, 300.0, 1);
        world.step(DT, &inputs);

        // Both kills at streak 1: plain point value each.
        assert_eq!(world.players[&1].score, 2 * Tier::Small.spec().points);
    }

    #[test]
    fn test_remove_player_removes_only_its_bullets() {
        let mut world = empty_world();
        world.add_player(1);
        world.add_player(2);
        place_bullet(&mut world, 100.0, 100.0, 1);
        place_bullet(&mut world, 200.0, 100.0, 1);
        place_bullet(&mut world, 300.0, 100.0, 2);
        place_npc(&mut world, Tier::Small, 900.0, 500.0, 1);

        world.remove_player(1);

        assert!(!world.players.contains_key(&1));
        assert!(world.players.contains_key(&2));
        assert_eq!(world.bullets.len(), 1);
        assert_eq!(world.bullets[0].owner, 2);
        assert_eq!(world.npcs.len(), 1);
    }

    #[test]
    fn test_npc_cap_is_respected() {
        let mut world = World::seeded(1000.0, 600.0, 5, 8, 99);
        world.add_player(1);
        assert_eq!(world.npcs.len(), 5);

        let inputs = HashMap::new();
        // Far more ticks than needed to reach the cap at one spawn per
        // interval.
        let ticks = (SPAWN_EVERY / DT).ceil() as u32 * 20;
        for _ in 0..ticks {
            world.step(DT, &inputs);
        }
        assert_eq!(world.npcs.len(), 8);
    }

    #[test]
    fn test_spawned_npcs_inside_margin() {
        let mut world = World::seeded(1000.0, 600.0, 30, 40, 7);
        world.add_player(1);

        for npc in &world.npcs {
            assert!(npc.x >= SPAWN_MARGIN && npc.x <= 1000.0 - SPAWN_MARGIN);
            assert!(npc.y >= SPAWN_MARGIN && npc.y <= 600.0 - SPAWN_MARGIN);
        }
    }

    #[test]
    fn test_tick_counter_is_monotonic() {
        let mut world = empty_world();
        world.add_player(1);
        let inputs = HashMap::new();

        let mut last = world.tick;
        for _ in 0..10 {
            world.step(DT, &inputs);
            assert_eq!(world.tick, last + 1);
            last = world.tick;
        }
    }

    #[test]
    fn test_missing_input_means_neutral() {
        let mut world = empty_world();
        world.add_player(1);
        let (x0, y0) = {
            let p = &world.players[&1];
            (p.x, p.y)
        };

        let inputs = HashMap::new();
        world.step(DT, &inputs);

        let p = &world.players[&1];
        assert_eq!((p.x, p.y), (x0, y0));
        assert!(world.bullets.is_empty());
    }

    #[test]
    fn test_snapshot_reflects_world_state() {
        let mut world = empty_world();
        world.add_player(1);
        place_npc(&mut world, Tier::Boss, 500.0, 300.0, 7);
        place_bullet(&mut world, 100.0, 100.0, 1);

        let snap = world.snapshot();
        assert_eq!(snap.tick, world.tick);
        assert_eq!(snap.players.len(), 1);
        assert_eq!(snap.bullets.len(), 1);
        assert_eq!(snap.bullets[0].owner, 1);
        assert_eq!(snap.npcs.len(), 1);
        assert_eq!(snap.npcs[0].kind, "boss");
        assert_eq!(snap.npcs[0].hp_max, 7);
        assert_eq!(snap.npcs[0].points, Tier::Boss.spec().points);
    }
}
