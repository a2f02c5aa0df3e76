//! Fixed-timestep driving of the [`EngineEcs`].
//!
//! Each [`update`](EngineEcs::update):
//!
//! 1. Runs every system in registration order. A system is checked out of
//!    the registry for its own update, so it may freely create, destroy or
//!    re-component instances through the facade.
//! 2. After each system is checked back in, moves made while the collision
//!    resolver was busy reach its grids, then destroys queued with
//!    [`queue_destroy`](EngineEcs::queue_destroy) are flushed.
//!
//! [`tick`](EngineEcs::tick) wraps `update` with the configured fixed dt and
//! advances the tick counter. With fixed system order, ordered member sets and
//! seeded randomness, the same inputs reproduce the same
//! [`state_digest`](EngineEcs::state_digest) on every run.
//!
//! # Example
//!
//! ```
//! use citadel_engine::prelude::*;
//!
//! let mut ecs = EngineEcs::new(EngineConfig::default()).unwrap();
//! ecs.register_motion().unwrap();
//!
//! let unit = ecs.create_instance(Transform::IDENTITY, Aabb::point()).unwrap();
//! ecs.create_component(unit, Velocity(Vec2::new(6.0, 0.0))).unwrap();
//!
//! ecs.run_ticks(10);
//! assert_eq!(ecs.tick_count(), 10);
//! assert!((ecs.instance(unit).unwrap().transform.translation.x - 1.0).abs() < 1e-4);
//! ```

use std::time::{Duration, Instant};

use crate::facade::EngineEcs;

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing and bookkeeping for one update.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system, in execution order.
    pub system_times: Vec<(&'static str, Duration)>,
    pub total_time: Duration,
    /// Instances destroyed from the deferred queue.
    pub destroyed: usize,
}

impl TickDiagnostics {
    pub fn time_of(&self, system: &str) -> Option<Duration> {
        self.system_times
            .iter()
            .find(|(name, _)| *name == system)
            .map(|(_, time)| *time)
    }
}

// ---------------------------------------------------------------------------
// Driving
// ---------------------------------------------------------------------------

impl EngineEcs {
    /// Run every system once with `dt` seconds.
    pub fn update(&mut self, dt: f32) -> TickDiagnostics {
        let start = Instant::now();
        let mut diagnostics = TickDiagnostics {
            system_times: Vec::with_capacity(self.systems.len()),
            ..TickDiagnostics::default()
        };

        // Destroys queued outside any update go first.
        diagnostics.destroyed += self.flush_destroys();

        for index in 0..self.systems.len() {
            let name = self.systems.name_at(index).unwrap_or("unnamed");
            let Some(mut system) = self.systems.check_out(index) else {
                tracing::warn!(system = name, "system already checked out, skipped");
                continue;
            };
            let system_start = Instant::now();
            system.update(self, dt);
            self.systems.check_in(&self.world, index, system);
            self.flush_moves();
            diagnostics.destroyed += self.flush_destroys();
            diagnostics.system_times.push((name, system_start.elapsed()));
        }

        diagnostics.total_time = start.elapsed();
        diagnostics
    }

    /// One fixed step of `config.fixed_dt` seconds.
    pub fn tick(&mut self) -> TickDiagnostics {
        let diagnostics = self.update(self.config.fixed_dt);
        self.tick_counter += 1;
        diagnostics
    }

    /// Run `count` fixed steps. Returns the diagnostics of the last one.
    pub fn run_ticks(&mut self, count: u64) -> TickDiagnostics {
        let mut last = TickDiagnostics::default();
        for _ in 0..count {
            last = self.tick();
        }
        last
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// Simulated seconds, computed from the tick count rather than
    /// accumulated.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * f64::from(self.config.fixed_dt)
    }

    pub fn fixed_dt(&self) -> f32 {
        self.config.fixed_dt
    }

    /// BLAKE3 digest of every live instance's handle, pose and signature, in
    /// handle order.
    ///
    /// Two runs that agree on this digest after the same tick agree on every
    /// pose and component set.
    pub fn state_digest(&self) -> blake3::Hash {
        let mut handles = self.world.pool().live_handles().to_vec();
        handles.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.tick_counter.to_le_bytes());
        for handle in handles {
            let Some(instance) = self.world.try_instance(handle) else {
                continue;
            };
            let t = &instance.transform;
            hasher.update(&handle.to_raw().to_le_bytes());
            for value in t
                .translation
                .to_array()
                .into_iter()
                .chain(t.rotation.to_array())
                .chain(t.scale.to_array())
            {
                hasher.update(&value.to_le_bytes());
            }
            hasher.update(&instance.signature().bits().to_le_bytes());
        }
        hasher.finalize()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
