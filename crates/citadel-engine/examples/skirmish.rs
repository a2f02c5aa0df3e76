//! Headless skirmish: two armies spawned from templates march on each other
//! across a field of walls, and a siege crew grinds the walls down.
//!
//! Run with: `cargo run --example skirmish [config.json]`
//! Set `RUST_LOG=citadel_engine=debug` for lifecycle logs.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use citadel_engine::prelude::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

const TICKS: u64 = 900;
const SQUAD: usize = 120;

#[derive(Debug, Clone, PartialEq)]
struct Army(u8);

/// Removes a little health from every destructible wall each tick.
#[derive(Default)]
struct SiegeCrew {
    targets: EntitySet,
}

impl System<EngineEcs> for SiegeCrew {
    fn add_entity(&mut self, _world: &World, handle: InstanceHandle) {
        self.targets.insert(handle);
    }
    fn remove_entity(&mut self, _world: &World, handle: InstanceHandle) {
        self.targets.remove(handle);
    }
    fn remove_all(&mut self) {
        self.targets.clear();
    }
    fn update(&mut self, ctx: &mut EngineEcs, dt: f32) {
        for wall in self.targets.iter() {
            if let Some(d) = ctx.try_get_component_mut::<Destructible>(wall) {
                d.health -= 2.0 * dt;
            }
        }
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn template(ecs: &mut EngineEcs, army: u8, shape: Shape, speed: f32) -> anyhow::Result<InstanceHandle> {
    let h = ecs.create_instance(Transform::IDENTITY, Aabb::from_half_extents(Vec3::splat(0.5)))?;
    ecs.create_component(h, Prototype)?;
    ecs.create_component(h, Army(army))?;
    ecs.create_component(h, Collider::dynamic(shape))?;
    let heading = if army == 0 { speed } else { -speed };
    ecs.create_component(h, Velocity(Vec2::new(heading, 0.0)))?;
    Ok(h)
}

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let mut ecs = EngineEcs::new(config)?;
    ecs.register_component::<Army>("army")?;
    ecs.register_motion()?;
    ecs.register_collision()?;
    let destructible = ecs.signature_of::<Destructible>()?;
    ecs.register_system("siege", SiegeCrew::default(), destructible)?;

    let static_hits = Rc::new(Cell::new(0usize));
    let dynamic_hits = Rc::new(Cell::new(0usize));
    let destroyed = Rc::new(Cell::new(0usize));
    {
        let counter = Rc::clone(&static_hits);
        ecs.subscribe(EventKind::StaticCollision, move |_| counter.set(counter.get() + 1));
        let counter = Rc::clone(&dynamic_hits);
        ecs.subscribe(EventKind::DynamicCollision, move |_| counter.set(counter.get() + 1));
        let counter = Rc::clone(&destroyed);
        ecs.subscribe(EventKind::InstanceDestroyed, move |_| counter.set(counter.get() + 1));
    }

    let mut rng = Pcg64::seed_from_u64(2024);
    for _ in 0..16 {
        let t = Transform::on_ground(rng.gen_range(-30.0..30.0), rng.gen_range(-60.0..60.0))
            .with_rotation(Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::PI)));
        let wall = ecs.create_instance(t, Aabb::from_half_extents(Vec3::new(4.0, 3.0, 4.0)))?;
        ecs.create_component(wall, Collider::fixed(Shape::rect(Vec2::new(4.0, 1.0))))?;
        if rng.gen_bool(0.5) {
            ecs.create_component(wall, Destructible { health: rng.gen_range(5.0..20.0) })?;
        }
    }

    let archers = template(&mut ecs, 0, Shape::circle(0.4), 5.0)?;
    let knights = template(&mut ecs, 1, Shape::rect(Vec2::splat(0.5)), 3.5)?;
    for _ in 0..SQUAD {
        let z = rng.gen_range(-60.0..60.0);
        ecs.instantiate(archers, Transform::on_ground(rng.gen_range(-90.0..-70.0), z))?;
        let z = rng.gen_range(-60.0..60.0);
        ecs.instantiate(knights, Transform::on_ground(rng.gen_range(70.0..90.0), z))?;
    }
    tracing::info!(instances = ecs.instance_count(), systems = ?ecs.system_names(), "field ready");

    let mut slowest = std::time::Duration::ZERO;
    for _ in 0..TICKS {
        let diagnostics = ecs.tick();
        slowest = slowest.max(diagnostics.total_time);
    }

    let resolver = ecs.system::<CollisionResolver>()?;
    println!("ticks:            {}", ecs.tick_count());
    println!("sim time:         {:.2}s", ecs.sim_time());
    println!("live instances:   {}", ecs.instance_count());
    println!("walls standing:   {}", resolver.statics().len());
    println!("static contacts:  {}", static_hits.get());
    println!("unit contacts:    {}", dynamic_hits.get());
    println!("destroyed:        {}", destroyed.get());
    println!("slowest tick:     {slowest:?}");
    println!("state digest:     {}", ecs.state_digest().to_hex());
    Ok(())
}
