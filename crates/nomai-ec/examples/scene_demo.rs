//! Small scene showing a renderer-style observer reacting to component
//! lifecycle events.
//!
//! Run with `RUST_LOG=nomai_ec=trace cargo run -p nomai-ec --example scene_demo`
//! to see the registry's own trace output.

use std::cell::RefCell;
use std::rc::Rc;

use nomai_ec::prelude::*;

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Transform {
    x: f32,
    y: f32,
}
impl Component for Transform {}

#[derive(Debug)]
struct Velocity {
    dx: f32,
    dy: f32,
}
impl Component for Velocity {
    fn priority(&self) -> i32 {
        -10
    }
}

/// Display object handle. Resolves its owner through the binding context.
#[derive(Debug)]
struct Sprite {
    texture: &'static str,
    owner: Option<EntityId>,
}
impl Component for Sprite {
    fn priority(&self) -> i32 {
        100
    }

    fn destroy(&mut self) {
        tracing::info!(texture = self.texture, owner = ?self.owner, "sprite released");
    }
}

impl Sprite {
    fn new(texture: &'static str) -> Self {
        Self {
            texture,
            owner: current_entity().map(|e| e.id()),
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer stand-in
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Renderer {
    display_list: RefCell<Vec<(EntityId, &'static str)>>,
}

impl Renderer {
    fn observe(self: &Rc<Self>, entity: &Entity) {
        let renderer = Rc::clone(self);
        entity.components().on(EventKind::Add, move |event| {
            if let Some(sprite) = event.component().and_then(|c| c.downcast::<Sprite>()) {
                let texture = sprite.borrow().texture;
                renderer
                    .display_list
                    .borrow_mut()
                    .push((sprite.entity_id(), texture));
            }
        });
        let renderer = Rc::clone(self);
        entity.components().on(EventKind::Remove, move |event| {
            if let Some(c) = event.component().filter(|c| c.is::<Sprite>()) {
                let owner = c.entity_id();
                renderer
                    .display_list
                    .borrow_mut()
                    .retain(|(id, _)| *id != owner);
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Scene setup
// ---------------------------------------------------------------------------

const CONFIG: &str = r#"{ "clear_policy": "destroy_each" }"#;

fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config: ComponentSystemConfig = serde_json::from_str(CONFIG)?;
    let mut entities = EntitySet::with_config(config);
    let renderer = Rc::new(Renderer::default());

    let textures = ["ship.png", "rock.png", "rock.png", "star.png"];
    for (i, &texture) in textures.iter().enumerate() {
        let e = entities.spawn();
        renderer.observe(&e);
        e.add(|| Transform {
            x: i as f32 * 10.0,
            y: 0.0,
        })?;
        if texture != "star.png" {
            e.add(|| Velocity { dx: 1.0, dy: 0.5 })?;
        }
        e.add(|| Sprite::new(texture))?;
    }

    // One frame of host-driven movement.
    for e in entities.query().with_all::<(Transform, Velocity)>().all() {
        let (t, v) = (e.get::<Transform>()?, e.get::<Velocity>()?);
        let v = v.borrow();
        let mut t = t.borrow_mut();
        t.x += v.dx;
        t.y += v.dy;
    }

    for e in &entities {
        let order: Vec<&str> = e.components().all().iter().map(|c| c.type_name()).collect();
        tracing::info!(entity = %e.id(), ?order, "component order");
    }

    let still = entities.query().without::<Velocity>().count();
    tracing::info!(still, displayed = renderer.display_list.borrow().len(), "frame done");

    let rock = entities
        .query()
        .with_where::<Sprite>(|s| s.texture == "rock.png")
        .first();
    if let Some(rock) = rock {
        entities.despawn(rock.id());
    }
    tracing::info!(
        entities = entities.len(),
        displayed = renderer.display_list.borrow().len(),
        "rock despawned"
    );

    // The configured destroy_each policy releases the star's sprite. Clear
    // publishes no events, so the renderer keeps its display entry.
    if let Some(star) = entities.query().without::<Velocity>().first() {
        star.components().clear();
        tracing::info!(
            entity = %star.id(),
            components = star.components().len(),
            displayed = renderer.display_list.borrow().len(),
            "star cleared"
        );
    }

    entities.clear();
    Ok(())
}
