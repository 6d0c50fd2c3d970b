use glam::Vec2;
use rigid_impulse::{Engine2, RigidBody, Shape};

fn main() {
    let mut engine = Engine2::new(Vec2::new(0.0, -10.0));

    let mut ground = RigidBody::new(Vec2::new(0.0, -0.5), false);
    ground.add_shape(Shape::rectangle(Vec2::ZERO, 40.0, 1.0));
    engine.add_body(ground);

    let ids: Vec<_> = (0..8)
        .map(|i| {
            let mut body = RigidBody::new(Vec2::new(0.0, 0.5 + i as f32 * 1.02), true);
            body.add_shape(Shape::rectangle(Vec2::ZERO, 1.0, 1.0));
            engine.add_body(body)
        })
        .collect();

    for _ in 0..300 {
        engine.run(1.0 / 60.0);
    }

    println!("stack after 5 seconds:");
    for (i, id) in ids.iter().enumerate() {
        if let Some(body) = engine.body(*id) {
            println!("  box {i}: {:?}", body.position.linear);
        }
    }
}
