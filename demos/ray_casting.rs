use glam::Vec3;
use rigid_impulse::{Ball, Engine3, RigidBody, Shape};

fn main() {
    let mut engine = Engine3::new(Vec3::new(0.0, -10.0, 0.0));

    for i in 0..5 {
        let mut body = RigidBody::new(Vec3::new(2.0 + i as f32 * 2.0, 0.0, 0.0), false);
        body.add_shape(Shape::Ball(Ball::new(Vec3::ZERO, 0.5)));
        engine.add_body(body);
    }

    match engine.raycast(Vec3::ZERO, Vec3::X) {
        Some(hit) => println!(
            "hit body {:?} at distance {:.2}",
            hit.body, hit.distance
        ),
        None => println!("no hit"),
    }
}
