use glam::Vec2;
use rigid_impulse::{Ball, Engine2, RigidBody, Shape};

fn main() {
    let mut engine = Engine2::new(Vec2::new(0.0, -10.0));

    let mut ground = RigidBody::new(Vec2::new(0.0, -0.5), false);
    ground.add_shape(Shape::rectangle(Vec2::ZERO, 40.0, 1.0));
    engine.add_body(ground);

    let mut ball = RigidBody::new(Vec2::new(0.0, 5.0), true);
    ball.add_shape(Shape::Ball(Ball::new(Vec2::ZERO, 0.5)));
    ball.restitution = 0.4;
    let id = engine.add_body(ball);

    for frame in 0..180 {
        engine.run(1.0 / 60.0);
        if frame % 30 == 29 {
            if let Some(body) = engine.body(id) {
                println!(
                    "t = {:.1}s  position {:?}  energy {:.3}",
                    (frame + 1) as f32 / 60.0,
                    body.position.linear,
                    engine.kinetic_energy()
                );
            }
        }
    }
}
