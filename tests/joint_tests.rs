//! Joint behavior through the full engine loop.

use glam::Vec2;
use rigid_impulse::{Anchor, Ball, Engine2, EntityId, JointDescriptor, RigidBody, Shape};

const FRAME: f32 = 1.0 / 60.0;

fn bob(engine: &mut Engine2, at: Vec2) -> EntityId {
    let mut body = RigidBody::new(at, true);
    body.add_shape(Shape::Ball(Ball::new(Vec2::ZERO, 0.25)));
    engine.add_body(body)
}

fn pivot(engine: &mut Engine2, at: Vec2) -> EntityId {
    let mut body = RigidBody::new(at, false);
    body.add_shape(Shape::Ball(Ball::new(Vec2::ZERO, 0.1)));
    body.can_collide = false;
    engine.add_body(body)
}

fn distance(engine: &Engine2, a: EntityId, b: EntityId) -> f32 {
    let pa = engine.body(a).unwrap().position.linear;
    let pb = engine.body(b).unwrap().position.linear;
    pa.distance(pb)
}

#[test]
fn a_pendulum_keeps_its_rod_length() {
    let mut engine = Engine2::new(Vec2::new(0.0, -10.0));
    let anchor = pivot(&mut engine, Vec2::ZERO);
    let swing = bob(&mut engine, Vec2::new(2.0, 0.0));
    engine.add_joint(JointDescriptor::length(
        Anchor::new(anchor, Vec2::ZERO),
        Anchor::new(swing, Vec2::ZERO),
        2.0,
    ));

    for _ in 0..120 {
        engine.run(FRAME);
        let length = distance(&engine, anchor, swing);
        assert!((length - 2.0).abs() < 0.2, "rod stretched to {length}");
    }
    // the bob must have swung below its release point
    assert!(engine.body(swing).unwrap().position.linear.y < -0.5);
}

#[test]
fn a_hanging_chain_settles_link_by_link() {
    let mut engine = Engine2::new(Vec2::new(0.0, -10.0));
    let top = pivot(&mut engine, Vec2::ZERO);
    let mut links = vec![top];
    for i in 1..=4 {
        // released sideways so the chain has to fold down under gravity
        let link = bob(&mut engine, Vec2::new(i as f32, 0.0));
        engine.add_joint(JointDescriptor::length(
            Anchor::new(links[i - 1], Vec2::ZERO),
            Anchor::new(link, Vec2::ZERO),
            1.0,
        ));
        links.push(link);
    }

    for _ in 0..300 {
        engine.run(FRAME);
    }
    for pair in links.windows(2) {
        let length = distance(&engine, pair[0], pair[1]);
        assert!((length - 1.0).abs() < 0.2, "link stretched to {length}");
    }
    let end = engine.body(links[4]).unwrap().position.linear;
    assert!(end.length() < 4.3, "chain end drifted to {end:?}");
}

#[test]
fn a_pinned_anchor_holds_even_on_a_dynamic_body() {
    let mut engine = Engine2::new(Vec2::new(0.0, -10.0));
    let held = bob(&mut engine, Vec2::new(0.0, 0.0));
    let hanging = bob(&mut engine, Vec2::new(0.0, -1.0));
    engine.add_joint(JointDescriptor::length(
        Anchor::fixed(held, Vec2::ZERO),
        Anchor::new(hanging, Vec2::ZERO),
        1.0,
    ));
    if let Some(body) = engine.body_mut(held) {
        body.gravity = false;
    }

    for _ in 0..120 {
        engine.run(FRAME);
    }
    let length = distance(&engine, held, hanging);
    assert!((length - 1.0).abs() < 0.25, "pinned joint stretched to {length}");
}

#[test]
fn removing_a_joint_frees_the_bodies() {
    let mut engine = Engine2::new(Vec2::new(0.0, -10.0));
    let anchor = pivot(&mut engine, Vec2::ZERO);
    let swing = bob(&mut engine, Vec2::new(0.0, -2.0));
    let joint = engine.add_joint(JointDescriptor::length(
        Anchor::new(anchor, Vec2::ZERO),
        Anchor::new(swing, Vec2::ZERO),
        2.0,
    ));

    for _ in 0..30 {
        engine.run(FRAME);
    }
    engine.remove_joint(joint);
    for _ in 0..60 {
        engine.run(FRAME);
    }
    assert!(
        distance(&engine, anchor, swing) > 2.5,
        "body kept hanging after the joint was removed"
    );
}
