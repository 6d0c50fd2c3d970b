use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Vec2, Vec3};
use rigid_impulse::{Ball, Engine2, Engine3, RigidBody, Shape};
use std::hint::black_box;

const DT: f32 = 1.0 / 60.0;

fn pyramid(rows: usize) -> Engine2 {
    let mut engine = Engine2::new(Vec2::new(0.0, -10.0));
    let mut floor = RigidBody::new(Vec2::new(0.0, -0.5), false);
    floor.add_shape(Shape::rectangle(Vec2::ZERO, 200.0, 1.0));
    engine.add_body(floor);

    for row in 0..rows {
        let count = rows - row;
        for i in 0..count {
            let x = (i as f32 - count as f32 * 0.5) * 1.05;
            let y = 0.5 + row as f32 * 1.05;
            let mut body = RigidBody::new(Vec2::new(x, y), true);
            body.add_shape(Shape::rectangle(Vec2::ZERO, 1.0, 1.0));
            engine.add_body(body);
        }
    }
    engine
}

fn ball_pit(count: usize) -> Engine3 {
    let mut engine = Engine3::new(Vec3::new(0.0, -10.0, 0.0));
    let mut floor = RigidBody::new(Vec3::new(0.0, -0.5, 0.0), false);
    floor.add_shape(Shape::cuboid(Vec3::ZERO, Vec3::new(50.0, 0.5, 50.0)));
    engine.add_body(floor);

    let side = (count as f32).cbrt().ceil() as usize;
    for i in 0..count {
        let x = (i % side) as f32 * 1.1;
        let z = ((i / side) % side) as f32 * 1.1;
        let y = 1.0 + (i / (side * side)) as f32 * 1.1;
        let mut body = RigidBody::new(Vec3::new(x, y, z), true);
        body.add_shape(Shape::Ball(Ball::new(Vec3::ZERO, 0.5)));
        engine.add_body(body);
    }
    engine
}

fn bench_stack_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack_step");
    for &rows in &[5usize, 10, 20] {
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            let mut engine = pyramid(rows);
            // let the pyramid reach a steady contact set first
            for _ in 0..30 {
                engine.run(DT);
            }
            b.iter(|| engine.run(black_box(DT)));
        });
    }
    group.finish();
}

fn bench_ball_pit_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("ball_pit_step");
    for &count in &[64usize, 256, 512] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut engine = ball_pit(count);
            for _ in 0..30 {
                engine.run(DT);
            }
            b.iter(|| engine.run(black_box(DT)));
        });
    }
    group.finish();
}

fn bench_raycast(c: &mut Criterion) {
    c.bench_function("raycast_512_balls", |b| {
        let mut engine = ball_pit(512);
        engine.run(DT);
        b.iter(|| {
            black_box(engine.raycast(
                black_box(Vec3::new(-10.0, 1.0, 1.0)),
                black_box(Vec3::X),
            ))
        })
    });
}

criterion_group!(benches, bench_stack_step, bench_ball_pit_step, bench_raycast);
criterion_main!(benches);
