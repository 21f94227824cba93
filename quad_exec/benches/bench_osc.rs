//! # Oscillator Benchmark

use criterion::{criterion_group, criterion_main, Criterion};

use quad_lib::gait::{patterns, GaitEngine, GaitParams, Oscillator};
use quad_lib::servo_ctrl::sim::SimServoBoard;
use util::time::SimClock;

fn osc_benchmark(c: &mut Criterion) {
    // ---- Fixtures ----

    // GaitParams
    let gait_params = GaitParams {
        servo_channels: [0, 1, 2, 3, 4, 5, 6, 7],
        servo_trims_deg: [0.0; 8],
        servo_reversed: [false, true, false, true, false, true, false, true],
        stand_pose_deg: [140.0, 40.0, 155.0, 25.0, 40.0, 140.0, 25.0, 140.0],
        obstacle_threshold_cm: 20.0,
    };

    // Bench a full default-period sweep of a single oscillator, 67 sample
    // windows at the 30 ms cadence
    c.bench_function("Oscillator::refresh", |b| {
        let mut board = SimServoBoard::default();
        let mut osc = Oscillator::new(0, 0.0);
        osc.attach(&mut board, false).unwrap();

        let mut now_ms = 0u64;
        b.iter(|| {
            for _ in 0..67 {
                now_ms += 31;
                osc.refresh(&mut board, now_ms, 0.0).unwrap();
            }
        })
    });

    // Bench one full walking cycle through the engine, all eight oscillators
    // on simulated time
    c.bench_function("GaitEngine::execute", |b| {
        let mut engine = GaitEngine::new(SimServoBoard::default(), SimClock::new(), &gait_params);
        engine.init().unwrap();

        let pattern = patterns::forward(1000.0);
        b.iter(|| engine.execute(&pattern, 1.0).unwrap())
    });

    // Bench the keyframe interpolation path between two poses
    c.bench_function("GaitEngine::move_servos_to", |b| {
        let mut engine = GaitEngine::new(SimServoBoard::default(), SimClock::new(), &gait_params);
        engine.init().unwrap();

        let stand = gait_params.stand_pose_deg;
        let crouch = [90.0; 8];
        b.iter(|| {
            engine.move_servos_to(250, crouch).unwrap();
            engine.move_servos_to(250, stand).unwrap();
        })
    });
}

criterion_group!(benches, osc_benchmark);
criterion_main!(benches);
