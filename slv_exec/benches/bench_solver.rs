//! # Solver Benchmark

use std::sync::Arc;
use criterion::{criterion_group, criterion_main, Criterion};

use comms_if::slv::PoseMode;
use slv_lib::{
    device::sim::SimContext,
    output::SolutionBuffer,
    part_desc::LimbVariant,
    solver::{CartesianSolver, SolverOptions},
};

fn solver_benchmark(c: &mut Criterion) {
    // ---- Build a configured, suspended, arm solver ----

    let solver = CartesianSolver::new(
        "bench",
        LimbVariant::Arm,
        Arc::new(SimContext::icub("icub")),
        Arc::new(SolutionBuffer::new())
    );
    solver.open(&SolverOptions::default()).unwrap();
    solver.suspend();

    // Targets in front of the robot, reached with the palm facing down
    let xd_full = [-0.3, 0.1, 0.1, 0.0, 0.0, 1.0, std::f64::consts::PI];
    let xd_xyz = [-0.3, 0.1, 0.1];

    c.bench_function("CartesianSolver::ask::full", |b| {
        b.iter(|| solver.ask(&xd_full, None, Some(PoseMode::Full)).unwrap())
    });

    c.bench_function("CartesianSolver::ask::xyz", |b| {
        b.iter(|| solver.ask(&xd_xyz, None, Some(PoseMode::Xyz)).unwrap())
    });
}

criterion_group!(benches, solver_benchmark);
criterion_main!(benches);
