use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::Serialize;
use std::time::{Duration, Instant};
use swarm_nn_core::evaluator::FitnessEvaluator;
use swarm_nn_core::nn::{linspace_column, MseObjective};
use swarm_nn_core::{LayerLayout, Objective};

#[derive(Serialize)]
struct BenchReport {
    pop_size: usize,
    dim: usize,
    samples: usize,
    rounds: u32,
    global_threads: usize,
    global_pool_us: u128,
    single_thread_us: u128,
    speedup: f64,
}

fn create_swarm(pop_size: usize, dim: usize, seed: u64) -> Array2<f32> {
    let mut rng = ChaCha12Rng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((pop_size, dim), || rng.random::<f32>() * 2.0 - 1.0)
}

fn time_rounds(
    evaluator: &FitnessEvaluator<MseObjective>,
    swarm: &Array2<f32>,
    rounds: u32,
) -> Result<Duration, Box<dyn std::error::Error>> {
    let start = Instant::now();
    for _ in 0..rounds {
        evaluator.evaluate(swarm.view())?;
    }
    Ok(start.elapsed())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let pop_size = 200;
    let samples = 1024;
    let rounds = 20;
    let layout = LayerLayout::new(&[1, 32, 32, 1])?;
    let dim = layout.dimensions();
    println!(
        "Benchmarking evaluation of {} particles ({} parameters, {} samples)",
        pop_size, dim, samples
    );

    let inputs = linspace_column(-1.0, 1.0, samples);
    let targets = inputs.mapv(|x| (std::f32::consts::PI * x).cos() - x);
    let objective = MseObjective::new(inputs, targets)?;
    objective.check_layout(&layout)?;
    let swarm = create_swarm(pop_size, dim, 42);

    let global = FitnessEvaluator::new(objective.clone(), layout.clone(), None)?;
    let single = FitnessEvaluator::new(objective, layout, Some(1))?;

    // Warm up both pools once.
    global.evaluate(swarm.view())?;
    single.evaluate(swarm.view())?;

    let global_time = time_rounds(&global, &swarm, rounds)?;
    println!("Time for {} rounds on global pool: {:?}", rounds, global_time);
    println!("Avg per round (global): {:?}", global_time / rounds);

    let single_time = time_rounds(&single, &swarm, rounds)?;
    println!("Time for {} rounds on 1 thread: {:?}", rounds, single_time);
    println!("Avg per round (1 thread): {:?}", single_time / rounds);

    let report = BenchReport {
        pop_size,
        dim,
        samples,
        rounds,
        global_threads: rayon::current_num_threads(),
        global_pool_us: global_time.as_micros(),
        single_thread_us: single_time.as_micros(),
        speedup: single_time.as_secs_f64() / global_time.as_secs_f64().max(f64::EPSILON),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
