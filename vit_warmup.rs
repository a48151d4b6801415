use ndarray::{Array3, Array4};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_vit_toolkit::config::{load_schedule_config, PatchEmbedConfig, ScheduleConfig};
use rust_vit_toolkit::layers::{Layer, PatchEmbedder};
use rust_vit_toolkit::optimizers::{Optimizer, SGD};
use rust_vit_toolkit::schedule::{build_schedule, EventSink, LRScheduler, ScheduleEvent};
use std::env;
use std::error::Error;
use std::process;

// Small ViT front-end on synthetic 32x32 RGB images.
const IMAGE_SIZE: usize = 32;
const PATCH_SIZE: usize = 8;
const CHANNELS: usize = 3;
const EMBED_DIM: usize = 16;
const BATCH_SIZE: usize = 4;
// Training hyperparameters.
const LEARNING_RATE: f32 = 0.05;
const STEPS: usize = 40;
const SEED: u64 = 42;

// Used when no schedule file is given on the command line.
const DEFAULT_SCHEDULE: &str = r#"{
  "name": "multi_step",
  "milestones": [30],
  "gamma": 0.1,
  "warmup_iters": 10,
  "warmup_mode": "linear",
  "warmup_factor": 0.2
}"#;

// Print schedule construction events to stdout.
struct PrintSink;

impl EventSink for PrintSink {
    fn record(&mut self, event: ScheduleEvent) {
        println!("[schedule] {event}");
    }
}

// Toy objective pulling every embedding towards zero: L = 0.5 * mean(tokens^2).
fn loss_and_grad(tokens: &Array3<f32>) -> (f32, Array3<f32>) {
    let count = tokens.len() as f32;
    let loss = 0.5 * tokens.mapv(|v| v * v).sum() / count;
    (loss, tokens / count)
}

fn synthetic_images(rng: &mut StdRng) -> Array4<f32> {
    Array4::from_shape_fn((BATCH_SIZE, CHANNELS, IMAGE_SIZE, IMAGE_SIZE), |_| {
        rng.random::<f32>()
    })
}

fn run(schedule_path: Option<String>) -> Result<Vec<f32>, Box<dyn Error>> {
    let schedule_config = match schedule_path {
        Some(path) => load_schedule_config(path)?,
        None => ScheduleConfig::from_json_str(DEFAULT_SCHEDULE)?,
    };

    let mut rng = StdRng::seed_from_u64(SEED);
    let config = PatchEmbedConfig::new(IMAGE_SIZE, PATCH_SIZE, CHANNELS, EMBED_DIM);
    let mut embed = PatchEmbedder::new(&config, &mut rng)?;
    let mut optimizer = SGD::new(LEARNING_RATE);
    let mut schedule = build_schedule(&optimizer, Some(&schedule_config), &mut PrintSink)?;
    let images = synthetic_images(&mut rng);

    println!(
        "{} patches of {:?} per image, {} parameters",
        embed.patch_count(),
        embed.patch_size(),
        embed.parameter_count()
    );

    let mut losses = Vec::with_capacity(STEPS);
    for step in 0..STEPS {
        optimizer.set_learning_rate(schedule.get_lr());

        let tokens = embed.forward(&images)?;
        let (loss, grad) = loss_and_grad(&tokens);
        embed.backward(&images, &grad)?;
        embed.update_parameters(&mut optimizer);

        println!(
            "step {:>3}  lr {:.6}  loss {:.6}",
            step,
            optimizer.learning_rate(),
            loss
        );
        losses.push(loss);
        schedule.step();
    }
    Ok(losses)
}

fn main() {
    if let Err(err) = run(env::args().nth(1)) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}
