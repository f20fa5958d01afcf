use std::{env, io, path::Path, sync::Arc, thread};

use anyhow::{Context, anyhow};
use distributed::LocalGroup;
use log::{info, warn};
use machine_learning::{
    collective::ProcessGroup,
    device::{Device, FixedDevice},
};
use ndarray::{Array2, Array3, Axis};
use orchestrator::{Algorithm, SequentialConstructor, configs::AlgorithmConfig};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;

const DEFAULT_CONFIG: &str = include_str!("../demos/toy_gan.json");
const CHECKPOINT: &str = "toy_gan.ckpt";

const CENTER: [f32; 2] = [2., -1.];
const SPREAD: f32 = 0.5;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => AlgorithmConfig::from_json_file(path)?,
        None => AlgorithmConfig::from_json_str(DEFAULT_CONFIG)?,
    };

    let world_size = env::var("WORLD_SIZE")
        .ok()
        .map(|v| v.parse::<usize>())
        .transpose()
        .context("WORLD_SIZE must be a positive integer")?
        .unwrap_or(2)
        .max(1);

    let path = config.checkpoint.dir.join(CHECKPOINT);
    let config = Arc::new(config);
    info!(world_size = world_size; "starting ranks");

    let handles: Vec<_> = LocalGroup::new_group(world_size)
        .into_iter()
        .map(|group| {
            let config = Arc::clone(&config);
            let path = path.clone();
            thread::spawn(move || train(&config, Arc::new(group), &path))
        })
        .collect();

    for handle in handles {
        handle.join().map_err(|_| anyhow!("a rank panicked"))??;
    }

    resume(&config, &path)
}

/// Trains the toy model on one rank, rank 0 checkpointing every interval.
fn train(
    config: &AlgorithmConfig,
    group: Arc<dyn ProcessGroup>,
    path: &Path,
) -> orchestrator::Result<()> {
    let rank = group.rank();
    let training = &config.training;

    let mut algorithm = Algorithm::distributed(&FixedDevice(Device::Cpu), Some(group))
        .with_prefix_detection(config.checkpoint.prefix_detection);
    algorithm.create_model(&SequentialConstructor, true, &config.model)?;
    algorithm.create_loss_functions(&config.losses, config.use_accelerator)?;
    let params = algorithm.param_groups();
    algorithm.create_optimizers(&params, &config.optimizers)?;
    algorithm.create_schedulers(&config.schedulers)?;
    algorithm.create_criteria(&config.criteria)?;

    if rank == 0 {
        algorithm.print_net(&mut io::sink())?;
    }

    let mut rng = StdRng::seed_from_u64(training.seed.wrapping_add(rank as u64));
    let batch = training.batch_size;
    let ones = Array2::<f32>::ones((batch, 1));
    let zeros = Array2::<f32>::zeros((batch, 1));

    for iteration in 1..=training.iterations {
        let real = real_batch(&mut rng, batch);
        let z = noise(&mut rng, batch, training.latent_dim);
        let fake = algorithm.module_mut("gen")?.forward(z.view())?;

        let logits = algorithm.module_mut("dis")?.forward(real.view())?;
        let (loss_real, d) = algorithm.weighted_loss("adv", logits.view(), ones.view())?;
        algorithm.module_mut("dis")?.backward(d.view())?;

        let logits = algorithm.module_mut("dis")?.forward(fake.view())?;
        let (loss_fake, d) = algorithm.weighted_loss("adv", logits.view(), zeros.view())?;
        algorithm.module_mut("dis")?.backward(d.view())?;
        algorithm.step_optimizer("dis")?;

        let z = noise(&mut rng, batch, training.latent_dim);
        let fake = algorithm.module_mut("gen")?.forward(z.view())?;
        let logits = algorithm.module_mut("dis")?.forward(fake.view())?;
        let (loss_gen, d) = algorithm.weighted_loss("adv", logits.view(), ones.view())?;
        let d_fake = algorithm.module_mut("dis")?.backward(d.view())?;
        algorithm.module_mut("dis")?.zero_grad();
        algorithm.module_mut("gen")?.backward(d_fake.view())?;
        algorithm.step_optimizer("gen")?;

        algorithm.update_learning_rates()?;

        if rank == 0 && iteration % config.checkpoint.interval == 0 {
            info!(
                iteration = iteration,
                dis_loss = loss_real + loss_fake,
                gen_loss = loss_gen;
                "training"
            );
            algorithm.save_checkpoint(path, iteration, config.checkpoint.keep_schedulers)?;
        }
    }

    if rank == 0 {
        algorithm.set_eval_mode();
        let real = real_batch(&mut rng, batch);
        let z = noise(&mut rng, batch, training.latent_dim);
        let fake = algorithm.module_mut("gen")?.forward(z.view())?;
        report(&algorithm, &real, &fake);
    }

    Ok(())
}

/// Rebuilds the model on a single device and restores the last checkpoint into it.
fn resume(config: &AlgorithmConfig, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        warn!("no checkpoint was saved, nothing to resume");
        return Ok(());
    }

    let mut algorithm = Algorithm::single_device(&FixedDevice(Device::Cpu))
        .with_prefix_detection(config.checkpoint.prefix_detection);
    algorithm.create_model(&SequentialConstructor, false, &config.model)?;
    let params = algorithm.param_groups();
    algorithm.create_optimizers(&params, &config.optimizers)?;
    algorithm.create_schedulers(&config.schedulers)?;

    let items = algorithm.checkpoint_items(config.checkpoint.keep_schedulers);
    let iteration = algorithm
        .load_checkpoint(path, &items, false)
        .with_context(|| format!("resuming from {}", path.display()))?;

    info!(iteration = iteration, items = items.len(); "resumed on a single device");
    Ok(())
}

fn report(algorithm: &Algorithm, real: &Array2<f32>, fake: &Array2<f32>) {
    let (real, fake) = (as_image(real), as_image(fake));

    for (name, criterion) in algorithm.criteria().iter() {
        match algorithm.evaluate(name, (&real).into(), (&fake).into()) {
            Ok(score) => info!(
                lower_is_better = criterion.metric.lower_is_better();
                "{name}: {score:.4} {}", criterion.unit
            ),
            Err(e) => warn!("{name} could not be evaluated: {e}"),
        }
    }
}

/// Lays a batch of points out as a single channel image valued in `[0, 1]`.
fn as_image(batch: &Array2<f32>) -> Array3<f32> {
    batch
        .mapv(|v| ((v + 4.) / 8.).clamp(0., 1.))
        .insert_axis(Axis(0))
}

fn real_batch<R: Rng>(rng: &mut R, n: usize) -> Array2<f32> {
    Array2::from_shape_fn((n, 2), |(_, j)| {
        CENTER[j] + SPREAD * rng.sample::<f32, _>(StandardNormal)
    })
}

fn noise<R: Rng>(rng: &mut R, n: usize, dim: usize) -> Array2<f32> {
    Array2::from_shape_fn((n, dim), |_| rng.sample(StandardNormal))
}
