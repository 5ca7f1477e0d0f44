mod cli;
mod progress;

use std::error::Error;

use clap::Parser;

use xrdct::config::pipeline::read_config_file;
use xrdct::correct::Outcome;
use xrdct::io::Saved;
use xrdct::pipeline::{Pipeline, RunContext};
use xrdct::pool::{parse_scheduler_hint, resolve_worker_count};
use xrdct::utils::{group_digits as g, timing::Progress as Timer};

use cli::Cli;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Cli::parse();

    let mut timer = Timer::new();
    timer.start(&format!("Reading {}", args.config.display()));
    let mut config = read_config_file(&args.config)?;
    // Command line overrides
    if let Some(dir) = &args.output { config.output.directory = Some(dir.clone()) }
    if !args.delete.is_empty() { config.corrections.delete_rows = args.delete.clone() }
    if args.overwrite { config.output.overwrite = true }
    if args.no_reconstruct { config.reconstruction.enabled = false }
    config.validate()?;
    timer.done();

    let hint = std::env::var("SLURM_CPUS_ON_NODE").ok();
    let explicit = args.threads.or(config.reconstruction.threads);
    let workers = resolve_worker_count(explicit, parse_scheduler_hint(hint.as_deref()));
    let context = RunContext::new(workers, config.output.overwrite)?;

    timer.start("Loading reference patterns");
    let pipeline = Pipeline::new(&config)?;
    timer.done_with_message(&format!("{} corrections", pipeline.chain().len()));

    println!("Processing {} with {workers} workers", config.input.file.display());
    let bar = progress::Progress::new();
    let summary = pipeline.run(&context, &|k| bar.image_done(k))?;
    bar.finish();

    for entry in &summary.log {
        let outcome = match &entry.outcome {
            Outcome::Applied         => "applied".to_string(),
            Outcome::Repaired(n)     => format!("{} samples repaired", g(n)),
            Outcome::Guarded(report) => format!("applied, {} parts skipped", g(report.len())),
            Outcome::Skipped(why)    => format!("skipped: {why}"),
        };
        println!("   {:<12} {outcome}", entry.stage.to_string());
    }
    for saved in &summary.saved {
        match saved {
            Saved::Written(path) => println!("Wrote   {}", path.display()),
            Saved::Skipped(path) => println!("Kept    {} (use -R to overwrite)", path.display()),
        }
    }
    if summary.images > 0 { println!("Reconstructed {} images", g(summary.images)) }
    if let Some(e) = summary.failure {
        println!("Reconstruction failed: {e}");
        return Err(e.into())
    }
    Ok(())
}
