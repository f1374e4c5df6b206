use crate::cli::RunArgs;
use crate::config::PartialRunConfig;
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use cemc::{
    core::model::ModelDescription,
    engine::{config::Ensemble, progress::ProgressReporter, updater::CeUpdater},
    workflows::{self, Sample},
};
use std::path::Path;
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    let partial_config = match &args.config {
        Some(path) => PartialRunConfig::from_file(path)?,
        None => PartialRunConfig::default(),
    };
    info!("Merging configuration from file and CLI arguments...");
    let final_config = partial_config.merge_with_cli(&args)?;

    info!("Loading model description from {:?}", &args.model);
    let model = ModelDescription::load(&args.model)?;
    let mut updater = CeUpdater::new(&model)?;
    info!(
        "Model ready: {} sites, {} correlation functions, initial energy {:.6} eV.",
        updater.num_sites(),
        updater.all_correlation_functions().len(),
        updater.energy()?
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    let ensemble = match &final_config.ensemble {
        Ensemble::Canonical => "canonical",
        Ensemble::SemiGrandCanonical { .. } => "semi-grand-canonical",
    };
    println!(
        "Starting {} Monte Carlo at {:.1} K...",
        ensemble, final_config.sampling.temperature
    );
    let result = workflows::run(&mut updater, &final_config, &reporter)?;

    println!("✓ Final energy:      {:.6} eV", result.final_energy);
    println!("  Mean energy:       {:.6} eV", result.mean_energy);
    println!("  Heat capacity:     {:.6e} eV/K", result.heat_capacity);
    println!("  Acceptance ratio:  {:.4}", result.acceptance_ratio);
    if final_config.ensemble.chemical_potentials().is_some() {
        for (name, singlet) in &result.singlets {
            println!(
                "  <{}> = {:.6} (var {:.3e}, mu {:+.4} eV)",
                name, singlet.mean, singlet.variance, singlet.chemical_potential
            );
        }
    }
    if let Some(stats) = &result.cluster_statistics {
        println!(
            "  Solute clusters:   {} (max size {}, mean size {:.2})",
            stats.number_of_clusters, stats.max_size, stats.avg_size
        );
        println!(
            "  Constraint rejections: {}",
            result.rejected_by_constraint
        );
    }

    match &args.output {
        Some(path) if result.samples.is_empty() => {
            warn!(
                "No samples were recorded; {} will only contain a header.",
                path.display()
            );
            write_samples(path, &result.samples)?;
        }
        Some(path) => {
            write_samples(path, &result.samples)?;
            println!(
                "  {} sample(s) written to: {}",
                result.samples.len(),
                path.display()
            );
        }
        None => {}
    }

    Ok(())
}

fn write_samples(path: &Path, samples: &[Sample]) -> Result<()> {
    info!("Writing {} sample(s) to {:?}", samples.len(), path);
    let mut writer = csv::Writer::from_path(path)?;
    if samples.is_empty() {
        writer.write_record([
            "sweep",
            "energy",
            "acceptance_ratio",
            "number_of_clusters",
            "max_cluster_size",
        ])?;
    }
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush()?;
    Ok(())
}
