use crate::cli::InspectArgs;
use crate::error::{CliError, Result};
use cemc::{
    core::model::ModelDescription,
    engine::{
        tracker::{ClusterTracker, TrackerConfig},
        updater::CeUpdater,
    },
};
use std::collections::BTreeMap;
use tracing::info;

pub fn run(args: InspectArgs) -> Result<()> {
    info!("Loading model description from {:?}", &args.model);
    let model = ModelDescription::load(&args.model)?;
    let updater = CeUpdater::new(&model)?;

    println!("Sites:  {}", updater.num_sites());
    println!("Energy: {:.6} eV", updater.energy()?);

    let composition: BTreeMap<&str, usize> = updater
        .symbols()
        .unique_species()
        .iter()
        .map(|s| (s.as_str(), updater.symbols().count(s)))
        .collect();
    println!("Composition:");
    for (species, count) in &composition {
        println!("  {species:<8} {count}");
    }

    let cf = if args.all {
        updater.all_correlation_functions()
    } else {
        updater.correlation_functions()
    };
    println!("Correlation functions:");
    for (name, value) in &cf {
        match updater.ecis().get(name) {
            Some(eci) => println!("  {name:<24} {value:>12.8}  (ECI {eci:>10.6})"),
            None => println!("  {name:<24} {value:>12.8}"),
        }
    }

    match (args.cluster_names.is_empty(), args.elements.is_empty()) {
        (true, true) => {}
        (false, false) => {
            let config = TrackerConfig::new(args.cluster_names, args.elements);
            let tracker = ClusterTracker::new(&updater, &config)?;
            let stats = tracker.statistics()?;
            println!("Solute clusters:");
            println!("  Number of clusters: {}", stats.number_of_clusters);
            println!("  Root nodes:         {}", tracker.num_root_nodes());
            println!("  Max size:           {}", stats.max_size);
            println!("  Mean size:          {:.3}", stats.avg_size);
            println!("  Mean squared size:  {:.3}", stats.avg_size_sq);
            let surface = tracker.surface()?;
            println!("  Surface sites:      {}", total_surface(&surface));
            for (root, count) in &surface {
                println!("    cluster at {root:<5} {count}");
            }
            let largest = tracker.members_of_largest_cluster()?;
            if !largest.is_empty() {
                println!("  Largest cluster:    {:?}", largest);
            }
        }
        _ => {
            return Err(CliError::Argument(
                "--cluster and --element must be given together.".to_string(),
            ));
        }
    }

    Ok(())
}

/// Non-solute sites bordering any cluster, summed over clusters.
fn total_surface(surface: &BTreeMap<usize, usize>) -> usize {
    surface.values().sum()
}
