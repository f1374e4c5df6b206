use crate::error::{CliError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::{
    Layer,
    filter::{LevelFilter, Targets},
    fmt::{self, format::FmtSpan},
    prelude::*,
    registry::LookupSpan,
};

/// Per-move tracing from the updater and the sweep loop. Kept off the
/// terminal below `-vvvv`; the log file receives it at `-vvv`.
const MOVE_TARGETS: [&str; 2] = ["cemc::engine::updater", "cemc::workflows::metropolis"];

pub fn verbosity_level(verbosity: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

fn terminal_filter(level: LevelFilter, verbosity: u8) -> Targets {
    let move_level = if verbosity > 3 {
        level
    } else {
        level.min(LevelFilter::DEBUG)
    };
    MOVE_TARGETS
        .iter()
        .fold(Targets::new().with_default(level), |targets, target| {
            targets.with_target(*target, move_level)
        })
}

/// Plain-text layer for `--log-file`. Workflow spans are closed with their
/// fields and timings, so every run leaves its temperature and sweep count in
/// the file.
fn file_layer<S>(path: &Path, level: LevelFilter) -> Result<impl Layer<S> + use<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let file = File::create(path).map_err(CliError::Io)?;
    Ok(fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_ids(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(level))
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let level = verbosity_level(verbosity, quiet);
    let terminal_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(terminal_filter(level, verbosity));
    let log_file_layer = log_file
        .map(|path| file_layer(&path, level))
        .transpose()?;

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(log_file_layer)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cemc::core::model::ModelDescription;
    use cemc::engine::config::MonteCarloConfigBuilder;
    use cemc::engine::progress::ProgressReporter;
    use cemc::engine::updater::CeUpdater;
    use cemc::workflows;
    use serial_test::serial;
    use tracing::Level;

    #[test]
    fn quiet_wins_over_verbosity() {
        assert_eq!(verbosity_level(0, false), LevelFilter::WARN);
        assert_eq!(verbosity_level(2, false), LevelFilter::DEBUG);
        assert_eq!(verbosity_level(7, false), LevelFilter::TRACE);
        assert_eq!(verbosity_level(3, true), LevelFilter::ERROR);
    }

    #[test]
    fn per_move_tracing_stays_off_the_terminal_until_asked_for() {
        let filter = terminal_filter(LevelFilter::TRACE, 3);
        assert!(!filter.would_enable("cemc::engine::updater", &Level::TRACE));
        assert!(filter.would_enable("cemc::engine::updater", &Level::DEBUG));
        assert!(filter.would_enable("cemc::engine::tracker", &Level::TRACE));

        let filter = terminal_filter(LevelFilter::TRACE, 4);
        assert!(filter.would_enable("cemc::workflows::metropolis", &Level::TRACE));

        let filter = terminal_filter(LevelFilter::INFO, 1);
        assert!(filter.would_enable("cemc::workflows::metropolis", &Level::INFO));
        assert!(!filter.would_enable("cemc::workflows::metropolis", &Level::DEBUG));
    }

    #[test]
    #[serial]
    fn log_file_records_the_workflow_span() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_path = temp_dir.path().join("run.log");
        let model_path =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/ring/model.toml");
        let model = ModelDescription::load(&model_path).unwrap();
        let mut updater = CeUpdater::new(&model).unwrap();
        let config = MonteCarloConfigBuilder::new()
            .temperature(450.0)
            .sweeps(3)
            .seed(1)
            .build()
            .unwrap();

        let subscriber =
            tracing_subscriber::registry().with(file_layer(&log_path, LevelFilter::DEBUG).unwrap());
        tracing::subscriber::with_default(subscriber, || {
            workflows::run(&mut updater, &config, &ProgressReporter::new()).unwrap();
        });

        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains("canonical_mc_workflow"));
        assert!(content.contains("sweeps=3"));
        assert!(content.contains("Workflow complete."));
        assert!(content.contains("close"));
        assert!(content.contains("ThreadId"));
        assert!(!content.contains("TRACE"));
    }

    #[test]
    #[serial]
    fn unwritable_log_file_is_an_io_error() {
        let invalid_path = PathBuf::from("/");

        if cfg!(unix) && invalid_path.is_dir() {
            let result = setup_logging(0, false, Some(invalid_path));
            assert!(matches!(result, Err(CliError::Io(_))));
        }
    }
}
