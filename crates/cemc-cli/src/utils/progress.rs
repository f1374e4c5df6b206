use cemc::engine::progress::{Progress, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

const SPINNER_TICK_MS: u64 = 80;
const PHASE_DONE: &str = "✓";

/// Terminal view of a Monte Carlo run: a spinner while a phase prepares, then
/// a sweep bar whose message carries the running energy and the
/// accepted/attempted move counts.
#[derive(Clone)]
pub struct CliProgressHandler {
    bar: ProgressBar,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let bar = ProgressBar::with_draw_target(Some(0), target).with_style(phase_style());
        Self { bar }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let bar = self.bar.clone();
        Box::new(move |progress: Progress| show(&bar, progress))
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn show(bar: &ProgressBar, progress: Progress) {
    match progress {
        Progress::PhaseStart { name } => {
            bar.reset();
            bar.set_length(0);
            bar.set_style(phase_style());
            bar.set_prefix(name);
            bar.set_message("");
            bar.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
        }
        Progress::PhaseFinish => {
            bar.disable_steady_tick();
            bar.finish_with_message(PHASE_DONE);
        }
        Progress::TaskStart { total_steps } => {
            bar.disable_steady_tick();
            bar.reset();
            bar.set_length(total_steps);
            bar.set_style(sweep_style());
        }
        Progress::TaskIncrement { amount } => bar.inc(amount),
        Progress::TaskFinish => {
            if let Some(total) = bar.length() {
                bar.set_position(total);
            }
            bar.finish();
        }
        Progress::StatusUpdate { text } => bar.set_message(text),
        Progress::Message(msg) => bar.println(format!("  {msg}")),
    }
}

fn phase_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:.bold} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn sweep_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:>11.bold} [{bar:36.cyan/blue}] {pos}/{len} sweeps  {msg} ({eta})",
    )
    .map(|style| style.progress_chars("##-"))
    .unwrap_or_else(|_| ProgressStyle::default_bar())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cemc::core::model::ModelDescription;
    use cemc::engine::config::MonteCarloConfigBuilder;
    use cemc::engine::progress::ProgressReporter;
    use cemc::engine::updater::CeUpdater;
    use cemc::workflows;
    use std::path::Path;

    fn hidden() -> CliProgressHandler {
        CliProgressHandler::with_draw_target(ProgressDrawTarget::hidden())
    }

    #[test]
    fn sweep_bar_follows_the_sampling_phase() {
        let handler = hidden();
        let callback = handler.get_callback();

        callback(Progress::PhaseStart { name: "Sampling" });
        assert_eq!(handler.bar.prefix(), "Sampling");
        assert!(!handler.bar.is_finished());

        callback(Progress::TaskStart { total_steps: 40 });
        callback(Progress::TaskIncrement { amount: 1 });
        callback(Progress::TaskIncrement { amount: 2 });
        assert_eq!(handler.bar.length(), Some(40));
        assert_eq!(handler.bar.position(), 3);

        callback(Progress::StatusUpdate {
            text: "E = -3.3600 eV, 4/9 accepted".to_string(),
        });
        assert_eq!(handler.bar.message(), "E = -3.3600 eV, 4/9 accepted");

        callback(Progress::TaskFinish);
        assert!(handler.bar.is_finished());
        assert_eq!(handler.bar.position(), 40);

        callback(Progress::PhaseFinish);
        assert_eq!(handler.bar.message(), PHASE_DONE);
    }

    #[test]
    fn bar_counts_every_sweep_of_a_real_run() {
        let handler = hidden();
        let reporter = ProgressReporter::with_callback(handler.get_callback());
        let model_path =
            Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/ring/model.toml");
        let mut updater = CeUpdater::new(&ModelDescription::load(&model_path).unwrap()).unwrap();
        let config = MonteCarloConfigBuilder::new()
            .temperature(600.0)
            .sweeps(6)
            .equilibration_sweeps(2)
            .seed(3)
            .build()
            .unwrap();

        workflows::run(&mut updater, &config, &reporter).unwrap();
        assert_eq!(handler.bar.prefix(), "Sampling");
        assert_eq!(handler.bar.length(), Some(8));
        assert_eq!(handler.bar.position(), 8);
        assert!(handler.bar.is_finished());
    }

    #[test]
    fn a_new_phase_clears_the_previous_status() {
        let handler = hidden();
        let callback = handler.get_callback();
        callback(Progress::PhaseStart { name: "Sampling" });
        callback(Progress::StatusUpdate {
            text: "E = -1.0 eV".to_string(),
        });
        callback(Progress::PhaseStart {
            name: "Preparation",
        });
        assert_eq!(handler.bar.prefix(), "Preparation");
        assert_eq!(handler.bar.message(), "");
    }
}
