//! `Config`, spec §7/§A.3: the on-disk JSON configuration the CLI loads and
//! the knobs it hands down to the scheduler, `MCSFinder`, and the
//! `RuntimeStats` dump.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{error::{EngineError, Result}, scheduler::SchedulerConfig, sim::{name_to_invariant_check, InvariantCheck}};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the superlog trace to replay/minimize.
    pub trace_path: PathBuf,
    /// Path to write `runtime_stats.json` and intermediate MCS dumps.
    pub output_dir: PathBuf,
    /// Name of a built-in invariant check (spec §6), resolved via
    /// [`name_to_invariant_check`].
    pub invariant_check: String,
    pub speedup: f64,
    pub delay_input_events: bool,
    pub initial_wait: f64,
    pub epsilon_seconds: f64,
    pub sleep_interval_seconds: f64,
    /// Seconds `Replayer::replay` waits after the last scheduled event,
    /// in case the violation takes a moment to surface (spec §5).
    pub end_wait_seconds: f64,
    /// Use the efficient (ddmin '99, atom-aware) MCS variant instead of the
    /// classical one (spec §4.7 vs §4.8).
    pub use_efficient: bool,
    /// Repeat the initial full-trace run this many times before trusting the
    /// violation is reproducible (spec §4.9).
    pub verify_replays: u32,
    /// Hard ceiling on ddmin rounds, guarding against non-termination on a
    /// pathological trace (spec §4.7).
    pub max_iterations: u32,
    /// Prune whole event classes at a time before ddmin proper, using
    /// domain knowledge that some classes are rarely the cause (spec §4.7
    /// "optimized filtering").
    pub optimized_filtering: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            trace_path: PathBuf::from("trace.json"),
            output_dir: PathBuf::from("."),
            invariant_check: "no_switches_down".to_string(),
            speedup: 1.0,
            delay_input_events: true,
            initial_wait: 0.5,
            epsilon_seconds: 0.5,
            sleep_interval_seconds: 0.2,
            end_wait_seconds: 0.5,
            use_efficient: true,
            verify_replays: 1,
            max_iterations: 100,
            optimized_filtering: false,
        }
    }
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Config> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if name_to_invariant_check(&self.invariant_check).is_none() {
            return Err(EngineError::Config(format!(
                "unknown invariant check {:?}",
                self.invariant_check
            )));
        }
        if self.speedup <= 0.0 {
            return Err(EngineError::Config("speedup must be positive".to_string()));
        }
        Ok(())
    }

    pub fn invariant_check(&self) -> InvariantCheck {
        name_to_invariant_check(&self.invariant_check).expect("validated at load time")
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            speedup: self.speedup,
            delay_input_events: self.delay_input_events,
            initial_wait: self.initial_wait,
            epsilon_seconds: self.epsilon_seconds,
            sleep_interval_seconds: self.sleep_interval_seconds,
            end_wait_seconds: self.end_wait_seconds,
        }
    }
}
