//! CLI surface (§6), parsed with `clap`'s derive API the way the teacher's
//! own binaries do.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AutopilotKind {
    Ardupilot,
    Px4,
}

#[derive(Debug, Parser)]
#[command(name = "hilcheck", about = "Model checker for autopilot/simulator pairs under sensor-failure scenarios")]
pub struct Config {
    /// Which autopilot binary this run targets.
    #[arg(long = "autopilot", value_enum)]
    pub autopilot: AutopilotKind,

    /// Workload command template, e.g. `./{{.AutopilotName}} --sim`. The
    /// literal `{{.AutopilotName}}` is replaced with the lowercase autopilot
    /// name before spawning.
    #[arg(long = "workload.cmd")]
    pub workload_cmd: Option<String>,

    /// Ceiling on how long a single scenario run may occupy the workload.
    #[arg(long = "workload.timeout", default_value_t = 300)]
    pub workload_timeout_seconds: u64,

    /// Replay a single saved plan instead of running the search loop.
    #[arg(long = "replay", default_value_t = false)]
    pub replay: bool,

    /// Path to the plan file to replay; required when `--replay` is set.
    #[arg(long = "replay.path")]
    pub replay_path: Option<PathBuf>,

    /// Skip spawning the workload process; leaves the simulator/autopilot
    /// pair running for a human (or an external tool) to drive manually.
    #[arg(long = "repl", default_value_t = false)]
    pub repl: bool,

    /// Directory for counterexamples, mode logs, and (if enabled) sensor
    /// traces.
    #[arg(long = "output", default_value = "./hilcheck-output")]
    pub output: PathBuf,

    /// Enable opportunistic per-sensor trace capture.
    #[arg(long = "sensor.trace", default_value_t = false)]
    pub sensor_trace: bool,
}

impl Config {
    pub fn autopilot_name(&self) -> &'static str {
        match self.autopilot {
            AutopilotKind::Ardupilot => "ardupilot",
            AutopilotKind::Px4 => "px4",
        }
    }

    /// Expands the `{{.AutopilotName}}` placeholder in `--workload.cmd`, the
    /// one piece of templating this CLI needs — a plain string replace
    /// rather than pulling in a templating crate for a single substitution.
    pub fn expanded_workload_cmd(&self) -> Option<String> {
        self.workload_cmd
            .as_ref()
            .map(|tpl| tpl.replace("{{.AutopilotName}}", self.autopilot_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workload_cmd_template_is_expanded() {
        let cfg = Config {
            autopilot: AutopilotKind::Ardupilot,
            workload_cmd: Some("./{{.AutopilotName}} --sim-address=127.0.0.1".to_string()),
            workload_timeout_seconds: 300,
            replay: false,
            replay_path: None,
            repl: false,
            output: PathBuf::from("./out"),
            sensor_trace: false,
        };
        assert_eq!(cfg.expanded_workload_cmd().unwrap(), "./ardupilot --sim-address=127.0.0.1");
    }
}
