use clap::Parser;
use clap_verbosity_flag::Verbosity;
use ocsim::core::matcher::MatchAlgorithm;
use ocsim::core::Tick;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ocsim", author, version = ocsim::core::version(), about = "Simulate GPU job admission on an optical circuit switched fabric.")]
#[command(styles = ocsim::utils::STYLES)]
pub struct Cli {
    /// The configuration file to use
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Port matching algorithm (overrides the config file)
    #[arg(short, long, value_enum)]
    pub algorithm: Option<MatchAlgorithm>,

    /// Number of jobs to generate (overrides the config file)
    #[arg(short = 'n', long)]
    pub jobs: Option<usize>,

    /// Job-size mix as GPUS:DURATION[:WEIGHT] entries (e.g., "512:1:3,4096:4")
    #[arg(short, long, value_name = "MIX")]
    pub mix: Option<String>,

    /// Seed for the job generator (overrides the config file)
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Stop after this many ticks
    #[arg(long, default_value_t = 100_000)]
    pub max_ticks: Tick,

    /// Debit uplink budgets by the circuits each job holds
    #[arg(long)]
    pub charge_uplinks: bool,

    /// Print the per-tick timeline
    #[arg(long)]
    pub timeline: bool,

    /// Show the final state of these groups (e.g., "0-3" or "0,8,16")
    #[arg(short, long, value_name = "IDS")]
    pub groups: Option<String>,

    /// Emit the report as JSON instead of tables
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_overrides() {
        let cli = Cli::parse_from([
            "ocsim",
            "--algorithm",
            "native",
            "-n",
            "12",
            "--seed",
            "9",
            "--groups",
            "0-3",
            "--mix",
            "64:2",
            "--json",
        ]);
        assert_eq!(cli.algorithm, Some(MatchAlgorithm::Native));
        assert_eq!(cli.jobs, Some(12));
        assert_eq!(cli.seed, Some(9));
        assert_eq!(cli.groups.as_deref(), Some("0-3"));
        assert_eq!(cli.mix.as_deref(), Some("64:2"));
        assert_eq!(cli.max_ticks, 100_000);
        assert!(cli.json);
        assert!(!cli.charge_uplinks);
    }
}
