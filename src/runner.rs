//! Drives both engines from the command line: loads and validates
//! parameters, runs the lattice engine for the configured number of steps,
//! runs the compartmental engine for the baseline and (when configured) the
//! policy scenario, writes CSV reports, and prints the scenario summary.

use std::path::{Path, PathBuf};

use clap::{Args, Command, FromArgMatches as _};

use crate::error::EpiError;
use crate::grid::{GridEngine, StateCounts};
use crate::log::{info, set_log_level, LevelFilter};
use crate::params::Parameters;
use crate::report::{GridCountsRow, ReportWriters, SirRow, SummaryRow};
use crate::sir::{policy_from_parameters, run_sir, SirSeries};

/// Default cli arguments for the episim runner
#[derive(Args, Debug)]
pub struct BaseArgs {
    /// Random seed, overriding the one in the config file
    #[arg(short, long)]
    pub random_seed: Option<u64>,

    /// Optional path for a JSON parameters file
    #[arg(short, long, default_value = "")]
    pub config: String,

    /// Optional path for report output
    #[arg(short, long, default_value = "")]
    pub output_dir: String,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(short, long)]
    pub log_level: Option<LevelFilter>,
}

fn create_cli() -> Command {
    let cli = Command::new("episim");
    BaseArgs::augment_args(cli)
}

/// Everything a completed run produced, for consumers beyond the CSV
/// reports.
pub struct RunOutput {
    /// Per-step lattice counts, one entry per completed step.
    pub grid_counts: Vec<StateCounts>,
    /// Compartmental time series without the policy switch.
    pub baseline: SirSeries,
    /// Compartmental time series with the policy switch, when configured.
    pub policy: Option<SirSeries>,
}

/// Runs a simulation with the default cli arguments.
///
/// # Errors
/// Returns an error if argument parsing, configuration loading, or report
/// writing fails.
pub fn run_with_args() -> Result<RunOutput, Box<dyn std::error::Error>> {
    let cli = create_cli();
    let matches = cli.get_matches();
    let args = BaseArgs::from_arg_matches(&matches)?;
    Ok(run_with_args_internal(args)?)
}

fn run_with_args_internal(args: BaseArgs) -> Result<RunOutput, EpiError> {
    if let Some(level) = args.log_level {
        set_log_level(level);
    }

    let mut params = if args.config.is_empty() {
        Parameters::default()
    } else {
        info!("loading parameters from: {}", args.config);
        Parameters::from_json_file(Path::new(&args.config))?
    };
    params.validate()?;

    if let Some(seed) = args.random_seed {
        params.seed = seed;
    }

    let output_dir = if args.output_dir.is_empty() {
        None
    } else {
        Some(PathBuf::from(&args.output_dir))
    };
    run(&params, output_dir.as_deref())
}

/// Runs both engines with the given (already validated) parameters, writing
/// CSV reports into `output_dir` when one is provided.
///
/// # Errors
/// Returns an `EpiError` if a report file cannot be created.
pub fn run(params: &Parameters, output_dir: Option<&Path>) -> Result<RunOutput, EpiError> {
    let writers = match output_dir {
        Some(dir) => {
            let mut writers = ReportWriters::new();
            writers.add_report::<GridCountsRow>(&dir.join("grid_counts.csv"))?;
            writers.add_report::<SirRow>(&dir.join("sir_series.csv"))?;
            writers.add_report::<SummaryRow>(&dir.join("summary.csv"))?;
            Some(writers)
        }
        None => None,
    };

    let grid_counts = run_grid(params, writers.as_ref());
    let (baseline, policy) = run_compartments(params, writers.as_ref());

    Ok(RunOutput {
        grid_counts,
        baseline,
        policy,
    })
}

fn run_grid(params: &Parameters, writers: Option<&ReportWriters>) -> Vec<StateCounts> {
    let mut engine = GridEngine::from_parameters(&params.grid, params.seed);
    info!(
        "lattice run: {0}x{0} cells, {1} steps, seed {2}",
        params.grid.size, params.grid.steps, params.seed
    );

    let mut grid_counts = Vec::with_capacity(params.grid.steps as usize);
    for step in 0..params.grid.steps {
        let counts = engine.step();
        if let Some(writers) = writers {
            writers.send_report(GridCountsRow {
                step,
                susceptible: counts.susceptible,
                infected: counts.infected,
                recovered: counts.recovered,
            });
        }
        grid_counts.push(counts);
    }

    if let Some(last) = grid_counts.last() {
        info!(
            "lattice final counts: S={} I={} R={}",
            last.susceptible, last.infected, last.recovered
        );
    }
    grid_counts
}

fn run_compartments(
    params: &Parameters,
    writers: Option<&ReportWriters>,
) -> (SirSeries, Option<SirSeries>) {
    let baseline = run_sir(&params.sir, None);
    report_scenario(params, writers, "baseline", &baseline);

    let policy = policy_from_parameters(&params.sir).map(|change| {
        let series = run_sir(&params.sir, Some(change));
        report_scenario(params, writers, "policy", &series);
        series
    });

    (baseline, policy)
}

fn report_scenario(
    params: &Parameters,
    writers: Option<&ReportWriters>,
    scenario: &str,
    series: &SirSeries,
) {
    let (peak_infected, peak_day) = series.peak_infected();
    let attack_rate = series.attack_rate(params.sir.population);

    if let Some(writers) = writers {
        for sample in series.samples() {
            writers.send_report(SirRow {
                scenario: scenario.to_string(),
                t: sample.t,
                s: sample.s,
                i: sample.i,
                r: sample.r,
            });
        }
        writers.send_report(SummaryRow {
            scenario: scenario.to_string(),
            peak_infected,
            peak_day,
            attack_rate,
        });
    }

    println!(
        "[{scenario}] peak infected: {peak_infected:.0} on day {peak_day:.1} | attack rate: {:.1}%",
        attack_rate * 100.0
    );
}
