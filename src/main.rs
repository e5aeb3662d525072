use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use simio_runner::config::{AUTH_REFRESH_INTERVAL, DEFAULT_MAX_CYCLES, DEFAULT_ROWS_TO_SHOW};
use simio_runner::design::preview::{scenario_columns, scenario_rows};
use simio_runner::design::{ExperimentPayload, VariableLevels};
use simio_runner::monitor::PollConfig;
use simio_runner::results::{FlattenedResults, Report, SortDirection, render_table};
use simio_runner::runner::{
    RunConfigBuilder, Session, cleanup_experiment, fetch_results, results_from_file,
    run_experiment, watch,
};

#[derive(Parser, Clone)]
#[command(about = "Run full-factorial experiments on a simulation portal")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Quiet mode - minimal output, only show summary
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Connection settings shared by every portal command
#[derive(ClapArgs, Clone)]
struct PortalArgs {
    /// Portal base URL
    #[arg(long, env = "SIMIO_PORTAL_URL")]
    portal_url: Option<String>,

    /// Personal access token
    #[arg(long, env = "PERSONAL_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

/// Variable levels, either from a JSON file or inline
#[derive(ClapArgs, Clone)]
struct DesignArgs {
    /// JSON file mapping variable names to level lists (e.g. {"CapA": [2, 4]})
    #[arg(short, long, conflicts_with = "var")]
    design: Option<PathBuf>,

    /// Inline variable levels (format: name=level1,level2); repeatable
    #[arg(long)]
    var: Vec<String>,

    /// Replications per scenario
    #[arg(short, long, default_value = "6")]
    reps: NonZeroU32,
}

/// Polling cadence
#[derive(ClapArgs, Clone)]
struct PollArgs {
    /// Seconds between status checks
    #[arg(long, default_value = "10")]
    interval: u64,

    /// Maximum number of status checks
    #[arg(long, default_value_t = DEFAULT_MAX_CYCLES)]
    max_cycles: u32,

    /// Print the status observed on every cycle
    #[arg(long)]
    show_cycles: bool,
}

/// Result ranking options
#[derive(ClapArgs, Clone)]
struct ReportArgs {
    /// Response to rank scenarios by
    #[arg(long)]
    sort_by: Option<String>,

    /// Sort direction (asc, desc)
    #[arg(long, default_value = "desc")]
    direction: String,

    /// Number of top scenarios to show
    #[arg(long, default_value_t = DEFAULT_ROWS_TO_SHOW)]
    rows: usize,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Build a design, start a run, wait for it and report the results
    Run {
        #[command(flatten)]
        portal: PortalArgs,
        #[command(flatten)]
        design: DesignArgs,
        #[command(flatten)]
        poll: PollArgs,
        #[command(flatten)]
        report: ReportArgs,

        /// Experiment id the run belongs to
        #[arg(short, long)]
        experiment_id: i64,

        /// Run name
        #[arg(short, long)]
        name: String,

        /// Seconds between credential refreshes
        #[arg(long, default_value_t = AUTH_REFRESH_INTERVAL.as_secs())]
        auth_refresh: u64,

        /// Show the design and payload without starting a run
        #[arg(long)]
        dry_run: bool,
    },
    /// Preview a design offline
    Design {
        #[command(flatten)]
        design: DesignArgs,

        /// Print the run payload JSON instead of a table
        #[arg(long)]
        json: bool,

        #[arg(short, long, default_value = "0")]
        experiment_id: i64,

        #[arg(short, long, default_value = "preview")]
        name: String,
    },
    /// Show the status of a run
    Status {
        #[command(flatten)]
        portal: PortalArgs,

        run_id: i64,
    },
    /// Follow a run through its experiment's run listing
    Watch {
        #[command(flatten)]
        portal: PortalArgs,
        #[command(flatten)]
        poll: PollArgs,

        experiment_id: i64,
        run_id: i64,
    },
    /// Fetch and rank the scenario results of a run
    Results {
        #[command(flatten)]
        portal: PortalArgs,
        #[command(flatten)]
        report: ReportArgs,

        /// Run id to fetch results for
        #[arg(required_unless_present = "from_file")]
        run_id: Option<i64>,

        /// Read scenario results JSON from a file instead of the portal
        #[arg(long)]
        from_file: Option<PathBuf>,
    },
    /// Delete all runs of an experiment
    Cleanup {
        #[command(flatten)]
        portal: PortalArgs,

        experiment_id: i64,

        /// List the runs without deleting them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if args.quiet {
        EnvFilter::new("simio_runner=warn")
    } else {
        EnvFilter::new("simio_runner=info")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match args.command {
        Command::Run {
            portal,
            design,
            poll,
            report,
            experiment_id,
            name,
            auth_refresh,
            dry_run,
        } => {
            let levels = load_levels(&design).await?;

            if dry_run {
                let payload =
                    ExperimentPayload::full_factorial(experiment_id, &name, design.reps, &levels)?;
                println!("DRY RUN MODE - No run will be started");
                println!();
                print_design(&payload);
                println!("To execute, run without --dry-run");
                return Ok(());
            }

            let config = RunConfigBuilder::default()
                .experiment_id(experiment_id)
                .run_name(name.clone())
                .replications(design.reps)
                .levels(levels)
                .poll(poll_config(&poll))
                .auth_refresh(Some(Duration::from_secs(auth_refresh)))
                .sort_by(report.sort_by.clone())
                .direction(SortDirection::parse(&report.direction)?)
                .rows_to_show(report.rows)
                .quiet(args.quiet)
                .build()?;

            if !args.quiet {
                println!("Simulation Experiment Runner");
                println!("============================");
                println!("Experiment: {}", experiment_id);
                println!("Run: {}", name);
                match config.levels.combination_count() {
                    Some(count) => println!("Scenarios: {}", count),
                    None => println!("Scenarios: too many to enumerate"),
                }
                println!("Replications per scenario: {}", config.replications);
                println!();
            }

            let session = Session::connect(
                portal.portal_url.as_deref(),
                portal.token.as_deref(),
                config.auth_refresh,
            )
            .await?;
            let result = run_experiment(&session, &config).await;
            session.close().await;
            let outcome = result?;

            println!();
            println!("Run Summary");
            println!("===========");
            println!("Run ID: {}", outcome.run_id);
            println!("Scenarios: {}", outcome.scenario_count);
            println!("Total replications: {}", outcome.total_replications);
            println!(
                "Final status after approx. {:.2} minutes ({} cycles): {}",
                outcome.poll.waited(config.poll.interval).as_secs_f64() / 60.0,
                outcome.poll.cycles,
                outcome.poll.status
            );
            if let Some(run) = &outcome.final_run {
                println!(
                    "Replications completed: {}/{}",
                    run.completed_replications, run.total_replications
                );
            }

            if let Some(results) = &outcome.results {
                print_results(results, outcome.report.as_ref(), args.quiet);
            } else if !outcome.poll.status.is_terminal() {
                println!();
                println!("Run has not finished. Fetch results later with:");
                println!("  simio-runner results {}", outcome.run_id);
            }
        }
        Command::Design {
            design,
            json,
            experiment_id,
            name,
        } => {
            let levels = load_levels(&design).await?;
            let payload =
                ExperimentPayload::full_factorial(experiment_id, name, design.reps, &levels)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                print_design(&payload);
            }
        }
        Command::Status { portal, run_id } => {
            let session =
                Session::connect(portal.portal_url.as_deref(), portal.token.as_deref(), None)
                    .await?;
            let run = session.api().get_run(run_id).await;
            session.close().await;
            let run = run?;

            println!("Run {}: {}", run.id, run.status);
            if let Some(message) = run.status_message.as_deref().filter(|m| !m.is_empty()) {
                println!("Message: {}", message);
            }
            println!(
                "Replications: {}/{}",
                run.completed_replications, run.total_replications
            );
        }
        Command::Watch {
            portal,
            poll,
            experiment_id,
            run_id,
        } => {
            let session = Session::connect(
                portal.portal_url.as_deref(),
                portal.token.as_deref(),
                Some(AUTH_REFRESH_INTERVAL),
            )
            .await?;
            let outcome = watch(&session, experiment_id, run_id, &poll_config(&poll)).await;
            session.close().await;
            let outcome = outcome?;

            match outcome.message {
                Some(message) => println!(
                    "Status: {}, Message = {} ({} cycles)",
                    outcome.status, message, outcome.cycles
                ),
                None => println!("Status: {} ({} cycles)", outcome.status, outcome.cycles),
            }
        }
        Command::Results {
            portal,
            report,
            run_id,
            from_file,
        } => {
            let direction = SortDirection::parse(&report.direction)?;
            let (flattened, ranked) = if let Some(path) = from_file {
                results_from_file(&path, report.sort_by.as_deref(), direction, report.rows).await?
            } else {
                let run_id = run_id
                    .ok_or_else(|| anyhow::anyhow!("A run id or --from-file is required"))?;
                let session =
                    Session::connect(portal.portal_url.as_deref(), portal.token.as_deref(), None)
                        .await?;
                let fetched = fetch_results(
                    &session,
                    run_id,
                    report.sort_by.as_deref(),
                    direction,
                    report.rows,
                )
                .await;
                session.close().await;
                fetched?
            };
            print_results(&flattened, ranked.as_ref(), args.quiet);
        }
        Command::Cleanup {
            portal,
            experiment_id,
            dry_run,
        } => {
            let session =
                Session::connect(portal.portal_url.as_deref(), portal.token.as_deref(), None)
                    .await?;
            let run_ids = cleanup_experiment(&session, experiment_id, dry_run).await;
            session.close().await;
            let run_ids = run_ids?;

            if dry_run {
                println!("DRY RUN MODE - No runs deleted");
                println!("Runs for experiment {}: {:?}", experiment_id, run_ids);
            } else {
                println!("Deleted {} runs for experiment {}", run_ids.len(), experiment_id);
            }
        }
    }

    Ok(())
}

async fn load_levels(design: &DesignArgs) -> anyhow::Result<VariableLevels> {
    match &design.design {
        Some(path) => VariableLevels::from_json_file(path).await,
        None if design.var.is_empty() => Err(anyhow::anyhow!(
            "No variables given.\n\
             Use --design <file.json> or one or more --var name=level1,level2"
        )),
        None => Ok(VariableLevels::from_var_specs(&design.var)?),
    }
}

fn poll_config(poll: &PollArgs) -> PollConfig {
    PollConfig {
        interval: Duration::from_secs(poll.interval),
        max_cycles: poll.max_cycles,
        show: poll.show_cycles,
    }
}

fn print_design(payload: &ExperimentPayload) {
    println!(
        "Experiment {} has {} scenarios and {} total replications.",
        payload.name,
        payload.scenario_count(),
        payload.total_replications()
    );
    println!();
    print!(
        "{}",
        render_table(
            &scenario_rows(&payload.scenarios),
            &scenario_columns(&payload.scenarios)
        )
    );
    println!();
}

fn print_results(results: &FlattenedResults, report: Option<&Report>, quiet: bool) {
    println!();
    match report {
        Some(report) => {
            println!(
                "Top {} scenarios by {} ({:?})",
                report.rows.len(),
                report.sort_by,
                report.direction
            );
            if report.dropped > 0 {
                println!(
                    "Dropped {} rows with non-numeric '{}' values",
                    report.dropped, report.sort_by
                );
            }
            print!("{}", render_table(&report.rows, &results.column_order()));
        }
        None if !quiet => {
            println!("Scenario results ({} rows)", results.rows.len());
            print!("{}", render_table(&results.rows, &results.column_order()));
        }
        None => {}
    }
}
