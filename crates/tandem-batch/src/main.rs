//! Tandem Batch - runs the people job

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tandem_batch::config::JobConfig;
use tandem_batch::people::{self, csv_sources, run_people_job};
use tandem_batch::sink::{BatchSink, MemorySink, SqlxBatchSink};
use tandem_batch::writer::ParsedStatement;
use tandem_common::logging::{init_logging, LogConfig, LogLevel};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "tandem-batch")]
#[command(author, version, about = "Two-stage batch job: names, then ages, into the people table")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML job configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the job
    Run(RunArgs),

    /// Load and validate the configuration without reading any input
    Check,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Names input (`firstName,lastName`)
    #[arg(long)]
    names: Option<PathBuf>,

    /// Ages input (`firstName,age`)
    #[arg(long)]
    ages: Option<PathBuf>,

    /// Database URL, e.g. `sqlite://people.db?mode=rwc` or `postgres://localhost/people`
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Chunk size for both steps
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Create the people table if it does not exist
    #[arg(long)]
    init_schema: bool,

    /// Write to an in-memory sink instead of the database
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut JobConfig) {
        if let Some(names) = &self.names {
            config.input.names_path = names.clone();
        }
        if let Some(ages) = &self.ages {
            config.input.ages_path = ages.clone();
        }
        if let Some(url) = &self.database_url {
            config.database.url = url.clone();
        }
        if let Some(chunk_size) = self.chunk_size {
            config.step1.chunk_size = chunk_size;
            config.step2.chunk_size = chunk_size;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("tandem-batch")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        },
    };

    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "tandem-batch failed");
            ExitCode::FAILURE
        },
    }
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config =
        JobConfig::load(cli.config.as_deref()).context("Failed to load job configuration")?;

    match cli.command {
        Command::Check => {
            config.validate().context("Invalid job configuration")?;
            check(&config)?;
            Ok(ExitCode::SUCCESS)
        },
        Command::Run(args) => {
            args.apply(&mut config);
            config.validate().context("Invalid job configuration")?;
            run(&config, &args).await
        },
    }
}

fn check(config: &JobConfig) -> Result<()> {
    let statement =
        ParsedStatement::parse(&config.insert_sql).context("Invalid insert statement")?;

    // Building the writer runs the same setup validation as a real run
    people::people_writer(config, Arc::new(MemorySink::new()))
        .context("Invalid writer configuration")?;

    info!(
        names = %config.input.names_path.display(),
        ages = %config.input.ages_path.display(),
        step1_chunk_size = config.step1.chunk_size,
        step2_chunk_size = config.step2.chunk_size,
        promote_keys = ?config.promote_keys,
        sql = %statement.sql(),
        "Configuration is valid"
    );
    Ok(())
}

async fn run(config: &JobConfig, args: &RunArgs) -> Result<ExitCode> {
    let (names, ages) = csv_sources(config).context("Failed to open input files")?;

    let database = if args.dry_run {
        warn!("Dry run: records are written to an in-memory sink");
        None
    } else {
        let sink = SqlxBatchSink::connect(&config.database)
            .await
            .with_context(|| format!("Failed to connect to {}", config.database.url))?;

        if args.init_schema {
            sink.execute(people::CREATE_PEOPLE_TABLE)
                .await
                .context("Failed to create people table")?;
            info!("People table ready");
        }
        Some(sink)
    };

    let sink: Arc<dyn BatchSink> = match &database {
        Some(sink) => Arc::new(sink.clone()),
        None => Arc::new(MemorySink::new()),
    };

    let job = run_people_job(config, names, ages, sink).await?;

    if let Some(detail) = job.failure_detail() {
        error!(job = %job.job_name, failure = %detail, "Job failed");
        return Ok(ExitCode::from(job.exit_code() as u8));
    }

    for step in &job.steps {
        info!(
            step = %step.step_name,
            read = step.read_count,
            written = step.write_count,
            skipped = step.skip_count(),
            commits = step.commit_count,
            "Step summary"
        );
    }

    if let Some(sink) = &database {
        let stored = people::report_people(sink).await?;
        info!(stored, "Job completed");
    } else {
        info!("Job completed");
    }

    Ok(ExitCode::SUCCESS)
}
