//! sql2bq CLI
//!
//! Copies one MySQL table into BigQuery.
//! Pedantic lints relaxed for CLI ergonomics.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use sql2bq::{MigrationConfig, Pipeline, SourceConfig};

#[derive(Parser)]
#[command(name = "sql2bq")]
#[command(version)]
#[command(about = "Copy a MySQL table into Google BigQuery", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Copy options (used when no subcommand is given)
    #[command(flatten)]
    run: RunArgs,

    /// Verbosity: -v warnings, -vv progress, -vvv debug. RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the table (default)
    Run(RunArgs),

    /// Print the BigQuery schema inferred from the source table
    Schema {
        #[command(flatten)]
        args: RunArgs,

        /// Print the schema as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Generate example configuration
    Init {
        /// Output file path
        #[arg(short, long, default_value = "sql2bq.yaml")]
        output: PathBuf,
    },
}

/// Configuration file plus per-field overrides.
#[derive(Args, Debug, Default, Clone)]
struct RunArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// MySQL hostname
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// MySQL port
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// MySQL user
    #[arg(short, long)]
    user: Option<String>,

    /// MySQL password
    #[arg(short, long, env = "SQL2BQ_MYSQL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// MySQL database
    #[arg(short, long)]
    database: Option<String>,

    /// MySQL table
    #[arg(short, long)]
    table: Option<String>,

    /// Google BigQuery project id
    #[arg(short = 'i', long = "project-id")]
    project_id: Option<String>,

    /// Google BigQuery dataset name
    #[arg(short = 'n', long)]
    dataset: Option<String>,

    /// Destination table name (defaults to the source table)
    #[arg(long)]
    dest_table: Option<String>,

    /// Google service account key file (tokens are refreshed during the copy)
    #[arg(short = 'k', long = "key", value_name = "FILE", env = "GOOGLE_APPLICATION_CREDENTIALS")]
    key_file: Option<PathBuf>,

    /// OAuth2 access token for BigQuery, used when no key file is given
    #[arg(long, env = "SQL2BQ_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    /// BigQuery REST endpoint
    #[arg(long)]
    api_url: Option<String>,

    /// Max number of rows to copy (0 = whole table)
    #[arg(short, long)]
    limit: Option<u64>,

    /// Rows per insert batch
    #[arg(short = 's', long)]
    batch_size: Option<usize>,

    /// Parallel load workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Insert attempts per batch
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Delete the existing BigQuery table first
    #[arg(long)]
    delete_table: bool,

    /// Dry run mode (don't write to BigQuery)
    #[arg(long)]
    dry_run: bool,

    /// Hide the progress bar
    #[arg(long)]
    no_progress: bool,
}

impl RunArgs {
    /// Loads the config file (if any) and applies command-line overrides.
    fn into_config(self) -> anyhow::Result<MigrationConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                MigrationConfig::from_file(path)?
            }
            None => MigrationConfig::default(),
        };

        let SourceConfig::MySql(mysql) = &mut config.source;
        if let Some(host) = self.host {
            mysql.host = host;
        }
        if let Some(port) = self.port {
            mysql.port = port;
        }
        if let Some(user) = self.user {
            mysql.user = user;
        }
        if let Some(password) = self.password {
            mysql.password = password;
        }
        if let Some(database) = self.database {
            mysql.database = database;
        }
        if let Some(table) = self.table {
            mysql.table = table;
        }

        let dest = &mut config.destination;
        if let Some(project_id) = self.project_id {
            dest.project_id = project_id;
        }
        if let Some(dataset) = self.dataset {
            dest.dataset = dataset;
        }
        if self.dest_table.is_some() {
            dest.table = self.dest_table;
        }
        if self.key_file.is_some() {
            dest.key_file = self.key_file;
        }
        if self.access_token.is_some() {
            dest.access_token = self.access_token;
        }
        if let Some(api_url) = self.api_url {
            dest.api_url = api_url;
        }

        let options = &mut config.options;
        if let Some(limit) = self.limit {
            options.limit = limit;
        }
        if let Some(batch_size) = self.batch_size {
            options.batch_size = batch_size;
        }
        if let Some(workers) = self.workers {
            options.workers = workers;
        }
        if let Some(max_attempts) = self.max_attempts {
            options.max_attempts = max_attempts;
        }
        options.delete_table |= self.delete_table;
        options.dry_run |= self.dry_run;

        Ok(config)
    }
}

/// Maps `-v` occurrences to a level: none shows errors only.
fn level_for_verbosity(verbose: u8) -> Level {
    match verbose {
        0 => Level::ERROR,
        1 => Level::WARN,
        2 => Level::INFO,
        _ => Level::DEBUG,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for_verbosity(cli.verbose).as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Some(Commands::Run(args)) => run_copy(args).await?,
        Some(Commands::Schema { args, json }) => show_schema(args, json).await?,
        Some(Commands::Validate { config }) => validate_config(&config)?,
        Some(Commands::Init { output }) => generate_config(&output)?,
        None => run_copy(cli.run).await?,
    }

    Ok(())
}

async fn run_copy(args: RunArgs) -> anyhow::Result<()> {
    let show_progress = !args.no_progress;
    let config = args.into_config()?;
    let table = config.table_ref();
    let dry_run = config.options.dry_run;

    let mut pipeline = Pipeline::new(config)?.with_progress(show_progress);
    let stats = pipeline.run().await?;

    if dry_run {
        println!("\n✅ Dry run complete (nothing written to BigQuery)");
    } else {
        println!("\n✅ Copy complete: {}", table);
    }
    println!("   Extracted:      {}", stats.extracted);
    println!("   Loaded:         {}", stats.loaded);
    println!("   Rejected rows:  {}", stats.rejected_rows);
    println!(
        "   Failed batches: {} ({} rows)",
        stats.failed_batches, stats.failed_rows
    );
    println!("   Duration:       {:.2}s", stats.duration_secs);
    println!("   Throughput:     {:.0} rows/sec", stats.throughput());
    if !stats.is_complete() {
        println!("\n⚠️  Some rows did not reach BigQuery; run with -vv for details.");
    }

    Ok(())
}

async fn show_schema(args: RunArgs, json: bool) -> anyhow::Result<()> {
    let mut config = args.into_config()?;
    config.options.dry_run = true;
    let source_table = config.source.table().to_string();

    let mut pipeline = Pipeline::new(config)?;
    let schema = pipeline.describe_schema().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    println!("\n📊 Schema for {}:", source_table);
    for field in schema.fields() {
        println!(
            "   {:<32} {:<10} {}",
            field.name,
            field.field_type,
            field.mode.as_str()
        );
    }

    Ok(())
}

fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    info!("Validating configuration from {:?}", config_path);

    let config = MigrationConfig::from_file(config_path)?;
    config.validate()?;

    println!("✅ Configuration is valid!");
    let SourceConfig::MySql(mysql) = &config.source;
    println!(
        "   Source:      mysql://{}@{}:{}/{}.{}",
        mysql.user, mysql.host, mysql.port, mysql.database, mysql.table
    );
    println!("   Destination: {}", config.table_ref());
    println!("   Batch size:  {}", config.options.batch_size);
    println!("   Workers:     {}", config.options.workers);

    Ok(())
}

fn generate_config(output: &Path) -> anyhow::Result<()> {
    std::fs::write(output, MYSQL_TEMPLATE)?;
    println!("✅ Generated configuration: {:?}", output);
    println!("   Edit the file and run: sql2bq run --config {:?}", output);

    Ok(())
}

const MYSQL_TEMPLATE: &str = r#"# sql2bq configuration
# Copy one MySQL table into BigQuery

source:
  type: mysql
  host: 127.0.0.1
  port: 3306
  user: root
  password: ""          # or SQL2BQ_MYSQL_PASSWORD / --password
  database: shop
  table: orders

destination:
  project_id: my-gcp-project
  dataset: analytics
  # table: orders_copy  # defaults to the source table name
  key_file: google_key.json  # or GOOGLE_APPLICATION_CREDENTIALS / --key
  # access_token: ...   # short-lived alternative: SQL2BQ_ACCESS_TOKEN / --access-token

options:
  batch_size: 1000
  limit: 0              # 0 = whole table
  # workers: 8          # defaults to the number of CPUs
  max_attempts: 5
  delete_table: false
  dry_run: false
"#;
