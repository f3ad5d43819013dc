use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dbmi::{
    ClientConfig, ConnectionParams, CursorMode, DriverHandle, DriverManager, DriverRegistry,
    DriverSpec,
};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dbmi")]
#[command(about = "Talk to a database driver over the DBMI protocol", long_about = None)]
struct Args {
    /// Driver registry file (`name:command[:comment]` per line)
    #[arg(long, env = "DBMI_DBMSCAP")]
    dbmscap: Option<PathBuf>,

    /// Driver name to look up in the registry
    #[arg(short = 'D', long)]
    driver: Option<String>,

    /// Driver executable to run directly instead of a registry entry
    #[arg(long, conflicts_with = "driver")]
    driver_cmd: Option<PathBuf>,

    /// Extra argument passed to --driver-cmd (repeatable)
    #[arg(long = "driver-arg", requires = "driver_cmd")]
    driver_args: Vec<String>,

    /// Database to open
    #[arg(short, long, default_value = "")]
    database: String,

    /// Schema to open
    #[arg(short, long)]
    schema: Option<String>,

    /// Client configuration (JSON: timeouts and codec limits)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the driver's version string
    Version,

    /// List databases at a location
    Databases {
        /// Location passed to the driver (path, host, ...)
        #[arg(default_value = "")]
        location: String,
    },

    /// List tables in the open database
    Tables {
        /// Include system tables
        #[arg(long)]
        system: bool,
    },

    /// Show the columns of a table
    Describe { table: String },

    /// Run a statement that returns no rows
    Execute { sql: String },

    /// Run a query and print every row
    Select { sql: String },

    /// Drop one column from a table
    DropColumn { table: String, column: String },
}

fn resolve_driver(args: &Args) -> anyhow::Result<DriverSpec> {
    if let Some(command) = &args.driver_cmd {
        let mut spec = DriverSpec::new("cmd", command.clone());
        for arg in &args.driver_args {
            spec = spec.arg(arg.clone());
        }
        return Ok(spec);
    }

    let Some(name) = &args.driver else {
        bail!("either --driver or --driver-cmd is required");
    };
    let Some(path) = &args.dbmscap else {
        bail!("--driver needs a registry; pass --dbmscap or set DBMI_DBMSCAP");
    };
    let registry = DriverRegistry::load_dbmscap(path)
        .with_context(|| format!("loading driver registry {}", path.display()))?;
    Ok(registry.get(name)?.clone())
}

async fn run(handle: &mut DriverHandle, command: Command) -> anyhow::Result<serde_json::Value> {
    let output = match command {
        Command::Version => json!({ "version": handle.version().await? }),
        Command::Databases { location } => json!(handle.list_databases(&location).await?),
        Command::Tables { system } => json!(handle.list_tables(system).await?),
        Command::Describe { table } => json!(handle.describe_table(&table).await?),
        Command::Execute { sql } => json!({ "rows_affected": handle.execute(&sql).await? }),
        Command::Select { sql } => {
            let cursor = handle.open_select_cursor(&sql, CursorMode::ReadOnly).await?;
            let rows = handle.fetch_all(&cursor).await;
            let columns: Vec<&str> = cursor.column_names().collect();
            let output = json!({ "columns": columns, "rows": rows? });
            handle.close_cursor(cursor).await?;
            output
        }
        Command::DropColumn { table, column } => {
            handle.drop_column(&table, &column).await?;
            json!({ "dropped": format!("{}.{}", table, column) })
        }
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the JSON result.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dbmi=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => ClientConfig::from_json_file(path)?,
        None => ClientConfig::default(),
    };
    let spec = resolve_driver(&args)?;
    let mut params = ConnectionParams::new(&args.database);
    if let Some(schema) = &args.schema {
        params = params.schema(schema);
    }

    let mut handle = DriverManager::new(config)
        .open(&spec, &params)
        .await
        .with_context(|| format!("opening database '{}'", params.database))?;

    let pretty = args.pretty;
    let result = run(&mut handle, args.command).await;
    handle.close().await;

    let output = result?;
    let text = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", text);
    Ok(())
}
