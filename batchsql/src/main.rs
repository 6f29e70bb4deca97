//! MySQL batch loading tool.
//!
//! Connects with a connection string from the environment or a file, then
//! runs one subcommand: a connection test, an ad-hoc query or statement, a
//! CSV load, or an audit record insert.
//!
//! # Security Guarantees
//! - No credentials stored or logged
//! - Values are bound by the driver unless literal mode is requested by code

use anyhow::{Context, Result, bail};
use batchsql_core::{
    AuditRecord, Credentials, CsvEncoding, DbClient, ParameterBinding, SanitizationPolicy,
    Statement, logging::init_logging, parse_connection_string, query::csv,
};
use batchsql::{Cli, Commands, LoadCsvArgs, RecordErrorArgs};
use clap::Parser;
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet)?;

    let client = build_client(&cli)?;
    let outcome = run(&client, &cli.command).await;
    if let Err(e) = client.close().await {
        error!("Failed to close connection: {}", e);
    }
    outcome
}

/// Builds a client from the resolved connection string and global flags.
fn build_client(cli: &Cli) -> Result<DbClient> {
    let (connection_string, source) = batchsql::get_connection_string(
        cli.global.connection_file.clone(),
    )
    .map_err(anyhow::Error::msg)?;
    info!("Connection string loaded from {:?}", source);

    let (mut config, mut credentials) = parse_connection_string(&connection_string)?;
    if cli.global.password_prompt {
        credentials = Credentials::new(credentials.username().to_string(), Some(read_password()?));
    }
    if let Some(secs) = cli.global.query_timeout {
        config = config.with_query_timeout(Duration::from_secs(secs));
    }
    if let Some(project_name) = &cli.global.project_name {
        config = config.with_project_name(project_name.clone());
    }
    if let Some(audit_table) = &cli.global.audit_table {
        config = config.with_audit_table(audit_table.clone());
    }

    let client = DbClient::new(config, &credentials)?;
    client.set_policy(
        SanitizationPolicy::default()
            .with_identifier_checks(cli.global.check_identifiers)
            .with_value_checks(cli.global.check_values),
    );
    Ok(client)
}

fn read_password() -> Result<String> {
    print!("Enter database password: ");
    std::io::stdout()
        .flush()
        .context("Failed to flush stdout before reading password")?;
    let password = rpassword::read_password().context("Failed to read password")?;
    if password.is_empty() {
        bail!("Password cannot be empty");
    }
    Ok(password)
}

async fn run(client: &DbClient, command: &Commands) -> Result<()> {
    match command {
        Commands::Test => test_connection(client).await,
        Commands::Query { sql, params } => {
            let statement = statement(sql, params)?;
            let rows = client.execute_read(&statement).await?;
            println!("{}", batchsql::format_rows(&rows));
            Ok(())
        }
        Commands::Exec { sql, params } => {
            let statement = statement(sql, params)?;
            let affected = client.execute_write(&statement).await?;
            println!("{} row(s) affected", affected);
            Ok(())
        }
        Commands::LoadCsv(args) => load_csv(client, args).await,
        Commands::RecordError(args) => record_error(client, args).await,
    }
}

fn statement(sql: &str, params: &[(String, String)]) -> Result<Statement> {
    let binding = ParameterBinding::from_pairs(params.iter().map(|(k, v)| (k, v.as_str())))?;
    Ok(Statement::with_params(sql, binding))
}

/// Tests the database connection without running a statement
async fn test_connection(client: &DbClient) -> Result<()> {
    info!("Testing connection to {}...", client.config());
    if !client.connect().await {
        bail!("Connection test failed");
    }
    info!("✓ Connection test successful");
    println!("Connection to {} successful", client.config());
    Ok(())
}

async fn load_csv(client: &DbClient, args: &LoadCsvArgs) -> Result<()> {
    let encoding: CsvEncoding = args.encoding.parse()?;
    info!("Loading {} into '{}'", args.file.display(), args.table);

    let affected = match args.bulk {
        None => {
            client
                .write_csv_file(
                    &args.table,
                    &args.columns,
                    &args.file,
                    args.skip_header,
                    encoding,
                )
                .await?
        }
        Some(submission_count) => {
            let params =
                batchsql::bulk_params(&args.columns, &args.types).map_err(anyhow::Error::msg)?;
            let text = csv::read_file(&args.file, encoding).await?;
            let rows = csv::parse_rows(&text, args.columns.len(), args.skip_header)?;
            let table = batchsql::build_table(&args.table, &params, rows)?;

            let token = CancellationToken::new();
            let watcher = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, stopping at the next row");
                    watcher.cancel();
                }
            });

            client
                .write_table_bulk_with_cancel(&table, submission_count, &params, &token)
                .await?
                .affected_rows
        }
    };

    info!("✓ Load completed");
    println!("{} row(s) loaded into {}", affected, args.table);
    Ok(())
}

async fn record_error(client: &DbClient, args: &RecordErrorArgs) -> Result<()> {
    let mut record = AuditRecord::new(
        client.config().project_name.as_str(),
        &args.method,
        args.full_name.as_str(),
        args.message.as_str(),
        args.information.as_deref().unwrap_or(&args.message),
    );
    if let Some(remark) = &args.remark {
        record = record.with_remark(remark.as_str());
    }

    if !client.record_error(&record).await? {
        bail!("Audit record was not stored");
    }
    println!("Audit record stored in {}", client.config().audit_table);
    Ok(())
}
