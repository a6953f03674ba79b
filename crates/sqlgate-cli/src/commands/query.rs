use crate::bootstrap::{build_registry, ConfigArgs};
use clap::{Args, ValueEnum};
use colored::Colorize;
use sqlgate::{DatasourceDescriptor, QueryFacade, QueryParams, QueryResponse, Row, SqlValue};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Args)]
pub struct QueryCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Datasource id to run against
    #[arg(long, short = 'd')]
    pub datasource: String,

    /// SQL statement
    #[arg(long, short = 's')]
    pub sql: String,

    /// Positional parameter as INDEX=VALUE (repeatable, indices from 1)
    #[arg(long = "param", short = 'p', value_parser = parse_param)]
    pub params: Vec<(u32, SqlValue)>,

    /// Apply the read-only screen even without parameters
    #[arg(long)]
    pub read_only: bool,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "table")]
    pub output: OutputFormat,
}

/// Parse `INDEX=VALUE`; the value goes through [`SqlValue::parse_literal`]
fn parse_param(raw: &str) -> Result<(u32, SqlValue), String> {
    let (index, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected INDEX=VALUE, got '{}'", raw))?;
    let index: u32 = index
        .trim()
        .parse()
        .map_err(|_| format!("parameter index must be a positive integer, got '{}'", index))?;
    if index == 0 {
        return Err("parameter indices start at 1".to_string());
    }
    Ok((index, SqlValue::parse_literal(value)))
}

impl QueryCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = self.config.load()?;

        let rt = tokio::runtime::Runtime::new()?;
        let response = rt.block_on(async {
            let registry = build_registry(self.config.unknown_dialect.into()).await;
            let descriptors = target_only(config.datasources, &self.datasource);
            let report = registry.initialize(descriptors).await?;
            for (id, err) in &report.failed {
                debug!("Datasource '{}' unavailable: {}", id, err);
            }

            let params = self.query_params();
            let facade = QueryFacade::new(registry.clone());
            let result = facade
                .execute(&self.datasource, &self.sql, params.as_ref())
                .await;

            registry.shutdown_all().await;
            result
        })?;

        if let Some(stats) = &response.stats {
            info!("{} row(s) in {}ms", stats.row_count, stats.execution_ms);
        }

        match self.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
            OutputFormat::Table => print_table(&response),
        }

        match response.error {
            Some(failure) => Err(anyhow::anyhow!(
                "Query on '{}' failed ({})",
                self.datasource,
                failure.kind
            )),
            None => Ok(()),
        }
    }

    fn query_params(&self) -> Option<QueryParams> {
        if self.params.is_empty() && !self.read_only {
            return None;
        }
        Some(self.params.iter().cloned().collect())
    }
}

/// Only the queried datasource is provisioned; unrelated entries never open a pool
fn target_only(descriptors: Vec<DatasourceDescriptor>, id: &str) -> Vec<DatasourceDescriptor> {
    descriptors.into_iter().filter(|d| d.id == id).collect()
}

fn print_table(response: &QueryResponse) {
    if let Some(failure) = &response.error {
        eprintln!(
            "{} {}",
            format!("[{}]", failure.kind).bright_red().bold(),
            failure.message
        );
        return;
    }

    let rows = response.rows();
    let Some(first) = rows.first() else {
        println!("{}", "(0 rows)".bright_white());
        return;
    };

    let columns: Vec<&str> = first.columns().collect();
    let cells: Vec<Vec<String>> = rows.iter().map(|row| render_row(row, &columns)).collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header = columns
        .iter()
        .zip(&widths)
        .map(|(column, width)| format!("{:<width$}", column, width = width))
        .collect::<Vec<_>>()
        .join(" | ");
    println!("{}", header.bright_white().bold());
    println!(
        "{}",
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-")
    );

    for row in &cells {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join(" | ");
        println!("{}", line);
    }

    println!();
    println!(
        "{}",
        format!(
            "({} row{}, {}ms)",
            rows.len(),
            if rows.len() == 1 { "" } else { "s" },
            response.stats.as_ref().map(|s| s.execution_ms).unwrap_or(0)
        )
        .bright_white()
    );
}

fn render_row(row: &Row, columns: &[&str]) -> Vec<String> {
    columns
        .iter()
        .map(|column| match row.get(column) {
            None | Some(SqlValue::Null) => "NULL".to_string(),
            Some(SqlValue::Text(v)) => v.clone(),
            Some(SqlValue::Date(v)) => v.format("%Y-%m-%d").to_string(),
            Some(SqlValue::DateTime(v)) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Some(SqlValue::Bool(v)) => v.to_string(),
            Some(SqlValue::Int(v)) => v.to_string(),
            Some(SqlValue::Float(v)) => v.to_string(),
        })
        .collect()
}
