use crate::bootstrap::{build_registry, ConfigArgs};
use clap::Args;
use colored::Colorize;
use sqlgate::{DatasourceDescriptor, InitReport};
use tracing::info;

#[derive(Args)]
pub struct CheckCommand {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Only check these datasource ids (repeatable)
    #[arg(long = "only")]
    pub only: Vec<String>,
}

impl CheckCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let config = self.config.load()?;
        let descriptors = eager(config.datasources, &self.only);
        if descriptors.is_empty() {
            anyhow::bail!("No datasources to check");
        }

        info!("Checking {} datasource(s)", descriptors.len());

        let rt = tokio::runtime::Runtime::new()?;
        let report = rt.block_on(async {
            let registry = build_registry(self.config.unknown_dialect.into()).await;
            let report = registry.initialize(descriptors).await?;

            for id in &report.registered {
                let status = registry
                    .get_strategy(id)
                    .await
                    .ok()
                    .and_then(|strategy| strategy.pool_status());
                match status {
                    Some(status) => println!(
                        "{} {} ({} open, {} idle, max {})",
                        "✓".bright_green(),
                        id.bright_white().bold(),
                        status.size,
                        status.idle,
                        status.max_size
                    ),
                    None => println!("{} {}", "✓".bright_green(), id.bright_white().bold()),
                }
            }

            registry.shutdown_all().await;
            Ok::<InitReport, sqlgate::DataError>(report)
        })?;

        for skipped in &report.skipped {
            println!(
                "{} {} skipped: {}",
                "-".bright_yellow(),
                skipped.id.bright_white().bold(),
                skipped.reason
            );
        }
        for (id, err) in &report.failed {
            println!("{} {} {}", "✗".bright_red(), id.bright_white().bold(), err);
        }

        if !report.failed.is_empty() {
            anyhow::bail!("{} datasource(s) failed", report.failed.len());
        }
        Ok(())
    }
}

/// Force eager pools so provisioning opens a connection, optionally filtered by id
fn eager(descriptors: Vec<DatasourceDescriptor>, only: &[String]) -> Vec<DatasourceDescriptor> {
    descriptors
        .into_iter()
        .filter(|d| only.is_empty() || only.iter().any(|id| id == &d.id))
        .map(|d| d.with_lazy(false))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eager_filters_and_disables_lazy() {
        let descriptors = vec![
            DatasourceDescriptor::new("pg1", "postgresql", "postgres://h/db"),
            DatasourceDescriptor::new("my1", "mysql", "mysql://h/db"),
        ];

        let all = eager(descriptors.clone(), &[]);
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|d| !d.lazy));

        let only = eager(descriptors, &["my1".to_string()]);
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].id, "my1");
    }
}
