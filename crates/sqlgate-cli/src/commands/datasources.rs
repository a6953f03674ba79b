use crate::bootstrap::{build_registry, ConfigArgs};
use clap::Args;
use colored::Colorize;
use sqlgate::DatasourceDescriptor;

#[derive(Args)]
pub struct DatasourcesCommand {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl DatasourcesCommand {
    /// List descriptors without opening any connection
    pub fn execute(self) -> anyhow::Result<()> {
        let config = self.config.load()?;

        let rt = tokio::runtime::Runtime::new()?;
        let registry = rt.block_on(build_registry(self.config.unknown_dialect.into()));
        let dialects = rt.block_on(registry.list_dialects());

        println!(
            "{} {}",
            "Available dialects:".bright_white().bold(),
            dialects.join(", ").bright_cyan()
        );
        println!();

        if config.datasources.is_empty() {
            println!("{}", "No datasources configured.".bright_yellow());
            return Ok(());
        }

        for descriptor in &config.datasources {
            let supported = rt.block_on(registry.has_dialect(&descriptor.dialect));
            println!("{}", describe(descriptor, supported));
        }
        Ok(())
    }
}

fn describe(descriptor: &DatasourceDescriptor, supported: bool) -> String {
    let dialect = if supported {
        descriptor.dialect_name().bright_cyan()
    } else {
        format!("{} (no backend)", descriptor.dialect_name()).bright_red()
    };
    format!(
        "{} {} {} pool={} timeout={}ms{}",
        descriptor.id.bright_white().bold(),
        dialect,
        descriptor.redacted_url(),
        descriptor.max_pool_size,
        descriptor.connection_timeout_ms,
        if descriptor.lazy { " lazy" } else { "" }
    )
}
