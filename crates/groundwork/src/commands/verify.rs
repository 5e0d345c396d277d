//! Standalone read-only verification

use colored::Colorize;
use groundwork_cloud::AwsCli;
use groundwork_core::{AccountRegistry, ProjectConfig};
use groundwork_provision::verify_provisioning;
use std::path::Path;

pub async fn handle(root: &Path, config: &ProjectConfig) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("Verifying '{}' in {}", config.project, config.region)
            .blue()
            .bold()
    );
    println!();

    AwsCli::check_cli().await?;
    let aws = AwsCli::new(&config.region);
    let registry = AccountRegistry::load_required(root).await?;

    let findings = verify_provisioning(&aws, config, &registry).await?;
    for finding in &findings {
        if finding.ok {
            println!("  {} {} - {}", "✓".green(), finding.subject, finding.detail);
        } else {
            println!("  {} {} - {}", "✗".red(), finding.subject, finding.detail.red());
        }
    }

    let failed = findings.iter().filter(|f| !f.ok).count();
    println!();
    if failed > 0 {
        anyhow::bail!("{} of {} verification checks failed", failed, findings.len());
    }
    println!(
        "{}",
        format!("✓ all {} checks passed", findings.len()).green().bold()
    );
    Ok(())
}
