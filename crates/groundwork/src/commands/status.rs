//! Local status summary
//!
//! Reads only the locally persisted registry, descriptors and report.

use colored::Colorize;
use groundwork_core::{
    AccountRegistry, BackendDescriptor, BootstrapReport, Environment, ProjectConfig, RunStatus,
};
use std::path::Path;

pub async fn handle(root: &Path, config: &ProjectConfig) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("Project '{}' ({})", config.project, config.region)
            .blue()
            .bold()
    );
    println!();

    println!("{}", "Accounts:".bold());
    match AccountRegistry::load(root).await? {
        Some(registry) => {
            println!(
                "  {} management - {}",
                "•".cyan(),
                registry.management_account_id
            );
            for env in Environment::ALL {
                match registry.account_id(env) {
                    Some(id) => println!("  {} {} - {}", "•".cyan(), env, id),
                    None => println!(
                        "  {} {} - {}",
                        "•".cyan(),
                        env,
                        "not provisioned".dimmed()
                    ),
                }
            }
        }
        None => println!(
            "  {}",
            "not provisioned (run `ground up` to bootstrap)".yellow()
        ),
    }

    println!();
    println!("{}", "Backends:".bold());
    for env in Environment::ALL {
        match BackendDescriptor::load(root, env).await? {
            Some(descriptor) => println!(
                "  {} {} - {} ({})",
                "•".cyan(),
                env,
                descriptor.bucket,
                descriptor.region
            ),
            None => println!("  {} {} - {}", "•".cyan(), env, "no descriptor".dimmed()),
        }
    }

    println!();
    match BootstrapReport::load(root).await? {
        Some(report) => {
            let status = match report.status {
                RunStatus::Success => "success".green(),
                RunStatus::Failure => "failure".red(),
            };
            println!(
                "{} {} at {} ({} stages passed, {} warnings)",
                "Last run:".bold(),
                status,
                report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                report.stages_passed,
                report.warnings.len()
            );
        }
        None => println!("{}", "No bootstrap report yet.".dimmed()),
    }

    Ok(())
}
