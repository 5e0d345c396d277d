//! Teardown pipeline
//!
//! Reverse of provisioning: backend sub-resources first, then deployment
//! roles and federation providers, then — only when explicitly requested
//! — member-account closure. Destructive, so it refuses to run without
//! `--yes` (dry-run excepted).

use colored::Colorize;
use groundwork_cloud::{AccountsApi, AwsCli};
use groundwork_core::{AccountRegistry, BackendDescriptor, Environment, ProjectConfig, naming};
use groundwork_provision::{
    BackendSpec, FailurePolicy, Pipeline, ProvisionError, StageOutput, close_accounts,
    remove_federation, tear_down_backend,
};
use std::path::Path;

const STAGES: [&str; 6] = [
    "Verify operator credentials",
    "Load account registry",
    "Destroy state backends",
    "Remove deployment roles and federation",
    "Close member accounts",
    "Remove local backend descriptors",
];

pub async fn handle(
    root: &Path,
    config: &ProjectConfig,
    dry_run: bool,
    close_requested: bool,
    yes: bool,
) -> anyhow::Result<()> {
    if !dry_run && !yes {
        println!(
            "{}",
            "⚠ `ground down` destroys the state backends; their contents are unrecoverable"
                .red()
                .bold()
        );
        if close_requested {
            println!("  --close-accounts additionally closes the member accounts (long cool-down before the emails can be reused)");
        }
        println!("  pass --yes to proceed, or --dry-run to preview");
        return Ok(());
    }

    println!(
        "{}",
        format!("Tearing down '{}' in {}", config.project, config.region)
            .yellow()
            .bold()
    );
    if dry_run {
        println!("{}", "dry-run: no changes will be made".yellow());
    }
    println!();

    let mut pipeline = Pipeline::new(&STAGES, dry_run);
    let aws = AwsCli::new(&config.region);

    let outcome = run_stages(&mut pipeline, &aws, root, config, close_requested).await;
    if outcome.is_ok() {
        pipeline.complete();
    }

    let report = pipeline.report();
    let report_path = report.save(root).await?;

    println!();
    match &outcome {
        Ok(()) => println!(
            "{}",
            format!(
                "✓ teardown finished in {}s ({} warnings)",
                report.duration_ms / 1000,
                report.warnings.len()
            )
            .green()
            .bold()
        ),
        Err(e) => println!("{}", format!("✗ teardown failed: {}", e).red().bold()),
    }
    println!("  report: {}", report_path.display().to_string().dimmed());

    outcome.map_err(Into::into)
}

async fn run_stages(
    pipeline: &mut Pipeline,
    aws: &AwsCli,
    root: &Path,
    config: &ProjectConfig,
    close_requested: bool,
) -> Result<(), ProvisionError> {
    let dry_run = pipeline.dry_run();

    pipeline
        .run_stage(STAGES[0], FailurePolicy::Fatal, || async move {
            if dry_run {
                return Ok(StageOutput::summary("skipped (dry-run)"));
            }
            AwsCli::check_cli().await?;
            let identity = aws.caller_identity().await?;
            Ok(StageOutput::summary(format!(
                "operating as account {}",
                identity.account
            )))
        })
        .await?;

    let mut targets: Vec<(Environment, String)> = Vec::new();
    {
        let slot = &mut targets;
        pipeline
            .run_stage(STAGES[1], FailurePolicy::Fatal, move || async move {
                let registry = AccountRegistry::load_required(root).await?;
                for env in Environment::ALL {
                    if let Some(id) = registry.account_id(env) {
                        slot.push((env, id.to_string()));
                    }
                }
                Ok(StageOutput::summary(format!(
                    "{} accounts recorded",
                    slot.len()
                )))
            })
            .await?;
    }

    {
        let targets = targets.clone();
        pipeline
            .run_stage(STAGES[2], FailurePolicy::Fatal, move || async move {
                if dry_run {
                    return Ok(StageOutput::summary(format!(
                        "would drain and remove {} state backends",
                        targets.len()
                    )));
                }
                let mut output = StageOutput::ok();
                let mut removed = 0;
                let mut skipped = 0;
                for (env, account_id) in &targets {
                    let status = AccountsApi::account_status(aws, account_id).await?;
                    if !status.is_usable() {
                        // Resources in an unusable account are already
                        // unreachable; attempting deletion would only fail.
                        output.push_warning(format!(
                            "{}: account {} is {}, backend skipped",
                            env, account_id, status
                        ));
                        skipped += 1;
                        continue;
                    }
                    let scoped = aws.assume_role(account_id, &config.operator_role).await?;
                    let spec = BackendSpec {
                        project: config.project.clone(),
                        environment: *env,
                        region: config.region.clone(),
                        account_id: account_id.clone(),
                    };
                    for warning in tear_down_backend(&scoped, &spec, false).await? {
                        output.push_warning(warning);
                    }
                    removed += 1;
                }
                output.set_summary(format!("{} backends removed, {} skipped", removed, skipped));
                Ok(output)
            })
            .await?;
    }

    {
        let targets = targets.clone();
        pipeline
            .run_stage(STAGES[3], FailurePolicy::Fatal, move || async move {
                if dry_run {
                    return Ok(StageOutput::summary(
                        "would remove deployment roles and federation providers",
                    ));
                }
                let mut output = StageOutput::ok();
                let mut removed = 0;
                let mut skipped = 0;
                for (env, account_id) in &targets {
                    let status = AccountsApi::account_status(aws, account_id).await?;
                    if !status.is_usable() {
                        output.push_warning(format!(
                            "{}: account {} is {}, federation skipped",
                            env, account_id, status
                        ));
                        skipped += 1;
                        continue;
                    }
                    let scoped = aws.assume_role(account_id, &config.operator_role).await?;
                    let role_name = naming::role_name(&config.project, *env);
                    remove_federation(&scoped, &role_name, config.issuer_host(), false).await?;
                    removed += 1;
                }
                output.set_summary(format!(
                    "{} accounts cleaned, {} skipped",
                    removed, skipped
                ));
                Ok(output)
            })
            .await?;
    }

    {
        let targets = targets.clone();
        pipeline
            .run_stage(STAGES[4], FailurePolicy::Fatal, move || async move {
                if !close_requested {
                    return Ok(StageOutput::summary(
                        "skipped (pass --close-accounts to close)",
                    ));
                }
                if dry_run {
                    return Ok(StageOutput::summary(format!(
                        "would close {} accounts",
                        targets.len()
                    )));
                }
                let summary = close_accounts(aws, &targets, false).await?;
                let mut output = StageOutput::summary(format!(
                    "closed {}, failed {}, skipped {}",
                    summary.closed, summary.failed, summary.skipped
                ));
                if summary.failed > 0 {
                    output.push_warning(format!("{} account closures failed", summary.failed));
                }
                Ok(output)
            })
            .await?;
    }

    pipeline
        .run_stage(STAGES[5], FailurePolicy::Warn, || async move {
            if dry_run {
                return Ok(StageOutput::summary("would remove backend descriptors"));
            }
            let mut removed = 0;
            for env in Environment::ALL {
                if BackendDescriptor::remove(root, env).await? {
                    removed += 1;
                }
            }
            Ok(StageOutput::summary(format!(
                "{} descriptors removed",
                removed
            )))
        })
        .await?;

    Ok(())
}
