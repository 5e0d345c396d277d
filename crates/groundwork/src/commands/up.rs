//! Provisioning pipeline
//!
//! Assembles the nine bootstrap stages and runs them through the staged
//! executor. Prerequisite, account and backend stages are fatal; console
//! links and post-hoc verification are best-effort.

use colored::Colorize;
use groundwork_cloud::AwsCli;
use groundwork_core::{AccountRegistry, Environment, ProjectConfig, naming};
use groundwork_provision::resources::{
    DeployRoleResource, FederationProviderResource, IDENTITY_PROPAGATION_WAIT,
    OrganizationResource, ensure_ou_path,
};
use groundwork_provision::{
    AccountLifecycleManager, BackendProvisioner, BackendSpec, DesiredAccount, FailurePolicy,
    Pipeline, ProvisionError, StageOutput, Tofu, reconcile, verify_provisioning,
};
use std::path::Path;

const STAGES: [&str; 9] = [
    "Verify operator credentials",
    "Ensure organization",
    "Ensure organizational units",
    "Ensure member accounts",
    "Confirm accounts active",
    "Ensure identity federation",
    "Provision state backends",
    "Generate console links",
    "Verify provisioning",
];

pub async fn handle(
    root: &Path,
    config: &ProjectConfig,
    dry_run: bool,
    recreate_backend: bool,
) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("Bootstrapping '{}' in {}", config.project, config.region)
            .blue()
            .bold()
    );
    if dry_run {
        println!("{}", "dry-run: no changes will be made".yellow());
    }
    println!();

    let mut pipeline = Pipeline::new(&STAGES, dry_run);
    let aws = AwsCli::new(&config.region);

    let outcome = run_stages(&mut pipeline, &aws, root, config, recreate_backend).await;
    if outcome.is_ok() {
        pipeline.complete();
    }

    // The report is written on the success and the failure path alike.
    let report = pipeline.report();
    let report_path = report.save(root).await?;

    println!();
    match &outcome {
        Ok(()) => println!(
            "{}",
            format!(
                "✓ bootstrap finished in {}s ({} stages passed, {} warnings)",
                report.duration_ms / 1000,
                report.stages_passed,
                report.warnings.len()
            )
            .green()
            .bold()
        ),
        Err(e) => {
            println!("{}", format!("✗ bootstrap failed: {}", e).red().bold());
            println!("  re-running `ground up` resumes from converged state");
        }
    }
    println!("  report: {}", report_path.display().to_string().dimmed());

    outcome.map_err(Into::into)
}

async fn run_stages(
    pipeline: &mut Pipeline,
    aws: &AwsCli,
    root: &Path,
    config: &ProjectConfig,
    recreate_backend: bool,
) -> Result<(), ProvisionError> {
    let dry_run = pipeline.dry_run();

    pipeline
        .run_stage(STAGES[0], FailurePolicy::Fatal, || async move {
            if dry_run {
                return Ok(StageOutput::summary("skipped (dry-run)"));
            }
            AwsCli::check_cli().await?;
            let identity = aws.caller_identity().await?;
            Ok(
                StageOutput::summary(format!("operating as account {}", identity.account))
                    .with_resource("operator", identity.arn),
            )
        })
        .await?;

    let mut management_id: Option<String> = None;
    {
        let slot = &mut management_id;
        pipeline
            .run_stage(STAGES[1], FailurePolicy::Fatal, move || async move {
                let outcome = reconcile(&OrganizationResource::new(aws), dry_run).await?;
                match outcome.observation() {
                    Some(obs) => {
                        *slot = obs.attribute("management_account_id").map(str::to_string);
                        Ok(StageOutput::summary(format!(
                            "organization {} ({})",
                            obs.id,
                            outcome.describe()
                        ))
                        .with_resource("organization", obs.id.clone()))
                    }
                    None => Ok(StageOutput::summary("would create organization")),
                }
            })
            .await?;
    }

    let mut ou_id: Option<String> = None;
    {
        let slot = &mut ou_id;
        let project = config.project.as_str();
        pipeline
            .run_stage(STAGES[2], FailurePolicy::Fatal, move || async move {
                if dry_run {
                    return Ok(StageOutput::summary(format!(
                        "would ensure organizational units {}/{}",
                        naming::WORKLOADS_OU,
                        project
                    )));
                }
                let roots = aws.list_roots().await?;
                let Some(org_root) = roots.first() else {
                    return Err(ProvisionError::InvalidState {
                        what: "organization has no root container".to_string(),
                        remediation: "run the organization-provisioning step (`ground up`) first"
                            .to_string(),
                    });
                };
                let segments = [naming::WORKLOADS_OU, project];
                let (resolved, outcomes) =
                    ensure_ou_path(aws, &org_root.id, &segments, false).await?;
                let Some(ou) = resolved else {
                    return Err(ProvisionError::InvalidState {
                        what: "organizational unit path could not be resolved".to_string(),
                        remediation: "re-run `ground up`".to_string(),
                    });
                };
                let created = outcomes.iter().filter(|o| o.is_created()).count();
                *slot = Some(ou.clone());
                Ok(StageOutput::summary(format!(
                    "{}/{} ready ({} created)",
                    naming::WORKLOADS_OU,
                    project,
                    created
                ))
                .with_resource("organizational-unit", ou))
            })
            .await?;
    }

    let mut accounts: Vec<(Environment, String)> = Vec::new();
    {
        let slot = &mut accounts;
        let ou = ou_id.clone();
        let management = management_id.clone();
        pipeline
            .run_stage(STAGES[3], FailurePolicy::Fatal, move || async move {
                let existing = AccountRegistry::load(root).await?;
                if dry_run {
                    let recorded = Environment::ALL
                        .iter()
                        .filter(|env| {
                            existing.as_ref().and_then(|r| r.account_id(**env)).is_some()
                        })
                        .count();
                    return Ok(StageOutput::summary(format!(
                        "would ensure {} member accounts ({} recorded in registry)",
                        Environment::ALL.len(),
                        recorded
                    )));
                }

                let mut registry = match existing {
                    Some(registry) => registry,
                    None => {
                        let management = management.ok_or_else(|| ProvisionError::InvalidState {
                            what: "management account identifier is unknown".to_string(),
                            remediation: "run the organization-provisioning step (`ground up`) first"
                                .to_string(),
                        })?;
                        AccountRegistry::new(&config.project, management)
                    }
                };

                let manager = AccountLifecycleManager::new(aws);
                let mut output = StageOutput::ok();
                let mut summaries = Vec::new();
                for env in Environment::ALL {
                    let desired = DesiredAccount {
                        project: config.project.clone(),
                        environment: env,
                        base_email: config.account_email.clone(),
                    };
                    let recorded = registry.account_id(env).map(str::to_string);
                    let outcome = manager
                        .ensure_account(&desired, recorded.as_deref(), false)
                        .await?;
                    let Some(id) = outcome.account_id().map(str::to_string) else {
                        continue;
                    };
                    if let Some(ou) = &ou {
                        manager.place_in_ou(&id, ou).await?;
                    }
                    registry.set_account(env, id.clone());
                    output.push_resource(format!("account/{}", env), id.clone());
                    summaries.push(format!("{} {}", env, outcome.describe()));
                    slot.push((env, id));
                }
                registry.save(root).await?;

                output.set_summary(summaries.join(", "));
                Ok(output)
            })
            .await?;
    }

    {
        let targets = accounts.clone();
        pipeline
            .run_stage(STAGES[4], FailurePolicy::Fatal, move || async move {
                if dry_run {
                    return Ok(StageOutput::summary("skipped (dry-run)"));
                }
                let manager = AccountLifecycleManager::new(aws);
                manager.confirm_all_active(&targets).await?;
                Ok(StageOutput::summary(format!(
                    "{} accounts confirmed active",
                    targets.len()
                )))
            })
            .await?;
    }

    {
        let targets = accounts.clone();
        pipeline
            .run_stage(STAGES[5], FailurePolicy::Fatal, move || async move {
                if dry_run {
                    return Ok(StageOutput::summary(
                        "would ensure federation provider and deployment role per account",
                    ));
                }
                let mut output = StageOutput::ok();
                let mut created_any = false;
                for (env, account_id) in &targets {
                    let scoped = aws.assume_role(account_id, &config.operator_role).await?;

                    let provider = FederationProviderResource::new(
                        &scoped,
                        &config.token_issuer,
                        config.issuer_host(),
                    );
                    let provider_outcome = reconcile(&provider, false).await?;
                    created_any |= provider_outcome.is_created();

                    let role_name = naming::role_name(&config.project, *env);
                    let role = DeployRoleResource::new(
                        &scoped,
                        &role_name,
                        account_id,
                        config.issuer_host(),
                        &config.repository,
                    );
                    let role_outcome = reconcile(&role, false).await?;
                    created_any |= role_outcome.is_created();
                    if let Some(arn) = role_outcome.observation().and_then(|o| o.arn.clone()) {
                        output.push_resource(format!("role/{}", env), arn);
                    }
                }

                if created_any {
                    // No reliable propagation probe exists for new identity
                    // resources; wait instead of polling.
                    tokio::time::sleep(IDENTITY_PROPAGATION_WAIT).await;
                }
                output.set_summary(format!("federation ready for {} accounts", targets.len()));
                Ok(output)
            })
            .await?;
    }

    {
        let targets = accounts.clone();
        pipeline
            .run_stage(STAGES[6], FailurePolicy::Fatal, move || async move {
                if dry_run {
                    return Ok(StageOutput::summary(
                        "would provision bucket, lock table and key per account",
                    ));
                }
                let tool = Tofu::detect(root.join(&config.backend_module)).await?;
                let mut output = StageOutput::ok();
                for (env, account_id) in &targets {
                    let scoped = aws.assume_role(account_id, &config.operator_role).await?;
                    let spec = BackendSpec {
                        project: config.project.clone(),
                        environment: *env,
                        region: config.region.clone(),
                        account_id: account_id.clone(),
                    };
                    let provisioner =
                        BackendProvisioner::new(&scoped, &tool, false, recreate_backend);
                    let backend = provisioner
                        .ensure_backend(&spec, scoped.credentials().cloned())
                        .await?;
                    for warning in backend.warnings {
                        output.push_warning(warning);
                    }
                    output.push_resource(
                        format!("backend/{}", env),
                        backend.descriptor.bucket.clone(),
                    );
                    backend.descriptor.save(root).await?;
                }
                output.set_summary(format!("{} backends ready", targets.len()));
                Ok(output)
            })
            .await?;
    }

    {
        let targets = accounts.clone();
        pipeline
            .run_stage(STAGES[7], FailurePolicy::Warn, move || async move {
                if targets.is_empty() {
                    return Ok(StageOutput::summary("skipped (dry-run)"));
                }
                let mut output = StageOutput::ok();
                for (env, account_id) in &targets {
                    output.push_resource(
                        format!("console/{}", env),
                        format!("https://{}.signin.aws.amazon.com/console", account_id),
                    );
                }
                output.set_summary(format!("{} console links recorded", targets.len()));
                Ok(output)
            })
            .await?;
    }

    pipeline
        .run_stage(STAGES[8], FailurePolicy::Warn, || async move {
            if dry_run {
                return Ok(StageOutput::summary("skipped (dry-run)"));
            }
            let registry = AccountRegistry::load_required(root).await?;
            let findings = verify_provisioning(aws, config, &registry).await?;
            let failed = findings.iter().filter(|f| !f.ok).count();
            if failed > 0 {
                return Err(ProvisionError::InvalidState {
                    what: format!("{} of {} verification checks failed", failed, findings.len()),
                    remediation: "run `ground verify` for details".to_string(),
                });
            }
            Ok(StageOutput::summary(format!(
                "{} checks passed",
                findings.len()
            )))
        })
        .await?;

    Ok(())
}
