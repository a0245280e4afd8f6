mod artifact;
mod cli;
mod config;
mod task_id;

use std::path::PathBuf;

use clap::Parser;
use mco_core::{
    Dispatcher, EnforcementMode, Mode, MoCoError, PathConstraints, ProviderEntry, ProviderSpec,
    Task,
};
use mco_providers::Registry;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ResultMode, TaskArgs};
use config::FileConfig;

const EXIT_USAGE: i32 = 64;
const EXIT_INTERNAL: i32 = 70;

fn main() {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Review(args) | Command::Run(args) => args.verbose,
    };
    init_tracing(verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            std::process::exit(EXIT_INTERNAL);
        }
    };

    let exit_code = runtime.block_on(run(cli));
    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn run(cli: Cli) -> i32 {
    let (mode, args) = match cli.command {
        Command::Review(args) => (Mode::Review, args),
        Command::Run(args) => (Mode::Run, args),
    };

    match run_task(mode, args).await {
        Ok(exit_code) => exit_code,
        Err(CliError::Usage(detail)) => {
            eprintln!("mco: {detail}");
            EXIT_USAGE
        }
        Err(CliError::Internal(err)) => {
            eprintln!("mco: internal error: {err}");
            EXIT_INTERNAL
        }
    }
}

/// Two exit-code tiers: a malformed invocation (bad flags, unknown
/// provider, unreadable prompt file) is a usage error; an
/// orchestrator-internal failure (config parse, filesystem unwritable) is
/// distinct and never blamed on the caller's command line.
enum CliError {
    Usage(String),
    Internal(MoCoError),
}

impl From<MoCoError> for CliError {
    fn from(err: MoCoError) -> Self {
        match err {
            MoCoError::InvalidRepoPath { .. }
            | MoCoError::NoProvidersRequested
            | MoCoError::UnknownProvider { .. } => CliError::Usage(err.to_string()),
            internal => CliError::Internal(internal),
        }
    }
}

async fn run_task(mode: Mode, args: TaskArgs) -> Result<i32, CliError> {
    if !args.repo.is_dir() {
        return Err(MoCoError::InvalidRepoPath { path: args.repo.clone() }.into());
    }

    let prompt = resolve_prompt(&args)?;

    let file_config = FileConfig::load(args.config.as_deref())?;

    let registry = Registry::builtin();
    let provider_ids = resolve_provider_ids(&args, &file_config, &registry)?;

    let cli_enforcement: Option<EnforcementMode> = args.enforcement_mode.map(Into::into);
    let policy = config::merge_policy(
        &file_config,
        args.stall_timeout,
        args.review_hard_timeout,
        args.max_parallelism,
        cli_enforcement,
    );

    let path_constraints = PathConstraints {
        allow_paths: args.allow_paths.clone(),
        target_paths: args.target_paths.clone(),
        enforcement_mode: policy.enforcement_mode,
    };

    let task = Task::new(
        task_id::new_task_id(),
        mode,
        prompt,
        args.repo.clone(),
        provider_ids.clone(),
        policy,
        path_constraints,
    );

    let entries = build_provider_entries(&provider_ids, &file_config, &registry)?;

    if args.dry_run {
        print_dry_run(&task, &entries).await;
        return Ok(0);
    }

    let dispatcher = Dispatcher::new();
    let external_cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let result = dispatcher.run_task(&task, entries, external_cancel).await;

    match args.result_mode {
        ResultMode::Artifact => {
            write_artifacts(&file_config, &task, &result)?;
        }
        ResultMode::Stdout => {
            print_json(&task, &result);
        }
        ResultMode::Both => {
            write_artifacts(&file_config, &task, &result)?;
            print_json(&task, &result);
        }
    }

    if args.json && args.result_mode == ResultMode::Artifact {
        print_json(&task, &result);
    }

    Ok(result.decision.exit_code())
}

fn resolve_prompt(args: &TaskArgs) -> Result<String, CliError> {
    match (&args.prompt, &args.prompt_file) {
        (Some(p), _) => Ok(p.clone()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map(|s| s.trim().to_string())
            .map_err(|source| CliError::Usage(format!("failed to read --prompt-file {path:?}: {source}"))),
        (None, None) => Err(CliError::Usage("one of --prompt or --prompt-file is required".to_string())),
    }
}

fn resolve_provider_ids(
    args: &TaskArgs,
    file_config: &FileConfig,
    registry: &Registry,
) -> Result<Vec<String>, CliError> {
    let ids: Vec<String> = if let Some(cli_ids) = &args.providers {
        cli_ids.iter().map(|s| s.trim().to_string()).collect()
    } else if !file_config.providers.is_empty() {
        file_config.providers.iter().map(|p| p.id.clone()).collect()
    } else {
        registry.provider_ids().map(str::to_string).collect()
    };

    if ids.is_empty() {
        return Err(CliError::Usage("no providers requested".to_string()));
    }
    for id in &ids {
        if registry.get(id).is_none() {
            return Err(MoCoError::UnknownProvider { id: id.clone() }.into());
        }
    }
    Ok(ids)
}

fn build_provider_entries(
    provider_ids: &[String],
    file_config: &FileConfig,
    registry: &Registry,
) -> Result<Vec<ProviderEntry>, CliError> {
    let mut entries = Vec::with_capacity(provider_ids.len());
    for id in provider_ids {
        let adapter = registry
            .get(id)
            .ok_or_else(|| MoCoError::UnknownProvider { id: id.clone() })?;
        let binary_name = mco_providers::default_binary_name(id).unwrap_or(id.as_str()).to_string();
        let mut spec = ProviderSpec::new(id.clone(), binary_name);
        spec.binary_override = file_config.binary_override(id);
        entries.push(ProviderEntry { spec, adapter });
    }
    Ok(entries)
}

fn write_artifacts(
    file_config: &FileConfig,
    task: &Task,
    result: &mco_core::RunResult,
) -> Result<(), CliError> {
    let artifact_base = PathBuf::from(file_config.artifact_base());
    artifact::write_run(&artifact_base, task, result)?;
    let state_path = PathBuf::from(file_config.state_file());
    artifact::write_state_file(&state_path, task, result)?;
    Ok(())
}

/// Emits the same `RunResult` document the artifact writer puts in
/// `run.json` — the aggregator returns one document regardless of sink.
fn print_json(task: &Task, result: &mco_core::RunResult) {
    let doc = artifact::run_result_json(task, result);
    println!("{}", serde_json::to_string_pretty(&doc).unwrap_or_default());
}

async fn print_dry_run(task: &Task, entries: &[ProviderEntry]) {
    println!("task_id:  {}", task.task_id);
    println!("mode:     {}", task.mode.as_str());
    println!("repo:     {}", task.repo_path.display());
    println!("policy:   {:?}", task.policy);
    println!("providers:");
    for entry in entries {
        let detect = entry.adapter.detect(&entry.spec).await;
        match detect {
            mco_core::DetectResult::NotDetected => {
                println!("  {} -> not detected on PATH ({})", entry.spec.id, entry.spec.binary_name);
            }
            mco_core::DetectResult::Detected { resolved_binary, auth_ok } => {
                match entry.adapter.build_invocation(task, &resolved_binary, &task.path_constraints) {
                    Ok(invocation) => println!(
                        "  {} -> {} {} (auth_ok={auth_ok})",
                        entry.spec.id,
                        invocation.program.display(),
                        invocation.args.join(" "),
                    ),
                    Err(err) => println!("  {} -> permission_unmet: {err}", entry.spec.id),
                }
            }
        }
    }
}
