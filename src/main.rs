// Delegate Orchestrator - Main Entry Point
//
// Command-line front end for the delegation core:
// - Listing and verifying services
// - Quota status and usage reports
// - Running a delegated prompt against a named or auto-selected service

use anyhow::Result;
use chrono::Duration;
use clap::{Parser, Subcommand};
use delegate_orchestrator::config::{self, Config};
use delegate_orchestrator::delegation::{
    DelegationExecutor, DelegationRequest, Delegator, ExecutionResult, ExecutionTimeout,
    InvocationOptions, ServiceChoice,
};
use delegate_orchestrator::error::DelegationError;
use delegate_orchestrator::logging;
use delegate_orchestrator::quota::status::group_thousands;
use delegate_orchestrator::quota::{estimate_tokens, QuotaGuard, QuotaLimits, QuotaStatus};
use delegate_orchestrator::registry::{Requirements, ServiceRegistry};
use delegate_orchestrator::usage::{UsageStore, UsageSummary};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Delegate prompts to command-line AI services within their quotas
#[derive(Parser, Debug)]
#[command(name = "delegate")]
#[command(author = "Delegate Orchestrator Contributors")]
#[command(version)]
#[command(about = "Quota-aware delegation to command-line AI services", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// State directory (defaults to $DELEGATE_HOME or ~/.claude/hooks/delegation)
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered services
    Services,
    /// Check that a service is installed and authenticated
    Verify {
        /// Service name
        service: String,
    },
    /// Show quota health
    Status {
        /// Limit usage and limits to one service
        #[arg(long)]
        service: Option<String>,
    },
    /// Summarize recent usage
    Usage {
        /// Number of days to summarize
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=config::MAX_SUMMARY_DAYS))]
        days: Option<i64>,
    },
    /// Show the most recent failed delegations
    Errors {
        /// Number of errors to show
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Estimate tokens for a set of files
    Estimate {
        /// Prompt length in characters
        #[arg(long, default_value_t = 0)]
        prompt_length: u64,

        /// Files or directories to include
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delegate a prompt to a service
    Run {
        /// Service name, or "auto" to select one
        service: String,

        /// Prompt to send
        prompt: String,

        /// Files or directories passed as context
        #[arg(long, num_args = 1..)]
        files: Vec<PathBuf>,

        /// Model to request
        #[arg(long)]
        model: Option<String>,

        /// Output format to request
        #[arg(long)]
        format: Option<String>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f64>,

        /// Timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip the quota check
        #[arg(long)]
        force: bool,

        /// Auto-selection: prefer the largest context window
        #[arg(long)]
        large_context: bool,

        /// Auto-selection: require code execution
        #[arg(long)]
        code_execution: bool,

        /// Auto-selection: prefer the fastest service
        #[arg(long)]
        fast: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let home = args.home.clone().unwrap_or_else(config::default_home);
    let config_path = Config::config_path(&home);
    let (config, config_error) = match Config::load_from_path(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    logging::init(&config.logging, args.verbose)?;
    if let Some(e) = config_error {
        warn!("Using default configuration: {:#}", anyhow::Error::from(e));
    }
    debug!("Using state directory {:?}", home);

    let registry = Arc::new(config.build_registry());
    let store = Arc::new(UsageStore::open_with(&home, config.usage_settings()));

    match args.command {
        Commands::Services => {
            print_services(&registry);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Verify { service } => {
            let verification = registry.verify(&service).await;
            if verification.ready {
                println!("[OK] {} is available and authenticated", service);
                Ok(ExitCode::SUCCESS)
            } else {
                println!("[ERROR] {} has issues:", service);
                for issue in &verification.issues {
                    println!("  - {}", issue);
                }
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Status { service } => {
            store.prune();
            let (guard, limits) = match service {
                Some(name) => {
                    let limits = registry.resolve(&name)?.quota_limits;
                    (QuotaGuard::for_service(&store, name), limits)
                }
                None => (QuotaGuard::new(&store), QuotaLimits::default()),
            };
            print_status(&guard.status(&limits));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Usage { days } => {
            let days = days.unwrap_or(config.usage.summary_days);
            print_usage_summary(&store.summarize(Duration::days(days)));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Errors { count } => {
            let errors = store.recent_errors(count);
            if errors.is_empty() {
                println!("No recent errors");
            }
            for event in errors {
                let exit_code = event
                    .exit_code
                    .map_or_else(|| "-".to_string(), |c| c.to_string());
                println!(
                    "[{}] {} (exit code {}): {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.service,
                    exit_code,
                    event.error.as_deref().unwrap_or("").trim()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Estimate {
            prompt_length,
            paths,
        } => {
            println!(
                "Estimated tokens: {}",
                group_thousands(estimate_tokens(paths.as_slice(), prompt_length))
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run {
            service,
            prompt,
            files,
            model,
            format,
            temperature,
            timeout,
            force,
            large_context,
            code_execution,
            fast,
        } => {
            let executor = DelegationExecutor::with_config(store, config.executor_config());
            let delegator = Delegator::new(registry, executor);

            let choice: ServiceChoice = service.parse()?;
            let is_auto = choice == ServiceChoice::Auto;
            let mut request = DelegationRequest::new(choice, prompt)
                .with_files(files)
                .with_options(InvocationOptions {
                    model,
                    output_format: format,
                    temperature,
                })
                .with_requirements(Requirements {
                    large_context,
                    code_execution,
                    fast_response: fast,
                });
            if let Some(secs) = timeout {
                request = request.with_timeout(ExecutionTimeout::from_secs(secs));
            }
            if force {
                request = request.forced();
            }

            match delegator.delegate(request).await {
                Ok(report) => {
                    print_result(&report.result);
                    for warning in &report.status.warnings {
                        eprintln!("Quota warning: {}", warning);
                    }
                    Ok(if report.result.success {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::FAILURE
                    })
                }
                Err(DelegationError::QuotaDenied { service, reasons }) => {
                    println!("[ERROR] Quota check failed for {}:", service);
                    for reason in &reasons {
                        println!("  - {}", reason);
                    }
                    println!("Use --force to bypass");
                    Ok(ExitCode::FAILURE)
                }
                Err(e) if is_auto => {
                    println!("Auto-selection failed: {}", e);
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}

fn print_services(registry: &ServiceRegistry) {
    println!("Available services:");
    for service in registry.services() {
        println!(
            "  {}: {} ({})",
            service.name, service.command, service.auth_method
        );
    }
}

fn print_status(status: &QuotaStatus) {
    println!("Quota status: {}", status.level);
    println!(
        "  Requests last minute: {}",
        group_thousands(status.usage.requests_last_minute)
    );
    println!(
        "  Tokens last minute: {}",
        group_thousands(status.usage.tokens_last_minute)
    );
    println!(
        "  Daily requests: {}",
        group_thousands(status.usage.daily_requests)
    );
    println!(
        "  Daily tokens: {}",
        group_thousands(status.usage.daily_tokens)
    );
    if !status.warnings.is_empty() {
        println!("Warnings:");
        for warning in &status.warnings {
            println!("  - {}", warning);
        }
    }
}

fn print_usage_summary(summary: &UsageSummary) {
    println!("Delegation Usage Summary");
    println!("{}", "=".repeat(25));
    println!("Total requests: {}", summary.total_requests);
    println!("Success rate: {:.1}%", summary.success_rate());
    println!("Total tokens: {}", group_thousands(summary.total_tokens));

    if summary.services.is_empty() {
        return;
    }
    println!();
    println!("By service:");
    for (name, usage) in &summary.services {
        println!("  {}:", name);
        println!("    Requests: {}", usage.requests);
        println!("    Success rate: {:.1}%", usage.success_rate());
        println!("    Tokens used: {}", group_thousands(usage.tokens_used));
        println!("    Avg duration: {:.2}s", usage.avg_duration());
    }
}

fn print_result(result: &ExecutionResult) {
    if result.success {
        println!("[OK] Delegation successful");
        println!("Service: {}", result.service);
        println!("Duration: {:.2}s", result.duration);
        println!("Tokens used: {}", group_thousands(result.estimated_tokens));
        println!();
        println!("Output:");
        println!("{}", result.stdout);
    } else {
        println!("[ERROR] Delegation failed");
        println!("Service: {}", result.service);
        println!("Duration: {:.2}s", result.duration);
        let exit_code = result
            .exit_code
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        println!("Exit code: {}", exit_code);
        println!();
        println!("Error:");
        println!("{}", result.stderr);
    }
}
