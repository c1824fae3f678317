//! Command-line front end for `schedfetch-core`.

pub mod cli_args;

use anyhow::{Context, Result, bail};
use schedfetch_core::{
    AggregateStatus, ConfigLoadResult, EnvSnapshot, LoggingDestination, RunOptions, RunReport,
    TopicStatus, cleanup_scratch, default_base_directory, init_logging, load_catalog,
    render_local_today, resolve_config, run_fetch, topic_status,
};
use tracing::warn;

use crate::cli_args::{Cli, Command};

/// Execute the parsed command line. An `Err` means exit status 1.
pub fn dispatch(cli: Cli) -> Result<()> {
    let options = cli.run_options(default_base_directory());
    let destination = if cli.global.quiet {
        LoggingDestination::FileOnly
    } else {
        LoggingDestination::FileAndStderr
    };
    if let Err(err) = init_logging(destination, &options.resolver().log_directory()) {
        eprintln!("Warning: logging unavailable: {err}");
    }

    match cli.command() {
        Command::Run(_) => run(&options),
        Command::Render => render(&options),
        Command::Topics => topics(&options),
        Command::Cleanup => cleanup(&options),
        Command::Config => show_config(&options),
    }
}

fn run(options: &RunOptions) -> Result<()> {
    let report = run_fetch(options, EnvSnapshot::from_process());
    for line in format_report(&report) {
        println!("{line}");
    }
    report_result(report)
}

/// Exit status for a finished run: `Ok` whenever the run reached `Done`,
/// even if every topic failed.
pub fn report_result(report: RunReport) -> Result<()> {
    if let Some(err) = report.failure {
        return Err(err).context("schedule fetch failed");
    }
    if !report.is_done() {
        bail!("schedule fetch ended in phase {}", report.phase);
    }
    Ok(())
}

fn render(options: &RunOptions) -> Result<()> {
    let load = resolve_config(options, EnvSnapshot::from_process())?;
    let catalog = load_catalog(options, &load.config)?;
    let page = render_local_today(&load.config, &catalog)?;
    println!(
        "Wrote {} ({} bytes, {} of {} sections without data)",
        page.path.display(),
        page.bytes,
        page.empty_sections,
        page.sections
    );
    Ok(())
}

fn topics(options: &RunOptions) -> Result<()> {
    let load = resolve_config(options, EnvSnapshot::from_process())?;
    let catalog = load_catalog(options, &load.config)?;
    for line in format_topics(&topic_status(&load.config, &catalog)) {
        println!("{line}");
    }
    Ok(())
}

fn cleanup(options: &RunOptions) -> Result<()> {
    let load = resolve_config(options, EnvSnapshot::from_process())?;
    let removed = cleanup_scratch(&load.config)?;
    if removed.is_empty() {
        println!("Nothing to clean in {}", load.config.scratch_directory.display());
    } else {
        for name in &removed {
            println!("Removed {name}");
        }
    }
    Ok(())
}

fn show_config(options: &RunOptions) -> Result<()> {
    let load = resolve_config(options, EnvSnapshot::from_process())?;
    for line in describe_config(&load) {
        println!("{line}");
    }
    if load.config.api_key.is_none() {
        warn!("ANTHROPIC_API_KEY is not set; `run` will fail");
    }
    Ok(())
}

/// One line per topic plus an aggregate line and a totals line.
pub fn format_report(report: &RunReport) -> Vec<String> {
    let mut lines = Vec::with_capacity(report.outcomes.len() + 2);
    for outcome in &report.outcomes {
        let line = if outcome.succeeded {
            format!(
                "ok    {} -> {} ({} bytes)",
                outcome.topic.name,
                outcome.topic.filename,
                outcome.bytes_written.unwrap_or_default()
            )
        } else {
            format!(
                "FAIL  {} -> {}: {} {}",
                outcome.topic.name,
                outcome.topic.filename,
                outcome
                    .error_kind
                    .map(|kind| kind.to_string())
                    .unwrap_or_default(),
                outcome.message.as_deref().unwrap_or_default()
            )
        };
        lines.push(line);
    }

    lines.push(match &report.aggregate {
        AggregateStatus::Built { path, bytes } => {
            format!("aggregate: {} ({bytes} bytes)", path.display())
        }
        AggregateStatus::Skipped => "aggregate: skipped".to_string(),
    });
    lines.push(format!(
        "{} succeeded, {} failed, phase {}",
        report.succeeded(),
        report.failed(),
        report.phase
    ));
    lines
}

pub fn format_topics(statuses: &[TopicStatus]) -> Vec<String> {
    statuses
        .iter()
        .enumerate()
        .map(|(index, status)| {
            let presence = match status.bytes {
                Some(bytes) => format!("{bytes} bytes"),
                None => "missing".to_string(),
            };
            format!(
                "{:>2}. {:<24} {:<28} {}",
                index + 1,
                status.topic.name,
                status.topic.filename,
                presence
            )
        })
        .collect()
}

/// Effective settings, with the API key redacted, followed by load warnings.
pub fn describe_config(load: &ConfigLoadResult) -> Vec<String> {
    let config = &load.config;
    let model = &config.model;
    let mut lines = vec![
        format!("source                 = {:?}", load.source),
        format!("base_directory         = {}", config.base_directory.display()),
        format!(
            "output_directory       = {} ({})",
            config.output_directory.display(),
            config.output_directory_source
        ),
        format!("tmp_directory          = {}", config.scratch_directory.display()),
        format!("cleanup_days           = {}", config.cleanup_days),
        format!(
            "delay_between_sports   = {}s",
            config.delay_between_topics.as_secs_f64()
        ),
        format!(
            "delay_before_aggregate = {}s",
            config.delay_before_aggregate.as_secs_f64()
        ),
        format!("topic_template         = {}", config.topic_template.display()),
        format!("aggregate_template     = {}", config.aggregate_template.display()),
        format!("aggregate_filename     = {}", config.aggregate_filename),
        format!("api_url                = {}", config.api_url),
        format!(
            "api_key                = {}",
            if config.api_key.is_some() { "set (hidden)" } else { "not set" }
        ),
        format!("model                  = {}", model.model),
        format!("max_tokens             = {}", model.max_tokens),
        format!("temperature            = {}", model.temperature),
        format!("thinking_budget_tokens = {}", model.thinking_budget_tokens),
        format!("web_search_max_uses    = {}", model.web_search_max_uses),
        format!("max_iterations         = {}", model.max_iterations),
        format!(
            "request_timeout_secs   = {}",
            model.request_timeout.as_secs()
        ),
    ];
    lines.extend(
        load.warnings
            .iter()
            .map(|warning| format!("warning: {warning}")),
    );
    lines
}
