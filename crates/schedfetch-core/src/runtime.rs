use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tracing::{info, warn};

use crate::catalog::{TopicCatalog, TopicDefinition};
use crate::config::{ConfigLoadResult, ConfigResolver, EffectiveConfig, EnvSnapshot};
use crate::delay::{Sleeper, ThreadSleeper};
use crate::error::RunError;
use crate::gateway::{AnthropicGateway, CompletionGateway};
use crate::orchestrator::{FetchOrchestrator, RunReport};
use crate::output::OutputStore;
use crate::render::{TopicSection, render_page};
use crate::schedule::ScheduleTable;
use crate::scratch::ScratchArea;

/// Locations supplied on the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub base_directory: PathBuf,
    pub config_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub aggregate: bool,
}

impl RunOptions {
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            config_path: None,
            catalog_path: None,
            aggregate: true,
        }
    }

    pub fn resolver(&self) -> ConfigResolver {
        ConfigResolver::new(self.base_directory.clone())
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.resolver().default_catalog_path())
    }
}

/// Resolve configuration, layering `<base>/config/.env` under `env`, and log
/// every warning.
pub fn resolve_config(options: &RunOptions, env: EnvSnapshot) -> Result<ConfigLoadResult, RunError> {
    let resolver = options.resolver();
    let (env, dotenv_warning) = env.with_dotenv(&resolver.dotenv_path());
    let mut load = resolver.resolve(options.config_path.as_deref(), &env)?;
    if let Some(warning) = dotenv_warning {
        load.warnings.insert(0, warning);
    }
    for warning in &load.warnings {
        warn!("{warning}");
    }
    Ok(load)
}

pub fn load_catalog(
    options: &RunOptions,
    config: &EffectiveConfig,
) -> Result<TopicCatalog, RunError> {
    let path = options.catalog_path();
    let mut catalog = TopicCatalog::load(&path)?;
    catalog.check_reserved_filename(&config.aggregate_filename);
    info!(path = %path.display(), topics = catalog.len(), "Loaded topic catalog");
    for warning in catalog.warnings() {
        warn!("{warning}");
    }
    Ok(catalog)
}

/// Full production run against the Anthropic API.
pub fn run_fetch(options: &RunOptions, env: EnvSnapshot) -> RunReport {
    let prepared = resolve_config(options, env).and_then(|load| {
        let catalog = load_catalog(options, &load.config)?;
        let gateway = AnthropicGateway::new(&load.config)?;
        Ok((load.config, catalog, gateway))
    });

    match prepared {
        Ok((config, catalog, gateway)) => run_fetch_with(
            &config,
            &catalog,
            &gateway,
            ThreadSleeper,
            options.aggregate,
        ),
        Err(err) => {
            warn!(kind = %err.kind(), error = %err, "Run failed before the first topic");
            RunReport::failed_at_start(err)
        }
    }
}

/// Run the state machine with caller-supplied gateway and sleeper, then sweep
/// the scratch directory.
pub fn run_fetch_with<G, S>(
    config: &EffectiveConfig,
    catalog: &TopicCatalog,
    gateway: &G,
    sleeper: S,
    aggregate: bool,
) -> RunReport
where
    G: CompletionGateway + ?Sized,
    S: Sleeper,
{
    info!(
        path = %config.output_directory.display(),
        source = %config.output_directory_source,
        "Resolved output directory"
    );
    let store = match OutputStore::open(&config.output_directory) {
        Ok(store) => store,
        Err(err) => return RunReport::failed_at_start(RunError::from(err)),
    };
    let scratch = match ScratchArea::open(&config.scratch_directory) {
        Ok(scratch) => Some(scratch),
        Err(err) => {
            warn!(error = %err, "Scratch directory unavailable; raw responses will not be kept");
            None
        }
    };

    let mut orchestrator = FetchOrchestrator::new(config, catalog, gateway, sleeper, store);
    if let Some(scratch) = scratch.clone() {
        orchestrator = orchestrator.with_scratch(scratch);
    }
    if !aggregate {
        orchestrator = orchestrator.without_aggregate();
    }
    let report = orchestrator.run();

    if let Some(scratch) = scratch {
        let removed = scratch.sweep(config.cleanup_max_age());
        info!(removed = removed.len(), "Cleaned scratch directory");
    }
    report
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    pub path: PathBuf,
    pub bytes: usize,
    pub sections: usize,
    pub empty_sections: usize,
}

/// Render the aggregate page locally from whatever topic files exist.
pub fn render_local(
    config: &EffectiveConfig,
    catalog: &TopicCatalog,
    today: NaiveDate,
) -> Result<RenderedPage, RunError> {
    let store = OutputStore::open(&config.output_directory)?;
    let sections: Vec<TopicSection> = catalog
        .topics()
        .iter()
        .map(|topic| TopicSection::new(topic.name.clone(), read_table(&store, topic)))
        .collect();
    let empty_sections = sections.iter().filter(|s| s.table.is_empty()).count();

    let page = render_page(&sections, today);
    let bytes = store.write(&config.aggregate_filename, &page)?;
    let path = store.path_for(&config.aggregate_filename)?;
    info!(path = %path.display(), bytes, empty_sections, "Rendered local page");

    Ok(RenderedPage {
        path,
        bytes,
        sections: sections.len(),
        empty_sections,
    })
}

pub fn render_local_today(
    config: &EffectiveConfig,
    catalog: &TopicCatalog,
) -> Result<RenderedPage, RunError> {
    render_local(config, catalog, Local::now().date_naive())
}

fn read_table(store: &OutputStore, topic: &TopicDefinition) -> ScheduleTable {
    if !store.exists(&topic.filename) {
        return ScheduleTable::default();
    }
    let parsed = store
        .read(&topic.filename)
        .map_err(|err| err.to_string())
        .and_then(|text| ScheduleTable::parse(&text).map_err(|err| err.to_string()));
    match parsed {
        Ok(table) => table,
        Err(err) => {
            warn!(topic = %topic.name, error = %err, "Skipping unreadable schedule");
            ScheduleTable::default()
        }
    }
}

/// Presence of one topic's file in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicStatus {
    pub topic: TopicDefinition,
    pub path: PathBuf,
    pub bytes: Option<u64>,
}

pub fn topic_status(config: &EffectiveConfig, catalog: &TopicCatalog) -> Vec<TopicStatus> {
    catalog
        .topics()
        .iter()
        .map(|topic| {
            let path = config.output_directory.join(&topic.filename);
            let bytes = fs::metadata(&path)
                .ok()
                .filter(|meta| meta.is_file())
                .map(|meta| meta.len());
            TopicStatus {
                topic: topic.clone(),
                path,
                bytes,
            }
        })
        .collect()
}

/// Sweep the scratch directory now, returning the removed entry names.
pub fn cleanup_scratch(config: &EffectiveConfig) -> Result<Vec<String>, RunError> {
    let scratch = ScratchArea::open(&config.scratch_directory)?;
    Ok(scratch.sweep(config.cleanup_max_age()))
}

/// Default base directory: the current working directory.
pub fn default_base_directory() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| Path::new(".").to_path_buf())
}
