//! Core library for fetching per-topic schedule tables from a completion
//! provider and assembling them into one page.

pub mod aggregate;
pub mod catalog;
pub mod config;
pub mod delay;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod render;
pub mod runtime;
pub mod schedule;
pub mod scratch;
pub mod template;

pub use aggregate::{AggregateBuilder, AggregateError, BuiltAggregate};
pub use catalog::{CatalogError, TopicCatalog, TopicDefinition};
pub use config::{
    ApiKey, ConfigError, ConfigLoadResult, ConfigResolver, ConfigSource, EffectiveConfig,
    EnvSnapshot, ModelParameters, SettingSource,
};
pub use delay::{DelayScheduler, Sleeper, ThreadSleeper};
pub use error::{ErrorKind, RunError, TopicError};
pub use extract::{ResponseError, SCHEDULE_HEADER, extract_html, extract_schedule};
pub use gateway::{
    AnthropicGateway, CompletionGateway, CompletionRequest, GatewayError, GatewayErrorKind,
};
pub use logging::{LoggingDestination, LoggingError, init_logging};
pub use orchestrator::{AggregateStatus, FetchOrchestrator, FetchOutcome, RunPhase, RunReport};
pub use output::{OutputStore, StorageError};
pub use render::{TopicSection, render_page};
pub use runtime::{
    RenderedPage, RunOptions, TopicStatus, cleanup_scratch, default_base_directory,
    load_catalog, render_local, render_local_today, resolve_config, run_fetch, run_fetch_with,
    topic_status,
};
pub use schedule::{ScheduleTable, TableError};
pub use scratch::ScratchArea;
pub use template::{TemplateEngine, TemplateError};
