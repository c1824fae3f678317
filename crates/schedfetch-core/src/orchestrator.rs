use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{Local, NaiveDate};
use tracing::{error, info, warn};

use crate::aggregate::AggregateBuilder;
use crate::catalog::{TopicCatalog, TopicDefinition};
use crate::config::EffectiveConfig;
use crate::delay::{DelayScheduler, Sleeper};
use crate::error::{ErrorKind, RunError, TopicError};
use crate::extract::extract_schedule;
use crate::gateway::{CompletionGateway, CompletionRequest};
use crate::output::OutputStore;
use crate::scratch::ScratchArea;
use crate::template::TemplateEngine;

/// Where the run is. `Failed` is reached from `Idle` or `Aggregating` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    /// One-based position of the topic being processed.
    ProcessingTopic(usize),
    Aggregating,
    Done,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => f.write_str("idle"),
            RunPhase::ProcessingTopic(position) => write!(f, "processing topic {position}"),
            RunPhase::Aggregating => f.write_str("aggregating"),
            RunPhase::Done => f.write_str("done"),
            RunPhase::Failed => f.write_str("failed"),
        }
    }
}

/// Result of one topic. Created once and never changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub topic: TopicDefinition,
    pub succeeded: bool,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    pub bytes_written: Option<usize>,
}

impl FetchOutcome {
    fn success(topic: &TopicDefinition, bytes: usize) -> Self {
        Self {
            topic: topic.clone(),
            succeeded: true,
            error_kind: None,
            message: None,
            bytes_written: Some(bytes),
        }
    }

    fn failure(topic: &TopicDefinition, err: &TopicError) -> Self {
        Self {
            topic: topic.clone(),
            succeeded: false,
            error_kind: Some(err.kind()),
            message: Some(err.to_string()),
            bytes_written: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateStatus {
    Built { path: PathBuf, bytes: usize },
    Skipped,
}

/// Everything a run produced: one outcome per catalog entry, in catalog order.
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<FetchOutcome>,
    pub aggregate: AggregateStatus,
    pub phase: RunPhase,
    pub failure: Option<RunError>,
}

impl RunReport {
    /// Report for a run that never left `Idle`.
    pub fn failed_at_start(err: RunError) -> Self {
        Self {
            outcomes: Vec::new(),
            aggregate: AggregateStatus::Skipped,
            phase: RunPhase::Failed,
            failure: Some(err),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_done(&self) -> bool {
        self.phase == RunPhase::Done
    }
}

/// Sequential per-topic fetch followed by an optional aggregate step.
pub struct FetchOrchestrator<'a, G: ?Sized, S> {
    catalog: &'a TopicCatalog,
    gateway: &'a G,
    delays: DelayScheduler<S>,
    store: OutputStore,
    scratch: Option<ScratchArea>,
    templates: TemplateEngine,
    topic_template: PathBuf,
    aggregate: Option<AggregateBuilder>,
    phase: RunPhase,
    started: Instant,
}

impl<'a, G, S> FetchOrchestrator<'a, G, S>
where
    G: CompletionGateway + ?Sized,
    S: Sleeper,
{
    pub fn new(
        config: &EffectiveConfig,
        catalog: &'a TopicCatalog,
        gateway: &'a G,
        sleeper: S,
        store: OutputStore,
    ) -> Self {
        Self {
            catalog,
            gateway,
            delays: DelayScheduler::new(config, sleeper),
            store,
            scratch: None,
            templates: TemplateEngine::new(),
            topic_template: config.topic_template.clone(),
            aggregate: Some(AggregateBuilder::new(
                config.aggregate_template.clone(),
                config.aggregate_filename.clone(),
            )),
            phase: RunPhase::Idle,
            started: Instant::now(),
        }
    }

    /// Keep raw replies in `scratch`.
    pub fn with_scratch(mut self, scratch: ScratchArea) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Stop after the topic loop; the aggregate is recorded as skipped.
    pub fn without_aggregate(mut self) -> Self {
        self.aggregate = None;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn run(self) -> RunReport {
        self.run_on(Local::now().date_naive())
    }

    pub fn run_on(mut self, today: NaiveDate) -> RunReport {
        let topics = self.catalog.topics();
        let total = topics.len();
        info!(
            topics = total,
            output = %self.store.root().display(),
            "Starting schedule fetch"
        );

        let mut outcomes = Vec::with_capacity(total);
        for (index, topic) in topics.iter().enumerate() {
            let position = index + 1;
            self.transition(RunPhase::ProcessingTopic(position));
            info!(
                topic = %topic.name,
                filename = %topic.filename,
                "processing topic {position} of {total}"
            );

            let outcome = match self.process_topic(topic) {
                Ok(bytes) => {
                    info!(
                        topic = %topic.name,
                        bytes,
                        "Finished topic {position} of {total}"
                    );
                    FetchOutcome::success(topic, bytes)
                }
                Err(err) => {
                    error!(
                        topic = %topic.name,
                        kind = %err.kind(),
                        error = %err,
                        "Topic {position} of {total} failed"
                    );
                    FetchOutcome::failure(topic, &err)
                }
            };
            outcomes.push(outcome);

            self.delays.wait_between(position == total);
        }

        self.transition(RunPhase::Aggregating);
        let succeeded: Vec<&TopicDefinition> = outcomes
            .iter()
            .filter(|outcome| outcome.succeeded)
            .map(|outcome| &outcome.topic)
            .collect();

        let (aggregate, failure) = match self.aggregate.as_ref() {
            None => {
                info!("Aggregate step disabled");
                (AggregateStatus::Skipped, None)
            }
            Some(builder) => {
                if total > 0 {
                    self.delays.wait_before_aggregate();
                }
                if succeeded.is_empty() {
                    warn!("No topic succeeded; skipping aggregate");
                    (AggregateStatus::Skipped, None)
                } else {
                    info!(inputs = succeeded.len(), "Building aggregate");
                    match builder.build(&succeeded, &self.store, self.gateway, today) {
                        Ok(built) => {
                            info!(
                                path = %built.path.display(),
                                bytes = built.bytes,
                                "Aggregate written"
                            );
                            (
                                AggregateStatus::Built {
                                    path: built.path,
                                    bytes: built.bytes,
                                },
                                None,
                            )
                        }
                        Err(err) => {
                            let err = RunError::from(err);
                            error!(kind = %err.kind(), error = %err, "Aggregate failed");
                            (AggregateStatus::Skipped, Some(err))
                        }
                    }
                }
            }
        };

        let phase = if failure.is_some() {
            RunPhase::Failed
        } else {
            RunPhase::Done
        };
        self.transition(phase);

        let report = RunReport {
            outcomes,
            aggregate,
            phase,
            failure,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Schedule fetch finished"
        );
        report
    }

    fn transition(&mut self, next: RunPhase) {
        info!(from = %self.phase, to = %next, "Run phase changed");
        self.phase = next;
    }

    fn process_topic(&self, topic: &TopicDefinition) -> Result<usize, TopicError> {
        let prompt = self.templates.render(&self.topic_template, topic)?;
        let reply = self
            .gateway
            .complete(&CompletionRequest::new(topic.name.clone(), prompt))?;

        if let Some(scratch) = &self.scratch {
            if let Err(err) = scratch.archive_response(&topic.name, &reply) {
                warn!(topic = %topic.name, error = %err, "Could not archive raw response");
            }
        }

        let table = extract_schedule(&reply, &topic.filename)?;
        Ok(self.store.write(&topic.filename, &table)?)
    }
}
