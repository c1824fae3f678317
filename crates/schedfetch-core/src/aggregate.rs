use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::TopicDefinition;
use crate::extract::{ResponseError, extract_html};
use crate::gateway::{CompletionGateway, CompletionRequest, GatewayError};
use crate::output::{OutputStore, StorageError};
use crate::template::{Template, TemplateError};

pub const SCHEDULES_PLACEHOLDER: &str = "{{schedules}}";
pub const DATE_PLACEHOLDER: &str = "{{date}}";

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no topic output files are available")]
    NoInputs,
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Response(#[from] ResponseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltAggregate {
    pub path: PathBuf,
    pub bytes: usize,
    pub topics: usize,
}

/// Combines per-topic files into one document via a single gateway call.
#[derive(Debug, Clone)]
pub struct AggregateBuilder {
    template: PathBuf,
    filename: String,
}

impl AggregateBuilder {
    pub fn new(template: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            filename: filename.into(),
        }
    }

    pub fn template(&self) -> &Path {
        &self.template
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Build the aggregate from the files of `topics`, which must already be
    /// in `store`.
    pub fn build<G: CompletionGateway + ?Sized>(
        &self,
        topics: &[&TopicDefinition],
        store: &OutputStore,
        gateway: &G,
        today: NaiveDate,
    ) -> Result<BuiltAggregate, AggregateError> {
        if topics.is_empty() {
            return Err(AggregateError::NoInputs);
        }

        let mut schedules = String::new();
        for topic in topics {
            let content = store.read(&topic.filename)?;
            append_section(&mut schedules, topic, &content);
        }

        let template = Template::load(&self.template)?;
        let date = today.format("%B %-d, %Y").to_string();
        let mut prompt = template.fill(&[
            (SCHEDULES_PLACEHOLDER, schedules.as_str()),
            (DATE_PLACEHOLDER, date.as_str()),
        ]);
        if !template.contains(SCHEDULES_PLACEHOLDER) {
            warn!(
                template = %self.template.display(),
                "Aggregate template has no {SCHEDULES_PLACEHOLDER} placeholder; appending schedules"
            );
            prompt.push_str("\n\n");
            prompt.push_str(&schedules);
        }

        info!(topics = topics.len(), filename = %self.filename, "Requesting aggregate document");
        let reply = gateway.complete(&CompletionRequest::new("aggregate", prompt))?;
        let document = extract_html(&reply)?;
        let bytes = store.write(&self.filename, &document)?;
        let path = store.path_for(&self.filename)?;

        Ok(BuiltAggregate {
            path,
            bytes,
            topics: topics.len(),
        })
    }
}

fn append_section(out: &mut String, topic: &TopicDefinition, content: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(&format!("## {} ({})\n", topic.name, topic.filename));
    out.push_str(&format!("```csv:{}\n", topic.filename));
    out.push_str(content);
    if !content.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayErrorKind;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::tempdir;

    struct CannedGateway {
        reply: Result<String, GatewayError>,
        prompts: RefCell<Vec<String>>,
    }

    impl CannedGateway {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: RefCell::new(Vec::new()),
            }
        }
    }

    impl CompletionGateway for CannedGateway {
        fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
            self.prompts.borrow_mut().push(request.prompt.clone());
            self.reply.clone()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, 4).expect("date")
    }

    fn setup(template: &str) -> (tempfile::TempDir, OutputStore, AggregateBuilder) {
        let temp = tempdir().expect("tempdir");
        let store = OutputStore::open(temp.path().join("output")).expect("open");
        let template_path = temp.path().join("prompt-html-builder.txt");
        fs::write(&template_path, template).expect("write template");
        let builder = AggregateBuilder::new(template_path, "index.html");
        (temp, store, builder)
    }

    #[test]
    fn sends_every_file_and_writes_html() {
        let (_temp, store, builder) = setup("Build a page for {{date}}.\n{{schedules}}");
        store.write("Football.csv", "Date, Day\nSep 6, Sat\n").expect("write");
        store.write("Baseball.csv", "Date, Day").expect("write");
        let football = TopicDefinition::new("Football", "Football.csv");
        let baseball = TopicDefinition::new("Baseball", "Baseball.csv");
        let gateway = CannedGateway::replying("```html\n<!DOCTYPE html><html></html>\n```");

        let built = builder
            .build(&[&football, &baseball], &store, &gateway, today())
            .expect("builds");

        assert_eq!(built.topics, 2);
        assert_eq!(store.read("index.html").expect("read"), "<!DOCTYPE html><html></html>\n");
        let prompts = gateway.prompts.borrow();
        assert_eq!(prompts.len(), 1);
        assert_eq!(
            prompts[0],
            "Build a page for October 4, 2025.\n\
             ## Football (Football.csv)\n```csv:Football.csv\nDate, Day\nSep 6, Sat\n```\n\
             \n## Baseball (Baseball.csv)\n```csv:Baseball.csv\nDate, Day\n```\n"
        );
    }

    #[test]
    fn no_inputs_is_an_error() {
        let (_temp, store, builder) = setup("{{schedules}}");
        let gateway = CannedGateway::replying("<html></html>");
        let err = builder
            .build(&[], &store, &gateway, today())
            .expect_err("nothing to aggregate");
        assert!(matches!(err, AggregateError::NoInputs));
        assert!(gateway.prompts.borrow().is_empty());
    }

    #[test]
    fn gateway_failure_leaves_previous_page() {
        let (_temp, store, builder) = setup("{{schedules}}");
        store.write("index.html", "<html>old</html>\n").expect("write");
        store.write("Football.csv", "Date\n").expect("write");
        let football = TopicDefinition::new("Football", "Football.csv");
        let gateway = CannedGateway {
            reply: Err(GatewayError::new(GatewayErrorKind::Overloaded, "busy")),
            prompts: RefCell::new(Vec::new()),
        };

        let err = builder
            .build(&[&football], &store, &gateway, today())
            .expect_err("gateway fails");

        assert!(matches!(err, AggregateError::Gateway(_)));
        assert_eq!(store.read("index.html").expect("read"), "<html>old</html>\n");
    }

    #[test]
    fn reply_without_html_is_rejected() {
        let (_temp, store, builder) = setup("{{schedules}}");
        store.write("Football.csv", "Date\n").expect("write");
        let football = TopicDefinition::new("Football", "Football.csv");
        let gateway = CannedGateway::replying("I cannot build that page.");

        let err = builder
            .build(&[&football], &store, &gateway, today())
            .expect_err("no html");
        assert!(matches!(err, AggregateError::Response(ResponseError::MissingHtml)));
    }

    #[test]
    fn template_without_placeholder_gets_schedules_appended() {
        let (_temp, store, builder) = setup("Make a page.");
        store.write("Football.csv", "Date\n").expect("write");
        let football = TopicDefinition::new("Football", "Football.csv");
        let gateway = CannedGateway::replying("<html></html>");

        builder
            .build(&[&football], &store, &gateway, today())
            .expect("builds");

        let prompts = gateway.prompts.borrow();
        assert!(prompts[0].starts_with("Make a page.\n\n## Football (Football.csv)"));
    }
}
