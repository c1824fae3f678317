use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::catalog::TopicDefinition;

pub const TOPIC_PLACEHOLDER: &str = "{{topic}}";
pub const FILENAME_PLACEHOLDER: &str = "{{filename}}";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Prompt text loaded from disk. The text is opaque apart from placeholders.
#[derive(Debug, Clone)]
pub struct Template {
    path: PathBuf,
    text: String,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let text = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn contains(&self, placeholder: &str) -> bool {
        self.text.contains(placeholder)
    }

    /// Replace every placeholder in one left-to-right pass, so substituted
    /// values are never scanned again.
    pub fn fill(&self, replacements: &[(&str, &str)]) -> String {
        substitute(&self.text, replacements)
    }
}

/// Builds per-topic request text from a template file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateEngine;

impl TemplateEngine {
    pub fn new() -> Self {
        Self
    }

    /// Read `template` and substitute the topic name and filename.
    pub fn render(&self, template: &Path, topic: &TopicDefinition) -> Result<String, TemplateError> {
        let template = Template::load(template)?;
        if !template.contains(TOPIC_PLACEHOLDER) {
            warn!(
                template = %template.path().display(),
                topic = %topic.name,
                "Template has no {TOPIC_PLACEHOLDER} placeholder; sending it verbatim"
            );
        }
        Ok(template.fill(&[
            (TOPIC_PLACEHOLDER, topic.name.as_str()),
            (FILENAME_PLACEHOLDER, topic.filename.as_str()),
        ]))
    }
}

fn substitute(text: &str, replacements: &[(&str, &str)]) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let candidate = &rest[start..];
        match replacements
            .iter()
            .find(|(placeholder, _)| candidate.starts_with(placeholder))
        {
            Some((placeholder, value)) => {
                output.push_str(value);
                rest = &candidate[placeholder.len()..];
            }
            None => {
                output.push_str("{{");
                rest = &candidate[2..];
            }
        }
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_template(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("prompt.txt");
        fs::write(&path, body).expect("write template");
        path
    }

    #[test]
    fn substitutes_topic_and_filename() {
        let temp = tempdir().expect("tempdir");
        let path = write_template(
            temp.path(),
            "Find the {{topic}} schedule.\nReturn ```csv:{{filename}}``` for {{topic}}.",
        );

        let text = TemplateEngine::new()
            .render(&path, &TopicDefinition::new("Softball", "Softball.csv"))
            .expect("renders");

        assert_eq!(
            text,
            "Find the Softball schedule.\nReturn ```csv:Softball.csv``` for Softball."
        );
    }

    #[test]
    fn leaves_other_braces_alone() {
        let temp = tempdir().expect("tempdir");
        let path = write_template(temp.path(), "{{unknown}} {\"json\": {{topic}}} {{");

        let text = TemplateEngine::new()
            .render(&path, &TopicDefinition::new("Baseball", "Baseball.csv"))
            .expect("renders");

        assert_eq!(text, "{{unknown}} {\"json\": Baseball} {{");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let temp = tempdir().expect("tempdir");
        let path = write_template(temp.path(), "{{topic}}");

        let text = TemplateEngine::new()
            .render(&path, &TopicDefinition::new("{{filename}}", "x.csv"))
            .expect("renders");

        assert_eq!(text, "{{filename}}");
    }

    #[test]
    fn template_without_placeholder_is_sent_verbatim() {
        let temp = tempdir().expect("tempdir");
        let path = write_template(temp.path(), "Get every Husker schedule.");

        let text = TemplateEngine::new()
            .render(&path, &TopicDefinition::new("Football", "Football.csv"))
            .expect("renders");

        assert_eq!(text, "Get every Husker schedule.");
    }

    #[test]
    fn unreadable_template_is_template_error() {
        let temp = tempdir().expect("tempdir");
        let err = TemplateEngine::new()
            .render(
                &temp.path().join("missing.txt"),
                &TopicDefinition::new("Football", "Football.csv"),
            )
            .expect_err("missing template");
        assert!(matches!(err, TemplateError::Read { .. }));
    }
}
