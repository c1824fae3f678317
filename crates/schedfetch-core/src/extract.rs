use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Column names every per-topic table starts with.
pub const SCHEDULE_COLUMNS: [&str; 9] = [
    "Date", "Day", "Opponent", "Home/Away", "Location", "Venue", "Time", "Event", "Result",
];

pub const SCHEDULE_HEADER: &str = "Date, Day, Opponent, Home/Away, Location, Venue, Time, Event, Result";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("response contains no schedule table")]
    MissingTable,
    #[error("schedule table has an unexpected header: {found:?}")]
    HeaderMismatch { found: String },
    #[error("response contains no HTML document")]
    MissingHtml,
}

#[derive(Debug, Clone, Copy)]
struct FencedBlock<'a> {
    info: &'a str,
    body: &'a str,
}

impl FencedBlock<'_> {
    fn language(&self) -> String {
        self.info
            .split(':')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    fn tagged_name(&self) -> Option<&str> {
        self.info.split_once(':').map(|(_, name)| name.trim())
    }
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```([^\n`]*)\r?\n(.*?)```").expect("fence pattern compiles")
    })
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    fence_pattern()
        .captures_iter(text)
        .filter_map(|caps| {
            Some(FencedBlock {
                info: caps.get(1)?.as_str().trim(),
                body: caps.get(2)?.as_str(),
            })
        })
        .collect()
}

fn first_line(text: &str) -> &str {
    text.trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
}

/// True when `line` names the schedule columns in order, ignoring spacing.
pub fn is_schedule_header(line: &str) -> bool {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    fields == SCHEDULE_COLUMNS
}

fn normalize(body: &str) -> String {
    let mut table = body.trim_start_matches('\u{feff}').trim().to_string();
    table.push('\n');
    table
}

/// Pull the CSV table for `filename` out of a model reply.
///
/// Candidates are tried in order: a block tagged `csv:<filename>`, any `csv`
/// block, any fenced block, then the whole reply. The first candidate whose
/// header matches wins.
pub fn extract_schedule(text: &str, filename: &str) -> Result<String, ResponseError> {
    let blocks = fenced_blocks(text);

    let tagged = blocks
        .iter()
        .filter(|block| block.language() == "csv" && block.tagged_name() == Some(filename));
    let csv = blocks.iter().filter(|block| block.language() == "csv");
    let candidates: Vec<&str> = tagged
        .chain(csv)
        .chain(blocks.iter())
        .map(|block| block.body)
        .chain(std::iter::once(text))
        .collect();

    if let Some(table) = candidates
        .iter()
        .find(|candidate| is_schedule_header(first_line(candidate)))
    {
        return Ok(normalize(table));
    }

    match candidates.first() {
        Some(best) if !blocks.is_empty() => Err(ResponseError::HeaderMismatch {
            found: first_line(best).to_string(),
        }),
        _ => Err(ResponseError::MissingTable),
    }
}

fn looks_like_html(text: &str) -> bool {
    let head = text.trim_start().to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html")
}

/// Pull an HTML document out of a model reply: an `html` block, else the
/// reply itself when it is a document.
pub fn extract_html(text: &str) -> Result<String, ResponseError> {
    let blocks = fenced_blocks(text);
    if let Some(block) = blocks.iter().find(|block| block.language() == "html") {
        return Ok(normalize(block.body));
    }
    if let Some(block) = blocks.iter().find(|block| looks_like_html(block.body)) {
        return Ok(normalize(block.body));
    }
    if looks_like_html(text) {
        return Ok(normalize(text));
    }
    Err(ResponseError::MissingHtml)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "Date, Day, Opponent, Home/Away, Location, Venue, Time, Event, Result\n\
                         Aug 30, Sat, Cincinnati, Away, \"Kansas City, MO\", Arrowhead Stadium, 6:30 PM, , W 20-17\n";

    #[test]
    fn prefers_block_tagged_with_filename() {
        let reply = format!(
            "Here you go.\n```csv:Volleyball.csv\nDate, Day\n```\n```csv:Football.csv\n{TABLE}```\nDone."
        );
        assert_eq!(extract_schedule(&reply, "Football.csv").expect("table"), TABLE);
    }

    #[test]
    fn falls_back_to_plain_csv_block() {
        let reply = format!("Schedule:\n```csv\n{TABLE}```");
        assert_eq!(extract_schedule(&reply, "Football.csv").expect("table"), TABLE);
    }

    #[test]
    fn falls_back_to_untagged_block() {
        let reply = format!("```\n{TABLE}\n\n```");
        assert_eq!(extract_schedule(&reply, "Football.csv").expect("table"), TABLE);
    }

    #[test]
    fn accepts_bare_table() {
        let reply = format!("\n{TABLE}\n");
        assert_eq!(extract_schedule(&reply, "Football.csv").expect("table"), TABLE);
    }

    #[test]
    fn header_spacing_is_ignored() {
        let reply = "```csv\nDate,Day,Opponent,Home/Away,Location,Venue,Time,Event,Result\n```";
        let table = extract_schedule(reply, "Baseball.csv").expect("table");
        assert_eq!(
            table,
            "Date,Day,Opponent,Home/Away,Location,Venue,Time,Event,Result\n"
        );
    }

    #[test]
    fn wrong_header_is_reported() {
        let reply = "```csv:Football.csv\nDate, Opponent, Result\nSep 6, Akron, W\n```";
        let err = extract_schedule(reply, "Football.csv").expect_err("bad header");
        assert_eq!(
            err,
            ResponseError::HeaderMismatch {
                found: "Date, Opponent, Result".to_string()
            }
        );
    }

    #[test]
    fn prose_only_reply_has_no_table() {
        let err = extract_schedule("I could not find that schedule.", "Football.csv")
            .expect_err("no table");
        assert_eq!(err, ResponseError::MissingTable);
    }

    #[test]
    fn extracts_html_block() {
        let reply = "Page below.\n```html:index.html\n<!DOCTYPE html>\n<html></html>\n```";
        assert_eq!(
            extract_html(reply).expect("html"),
            "<!DOCTYPE html>\n<html></html>\n"
        );
    }

    #[test]
    fn accepts_raw_html_document() {
        assert_eq!(
            extract_html("  <html><body>hi</body></html>").expect("html"),
            "<html><body>hi</body></html>\n"
        );
        assert_eq!(
            extract_html("Sorry, no page today.").expect_err("no html"),
            ResponseError::MissingHtml
        );
    }
}
