use std::fmt::Write as _;

use chrono::{Datelike, NaiveDate};

use crate::schedule::{ScheduleRow, ScheduleTable};

/// Columns shown in each section table, in display order.
const DISPLAY_COLUMNS: [&str; 9] = [
    "Date", "Day", "Opponent", "Home/Away", "Location", "Venue", "Time", "Event", "Result",
];

const NEUTRAL_SITES: [&str; 2] = ["kansas city", "sioux falls"];

/// One topic's table as it appears on the page. A topic without data gets an
/// empty table.
#[derive(Debug, Clone)]
pub struct TopicSection {
    pub name: String,
    pub table: ScheduleTable,
}

impl TopicSection {
    pub fn new(name: impl Into<String>, table: ScheduleTable) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn status_class(result: &str) -> &'static str {
    if result.is_empty() {
        "game-upcoming"
    } else {
        "game-completed"
    }
}

fn venue_class(home_away: &str, location: &str) -> &'static str {
    let side = home_away.to_ascii_lowercase();
    let location = location.to_ascii_lowercase();
    if side == "home" || location == "home" || location == "lincoln, ne" || location == "lincoln ne" {
        "home-game"
    } else if side.contains("neutral")
        || location.contains("neutral")
        || NEUTRAL_SITES.iter().any(|site| location.contains(site))
    {
        "neutral-game"
    } else {
        "away-game"
    }
}

fn result_cell(result: &str) -> String {
    if result.is_empty() {
        "<span class=\"result-upcoming\">TBD</span>".to_string()
    } else if result.starts_with('W') {
        format!("<span class=\"result-win\">{}</span>", escape_html(result))
    } else if result.starts_with('L') {
        format!("<span class=\"result-loss\">{}</span>", escape_html(result))
    } else {
        escape_html(result)
    }
}

fn render_row(out: &mut String, row: &ScheduleRow<'_>) {
    let result = row.get("Result");
    let _ = writeln!(
        out,
        "          <tr class=\"{} {}\">",
        status_class(result),
        venue_class(row.get("Home/Away"), row.get("Location"))
    );
    for column in DISPLAY_COLUMNS {
        let value = row.get(column);
        let cell = match column {
            "Result" => result_cell(value),
            "Event" if !value.is_empty() => {
                format!("<span class=\"event-badge\">{}</span>", escape_html(value))
            }
            _ => escape_html(value),
        };
        let _ = writeln!(out, "            <td>{cell}</td>");
    }
    out.push_str("          </tr>\n");
}

fn render_section(out: &mut String, section: &TopicSection) {
    let name = escape_html(&section.name);
    let _ = writeln!(out, "    <section class=\"sport-section\">");
    let _ = writeln!(out, "      <div class=\"sport-header\"><h2>{name}</h2></div>");

    if section.table.is_empty() {
        out.push_str("      <div class=\"note-section\">\n");
        out.push_str("        <p><strong>Schedule not yet available</strong></p>\n");
        out.push_str("        <p>Check back later for updates</p>\n");
        out.push_str("      </div>\n");
        out.push_str("    </section>\n");
        return;
    }

    out.push_str("      <div class=\"table-container\">\n        <table>\n          <thead><tr>");
    for column in DISPLAY_COLUMNS {
        let _ = write!(out, "<th>{}</th>", escape_html(column));
    }
    out.push_str("</tr></thead>\n          <tbody>\n");
    for row in section.table.rows() {
        render_row(out, &row);
    }
    out.push_str("          </tbody>\n        </table>\n      </div>\n    </section>\n");
}

/// Build a self-contained HTML page with one section per topic.
pub fn render_page(sections: &[TopicSection], today: NaiveDate) -> String {
    let year = today.year();
    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("  <meta charset=\"UTF-8\">\n");
    out.push_str("  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    let _ = writeln!(out, "  <title>Sports Schedules | {}-{}</title>", year, year + 1);
    let _ = writeln!(out, "  <style>\n{STYLESHEET}  </style>");
    out.push_str("</head>\n<body>\n");
    out.push_str("  <header class=\"header\">\n");
    out.push_str("    <h1>Sports Schedules</h1>\n");
    let _ = writeln!(
        out,
        "    <p>Last updated: {}</p>",
        today.format("%B %-d, %Y")
    );
    out.push_str("  </header>\n  <main class=\"container\">\n");
    for section in sections {
        render_section(&mut out, section);
    }
    out.push_str("  </main>\n</body>\n</html>\n");
    out
}

const STYLESHEET: &str = r#"    * { margin: 0; padding: 0; box-sizing: border-box; }
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f5f5f5; color: #333; line-height: 1.6; }
    .header { background: linear-gradient(135deg, #D00000 0%, #8B0000 100%); color: #FEFDFA; padding: 2rem 1rem; text-align: center; }
    .header h1 { font-size: 2.5rem; text-transform: uppercase; letter-spacing: 1px; }
    .container { max-width: 1400px; margin: 0 auto; padding: 2rem 1rem; }
    .sport-section { background: white; margin-bottom: 3rem; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); overflow: hidden; }
    .sport-header { background-color: #D00000; color: #FEFDFA; padding: 1.5rem; border-bottom: 4px solid #8B0000; }
    .sport-header h2 { font-size: 1.8rem; text-transform: uppercase; }
    .table-container { overflow-x: auto; padding: 1rem; }
    table { width: 100%; border-collapse: collapse; font-size: 0.95rem; }
    th { padding: 1rem 0.75rem; text-align: left; color: #D00000; text-transform: uppercase; font-size: 0.85rem; white-space: nowrap; border-bottom: 2px solid #D00000; }
    td { padding: 0.9rem 0.75rem; border-bottom: 1px solid #e0e0e0; }
    .game-completed { background-color: #f8f8f8; }
    .game-upcoming { background-color: white; font-weight: 500; }
    .home-game { border-left: 4px solid #D00000; }
    .away-game { border-left: 4px solid #6c757d; }
    .neutral-game { border-left: 4px solid #f0ad4e; }
    .result-win { color: #28a745; font-weight: 700; }
    .result-loss { color: #dc3545; font-weight: 700; }
    .result-upcoming { color: #6c757d; font-style: italic; }
    .event-badge { background-color: #D00000; color: white; padding: 0.2rem 0.5rem; border-radius: 4px; font-size: 0.8rem; }
    .note-section { padding: 2rem; text-align: center; color: #6c757d; }
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 6).expect("valid date")
    }

    fn football() -> TopicSection {
        let table = ScheduleTable::parse(
            "Date, Day, Opponent, Home/Away, Location, Venue, Time, Event, Result\n\
             Aug 30, Sat, Cincinnati, Neutral, \"Kansas City, MO\", Arrowhead Stadium, 6:30 PM, Kickoff, W 20-17\n\
             Sep 6, Sat, <Akron & Co>, Home, \"Lincoln, NE\", Memorial Stadium, 6:30 PM, , \n\
             Sep 13, Sat, Houston Christian, Away, \"Houston, TX\", Husky Stadium, 1:00 PM, , L 10-14\n",
        )
        .expect("parses");
        TopicSection::new("Football", table)
    }

    #[test]
    fn page_has_one_section_per_topic() {
        let page = render_page(
            &[football(), TopicSection::new("Baseball", ScheduleTable::default())],
            date(),
        );

        assert!(page.starts_with("<!DOCTYPE html>"));
        assert_eq!(page.matches("<section class=\"sport-section\">").count(), 2);
        assert!(page.contains("<h2>Football</h2>"));
        assert!(page.contains("Schedule not yet available"));
        assert!(page.contains("Last updated: September 6, 2025"));
        assert!(page.contains("<title>Sports Schedules | 2025-2026</title>"));
    }

    #[test]
    fn rows_are_classified() {
        let page = render_page(&[football()], date());

        assert!(page.contains("<tr class=\"game-completed neutral-game\">"));
        assert!(page.contains("<tr class=\"game-upcoming home-game\">"));
        assert!(page.contains("<tr class=\"game-completed away-game\">"));
        assert!(page.contains("<span class=\"result-win\">W 20-17</span>"));
        assert!(page.contains("<span class=\"result-loss\">L 10-14</span>"));
        assert!(page.contains("<span class=\"event-badge\">Kickoff</span>"));
    }

    #[test]
    fn cell_text_is_escaped() {
        let page = render_page(&[football()], date());
        assert!(page.contains("<td>&lt;Akron &amp; Co&gt;</td>"));
        assert!(!page.contains("<Akron"));
        assert_eq!(escape_html("Men's \"A\""), "Men&#39;s &quot;A&quot;");
    }
}
