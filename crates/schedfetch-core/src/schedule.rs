use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("quoted field starting on line {line} is never closed")]
    UnterminatedQuote { line: usize },
}

/// Parsed CSV schedule: a header row and data rows.
///
/// Fields may be quoted; doubled quotes inside a quoted field stand for one
/// quote. Whitespace around fields is trimmed and blank lines are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl ScheduleTable {
    pub fn parse(text: &str) -> Result<Self, TableError> {
        let mut records = parse_records(text.trim_start_matches('\u{feff}'))?.into_iter();
        let header = records.next().unwrap_or_default();
        Ok(Self {
            header,
            rows: records.collect(),
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = ScheduleRow<'_>> {
        self.rows.iter().map(move |cells| ScheduleRow {
            header: &self.header,
            cells,
        })
    }
}

/// A data row addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleRow<'a> {
    header: &'a [String],
    cells: &'a [String],
}

impl<'a> ScheduleRow<'a> {
    /// Cell under `column`, or an empty string when the column or cell is absent.
    pub fn get(&self, column: &str) -> &'a str {
        self.header
            .iter()
            .position(|name| name == column)
            .and_then(|index| self.cells.get(index))
            .map(String::as_str)
            .unwrap_or_default()
    }
}

fn parse_records(text: &str) -> Result<Vec<Vec<String>>, TableError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }

        match ch {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quote_line = line;
            }
            ',' => record.push(take_field(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\r' | '\n' => {
                if ch == '\n' {
                    line += 1;
                }
                record.push(take_field(&mut field));
                push_record(&mut records, &mut record);
            }
            _ => field.push(ch),
        }
    }

    if in_quotes {
        return Err(TableError::UnterminatedQuote { line: quote_line });
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(take_field(&mut field));
        push_record(&mut records, &mut record);
    }
    Ok(records)
}

fn take_field(field: &mut String) -> String {
    let value = field.trim().to_string();
    field.clear();
    value
}

fn push_record(records: &mut Vec<Vec<String>>, record: &mut Vec<String>) {
    let fields = std::mem::take(record);
    if fields.iter().any(|value| !value.is_empty()) {
        records.push(fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let table = ScheduleTable::parse(
            "Date, Day, Opponent, Home/Away, Location, Venue, Time, Event, Result\n\
             Aug 30, Sat, Cincinnati, Neutral, \"Kansas City, MO\", Arrowhead Stadium, 6:30 PM, , W 20-17\n\
             Sep 6, Sat, Akron, Home, \"Lincoln, NE\", Memorial Stadium, 6:30 PM, , \n",
        )
        .expect("parses");

        assert_eq!(table.header().len(), 9);
        assert_eq!(table.len(), 2);
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].get("Location"), "Kansas City, MO");
        assert_eq!(rows[0].get("Result"), "W 20-17");
        assert_eq!(rows[1].get("Opponent"), "Akron");
        assert_eq!(rows[1].get("Result"), "");
        assert_eq!(rows[1].get("Watch"), "");
    }

    #[test]
    fn doubled_quotes_and_embedded_newlines() {
        let table = ScheduleTable::parse(
            "Opponent,Event\r\n\"The \"\"Big\"\" Game\",\"Senior\nNight\"\r\n",
        )
        .expect("parses");

        let row = table.rows().next().expect("row");
        assert_eq!(row.get("Opponent"), "The \"Big\" Game");
        assert_eq!(row.get("Event"), "Senior\nNight");
    }

    #[test]
    fn short_rows_and_blank_lines() {
        let table = ScheduleTable::parse("A,B,C\n\n1,2\n,,\n3,4,5").expect("parses");
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("C"), "");
        assert_eq!(rows[1].get("C"), "5");
    }

    #[test]
    fn empty_input_is_empty_table() {
        let table = ScheduleTable::parse("").expect("parses");
        assert!(table.header().is_empty());
        assert!(table.is_empty());
    }

    #[test]
    fn unterminated_quote_is_error() {
        let err = ScheduleTable::parse("A,B\n1,\"open").expect_err("unterminated");
        assert_eq!(err, TableError::UnterminatedQuote { line: 2 });
    }
}
