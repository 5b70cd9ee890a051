//! CSV to markdown table conversion.

use std::fmt::Write;

/// Convert CSV text into a pipe table with the first record as header.
///
/// Quoted fields may contain commas, doubled quotes and line breaks; line
/// breaks inside a cell become `<br>`. Short rows are padded.
#[must_use]
pub fn csv_to_markdown(text: &str) -> String {
    let records = parse_records(text);
    let Some(width) = records.iter().map(Vec::len).max() else {
        return String::new();
    };

    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        out.push('|');
        for col in 0..width {
            let cell = record.get(col).map_or("", String::as_str);
            write!(out, " {} |", escape_cell(cell)).unwrap();
        }
        out.push('\n');
        if i == 0 {
            out.push('|');
            out.push_str(&" --- |".repeat(width));
            out.push('\n');
        }
    }
    out
}

fn escape_cell(cell: &str) -> String {
    cell.trim()
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records.retain(|r| !(r.len() == 1 && r[0].trim().is_empty()));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_table() {
        assert_eq!(
            csv_to_markdown("name,qty\napple,3\npear,5\n"),
            "| name | qty |\n| --- | --- |\n| apple | 3 |\n| pear | 5 |\n"
        );
    }

    #[test]
    fn test_quoted_fields() {
        assert_eq!(
            csv_to_markdown("a,b\r\n\"x, y\",\"say \"\"hi\"\"\"\r\n\"multi\nline\",|\r\n"),
            "| a | b |\n| --- | --- |\n| x, y | say \"hi\" |\n| multi<br>line | \\| |\n"
        );
    }

    #[test]
    fn test_ragged_rows_padded() {
        assert_eq!(
            csv_to_markdown("a\n1,2\n\n"),
            "| a |  |\n| --- | --- |\n| 1 | 2 |\n"
        );
    }

    #[test]
    fn test_empty() {
        assert_eq!(csv_to_markdown(""), "");
    }
}
