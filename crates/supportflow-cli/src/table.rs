use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

const DEFAULT_NO_ITEMS: &str = "No items found.";

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break regex is valid"));

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").expect("tag regex is valid"));

/// Plain-text list table: columns, rows keyed by column, and an empty-state message.
#[derive(Debug, Default)]
pub struct Table {
    columns: Vec<(String, String)>,
    rows: Vec<HashMap<String, String>>,
    no_items: Option<String>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered `(key, label)` pairs.
    pub fn set_columns<K, L>(&mut self, columns: impl IntoIterator<Item = (K, L)>)
    where
        K: Into<String>,
        L: Into<String>,
    {
        self.columns = columns
            .into_iter()
            .map(|(key, label)| (key.into(), label.into()))
            .collect();
    }

    pub fn set_rows(&mut self, rows: Vec<HashMap<String, String>>) {
        self.rows = rows;
    }

    /// Only line breaks survive; other markup and control characters are removed.
    pub fn set_no_items(&mut self, message: &str) {
        let with_breaks = LINE_BREAK.replace_all(message, "\n");
        let without_tags = TAG.replace_all(&with_breaks, "");
        let cleaned: String = without_tags
            .chars()
            .filter(|c| *c == '\n' || !c.is_control())
            .collect();
        self.no_items = Some(cleaned);
    }

    fn column_default<'a>(item: &'a HashMap<String, String>, column: &str) -> &'a str {
        item.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn render(&self) -> String {
        if self.rows.is_empty() {
            return match self.no_items.as_deref() {
                Some(message) if !message.trim().is_empty() => message.to_string(),
                _ => DEFAULT_NO_ITEMS.to_string(),
            };
        }

        let widths: Vec<usize> = self
            .columns
            .iter()
            .map(|(key, label)| {
                self.rows
                    .iter()
                    .map(|row| Self::column_default(row, key).chars().count())
                    .chain(std::iter::once(label.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        lines.push(render_line(
            self.columns.iter().map(|(_, label)| label.as_str()),
            &widths,
        ));
        lines.push(
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("  "),
        );
        for row in &self.rows {
            lines.push(render_line(
                self.columns
                    .iter()
                    .map(|(key, _)| Self::column_default(row, key)),
                &widths,
            ));
        }

        lines.join("\n")
    }
}

fn render_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect();
    padded.join("  ").trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::Table;
    use std::collections::HashMap;

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn renders_default_message_when_empty() {
        let table = Table::new();
        assert_eq!(table.render(), "No items found.");
    }

    #[test]
    fn no_items_message_keeps_only_line_breaks() {
        let mut table = Table::new();
        table.set_no_items("Nothing <b>here</b>.<br/>Try <a href=\"x\">again</a>\u{7}");
        assert_eq!(table.render(), "Nothing here.\nTry again");
    }

    #[test]
    fn pads_columns_to_widest_cell() {
        let mut table = Table::new();
        table.set_columns([("id", "ID"), ("subject", "Subject")]);
        table.set_rows(vec![
            row(&[("id", "1"), ("subject", "Help")]),
            row(&[("id", "12"), ("subject", "Überweisung")]),
        ]);

        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "ID  Subject");
        assert_eq!(lines[1], "--  -----------");
        assert_eq!(lines[2], "1   Help");
        assert_eq!(lines[3], "12  Überweisung");
    }

    #[test]
    fn missing_cells_render_empty() {
        let mut table = Table::new();
        table.set_columns([("id", "ID"), ("status", "Status"), ("subject", "Subject")]);
        table.set_rows(vec![row(&[("id", "3"), ("subject", "No status")])]);

        let rendered = table.render();
        let expected = format!("3{}No status", " ".repeat(11));
        assert_eq!(rendered.lines().nth(2), Some(expected.as_str()));
    }
}
