//! Box-drawing table renderer for peer listings.

use colored::Colorize;

/// A table builder that collects headers and rows, then renders to a
/// Unicode box-drawing string.
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Add a row. Extra cells are dropped; missing cells render empty.
    pub fn add_row(&mut self, cells: &[String]) {
        let row = (0..self.headers.len())
            .map(|i| cells.get(i).cloned().unwrap_or_default())
            .collect();
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }
        widths
    }

    fn border(widths: &[usize], left: char, mid: char, right: char) -> String {
        let segments: Vec<String> = widths.iter().map(|w| "\u{2500}".repeat(w + 2)).collect();
        format!("{left}{}{right}", segments.join(&mid.to_string()))
    }

    fn line(cells: impl Iterator<Item = String>) -> String {
        let cells: Vec<String> = cells.map(|c| format!(" {c} ")).collect();
        format!("\u{2502}{}\u{2502}", cells.join("\u{2502}"))
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let pad = |text: &str, width: usize| {
            let fill = width.saturating_sub(text.chars().count());
            format!("{text}{}", " ".repeat(fill))
        };

        let mut lines = vec![Self::border(&widths, '\u{250c}', '\u{252c}', '\u{2510}')];
        lines.push(Self::line(
            self.headers
                .iter()
                .zip(&widths)
                .map(|(h, w)| pad(h, *w).bold().to_string()),
        ));
        lines.push(Self::border(&widths, '\u{251c}', '\u{253c}', '\u{2524}'));
        for row in &self.rows {
            lines.push(Self::line(row.iter().zip(&widths).map(|(c, w)| pad(c, *w))));
        }
        lines.push(Self::border(&widths, '\u{2514}', '\u{2534}', '\u{2518}'));
        lines.join("\n")
    }

    pub fn print(&self) {
        println!("{}", self.render());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_borders_and_rows() {
        colored::control::set_override(false);
        let mut t = Table::new(&["ID", "ADDRESS"]);
        t.add_row(&["alice".to_string(), "10.0.0.1:5001".to_string()]);
        t.add_row(&["bob".to_string()]);

        let rendered = t.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with('\u{250c}'));
        assert!(lines[5].ends_with('\u{2518}'));
        assert!(lines[3].contains("alice"));
        assert!(lines[3].contains("10.0.0.1:5001"));
        // Missing cell still padded to the column width.
        assert_eq!(lines[4].chars().count(), lines[3].chars().count());
    }
}
