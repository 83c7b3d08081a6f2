//! Kanban board rendering.
//!
//! Columns share the terminal width evenly. Each card shows the issue code
//! and priority on its first line and the title wrapped below it, cut to
//! [`MAX_TITLE_LINES`] lines.

use super::color::{bold, colorize_code, colorize_priority, colorize_status, dimmed};
use super::{OutputConfig, OutputMode, with_stdout, write_json};
use crate::domain::Issue;
use crate::view::{self, Column};
use std::io::{self, Write};
use textwrap::core::display_width;

/// Title lines shown per card.
pub const MAX_TITLE_LINES: usize = 2;

const GUTTER: &str = "  ";
const MIN_COLUMN_WIDTH: usize = 12;

/// Print the board for `issues`.
pub fn print_board(issues: &[Issue], mode: OutputMode) -> io::Result<()> {
    let columns = view::board(issues);
    with_stdout(|w, config| match mode {
        OutputMode::Text => write_board(w, &columns, config, config.content_width()),
        OutputMode::Json => write_json(w, &columns),
    })
}

/// One rendered line of a cell: what to print and its visible width.
struct CellLine {
    rendered: String,
    width: usize,
}

impl CellLine {
    fn plain(text: String, config: &OutputConfig, style: fn(&str, &OutputConfig) -> String) -> Self {
        Self {
            width: display_width(&text),
            rendered: style(&text, config),
        }
    }
}

fn card(issue: &Issue, config: &OutputConfig, width: usize) -> Vec<CellLine> {
    let priority = issue.priority.to_string();
    let mut lines = vec![CellLine {
        width: display_width(&issue.human_code) + 1 + display_width(&priority),
        rendered: format!(
            "{} {}",
            colorize_code(&issue.human_code, config),
            colorize_priority(issue.priority, config)
        ),
    }];

    let wrapped = textwrap::wrap(&issue.title, width.max(1));
    let truncated = wrapped.len() > MAX_TITLE_LINES;
    for (n, line) in wrapped.iter().take(MAX_TITLE_LINES).enumerate() {
        let mut text = line.to_string();
        if truncated && n + 1 == MAX_TITLE_LINES {
            let marker = if config.use_ascii { "..." } else { "…" };
            while !text.is_empty() && display_width(&text) + display_width(marker) > width {
                text.pop();
            }
            text.push_str(marker);
        }
        lines.push(CellLine {
            width: display_width(&text),
            rendered: text,
        });
    }
    lines
}

/// Renders `columns` side by side within `total_width`.
pub(crate) fn write_board<W: Write>(
    w: &mut W,
    columns: &[Column<'_>],
    config: &OutputConfig,
    total_width: usize,
) -> io::Result<()> {
    if columns.is_empty() {
        return Ok(());
    }
    let gutters = GUTTER.len() * (columns.len() - 1);
    let width = (total_width.saturating_sub(gutters) / columns.len()).max(MIN_COLUMN_WIDTH);

    let headers: Vec<CellLine> = columns
        .iter()
        .map(|c| {
            let text = format!("{} ({})", c.status.label(), c.issues.len());
            CellLine {
                width: display_width(&text),
                rendered: format!(
                    "{} {}",
                    bold(&colorize_status(c.status, config), config),
                    dimmed(&format!("({})", c.issues.len()), config)
                ),
            }
        })
        .collect();
    write_row(w, &headers.iter().collect::<Vec<_>>(), width)?;
    let rule: Vec<CellLine> = columns
        .iter()
        .map(|_| CellLine::plain("-".repeat(width), config, dimmed))
        .collect();
    write_row(w, &rule.iter().collect::<Vec<_>>(), width)?;

    let depth = columns.iter().map(|c| c.issues.len()).max().unwrap_or(0);
    for row in 0..depth {
        let cards: Vec<Vec<CellLine>> = columns
            .iter()
            .map(|c| {
                c.issues
                    .get(row)
                    .map(|issue| card(issue, config, width))
                    .unwrap_or_default()
            })
            .collect();
        let height = cards.iter().map(Vec::len).max().unwrap_or(0);
        for line in 0..height {
            let cells: Vec<Option<&CellLine>> = cards.iter().map(|c| c.get(line)).collect();
            write_optional_row(w, &cells, width)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

fn write_row<W: Write>(w: &mut W, cells: &[&CellLine], width: usize) -> io::Result<()> {
    let cells: Vec<Option<&CellLine>> = cells.iter().copied().map(Some).collect();
    write_optional_row(w, &cells, width)
}

fn write_optional_row<W: Write>(
    w: &mut W,
    cells: &[Option<&CellLine>],
    width: usize,
) -> io::Result<()> {
    let mut line = String::new();
    for (n, cell) in cells.iter().enumerate() {
        if n > 0 {
            line.push_str(GUTTER);
        }
        let used = match cell {
            Some(cell) => {
                line.push_str(&cell.rendered);
                cell.width
            }
            None => 0,
        };
        line.push_str(&" ".repeat(width.saturating_sub(used)));
    }
    writeln!(w, "{}", line.trim_end())
}
