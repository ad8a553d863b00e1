use std::io::{self, IsTerminal, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use prdash::{ClassifiedPullRequest, DisplayMode, RefreshReport};

const TABLE_HEADERS: &[&str] = &["STATUS", "REPO", "AUTHOR", "CREATED", "TITLE", "URL"];
const TITLE_COLUMN_INDEX: usize = 4;
const COLUMN_SEPARATOR: &str = "  ";
const TITLE_TRUNCATION_SUFFIX: &str = "...";
const MIN_TITLE_WIDTH_FOR_TRUNCATION: usize = 3;

fn format_relative_time(time: DateTime<Utc>) -> String {
    use chrono_humanize::HumanTime;
    HumanTime::from(time).to_string()
}

fn cell_width(cell: &str) -> usize {
    cell.chars().count()
}

fn get_terminal_width(width_override: Option<usize>) -> usize {
    if let Some(width) = width_override {
        width
    } else if io::stdout().is_terminal() {
        terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(usize::MAX)
    } else {
        usize::MAX
    }
}

fn pr_to_table_row(item: &ClassifiedPullRequest) -> Vec<String> {
    let pr = &item.pr;
    vec![
        item.status.label().to_string(),
        pr.repository.to_string(),
        pr.author_login.clone(),
        format_relative_time(pr.created_at),
        pr.title.clone(),
        pr.url.clone(),
    ]
}

fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| cell_width(h)).collect();

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell_width(cell));
            }
        }
    }

    widths
}

/// Shrinks the title column so the row fits the terminal. The URL column is
/// never truncated.
fn apply_title_truncation(rows: &mut [Vec<String>], widths: &mut [usize], terminal_width: usize) {
    if terminal_width == usize::MAX {
        return;
    }

    let separator_width = COLUMN_SEPARATOR.len() * (widths.len() - 1);
    let non_title_width: usize = widths
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != TITLE_COLUMN_INDEX)
        .map(|(_, w)| w)
        .sum::<usize>()
        + separator_width;

    if non_title_width >= terminal_width {
        return;
    }

    let available_title_width = terminal_width - non_title_width;
    if widths[TITLE_COLUMN_INDEX] > available_title_width
        && available_title_width > MIN_TITLE_WIDTH_FOR_TRUNCATION
    {
        widths[TITLE_COLUMN_INDEX] = available_title_width;

        for row in rows {
            if let Some(title) = row.get_mut(TITLE_COLUMN_INDEX)
                && cell_width(title) > available_title_width
            {
                let keep = available_title_width - TITLE_TRUNCATION_SUFFIX.len();
                *title = title
                    .chars()
                    .take(keep)
                    .chain(TITLE_TRUNCATION_SUFFIX.chars())
                    .collect();
            }
        }
    }
}

fn render_table_headers<W: Write>(
    headers: &[&str],
    widths: &[usize],
    writer: &mut W,
) -> Result<()> {
    for (i, header) in headers.iter().enumerate() {
        write!(writer, "{:<width$}", header, width = widths[i])?;
        if i < headers.len() - 1 {
            write!(writer, "{COLUMN_SEPARATOR}")?;
        }
    }
    writeln!(writer)?;
    Ok(())
}

fn render_table_separator<W: Write>(widths: &[usize], writer: &mut W) -> Result<()> {
    for (i, &width) in widths.iter().enumerate() {
        write!(writer, "{}", "-".repeat(width))?;
        if i < widths.len() - 1 {
            write!(writer, "{COLUMN_SEPARATOR}")?;
        }
    }
    writeln!(writer)?;
    Ok(())
}

fn render_table_rows<W: Write>(
    rows: &[Vec<String>],
    widths: &[usize],
    writer: &mut W,
) -> Result<()> {
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < row.len() - 1 {
                write!(writer, "{:<width$}{COLUMN_SEPARATOR}", cell, width = widths[i])?;
            } else {
                write!(writer, "{cell}")?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn display_table_with_width<W: Write>(
    prs: &[ClassifiedPullRequest],
    writer: &mut W,
    width_override: Option<usize>,
) -> Result<()> {
    let terminal_width = get_terminal_width(width_override);
    let mut rows: Vec<Vec<String>> = prs.iter().map(pr_to_table_row).collect();
    let mut widths = calculate_column_widths(TABLE_HEADERS, &rows);

    apply_title_truncation(&mut rows, &mut widths, terminal_width);

    render_table_headers(TABLE_HEADERS, &widths, writer)?;
    render_table_separator(&widths, writer)?;
    render_table_rows(&rows, &widths, writer)?;

    Ok(())
}

fn display_quiet<W: Write>(prs: &[ClassifiedPullRequest], writer: &mut W) -> Result<()> {
    for item in prs {
        writeln!(writer, "{}", item.pr.url)?;
    }
    Ok(())
}

fn write_tree_section<W: Write>(
    title: &str,
    entries: &[String],
    last: bool,
    writer: &mut W,
) -> Result<()> {
    let (branch, indent) = if last { ("└─", "  ") } else { ("├─", "│ ") };
    if entries.is_empty() {
        writeln!(writer, "{branch}{title}: none")?;
        return Ok(());
    }
    writeln!(writer, "{branch}{title}")?;
    for (i, entry) in entries.iter().enumerate() {
        let prefix = if i == entries.len() - 1 { "└─" } else { "├─" };
        writeln!(writer, "{indent}{prefix}{entry}")?;
    }
    Ok(())
}

fn display_single_pr_detailed<W: Write>(item: &ClassifiedPullRequest, writer: &mut W) -> Result<()> {
    let pr = &item.pr;
    writeln!(writer, "● {}", pr.url)?;
    writeln!(writer, "├─Title: {} ({})", pr.title, pr.author_login)?;
    writeln!(writer, "├─Repository: {}", pr.repository)?;
    writeln!(writer, "├─Status: {}", item.status)?;
    writeln!(
        writer,
        "├─Created: {} ({})",
        format_relative_time(pr.created_at),
        pr.created_at.format("%Y-%m-%d %H:%M UTC")
    )?;

    let reviews: Vec<String> = pr
        .latest_reviews
        .iter()
        .map(|r| format!("{}: {}", r.author_login, r.state))
        .collect();
    let requests: Vec<String> = pr.review_requests.iter().map(ToString::to_string).collect();

    write_tree_section("Reviews", &reviews, false, writer)?;
    write_tree_section("Review requests", &requests, true, writer)?;
    writeln!(writer)?;
    Ok(())
}

fn display_detailed<W: Write>(prs: &[ClassifiedPullRequest], writer: &mut W) -> Result<()> {
    for item in prs {
        display_single_pr_detailed(item, writer)?;
    }
    Ok(())
}

/// Prints the ranked pull requests of `report` in the requested mode.
pub fn display_report<W: Write>(
    report: &RefreshReport,
    mode: DisplayMode,
    writer: &mut W,
) -> Result<()> {
    match mode {
        DisplayMode::Quiet => display_quiet(&report.pull_requests, writer),
        DisplayMode::Detailed => display_detailed(&report.pull_requests, writer),
        DisplayMode::Normal => display_table_with_width(&report.pull_requests, writer, None),
    }
}

/// Summarises repositories that failed to load.
pub fn display_failures<W: Write>(report: &RefreshReport, writer: &mut W) -> Result<()> {
    for failure in &report.failures {
        writeln!(
            writer,
            "Warning: {} could not be loaded: {}",
            failure.repository, failure.error
        )?;
    }
    Ok(())
}
