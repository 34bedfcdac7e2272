use std::io::Write;

use hallucitation_core::{
    Classification, DryRunReport, PipelineEvent, ReverifySummary, RunSummary, StatusCounts,
};
use hallucitation_reporting::{ExportSummary, ImportSummary};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn verdict(c: Classification, color: ColorMode) -> String {
    let label = match c {
        Classification::Real => "REAL",
        Classification::Hallucinated => "HALLUCINATED",
        Classification::Uncertain => "UNCERTAIN",
    };
    if !color.enabled() {
        return label.to_string();
    }
    match c {
        Classification::Real => label.green().to_string(),
        Classification::Hallucinated => label.red().bold().to_string(),
        Classification::Uncertain => label.yellow().to_string(),
    }
}

/// One line per finished paper, or `None` for events not shown.
pub fn progress_line(event: &PipelineEvent, color: ColorMode) -> Option<String> {
    match event {
        PipelineEvent::PaperProcessed {
            paper_id,
            citations,
            flagged,
        } => {
            let flagged = if *flagged > 0 && color.enabled() {
                format!("{flagged} flagged").yellow().to_string()
            } else {
                format!("{flagged} flagged")
            };
            Some(format!("{paper_id}: {citations} citations, {flagged}"))
        }
        PipelineEvent::PaperFailed { paper_id, reason } => {
            if color.enabled() {
                Some(format!("{}: {} ({})", paper_id, "ERROR".red(), reason))
            } else {
                Some(format!("{paper_id}: ERROR ({reason})"))
            }
        }
        PipelineEvent::CitationReverified {
            citation_id,
            classification,
            resolved,
        } => {
            let suffix = if *resolved { "" } else { " (still unavailable)" };
            Some(format!(
                "{citation_id} -> {}{suffix}",
                verdict(*classification, color)
            ))
        }
        PipelineEvent::PaperStarted { .. } | PipelineEvent::CitationChecked { .. } => None,
    }
}

fn heading(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{}", title.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{sep}")?;
        writeln!(w, "{title}")?;
        writeln!(w, "{sep}")?;
    }
    Ok(())
}

pub fn print_run_summary(
    w: &mut dyn Write,
    summary: &RunSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "SUMMARY", color)?;
    if summary.cancelled {
        if color.enabled() {
            writeln!(w, "  {}", "Interrupted: remaining papers stay pending".yellow())?;
        } else {
            writeln!(w, "  Interrupted: remaining papers stay pending")?;
        }
    }
    writeln!(w, "  Papers processed: {}", summary.papers_processed)?;
    if summary.papers_errored > 0 && color.enabled() {
        writeln!(w, "  {} {}", "Papers errored:".red(), summary.papers_errored)?;
    } else {
        writeln!(w, "  Papers errored: {}", summary.papers_errored)?;
    }
    writeln!(w, "  Citations checked: {}", summary.citations)?;
    writeln!(w)?;
    print_classification_counts(w, summary.real, summary.hallucinated, summary.uncertain, color)?;
    if summary.uncertain > 0 {
        writeln!(w)?;
        writeln!(
            w,
            "  {} uncertain citations need manual follow-up (see hallucination_coding.csv after export)",
            summary.uncertain
        )?;
    }
    writeln!(w)?;
    Ok(())
}

fn print_classification_counts(
    w: &mut dyn Write,
    real: usize,
    hallucinated: usize,
    uncertain: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "  {} {}", "Real:".green(), real)?;
        writeln!(w, "  {} {}", "Hallucinated:".red(), hallucinated)?;
        writeln!(w, "  {} {}", "Uncertain:".yellow(), uncertain)?;
    } else {
        writeln!(w, "  Real: {real}")?;
        writeln!(w, "  Hallucinated: {hallucinated}")?;
        writeln!(w, "  Uncertain: {uncertain}")?;
    }
    Ok(())
}

pub fn print_reverify_summary(
    w: &mut dyn Write,
    summary: &ReverifySummary,
    color: ColorMode,
) -> std::io::Result<()> {
    heading(w, "RE-VERIFICATION", color)?;
    writeln!(w, "  Attempted: {}", summary.attempted)?;
    writeln!(w, "  Resolved: {}", summary.resolved)?;
    writeln!(w, "  Still unavailable: {}", summary.still_unavailable)?;
    if summary.cancelled {
        writeln!(w, "  (interrupted)")?;
    }
    writeln!(w)?;
    Ok(())
}

pub fn print_status(w: &mut dyn Write, counts: &StatusCounts, color: ColorMode) -> std::io::Result<()> {
    heading(w, "STATUS", color)?;
    writeln!(w, "  Papers pending: {}", counts.pending)?;
    writeln!(w, "  Papers processed: {}", counts.processed)?;
    writeln!(w, "  Papers errored: {}", counts.error)?;
    writeln!(w)?;
    writeln!(w, "  Citations: {}", counts.citations)?;
    print_classification_counts(w, counts.real, counts.hallucinated, counts.uncertain, color)?;
    if counts.awaiting_reverify > 0 {
        let msg = format!(
            "{} citations recorded while a service was unavailable (run `reverify`)",
            counts.awaiting_reverify
        );
        if color.enabled() {
            writeln!(w, "  {}", msg.dimmed())?;
        } else {
            writeln!(w, "  {msg}")?;
        }
    }
    writeln!(w)?;
    Ok(())
}

pub fn print_import_summary(
    w: &mut dyn Write,
    summary: &ImportSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(
        w,
        "Imported {} new papers, refreshed {}",
        summary.added, summary.refreshed
    )?;
    for domain in &summary.unknown_domains {
        let msg = format!("unknown Domain_Category: {domain}");
        if color.enabled() {
            writeln!(w, "{} {}", "WARNING:".yellow(), msg)?;
        } else {
            writeln!(w, "WARNING: {msg}")?;
        }
    }
    Ok(())
}

pub fn print_export_summary(w: &mut dyn Write, summary: &ExportSummary) -> std::io::Result<()> {
    writeln!(
        w,
        "Exported {} papers, {} citations, {} coding rows:",
        summary.papers, summary.citations, summary.coding_rows
    )?;
    for path in &summary.files {
        writeln!(w, "  {}", path.display())?;
    }
    Ok(())
}

pub fn print_dry_run(
    w: &mut dyn Write,
    file_name: &str,
    report: &DryRunReport,
    color: ColorMode,
) -> std::io::Result<()> {
    if let Some(reason) = &report.failure {
        if color.enabled() {
            writeln!(w, "{} {} ({})", "DRY RUN:".bold().cyan(), file_name.bold(), reason.red())?;
        } else {
            writeln!(w, "DRY RUN: {file_name} ({reason})")?;
        }
        return Ok(());
    }

    if color.enabled() {
        writeln!(
            w,
            "{} {} ({} chars, {} citations)\n",
            "DRY RUN:".bold().cyan(),
            file_name.bold(),
            report.chars,
            report.citations.len()
        )?;
    } else {
        writeln!(
            w,
            "DRY RUN: {} ({} chars, {} citations)\n",
            file_name,
            report.chars,
            report.citations.len()
        )?;
    }

    writeln!(w, "Sections:")?;
    if report.sections.is_empty() {
        writeln!(w, "  (none detected)")?;
    }
    for entry in report.sections.entries() {
        writeln!(w, "  {:<14} @ {}", entry.name, entry.start)?;
    }
    writeln!(w)?;

    for c in &report.citations {
        if color.enabled() {
            writeln!(w, "{}", format!("[{}]", c.seq).bold().yellow())?;
        } else {
            writeln!(w, "[{}]", c.seq)?;
        }
        writeln!(w, "  Title:   {}", c.title.as_deref().unwrap_or("(none)"))?;
        writeln!(w, "  Authors: {}", c.authors.as_deref().unwrap_or("(none)"))?;
        writeln!(
            w,
            "  Year:    {}",
            c.year.map(|y| y.to_string()).unwrap_or_else(|| "(none)".into())
        )?;
        writeln!(w, "  Section: {}", c.section.as_deref().unwrap_or("(not cited in body)"))?;
        if let Some(ctx) = &c.context {
            writeln!(w, "  Context: {}", truncate(ctx, 160))?;
        }
        let raw = truncate(&c.text.split_whitespace().collect::<Vec<_>>().join(" "), 200);
        if color.enabled() {
            writeln!(w, "  Raw:     {}", raw.dimmed())?;
        } else {
            writeln!(w, "  Raw:     {raw}")?;
        }
        writeln!(w)?;
    }
    writeln!(w, "Total: {} citations", report.citations.len())?;
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn started_events_are_silent() {
        let event = PipelineEvent::PaperStarted {
            index: 0,
            total: 1,
            paper_id: "P1".into(),
        };
        assert!(progress_line(&event, ColorMode(false)).is_none());
    }

    #[test]
    fn failure_line_without_color() {
        let event = PipelineEvent::PaperFailed {
            paper_id: "P1".into(),
            reason: "file not found".into(),
        };
        assert_eq!(
            progress_line(&event, ColorMode(false)).as_deref(),
            Some("P1: ERROR (file not found)")
        );
    }

    #[test]
    fn summary_mentions_follow_up() {
        let summary = RunSummary {
            papers_processed: 2,
            citations: 10,
            real: 7,
            hallucinated: 1,
            uncertain: 2,
            ..RunSummary::default()
        };
        let mut buf = Vec::new();
        print_run_summary(&mut buf, &summary, ColorMode(false)).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("Papers processed: 2"));
        assert!(out.contains("Hallucinated: 1"));
        assert!(out.contains("2 uncertain citations need manual follow-up"));
    }
}
