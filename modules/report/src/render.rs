use crate::Report;
use mididiag_core::FactCategory;
use serde::Deserialize;
use std::borrow::Cow;
use std::io::{self, Write};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(ReportFormat::Text),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format: {}", other)),
        }
    }
}

impl Report {
    pub fn render(&self, format: ReportFormat, w: &mut dyn Write) -> io::Result<()> {
        match format {
            ReportFormat::Text => self.write_text(w),
            ReportFormat::Json => self.write_json(w),
        }
    }

    pub fn write_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *w, self)?;
        writeln!(w)
    }

    pub fn write_text(&self, w: &mut dyn Write) -> io::Result<()> {
        let h = self.header();
        writeln!(w, "{} diagnostics report", h.tool)?;
        writeln!(w, "version: {}", h.version)?;
        writeln!(w, "generated: {}", h.generated_at)?;
        let mut section: Option<FactCategory> = None;
        for f in self.facts() {
            if section != Some(f.category()) {
                section = Some(f.category());
                writeln!(w)?;
                writeln!(w, "[{}]", f.category().as_str())?;
            }
            writeln!(w, "{} = {}", escaped(f.key()), escaped(f.value()))?;
        }
        let s = self.summary();
        let r = self.redactions();
        writeln!(w)?;
        writeln!(w, "[summary]")?;
        writeln!(w, "total_endpoints = {}", s.total_endpoints)?;
        writeln!(w, "pass = {}", s.pass_count)?;
        writeln!(w, "fail = {}", s.fail_count)?;
        writeln!(w, "skipped = {}", s.skip_count)?;
        writeln!(w, "redactions.omitted = {}", r.omitted)?;
        writeln!(w, "redactions.tokenized = {}", r.tokenized)?;
        Ok(())
    }
}

/// One fact per line: control characters are written as Rust escapes.
fn escaped(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}
