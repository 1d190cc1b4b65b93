use std::{
    io::Write,
    path::{Path, PathBuf},
};

use super::data::{CoverageData, Totals};
use crate::error::{CoverageError, CoverageResult};

/// Whole-number percentage that never rounds a partial result to 0% or
/// 100%: anything above zero shows at least 1%, anything short of complete
/// shows at most 99%.
pub fn display_percent(totals: &Totals) -> String {
    let percent = totals.percent();
    let shown = if percent > 0.0 && percent < 1.0 {
        1.0
    } else if percent > 99.0 && percent < 100.0 {
        99.0
    } else {
        percent.round()
    };
    format!("{shown:.0}%")
}

/// Path shown for a measured file: relative to `root` when underneath it.
pub fn display_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Write the `Name / Stmts / Miss / Cover` table.
pub fn write_text_report(
    data: &CoverageData,
    root: &Path,
    out: &mut dyn Write,
) -> CoverageResult<f64> {
    let io_err = |err: std::io::Error| CoverageError::io("<stdout>", err);

    if data.files.is_empty() {
        writeln!(out, "No data to report.").map_err(io_err)?;
        return Ok(data.totals().percent());
    }

    let rows: Vec<(String, Totals)> = data
        .files
        .iter()
        .map(|file| (display_name(&file.path, root), file.totals()))
        .collect();
    let total = data.totals();

    let name_width = rows
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0)
        .max("TOTAL".len())
        .max("Name".len());
    let rule = "-".repeat(name_width + 21);

    writeln!(
        out,
        "{:<name_width$} {:>6} {:>6} {:>6}",
        "Name", "Stmts", "Miss", "Cover"
    )
    .map_err(io_err)?;
    writeln!(out, "{rule}").map_err(io_err)?;
    for (name, totals) in &rows {
        writeln!(
            out,
            "{:<name_width$} {:>6} {:>6} {:>6}",
            name,
            totals.statements,
            totals.missing(),
            display_percent(totals)
        )
        .map_err(io_err)?;
    }
    writeln!(out, "{rule}").map_err(io_err)?;
    writeln!(
        out,
        "{:<name_width$} {:>6} {:>6} {:>6}",
        "TOTAL",
        total.statements,
        total.missing(),
        display_percent(&total)
    )
    .map_err(io_err)?;

    Ok(total.percent())
}
