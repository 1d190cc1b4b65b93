//! HTML report: an index table plus one annotated source page per file.

use std::{collections::HashSet, fs, path::Path};

use html_escape::{encode_double_quoted_attribute, encode_text};
use tracing::{debug, info};

use super::{
    data::{CoverageData, FileCoverage},
    report::{display_name, display_percent},
};
use crate::error::{CoverageError, CoverageResult};

const STYLE: &str = r#"
body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; margin: 0; padding: 20px 40px; color: #333; }
h1 { font-size: 1.4em; }
table.index { border-collapse: collapse; }
table.index th, table.index td { padding: 4px 12px; text-align: right; border-bottom: 1px solid #eee; }
table.index th.name, table.index td.name { text-align: left; }
tr.total td { font-weight: bold; border-top: 2px solid #333; }
.source { font-family: Menlo, Consolas, monospace; font-size: 13px; white-space: pre; }
.source p { margin: 0; padding: 0 8px; }
.source .n { display: inline-block; width: 4em; color: #999; text-align: right; margin-right: 1em; }
.run { background: #ddffdd; }
.mis { background: #ffdddd; }
.exc { background: #eeeeee; color: #808080; }
.footer { margin-top: 20px; color: #999; font-size: 0.85em; }
"#;

/// Replace `directory` with a fresh report. Returns the total percentage.
pub fn write_html_report(
    data: &CoverageData,
    root: &Path,
    directory: &Path,
) -> CoverageResult<f64> {
    if directory.exists() {
        fs::remove_dir_all(directory).map_err(|err| CoverageError::io(directory, err))?;
    }
    fs::create_dir_all(directory).map_err(|err| CoverageError::io(directory, err))?;

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M %z").to_string();

    let mut pages = Vec::with_capacity(data.files.len());
    let mut taken = HashSet::new();
    for file in &data.files {
        let name = display_name(&file.path, root);
        let page = unique_page_name(&name, &mut taken);
        let html = render_file_page(file, &name, &timestamp);
        let path = directory.join(&page);
        fs::write(&path, html).map_err(|err| CoverageError::io(&path, err))?;
        debug!(file = %name, page = %page, "Wrote file page");
        pages.push((name, page, file));
    }

    let index = render_index(data, &pages, &timestamp);
    let index_path = directory.join("index.html");
    fs::write(&index_path, index).map_err(|err| CoverageError::io(&index_path, err))?;

    // Generated output never belongs in version control.
    let gitignore = directory.join(".gitignore");
    fs::write(&gitignore, "*\n").map_err(|err| CoverageError::io(&gitignore, err))?;

    info!(path = %index_path.display(), files = pages.len(), "HTML report written");
    Ok(data.totals().percent())
}

/// Flattened, filesystem-safe page name for a displayed source path.
fn page_name(display_name: &str) -> String {
    let flat: String = display_name
        .trim_start_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{flat}.html")
}

/// [`page_name`], suffixed with `_2`, `_3`, ... when an earlier file already
/// flattened to the same name.
fn unique_page_name(display_name: &str, taken: &mut HashSet<String>) -> String {
    let page = page_name(display_name);
    if taken.insert(page.clone()) {
        return page;
    }
    let stem = page.trim_end_matches(".html");
    (2..)
        .map(|n| format!("{stem}_{n}.html"))
        .find(|candidate| taken.insert(candidate.clone()))
        .unwrap_or(page)
}

fn render_index(
    data: &CoverageData,
    pages: &[(String, String, &FileCoverage)],
    timestamp: &str,
) -> String {
    let mut rows = String::new();
    for (name, page, file) in pages {
        let totals = file.totals();
        rows.push_str(&format!(
            "<tr><td class=\"name\"><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            encode_double_quoted_attribute(page),
            encode_text(name),
            totals.statements,
            totals.missing(),
            file.excluded.len(),
            display_percent(&totals),
        ));
    }

    let total = data.totals();
    let excluded: usize = data.files.iter().map(|f| f.excluded.len()).sum();
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Coverage report</title>
    <style>{STYLE}</style>
</head>
<body>
    <h1>Coverage report: {percent}</h1>
    <table class="index">
        <thead>
            <tr><th class="name">Module</th><th>statements</th><th>missing</th><th>excluded</th><th>coverage</th></tr>
        </thead>
        <tbody>
{rows}        </tbody>
        <tfoot>
            <tr class="total"><td class="name">Total</td><td>{statements}</td><td>{missing}</td><td>{excluded}</td><td>{percent}</td></tr>
        </tfoot>
    </table>
    <p class="footer">Measured source: {source}. Created at {timestamp}.</p>
</body>
</html>
"#,
        percent = display_percent(&total),
        statements = total.statements,
        missing = total.missing(),
        source = encode_text(&data.source.join(", ")),
    )
}

fn render_file_page(file: &FileCoverage, name: &str, timestamp: &str) -> String {
    let totals = file.totals();
    let body = match fs::read_to_string(&file.path) {
        Ok(source) => {
            let mut lines = String::new();
            for (index, text) in source.lines().enumerate() {
                let number = index as u32 + 1;
                let class = if file.excluded.contains(&number) {
                    "exc"
                } else if file.executed.contains(&number) {
                    "run"
                } else if file.statements.contains(&number) {
                    "mis"
                } else {
                    "pln"
                };
                lines.push_str(&format!(
                    "<p class=\"{class}\"><span class=\"n\">{number}</span>{}</p>\n",
                    encode_text(text)
                ));
            }
            lines
        }
        Err(err) => format!(
            "<p>Source unavailable: {}</p>\n",
            encode_text(&err.to_string())
        ),
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Coverage for {title}</title>
    <style>{STYLE}</style>
</head>
<body>
    <h1>Coverage for {title}: {percent}</h1>
    <p>{statements} statements, {run} run, {missing} missing, {excluded} excluded. <a href="index.html">Back to index</a></p>
    <div class="source">
{body}    </div>
    <p class="footer">Created at {timestamp}.</p>
</body>
</html>
"#,
        title = encode_text(name),
        percent = display_percent(&totals),
        statements = totals.statements,
        run = totals.executed,
        missing = totals.missing(),
        excluded = file.excluded.len(),
    )
}
