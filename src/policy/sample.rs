use std::fmt::Write;

use crate::policy::types::RuleDoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SampleFormat {
    /// Commented-out override file listing every default
    Kdl,
    /// Machine-readable policy reference
    Json,
}

pub fn render_sample(docs: &[RuleDoc], format: SampleFormat) -> Result<String, serde_json::Error> {
    match format {
        SampleFormat::Kdl => Ok(render_kdl(docs)),
        SampleFormat::Json => serde_json::to_string_pretty(docs),
    }
}

fn kdl_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Every default appears as a commented `rule` line an operator can
/// uncomment and edit.
fn render_kdl(docs: &[RuleDoc]) -> String {
    let mut out = String::new();
    for doc in docs {
        let _ = writeln!(out, "// {}", doc.description);
        for op in &doc.operations {
            let _ = writeln!(out, "// {} {}", op.method, op.path);
        }
        if !doc.scope_types.is_empty() {
            let scopes: Vec<_> = doc.scope_types.iter().map(|s| s.as_str()).collect();
            let _ = writeln!(out, "// Intended scope(s): {}", scopes.join(", "));
        }
        if let Some(dep) = &doc.deprecated {
            let _ = writeln!(
                out,
                "// Deprecated default (since {}): {}",
                dep.since, dep.check_str
            );
            for line in wrap(&dep.reason, 76) {
                let _ = writeln!(out, "//   {line}");
            }
        }
        let _ = writeln!(
            out,
            "// rule {} {}",
            kdl_string(&doc.name),
            kdl_string(&doc.check_str)
        );
        out.push('\n');
    }
    out
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.len() + 1 + word.len() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}
