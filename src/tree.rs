//! Text preview of a dependency tree.

use crate::model::DependencyNode;
use unicode_width::UnicodeWidthStr;

struct Line {
    head: String,
    summary: String,
    labels: Option<String>,
}

/// Renders the tree with box-drawing branches. Row counts line up in one
/// column, measured in display width so wide table names stay aligned.
///
/// ```text
/// ORDERS          (1 row)  -  42
/// └── ORDER_LINE  (2 rows)  -  100, 101
/// ```
pub fn render_tree(root: &DependencyNode) -> String {
    let mut lines = Vec::with_capacity(root.len());
    lines.push(line_for(root, String::new()));
    collect(root, "", &mut lines);

    let width = lines
        .iter()
        .map(|l| UnicodeWidthStr::width(l.head.as_str()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for line in lines {
        let pad = width - UnicodeWidthStr::width(line.head.as_str());
        out.push_str(&line.head);
        out.push_str(&" ".repeat(pad + 2));
        out.push_str(&line.summary);
        if let Some(labels) = line.labels {
            out.push_str("  -  ");
            out.push_str(&labels);
        }
        out.push('\n');
    }
    out
}

fn line_for(node: &DependencyNode, prefix: String) -> Line {
    Line {
        head: prefix + &node.table,
        summary: node.summary(),
        labels: node.label_text(),
    }
}

fn collect(node: &DependencyNode, indent: &str, lines: &mut Vec<Line>) {
    let last = node.children.len().saturating_sub(1);
    for (i, child) in node.children.iter().enumerate() {
        let (branch, next) = if i == last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        lines.push(line_for(child, format!("{}{}", indent, branch)));
        collect(child, &format!("{}{}", indent, next), lines);
    }
}
