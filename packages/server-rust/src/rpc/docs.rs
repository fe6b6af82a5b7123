//! Documentation responder: signature line plus trimmed docstring.

use jinx_core::encode_to_string;

use super::procedure::Procedure;

const TAB_WIDTH: usize = 8;

/// Renders `name(p1, p2=default, ...):\n<docstring>` for `procedure`.
///
/// Defaults appear in their wire form, so a string default renders quoted.
/// A variadic tail renders as `...`.
#[must_use]
pub fn render(procedure: &Procedure) -> String {
    let mut params: Vec<String> = procedure
        .params()
        .iter()
        .map(|param| match &param.default {
            Some(default) => {
                let shown = encode_to_string(default).unwrap_or_else(|_| default.kind_name().to_string());
                format!("{}={shown}", param.name)
            }
            None => param.name.clone(),
        })
        .collect();
    if procedure.accepts_variadic() {
        params.push("...".to_string());
    }

    format!(
        "{}({}):\n{}",
        procedure.name(),
        params.join(", "),
        trim_docstring(procedure.docstring())
    )
}

/// Normalises a docstring for display.
///
/// Tabs expand to 8-column stops, the leading spaces shared by every
/// non-blank line are removed, trailing whitespace is stripped from each line, and
/// leading and trailing blank lines are dropped. Relative indentation is
/// kept.
#[must_use]
pub fn trim_docstring(docstring: &str) -> String {
    let lines: Vec<String> = docstring
        .lines()
        .map(|line| expand_tabs(line).trim_end().to_string())
        .collect();

    let indent = lines
        .iter()
        .filter(|line| !line.is_empty())
        .map(|line| line.len() - line.trim_start_matches(' ').len())
        .min()
        .unwrap_or(0);

    let dedented: Vec<&str> = lines
        .iter()
        .map(|line| line.get(indent..).unwrap_or(""))
        .collect();

    let Some(first) = dedented.iter().position(|line| !line.is_empty()) else {
        return String::new();
    };
    let last = dedented
        .iter()
        .rposition(|line| !line.is_empty())
        .unwrap_or(first);

    dedented[first..=last].join("\n")
}

fn expand_tabs(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut column = 0;
    for c in line.chars() {
        if c == '\t' {
            let pad = TAB_WIDTH - column % TAB_WIDTH;
            out.push_str(&" ".repeat(pad));
            column += pad;
        } else {
            out.push(c);
            column += 1;
        }
    }
    out
}
