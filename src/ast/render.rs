//! Textual renderers for `Node` (spec.md §6 "XML output" / "Single-line
//! text"). Kept as a free-function module rather than inherent methods on
//! `Node` so the two independent renderers don't crowd the evaluation logic
//! in `mod.rs`.

use super::area::{Area, AreaInput};
use super::{Node, RuleNode, RuleOption};

/// Render a node as the indented XML tree spec.md §6 describes. `indent` is
/// the current nesting depth (2 spaces per level); `output_names` selects
/// whether `id` attributes are element names or numeric ids.
pub fn to_xml(node: &Node, indent: usize, output_names: bool) -> String {
    let pad = "  ".repeat(indent);
    match node {
        Node::Double(v) => format!("{pad}<double>{v}</double>"),
        Node::String(s) => format!("{pad}<string>{}</string>", escape(s)),
        Node::Variable { name, .. } => format!("{pad}<variable>!{}</variable>", escape(name)),
        Node::Source { input, area, is_marker } => {
            let tag = if *is_marker { "marker" } else { "source" };
            format!(
                "{pad}<{tag}>\n{}\n{pad}</{tag}>",
                render_area(input, area, indent + 1, output_names)
            )
        }
        Node::Destination { input, area } => format!(
            "{pad}<destination>\n{}\n{pad}</destination>",
            render_area(input, area, indent + 1, output_names)
        ),
        Node::FunctionCall { name, params } => {
            let child_pad = "  ".repeat(indent + 1);
            let params_xml = params
                .iter()
                .map(|p| to_xml(p, indent + 2, output_names))
                .collect::<Vec<_>>()
                .join("\n");
            if params.is_empty() {
                format!("{pad}<function name=\"{name}\" />")
            } else {
                format!(
                    "{pad}<function name=\"{name}\">\n{child_pad}<params>\n{params_xml}\n{child_pad}</params>\n{pad}</function>"
                )
            }
        }
    }
}

fn render_area(input: &AreaInput, area: &Area, indent: usize, output_names: bool) -> String {
    let pad = "  ".repeat(indent);
    let n = area.dimension_count().max(input.len());
    (0..n)
        .map(|d| {
            let restricted = area.is_restricted.get(d).copied().unwrap_or(false);
            let id_attr = if output_names {
                "name".to_string()
            } else {
                area.element_ids.get(d).copied().unwrap_or(0).to_string()
            };
            format!(
                "{pad}<dimension id=\"{}\" restriction=\"{}\" />",
                id_attr,
                if restricted { "true" } else { "false" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the rule's root as `<rule path="base"|"none-base"> ... </rule>`
/// (spec.md §6).
pub fn rule_to_xml(rule: &RuleNode, output_names: bool) -> String {
    let path_attr = match rule.option {
        RuleOption::Base => " path=\"base\"",
        RuleOption::Consolidation => " path=\"none-base\"",
        RuleOption::None => "",
    };
    let dest = to_xml(&rule.destination, 1, output_names);
    let expr = to_xml(&rule.expr, 2, output_names);
    let markers = if rule.external_markers.is_empty() {
        String::new()
    } else {
        let body = rule
            .external_markers
            .iter()
            .map(|m| to_xml(m, 2, output_names))
            .collect::<Vec<_>>()
            .join("\n");
        format!("\n  <external-markers>\n{body}\n  </external-markers>")
    };
    format!(
        "<rule{path_attr}>\n{dest}\n  <definition>\n{expr}\n  </definition>{markers}\n</rule>"
    )
}

/// Render a node as the single-line rule-text form (spec.md §6).
pub fn to_single_line(node: &Node, output_names: bool) -> String {
    match node {
        Node::Double(v) => format_double(*v),
        Node::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        Node::Variable { name, .. } => format!("!{name}"),
        Node::Source { input, area, is_marker } => {
            let body = area_body(input, area, output_names);
            if *is_marker {
                format!("[[{body}]]")
            } else {
                format!("[{body}]")
            }
        }
        Node::Destination { input, area } => {
            format!("[{}]", area_body(input, area, output_names))
        }
        Node::FunctionCall { name, params } => {
            let args = params
                .iter()
                .map(|p| to_single_line(p, output_names))
                .collect::<Vec<_>>()
                .join(",");
            format!("{name}({args})")
        }
    }
}

fn format_double(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

fn area_body(input: &AreaInput, area: &Area, output_names: bool) -> String {
    let n = area.dimension_count().max(input.len());
    (0..n)
        .map(|d| {
            let restricted = area.is_restricted.get(d).copied().unwrap_or(false);
            if !restricted {
                return String::new();
            }
            let elem = area.element_ids.get(d).copied().unwrap_or(0);
            if output_names {
                elem.to_string()
            } else if area.is_qualified.get(d).copied().unwrap_or(false) {
                format!("{}:{}", area.dimension_ids.get(d).copied().unwrap_or(0), elem)
            } else {
                format!("{}@{}", area.dimension_ids.get(d).copied().unwrap_or(0), elem)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Render the rule's root as `destination = [C:|N:] expr [@markers]`
/// (spec.md §6).
pub fn rule_to_single_line(rule: &RuleNode, output_names: bool) -> String {
    let dest = to_single_line(&rule.destination, output_names);
    let opt = match rule.option {
        RuleOption::Consolidation => "C:",
        RuleOption::Base => "N:",
        RuleOption::None => "",
    };
    let expr = to_single_line(&rule.expr, output_names);
    let markers = if rule.external_markers.is_empty() {
        String::new()
    } else {
        let body = rule
            .external_markers
            .iter()
            .map(|m| to_single_line(m, output_names))
            .collect::<Vec<_>>()
            .join(",");
        format!(" @{body}")
    };
    format!("{dest} = {opt}{expr}{markers}")
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
