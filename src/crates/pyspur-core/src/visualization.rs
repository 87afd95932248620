//! Workflow visualization: render a [`WorkflowDefinition`] as DOT, Mermaid,
//! or ASCII art for debugging and the editor's canvas preview.
//!
//! Ground: teacher's `visualization.rs` (three-format renderer, direct vs.
//! conditional edge styling), narrowed from a typed `Graph`/`Edge` pair to
//! PySpur's `Node`/`Link` shape — a router's outgoing links become the
//! "conditional edge" case, labeled by `source_handle`.

use std::collections::HashSet;

use pyspur_store::WorkflowDefinition;

const ROUTER_NODE_TYPE: &str = "Router";

/// Workflow rendering format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizationFormat {
    /// DOT format for Graphviz.
    Dot,
    /// Mermaid diagram format.
    Mermaid,
    /// Simple ASCII art.
    Ascii,
}

#[derive(Debug, Clone)]
pub struct VisualizationOptions {
    pub format: VisualizationFormat,
    /// Include each node's `node_type` alongside its title.
    pub include_details: bool,
    pub title: Option<String>,
}

impl Default for VisualizationOptions {
    fn default() -> Self {
        Self { format: VisualizationFormat::Dot, include_details: false, title: None }
    }
}

impl VisualizationOptions {
    pub fn dot() -> Self {
        Self { format: VisualizationFormat::Dot, ..Default::default() }
    }

    pub fn mermaid() -> Self {
        Self { format: VisualizationFormat::Mermaid, ..Default::default() }
    }

    pub fn ascii() -> Self {
        Self { format: VisualizationFormat::Ascii, ..Default::default() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_details(mut self) -> Self {
        self.include_details = true;
        self
    }
}

/// Render `definition` in the requested format. Nested `subworkflow` scopes
/// are not expanded inline — call this again on `node.subworkflow` to render
/// a loop/agent body separately.
pub fn visualize(definition: &WorkflowDefinition, options: &VisualizationOptions) -> String {
    match options.format {
        VisualizationFormat::Dot => visualize_dot(definition, options),
        VisualizationFormat::Mermaid => visualize_mermaid(definition, options),
        VisualizationFormat::Ascii => visualize_ascii(definition, options),
    }
}

fn node_label(node: &pyspur_store::Node, options: &VisualizationOptions) -> String {
    if options.include_details {
        format!("{}\\n({})", node.title, node.node_type)
    } else {
        node.title.clone()
    }
}

fn visualize_dot(definition: &WorkflowDefinition, options: &VisualizationOptions) -> String {
    let mut out = String::new();
    out.push_str("digraph G {\n");
    out.push_str("    rankdir=TB;\n");
    out.push_str("    node [shape=box, style=rounded];\n");
    if let Some(title) = &options.title {
        out.push_str("    labelloc=\"t\";\n");
        out.push_str(&format!("    label=\"{}\";\n", escape_dot(title)));
    }

    for node in &definition.nodes {
        let fill = if node.node_type == ROUTER_NODE_TYPE {
            ", shape=diamond, style=filled, fillcolor=lightyellow"
        } else if node.subworkflow.is_some() {
            ", style=\"rounded,filled\", fillcolor=lightblue"
        } else {
            ""
        };
        out.push_str(&format!(
            "    \"{}\" [label=\"{}\"{}];\n",
            escape_dot(&node.id),
            escape_dot(&node_label(node, options)),
            fill
        ));
    }

    for link in &definition.links {
        match &link.source_handle {
            Some(handle) => out.push_str(&format!(
                "    \"{}\" -> \"{}\" [label=\"{}\", style=dashed];\n",
                escape_dot(&link.source_id),
                escape_dot(&link.target_id),
                escape_dot(handle)
            )),
            None => out.push_str(&format!(
                "    \"{}\" -> \"{}\";\n",
                escape_dot(&link.source_id),
                escape_dot(&link.target_id)
            )),
        }
    }

    out.push_str("}\n");
    out
}

fn visualize_mermaid(definition: &WorkflowDefinition, options: &VisualizationOptions) -> String {
    let mut out = String::new();
    out.push_str("%%{init: {'theme':'base'}}%%\n");
    out.push_str("graph TD\n");
    if let Some(title) = &options.title {
        out.push_str(&format!("    title[\"{}\"]\n", escape_mermaid(title)));
    }

    let router_ids: HashSet<&str> =
        definition.nodes.iter().filter(|n| n.node_type == ROUTER_NODE_TYPE).map(|n| n.id.as_str()).collect();

    for node in &definition.nodes {
        let (open, close, style) = if node.subworkflow.is_some() {
            ("[{", "}]", "fill:#ADD8E6,stroke:#4682B4,stroke-width:2px")
        } else if router_ids.contains(node.id.as_str()) {
            ("{", "}", "fill:#FFE4B5,stroke:#FF8C00,stroke-width:2px")
        } else {
            ("[", "]", "fill:#F0F0F0,stroke:#666,stroke-width:2px")
        };
        let id = sanitize_id(&node.id);
        out.push_str(&format!("    {id}{open}\"{}\"{close}\n", escape_mermaid(&node_label(node, options))));
        out.push_str(&format!("    style {id} {style}\n"));
    }

    for link in &definition.links {
        let from = sanitize_id(&link.source_id);
        let to = sanitize_id(&link.target_id);
        match &link.source_handle {
            Some(handle) => out.push_str(&format!("    {from} -.\"{}\"..-> {to}\n", escape_mermaid(handle))),
            None => out.push_str(&format!("    {from} --> {to}\n")),
        }
    }

    out
}

fn visualize_ascii(definition: &WorkflowDefinition, _options: &VisualizationOptions) -> String {
    let mut out = String::new();
    out.push_str("Workflow Structure:\n");
    out.push_str("====================\n\n");
    for node in &definition.nodes {
        out.push_str(&format!("[{}] ({})", node.title, node.node_type));
        if node.subworkflow.is_some() {
            out.push_str(" (subworkflow)");
        }
        out.push('\n');
        for link in definition.links.iter().filter(|l| l.source_id == node.id) {
            match &link.source_handle {
                Some(handle) => out.push_str(&format!("  -[{handle}]-> {}\n", link.target_id)),
                None => out.push_str(&format!("  -> {}\n", link.target_id)),
            }
        }
    }
    out
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_mermaid(s: &str) -> String {
    s.replace('"', "&quot;").replace('<', "&lt;").replace('>', "&gt;")
}

fn sanitize_id(s: &str) -> String {
    s.replace(['-', '.'], "_")
}
