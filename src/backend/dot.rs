use crate::ir::ast::*;
use crate::utils::pprint::PrettyPrint;

use itertools::Itertools;

const FUNCTION_COLOR: &str = "#a056db";
const LOOP_COLOR: &str = "#3498db";
const BLOCK_COLOR: &str = "#dbc256";
const ASSIGNMENT_COLOR: &str = "#56db7f";
const CONDITIONAL_COLOR: &str = "#56bd7f";
const DEFAULT_COLOR: &str = "#ffffff";

struct DotGraph {
    short: bool,
    nodes: Vec<String>,
    edges: Vec<String>,
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

impl DotGraph {
    fn add_node(&mut self, label: String, color: &str) -> usize {
        let id = self.nodes.len();
        self.nodes.push(format!(
            "  n{id} [label=\"{0}\", style=filled, fillcolor=\"{color}\"];", escape(&label)
        ));
        id
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        self.edges.push(format!("  n{from} -> n{to};"));
    }

    fn add_block(&mut self, parent: usize, label: Option<&str>, body: &[Node]) {
        let id = self.nodes.len();
        let label = match label {
            Some(l) if !self.short => l.to_string(),
            _ => format!("Block<{id}>")
        };
        let block = self.add_node(label, BLOCK_COLOR);
        self.add_edge(parent, block);
        for n in body {
            self.add_ir_node(block, n);
        }
    }

    fn add_ir_node(&mut self, parent: usize, node: &Node) {
        match node {
            Node::Block {body, pragma} => self.add_block(parent, pragma.as_deref(), body),
            Node::Loop {counter, coord, start, stop, step, body, ..} => {
                let label = if self.short {
                    format!("Loop over dim {coord}")
                } else {
                    format!(
                        "for {0} in {1}..{2} step {3}", counter.get_str(),
                        start.pprint_default(), stop.pprint_default(), step.pprint_default()
                    )
                };
                let id = self.add_node(label, LOOP_COLOR);
                self.add_edge(parent, id);
                self.add_block(id, None, body);
            },
            Node::Conditional {cond, thn, els} => {
                let label = if self.short {
                    "if".to_string()
                } else {
                    format!("if {0}", cond.pprint_default())
                };
                let id = self.add_node(label, CONDITIONAL_COLOR);
                self.add_edge(parent, id);
                self.add_block(id, None, thn);
                if let Some(els) = els {
                    self.add_block(id, None, els);
                }
            },
            Node::Assignment {lhs, rhs, ..} => {
                let label = if self.short {
                    lhs.pprint_default()
                } else {
                    format!("{0} = {1}", lhs.pprint_default(), rhs.pprint_default())
                };
                let id = self.add_node(label, ASSIGNMENT_COLOR);
                self.add_edge(parent, id);
            },
            Node::TempAlloc {..} | Node::TempFree {..} | Node::CustomCode {..} |
            Node::ThreadBlockSync => {
                let label = node.pprint_default().trim().to_string();
                let id = self.add_node(label, DEFAULT_COLOR);
                self.add_edge(parent, id);
            },
        }
    }
}

// Renders the node tree of a kernel as a Graphviz digraph. Short labels only name the kind of each
// node, while long labels contain the printed expressions.
pub fn print_dot(kernel: &KernelFunction, short: bool) -> String {
    let mut g = DotGraph {short, nodes: vec![], edges: vec![]};
    let params = kernel.params.iter().map(|p| p.id.get_str()).join(", ");
    let root = g.add_node(format!("Func: {0} ({params})", kernel.name), FUNCTION_COLOR);
    g.add_block(root, None, &kernel.body);
    let lines = g.nodes.into_iter().chain(g.edges.into_iter()).join("\n");
    format!("digraph {0} {{\n{lines}\n}}", kernel.name)
}
