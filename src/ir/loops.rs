use super::ast::*;
use crate::utils::err::*;
use crate::utils::name::Name;
use crate::utils::smap::*;

pub fn loop_counter_name(coord: usize) -> Name {
    Name::new(format!("ctr_{coord}"))
}

fn contains_loop(acc: bool, node: &Node) -> bool {
    acc || node.is_loop() || node.sfold(false, contains_loop)
}

// A loop is innermost when its body contains no further loops.
pub fn is_innermost_loop(node: &Node) -> bool {
    match node {
        Node::Loop {body, ..} => !body.iter().fold(false, contains_loop),
        _ => false
    }
}

fn collect_loops<'a>(node: &'a Node, acc: &mut Vec<&'a Node>) {
    if node.is_loop() {
        acc.push(node);
    }
    match node {
        Node::Block {body, ..} | Node::Loop {body, ..} => {
            body.iter().for_each(|n| collect_loops(n, acc));
        },
        Node::Conditional {thn, els, ..} => {
            thn.iter().for_each(|n| collect_loops(n, acc));
            if let Some(els) = els {
                els.iter().for_each(|n| collect_loops(n, acc));
            }
        },
        _ => ()
    }
}

// All loops of a tree in pre-order.
pub fn all_loops<'a>(nodes: &'a [Node]) -> Vec<&'a Node> {
    let mut acc = vec![];
    nodes.iter().for_each(|n| collect_loops(n, &mut acc));
    acc
}

// Applies a transformation to every innermost loop. The transformation may replace a loop by any
// number of nodes.
pub fn map_innermost_loops(
    nodes: Vec<Node>,
    f: &impl Fn(Node) -> CompileResult<Vec<Node>>
) -> CompileResult<Vec<Node>> {
    let mut acc = vec![];
    for node in nodes {
        if is_innermost_loop(&node) {
            acc.extend(f(node)?);
        } else {
            acc.push(map_nested(node, f)?);
        }
    }
    Ok(acc)
}

fn map_nested(node: Node, f: &impl Fn(Node) -> CompileResult<Vec<Node>>) -> CompileResult<Node> {
    match node {
        Node::Block {body, pragma} => Ok(Node::Block {body: map_innermost_loops(body, f)?, pragma}),
        Node::Loop {counter, coord, start, stop, step, body, prefix_lines} => {
            let body = map_innermost_loops(body, f)?;
            Ok(Node::Loop {counter, coord, start, stop, step, body, prefix_lines})
        },
        Node::Conditional {cond, thn, els} => {
            let thn = map_innermost_loops(thn, f)?;
            let els = match els {
                Some(els) => Some(map_innermost_loops(els, f)?),
                None => None
            };
            Ok(Node::Conditional {cond, thn, els})
        },
        _ => Ok(node)
    }
}

// Adds a prefix line to the outermost loops of a tree. All loops of the first node list that
// contains a loop are prefixed, which includes the remainder loop of a vectorized loop.
pub fn add_prefix_to_outermost_loop(nodes: Vec<Node>, line: &str) -> (bool, Vec<Node>) {
    if nodes.iter().any(|n| matches!(n, Node::Loop {..})) {
        let nodes = nodes.into_iter()
            .map(|node| match node {
                Node::Loop {counter, coord, start, stop, step, body, mut prefix_lines} => {
                    prefix_lines.push(line.to_string());
                    Node::Loop {counter, coord, start, stop, step, body, prefix_lines}
                },
                n => n
            })
            .collect();
        return (true, nodes);
    }
    nodes.into_iter().fold((false, vec![]), |(done, mut acc), node| {
        let (found, node) = match node {
            Node::Block {body, pragma} if !done => {
                let (found, body) = add_prefix_to_outermost_loop(body, line);
                (found, Node::Block {body, pragma})
            },
            _ => (false, node)
        };
        acc.push(node);
        (done || found, acc)
    })
}
