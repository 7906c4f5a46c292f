use super::ast::*;
use crate::expr::ast::Expr;
use crate::expr::types::Type;
use crate::utils::name::Name;
use crate::utils::smap::SFold;

use std::collections::{BTreeMap, BTreeSet};

pub type SymbolTypes = BTreeMap<Name, Type>;

// Collects the symbols referenced by an expression together with their types. The base pointer
// of a resolved access counts as a referenced symbol.
pub fn expr_symbols(mut acc: SymbolTypes, e: &Expr) -> SymbolTypes {
    match e {
        Expr::Symbol {id, ty} => {
            acc.entry(id.clone()).or_insert_with(|| ty.clone());
            acc
        },
        Expr::ResolvedAccess {base, base_ty, ..} => {
            acc.entry(base.clone()).or_insert_with(|| base_ty.clone());
            e.sfold(acc, expr_symbols)
        },
        _ => e.sfold(acc, expr_symbols)
    }
}

// The symbols introduced by a node into the scope that follows it. A loop counter is only
// visible within the body of its loop and is not included.
pub fn defined_symbols(node: &Node) -> BTreeSet<Name> {
    match node {
        Node::Assignment {lhs: Expr::Symbol {id, ..}, is_decl: true, ..} => {
            vec![id.clone()].into_iter().collect()
        },
        Node::TempAlloc {id, ..} => vec![id.clone()].into_iter().collect(),
        Node::CustomCode {defines, ..} => defines.clone(),
        _ => BTreeSet::new()
    }
}

// The symbols read by a node itself, excluding those of its child nodes.
fn used_symbols(node: &Node) -> SymbolTypes {
    match node {
        Node::Assignment {lhs, rhs, is_decl, ..} => {
            let acc = expr_symbols(SymbolTypes::new(), rhs);
            match lhs {
                Expr::Symbol {..} if *is_decl => acc,
                _ => expr_symbols(acc, lhs)
            }
        },
        Node::TempFree {id, ty, ..} => {
            vec![(id.clone(), ty.clone())].into_iter().collect()
        },
        Node::CustomCode {reads, ..} => {
            reads.iter().map(|id| (id.clone(), Type::Unknown)).collect()
        },
        _ => node.sfold(SymbolTypes::new(), expr_symbols)
    }
}

fn undefined_in_scope(
    nodes: &[Node],
    mut defined: BTreeSet<Name>,
    mut acc: SymbolTypes
) -> SymbolTypes {
    for node in nodes {
        for (id, ty) in used_symbols(node) {
            if !defined.contains(&id) {
                acc.entry(id).or_insert(ty);
            }
        }
        acc = match node {
            Node::Block {body, ..} => undefined_in_scope(body, defined.clone(), acc),
            Node::Loop {counter, body, ..} => {
                let mut inner = defined.clone();
                inner.insert(counter.clone());
                undefined_in_scope(body, inner, acc)
            },
            Node::Conditional {thn, els, ..} => {
                let acc = undefined_in_scope(thn, defined.clone(), acc);
                match els {
                    Some(els) => undefined_in_scope(els, defined.clone(), acc),
                    None => acc
                }
            },
            _ => acc
        };
        defined.extend(defined_symbols(node));
    }
    acc
}

// The symbols read by a sequence of nodes before being defined within it, i.e., the symbols that
// must be provided by an enclosing scope or as kernel parameters.
pub fn undefined_symbols(nodes: &[Node]) -> SymbolTypes {
    undefined_in_scope(nodes, BTreeSet::new(), SymbolTypes::new())
}

fn collect_all_defined(mut acc: Vec<Name>, node: &Node) -> Vec<Name> {
    acc.extend(defined_symbols(node));
    if let Node::Loop {counter, ..} = node {
        acc.push(counter.clone());
    }
    node.sfold(acc, collect_all_defined)
}

// Every definition in a tree, in order of appearance. A symbol defined twice appears twice.
pub fn all_definitions(nodes: &[Node]) -> Vec<Name> {
    nodes.iter().fold(vec![], collect_all_defined)
}
