use super::ast::*;
use crate::field::FieldAccess;
use crate::utils::name::Name;
use crate::utils::smap::*;

use std::collections::BTreeMap;

// Replaces symbols by expressions. The replacement keeps the type annotation of the replacing
// expression.
pub fn substitute(e: Expr, map: &BTreeMap<Name, Expr>) -> Expr {
    match e {
        Expr::Symbol {id, ty} => match map.get(&id) {
            Some(r) => r.clone(),
            None => Expr::Symbol {id, ty}
        },
        _ => e.smap(|e| substitute(e, map))
    }
}

pub fn collect_field_accesses(acc: Vec<FieldAccess>, e: &Expr) -> Vec<FieldAccess> {
    match e {
        Expr::FieldAccess {access, ..} => {
            let mut acc = acc;
            acc.push(access.clone());
            acc
        },
        _ => e.sfold(acc, collect_field_accesses)
    }
}

// Determines whether the expression contains a node satisfying the predicate.
pub fn contains(e: &Expr, p: &impl Fn(&Expr) -> bool) -> bool {
    p(e) || e.sfold(false, |acc, e| acc || contains(e, p))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;
    use crate::utils::ast::ElemSize;

    #[test]
    fn substitute_symbol() {
        let map = vec![(Name::new("a"), int(2))].into_iter().collect::<BTreeMap<_, _>>();
        let e = substitute(add(sym("a"), sym("b")), &map);
        assert_eq!(e, add(int(2), sym("b")));
    }

    #[test]
    fn collect_accesses_in_order() {
        let f = field2d("f", ElemSize::F64);
        let e = add(at(&f, &[1, 0]), mul(sym("w"), at(&f, &[0, -1])));
        let accesses = collect_field_accesses(vec![], &e);
        let offsets = accesses.iter().map(|a| a.offsets.clone()).collect::<Vec<_>>();
        assert_eq!(offsets, vec![vec![1, 0], vec![0, -1]]);
    }

    #[test]
    fn contains_call() {
        let e = add(sym("a"), call("sqrt", vec![sym("b")]));
        assert!(contains(&e, &|e| matches!(e, Expr::Call {..})));
        assert!(!contains(&e, &|e| matches!(e, Expr::Piecewise {..})));
    }
}
