use super::ast::*;
use crate::utils::pprint::*;

use itertools::Itertools;

fn pprint_body(env: PrettyPrintEnv, body: &Vec<Node>) -> (PrettyPrintEnv, String) {
    let env = env.incr_indent();
    let (env, body) = pprint_iter(body.iter(), env, "\n");
    (env.decr_indent(), body)
}

impl PrettyPrint for Node {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let indent = env.print_indent();
        match self {
            Node::Block {body, pragma} => {
                let (env, body) = pprint_body(env, body);
                let pragma = match pragma {
                    Some(p) => format!("{indent}{p}\n"),
                    None => String::new()
                };
                (env, format!("{pragma}{indent}{{\n{body}\n{indent}}}"))
            },
            Node::Loop {counter, start, stop, step, body, prefix_lines, ..} => {
                let (env, counter) = counter.pprint(env);
                let (env, start) = start.pprint(env);
                let (env, stop) = stop.pprint(env);
                let (env, step) = step.pprint(env);
                let (env, body) = pprint_body(env, body);
                let prefix = prefix_lines.iter()
                    .map(|l| format!("{indent}{l}\n"))
                    .join("");
                let s = format!(
                    "{prefix}{indent}for {counter} in {start}..{stop} step {step} {{\n{body}\n{indent}}}"
                );
                (env, s)
            },
            Node::Conditional {cond, thn, els} => {
                let (env, cond) = cond.pprint(env);
                let (env, thn) = pprint_body(env, thn);
                match els {
                    Some(els) => {
                        let (env, els) = pprint_body(env, els);
                        let s = format!(
                            "{0}if {1} {{\n{2}\n{0}}} else {{\n{3}\n{0}}}",
                            indent, cond, thn, els
                        );
                        (env, s)
                    },
                    None => (env, format!("{0}if {1} {{\n{2}\n{0}}}", indent, cond, thn))
                }
            },
            Node::Assignment {lhs, rhs, is_decl, is_const} => {
                let (env, l) = lhs.pprint(env);
                let (env, r) = rhs.pprint(env);
                let prefix = match (is_decl, is_const) {
                    (true, true) => format!("const {0} ", lhs.get_type()),
                    (true, false) => format!("{0} ", lhs.get_type()),
                    (false, _) => String::new()
                };
                (env, format!("{indent}{prefix}{l} = {r};"))
            },
            Node::TempAlloc {id, ty, size, offset} => {
                let (env, id) = id.pprint(env);
                let (env, size) = size.pprint(env);
                (env, format!("{indent}{ty} {id} = alloc({size}) + {offset};"))
            },
            Node::TempFree {id, offset, ..} => {
                let (env, id) = id.pprint(env);
                (env, format!("{indent}free({id} - {offset});"))
            },
            Node::CustomCode {code, ..} => {
                let s = code.lines().map(|l| format!("{indent}{l}")).join("\n");
                (env, s)
            },
            Node::ThreadBlockSync => (env, format!("{indent}sync_threads();")),
        }
    }
}

impl PrettyPrint for Param {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let (env, id) = self.id.pprint(env);
        (env, format!("{0} {id}", self.ty))
    }
}

impl PrettyPrint for KernelFunction {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let (env, params) = pprint_iter(self.params.iter(), env, ", ");
        let (env, body) = pprint_body(env, &self.body);
        let vectorized = match &self.instruction_set {
            Some(is) => format!(" [{0} x{1}]", is.name, is.width),
            None => String::new()
        };
        let s = format!("kernel {0}({params}){vectorized} {{\n{body}\n}}", self.name);
        (env, s)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::expr::ast_builder::*;
    use crate::utils::ast::ElemSize;
    use crate::utils::name::Name;

    #[test]
    fn print_loop_with_prefix() {
        let body = vec![Node::assign(sym("x"), int(1))];
        let l = Node::Loop {
            counter: Name::new("ctr_0"), coord: 0, start: int(1), stop: sym("n"),
            step: int(1), body, prefix_lines: vec!["#pragma omp for".to_string()]
        };
        let expected = "#pragma omp for\nfor ctr_0 in 1..n step 1 {\n  x = 1;\n}";
        assert_eq!(l.pprint_default(), expected);
    }

    #[test]
    fn print_const_declaration() {
        let n = Node::declare(typed_sym("a", ElemSize::F32), float32(2.0), true);
        assert_eq!(n.pprint_default(), "const float a = 2.0;");
    }
}
