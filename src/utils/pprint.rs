use crate::utils::name::Name;

use itertools::Itertools;
use rand::distributions::{Alphanumeric, DistString};

use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_INDENT: usize = 2;

#[derive(Debug)]
pub struct PrettyPrintEnv {
    strs: BTreeSet<String>,
    vars: BTreeMap<String, Name>,
    indent: usize,
    indent_increment: usize,
}

impl PrettyPrintEnv {
    pub fn new() -> Self {
        PrettyPrintEnv {
            strs: BTreeSet::new(),
            vars: BTreeMap::new(),
            indent: 0,
            indent_increment: DEFAULT_INDENT,
        }
    }

    pub fn incr_indent(self) -> Self {
        let indent = self.indent + self.indent_increment;
        PrettyPrintEnv {indent, ..self}
    }

    pub fn decr_indent(self) -> Self {
        let indent = self.indent.saturating_sub(self.indent_increment);
        PrettyPrintEnv {indent, ..self}
    }

    pub fn print_indent(&self) -> String {
        " ".repeat(self.indent)
    }
}

impl Default for PrettyPrintEnv {
    fn default() -> Self {
        PrettyPrintEnv::new()
    }
}

pub trait PrettyPrint {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String);

    fn pprint_default(&self) -> String {
        let (_, s) = self.pprint(PrettyPrintEnv::new());
        s
    }
}

fn rand_alphanum(n: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), n)
}

fn alloc_free_string(mut env: PrettyPrintEnv, id: &Name) -> (PrettyPrintEnv, String) {
    let mut s = id.get_str().clone();
    if env.strs.contains(&s) {
        s = id.print_with_sym();
        while env.strs.contains(&s) {
            s = format!("{0}_{1}", id.get_str(), rand_alphanum(5));
        }
    };
    env.strs.insert(s.clone());
    env.vars.insert(s.clone(), id.clone());
    (env, s)
}

// Two distinct names sharing the same string are printed differently, so that compiler-generated
// temporaries never shadow a user symbol in the printed output.
impl PrettyPrint for Name {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        let known = env.vars.iter()
            .find(|(_, n)| self.eq(n))
            .map(|(s, _)| s.clone());
        match known {
            Some(s) => (env, s),
            None => alloc_free_string(env, self)
        }
    }
}

impl<T: PrettyPrint> PrettyPrint for Vec<T> {
    fn pprint(&self, env: PrettyPrintEnv) -> (PrettyPrintEnv, String) {
        pprint_iter(self.iter(), env, "\n")
    }
}

pub fn pprint_iter<'a, T: PrettyPrint + 'a, I: Iterator<Item=&'a T>>(
    it: I,
    env: PrettyPrintEnv,
    separator: &str
) -> (PrettyPrintEnv, String) {
    let (env, strs) = it.fold((env, vec![]), |(env, mut strs), v| {
            let (env, v) = v.pprint(env);
            strs.push(v);
            (env, strs)
        });
    (env, strs.into_iter().join(separator))
}

// Prints a floating-point value such that it is always recognized as a floating-point literal by a
// C-like compiler, i.e. it contains a decimal point or an exponent.
pub fn print_float(v: f64) -> String {
    if v.is_nan() {
        "NAN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "INFINITY".to_string() } else { "-INFINITY".to_string() }
    } else {
        let s = format!("{v:?}");
        if s.contains('.') || s.contains('e') {
            s
        } else {
            format!("{s}.0")
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_distinct_names_print() {
        let n1 = Name::sym_str("x");
        let n2 = n1.clone().with_new_sym();
        assert!(n1 != n2);
        let env = PrettyPrintEnv::new();
        let (env, s1) = n1.pprint(env);
        let (env, s2) = n2.pprint(env);
        assert_eq!(env.strs.len(), 2);
        assert!(s1 != s2);
    }

    #[test]
    fn test_same_name_prints_same_string() {
        let n = Name::new("ctr_0");
        let env = PrettyPrintEnv::new();
        let (env, s1) = n.pprint(env);
        let (_, s2) = n.pprint(env);
        assert_eq!(s1, "ctr_0");
        assert_eq!(s1, s2);
    }

    #[test]
    fn test_float_printing() {
        assert_eq!(print_float(1.0), "1.0");
        assert_eq!(print_float(0.25), "0.25");
        assert_eq!(print_float(-3.5), "-3.5");
        assert_eq!(print_float(1e-7), "1e-7");
        assert_eq!(print_float(f64::INFINITY), "INFINITY");
    }
}
