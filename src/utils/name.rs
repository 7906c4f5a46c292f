use std::sync::atomic;
use std::cmp;
use std::fmt;
use std::hash;

pub type Sym = i64;

static COUNTER: atomic::AtomicI64 = atomic::AtomicI64::new(0);

fn gensym() -> Sym {
    COUNTER.fetch_add(1, atomic::Ordering::Relaxed)
}

// A symbol name. Names created from user input carry no symbol and compare by their string, while
// names introduced by the compiler (temporaries, partial pointers) may carry a unique symbol so
// that they never clash with a user-chosen name.
#[derive(Clone, Debug)]
pub struct Name {
    s: String,
    sym: Option<Sym>
}

impl Name {
    pub fn new(s: impl Into<String>) -> Name {
        Name {s: s.into(), sym: None}
    }

    pub fn sym_str(s: &str) -> Name {
        Name::new(s).with_new_sym()
    }

    pub fn with_new_sym(self) -> Name {
        let Name {s, ..} = self;
        let sym = Some(gensym());
        Name {s, sym}
    }

    pub fn get_str<'a>(&'a self) -> &'a String {
        &self.s
    }

    pub fn print_with_sym(&self) -> String {
        if let Some(sym) = self.sym {
            format!("{0}_{1}", self.s, sym)
        } else {
            self.s.clone()
        }
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Name {
        Name::new(s)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{0}", self.s)
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match (self.sym, other.sym) {
            (Some(l), Some(r)) => l.cmp(&r),
            (Some(_), None) => cmp::Ordering::Greater,
            (None, Some(_)) => cmp::Ordering::Less,
            (None, None) => self.s.cmp(&other.s),
        }
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        match (self.sym, other.sym) {
            (Some(l), Some(r)) => l.eq(&r),
            (Some(_), None) => false,
            (None, Some(_)) => false,
            (None, None) => self.s.eq(&other.s)
        }
    }
}

impl Eq for Name {}

impl hash::Hash for Name {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        match self.sym {
            Some(sym) => sym.hash(state),
            None => self.s.hash(state),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_names_compare_by_string() {
        assert_eq!(Name::new("ctr_0"), Name::from("ctr_0"));
        assert!(Name::new("a") < Name::new("b"));
    }

    #[test]
    fn fresh_names_are_distinct() {
        let x = Name::sym_str("tmp");
        let y = Name::sym_str("tmp");
        assert!(x != y);
        assert!(x != Name::new("tmp"));
        assert_eq!(x.get_str(), y.get_str());
    }
}
