use strum_macros::EnumIter;
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum ElemSize {
    Bool, I8, I16, I32, I64, U8, U16, U32, U64, F32, #[default] F64
}

impl ElemSize {
    pub fn is_boolean(&self) -> bool {
        matches!(self, ElemSize::Bool)
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(self, ElemSize::I8 | ElemSize::I16 | ElemSize::I32 | ElemSize::I64)
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(self, ElemSize::U8 | ElemSize::U16 | ElemSize::U32 | ElemSize::U64)
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, ElemSize::F32 | ElemSize::F64)
    }

    pub fn size_in_bytes(&self) -> i64 {
        match self {
            ElemSize::Bool | ElemSize::I8 | ElemSize::U8 => 1,
            ElemSize::I16 | ElemSize::U16 => 2,
            ElemSize::I32 | ElemSize::U32 | ElemSize::F32 => 4,
            ElemSize::I64 | ElemSize::U64 | ElemSize::F64 => 8,
        }
    }

    // Rank used when collating the types of operands: floating-point types dominate integers,
    // wider types dominate narrower ones and booleans are the weakest.
    fn collation_rank(&self) -> (u8, i64) {
        let class = if self.is_floating_point() {
            3
        } else if self.is_signed_integer() {
            2
        } else if self.is_unsigned_integer() {
            1
        } else {
            0
        };
        (class, self.size_in_bytes())
    }

    pub fn collate(l: ElemSize, r: ElemSize) -> ElemSize {
        if l.collation_rank() >= r.collation_rank() { l } else { r }
    }

    pub fn c_name(&self) -> &'static str {
        match self {
            ElemSize::Bool => "bool",
            ElemSize::I8 => "int8_t",
            ElemSize::I16 => "int16_t",
            ElemSize::I32 => "int32_t",
            ElemSize::I64 => "int64_t",
            ElemSize::U8 => "uint8_t",
            ElemSize::U16 => "uint16_t",
            ElemSize::U32 => "uint32_t",
            ElemSize::U64 => "uint64_t",
            ElemSize::F32 => "float",
            ElemSize::F64 => "double",
        }
    }
}

impl fmt::Display for ElemSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ElemSize::Bool => write!(f, "bool"),
            ElemSize::I8 => write!(f, "int8"),
            ElemSize::I16 => write!(f, "int16"),
            ElemSize::I32 => write!(f, "int32"),
            ElemSize::I64 => write!(f, "int64"),
            ElemSize::U8 => write!(f, "uint8"),
            ElemSize::U16 => write!(f, "uint16"),
            ElemSize::U32 => write!(f, "uint32"),
            ElemSize::U64 => write!(f, "uint64"),
            ElemSize::F32 => write!(f, "float32"),
            ElemSize::F64 => write!(f, "float64"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum UnOp {
    #[default] Neg, Not, BitNeg
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum BinOp {
    #[default] Add, Sub, Mul, Div, Rem, Pow, And, Or,
    BitAnd, BitOr, BitXor, BitShl, BitShr,
    Eq, Neq, Leq, Geq, Lt, Gt,
}

impl BinOp {
    fn prec_idx(&self) -> usize {
        match self {
            BinOp::Or => 2,
            BinOp::And => 3,
            BinOp::BitOr => 4,
            BinOp::BitXor => 5,
            BinOp::BitAnd => 6,
            BinOp::Eq | BinOp::Neq => 7,
            BinOp::Leq | BinOp::Geq | BinOp::Lt | BinOp::Gt => 8,
            BinOp::BitShl | BinOp::BitShr => 10,
            BinOp::Add | BinOp::Sub => 11,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 12,
            BinOp::Pow => 20
        }
    }

    pub fn precedence(l: &BinOp, r: &BinOp) -> Ordering {
        l.prec_idx().cmp(&r.prec_idx())
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Neq | BinOp::Leq | BinOp::Geq | BinOp::Lt | BinOp::Gt)
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(self, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::BitShl | BinOp::BitShr)
    }

    // Operators whose result is not of the collated operand type.
    pub fn produces_boolean(&self) -> bool {
        self.is_comparison() || self.is_boolean()
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Pow => "**",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitShl => "<<",
            BinOp::BitShr => ">>",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Leq => "<=",
            BinOp::Geq => ">=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn collation_prefers_floats_and_width() {
        assert_eq!(ElemSize::collate(ElemSize::F32, ElemSize::F64), ElemSize::F64);
        assert_eq!(ElemSize::collate(ElemSize::I64, ElemSize::F32), ElemSize::F32);
        assert_eq!(ElemSize::collate(ElemSize::Bool, ElemSize::I32), ElemSize::I32);
        assert_eq!(ElemSize::collate(ElemSize::U64, ElemSize::I8), ElemSize::I8);
    }

    #[test]
    fn every_size_has_a_c_name() {
        for sz in ElemSize::iter() {
            assert!(!sz.c_name().is_empty());
            assert!(sz.size_in_bytes() > 0);
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(BinOp::precedence(&BinOp::Mul, &BinOp::Add), Ordering::Greater);
        assert_eq!(BinOp::precedence(&BinOp::Lt, &BinOp::Eq), Ordering::Greater);
    }
}
