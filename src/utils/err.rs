use std::error;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ErrorKind {
    Compile,
    Name,
    Type,
    Vectorize,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::Compile => write!(f, "Stencil compilation error"),
            ErrorKind::Name => write!(f, "Stencil name error"),
            ErrorKind::Type => write!(f, "Stencil type error"),
            ErrorKind::Vectorize => write!(f, "Stencil vectorization error"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompileError {
    msg: String,
    kind: ErrorKind
}

impl CompileError {
    pub fn compile_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Compile}
    }

    pub fn name_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Name}
    }

    pub fn type_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Type}
    }

    pub fn vectorize_err(msg: String) -> Self {
        CompileError {msg, kind: ErrorKind::Vectorize}
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message<'a>(&'a self) -> &'a str {
        &self.msg
    }
}

impl error::Error for CompileError {}
impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{0}: {1}", self.kind, &self.msg)
    }
}

pub type CompileResult<T> = Result<T, CompileError>;

#[macro_export]
macro_rules! stencil_compile_error {
    ($($t:tt)*) => {{
        Err($crate::utils::err::CompileError::compile_err(format!($($t)*)))
    }}
}

#[macro_export]
macro_rules! stencil_name_error {
    ($($t:tt)*) => {{
        Err($crate::utils::err::CompileError::name_err(format!($($t)*)))
    }}
}

#[macro_export]
macro_rules! stencil_type_error {
    ($($t:tt)*) => {{
        Err($crate::utils::err::CompileError::type_err(format!($($t)*)))
    }}
}

#[macro_export]
macro_rules! stencil_vectorize_error {
    ($($t:tt)*) => {{
        Err($crate::utils::err::CompileError::vectorize_err(format!($($t)*)))
    }}
}
