// Core types used across all OSC components
/// One typed OSC argument.
///
/// The tag returned by [`OscArg::tag`] is the console-facing type tag, which
/// differs from the wire tag for booleans: both `T` and `F` on the wire map to
/// the single `B` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    String(String),
    Int(i32),
    Float(f32),
    Bool(bool),
    Null,
    Blob(Vec<u8>),
    /// A value whose tag the codec can frame but does not interpret.
    Unknown { tag: char, data: Vec<u8> },
}

impl OscArg {
    pub fn tag(&self) -> char {
        match self {
            OscArg::String(_) => 's',
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::Bool(_) => 'B',
            OscArg::Null => 'N',
            OscArg::Blob(_) => 'b',
            OscArg::Unknown { tag, .. } => *tag,
        }
    }

    pub(crate) fn wire_tag(&self) -> char {
        match self {
            OscArg::Bool(true) => 'T',
            OscArg::Bool(false) => 'F',
            other => other.tag(),
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OscArg::Float(v) => Some(*v),
            OscArg::Int(v) => Some(*v as f32),
            _ => None,
        }
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<bool> for OscArg {
    fn from(v: bool) -> Self {
        OscArg::Bool(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::String(v.to_string())
    }
}

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("packet truncated at offset {0}")]
    Truncated(usize),

    #[error("packet length {0} is not a multiple of 4")]
    Misaligned(usize),

    #[error("string is not NUL-terminated")]
    Unterminated,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("missing type tag string")]
    MissingTypeTags,

    #[error("unsupported type tag '{0}'")]
    UnsupportedTag(char),

    #[error("not an OSC packet")]
    NotOsc,
}
