//! Immutable data values exchanged between actors.
//!
//! A [`Token`] is the unit of communication: actors never share state, they
//! only send tokens through their output ports to the receivers of the input
//! ports they are connected to. Tokens are cheap to clone since aggregate
//! payloads are reference-counted, which makes broadcasting to several
//! receivers inexpensive.
//!
//! Every port declares a [`TokenType`]. Connections are only accepted when
//! the type of the source port can be assigned to the type of the sink port,
//! see [`TokenType::is_assignable_to()`].

use std::fmt;
use std::sync::Arc;

/// An immutable value passed between actors.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// A token without payload, typically used to signal an event.
    Unit,
    /// A boolean value.
    Boolean(bool),
    /// A signed integer.
    Int(i64),
    /// A double-precision floating point value.
    Double(f64),
    /// A string.
    String(Arc<str>),
    /// An array of tokens.
    Array(Arc<[Token]>),
}

impl Token {
    /// Returns the type of this token.
    pub fn ty(&self) -> TokenType {
        match self {
            Self::Unit => TokenType::Unit,
            Self::Boolean(_) => TokenType::Boolean,
            Self::Int(_) => TokenType::Int,
            Self::Double(_) => TokenType::Double,
            Self::String(_) => TokenType::String,
            Self::Array(_) => TokenType::Array,
        }
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the payload as a double, widening integers.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the array payload, if any.
    pub fn as_array(&self) -> Option<&[Token]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "()"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Array(a) => {
                write!(f, "{{")?;
                for (i, t) in a.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<()> for Token {
    fn from(_: ()) -> Self {
        Self::Unit
    }
}

impl From<bool> for Token {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Token {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Token {
    fn from(i: i32) -> Self {
        Self::Int(i.into())
    }
}

impl From<f64> for Token {
    fn from(d: f64) -> Self {
        Self::Double(d)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<Vec<Token>> for Token {
    fn from(v: Vec<Token>) -> Self {
        Self::Array(v.into())
    }
}

/// The declared type of a port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenType {
    /// Payload-less tokens.
    Unit,
    /// Booleans.
    Boolean,
    /// Signed integers.
    Int,
    /// Doubles.
    Double,
    /// Strings.
    String,
    /// Arrays of tokens of any type.
    Array,
    /// Any token.
    General,
}

impl TokenType {
    /// Checks whether values of this type can flow into a port of type `sink`.
    ///
    /// A type is assignable to itself and to [`TokenType::General`]; integers
    /// are in addition assignable to doubles.
    pub fn is_assignable_to(self, sink: TokenType) -> bool {
        self == sink || sink == Self::General || (self == Self::Int && sink == Self::Double)
    }

    /// Checks whether a token is an instance of this type.
    pub fn admits(self, token: &Token) -> bool {
        token.ty().is_assignable_to(self)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unit => "unit",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Double => "double",
            Self::String => "string",
            Self::Array => "array",
            Self::General => "general",
        };

        f.write_str(name)
    }
}
