use std::fmt;
use std::sync::Arc;

use crate::receiver::Receiver;
use crate::token::{Token, TokenType};

/// Direction of a port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// The port receives tokens.
    Input,
    /// The port sends tokens.
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// Declaration of a port.
///
/// Ports are declared by [`Actor::ports()`](crate::actor::Actor::ports) and
/// by [`CompositeActor::add_port()`](crate::composite::CompositeActor::add_port)
/// for the boundary ports of a composite.
///
/// # Examples
///
/// ```
/// use moccasin::actor::PortSpec;
/// use moccasin::token::{Token, TokenType};
///
/// // An input consuming 3 integers per firing.
/// let input = PortSpec::input("in", TokenType::Int).with_rate(3);
///
/// // An output that starts with one token in flight, which breaks feedback
/// // loops.
/// let output = PortSpec::output("out", TokenType::Int)
///     .with_initial_tokens([Token::Int(0)])
///     .delayed();
///
/// assert_eq!(input.rate(), 3);
/// assert_eq!(output.initial_tokens().len(), 1);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct PortSpec {
    name: String,
    direction: PortDirection,
    ty: TokenType,
    multiport: bool,
    rate: usize,
    initial_tokens: Vec<Token>,
    delayed: bool,
}

impl PortSpec {
    /// Declares an input port with a rate of 1.
    pub fn input(name: impl Into<String>, ty: TokenType) -> Self {
        Self::new(name.into(), PortDirection::Input, ty)
    }

    /// Declares an output port with a rate of 1.
    pub fn output(name: impl Into<String>, ty: TokenType) -> Self {
        Self::new(name.into(), PortDirection::Output, ty)
    }

    fn new(name: String, direction: PortDirection, ty: TokenType) -> Self {
        Self {
            name,
            direction,
            ty,
            multiport: false,
            rate: 1,
            initial_tokens: Vec::new(),
            delayed: false,
        }
    }

    /// Makes the port a multiport, with one channel per connection.
    pub fn multiport(mut self) -> Self {
        self.multiport = true;

        self
    }

    /// Sets the number of tokens consumed or produced on each channel per
    /// firing.
    pub fn with_rate(mut self, rate: usize) -> Self {
        self.rate = rate;

        self
    }

    /// Sets the tokens sent by an output port when the model is initialized.
    pub fn with_initial_tokens(mut self, tokens: impl IntoIterator<Item = Token>) -> Self {
        self.initial_tokens = tokens.into_iter().collect();

        self
    }

    /// Declares that tokens sent on this output never depend on the inputs
    /// received at the same tag.
    ///
    /// Delayed outputs break zero-delay loops in timed and continuous
    /// composites.
    pub fn delayed(mut self) -> Self {
        self.delayed = true;

        self
    }

    /// Returns the port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the port direction.
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Returns the declared token type.
    pub fn ty(&self) -> TokenType {
        self.ty
    }

    /// Checks whether this is a multiport.
    pub fn is_multiport(&self) -> bool {
        self.multiport
    }

    /// Returns the per-firing rate.
    pub fn rate(&self) -> usize {
        self.rate
    }

    /// Returns the initial tokens.
    pub fn initial_tokens(&self) -> &[Token] {
        &self.initial_tokens
    }

    /// Checks whether the port is delayed.
    pub fn is_delayed(&self) -> bool {
        self.delayed
    }

    pub(crate) fn set_rate(&mut self, rate: usize) {
        self.rate = rate;
    }
}

/// Runtime state of an input port: one receiver per channel.
#[derive(Debug)]
pub(crate) struct InputPort {
    pub(crate) spec: PortSpec,
    pub(crate) channels: Vec<Arc<dyn Receiver>>,
}

impl InputPort {
    pub(crate) fn new(spec: PortSpec) -> Self {
        Self {
            spec,
            channels: Vec::new(),
        }
    }
}

/// Runtime state of an output port: the receivers each channel fans out to.
#[derive(Debug)]
pub(crate) struct OutputPort {
    pub(crate) spec: PortSpec,
    pub(crate) channels: Vec<Vec<Arc<dyn Receiver>>>,
}

impl OutputPort {
    pub(crate) fn new(spec: PortSpec) -> Self {
        Self {
            spec,
            channels: Vec::new(),
        }
    }
}
