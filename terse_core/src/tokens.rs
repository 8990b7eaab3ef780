use std::fmt::Display;

use crate::Position;

/// The punctuation markers recognised at the start of a line or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
	/// `..`
	Continuation,
	/// `.`
	AnonymousDot,
	/// `-`
	AnonymousDash,
	/// `:`
	AttributeColon,
	/// `=`
	AttributeEquals,
	/// `@`
	AttributeAt,
	/// `[`
	ArrayOpen,
	/// `/`
	EndTag,
	/// `%%`
	Config,
	/// `%`
	Option,
}

impl Marker {
	pub fn is_anonymous(self) -> bool {
		matches!(self, Self::AnonymousDot | Self::AnonymousDash)
	}

	pub fn is_attribute(self) -> bool {
		matches!(
			self,
			Self::AttributeColon | Self::AttributeEquals | Self::AttributeAt
		)
	}
}

impl Display for Marker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let text = match self {
			Self::Continuation => "..",
			Self::AnonymousDot => ".",
			Self::AnonymousDash => "-",
			Self::AttributeColon => ":",
			Self::AttributeEquals => "=",
			Self::AttributeAt => "@",
			Self::ArrayOpen => "[",
			Self::EndTag => "/",
			Self::Config => "%%",
			Self::Option => "%",
		};

		write!(f, "{text}")
	}
}

/// The classification of a scanned token. Markers carry their subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
	Marker(Marker),
	/// A node or attribute name.
	Identifier,
	/// Free text up to the end of the line.
	Text,
	/// The dedented content of a `<<` fenced block.
	Fenced,
	/// A bare or back-tick quoted word.
	Word,
	/// `[` or `(` opening an array or parameter list in value position.
	Bracket,
	/// The following line is indented deeper than the current block.
	BlockStart,
	/// An indented block was closed.
	BlockEnd,
	/// A new line at the current block level.
	LineEnd,
	Eof,
}

impl Display for TokenKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Marker(marker) => write!(f, "`{marker}`"),
			Self::Identifier => write!(f, "identifier"),
			Self::Text => write!(f, "text"),
			Self::Fenced => write!(f, "fenced block"),
			Self::Word => write!(f, "word"),
			Self::Bracket => write!(f, "bracket"),
			Self::BlockStart => write!(f, "indented block"),
			Self::BlockEnd => write!(f, "end of block"),
			Self::LineEnd => write!(f, "end of line"),
			Self::Eof => write!(f, "end of input"),
		}
	}
}

/// A classified token with its text and source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
	pub kind: TokenKind,
	pub text: String,
	pub position: Position,
}

impl Token {
	pub fn new(kind: TokenKind, text: impl Into<String>, position: Position) -> Self {
		Self {
			kind,
			text: text.into(),
			position,
		}
	}

	pub fn is(&self, kind: TokenKind) -> bool {
		self.kind == kind
	}

	pub fn marker(&self) -> Option<Marker> {
		match self.kind {
			TokenKind::Marker(marker) => Some(marker),
			_ => None,
		}
	}
}

impl Display for Token {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.kind {
			TokenKind::Marker(marker) => write!(f, "{marker}"),
			TokenKind::Identifier | TokenKind::Text | TokenKind::Word | TokenKind::Bracket => {
				write!(f, "{}", self.text)
			}
			TokenKind::Fenced => write!(f, "<<"),
			TokenKind::BlockStart
			| TokenKind::BlockEnd
			| TokenKind::LineEnd
			| TokenKind::Eof => write!(f, "{}", self.kind),
		}
	}
}
