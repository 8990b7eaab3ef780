use crate::Point;

/// A character cursor over the source text with bounded lookahead.
///
/// The cursor only moves forward. Every movement keeps the [`Point`] in sync
/// so tokens and errors can report their line and column.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
	source: &'a str,
	point: Point,
}

impl<'a> Cursor<'a> {
	pub fn new(source: &'a str) -> Self {
		Self {
			source,
			point: Point::default(),
		}
	}

	pub fn source(&self) -> &'a str {
		self.source
	}

	pub fn point(&self) -> Point {
		self.point
	}

	pub fn offset(&self) -> usize {
		self.point.offset
	}

	/// The unread remainder of the source.
	pub fn rest(&self) -> &'a str {
		&self.source[self.point.offset..]
	}

	pub fn is_eof(&self) -> bool {
		self.point.offset >= self.source.len()
	}

	/// The `n`th character ahead of the cursor (`0` is the current one).
	pub fn peek(&self, n: usize) -> Option<char> {
		self.rest().chars().nth(n)
	}

	pub fn starts_with(&self, prefix: &str) -> bool {
		self.rest().starts_with(prefix)
	}

	/// Source text between two byte offsets.
	pub fn slice(&self, from: usize, to: usize) -> &'a str {
		&self.source[from..to]
	}

	/// The byte distance to the next occurrence of any character in `set`,
	/// relative to the cursor.
	pub fn find_any(&self, set: &[char]) -> Option<usize> {
		self.rest().find(|ch: char| set.contains(&ch))
	}

	/// The remainder of the current line, without the line terminator.
	pub fn line_rest(&self) -> &'a str {
		let rest = self.rest();
		let end = rest.find('\n').unwrap_or(rest.len());
		rest[..end].strip_suffix('\r').unwrap_or(&rest[..end])
	}

	/// True when only a line terminator (or nothing) remains on this line.
	pub fn at_line_end(&self) -> bool {
		matches!(self.peek(0), None | Some('\n'))
			|| (self.peek(0) == Some('\r') && matches!(self.peek(1), None | Some('\n')))
	}

	pub fn advance(&mut self) -> Option<char> {
		let ch = self.peek(0)?;
		self.point.advance(ch);
		Some(ch)
	}

	/// Advance past `bytes` bytes of the remainder. The count must land on a
	/// character boundary.
	pub fn advance_by(&mut self, bytes: usize) -> &'a str {
		let start = self.point.offset;
		let end = (start + bytes).min(self.source.len());
		let text = &self.source[start..end];
		self.point.advance_str(text);
		text
	}

	/// Advance while `predicate` holds and return the consumed text.
	pub fn advance_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
		let rest = self.rest();
		let length = rest
			.char_indices()
			.find(|(_, ch)| !predicate(*ch))
			.map_or(rest.len(), |(index, _)| index);
		self.advance_by(length)
	}

	/// Skip spaces and tabs on the current line.
	pub fn skip_inline_whitespace(&mut self) -> &'a str {
		self.advance_while(|ch| ch == ' ' || ch == '\t')
	}

	/// Consume a single line terminator (`\n` or `\r\n`) when present.
	pub fn consume_newline(&mut self) -> bool {
		if self.starts_with("\r\n") {
			self.advance_by(2);
			true
		} else if self.starts_with("\n") {
			self.advance_by(1);
			true
		} else {
			false
		}
	}

	/// Advance to the end of the current line, leaving the terminator.
	pub fn skip_to_line_end(&mut self) -> &'a str {
		let text = self.line_rest();
		self.advance_by(text.len())
	}
}
