use serde::Deserialize;
use serde::Serialize;

/// A single location in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
	/// 1-indexed line number.
	pub line: usize,
	/// 1-indexed column number, counted in characters.
	pub column: usize,
	/// Byte offset from the start of the source.
	pub offset: usize,
}

impl Default for Point {
	fn default() -> Self {
		Self {
			line: 1,
			column: 1,
			offset: 0,
		}
	}
}

impl Point {
	pub fn new(line: usize, column: usize, offset: usize) -> Self {
		Self {
			line,
			column,
			offset,
		}
	}

	/// Move the point past a single character.
	pub fn advance(&mut self, ch: char) {
		self.offset += ch.len_utf8();

		if ch == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
	}

	/// Move the point past every character in `text`.
	pub fn advance_str(&mut self, text: &str) {
		for ch in text.chars() {
			self.advance(ch);
		}
	}
}

/// The span covered by a token, from its first character to just after its
/// last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
	pub start: Point,
	pub end: Point,
}

impl Position {
	pub fn new(start: Point, end: Point) -> Self {
		Self { start, end }
	}

	/// A zero-width position at `point`.
	pub fn at(point: Point) -> Self {
		Self {
			start: point,
			end: point,
		}
	}

	pub fn len(&self) -> usize {
		self.end.offset.saturating_sub(self.start.offset)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
