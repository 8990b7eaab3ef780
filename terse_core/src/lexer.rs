use std::collections::VecDeque;

use logos::Logos;

use crate::Point;
use crate::Position;
use crate::TerseError;
use crate::TerseResult;
use crate::cursor::Cursor;
use crate::tokens::Marker;
use crate::tokens::Token;
use crate::tokens::TokenKind;

/// Columns a tab advances to when measuring indentation.
pub const TAB_WIDTH: usize = 4;

/// Delimiters for words separated only by whitespace.
pub(crate) const WHITESPACE: &[char] = &[' ', '\t'];

/// Raw marker table. Logos resolves the longest match, which gives `..`
/// priority over `.` and `%%` over `%`.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
enum RawMarker {
	#[token("..")]
	Continuation,
	#[token(".")]
	AnonymousDot,
	#[token("-")]
	AnonymousDash,
	#[token(":")]
	AttributeColon,
	#[token("=")]
	AttributeEquals,
	#[token("@")]
	AttributeAt,
	#[token("[")]
	ArrayOpen,
	#[token("/")]
	EndTag,
	#[token("%%")]
	Config,
	#[token("%")]
	Option,
}

impl From<RawMarker> for Marker {
	fn from(raw: RawMarker) -> Self {
		match raw {
			RawMarker::Continuation => Self::Continuation,
			RawMarker::AnonymousDot => Self::AnonymousDot,
			RawMarker::AnonymousDash => Self::AnonymousDash,
			RawMarker::AttributeColon => Self::AttributeColon,
			RawMarker::AttributeEquals => Self::AttributeEquals,
			RawMarker::AttributeAt => Self::AttributeAt,
			RawMarker::ArrayOpen => Self::ArrayOpen,
			RawMarker::EndTag => Self::EndTag,
			RawMarker::Config => Self::Config,
			RawMarker::Option => Self::Option,
		}
	}
}

/// A token recogniser. The parser passes an ordered slice of rules to
/// [`Lexer::scan`] and the first rule that matches wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rule {
	/// Line markers: `..`, `.`, `-`, `:`, `=`, `@`, `[`, `/`, `%%`, `%`.
	Marker,
	/// `[A-Za-z_][A-Za-z0-9_-]*`
	Identifier,
	/// Free text to the end of the line, minus a trailing comment.
	LineValue,
	/// `<<TAG` … `TAG>>` multi-line block.
	Fenced,
	/// `[` or `(` in value position.
	Bracket,
	/// A bare word ending at one of the delimiters, or a back-tick literal.
	Word(&'static [char]),
}

/// Line comment openers.
const LINE_COMMENTS: [&str; 2] = ["//", "#"];
/// Nestable block comment delimiters.
const BLOCK_COMMENTS: [(&str, &str); 2] = [("/*", "*/"), ("<#", "#>")];

/// Scans the DSL into classified tokens and synthesizes block structure from
/// indentation.
pub(crate) struct Lexer<'a> {
	cursor: Cursor<'a>,
	source_name: Option<&'a str>,
	/// Open indentation levels. The first entry is the document's base level.
	indents: Vec<usize>,
	/// Structural tokens produced ahead of time by a dedent.
	pending: VecDeque<Token>,
	pushback: Option<Token>,
	started: bool,
	finished: bool,
}

impl<'a> Lexer<'a> {
	pub fn new(source: &'a str, source_name: Option<&'a str>) -> Self {
		Self {
			cursor: Cursor::new(source),
			source_name,
			indents: vec![],
			pending: VecDeque::new(),
			pushback: None,
			started: false,
			finished: false,
		}
	}

	pub fn source_name(&self) -> Option<&'a str> {
		self.source_name
	}

	pub fn point(&self) -> Point {
		self.cursor.point()
	}

	/// A syntax error at the cursor.
	pub fn error(&self, message: impl Into<String>) -> TerseError {
		self.error_at(message, self.cursor.point())
	}

	pub fn error_at(&self, message: impl Into<String>, point: Point) -> TerseError {
		TerseError::syntax(message, self.source_name, self.cursor.source(), point)
	}

	/// Return a token so the next [`Lexer::next_line`] or [`Lexer::scan`]
	/// yields it again. Only one token can be pushed back at a time.
	pub fn push_back(&mut self, token: Token) {
		debug_assert!(self.pushback.is_none(), "only one token can be pushed back");
		self.pushback = Some(token);
	}

	/// Move to the next content line and report how its indentation relates
	/// to the open blocks: [`TokenKind::BlockStart`],
	/// [`TokenKind::LineEnd`], one or more [`TokenKind::BlockEnd`] followed
	/// by a [`TokenKind::LineEnd`], or [`TokenKind::Eof`].
	///
	/// Blank lines and comment-only lines are skipped.
	pub fn next_line(&mut self) -> TerseResult<Token> {
		if let Some(token) = self.pushback.take() {
			return Ok(token);
		}

		if let Some(token) = self.pending.pop_front() {
			return Ok(token);
		}

		if self.finished {
			return Ok(self.structural(TokenKind::Eof));
		}

		loop {
			let line_start = self.cursor.point();
			let indentation = self.cursor.skip_inline_whitespace();

			if self.cursor.is_eof() {
				break;
			}

			if self.cursor.at_line_end() {
				self.cursor.consume_newline();
				continue;
			}

			if self.skip_comment()? {
				self.cursor.skip_inline_whitespace();

				if self.cursor.at_line_end() {
					self.cursor.consume_newline();
					continue;
				}

				if self.cursor.point().line != line_start.line {
					return Err(self.error("content after a multi-line comment must start on a new line"));
				}
			}

			return self.indentation(indent_width(indentation));
		}

		self.finished = true;

		for _ in 1..self.indents.len() {
			let token = self.structural(TokenKind::BlockEnd);
			self.pending.push_back(token);
		}

		let eof = self.structural(TokenKind::Eof);
		self.pending.push_back(eof);

		Ok(self
			.pending
			.pop_front()
			.unwrap_or_else(|| self.structural(TokenKind::Eof)))
	}

	fn indentation(&mut self, width: usize) -> TerseResult<Token> {
		if !self.started {
			self.started = true;
			self.indents.push(width);
			return Ok(self.structural(TokenKind::LineEnd));
		}

		let top = self.indents.last().copied().unwrap_or_default();

		if width > top {
			self.indents.push(width);
			return Ok(self.structural(TokenKind::BlockStart));
		}

		if width == top {
			return Ok(self.structural(TokenKind::LineEnd));
		}

		while self.indents.len() > 1 && self.indents.last().is_some_and(|level| *level > width) {
			self.indents.pop();
			let token = self.structural(TokenKind::BlockEnd);
			self.pending.push_back(token);
		}

		if self.indents.last().copied() != Some(width) {
			return Err(self.error("inconsistent indentation"));
		}

		let line_end = self.structural(TokenKind::LineEnd);
		self.pending.push_back(line_end);

		Ok(self
			.pending
			.pop_front()
			.unwrap_or_else(|| self.structural(TokenKind::LineEnd)))
	}

	fn structural(&self, kind: TokenKind) -> Token {
		Token::new(kind, "", Position::at(self.cursor.point()))
	}

	/// Require that nothing but whitespace and comments remains on the
	/// current line, then move past the line terminator.
	pub fn finish_line(&mut self) -> TerseResult<()> {
		loop {
			self.cursor.skip_inline_whitespace();

			if self.cursor.at_line_end() {
				self.cursor.consume_newline();
				return Ok(());
			}

			if self.skip_comment()? {
				continue;
			}

			let unexpected = self.cursor.peek(0).unwrap_or_default();
			return Err(self.error(format!("unexpected `{unexpected}`")));
		}
	}

	/// True when the cursor sits on an end tag (`/name`) rather than a
	/// comment.
	pub fn at_end_tag(&self) -> bool {
		self.cursor.starts_with("/") && !self.comment_starts_here()
	}

	/// Skip inline whitespace and report whether the line has no more value
	/// content (only a comment or the terminator remains).
	pub fn at_value_end(&mut self) -> bool {
		self.cursor.skip_inline_whitespace();
		self.cursor.at_line_end() || self.comment_starts_here()
	}

	/// Consume `text` when it comes next on the line.
	pub fn eat(&mut self, text: &str) -> bool {
		self.cursor.skip_inline_whitespace();

		if self.cursor.starts_with(text) {
			self.cursor.advance_by(text.len());
			true
		} else {
			false
		}
	}

	pub fn peek_char(&mut self) -> Option<char> {
		self.cursor.skip_inline_whitespace();
		self.cursor.peek(0).filter(|ch| *ch != '\n')
	}

	/// Skip whitespace, line breaks and comments. Used inside brackets where
	/// line structure does not apply.
	pub fn skip_layout(&mut self) -> TerseResult<()> {
		loop {
			self.cursor.advance_while(char::is_whitespace);

			if !self.skip_comment()? {
				return Ok(());
			}
		}
	}

	/// Try each rule in order at the cursor and return the first token
	/// produced.
	pub fn scan(&mut self, rules: &[Rule]) -> TerseResult<Option<Token>> {
		if let Some(token) = self.pushback.take() {
			return Ok(Some(token));
		}

		self.cursor.skip_inline_whitespace();

		for rule in rules {
			let token = match rule {
				Rule::Marker => self.scan_marker(),
				Rule::Identifier => self.scan_identifier(),
				Rule::LineValue => self.scan_line_value(),
				Rule::Fenced => self.scan_fenced()?,
				Rule::Bracket => self.scan_bracket(),
				Rule::Word(delimiters) => self.scan_word(delimiters)?,
			};

			if token.is_some() {
				return Ok(token);
			}
		}

		Ok(None)
	}

	fn scan_marker(&mut self) -> Option<Token> {
		if self.comment_starts_here() {
			return None;
		}

		let line = self.cursor.line_rest();
		let mut lexer = RawMarker::lexer(line);
		let Some(Ok(raw)) = lexer.next() else {
			return None;
		};

		if lexer.span().start != 0 {
			return None;
		}

		let start = self.cursor.point();
		let text = self.cursor.advance_by(lexer.span().end);

		Some(Token::new(
			TokenKind::Marker(raw.into()),
			text,
			Position::new(start, self.cursor.point()),
		))
	}

	fn scan_identifier(&mut self) -> Option<Token> {
		let first = self.cursor.peek(0)?;

		if !(first.is_ascii_alphabetic() || first == '_') {
			return None;
		}

		let start = self.cursor.point();
		let text = self.cursor.advance_while(is_identifier_char);

		Some(Token::new(
			TokenKind::Identifier,
			text,
			Position::new(start, self.cursor.point()),
		))
	}

	fn scan_bracket(&mut self) -> Option<Token> {
		let ch = self.cursor.peek(0).filter(|ch| matches!(ch, '[' | '('))?;
		let start = self.cursor.point();
		self.cursor.advance();

		Some(Token::new(
			TokenKind::Bracket,
			ch.to_string(),
			Position::new(start, self.cursor.point()),
		))
	}

	fn scan_line_value(&mut self) -> Option<Token> {
		let start = self.cursor.point();

		// A leading back-tick takes the rest of the line literally.
		if self.cursor.peek(0) == Some('`') {
			self.cursor.advance();
			let text = self.cursor.skip_to_line_end();

			return Some(Token::new(
				TokenKind::Text,
				text,
				Position::new(start, self.cursor.point()),
			));
		}

		let line = self.cursor.line_rest();
		let end = find_comment(line, self.preceded_by_whitespace()).unwrap_or(line.len());
		let value = line[..end].trim_end();

		if value.is_empty() {
			return None;
		}

		let text = self.cursor.advance_by(value.len());

		Some(Token::new(
			TokenKind::Text,
			text,
			Position::new(start, self.cursor.point()),
		))
	}

	fn scan_fenced(&mut self) -> TerseResult<Option<Token>> {
		if !self.cursor.starts_with("<<") {
			return Ok(None);
		}

		let start = self.cursor.point();
		self.cursor.advance_by(2);
		let tag = self.cursor.advance_while(|ch| !ch.is_whitespace());

		self.cursor.skip_inline_whitespace();

		if !self.cursor.at_line_end()
			&& !LINE_COMMENTS.iter().any(|open| self.cursor.starts_with(open))
		{
			return Err(self.error("unexpected text after fenced block opening"));
		}

		self.cursor.skip_to_line_end();

		if !self.cursor.consume_newline() {
			return Err(self.error_at(format!("unterminated fenced block, expected `{tag}>>`"), start));
		}

		let closing = [format!("{tag}>>"), format!(">>{tag}")];
		let mut lines = vec![];

		loop {
			if self.cursor.is_eof() {
				return Err(self.error_at(format!("unterminated fenced block, expected `{tag}>>`"), start));
			}

			let line = self.cursor.line_rest();

			if closing.iter().any(|close| close == line.trim()) {
				self.cursor.advance_by(line.len());
				break;
			}

			lines.push(line);
			self.cursor.skip_to_line_end();
			self.cursor.consume_newline();
		}

		Ok(Some(Token::new(
			TokenKind::Fenced,
			dedent(&lines),
			Position::new(start, self.cursor.point()),
		)))
	}

	fn scan_word(&mut self, delimiters: &[char]) -> TerseResult<Option<Token>> {
		let start = self.cursor.point();

		if self.cursor.peek(0) == Some('`') {
			self.cursor.advance();
			let mut text = String::new();

			loop {
				match self.cursor.peek(0) {
					None | Some('\n') => {
						return Err(self.error_at("unterminated back-tick literal", start));
					}
					Some('`') => {
						self.cursor.advance();

						if self.cursor.peek(0) == Some('`') {
							self.cursor.advance();
							text.push('`');
						} else {
							break;
						}
					}
					Some(ch) => {
						self.cursor.advance();
						text.push(ch);
					}
				}
			}

			return Ok(Some(Token::new(
				TokenKind::Word,
				text,
				Position::new(start, self.cursor.point()),
			)));
		}

		if self.comment_starts_here() {
			return Ok(None);
		}

		let line = self.cursor.line_rest();
		let end = self
			.cursor
			.find_any(delimiters)
			.filter(|end| *end < line.len())
			.unwrap_or(line.len());
		let word = line[..end].trim_end();

		if word.is_empty() {
			return Ok(None);
		}

		let text = self.cursor.advance_by(word.len());

		Ok(Some(Token::new(
			TokenKind::Word,
			text,
			Position::new(start, self.cursor.point()),
		)))
	}

	/// Skip one comment at the cursor. Block comments nest and may span
	/// lines; line comments stop before the terminator.
	fn skip_comment(&mut self) -> TerseResult<bool> {
		if !self.comment_starts_here() {
			return Ok(false);
		}

		if LINE_COMMENTS.iter().any(|open| self.cursor.starts_with(open)) {
			self.cursor.skip_to_line_end();
			return Ok(true);
		}

		let Some((open, close)) = BLOCK_COMMENTS
			.iter()
			.find(|(open, _)| self.cursor.starts_with(open))
		else {
			return Ok(false);
		};

		let start = self.cursor.point();
		let mut depth = 0_usize;

		loop {
			if self.cursor.is_eof() {
				return Err(self.error_at(format!("unterminated comment, expected `{close}`"), start));
			}

			if self.cursor.starts_with(open) {
				depth += 1;
				self.cursor.advance_by(open.len());
			} else if self.cursor.starts_with(close) {
				depth -= 1;
				self.cursor.advance_by(close.len());

				if depth == 0 {
					return Ok(true);
				}
			} else {
				self.cursor.advance();
			}
		}
	}

	/// A comment opener at the cursor that is at the start of a line or
	/// preceded by whitespace.
	fn comment_starts_here(&self) -> bool {
		let rest = self.cursor.rest();
		let opens = LINE_COMMENTS.iter().any(|open| rest.starts_with(open))
			|| BLOCK_COMMENTS.iter().any(|(open, _)| rest.starts_with(open));

		opens && self.preceded_by_whitespace()
	}

	fn preceded_by_whitespace(&self) -> bool {
		self.cursor
			.slice(0, self.cursor.offset())
			.chars()
			.next_back()
			.is_none_or(char::is_whitespace)
	}
}

pub(crate) fn is_identifier_char(ch: char) -> bool {
	ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

/// The byte offset of the first comment in `line`. A comment must start the
/// line (when `at_boundary`) or follow whitespace.
fn find_comment(line: &str, at_boundary: bool) -> Option<usize> {
	let mut previous_is_space = at_boundary;

	for (index, ch) in line.char_indices() {
		if previous_is_space {
			let rest = &line[index..];
			let opens = LINE_COMMENTS.iter().any(|open| rest.starts_with(open))
				|| BLOCK_COMMENTS.iter().any(|(open, _)| rest.starts_with(open));

			if opens {
				return Some(index);
			}
		}

		previous_is_space = ch.is_whitespace();
	}

	None
}

/// The indentation width of `text`, expanding tabs to the next multiple of
/// [`TAB_WIDTH`].
pub fn indent_width(text: &str) -> usize {
	text.chars().fold(0, |width, ch| {
		if ch == '\t' {
			(width / TAB_WIDTH + 1) * TAB_WIDTH
		} else {
			width + 1
		}
	})
}

/// Remove up to `width` columns of leading whitespace from `line`.
fn strip_indent(line: &str, width: usize) -> &str {
	let mut column = 0;

	for (index, ch) in line.char_indices() {
		if column >= width || !(ch == ' ' || ch == '\t') {
			return &line[index..];
		}

		column = indent_width(&line[..index + 1]);
	}

	""
}

/// Join `lines` with `\n` after removing the indentation they all share.
/// Empty lines do not take part in measuring the shared indentation, lines of
/// only whitespace do.
pub fn dedent(lines: &[&str]) -> String {
	let shared = lines
		.iter()
		.filter(|line| !line.is_empty())
		.map(|line| indent_width(&line[..line.len() - line.trim_start().len()]))
		.min()
		.unwrap_or(0);

	lines
		.iter()
		.map(|line| strip_indent(line, shared))
		.collect::<Vec<_>>()
		.join("\n")
}
