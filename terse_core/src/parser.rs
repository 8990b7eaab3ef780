use derive_more::Deref;
use derive_more::DerefMut;

use crate::BoxError;
use crate::Comparer;
use crate::Element;
use crate::TerseError;
use crate::TerseResult;
use crate::draft::DraftChild;
use crate::draft::DraftNode;
use crate::draft::continue_text;
use crate::lexer::Lexer;
use crate::lexer::Rule;
use crate::lexer::WHITESPACE;
use crate::lexer::is_identifier_char;
use crate::rules::RuleSet;
use crate::tokens::Marker;
use crate::tokens::Token;
use crate::tokens::TokenKind;

const ARRAY_DELIMITERS: &[char] = &[',', ';', ']'];
const PARAMETER_DELIMITERS: &[char] = &[',', ')'];

/// Rules tried where a node or attribute value may start.
const VALUE: &[Rule] = &[Rule::Fenced, Rule::LineValue];

/// What an option handler can see about the document at the point where a
/// directive appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterState {
	pub source_name: Option<String>,
	/// The `/`-joined path of the node the directive belongs to. Empty at the
	/// document root.
	pub path: String,
	pub ignore_case: bool,
}

/// Receives `%%name params…` directives the parser does not handle itself.
///
/// Returned elements are spliced into the node that contains the directive,
/// or into the document root.
pub trait OptionHandler {
	fn handle(
		&mut self,
		state: &ConverterState,
		directive: &str,
		parameters: &[String],
	) -> Result<Option<Vec<Element>>, BoxError>;
}

impl<F> OptionHandler for F
where
	F: FnMut(&ConverterState, &str, &[String]) -> Result<Option<Vec<Element>>, BoxError>,
{
	fn handle(
		&mut self,
		state: &ConverterState,
		directive: &str,
		parameters: &[String],
	) -> Result<Option<Vec<Element>>, BoxError> {
		self(state, directive, parameters)
	}
}

/// Names of the open nodes from the root down.
#[derive(Debug, Default, Deref, DerefMut)]
struct PathStack(Vec<String>);

impl PathStack {
	/// `/a/b/c`, or an empty string at the root.
	fn joined(&self) -> String {
		self.iter().fold(String::new(), |mut path, segment| {
			path.push('/');
			path.push_str(segment);
			path
		})
	}
}

/// Parse `source` into draft roots.
pub(crate) fn parse(
	source: &str,
	source_name: Option<&str>,
	ignore_case: bool,
	handler: Option<&mut dyn OptionHandler>,
) -> TerseResult<Vec<DraftChild>> {
	tracing::debug!(source_name, ignore_case, "parsing document");

	let mut parser = Parser {
		lexer: Lexer::new(source, source_name),
		rules: RuleSet::default(),
		path: PathStack::default(),
		scopes: vec![ignore_case],
		handler,
	};

	parser.document()
}

struct Parser<'a, 'h> {
	lexer: Lexer<'a>,
	rules: RuleSet,
	path: PathStack,
	/// Ignore-case flag of each open block, innermost last.
	scopes: Vec<bool>,
	handler: Option<&'h mut dyn OptionHandler>,
}

impl Parser<'_, '_> {
	fn document(&mut self) -> TerseResult<Vec<DraftChild>> {
		let mut roots = vec![];

		loop {
			let token = self.lexer.next_line()?;

			match token.kind {
				TokenKind::Eof => break,
				TokenKind::LineEnd => self.root_line(&mut roots)?,
				TokenKind::BlockStart => {
					return Err(self.lexer.error_at("unexpected indentation", token.position.start));
				}
				_ => {
					return Err(self.lexer.error_at(format!("unexpected {}", token.kind), token.position.start));
				}
			}
		}

		Ok(roots)
	}

	fn ignore_case(&self) -> bool {
		self.scopes.last().copied().unwrap_or_default()
	}

	fn set_ignore_case(&mut self, ignore_case: bool) {
		if let Some(scope) = self.scopes.last_mut() {
			*scope = ignore_case;
		}
	}

	fn root_line(&mut self, roots: &mut Vec<DraftChild>) -> TerseResult<()> {
		if self.lexer.at_end_tag() {
			return Err(self.lexer.error("unexpected end tag"));
		}

		let Some(token) = self.lexer.scan(&[Rule::Marker, Rule::Identifier])? else {
			return Err(self.lexer.error("expected a node name"));
		};

		match token.marker() {
			None => roots.push(DraftChild::Node(self.node(&token)?)),
			Some(marker) if marker.is_anonymous() => roots.push(DraftChild::Node(self.node(&token)?)),
			Some(marker @ (Marker::Config | Marker::Option)) => self.option_line(marker, roots)?,
			Some(_) => {
				return Err(self.lexer.error_at(
					format!("unexpected `{token}` outside of a node"),
					token.position.start,
				));
			}
		}

		Ok(())
	}

	/// A node line, its optional block and its optional end tag. `first` is
	/// the identifier or anonymous marker that opened the line.
	fn node(&mut self, first: &Token) -> TerseResult<DraftNode> {
		let parent = self.path.joined();
		let (name, attributes) = if first.is(TokenKind::Identifier) {
			let attributes = self
				.rules
				.resolve_named(&parent, &first.text)
				.map(|rule| rule.attributes().to_vec())
				.unwrap_or_default();

			(first.text.clone(), attributes)
		} else {
			let Some(rule) = self.rules.resolve_anonymous(&parent) else {
				return Err(self.lexer.error_at("missing node name", first.position.start));
			};
			let name = rule.node_name().unwrap_or_default().to_string();

			tracing::trace!(rule = rule.path(), permanent = rule.is_permanent(), %name, "resolved anonymous node");
			(name, rule.attributes().to_vec())
		};

		let mut node = DraftNode::new(name, self.ignore_case(), first.position.start);

		if attributes.is_empty() {
			self.node_value(&mut node)?;
		} else {
			self.positional(&mut node, &attributes)?;
		}

		self.lexer.finish_line()?;

		let next = self.lexer.next_line()?;

		if next.is(TokenKind::BlockStart) {
			self.path.push(node.name.clone());
			let result = self.block(&mut node);
			self.path.pop();
			result?;
		} else {
			self.lexer.push_back(next);
		}

		self.end_tag(&mut node)?;

		Ok(node)
	}

	fn node_value(&mut self, node: &mut DraftNode) -> TerseResult<()> {
		let Some(token) = self
			.lexer
			.scan(&[Rule::Fenced, Rule::Bracket, Rule::LineValue])?
		else {
			return Ok(());
		};

		match token.kind {
			TokenKind::Bracket if token.text == "[" => self.array(node)?,
			TokenKind::Bracket => {
				self.parameters(node)?;

				if let Some(value) = self.lexer.scan(VALUE)? {
					node.append_value(&value.text);
				}
			}
			_ => node.append_value(&token.text),
		}

		Ok(())
	}

	/// Assign bare words to the rule's attribute names by position. A final
	/// `*`, or running out of names, turns the rest of the line into the
	/// value.
	fn positional(&mut self, node: &mut DraftNode, attributes: &[String]) -> TerseResult<()> {
		for attribute in attributes {
			if attribute == "*" {
				break;
			}

			if self.lexer.at_value_end() {
				return Ok(());
			}

			let Some(word) = self.lexer.scan(&[Rule::Word(WHITESPACE)])? else {
				return Ok(());
			};

			node.set_attribute(attribute, word.text);
		}

		if let Some(value) = self.lexer.scan(VALUE)? {
			node.append_value(&value.text);
		}

		Ok(())
	}

	/// Items of `[a, b; c]` after the opening bracket. Each item becomes an
	/// `item` child.
	fn array(&mut self, node: &mut DraftNode) -> TerseResult<()> {
		let start = self.lexer.point();

		loop {
			self.lexer.skip_layout()?;

			if self.lexer.eat("]") {
				return Ok(());
			}

			if self.lexer.eat(",") || self.lexer.eat(";") {
				continue;
			}

			let Some(item) = self.lexer.scan(&[Rule::Word(ARRAY_DELIMITERS)])? else {
				return Err(self.lexer.error_at("unterminated array, expected `]`", start));
			};

			node.add_item(item.text);
			self.lexer.skip_layout()?;

			if self.lexer.eat(",") || self.lexer.eat(";") {
				continue;
			}

			if self.lexer.eat("]") {
				return Ok(());
			}

			if self.lexer.peek_char().is_none() {
				return Err(self.lexer.error_at("unterminated array, expected `]`", start));
			}

			return Err(self.lexer.error("expected `,` or `]`"));
		}
	}

	/// `name=value` entries after the opening parenthesis, appended as
	/// attributes.
	fn parameters(&mut self, node: &mut DraftNode) -> TerseResult<()> {
		loop {
			if self.lexer.eat(")") {
				return Ok(());
			}

			if self.lexer.at_value_end() {
				return Err(self.lexer.error("unterminated parameter list, expected `)`"));
			}

			let Some(name) = self.lexer.scan(&[Rule::Identifier])? else {
				return Err(self.lexer.error("expected a parameter name"));
			};

			if !self.lexer.eat("=") {
				return Err(self.lexer.error(format!("missing assignment for parameter `{}`", name.text)));
			}

			let value = self
				.lexer
				.scan(&[Rule::Word(PARAMETER_DELIMITERS)])?
				.map(|token| token.text)
				.unwrap_or_default();

			node.add_attribute(name.text, value);

			if self.lexer.eat(",") {
				continue;
			}

			if self.lexer.eat(")") {
				return Ok(());
			}

			if self.lexer.at_value_end() {
				return Err(self.lexer.error("unterminated parameter list, expected `)`"));
			}

			return Err(self.lexer.error("expected `,` or `)`"));
		}
	}

	/// Lines of an indented block up to and including its `BlockEnd`.
	fn block(&mut self, node: &mut DraftNode) -> TerseResult<()> {
		self.scopes.push(self.ignore_case());
		let result = self.block_lines(node);
		self.scopes.pop();
		result
	}

	fn block_lines(&mut self, node: &mut DraftNode) -> TerseResult<()> {
		self.block_line(node)?;

		loop {
			let token = self.lexer.next_line()?;

			match token.kind {
				TokenKind::LineEnd => self.block_line(node)?,
				TokenKind::BlockEnd => return Ok(()),
				TokenKind::BlockStart => {
					return Err(self.lexer.error_at("unexpected indentation", token.position.start));
				}
				_ => {
					self.lexer.push_back(token);
					return Ok(());
				}
			}
		}
	}

	fn block_line(&mut self, node: &mut DraftNode) -> TerseResult<()> {
		if self.lexer.at_end_tag() {
			return Err(self.lexer.error("unexpected end tag inside a block"));
		}

		let Some(token) = self.lexer.scan(&[
			Rule::Marker,
			Rule::Identifier,
			Rule::Fenced,
			Rule::LineValue,
		])?
		else {
			return Err(self.lexer.error("expected a block line"));
		};

		match token.kind {
			TokenKind::Identifier => {
				let child = self.node(&token)?;
				node.add_child(child);
				return Ok(());
			}
			TokenKind::Marker(marker) if marker.is_anonymous() => {
				let child = self.node(&token)?;
				node.add_child(child);
				return Ok(());
			}
			TokenKind::Marker(marker) if marker.is_attribute() => {
				return self.attribute_pair(node);
			}
			TokenKind::Marker(marker @ (Marker::Config | Marker::Option)) => {
				return self.option_line(marker, &mut node.children);
			}
			TokenKind::Marker(Marker::Continuation) => {
				let text = self.lexer.scan(VALUE)?.map(|value| value.text).unwrap_or_default();
				node.continue_value(&text);
			}
			TokenKind::Marker(Marker::ArrayOpen) => self.array(node)?,
			TokenKind::Text | TokenKind::Fenced => node.continue_value(&token.text),
			_ => {
				return Err(self.lexer.error_at(format!("unexpected `{token}` inside a block"), token.position.start));
			}
		}

		self.lexer.finish_line()?;
		self.expect_no_block()
	}

	/// Raw lines cannot open a block of their own.
	fn expect_no_block(&mut self) -> TerseResult<()> {
		let next = self.lexer.next_line()?;

		if next.is(TokenKind::BlockStart) {
			return Err(self.lexer.error_at("unexpected indentation", next.position.start));
		}

		self.lexer.push_back(next);
		Ok(())
	}

	/// `:name value`, `=name value` or `@name value`, optionally continued by
	/// an indented block of raw text and `..` lines.
	fn attribute_pair(&mut self, node: &mut DraftNode) -> TerseResult<()> {
		let Some(name) = self.lexer.scan(&[Rule::Word(WHITESPACE)])? else {
			return Err(self.lexer.error("missing attribute name"));
		};
		let mut value = self.lexer.scan(VALUE)?.map(|token| token.text).unwrap_or_default();

		self.lexer.finish_line()?;

		let next = self.lexer.next_line()?;

		if next.is(TokenKind::BlockStart) {
			self.attribute_continuation(&mut value)?;
		} else {
			self.lexer.push_back(next);
		}

		node.add_attribute(name.text, value);
		Ok(())
	}

	fn attribute_continuation(&mut self, value: &mut String) -> TerseResult<()> {
		loop {
			let start = self.lexer.point();
			let text = match self.lexer.scan(&[Rule::Marker, Rule::Fenced, Rule::LineValue])? {
				Some(token) if token.marker() == Some(Marker::Continuation) => {
					self.lexer.scan(VALUE)?.map(|value| value.text).unwrap_or_default()
				}
				Some(token) if matches!(token.kind, TokenKind::Text | TokenKind::Fenced) => token.text,
				_ => return Err(self.lexer.error_at("malformed attribute continuation", start)),
			};

			continue_text(value, &text);
			self.lexer.finish_line()?;

			let next = self.lexer.next_line()?;

			match next.kind {
				TokenKind::LineEnd => {}
				TokenKind::BlockEnd => return Ok(()),
				TokenKind::BlockStart => {
					return Err(self
						.lexer
						.error_at("malformed attribute continuation", next.position.start));
				}
				_ => {
					self.lexer.push_back(next);
					return Ok(());
				}
			}
		}
	}

	/// An optional `/name value` line closing `node` at its own level.
	fn end_tag(&mut self, node: &mut DraftNode) -> TerseResult<()> {
		let next = self.lexer.next_line()?;

		if !(next.is(TokenKind::LineEnd) && self.lexer.at_end_tag()) {
			self.lexer.push_back(next);
			return Ok(());
		}

		self.lexer.scan(&[Rule::Marker])?;

		let Some(name) = self.lexer.scan(&[Rule::Identifier])? else {
			return Err(self.lexer.error("missing end tag name"));
		};

		if !Comparer::from_ignore_case(node.ignore_case).same(&node.name, &name.text) {
			return Err(self.lexer.error_at(
				format!(
					"end tag `/{}` does not match `{}` opened on line {}",
					name.text, node.name, node.point.line
				),
				name.position.start,
			));
		}

		if let Some(value) = self.lexer.scan(VALUE)? {
			node.continue_value(&value.text);
		}

		self.lexer.finish_line()?;
		self.expect_no_block()
	}

	/// `%%directive params…` or `%pattern attributes…`. Elements returned by
	/// the option handler are appended to `children`.
	fn option_line(&mut self, marker: Marker, children: &mut Vec<DraftChild>) -> TerseResult<()> {
		if marker == Marker::Config {
			self.directive(children)?;
		} else {
			self.syntax_rule()?;
		}

		self.lexer.finish_line()?;
		self.expect_no_block()
	}

	fn words(&mut self) -> TerseResult<Vec<String>> {
		let mut words = vec![];

		while !self.lexer.at_value_end() {
			let Some(word) = self.lexer.scan(&[Rule::Word(WHITESPACE)])? else {
				break;
			};

			words.push(word.text);
		}

		Ok(words)
	}

	fn directive(&mut self, children: &mut Vec<DraftChild>) -> TerseResult<()> {
		let start = self.lexer.point();
		let Some(name) = self.lexer.scan(&[Rule::Word(WHITESPACE)])? else {
			return Err(self.lexer.error("missing directive name"));
		};
		let parameters = self.words()?;

		match name.text.as_str() {
			"ignore-case" => self.set_ignore_case(true),
			"case-sensitive" => self.set_ignore_case(false),
			directive => {
				let Some(handler) = self.handler.as_mut() else {
					tracing::warn!(directive, ?parameters, "ignoring unknown directive");
					return Ok(());
				};

				let state = ConverterState {
					source_name: self.lexer.source_name().map(ToString::to_string),
					path: self.path.joined(),
					ignore_case: self.scopes.last().copied().unwrap_or_default(),
				};

				let elements = handler
					.handle(&state, directive, &parameters)
					.map_err(|source| {
						TerseError::OptionHandler {
							directive: directive.to_string(),
							source,
						}
					})?;

				if let Some(elements) = elements {
					tracing::debug!(directive, count = elements.len(), line = start.line, "spliced directive output");
					children.extend(elements.into_iter().map(DraftChild::Spliced));
				}
			}
		}

		Ok(())
	}

	/// `%[name:]pattern attributes…`, `%..name [attributes…]` or `%name`.
	fn syntax_rule(&mut self) -> TerseResult<()> {
		let start = self.lexer.point();
		let scope = self.path.joined();
		let ignore_case = self.ignore_case();

		let result = if self.lexer.eat("..") {
			let Some(name) = self.lexer.scan(&[Rule::Identifier])? else {
				return Err(self.lexer.error("missing syntax rule name"));
			};
			let extra = self.words()?;

			self.rules.instantiate(&scope, &name.text, extra, ignore_case)
		} else {
			let Some(first) = self.lexer.scan(&[Rule::Word(WHITESPACE)])? else {
				return Err(self.lexer.error("missing rule pattern"));
			};
			let attributes = self.words()?;

			match split_rule_name(&first.text) {
				Some((name, pattern)) => {
					self.rules
						.declare(&scope, Some(name), pattern, attributes, ignore_case)
				}
				None if attributes.is_empty() && self.rules.has_template(&first.text) => {
					self.rules
						.instantiate(&scope, &first.text, vec![], ignore_case)
				}
				None => {
					self.rules
						.declare(&scope, None, &first.text, attributes, ignore_case)
				}
			}
		};

		result.map_err(|message| self.lexer.error_at(message, start))
	}
}

/// Split `name:pattern` when the prefix is an identifier.
fn split_rule_name(text: &str) -> Option<(&str, &str)> {
	let (name, pattern) = text.split_once(':')?;
	let valid = name
		.chars()
		.next()
		.is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_')
		&& name.chars().all(is_identifier_char);

	valid.then_some((name, pattern))
}
