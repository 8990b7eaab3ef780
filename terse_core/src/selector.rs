use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::vec;

use logos::Logos;

use crate::Element;
use crate::TerseError;
use crate::TerseResult;

#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum SelectorToken {
	#[token(".")]
	Dot,
	#[token("**")]
	DoubleStar,
	#[token("*")]
	Star,
	#[token(":")]
	Colon,
	#[token("@")]
	At,
	#[token("[")]
	Open,
	#[token("]")]
	Close,
	#[token("=")]
	#[token("==")]
	Equals,
	#[token("!=")]
	NotEquals,
	#[regex(r"[^.*:@\[\]=!`\s]+")]
	Name,
	/// A back-tick followed by the character it protects.
	#[regex(r"`.")]
	Escaped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StepKind {
	Name(String),
	/// `*`
	Any,
	/// `**`
	Descendants,
	/// `:name` or `@name`
	Attribute(String),
	Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reference {
	Name(String),
	Attribute(String),
	Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Test {
	Exists,
	Equals(String),
	NotEquals(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Condition {
	path: Vec<Reference>,
	test: Test,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
	kind: StepKind,
	condition: Option<Condition>,
}

impl Step {
	fn navigates(&self) -> bool {
		self.kind != StepKind::Empty
	}
}

struct SelectorParser<'s> {
	selector: &'s str,
	lexer: logos::Lexer<'s, SelectorToken>,
}

impl<'s> SelectorParser<'s> {
	fn new(selector: &'s str) -> Self {
		Self {
			selector,
			lexer: SelectorToken::lexer(selector),
		}
	}

	fn error(&self, reason: impl Into<String>) -> TerseError {
		TerseError::invalid_selector(self.selector, reason)
	}

	fn peek(&self) -> Option<(Result<SelectorToken, ()>, usize)> {
		let mut lexer = self.lexer.clone();
		lexer.next().map(|token| (token, lexer.span().start))
	}

	fn peek_token(&self) -> Option<SelectorToken> {
		self.peek().and_then(|(token, _)| token.ok())
	}

	fn unexpected(&mut self) -> TerseError {
		match self.lexer.next() {
			Some(_) => self.error(format!("unexpected `{}`", self.lexer.slice())),
			None => self.error("unexpected end of selector"),
		}
	}

	fn parse(mut self) -> TerseResult<Vec<Step>> {
		if self.selector.trim().is_empty() {
			return Err(self.error("empty selector"));
		}

		let mut steps = vec![self.step()?];

		loop {
			match self.peek_token() {
				Some(SelectorToken::Dot) => {
					self.lexer.next();
					steps.push(self.step()?);
				}
				None if self.peek().is_none() => break,
				_ => return Err(self.unexpected()),
			}
		}

		if steps
			.iter()
			.all(|step| !step.navigates() && step.condition.is_none())
		{
			return Err(self.error("selector has no steps"));
		}

		Ok(steps)
	}

	fn step(&mut self) -> TerseResult<Step> {
		let kind = match self.peek_token() {
			Some(SelectorToken::Star) => {
				self.lexer.next();
				StepKind::Any
			}
			Some(SelectorToken::DoubleStar) => {
				self.lexer.next();
				StepKind::Descendants
			}
			Some(SelectorToken::Colon | SelectorToken::At) => {
				self.lexer.next();
				let name = self.name().ok_or_else(|| self.error("missing attribute name"))?;
				StepKind::Attribute(name)
			}
			Some(SelectorToken::Name | SelectorToken::Escaped) => {
				let name = self.name().unwrap_or_default();
				StepKind::Name(name)
			}
			_ => StepKind::Empty,
		};

		let condition = if self.peek_token() == Some(SelectorToken::Open) {
			self.lexer.next();
			let condition = self.condition()?;

			if self.lexer.next() != Some(Ok(SelectorToken::Close)) {
				return Err(self.error("expected `]`"));
			}

			Some(condition)
		} else {
			None
		};

		Ok(Step { kind, condition })
	}

	/// Adjacent name and escape tokens joined into one name.
	fn name(&mut self) -> Option<String> {
		let mut name: Option<String> = None;
		let mut end = None;

		while let Some((Ok(token @ (SelectorToken::Name | SelectorToken::Escaped)), start)) = self.peek() {
			if end.is_some_and(|end| end != start) {
				break;
			}

			self.lexer.next();
			let slice = self.lexer.slice();
			let text = if token == SelectorToken::Escaped {
				&slice['`'.len_utf8()..]
			} else {
				slice
			};

			name.get_or_insert_with(String::new).push_str(text);
			end = Some(self.lexer.span().end);
		}

		name
	}

	fn condition(&mut self) -> TerseResult<Condition> {
		let mut path = vec![];

		loop {
			let reference = match self.peek_token() {
				Some(SelectorToken::Star) => {
					self.lexer.next();
					Reference::Any
				}
				Some(SelectorToken::Colon | SelectorToken::At) => {
					self.lexer.next();
					let name = self.name().ok_or_else(|| self.error("missing attribute name"))?;
					Reference::Attribute(name)
				}
				Some(SelectorToken::Name | SelectorToken::Escaped) => {
					Reference::Name(self.name().unwrap_or_default())
				}
				_ => return Err(self.error("missing condition reference")),
			};

			path.push(reference);

			if self.peek_token() != Some(SelectorToken::Dot) {
				break;
			}

			self.lexer.next();
		}

		if path[..path.len() - 1]
			.iter()
			.any(|reference| matches!(reference, Reference::Attribute(_)))
		{
			return Err(self.error("an attribute reference must end the condition path"));
		}

		let test = match self.peek_token() {
			Some(SelectorToken::Close) => Test::Exists,
			Some(SelectorToken::Equals) => {
				self.lexer.next();
				Test::Equals(self.literal()?)
			}
			Some(SelectorToken::NotEquals) => {
				self.lexer.next();
				Test::NotEquals(self.literal()?)
			}
			_ => return Err(self.unexpected()),
		};

		Ok(Condition { path, test })
	}

	/// Raw text up to the closing `]`. Back-tick escapes the next character
	/// and surrounding unescaped whitespace is dropped.
	fn literal(&mut self) -> TerseResult<String> {
		let remainder = self.lexer.remainder();
		let mut characters: Vec<(char, bool)> = vec![];
		let mut chars = remainder.char_indices();
		let mut length = None;

		while let Some((index, ch)) = chars.next() {
			match ch {
				']' => {
					length = Some(index);
					break;
				}
				'`' => {
					let Some((_, escaped)) = chars.next() else {
						return Err(self.error("dangling back-tick"));
					};

					characters.push((escaped, true));
				}
				_ => characters.push((ch, false)),
			}
		}

		let Some(length) = length else {
			return Err(self.error("unterminated condition, expected `]`"));
		};

		self.lexer.bump(length);

		let is_padding = |(ch, escaped): &(char, bool)| !escaped && ch.is_whitespace();
		let start = characters
			.iter()
			.position(|character| !is_padding(character))
			.unwrap_or(characters.len());
		let end = characters
			.iter()
			.rposition(|character| !is_padding(character))
			.map_or(start, |index| index + 1);

		Ok(characters[start..end.max(start)]
			.iter()
			.map(|(ch, _)| *ch)
			.collect())
	}
}

fn parse(selector: &str) -> TerseResult<Vec<Step>> {
	SelectorParser::new(selector).parse()
}

/// A synthetic element for the attribute `name` of `node`.
fn project(node: &Element, name: &str) -> Option<Element> {
	let comparer = node.comparer();
	let (key, value) = node
		.attributes()
		.iter()
		.find(|(key, _)| comparer.same(key, name))?;

	Some(Element::new(
		key.clone(),
		value.clone(),
		vec![(key.clone(), value.clone())],
		vec![],
		comparer,
	))
}

fn navigate(kind: &StepKind, first: bool, input: Vec<Element>) -> Vec<Element> {
	match kind {
		StepKind::Name(name) if first => input.into_iter().filter(|node| node.is_named(name)).collect(),
		StepKind::Name(name) => input.iter().flat_map(|node| node.elements(name)).cloned().collect(),
		StepKind::Any if first => input,
		StepKind::Any => input.iter().flat_map(Element::children).cloned().collect(),
		StepKind::Descendants => input.iter().flat_map(Element::descendants_and_self).collect(),
		StepKind::Attribute(name) => input.iter().filter_map(|node| project(node, name)).collect(),
		StepKind::Empty => input,
	}
}

/// Values referenced by `path` starting from `node`.
fn referenced_values(node: &Element, path: &[Reference]) -> Vec<String> {
	let Some((last, parents)) = path.split_last() else {
		return vec![];
	};

	let mut scope = vec![node.clone()];

	for reference in parents {
		scope = match reference {
			Reference::Name(name) => scope.iter().flat_map(|item| item.elements(name)).cloned().collect(),
			Reference::Any => scope.iter().flat_map(Element::children).cloned().collect(),
			Reference::Attribute(_) => vec![],
		};
	}

	let mut values = vec![];

	for item in &scope {
		match last {
			Reference::Name(name) => {
				values.extend(item.attribute(name).map(ToString::to_string));
				values.extend(item.elements(name).map(|child| child.value().to_string()));
			}
			Reference::Attribute(name) => values.extend(item.attribute(name).map(ToString::to_string)),
			Reference::Any => values.extend(item.children().iter().map(|child| child.value().to_string())),
		}
	}

	values
}

fn test_values(test: &Test, values: &[String]) -> bool {
	match test {
		Test::Exists => !values.is_empty(),
		Test::Equals(literal) => equals(literal, values),
		Test::NotEquals(literal) => !equals(literal, values),
	}
}

fn equals(literal: &str, values: &[String]) -> bool {
	if literal.is_empty() {
		values.is_empty() || values.iter().any(String::is_empty)
	} else {
		values.iter().any(|value| value == literal)
	}
}

/// Evaluate `selector` against `nodes` step by step.
///
/// Every step runs before this returns, so selector errors and matching both
/// happen up front. The iterator only hands out the finished matches.
///
/// ```
/// let roots = terse_core::compile_to_tree("a\n  b x\n  c y\n")?;
/// let found = terse_core::select("a.c", &roots)?.collect::<Vec<_>>();
///
/// assert_eq!(found.len(), 1);
/// assert_eq!(found[0].value(), "y");
/// # Ok::<(), terse_core::TerseError>(())
/// ```
pub fn select(selector: &str, nodes: &[Element]) -> TerseResult<vec::IntoIter<Element>> {
	let steps = parse(selector)?;
	let mut current = nodes.to_vec();
	let mut first = true;

	for step in &steps {
		current = navigate(&step.kind, first, current);

		if let Some(condition) = &step.condition {
			current.retain(|node| test_values(&condition.test, &referenced_values(node, &condition.path)));
		}

		first &= !step.navigates();
	}

	Ok(current.into_iter())
}

type Transform = Arc<dyn Fn(Vec<Element>) -> Vec<Element> + Send + Sync>;
type Predicate = Arc<dyn Fn(&Element) -> bool + Send + Sync>;

fn transform(function: impl Fn(Vec<Element>) -> Vec<Element> + Send + Sync + 'static) -> Transform {
	Arc::new(function)
}

fn predicate(function: impl Fn(&Element) -> bool + Send + Sync + 'static) -> Predicate {
	Arc::new(function)
}

fn compile_condition(condition: Condition) -> Predicate {
	let Condition { path, test } = condition;

	match test {
		Test::Exists => predicate(move |node| !referenced_values(node, &path).is_empty()),
		Test::Equals(literal) => predicate(move |node| equals(&literal, &referenced_values(node, &path))),
		Test::NotEquals(literal) => {
			predicate(move |node| !equals(&literal, &referenced_values(node, &path)))
		}
	}
}

fn compile_step(step: Step, first: bool) -> Transform {
	let navigate = match step.kind {
		StepKind::Name(name) if first => {
			transform(move |input| input.into_iter().filter(|node| node.is_named(&name)).collect())
		}
		StepKind::Name(name) => {
			transform(move |input| input.iter().flat_map(|node| node.elements(&name)).cloned().collect())
		}
		StepKind::Any if first => transform(|input| input),
		StepKind::Any => transform(|input| input.iter().flat_map(Element::children).cloned().collect()),
		StepKind::Descendants => {
			transform(|input| input.iter().flat_map(Element::descendants_and_self).collect())
		}
		StepKind::Attribute(name) => {
			transform(move |input| input.iter().filter_map(|node| project(node, &name)).collect())
		}
		StepKind::Empty => transform(|input| input),
	};

	match step.condition.map(compile_condition) {
		Some(test) => {
			transform(move |input| {
				let mut output = navigate(input);
				output.retain(|node| test(node));
				output
			})
		}
		None => navigate,
	}
}

/// A selector compiled into a chain of closures. Cloning shares the chain.
#[derive(Clone)]
pub struct CompiledSelector {
	selector: Arc<str>,
	run: Arc<dyn Fn(&[Element]) -> Vec<Element> + Send + Sync>,
}

impl CompiledSelector {
	fn compile(selector: &str) -> TerseResult<Self> {
		let steps = parse(selector)?;
		let mut first = true;
		let mut transforms = Vec::with_capacity(steps.len());

		for step in steps {
			let navigates = step.navigates();
			transforms.push(compile_step(step, first));
			first &= !navigates;
		}

		tracing::debug!(selector, steps = transforms.len(), "compiled selector");

		Ok(Self {
			selector: selector.into(),
			run: Arc::new(move |nodes: &[Element]| {
				transforms
					.iter()
					.fold(nodes.to_vec(), |current, transform| transform(current))
			}),
		})
	}

	pub fn selector(&self) -> &str {
		&self.selector
	}

	/// Run the selector against `nodes`.
	pub fn apply(&self, nodes: &[Element]) -> Vec<Element> {
		(self.run)(nodes)
	}

	/// True when both handles share the same compiled closure chain.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.run, &other.run)
	}
}

impl fmt::Debug for CompiledSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("CompiledSelector").field(&self.selector).finish()
	}
}

/// Compiled selectors keyed by their trimmed text.
///
/// Several threads may compile the same selector at once. Only the first
/// result stored is ever handed out, and stored entries are never replaced.
#[derive(Debug, Default)]
pub struct SelectorCache {
	entries: RwLock<HashMap<String, CompiledSelector>>,
}

static SHARED_CACHE: LazyLock<SelectorCache> = LazyLock::new(SelectorCache::new);

impl SelectorCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// The process-wide cache used by [`compile_selector`]. It lives for the
	/// rest of the process and is never cleared.
	pub fn shared() -> &'static SelectorCache {
		&SHARED_CACHE
	}

	pub fn get_or_compile(&self, selector: &str) -> TerseResult<CompiledSelector> {
		let key = selector.trim();

		if let Some(compiled) = self
			.entries
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(key)
		{
			tracing::trace!(selector = key, "selector cache hit");
			return Ok(compiled.clone());
		}

		let compiled = CompiledSelector::compile(key)?;
		let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

		Ok(entries.entry(key.to_string()).or_insert(compiled).clone())
	}

	pub fn len(&self) -> usize {
		self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Compile `selector` through the shared cache.
pub fn compile_selector(selector: &str) -> TerseResult<CompiledSelector> {
	SelectorCache::shared().get_or_compile(selector)
}
