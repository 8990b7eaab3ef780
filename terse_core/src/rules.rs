use std::cell::OnceCell;
use std::collections::HashMap;

use regex::Captures;
use regex::Regex;

/// A piece of a compiled rule path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
	Literal(String),
	/// `*` spans one segment, `**` spans any number. Parenthesized forms are
	/// permanent.
	Wildcard { deep: bool, permanent: bool },
}

/// The state a rule settles into after its first successful match.
#[derive(Debug)]
enum Narrowed {
	/// Compared by string equality from now on.
	Literal(String),
	/// Non-permanent captures replaced by the values they first matched.
	Pattern { start: String, regex: Regex },
}

/// A wildcard rule that names anonymous nodes and assigns positional
/// attributes.
///
/// The compiled pattern never changes. The first match writes the
/// single-assignment `narrowed` cell, which is why a rule belongs to exactly
/// one parse and is not `Sync`.
#[derive(Debug)]
pub(crate) struct SyntaxRule {
	path: String,
	parts: Vec<Part>,
	node_name: Option<String>,
	start: String,
	regex: Option<Regex>,
	attributes: Vec<String>,
	ignore_case: bool,
	narrowed: OnceCell<Narrowed>,
}

impl SyntaxRule {
	/// Compile `pattern` declared at `scope`. A leading `/` makes the pattern
	/// absolute.
	pub fn create(
		scope: &str,
		pattern: &str,
		attributes: Vec<String>,
		ignore_case: bool,
	) -> Result<Self, String> {
		let pattern = pattern.trim();

		if pattern.is_empty() || pattern == "/" {
			return Err("missing rule pattern".into());
		}

		let path = if pattern.starts_with('/') {
			pattern.to_string()
		} else {
			format!("{scope}/{pattern}")
		};

		let parts = split_parts(&path);
		let node_name = path
			.rsplit('/')
			.next()
			.filter(|segment| !segment.is_empty() && !segment.contains('*'))
			.map(ToString::to_string);
		let start = literal_start(&parts);
		let regex = if parts.iter().any(|part| matches!(part, Part::Wildcard { .. })) {
			Some(build_regex(&parts, ignore_case)?)
		} else {
			None
		};

		tracing::debug!(path = %path, ?attributes, "registered syntax rule");

		Ok(Self {
			path,
			parts,
			node_name,
			start,
			regex,
			attributes,
			ignore_case,
			narrowed: OnceCell::new(),
		})
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	/// The name given to anonymous nodes resolved by this rule.
	pub fn node_name(&self) -> Option<&str> {
		self.node_name.as_deref()
	}

	/// Positional attribute names. A final `*` takes the rest of the line as
	/// the node value.
	pub fn attributes(&self) -> &[String] {
		&self.attributes
	}

	/// Cheap pretest: the candidate path and the rule's literal start are
	/// prefixes of one another.
	pub fn is_applicable(&self, path: &str) -> bool {
		let start = match self.narrowed.get() {
			Some(Narrowed::Literal(literal)) => literal.as_str(),
			Some(Narrowed::Pattern { start, .. }) => start.as_str(),
			None => self.start.as_str(),
		};

		if self.ignore_case {
			let (path, start) = (path.to_lowercase(), start.to_lowercase());
			path.starts_with(&start) || start.starts_with(&path)
		} else {
			path.starts_with(start) || start.starts_with(path)
		}
	}

	/// Test `path` against the rule, narrowing it on the first match.
	pub fn matches(&self, path: &str) -> bool {
		match self.narrowed.get() {
			Some(Narrowed::Literal(literal)) => self.same(literal, path),
			Some(Narrowed::Pattern { regex, .. }) => regex.is_match(path),
			None => {
				match &self.regex {
					None => self.same(&self.path, path),
					Some(regex) => {
						let Some(captures) = regex.captures(path) else {
							return false;
						};

						self.narrow(path, &captures);
						true
					}
				}
			}
		}
	}

	/// True when any wildcard is permanent.
	pub fn is_permanent(&self) -> bool {
		self.parts
			.iter()
			.any(|part| matches!(part, Part::Wildcard { permanent: true, .. }))
	}

	fn same(&self, left: &str, right: &str) -> bool {
		if self.ignore_case {
			left.to_lowercase() == right.to_lowercase()
		} else {
			left == right
		}
	}

	fn narrow(&self, path: &str, captures: &Captures<'_>) {
		let wildcards = self
			.parts
			.iter()
			.filter_map(|part| {
				match part {
					Part::Wildcard { permanent, .. } => Some(*permanent),
					Part::Literal(_) => None,
				}
			})
			.collect::<Vec<_>>();

		if wildcards.iter().all(|permanent| *permanent) {
			return;
		}

		let narrowed = if wildcards.iter().any(|permanent| *permanent) {
			let values = (1..=wildcards.len())
				.map(|index| captures.get(index).map_or("", |found| found.as_str()))
				.collect::<Vec<_>>();
			let parts = specialize(&self.parts, &values);

			match build_regex(&parts, self.ignore_case) {
				Ok(regex) => {
					Narrowed::Pattern {
						start: literal_start(&parts),
						regex,
					}
				}
				Err(_) => return,
			}
		} else {
			Narrowed::Literal(path.to_string())
		};

		tracing::debug!(rule = %self.path, path, "narrowed syntax rule");
		let _ = self.narrowed.set(narrowed);
	}
}

/// A named rule kept so it can be declared again at another scope.
#[derive(Debug, Clone)]
struct Template {
	pattern: String,
	attributes: Vec<String>,
}

/// All rules declared during one parse, newest last.
#[derive(Debug, Default)]
pub(crate) struct RuleSet {
	rules: Vec<SyntaxRule>,
	templates: HashMap<String, Template>,
}

impl RuleSet {
	/// Register a rule at `scope`. A `name` also stores the declaration as a
	/// template.
	pub fn declare(
		&mut self,
		scope: &str,
		name: Option<&str>,
		pattern: &str,
		attributes: Vec<String>,
		ignore_case: bool,
	) -> Result<(), String> {
		let rule = SyntaxRule::create(scope, pattern, attributes.clone(), ignore_case)?;

		if let Some(name) = name {
			self.templates.insert(
				name.to_string(),
				Template {
					pattern: pattern.to_string(),
					attributes,
				},
			);
		}

		self.rules.push(rule);
		Ok(())
	}

	pub fn has_template(&self, name: &str) -> bool {
		self.templates.contains_key(name)
	}

	/// Declare the template called `name` again at `scope`, with `extra`
	/// attribute names appended.
	pub fn instantiate(
		&mut self,
		scope: &str,
		name: &str,
		extra: Vec<String>,
		ignore_case: bool,
	) -> Result<(), String> {
		let template = self
			.templates
			.get(name)
			.cloned()
			.ok_or_else(|| format!("unknown syntax rule `{name}`"))?;
		let mut attributes = template.attributes;
		attributes.extend(extra);

		let rule = SyntaxRule::create(scope, &template.pattern, attributes, ignore_case)?;
		self.rules.push(rule);
		Ok(())
	}

	/// The newest rule matching the named node `name` under `parent`.
	pub fn resolve_named(&self, parent: &str, name: &str) -> Option<&SyntaxRule> {
		let path = format!("{parent}/{name}");

		self.rules
			.iter()
			.rev()
			.find(|rule| rule.is_applicable(&path) && rule.matches(&path))
	}

	/// The newest rule with a fixed node name that matches an anonymous node
	/// under `parent`.
	pub fn resolve_anonymous(&self, parent: &str) -> Option<&SyntaxRule> {
		self.rules.iter().rev().find(|rule| {
			rule.node_name().is_some_and(|name| {
				let path = format!("{parent}/{name}");
				rule.is_applicable(&path) && rule.matches(&path)
			})
		})
	}
}

fn split_parts(path: &str) -> Vec<Part> {
	let mut parts = vec![];
	let mut literal = String::new();
	let mut rest = path;

	while let Some(ch) = rest.chars().next() {
		let wildcard = [
			("(**)", true, true),
			("(*)", false, true),
			("**", true, false),
			("*", false, false),
		]
		.into_iter()
		.find(|(token, ..)| rest.starts_with(token));

		if let Some((token, deep, permanent)) = wildcard {
			if !literal.is_empty() {
				parts.push(Part::Literal(std::mem::take(&mut literal)));
			}

			parts.push(Part::Wildcard { deep, permanent });
			rest = &rest[token.len()..];
		} else {
			literal.push(ch);
			rest = &rest[ch.len_utf8()..];
		}
	}

	if !literal.is_empty() {
		parts.push(Part::Literal(literal));
	}

	parts
}

fn literal_start(parts: &[Part]) -> String {
	parts
		.iter()
		.map_while(|part| {
			match part {
				Part::Literal(text) => Some(text.as_str()),
				Part::Wildcard { .. } => None,
			}
		})
		.collect()
}

/// Replace every non-permanent wildcard with the value it captured.
fn specialize(parts: &[Part], values: &[&str]) -> Vec<Part> {
	let mut result: Vec<Part> = vec![];
	let mut index = 0;

	for part in parts {
		let replacement = match part {
			Part::Wildcard {
				permanent: false, ..
			} => Part::Literal(values.get(index).copied().unwrap_or_default().to_string()),
			other => other.clone(),
		};

		if matches!(part, Part::Wildcard { .. }) {
			index += 1;
		}

		match (result.last_mut(), replacement) {
			(Some(Part::Literal(previous)), Part::Literal(text)) => previous.push_str(&text),
			(_, part) => result.push(part),
		}
	}

	result
}

fn build_regex(parts: &[Part], ignore_case: bool) -> Result<Regex, String> {
	let mut source = String::from(if ignore_case { "(?i)^" } else { "^" });

	for part in parts {
		match part {
			Part::Literal(text) => source.push_str(&regex::escape(text)),
			Part::Wildcard { deep: false, .. } => source.push_str("([^/]+)"),
			Part::Wildcard { deep: true, .. } => source.push_str("(.*)"),
		}
	}

	source.push('$');
	Regex::new(&source).map_err(|error| format!("invalid rule pattern: {error}"))
}
