use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::LazyLock;

use serde::Serialize;
use serde::ser::SerializeStruct;

/// How an element compares names when looked up through its accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Comparer {
	#[default]
	Ordinal,
	IgnoreCase,
}

impl Comparer {
	pub fn from_ignore_case(ignore_case: bool) -> Self {
		if ignore_case {
			Self::IgnoreCase
		} else {
			Self::Ordinal
		}
	}

	pub fn is_ignore_case(self) -> bool {
		self == Self::IgnoreCase
	}

	/// Compare two names under this comparer.
	pub fn same(self, left: &str, right: &str) -> bool {
		match self {
			Self::Ordinal => left == right,
			Self::IgnoreCase => left.to_lowercase() == right.to_lowercase(),
		}
	}
}

struct Inner {
	name: String,
	value: String,
	attributes: Box<[(String, String)]>,
	children: Box<[Element]>,
	comparer: Comparer,
}

static EMPTY: LazyLock<Element> = LazyLock::new(|| {
	Element(Arc::new(Inner {
		name: String::new(),
		value: String::new(),
		attributes: Box::default(),
		children: Box::default(),
		comparer: Comparer::Ordinal,
	}))
});

/// An immutable node of a compiled document.
///
/// Elements are reference counted, so cloning is cheap and a subtree can be
/// shared between trees and threads. Nothing about an element changes after
/// it is built.
#[derive(Clone)]
pub struct Element(Arc<Inner>);

impl Element {
	pub fn new(
		name: impl Into<String>,
		value: impl Into<String>,
		attributes: Vec<(String, String)>,
		children: Vec<Element>,
		comparer: Comparer,
	) -> Self {
		Self(Arc::new(Inner {
			name: name.into(),
			value: value.into(),
			attributes: attributes.into_boxed_slice(),
			children: children.into_boxed_slice(),
			comparer,
		}))
	}

	pub fn builder(name: impl Into<String>) -> ElementBuilder {
		ElementBuilder::new(name)
	}

	/// The process-wide sentinel for "no such element".
	pub fn empty() -> Self {
		EMPTY.clone()
	}

	/// True only for the [`Element::empty`] sentinel itself. An element with
	/// an empty name and no content is not absent.
	pub fn is_absent(&self) -> bool {
		Arc::ptr_eq(&self.0, &EMPTY.0)
	}

	pub fn name(&self) -> &str {
		&self.0.name
	}

	pub fn value(&self) -> &str {
		&self.0.value
	}

	pub fn attributes(&self) -> &[(String, String)] {
		&self.0.attributes
	}

	pub fn children(&self) -> &[Element] {
		&self.0.children
	}

	pub fn comparer(&self) -> Comparer {
		self.0.comparer
	}

	/// True when this element's name matches `name` under its comparer.
	pub fn is_named(&self, name: &str) -> bool {
		self.0.comparer.same(&self.0.name, name)
	}

	/// The value of the first attribute called `name`.
	pub fn attribute(&self, name: &str) -> Option<&str> {
		self.0
			.attributes
			.iter()
			.find(|(key, _)| self.0.comparer.same(key, name))
			.map(|(_, value)| value.as_str())
	}

	pub fn has_attribute(&self, name: &str) -> bool {
		self.attribute(name).is_some()
	}

	/// The first child called `name`, or [`Element::empty`].
	pub fn element(&self, name: &str) -> Element {
		self.elements(name).next().cloned().unwrap_or_else(Element::empty)
	}

	/// Children called `name`, compared under this element's comparer.
	pub fn elements<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
		let comparer = self.0.comparer;
		self.0
			.children
			.iter()
			.filter(move |child| comparer.same(child.name(), name))
	}

	/// This element followed by all of its descendants in document order.
	pub fn descendants_and_self(&self) -> Vec<Element> {
		let mut result = vec![];
		let mut stack = vec![self.clone()];

		while let Some(element) = stack.pop() {
			stack.extend(element.children().iter().rev().cloned());
			result.push(element);
		}

		result
	}
}

impl PartialEq for Element {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
			|| (self.0.name == other.0.name
				&& self.0.value == other.0.value
				&& self.0.attributes == other.0.attributes
				&& self.0.children == other.0.children)
	}
}

impl Eq for Element {}

impl Hash for Element {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.0.name.hash(state);
		self.0.value.hash(state);
		self.0.attributes.hash(state);
		self.0.children.hash(state);
	}
}

impl fmt::Debug for Element {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.is_absent() {
			return write!(f, "Element::Empty");
		}

		let mut debug = f.debug_struct("Element");
		debug.field("name", &self.0.name);

		if !self.0.value.is_empty() {
			debug.field("value", &self.0.value);
		}

		if !self.0.attributes.is_empty() {
			debug.field("attributes", &self.0.attributes);
		}

		if !self.0.children.is_empty() {
			debug.field("children", &self.0.children);
		}

		debug.finish()
	}
}

impl Serialize for Element {
	fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut state = serializer.serialize_struct("Element", 4)?;
		state.serialize_field("name", &self.0.name)?;
		state.serialize_field("value", &self.0.value)?;

		if self.0.attributes.is_empty() {
			state.skip_field("attributes")?;
		} else {
			state.serialize_field("attributes", &self.0.attributes)?;
		}

		if self.0.children.is_empty() {
			state.skip_field("children")?;
		} else {
			state.serialize_field("children", &self.0.children)?;
		}

		state.end()
	}
}

/// Builds an [`Element`] one part at a time.
#[derive(Debug, Clone, Default)]
pub struct ElementBuilder {
	name: String,
	value: String,
	attributes: Vec<(String, String)>,
	children: Vec<Element>,
	comparer: Comparer,
}

impl ElementBuilder {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Self::default()
		}
	}

	#[must_use]
	pub fn value(mut self, value: impl Into<String>) -> Self {
		self.value = value.into();
		self
	}

	#[must_use]
	pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.attributes.push((name.into(), value.into()));
		self
	}

	#[must_use]
	pub fn child(mut self, child: Element) -> Self {
		self.children.push(child);
		self
	}

	#[must_use]
	pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
		self.children.extend(children);
		self
	}

	#[must_use]
	pub fn comparer(mut self, comparer: Comparer) -> Self {
		self.comparer = comparer;
		self
	}

	pub fn build(self) -> Element {
		Element::new(
			self.name,
			self.value,
			self.attributes,
			self.children,
			self.comparer,
		)
	}
}
