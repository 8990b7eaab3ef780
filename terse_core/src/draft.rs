use crate::Element;
use crate::Point;

/// A node that is still being built by the parser.
///
/// Values are assembled incrementally and attributes keep their insertion
/// order. The draft is folded into an immutable [`Element`] by the
/// materializer once parsing succeeds.
#[derive(Debug, Clone, Default)]
pub struct DraftNode {
	pub name: String,
	pub value: Option<String>,
	pub attributes: Vec<(String, String)>,
	pub children: Vec<DraftChild>,
	pub ignore_case: bool,
	/// Where the node was opened.
	pub point: Point,
}

/// A child of a draft node.
#[derive(Debug, Clone)]
pub enum DraftChild {
	Node(DraftNode),
	/// A finished subtree returned by an option handler.
	Spliced(Element),
}

impl DraftNode {
	pub fn new(name: impl Into<String>, ignore_case: bool, point: Point) -> Self {
		Self {
			name: name.into(),
			ignore_case,
			point,
			..Self::default()
		}
	}

	/// Concatenate `text` onto the value.
	pub fn append_value(&mut self, text: &str) {
		match &mut self.value {
			Some(value) => value.push_str(text),
			None => self.value = Some(text.to_string()),
		}
	}

	/// Append `text` on a new line. The separator is only inserted when the
	/// value already has content.
	pub fn continue_value(&mut self, text: &str) {
		match &mut self.value {
			Some(value) if !value.is_empty() => {
				value.push('\n');
				value.push_str(text);
			}
			_ => self.value = Some(text.to_string()),
		}
	}

	/// Overwrite the first attribute called `name`, or append it when absent.
	pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
		let value = value.into();

		match self.attributes.iter_mut().find(|(key, _)| key == name) {
			Some((_, existing)) => *existing = value,
			None => self.attributes.push((name.to_string(), value)),
		}
	}

	pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.attributes.push((name.into(), value.into()));
	}

	pub fn add_child(&mut self, child: DraftNode) {
		self.children.push(DraftChild::Node(child));
	}

	/// Add an `item` child holding `value`.
	pub fn add_item(&mut self, value: impl Into<String>) {
		let mut item = DraftNode::new("item", self.ignore_case, self.point);
		item.value = Some(value.into());
		self.add_child(item);
	}
}

/// Continuation semantics for a standalone string, used for attribute
/// values.
pub(crate) fn continue_text(target: &mut String, text: &str) {
	if !target.is_empty() {
		target.push('\n');
	}

	target.push_str(text);
}
