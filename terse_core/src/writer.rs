use std::fmt;

use quick_xml::Writer;
use quick_xml::escape::escape;
use quick_xml::escape::partial_escape;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;

use crate::Element;
use crate::TerseError;
use crate::TerseResult;

/// A streaming sink for compiled documents.
///
/// Calls arrive in document order: `start_element`, its attributes, its text,
/// its children, then `end_element`.
pub trait DocumentWriter {
	fn start_element(&mut self, name: &str) -> TerseResult<()>;
	fn attribute(&mut self, name: &str, value: &str) -> TerseResult<()>;
	fn text(&mut self, value: &str) -> TerseResult<()>;
	fn end_element(&mut self) -> TerseResult<()>;
}

/// Stream an existing element and its subtree into `writer`.
pub fn write_element(writer: &mut dyn DocumentWriter, element: &Element) -> TerseResult<()> {
	writer.start_element(element.name())?;

	for (name, value) in element.attributes() {
		writer.attribute(name, value)?;
	}

	if !element.value().is_empty() {
		writer.text(element.value())?;
	}

	for child in element.children() {
		write_element(writer, child)?;
	}

	writer.end_element()
}

#[derive(Debug)]
struct Frame {
	name: String,
	/// The start tag while attributes may still be added to it.
	pending: Option<BytesStart<'static>>,
	attributes: Vec<String>,
	text: bool,
}

/// Writes XML text with two-space indentation. Each root element starts on
/// its own line.
///
/// Element and attribute names must be valid XML names and an element may
/// not repeat an attribute, otherwise the write fails.
pub struct XmlWriter {
	writer: Writer<Vec<u8>>,
	stack: Vec<Frame>,
}

impl fmt::Debug for XmlWriter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("XmlWriter")
			.field("stack", &self.stack)
			.finish_non_exhaustive()
	}
}

impl Default for XmlWriter {
	fn default() -> Self {
		Self::new()
	}
}

impl XmlWriter {
	pub fn new() -> Self {
		Self {
			writer: Writer::new_with_indent(Vec::new(), b' ', 2),
			stack: vec![],
		}
	}

	/// The XML written so far.
	pub fn finish(self) -> String {
		let mut output = String::from_utf8_lossy(&self.writer.into_inner()).into_owned();

		if !output.is_empty() {
			output.push('\n');
		}

		output
	}

	fn write(&mut self, event: Event<'_>) -> TerseResult<()> {
		self.writer
			.write_event(event)
			.map_err(|error| TerseError::Xml(error.to_string()))
	}

	/// Write the start tag of the innermost element if it is still pending.
	fn flush_start(&mut self) -> TerseResult<()> {
		let Some(start) = self.stack.last_mut().and_then(|frame| frame.pending.take()) else {
			return Ok(());
		};

		self.write(Event::Start(start))
	}
}

impl DocumentWriter for XmlWriter {
	fn start_element(&mut self, name: &str) -> TerseResult<()> {
		check_name(name)?;
		self.flush_start()?;

		// Text leaves the writer mid-line, so children start on a fresh one.
		if self.stack.last().is_some_and(|frame| frame.text) {
			self.writer
				.write_indent()
				.map_err(|error| TerseError::Xml(error.to_string()))?;
		}

		self.stack.push(Frame {
			name: name.to_string(),
			pending: Some(BytesStart::new(name.to_string())),
			attributes: vec![],
			text: false,
		});

		Ok(())
	}

	fn attribute(&mut self, name: &str, value: &str) -> TerseResult<()> {
		check_name(name)?;

		let Some(frame) = self.stack.last_mut() else {
			return Err(TerseError::Xml(format!("attribute `{name}` outside of an element")));
		};
		let Some(start) = frame.pending.as_mut() else {
			return Err(TerseError::Xml(format!(
				"attribute `{name}` after the content of `{}`",
				frame.name
			)));
		};

		if frame.attributes.iter().any(|existing| existing == name) {
			return Err(TerseError::DuplicateAttribute {
				element: frame.name.clone(),
				name: name.to_string(),
			});
		}

		let value = escape(value).replace('\n', "&#10;").replace('\t', "&#9;");
		start.push_attribute((name.as_bytes(), value.as_bytes()));
		frame.attributes.push(name.to_string());

		Ok(())
	}

	fn text(&mut self, value: &str) -> TerseResult<()> {
		if self.stack.is_empty() {
			return Err(TerseError::Xml("text outside of an element".to_string()));
		}

		self.flush_start()?;
		self.write(Event::Text(BytesText::from_escaped(partial_escape(value))))?;

		if let Some(frame) = self.stack.last_mut() {
			frame.text = true;
		}

		Ok(())
	}

	fn end_element(&mut self) -> TerseResult<()> {
		let Some(frame) = self.stack.pop() else {
			return Err(TerseError::Xml("unbalanced end of element".to_string()));
		};

		match frame.pending {
			Some(start) => self.write(Event::Empty(start)),
			None => self.write(Event::End(BytesEnd::new(frame.name))),
		}
	}
}

/// Reject names that would make the document ill-formed.
fn check_name(name: &str) -> TerseResult<()> {
	let mut chars = name.chars();
	let valid = chars
		.next()
		.is_some_and(|first| first.is_alphabetic() || first == '_' || first == ':')
		&& chars.all(|ch| ch.is_alphanumeric() || matches!(ch, '_' | ':' | '-' | '.'));

	if valid {
		Ok(())
	} else {
		Err(TerseError::InvalidXmlName {
			name: name.to_string(),
		})
	}
}
