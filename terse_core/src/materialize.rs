use crate::Comparer;
use crate::DocumentWriter;
use crate::Element;
use crate::MacroLookup;
use crate::TerseResult;
use crate::draft::DraftChild;
use crate::draft::DraftNode;
use crate::macros::expand_macros;
use crate::writer::write_element;

/// Fold draft roots into immutable elements, expanding macros in values and
/// attribute values.
pub(crate) fn to_elements(
	drafts: Vec<DraftChild>,
	macros: Option<&dyn MacroLookup>,
) -> TerseResult<Vec<Element>> {
	drafts
		.into_iter()
		.map(|child| {
			match child {
				DraftChild::Node(node) => to_element(node, macros),
				DraftChild::Spliced(element) => Ok(element),
			}
		})
		.collect()
}

fn to_element(node: DraftNode, macros: Option<&dyn MacroLookup>) -> TerseResult<Element> {
	let value = match &node.value {
		Some(value) => expand_macros(value, macros)?.into_owned(),
		None => String::new(),
	};
	let attributes = node
		.attributes
		.into_iter()
		.map(|(name, value)| Ok((name, expand_macros(&value, macros)?.into_owned())))
		.collect::<TerseResult<Vec<_>>>()?;
	let children = to_elements(node.children, macros)?;

	Ok(Element::new(
		node.name,
		value,
		attributes,
		children,
		Comparer::from_ignore_case(node.ignore_case),
	))
}

/// Stream draft roots into `writer` depth first.
pub(crate) fn write_drafts(
	drafts: &[DraftChild],
	writer: &mut dyn DocumentWriter,
	macros: Option<&dyn MacroLookup>,
) -> TerseResult<()> {
	for child in drafts {
		match child {
			DraftChild::Node(node) => write_draft(node, writer, macros)?,
			DraftChild::Spliced(element) => write_element(writer, element)?,
		}
	}

	Ok(())
}

fn write_draft(
	node: &DraftNode,
	writer: &mut dyn DocumentWriter,
	macros: Option<&dyn MacroLookup>,
) -> TerseResult<()> {
	writer.start_element(&node.name)?;

	for (name, value) in &node.attributes {
		writer.attribute(name, &expand_macros(value, macros)?)?;
	}

	if let Some(value) = node.value.as_deref().filter(|value| !value.is_empty()) {
		writer.text(&expand_macros(value, macros)?)?;
	}

	write_drafts(&node.children, writer, macros)?;
	writer.end_element()
}
