use miette::Diagnostic;
use miette::NamedSource;
use miette::SourceSpan;
use thiserror::Error;

use crate::Point;

/// Boxed error returned by external collaborators (macro lookups and option
/// handlers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum TerseError {
	#[error(transparent)]
	#[diagnostic(code(terse::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to write XML: {0}")]
	#[diagnostic(code(terse::write_error))]
	Xml(String),

	#[error("`{name}` is not a valid XML name")]
	#[diagnostic(
		code(terse::xml_name),
		help("XML names start with a letter or `_` and contain letters, digits, `-`, `_`, `.` or `:`")
	)]
	InvalidXmlName { name: String },

	#[error("element `{element}` has more than one `{name}` attribute")]
	#[diagnostic(code(terse::duplicate_attribute))]
	DuplicateAttribute { element: String, name: String },

	#[error("{message} ({})", describe_location(.source_name, .line, .column))]
	#[diagnostic(code(terse::syntax))]
	Syntax {
		message: String,
		source_name: Option<String>,
		line: usize,
		column: usize,
		#[source_code]
		src: NamedSource<String>,
		#[label("here")]
		span: SourceSpan,
	},

	#[error("invalid selector `{selector}`: {reason}")]
	#[diagnostic(
		code(terse::invalid_selector),
		help("selectors are dotted steps such as `a.b[c=1]`, `*`, `**` or `:attribute`")
	)]
	InvalidSelector { selector: String, reason: String },

	#[error("macro lookup failed for `{key}`")]
	#[diagnostic(code(terse::lookup))]
	Lookup {
		key: String,
		#[source]
		source: BoxError,
	},

	#[error("option handler failed for directive `{directive}`")]
	#[diagnostic(code(terse::option_handler))]
	OptionHandler {
		directive: String,
		#[source]
		source: BoxError,
	},

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(terse::config_parse),
		help("check that terse.toml is valid TOML with an optional [macros] table")
	)]
	ConfigParse(String),
}

impl TerseError {
	/// Build a syntax error pointing at `point` inside `source`.
	pub fn syntax(
		message: impl Into<String>,
		source_name: Option<&str>,
		source: &str,
		point: Point,
	) -> Self {
		let message = message.into();
		let name = source_name.unwrap_or("<input>");
		let length = source[point.offset.min(source.len())..]
			.chars()
			.next()
			.map_or(0, char::len_utf8);

		Self::Syntax {
			message,
			source_name: source_name.map(ToString::to_string),
			line: point.line,
			column: point.column,
			src: NamedSource::new(name, source.to_string()),
			span: SourceSpan::new(point.offset.into(), length),
		}
	}

	pub fn invalid_selector(selector: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::InvalidSelector {
			selector: selector.into(),
			reason: reason.into(),
		}
	}

	/// The `(line, column)` of a syntax error.
	pub fn line_column(&self) -> Option<(usize, usize)> {
		match self {
			Self::Syntax { line, column, .. } => Some((*line, *column)),
			_ => None,
		}
	}
}

fn describe_location(source_name: &Option<String>, line: &usize, column: &usize) -> String {
	match source_name {
		Some(name) => format!("{name}, line {line}, column {column}"),
		None => format!("line {line}, column {column}"),
	}
}

pub type TerseResult<T> = Result<T, TerseError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
