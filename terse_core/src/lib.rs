//! `terse_core` compiles the terse configuration language into a tree of
//! immutable elements and queries those trees with a small selector
//! language.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Source text
//!   → Lexer (markers, words, line values and fenced blocks; indentation becomes block tokens)
//!   → Parser (draft tree; `%` syntax rules name anonymous nodes and assign positional attributes)
//!   → Materializer (`${{key|default}}` macros; immutable `Element` tree or a `DocumentWriter` stream)
//!   → Selector (`a.b[c=1]` queries, interpreted or compiled and cached)
//! ```
//!
//! ## The language
//!
//! ```text
//! %%ignore-case
//! %/servers/(*)/endpoint host port
//!
//! servers
//!   primary
//!     :region eu-west
//!     endpoint localhost 8080
//!   backup
//!     endpoint ${{backup.host|example.org}} 443
//! tags [fast, small; stable]
//! notes <<EOT
//!   first line
//!   second line
//! EOT>>
//! ```
//!
//! - Each line opens a node: a name followed by an optional value.
//!   Indentation nests nodes.
//! - `:name value`, `=name value` and `@name value` lines add attributes to
//!   the enclosing node.
//! - `..` continues the enclosing node's value on a new line.
//! - `[a, b]` creates `item` children and `(a=1, b=2)` adds attributes.
//! - `<<TAG` … `TAG>>` captures a multi-line value with its shared
//!   indentation removed.
//! - `%pattern names…` declares a syntax rule and `%%directive` changes
//!   parser settings or calls an [`OptionHandler`].
//! - `//`, `#`, `/* */` and `<# #>` start comments.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from `terse.toml` (default case
//!   sensitivity and macro values).
//!
//! ## Key Types
//!
//! - [`Element`]: An immutable, cheaply cloned node with a name, value,
//!   attributes and children.
//! - [`CompileOptions`]: Source name, case sensitivity, option handler and
//!   macro lookup for a compilation.
//! - [`CompiledSelector`]: A selector turned into a reusable closure chain.
//! - [`SelectorCache`]: Compiled selectors keyed by their text.
//! - [`TerseError`]: Every failure, including syntax errors with their
//!   line and column.
//!
//! ## Quick Start
//!
//! ```rust
//! use terse_core::compile_selector;
//! use terse_core::compile_to_tree;
//!
//! let roots = compile_to_tree("a\n  b first\n    :c 1\n  b second\n")?;
//! let selector = compile_selector("a.b[c=1]")?;
//! let found = selector.apply(&roots);
//!
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].value(), "first");
//! # Ok::<(), terse_core::TerseError>(())
//! ```

pub use config::*;
pub use element::*;
pub use error::*;
pub use format::*;
pub use macros::*;
pub use parser::ConverterState;
pub use parser::OptionHandler;
pub use position::*;
pub use selector::*;
pub use writer::*;

pub mod config;
pub(crate) mod cursor;
mod draft;
mod element;
#[allow(unused_assignments)]
mod error;
mod format;
pub(crate) mod lexer;
mod macros;
mod materialize;
mod parser;
mod position;
pub(crate) mod rules;
mod selector;
pub(crate) mod tokens;
mod writer;

/// Settings for a single compilation.
#[derive(Default)]
pub struct CompileOptions<'a> {
	/// Reported in syntax errors and passed to the option handler.
	pub source_name: Option<&'a str>,
	/// Compare names without regard to case until a `%%case-sensitive`
	/// directive says otherwise.
	pub ignore_case: bool,
	/// Receives `%%` directives other than `ignore-case` and
	/// `case-sensitive`. Without one those directives are skipped with a
	/// warning.
	pub option_handler: Option<&'a mut dyn OptionHandler>,
	/// Resolves `${{key}}` macros. Without one every macro falls back to its
	/// default.
	pub macros: Option<&'a dyn MacroLookup>,
}

impl<'a> CompileOptions<'a> {
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn source_name(mut self, source_name: &'a str) -> Self {
		self.source_name = Some(source_name);
		self
	}

	#[must_use]
	pub fn ignore_case(mut self, ignore_case: bool) -> Self {
		self.ignore_case = ignore_case;
		self
	}

	#[must_use]
	pub fn option_handler(mut self, handler: &'a mut dyn OptionHandler) -> Self {
		self.option_handler = Some(handler);
		self
	}

	#[must_use]
	pub fn macros(mut self, macros: &'a dyn MacroLookup) -> Self {
		self.macros = Some(macros);
		self
	}
}

/// Compile `text` into XML with two-space indentation.
///
/// ```
/// let xml = terse_core::compile("greeting hello\n  :lang en\n")?;
///
/// assert_eq!(xml, "<greeting lang=\"en\">hello</greeting>\n");
/// # Ok::<(), terse_core::TerseError>(())
/// ```
pub fn compile(text: &str) -> TerseResult<String> {
	let mut writer = XmlWriter::new();
	compile_with(text, &mut writer, CompileOptions::default())?;
	Ok(writer.finish())
}

/// Compile `text` and stream the result into `writer`.
pub fn compile_with(
	text: &str,
	writer: &mut dyn DocumentWriter,
	options: CompileOptions<'_>,
) -> TerseResult<()> {
	let drafts = parser::parse(
		text,
		options.source_name,
		options.ignore_case,
		options.option_handler,
	)?;

	materialize::write_drafts(&drafts, writer, options.macros)
}

/// Compile `text` into its root elements.
pub fn compile_to_tree(text: &str) -> TerseResult<Vec<Element>> {
	compile_to_tree_with(text, CompileOptions::default())
}

pub fn compile_to_tree_with(text: &str, options: CompileOptions<'_>) -> TerseResult<Vec<Element>> {
	let drafts = parser::parse(
		text,
		options.source_name,
		options.ignore_case,
		options.option_handler,
	)?;

	materialize::to_elements(drafts, options.macros)
}

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
