use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Compile terse configuration files and query them with selectors.",
	long_about = "terse compiles an indentation based configuration language into XML, JSON or \
	              normalized terse text.\n\nNodes nest by indentation, `:name value` lines add \
	              attributes, `%` lines declare syntax rules for anonymous nodes and \
	              `${{key|default}}` macros are filled from terse.toml and the environment.\n\nQuick \
	              start:\n  terse compile app.terse              Print the document as XML\n  terse \
	              compile app.terse --format json  Print the element tree as JSON\n  terse select \
	              'servers.*[:port=443]' app.terse"
)]
pub struct TerseCli {
	#[command(subcommand)]
	pub command: Option<Commands>,

	/// Directory searched for `terse.toml`. Defaults to the current directory.
	#[arg(long, short, global = true)]
	pub path: Option<PathBuf>,

	/// Enable verbose output. Library logs are filtered with `RUST_LOG` and
	/// default to `debug`.
	#[arg(long, short, global = true, default_value_t = false)]
	pub verbose: bool,

	/// Disable colored output.
	#[arg(long, global = true, default_value_t = false)]
	pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
	/// Compile a terse document.
	///
	/// Macros are resolved from the `[macros]` table of the discovered config
	/// file first and the process environment second. `%%include <file>`
	/// directives splice in other documents, resolved relative to the file
	/// that includes them.
	Compile {
		/// The document to compile.
		file: PathBuf,

		/// Output format for the compiled document.
		#[arg(long, value_enum, default_value_t = OutputFormat::Xml)]
		format: OutputFormat,

		/// Compare node names without regard to case. Also enabled by
		/// `ignore_case = true` in the config file.
		#[arg(long, default_value_t = false)]
		ignore_case: bool,
	},
	/// Compile a terse document and print the elements matched by a selector.
	///
	/// Selectors are dotted steps such as `servers.*.endpoint`, `**` for all
	/// descendants, `:name` to project an attribute and `[ref=value]`
	/// conditions.
	Select {
		/// The selector to evaluate.
		selector: String,

		/// The document to query.
		file: PathBuf,

		/// Output format for the matched elements.
		#[arg(long, value_enum, default_value_t = OutputFormat::Xml)]
		format: OutputFormat,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
	/// XML with two-space indentation.
	Xml,
	/// The element tree as JSON for programmatic consumption.
	Json,
	/// Normalized terse text that compiles back to the same elements.
	Terse,
}
