use std::path::Path;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use owo_colors::OwoColorize;
use terse_cli::Commands;
use terse_cli::OutputFormat;
use terse_cli::TerseCli;
use terse_core::BoxError;
use terse_core::CompileOptions;
use terse_core::ConverterState;
use terse_core::Element;
use terse_core::EnvLookup;
use terse_core::MacroLookup;
use terse_core::OptionHandler;
use terse_core::TerseConfig;
use terse_core::XmlWriter;
use terse_core::compile_selector;
use terse_core::compile_to_tree_with;
use terse_core::compile_with;
use terse_core::to_text;
use terse_core::write_element;
use tracing_subscriber::EnvFilter;

static USE_COLOR: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Nested `%%include` directives beyond this depth are treated as a cycle.
const MAX_INCLUDE_DEPTH: usize = 16;

fn color_enabled() -> bool {
	USE_COLOR.load(std::sync::atomic::Ordering::Relaxed)
}

/// Apply ANSI color codes only when color is enabled.
macro_rules! colored {
	($text:expr,red) => {
		if color_enabled() {
			format!("{}", $text.red())
		} else {
			format!("{}", $text)
		}
	};
	($text:expr,yellow) => {
		if color_enabled() {
			format!("{}", $text.yellow())
		} else {
			format!("{}", $text)
		}
	};
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() {
	let args = TerseCli::parse();

	// Respect NO_COLOR env var and --no-color flag.
	let use_color = !args.no_color && std::env::var_os("NO_COLOR").is_none();
	if !use_color {
		USE_COLOR.store(false, std::sync::atomic::Ordering::Relaxed);
	}

	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	if args.verbose {
		tracing_subscriber::fmt()
			.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
			.with_writer(std::io::stderr)
			.with_ansi(use_color)
			.init();
	}

	let result = match &args.command {
		Some(Commands::Compile {
			file,
			format,
			ignore_case,
		}) => run_compile(&args, file, *format, *ignore_case),
		Some(Commands::Select {
			selector,
			file,
			format,
		}) => run_select(&args, selector, file, *format),
		None => {
			eprintln!("No subcommand specified. Run `terse --help` for usage.");
			process::exit(1);
		}
	};

	if let Err(e) = result {
		// Render library errors through miette so syntax errors point at
		// their source line.
		match e.downcast::<terse_core::TerseError>() {
			Ok(terse_err) => {
				let report: miette::Report = (*terse_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("{} {e}", colored!("error:", red));
			}
		}
		process::exit(2);
	}
}

fn resolve_root(args: &TerseCli) -> PathBuf {
	args.path
		.clone()
		.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_config(args: &TerseCli) -> Result<TerseConfig, Box<dyn std::error::Error>> {
	let root = resolve_root(args);
	let config = TerseConfig::load(&root)?;

	if args.verbose {
		match TerseConfig::resolve_path(&root) {
			Some(path) => eprintln!("Using config: {}", path.display()),
			None => eprintln!("No config found under {}", root.display()),
		}
	}

	Ok(config.unwrap_or_default())
}

/// Splices the elements of `%%include <file>…` into the including document.
struct IncludeHandler<'a> {
	macros: &'a dyn MacroLookup,
	depth: usize,
}

impl OptionHandler for IncludeHandler<'_> {
	fn handle(
		&mut self,
		state: &ConverterState,
		directive: &str,
		parameters: &[String],
	) -> Result<Option<Vec<Element>>, BoxError> {
		if directive != "include" {
			tracing::warn!(directive, ?parameters, "ignoring unknown directive");
			return Ok(None);
		}

		if self.depth >= MAX_INCLUDE_DEPTH {
			return Err(format!("includes are nested more than {MAX_INCLUDE_DEPTH} levels deep").into());
		}

		let base = state
			.source_name
			.as_deref()
			.map(Path::new)
			.and_then(Path::parent)
			.unwrap_or_else(|| Path::new(""));
		let mut elements = vec![];

		for parameter in parameters {
			let path = base.join(parameter);
			let text = std::fs::read_to_string(&path)
				.map_err(|e| format!("failed to read {}: {e}", path.display()))?;
			let source_name = path.display().to_string();
			let mut nested = IncludeHandler {
				macros: self.macros,
				depth: self.depth + 1,
			};

			tracing::debug!(path = %source_name, depth = nested.depth, "including document");

			let roots = compile_to_tree_with(
				&text,
				CompileOptions::new()
					.source_name(&source_name)
					.ignore_case(state.ignore_case)
					.option_handler(&mut nested)
					.macros(self.macros),
			)?;

			elements.extend(roots);
		}

		Ok(Some(elements))
	}
}

fn run_compile(args: &TerseCli, file: &Path, format: OutputFormat, ignore_case: bool) -> CliResult {
	let config = load_config(args)?;
	let macros = (&config, EnvLookup);
	let text = std::fs::read_to_string(file)?;
	let source_name = file.display().to_string();
	let mut handler = IncludeHandler {
		macros: &macros,
		depth: 0,
	};
	let options = CompileOptions::new()
		.source_name(&source_name)
		.ignore_case(ignore_case || config.ignore_case)
		.option_handler(&mut handler)
		.macros(&macros);

	if format == OutputFormat::Xml {
		let mut writer = XmlWriter::new();
		compile_with(&text, &mut writer, options)?;
		print!("{}", writer.finish());
		return Ok(());
	}

	let roots = compile_to_tree_with(&text, options)?;
	print_elements(&roots, format)
}

fn run_select(args: &TerseCli, selector: &str, file: &Path, format: OutputFormat) -> CliResult {
	let config = load_config(args)?;
	let macros = (&config, EnvLookup);
	let compiled = compile_selector(selector)?;
	let text = std::fs::read_to_string(file)?;
	let source_name = file.display().to_string();
	let mut handler = IncludeHandler {
		macros: &macros,
		depth: 0,
	};
	let roots = compile_to_tree_with(
		&text,
		CompileOptions::new()
			.source_name(&source_name)
			.ignore_case(config.ignore_case)
			.option_handler(&mut handler)
			.macros(&macros),
	)?;
	let found = compiled.apply(&roots);

	if found.is_empty() {
		eprintln!(
			"{} selector `{}` matched no elements",
			colored!("warning:", yellow),
			compiled.selector()
		);
	} else if args.verbose {
		eprintln!("Matched {} element(s)", found.len());
	}

	print_elements(&found, format)
}

fn print_elements(elements: &[Element], format: OutputFormat) -> CliResult {
	match format {
		OutputFormat::Xml => {
			let mut writer = XmlWriter::new();

			for element in elements {
				write_element(&mut writer, element)?;
			}

			print!("{}", writer.finish());
		}
		OutputFormat::Json => println!("{}", serde_json::to_string_pretty(elements)?),
		OutputFormat::Terse => print!("{}", to_text(elements)),
	}

	Ok(())
}
