use crate::Element;

const INDENT: &str = "  ";
const COMMENT_OPENERS: [&str; 4] = ["//", "#", "/*", "<#"];

/// Render elements back into DSL text.
///
/// Compiling the result produces elements equal to `roots`, as long as no
/// value contains `${{` macro syntax.
///
/// ```
/// let roots = terse_core::compile_to_tree("server\n  :port 8080\n  host localhost\n")?;
/// let text = terse_core::to_text(&roots);
///
/// assert_eq!(terse_core::compile_to_tree(&text)?, roots);
/// # Ok::<(), terse_core::TerseError>(())
/// ```
pub fn to_text(roots: &[Element]) -> String {
	let mut output = String::new();

	for root in roots {
		write_element(&mut output, root, 0);
	}

	output
}

fn write_element(output: &mut String, element: &Element, depth: usize) {
	let indent = INDENT.repeat(depth);
	let inner = INDENT.repeat(depth + 1);

	output.push_str(&indent);
	output.push_str(element.name());
	write_value(output, element.value(), &indent, &inner);

	for (name, value) in element.attributes() {
		output.push_str(&inner);
		output.push(':');
		output.push_str(&word(name));
		write_value(output, value, &inner, &INDENT.repeat(depth + 2));
	}

	for child in element.children() {
		write_element(output, child, depth + 1);
	}
}

/// Write ` value` and the line break after it. Multi-line values become a
/// fenced block, or `..` lines when every line carries its own indentation
/// and no empty line is left to anchor the fence.
fn write_value(output: &mut String, value: &str, indent: &str, inner: &str) {
	if value.is_empty() {
		output.push('\n');
		return;
	}

	if !value.contains('\n') {
		output.push(' ');
		output.push_str(&single_line(value));
		output.push('\n');
		return;
	}

	let lines = value.split('\n').collect::<Vec<_>>();

	if has_shared_indent(&lines) && !lines.contains(&"") {
		output.push_str(" `");
		output.push_str(lines[0]);
		output.push('\n');

		for line in &lines[1..] {
			output.push_str(inner);
			output.push_str(".. `");
			output.push_str(line);
			output.push('\n');
		}

		return;
	}

	let tag = fence_tag(&lines);
	output.push_str(" <<");
	output.push_str(&tag);
	output.push('\n');

	// Empty lines keep the fence indentation so they pin the dedent width.
	for line in &lines {
		output.push_str(inner);
		output.push_str(line);
		output.push('\n');
	}

	output.push_str(indent);
	output.push_str(&tag);
	output.push_str(">>\n");
}

fn single_line(value: &str) -> String {
	let protected = value.trim() != value
		|| value.starts_with(['`', '[', '(', '<', '.'])
		|| COMMENT_OPENERS.iter().any(|opener| value.contains(opener));

	if protected {
		format!("`{value}")
	} else {
		value.to_string()
	}
}

/// A back-tick quoted word when `name` would not scan as a bare word.
fn word(name: &str) -> String {
	if name.is_empty() || name.contains([' ', '\t', '`']) {
		format!("`{}`", name.replace('`', "``"))
	} else {
		name.to_string()
	}
}

fn has_shared_indent(lines: &[&str]) -> bool {
	lines
		.iter()
		.filter(|line| !line.is_empty())
		.all(|line| line.starts_with([' ', '\t']))
}

fn fence_tag(lines: &[&str]) -> String {
	let mut tag = String::from("EOT");
	let mut counter = 0;

	while lines.iter().any(|line| {
		let line = line.trim();
		line == format!("{tag}>>") || line == format!(">>{tag}")
	}) {
		counter += 1;
		tag = format!("EOT{counter}");
	}

	tag
}
