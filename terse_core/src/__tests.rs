use std::collections::HashMap;

use rstest::rstest;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;
use crate::lexer::Lexer;
use crate::lexer::Rule;
use crate::lexer::dedent;
use crate::rules::RuleSet;
use crate::tokens::Marker;
use crate::tokens::TokenKind;

fn macro_values() -> HashMap<String, String> {
	HashMap::from([("known.key".to_string(), "value".to_string())])
}

/// Structural tokens produced for `input` when every line holds a single
/// identifier.
fn structure(input: &str) -> TerseResult<Vec<TokenKind>> {
	let mut lexer = Lexer::new(input, None);
	let mut kinds = vec![];

	loop {
		let token = lexer.next_line()?;
		kinds.push(token.kind);

		match token.kind {
			TokenKind::Eof => return Ok(kinds),
			TokenKind::LineEnd | TokenKind::BlockStart => {
				lexer.scan(&[Rule::Identifier])?;
				lexer.finish_line()?;
			}
			_ => {}
		}
	}
}

#[rstest]
#[case::nested(
	"a\n  b\n    c\nd\n",
	vec![
		TokenKind::LineEnd,
		TokenKind::BlockStart,
		TokenKind::BlockStart,
		TokenKind::BlockEnd,
		TokenKind::BlockEnd,
		TokenKind::LineEnd,
		TokenKind::Eof,
	]
)]
#[case::blank_and_comment_lines(
	"a\n\n  // note\n  b\n",
	vec![TokenKind::LineEnd, TokenKind::BlockStart, TokenKind::BlockEnd, TokenKind::Eof]
)]
#[case::tabs_count_to_four("a\n\tb\n    c\n", vec![
	TokenKind::LineEnd,
	TokenKind::BlockStart,
	TokenKind::LineEnd,
	TokenKind::BlockEnd,
	TokenKind::Eof,
])]
#[case::indented_document("  a\n  b\n", vec![TokenKind::LineEnd, TokenKind::LineEnd, TokenKind::Eof])]
#[case::empty("", vec![TokenKind::Eof])]
fn indentation_becomes_block_tokens(
	#[case] input: &str,
	#[case] expected: Vec<TokenKind>,
) -> TerseResult<()> {
	assert_eq!(structure(input)?, expected);

	Ok(())
}

#[rstest]
#[case::continuation("..x", Marker::Continuation)]
#[case::dot(". x", Marker::AnonymousDot)]
#[case::dash("- x", Marker::AnonymousDash)]
#[case::colon(":x", Marker::AttributeColon)]
#[case::equals("=x", Marker::AttributeEquals)]
#[case::at("@x", Marker::AttributeAt)]
#[case::array("[x]", Marker::ArrayOpen)]
#[case::end_tag("/x", Marker::EndTag)]
#[case::config("%%x", Marker::Config)]
#[case::option("%x", Marker::Option)]
fn markers_use_longest_match(#[case] input: &str, #[case] expected: Marker) -> TerseResult<()> {
	let mut lexer = Lexer::new(input, None);
	lexer.next_line()?;
	let marker = lexer.scan(&[Rule::Marker])?.and_then(|token| token.marker());

	assert_eq!(marker, Some(expected));

	Ok(())
}

#[test]
fn tokens_span_their_text() -> TerseResult<()> {
	let mut lexer = Lexer::new("server primary", None);
	let line = lexer.next_line()?;
	let Some(name) = lexer.scan(&[Rule::Identifier])? else {
		panic!("expected an identifier");
	};

	assert!(line.position.is_empty());
	assert_eq!(name.text, "server");
	assert_eq!(name.position.len(), 6);
	assert_eq!((name.position.start.line, name.position.start.column), (1, 1));
	assert_eq!(name.position.end.column, 7);

	Ok(())
}

#[test]
fn comments_are_not_markers() -> TerseResult<()> {
	let mut lexer = Lexer::new("x //comment", None);
	lexer.next_line()?;
	lexer.scan(&[Rule::Identifier])?;

	assert_eq!(lexer.scan(&[Rule::Marker])?, None);
	lexer.finish_line()?;

	Ok(())
}

#[rstest]
#[case::shared_spaces(&["    a", "      b"], "a\n  b")]
#[case::tabs(&["\ta", "\t\tb"], "a\n\tb")]
#[case::blank_lines_ignored(&["  a", "", "  b"], "a\n\nb")]
#[case::whitespace_only_line_counts(&["  ", "    x"], "\n  x")]
#[case::tab_equals_four_spaces(&["\tx", "    y"], "x\ny")]
#[case::no_indent(&["a", "  b"], "a\n  b")]
fn dedent_removes_shared_indentation(#[case] lines: &[&str], #[case] expected: &str) {
	assert_eq!(dedent(lines), expected);
}

#[test]
fn continuation_builds_values() -> TerseResult<()> {
	let roots = compile_to_tree("node\n  one 1\n  two\n    .. 2\n")?;
	let expected = Element::builder("node")
		.child(leaf("one", "1"))
		.child(leaf("two", "2"))
		.build();

	assert_eq!(roots, vec![expected]);

	Ok(())
}

#[rstest]
#[case::continuation_onto_empty("a\n  ..\n  .. x\n", "x")]
#[case::continuation_joins_lines("a first\n  .. second\n", "first\nsecond")]
#[case::raw_text_line("a\n  `raw text // kept\n", "raw text // kept")]
#[case::raw_number_line("a\n  42\n  43\n", "42\n43")]
#[case::trailing_comment("a value // note\n", "value")]
#[case::hash_comment("a 42 # answer\n", "42")]
#[case::url_survives("a http://host/path\n", "http://host/path")]
#[case::block_comment_spanning_lines("a 1 /* spans\n  lines */\nb 2\n", "1")]
#[case::end_tag_value("a one\n/a two\n", "one\ntwo")]
#[case::end_tag_after_block("a one\n  b\n/a two\n", "one\ntwo")]
#[case::parameters_then_value("a (x=1, y=2) rest\n", "rest")]
#[case::fenced("a <<TAG\n    line1\n    line2\nTAG>>\n", "line1\nline2")]
#[case::fenced_without_tag("a <<\n  x\n   y\n>>\n", "x\n y")]
#[case::fenced_reverse_close("a <<END\n  x\n>>END\n", "x")]
#[case::fenced_keeps_blank_lines("a <<EOT\n  x\n\n  y\nEOT>>\n", "x\n\ny")]
#[case::fenced_whitespace_line_sets_indent("a <<EOT\n  \n    x\nEOT>>\n", "\n  x")]
#[case::fenced_in_block("a\n  <<EOT\n    body\n  EOT>>\n", "body")]
#[case::windows_line_endings("a one\r\n  .. two\r\n", "one\ntwo")]
fn value_assembly(#[case] input: &str, #[case] expected: &str) -> TerseResult<()> {
	let roots = compile_to_tree(input)?;

	assert_eq!(roots[0].value(), expected);

	Ok(())
}

#[rstest]
#[case::commas("tags [a, b, c]\n", &["a", "b", "c"])]
#[case::semicolons("tags [a; b]\n", &["a", "b"])]
#[case::empty_items_skipped("tags [a,, b,]\n", &["a", "b"])]
#[case::multi_line("tags [\n  a,\n  b\n]\nnext 1\n", &["a", "b"])]
#[case::quoted_item("tags [`a, b`, c]\n", &["a, b", "c"])]
#[case::empty_array("tags []\n", &[])]
#[case::array_line_in_block("tags\n  [x, y]\n  [z]\n", &["x", "y", "z"])]
fn arrays_create_item_children(#[case] input: &str, #[case] expected: &[&str]) -> TerseResult<()> {
	let roots = compile_to_tree(input)?;

	assert_eq!(roots[0], items("tags", expected));

	Ok(())
}

#[test]
fn parameter_lists_append_attributes() -> TerseResult<()> {
	let roots = compile_to_tree("call (x=1, y=two, z=) tail\n")?;
	let expected = Element::builder("call")
		.value("tail")
		.attribute("x", "1")
		.attribute("y", "two")
		.attribute("z", "")
		.build();

	assert_eq!(roots, vec![expected]);

	Ok(())
}

#[test]
fn attribute_pairs_and_continuations() -> TerseResult<()> {
	let input = "\
node
  :plain value
  =equals 1
  @at 2
  :long first
    second
    .. third
  :empty
  :fenced <<EOT
    x
      y
  EOT>>
  :`spaced name` v
";
	let roots = compile_to_tree(input)?;
	let expected = Element::builder("node")
		.attribute("plain", "value")
		.attribute("equals", "1")
		.attribute("at", "2")
		.attribute("long", "first\nsecond\nthird")
		.attribute("empty", "")
		.attribute("fenced", "x\n  y")
		.attribute("spaced name", "v")
		.build();

	assert_eq!(roots, vec![expected]);

	Ok(())
}

#[rstest]
#[case::missing_node_name("- orphan\n", 1, 1, "missing node name")]
#[case::end_tag_mismatch("a\n  b 1\n/c\n", 3, 2, "does not match")]
#[case::missing_assignment("call (x 1)\n", 1, 9, "missing assignment")]
#[case::unterminated_parameters("call (x=1\n", 1, 10, "unterminated parameter list")]
#[case::malformed_attribute_continuation("a\n  :b one\n    - two\n", 3, 5, "malformed attribute continuation")]
#[case::deeper_attribute_continuation("a\n  :b one\n    x\n      y\n", 4, 7, "malformed attribute continuation")]
#[case::inconsistent_indentation("a\n    b\n  c\n", 3, 3, "inconsistent indentation")]
#[case::unterminated_fence("a <<END\n  x\n", 1, 3, "unterminated fenced block")]
#[case::stray_end_tag_in_block("a\n  /a\n", 2, 3, "unexpected end tag")]
#[case::stray_end_tag_at_root("/a\n", 1, 1, "unexpected end tag")]
#[case::text_after_array("tags [a] extra\n", 1, 10, "unexpected `e`")]
#[case::unterminated_array("tags [a, b\n", 1, 7, "unterminated array")]
#[case::unterminated_comment("a 1 /* open\n", 1, 5, "unterminated comment")]
#[case::attribute_at_root(":a 1\n", 1, 1, "outside of a node")]
#[case::raw_text_at_root("`text\n", 1, 1, "expected a node name")]
#[case::indented_after_raw_text("a\n  `raw\n    deeper\n", 3, 5, "unexpected indentation")]
#[case::indented_after_option("%item name\n  x\n", 2, 3, "unexpected indentation")]
#[case::missing_rule_pattern("%\n", 1, 2, "missing rule pattern")]
#[case::unknown_rule_template("%..nothing\n", 1, 2, "unknown syntax rule")]
fn syntax_errors_report_their_position(
	#[case] input: &str,
	#[case] line: usize,
	#[case] column: usize,
	#[case] message: &str,
) {
	let error = compile_to_tree(input).expect_err("input should not compile");

	assert_eq!(error.line_column(), Some((line, column)), "{error}");
	assert!(error.to_string().contains(message), "{error}");
}

#[test]
fn syntax_errors_name_their_source() {
	let error = compile_to_tree_with("- x\n", CompileOptions::new().source_name("app.terse"))
		.expect_err("anonymous node without a rule");

	assert_eq!(
		error.to_string(),
		"missing node name (app.terse, line 1, column 1)"
	);
}

#[test]
fn selector_matches_attribute_condition() -> TerseResult<()> {
	let roots = compile_to_tree(ATTRIBUTE_DOCUMENT)?;
	let interpreted = values(select("a.b[c=1]", &roots)?);
	let compiled = values(compile_selector("a.b[c=1]")?.apply(&roots));

	assert_eq!(interpreted, vec!["one", "four", "five"]);
	assert_eq!(compiled, interpreted);

	Ok(())
}

#[rstest]
#[case::child_names("library.shelf", &["fiction", "science"])]
#[case::any_child("library.*", &["fiction", "science"])]
#[case::first_step_filters_roots("shelf", &[])]
#[case::descendants("library.**.book", &["Dune", "Emma", "Cosmos"])]
#[case::descendants_include_self("library.**[:name=central]", &[""])]
#[case::attribute_projection("library.shelf.book.:year", &["1965", "1815", "1980"])]
#[case::at_projection("library.@name", &["central"])]
#[case::child_value_condition("library.shelf.book[author=Austen]", &["Emma"])]
#[case::not_equal("library.shelf.book[author!=Austen]", &["Dune", "Cosmos"])]
#[case::double_equals("library.shelf.book[:year==1980]", &["Cosmos"])]
#[case::attribute_only("library.shelf.book[:year=1965]", &["Dune"])]
#[case::attribute_reference_skips_children("library.shelf.book[:author=Sagan]", &[])]
#[case::exists("library.shelf.book[:tag]", &["Cosmos"])]
#[case::empty_literal("library.shelf.book[:tag=]", &["Dune", "Emma", "Cosmos"])]
#[case::not_empty_literal("library.shelf.book[:tag!=]", &[])]
#[case::nested_condition("library.shelf[book.author=Sagan]", &["science"])]
#[case::empty_step_condition("library.shelf.[book.:year=1815]", &["fiction"])]
#[case::star_condition("library.shelf[*=Cosmos]", &["science"])]
#[case::spaced_literal("library.shelf.book[author = Herbert]", &["Dune"])]
#[case::surrounding_whitespace("  library.shelf  ", &["fiction", "science"])]
fn selectors_walk_the_tree(#[case] selector: &str, #[case] expected: &[&str]) -> TerseResult<()> {
	let roots = compile_to_tree(LIBRARY_DOCUMENT)?;
	let interpreted = values(select(selector, &roots)?);
	let compiled = values(compile_selector(selector)?.apply(&roots));

	assert_eq!(interpreted, expected);
	assert_eq!(compiled, interpreted);

	Ok(())
}

#[test]
fn selector_projection_carries_the_attribute() -> TerseResult<()> {
	let roots = compile_to_tree(LIBRARY_DOCUMENT)?;
	let projected = select("library.:name", &roots)?.collect::<Vec<_>>();

	assert_eq!(
		projected,
		vec![
			Element::builder("name")
				.value("central")
				.attribute("name", "central")
				.build()
		]
	);

	Ok(())
}

#[test]
fn selector_back_tick_escapes() -> TerseResult<()> {
	let roots = vec![
		Element::builder("a.b").value("dotted").build(),
		Element::builder("a")
			.child(Element::builder("b").attribute("k", "x]y").build())
			.build(),
	];

	assert_eq!(values(select("a`.b", &roots)?), vec!["dotted"]);
	assert_eq!(values(select("a.b[:k=x`]y]", &roots)?), vec![""]);

	Ok(())
}

#[rstest]
#[case::empty("")]
#[case::blank("   ")]
#[case::only_dots(".")]
#[case::missing_reference("a[")]
#[case::unterminated_condition("a[b=1")]
#[case::stray_bracket("a]")]
#[case::missing_attribute_name("a.:")]
#[case::attribute_inside_path("a[:b.c=1]")]
#[case::two_conditions("a[b][c]")]
fn invalid_selectors_are_rejected(#[case] input: &str) {
	let error = select(input, &[]).expect_err("selector should be rejected");

	assert!(
		matches!(&error, TerseError::InvalidSelector { selector, .. } if selector == input),
		"{error:?}"
	);
}

#[test]
fn selector_cache_keeps_the_first_compilation() -> TerseResult<()> {
	let cache = SelectorCache::new();
	let first = cache.get_or_compile("a.b")?;
	let second = cache.get_or_compile("  a.b  ")?;

	assert!(first.ptr_eq(&second));
	assert_eq!(cache.len(), 1);
	assert_eq!(second.selector(), "a.b");

	Ok(())
}

#[test]
fn shared_selector_cache_is_reused() -> TerseResult<()> {
	let first = compile_selector("shared.cache.check")?;
	let second = compile_selector("shared.cache.check")?;

	assert!(first.ptr_eq(&second));
	assert!(!SelectorCache::shared().is_empty());

	Ok(())
}

#[test]
fn selector_cache_is_consistent_across_threads() -> TerseResult<()> {
	let roots = compile_to_tree(LIBRARY_DOCUMENT)?;
	let cache = SelectorCache::new();
	let selector = "library.shelf.book[:year=1965]";

	let results = std::thread::scope(|scope| {
		let handles = (0..8)
			.map(|_| {
				scope.spawn(|| {
					cache
						.get_or_compile(selector)
						.map(|compiled| (compiled.clone(), values(compiled.apply(&roots))))
				})
			})
			.collect::<Vec<_>>();

		handles
			.into_iter()
			.map(|handle| handle.join().expect("selector thread panicked"))
			.collect::<TerseResult<Vec<_>>>()
	})?;

	let published = cache.get_or_compile(selector)?;

	assert_eq!(cache.len(), 1);

	for (compiled, found) in results {
		assert_eq!(found, vec!["Dune"]);
		assert!(compiled.ptr_eq(&published));
	}

	Ok(())
}

#[rstest]
#[case::fallback_when_missing("a ${{missing.key|fallback}}\n", "fallback")]
#[case::lookup_wins("a ${{known.key|fallback}}\n", "value")]
#[case::key_is_trimmed("a ${{ known.key }}\n", "value")]
#[case::kept_without_default("a ${{missing}}\n", "${{missing}}")]
#[case::embedded("a x-${{known.key}}-y\n", "x-value-y")]
#[case::empty_default("a x${{missing|}}y\n", "xy")]
fn macros_expand_values(#[case] input: &str, #[case] expected: &str) -> TerseResult<()> {
	let lookup = macro_values();
	let roots = compile_to_tree_with(input, CompileOptions::new().macros(&lookup))?;

	assert_eq!(roots[0].value(), expected);

	Ok(())
}

#[test]
fn macros_expand_attributes_and_stream_output() -> TerseResult<()> {
	let lookup = macro_values();
	let input = "a ${{known.key}}\n  :k ${{missing|d}}\n";
	let mut writer = XmlWriter::new();
	compile_with(input, &mut writer, CompileOptions::new().macros(&lookup))?;

	assert_eq!(writer.finish(), "<a k=\"d\">value</a>\n");

	Ok(())
}

#[test]
fn macros_without_lookup_use_defaults() -> TerseResult<()> {
	let roots = compile_to_tree("a ${{k|d}}\n")?;

	assert_eq!(roots[0].value(), "d");

	Ok(())
}

struct FailingLookup;

impl MacroLookup for FailingLookup {
	fn lookup(&self, _: &str) -> Result<Option<String>, BoxError> {
		Err("lookup service unavailable".into())
	}
}

#[test]
fn macro_lookup_failures_propagate() {
	let error = compile_to_tree_with("a ${{remote}}\n", CompileOptions::new().macros(&FailingLookup))
		.expect_err("lookup failure");

	assert!(matches!(error, TerseError::Lookup { ref key, .. } if key == "remote"));
}

#[test]
fn chained_lookups_try_in_order() -> Result<(), BoxError> {
	let first = HashMap::from([("a".to_string(), "1".to_string())]);
	let second = HashMap::from([
		("a".to_string(), "2".to_string()),
		("b".to_string(), "3".to_string()),
	]);
	let chain = (&first, &second);

	assert_eq!(chain.lookup("a")?, Some("1".to_string()));
	assert_eq!(chain.lookup("b")?, Some("3".to_string()));
	assert_eq!(chain.lookup("c")?, None);

	Ok(())
}

#[test]
fn environment_lookup() -> Result<(), BoxError> {
	assert_eq!(
		EnvLookup.lookup("CARGO_PKG_NAME")?,
		Some("terse_core".to_string())
	);
	assert_eq!(EnvLookup.lookup("TERSE_SURELY_MISSING_VARIABLE")?, None);

	Ok(())
}

#[test]
fn anonymous_nodes_use_rule_names() -> TerseResult<()> {
	let roots = compile_to_tree("%item name\n. first\n- second\n")?;
	let expected = vec![
		Element::builder("item").attribute("name", "first").build(),
		Element::builder("item").attribute("name", "second").build(),
	];

	assert_eq!(roots, expected);

	Ok(())
}

#[rstest]
#[case::star_takes_rest("%entry key *\n- alpha the rest of line\n", &[("key", "alpha")], "the rest of line")]
#[case::names_run_out("%pair left right\n. a b c d\n", &[("left", "a"), ("right", "b")], "c d")]
#[case::fewer_words("%pair left right\n. a\n", &[("left", "a")], "")]
#[case::quoted_word("%pair left right\n. `a b` c\n", &[("left", "a b"), ("right", "c")], "")]
#[case::newest_rule_wins("%item first\n%item second\n. v\n", &[("second", "v")], "")]
#[case::named_node("%/server host port\nserver example.org 443\n", &[("host", "example.org"), ("port", "443")], "")]
fn positional_attributes(
	#[case] input: &str,
	#[case] attributes: &[(&str, &str)],
	#[case] value: &str,
) -> TerseResult<()> {
	let roots = compile_to_tree(input)?;
	let expected = attributes
		.iter()
		.map(|(name, value)| ((*name).to_string(), (*value).to_string()))
		.collect::<Vec<_>>();

	assert_eq!(roots[0].attributes(), expected.as_slice());
	assert_eq!(roots[0].value(), value);

	Ok(())
}

#[test]
fn attribute_lines_follow_positional_values() -> TerseResult<()> {
	let roots = compile_to_tree("%pair left\n. a\n  :left b\n")?;

	assert_eq!(
		roots[0].attributes(),
		&[
			("left".to_string(), "a".to_string()),
			("left".to_string(), "b".to_string())
		]
	);
	assert_eq!(roots[0].attribute("left"), Some("a"));

	Ok(())
}

const SERVERS: &str = "\
servers
  alpha
    endpoint localhost 80
  beta
    endpoint example.org 443
";

#[rstest]
#[case::permanent_wildcard("%/servers/(*)/endpoint host port\n", true)]
#[case::narrowing_wildcard("%/servers/*/endpoint host port\n", false)]
fn wildcard_rules_scope_named_nodes(#[case] rule: &str, #[case] permanent: bool) -> TerseResult<()> {
	let roots = compile_to_tree(&format!("{rule}{SERVERS}"))?;
	let found = select("servers.*.endpoint", &roots)?.collect::<Vec<_>>();

	assert_eq!(found[0].attribute("host"), Some("localhost"));
	assert_eq!(found[0].value(), "");

	if permanent {
		assert_eq!(found[1].attribute("host"), Some("example.org"));
		assert_eq!(found[1].attribute("port"), Some("443"));
	} else {
		assert!(found[1].attributes().is_empty());
		assert_eq!(found[1].value(), "example.org 443");
	}

	Ok(())
}

const LIST: &str = "\
list
  one
    - k1
  two
    - k2
";

#[test]
fn narrowed_rule_resolves_one_path() {
	let error = compile_to_tree(&format!("%/list/*/entry key\n{LIST}")).expect_err("second list has no rule");

	assert_eq!(error.line_column(), Some((6, 5)));
}

#[test]
fn permanent_rule_resolves_every_path() -> TerseResult<()> {
	let roots = compile_to_tree(&format!("%/list/(*)/entry key\n{LIST}"))?;
	let keys = select("list.*.entry.:key", &roots)?;

	assert_eq!(values(keys), vec!["k1", "k2"]);

	Ok(())
}

#[test]
fn mixed_wildcards_specialize_non_permanent_captures() -> AnyEmptyResult {
	let mut rules = RuleSet::default();
	rules.declare("", None, "/a/*/b/(**)/c", vec!["v".into()], false)?;

	assert!(rules.resolve_named("/a/x/b/y", "c").is_some());
	assert!(rules.resolve_named("/a/x/b/z/w", "c").is_some());
	assert!(rules.resolve_named("/a/other/b/y", "c").is_none());

	Ok(())
}

#[test]
fn relative_rules_resolve_under_their_scope() {
	let input = "\
group
  %member name
  - ada
other
  - grace
";
	let error = compile_to_tree(input).expect_err("rule only applies inside group");

	assert_eq!(error.line_column(), Some((5, 3)));
}

#[test]
fn named_rules_are_templates() -> TerseResult<()> {
	let input = "\
%pair:kv key val
. a 1
group
  %..pair extra
  kv b 2 3
again
  %pair
  - c 4
";
	let roots = compile_to_tree(input)?;
	let expected = vec![
		Element::builder("kv")
			.attribute("key", "a")
			.attribute("val", "1")
			.build(),
		Element::builder("group")
			.child(
				Element::builder("kv")
					.attribute("key", "b")
					.attribute("val", "2")
					.attribute("extra", "3")
					.build(),
			)
			.build(),
		Element::builder("again")
			.child(
				Element::builder("kv")
					.attribute("key", "c")
					.attribute("val", "4")
					.build(),
			)
			.build(),
	];

	assert_eq!(roots, expected);

	Ok(())
}

#[test]
fn ignore_case_directive_scopes() -> TerseResult<()> {
	let input = "\
outer
  %%ignore-case
  Inner 1
  /INNER
next
  Deep 2
";
	let roots = compile_to_tree(input)?;

	assert_eq!(roots[0].comparer(), Comparer::Ordinal);
	assert_eq!(roots[0].children()[0].comparer(), Comparer::IgnoreCase);
	assert!(roots[0].children()[0].is_named("inner"));
	assert_eq!(roots[1].comparer(), Comparer::Ordinal);
	assert_eq!(roots[1].children()[0].comparer(), Comparer::Ordinal);
	assert_eq!(values(select("OUTER.inner", &roots)?), Vec::<String>::new());
	assert_eq!(values(select("outer.inner", &roots)?), vec!["1"]);

	Ok(())
}

#[test]
fn ignore_case_option_and_case_sensitive_directive() -> TerseResult<()> {
	let roots = compile_to_tree_with("A 1\n/a\n%%case-sensitive\nB 2\n", CompileOptions::new().ignore_case(true))?;

	assert_eq!(roots[0].comparer(), Comparer::IgnoreCase);
	assert_eq!(roots[1].comparer(), Comparer::Ordinal);

	let error = compile_to_tree("A 1\n/a\n").expect_err("case-sensitive end tag");
	assert!(error.to_string().contains("does not match"));

	Ok(())
}

#[test]
fn lookups_use_the_parent_comparer() -> TerseResult<()> {
	let roots = compile_to_tree("%%ignore-case\nRoot\n  %%case-sensitive\n  Child 1\n")?;
	let child = &roots[0].children()[0];

	assert!(roots[0].comparer().is_ignore_case());
	assert!(!child.comparer().is_ignore_case());
	assert_eq!(roots[0].element("CHILD").value(), "1");
	assert_eq!(values(select("root.child", &roots)?), vec!["1"]);
	assert_eq!(values(compile_selector("ROOT.child")?.apply(&roots)), vec!["1"]);
	assert_eq!(values(select("root[child=1]", &roots)?), vec![""]);

	Ok(())
}

#[test]
fn option_handler_output_is_spliced() -> TerseResult<()> {
	let mut calls = vec![];
	let mut handler = |state: &ConverterState,
	                   directive: &str,
	                   parameters: &[String]|
	 -> Result<Option<Vec<Element>>, BoxError> {
		calls.push((state.clone(), directive.to_string(), parameters.to_vec()));
		Ok(Some(vec![leaf("included", &parameters.join(" "))]))
	};

	let roots = compile_to_tree_with(
		"%%include a.terse\nroot\n  %%include b c\n  child 1\n",
		CompileOptions::new()
			.source_name("main.terse")
			.option_handler(&mut handler),
	)?;

	let expected = vec![
		leaf("included", "a.terse"),
		Element::builder("root")
			.child(leaf("included", "b c"))
			.child(leaf("child", "1"))
			.build(),
	];

	assert_eq!(roots, expected);
	assert_eq!(calls.len(), 2);
	assert_eq!(calls[0].0.source_name.as_deref(), Some("main.terse"));
	assert_eq!(calls[0].0.path, "");
	assert_eq!(calls[1].0.path, "/root");
	assert_eq!(calls[1].1, "include");
	assert_eq!(calls[1].2, vec!["b".to_string(), "c".to_string()]);

	Ok(())
}

#[test]
fn option_handler_failures_name_the_directive() {
	let mut handler = |_: &ConverterState, _: &str, _: &[String]| -> Result<Option<Vec<Element>>, BoxError> {
		Err("not found".into())
	};
	let error = compile_to_tree_with(
		"%%include missing.terse\n",
		CompileOptions::new().option_handler(&mut handler),
	)
	.expect_err("handler failure");

	assert!(matches!(error, TerseError::OptionHandler { ref directive, .. } if directive == "include"));
}

#[test]
#[traced_test]
fn unknown_directives_are_ignored_with_a_warning() -> TerseResult<()> {
	let roots = compile_to_tree("%%mystery 1\na 1\n")?;

	assert_eq!(roots, vec![leaf("a", "1")]);
	assert!(logs_contain("ignoring unknown directive"));

	Ok(())
}

#[test]
fn compile_renders_xml() -> TerseResult<()> {
	let xml = compile("server primary\n  :port 8080\n  host localhost\n  tags [web, api]\n  empty\n")?;

	insta::assert_snapshot!(xml, @r#"
	<server port="8080">primary
	  <host>localhost</host>
	  <tags>
	    <item>web</item>
	    <item>api</item>
	  </tags>
	  <empty/>
	</server>
	"#);

	Ok(())
}

#[test]
fn xml_escapes_text_and_attributes() -> TerseResult<()> {
	let xml = compile("a `<b> & \"c\"\n  :q \"x\" <y>\nb <<EOT\n  1\n  2\nEOT>>\n")?;

	assert_eq!(
		xml,
		"<a q=\"&quot;x&quot; &lt;y&gt;\">&lt;b&gt; &amp; \"c\"</a>\n<b>1\n2</b>\n"
	);

	Ok(())
}

#[rstest]
#[case::spaced_attribute("a\n  :`x y` 1\n", "`x y` is not a valid XML name")]
#[case::numeric_attribute("a\n  :1st 1\n", "`1st` is not a valid XML name")]
#[case::duplicate_attribute("a\n  :k 1\n  :k 2\n", "element `a` has more than one `k` attribute")]
fn xml_rejects_ill_formed_output(#[case] input: &str, #[case] expected: &str) -> TerseResult<()> {
	let roots = compile_to_tree(input)?;
	let error = compile(input).expect_err("ill-formed XML");

	assert_eq!(error.to_string(), expected);
	assert!(write_element(&mut XmlWriter::new(), &roots[0]).is_err());

	Ok(())
}

#[test]
fn xml_rejects_invalid_element_names() {
	let error = write_element(&mut XmlWriter::new(), &leaf("1st", "x")).expect_err("invalid name");

	assert_eq!(error.to_string(), "`1st` is not a valid XML name");
}

#[test]
fn xml_keeps_line_breaks_in_attributes() -> TerseResult<()> {
	let element = Element::builder("a")
		.attribute("note", "one\n\ttwo")
		.value("text")
		.child(leaf("b", ""))
		.build();
	let mut writer = XmlWriter::new();
	write_element(&mut writer, &element)?;

	assert!(element.has_attribute("note"));
	assert!(!element.has_attribute("other"));
	assert_eq!(writer.finish(), "<a note=\"one&#10;&#9;two\">text\n  <b/>\n</a>\n");

	Ok(())
}

#[test]
fn round_trip_through_text() -> TerseResult<()> {
	let roots = compile_to_tree(ROUND_TRIP_DOCUMENT)?;
	let text = to_text(&roots);
	let again = compile_to_tree(&text)?;

	assert_eq!(roots[0].attribute("motd"), Some("Welcome\n  indented"));
	assert_eq!(roots[0].element("path").value(), "  spaced value");
	assert_eq!(roots[0].element("link").value(), "http://example.org # not a comment");
	assert_eq!(again, roots);

	Ok(())
}

#[test]
fn round_trip_keeps_indented_multi_line_values() -> TerseResult<()> {
	let roots = vec![
		Element::builder("code")
			.value("fn main() {\n    body();\n}")
			.attribute("indented", "first\n  second")
			.child(leaf("closing", "x\nEOT>>\ny"))
			.attribute("tabbed", "\n\tx")
			.child(leaf("padded", "  a\n  b"))
			.child(leaf("leading_blank", "\n  x"))
			.child(leaf("padded_gap", "  a\n\n  b"))
			.build(),
	];
	let again = compile_to_tree(&to_text(&roots))?;

	assert_eq!(again, roots);

	Ok(())
}

#[test]
fn empty_sentinel_is_identified_by_reference() {
	let named_nothing = Element::builder("").build();

	assert!(Element::empty().is_absent());
	assert!(!named_nothing.is_absent());
	assert_eq!(named_nothing, Element::empty());
	assert!(leaf("a", "1").element("missing").is_absent());
}

#[test]
fn element_accessors_use_the_comparer() {
	let element = Element::builder("Root")
		.attribute("Key", "first")
		.attribute("key", "second")
		.child(leaf("Child", "1"))
		.comparer(Comparer::IgnoreCase)
		.build();
	let ordinal = Element::builder("Root")
		.attribute("Key", "first")
		.attribute("key", "second")
		.child(leaf("Child", "1"))
		.build();

	assert_eq!(element.attribute("KEY"), Some("first"));
	assert_eq!(ordinal.attribute("key"), Some("second"));
	assert_eq!(element.element("child").value(), "1");
	assert!(ordinal.element("child").is_absent());
	assert_eq!(element, ordinal);
}

#[test]
fn elements_are_shareable() {
	fn assert_send_sync<T: Send + Sync>() {}
	assert_send_sync::<Element>();
	assert_send_sync::<CompiledSelector>();
	assert_send_sync::<SelectorCache>();
}

#[test]
fn descendants_are_in_document_order() -> TerseResult<()> {
	let roots = compile_to_tree("a 1\n  b 2\n    c 3\n  d 4\n")?;

	assert_eq!(values(roots[0].descendants_and_self()), vec!["1", "2", "3", "4"]);

	Ok(())
}

#[test]
fn elements_serialize_to_json() -> AnyEmptyResult {
	let roots = compile_to_tree("a 1\n  :k v\n  b 2\n")?;
	let json = serde_json::to_value(&roots)?;

	assert_eq!(
		json,
		serde_json::json!([{
			"name": "a",
			"value": "1",
			"attributes": [["k", "v"]],
			"children": [{ "name": "b", "value": "2" }]
		}])
	);

	Ok(())
}

#[test]
fn config_is_discovered_and_flattened() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	std::fs::create_dir_all(tmp.path().join(".config"))?;
	std::fs::write(
		tmp.path().join(".config/terse.toml"),
		"ignore_case = true\n\n[macros]\nname = \"terse\"\n\n[macros.server]\nport = 8080\nsecure = true\n",
	)?;

	let config = TerseConfig::load(tmp.path())?.ok_or("config should be found")?;

	assert!(config.ignore_case);
	assert_eq!(config.macros.get("name").map(String::as_str), Some("terse"));
	assert_eq!(config.macros.get("server.port").map(String::as_str), Some("8080"));
	assert_eq!(config.macros.get("server.secure").map(String::as_str), Some("true"));

	let roots = compile_to_tree_with(
		"app ${{name}}:${{server.port}}\n",
		CompileOptions::new().macros(&config),
	)?;
	assert_eq!(roots[0].value(), "terse:8080");

	Ok(())
}

#[test]
fn config_candidates_follow_precedence() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;

	assert_eq!(TerseConfig::load(tmp.path())?, None);

	std::fs::write(tmp.path().join(".terse.toml"), "ignore_case = false\n")?;
	std::fs::write(tmp.path().join("terse.toml"), "ignore_case = true\n")?;

	assert_eq!(
		TerseConfig::resolve_path(tmp.path()),
		Some(tmp.path().join("terse.toml"))
	);
	assert!(TerseConfig::load(tmp.path())?.is_some_and(|config| config.ignore_case));

	Ok(())
}

#[test]
fn invalid_config_is_reported() {
	let error = TerseConfig::parse("ignore_case = [").expect_err("invalid toml");

	assert!(matches!(error, TerseError::ConfigParse(_)));
}
