use crate::Element;

pub fn leaf(name: &str, value: &str) -> Element {
	Element::builder(name).value(value).build()
}

pub fn items(name: &str, values: &[&str]) -> Element {
	Element::builder(name)
		.children(values.iter().map(|value| leaf("item", value)))
		.build()
}

pub fn values(elements: impl IntoIterator<Item = Element>) -> Vec<String> {
	elements
		.into_iter()
		.map(|element| element.value().to_string())
		.collect()
}

/// Several `/a/b` nodes, some carrying `c="1"`.
pub const ATTRIBUTE_DOCUMENT: &str = "\
a
  b one
    :c 1
  b two
    :c 2
  b three
  b four
    :c 1
a
  b five
    :c 1
";

pub const LIBRARY_DOCUMENT: &str = "\
library
  :name central
  shelf fiction
    book Dune
      :year 1965
      author Herbert
    book Emma
      :year 1815
      author Austen
  shelf science
    book Cosmos
      :year 1980
      :tag
      author Sagan
";

pub const ROUND_TRIP_DOCUMENT: &str = "\
server primary
  :port 8080
  :motd <<EOT
    Welcome
      indented
  EOT>>
  host localhost
  notes first line
    .. second line
  tags [web, api]
  path `  spaced value
  link `http://example.org # not a comment
  empty
";
