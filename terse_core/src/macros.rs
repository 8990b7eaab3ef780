use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::LazyLock;

use regex::Regex;

use crate::BoxError;
use crate::TerseError;
use crate::TerseResult;

/// `${{key}}` or `${{key|default}}`.
static MACRO_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\$\{\{([^|}]*)(?:\|([^}]*))?\}\}").expect("the macro pattern is valid")
});

/// Resolves the keys of `${{key|default}}` macros.
///
/// `Ok(None)` means the key is unknown and the macro falls back to its
/// default. Errors abort the compilation and are returned to the caller as
/// [`TerseError::Lookup`].
pub trait MacroLookup {
	fn lookup(&self, key: &str) -> Result<Option<String>, BoxError>;
}

impl<S: BuildHasher> MacroLookup for HashMap<String, String, S> {
	fn lookup(&self, key: &str) -> Result<Option<String>, BoxError> {
		Ok(self.get(key).cloned())
	}
}

impl MacroLookup for BTreeMap<String, String> {
	fn lookup(&self, key: &str) -> Result<Option<String>, BoxError> {
		Ok(self.get(key).cloned())
	}
}

impl<T: MacroLookup + ?Sized> MacroLookup for &T {
	fn lookup(&self, key: &str) -> Result<Option<String>, BoxError> {
		(**self).lookup(key)
	}
}

/// Try the first lookup, then the second.
impl<A: MacroLookup, B: MacroLookup> MacroLookup for (A, B) {
	fn lookup(&self, key: &str) -> Result<Option<String>, BoxError> {
		match self.0.lookup(key)? {
			Some(value) => Ok(Some(value)),
			None => self.1.lookup(key),
		}
	}
}

/// Looks macro keys up in the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvLookup;

impl MacroLookup for EnvLookup {
	fn lookup(&self, key: &str) -> Result<Option<String>, BoxError> {
		match std::env::var(key) {
			Ok(value) => Ok(Some(value)),
			Err(std::env::VarError::NotPresent) => Ok(None),
			Err(error) => Err(error.into()),
		}
	}
}

/// Replace every macro in `text`. The looked up value wins over the default.
/// A macro with neither is left as written.
pub fn expand_macros<'a>(
	text: &'a str,
	lookup: Option<&dyn MacroLookup>,
) -> TerseResult<Cow<'a, str>> {
	if !text.contains("${{") {
		return Ok(Cow::Borrowed(text));
	}

	let mut result = String::with_capacity(text.len());
	let mut last = 0;

	for captures in MACRO_PATTERN.captures_iter(text) {
		let Some(whole) = captures.get(0) else {
			continue;
		};
		let key = captures.get(1).map_or("", |found| found.as_str()).trim();
		let found = match lookup {
			Some(lookup) => {
				lookup.lookup(key).map_err(|source| {
					TerseError::Lookup {
						key: key.to_string(),
						source,
					}
				})?
			}
			None => None,
		};

		result.push_str(&text[last..whole.start()]);

		match (found, captures.get(2)) {
			(Some(value), _) => result.push_str(&value),
			(None, Some(default)) => result.push_str(default.as_str()),
			(None, None) => result.push_str(whole.as_str()),
		}

		last = whole.end();
	}

	result.push_str(&text[last..]);
	Ok(Cow::Owned(result))
}
