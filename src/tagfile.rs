//! Contains structs and functions to parse Debian styled RFC 822 files.

use std::fmt;

#[derive(Debug)]
/// The result of a parsing error.
pub struct ParserError {
	pub msg: String,
	pub line: Option<usize>,
}

impl fmt::Display for ParserError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		if let Some(num) = self.line {
			write!(f, "{} at line '{num}'", self.msg)?
		} else {
			write!(f, "{}", self.msg)?
		}
		Ok(())
	}
}

impl std::error::Error for ParserError {}

/// A section in a TagFile. A TagFile is made up of blank line separated
/// paragraphs, each of which make up one of these sections.
///
/// Fields keep the order they appear in so that a section can be written
/// back out the way it came in. The byte range of the section within the
/// file it was parsed from is retained for index records.
#[derive(Debug)]
pub struct TagSection {
	data: Vec<(String, String)>,
	start: usize,
	end: usize,
}

fn line_is_key(line: &str) -> bool { !line.starts_with(' ') && !line.starts_with('\t') }

impl TagSection {
	fn error<T>(msg: &str, line: Option<usize>) -> Result<T, ParserError> {
		Err(ParserError {
			msg: msg.to_string(),
			line,
		})
	}

	/// Create a new [`TagSection`] from exactly one paragraph.
	pub fn new(section: &str) -> Result<Self, ParserError> {
		if section.is_empty() {
			return Self::error("An empty string was passed", None);
		}

		if section.trim_end_matches('\n').contains("\n\n") {
			return Self::error("More than one section was found", None);
		}

		Self::parse(section, 0)
	}

	fn parse(section: &str, start: usize) -> Result<Self, ParserError> {
		let mut data: Vec<(String, String)> = Vec::new();

		for (index, line) in section.lines().enumerate() {
			let line_number = index + 1;

			// Comments are allowed in control files and simply skipped.
			if line.starts_with('#') {
				continue;
			}
			if line.is_empty() {
				continue;
			}

			if line_is_key(line) {
				let Some((key, value)) = line.split_once(':') else {
					return Self::error(
						"Line doesn't contain a ':' separator",
						Some(line_number),
					);
				};
				let value = value.strip_prefix(' ').unwrap_or(value);
				data.push((key.to_string(), value.to_string()));
			} else {
				// Indented lines extend the value of the previous key.
				let Some(last) = data.last_mut() else {
					return Self::error(
						"No key defined for the currently indented line",
						Some(line_number),
					);
				};
				last.1.push('\n');
				last.1.push_str(line);
			}
		}

		Ok(Self {
			data,
			start,
			end: start + section.len(),
		})
	}

	/// Get the value of the specified key.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.data
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(key))
			.map(|(_, v)| v.as_str())
	}

	/// Get the value of the specified key,
	///
	/// Returns specified default on failure.
	pub fn get_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
		self.get(key).unwrap_or(default)
	}

	/// The fields of the section in file order.
	pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
		self.data.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Byte offset of this section inside the parsed file.
	pub fn offset(&self) -> usize { self.start }

	/// Byte length of this section inside the parsed file.
	pub fn size(&self) -> usize { self.end - self.start }
}

/// Parses a TagFile: these are files such as Debian `control`, `Packages`
/// and `status` files.
///
/// A malformed section is skipped with a warning rather than failing
/// the whole file; the remaining sections still parse.
///
/// # Returns
/// * A [`Result`]: The [`Ok`] variant containing the vector of
///   [`TagSection`] objects if there was no issue parsing the file, and
///   the [`Err`] variant if there was.
pub fn parse_tagfile(content: &str) -> Result<Vec<TagSection>, ParserError> {
	let mut sections = vec![];
	let mut pos = 0;
	let mut line_base = 0;

	let bytes = content.as_bytes();
	while pos < bytes.len() {
		// Skip blank lines between sections.
		while pos < bytes.len() && bytes[pos] == b'\n' {
			pos += 1;
			line_base += 1;
		}
		if pos >= bytes.len() {
			break;
		}

		// The section runs until a blank line or the end of input.
		let rest = &content[pos..];
		let len = match rest.find("\n\n") {
			Some(end) => end + 1,
			None => rest.len(),
		};

		let section = &content[pos..pos + len];
		match TagSection::parse(section, pos) {
			Ok(parsed) => sections.push(parsed),
			Err(err) => {
				let line = line_base + err.line.unwrap_or(0);
				tracing::warn!("skipping malformed section at line {line}: {}", err.msg);
			},
		}

		line_base += section.lines().count();
		pos += len;
	}

	Ok(sections)
}
