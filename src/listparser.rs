//! Translates index stanzas into cache records.
//!
//! This is the syntactic half of the cache build: each stanza names a
//! package and usually one version of it, and the parser here turns the
//! interesting fields into arena records through the builder primitives.

use tracing::warn;

use crate::cache::CacheBuilder;
use crate::config::Config;
use crate::error::Error;
use crate::raw::{dep, flag, pkg, prio, ver};
use crate::tagfile::TagSection;

/// One parsed dependency element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDep {
	pub name: String,
	pub version: String,
	pub op: u8,
}

fn skip_spaces(s: &str) -> &str { s.trim_start_matches([' ', '\t']) }

/// Does the host architecture match one architecture filter token?
///
/// Tokens are dpkg architecture tuples with wildcards: `amd64`,
/// `linux-any`, `any-amd64`, `gnu-linux-any`. The host is taken to be
/// `gnu-linux-<arch>`.
fn arch_matches(token: &str, host_arch: &str) -> bool {
	let parts: Vec<&str> = token.split('-').collect();
	let (libc, os, cpu) = match parts.len() {
		1 => ("gnu", "linux", parts[0]),
		2 => ("gnu", parts[0], parts[1]),
		3 => (parts[0], parts[1], parts[2]),
		_ => return false,
	};

	(libc == "any" || libc == "gnu")
		&& (os == "any" || os == "linux")
		&& (cpu == "any" || cpu == host_arch)
}

/// Evaluate an `[ arch list ]` filter against the host architecture.
///
/// A list of negated tokens excludes matching hosts; a positive list
/// includes only matching hosts.
fn eval_arch_list(list: &str, host_arch: &str) -> bool {
	let mut seen_any = false;
	let mut negated = false;
	let mut matched = false;

	for token in list.split_whitespace() {
		seen_any = true;
		let (neg, token) = match token.strip_prefix('!') {
			Some(rest) => (true, rest),
			None => (false, token),
		};
		negated |= neg;
		if arch_matches(token, host_arch) {
			matched = true;
		}
	}

	if !seen_any {
		return true;
	}
	// !list: keep unless the host matched. list: keep only on match.
	if negated { !matched } else { matched }
}

/// Evaluate one or more `< profile formula >` groups.
///
/// The dependency applies if any group is fully satisfied; inside a
/// group every term must hold.
fn eval_restrictions(groups: &[String], profiles: &[String]) -> bool {
	for group in groups {
		let mut ok = true;
		for term in group.split_whitespace() {
			let (neg, name) = match term.strip_prefix('!') {
				Some(rest) => (true, rest),
				None => (false, term),
			};
			let active = profiles.iter().any(|p| p == name);
			if active == neg {
				ok = false;
				break;
			}
		}
		if ok {
			return true;
		}
	}
	false
}

/// Knobs for [`parse_dep_element`].
#[derive(Debug, Clone)]
pub struct DependsOpts {
	pub host_arch: String,
	pub parse_arch_flags: bool,
	pub strip_multi_arch: bool,
	pub parse_restrictions: bool,
	pub profiles: Vec<String>,
}

impl DependsOpts {
	pub fn from_config(config: &Config) -> DependsOpts {
		DependsOpts {
			host_arch: config.architecture(),
			parse_arch_flags: true,
			strip_multi_arch: true,
			parse_restrictions: true,
			profiles: config.build_profiles(),
		}
	}
}

/// Parse a single element of a dependency list.
///
/// Returns the rest of the input, the element if it applies to this
/// host (filters can make it vanish entirely), and whether the element
/// was joined to its successor with `|`.
pub fn parse_dep_element<'a>(
	input: &'a str,
	opts: &DependsOpts,
) -> Result<(&'a str, Option<ParsedDep>, bool), Error> {
	let mut s = skip_spaces(input);

	// Package name runs until whitespace or punctuation.
	let name_end = s
		.find(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ',' | '|' | '[' | '<'))
		.unwrap_or(s.len());
	let mut name = &s[..name_end];
	if name.is_empty() || name.contains(')') {
		return Err(Error::parse(format!("bad dependency element '{input}'")));
	}
	s = skip_spaces(&s[name_end..]);

	// Multi-arch qualifier.
	if opts.strip_multi_arch {
		if let Some((bare, _qualifier)) = name.split_once(':') {
			name = bare;
		}
	}

	// Parenthesised version restriction.
	let mut op = dep::NO_OP;
	let mut version = String::new();
	if let Some(rest) = s.strip_prefix('(') {
		let mut r = skip_spaces(rest);

		// < is the same as <= and << is really a strict less. Same for >.
		if let Some(tail) = r.strip_prefix("<=") {
			op = dep::LESS_EQ;
			r = tail;
		} else if let Some(tail) = r.strip_prefix("<<") {
			op = dep::LESS;
			r = tail;
		} else if let Some(tail) = r.strip_prefix(">=") {
			op = dep::GREATER_EQ;
			r = tail;
		} else if let Some(tail) = r.strip_prefix(">>") {
			op = dep::GREATER;
			r = tail;
		} else if let Some(tail) = r.strip_prefix('<') {
			op = dep::LESS_EQ;
			r = tail;
		} else if let Some(tail) = r.strip_prefix('>') {
			op = dep::GREATER_EQ;
			r = tail;
		} else if let Some(tail) = r.strip_prefix('=') {
			op = dep::EQUALS;
			r = tail;
		} else {
			// Tolerated legacy form: a bare version means equality.
			op = dep::EQUALS;
		}

		r = skip_spaces(r);
		let Some(close) = r.find(')') else {
			return Err(Error::parse(format!("unterminated version in '{input}'")));
		};
		version = r[..close].trim().to_string();
		if version.is_empty() {
			return Err(Error::parse(format!("empty version in '{input}'")));
		}
		s = skip_spaces(&r[close + 1..]);
	}

	// Architecture filter list.
	let mut applies = true;
	if let Some(rest) = s.strip_prefix('[') {
		let Some(close) = rest.find(']') else {
			return Err(Error::parse(format!("unterminated arch list in '{input}'")));
		};
		if opts.parse_arch_flags {
			applies = eval_arch_list(&rest[..close], &opts.host_arch);
		} else {
			return Err(Error::parse(format!(
				"architecture filter not allowed here: '{input}'"
			)));
		}
		s = skip_spaces(&rest[close + 1..]);
	}

	// Build profile restriction formulas. There may be several groups.
	let mut groups = Vec::new();
	while let Some(rest) = s.strip_prefix('<') {
		let Some(close) = rest.find('>') else {
			return Err(Error::parse(format!(
				"unterminated restriction list in '{input}'"
			)));
		};
		if !opts.parse_restrictions {
			return Err(Error::parse(format!(
				"restriction list not allowed here: '{input}'"
			)));
		}
		groups.push(rest[..close].to_string());
		s = skip_spaces(&rest[close + 1..]);
	}
	if !groups.is_empty() && !eval_restrictions(&groups, &opts.profiles) {
		applies = false;
	}

	// Or group detection and element terminator.
	let mut or_with_next = false;
	if let Some(rest) = s.strip_prefix('|') {
		or_with_next = true;
		s = rest;
	} else if let Some(rest) = s.strip_prefix(',') {
		s = rest;
	} else if !s.is_empty() {
		return Err(Error::parse(format!("garbage after dependency: '{s}'")));
	}

	let parsed = applies.then(|| ParsedDep {
		name: name.to_string(),
		version,
		op,
	});

	Ok((s, parsed, or_with_next))
}

/// Parse a whole dependency line into or groups.
///
/// Alternatives that filters remove for this host are dropped; a group
/// whose every alternative is filtered out vanishes.
pub fn parse_depends(line: &str, opts: &DependsOpts) -> Result<Vec<Vec<ParsedDep>>, Error> {
	let mut groups = Vec::new();
	let mut current = Vec::new();
	let mut rest = line.trim();

	while !rest.is_empty() {
		let (tail, parsed, or_next) = parse_dep_element(rest, opts)?;
		if let Some(parsed) = parsed {
			current.push(parsed);
		}
		if !or_next && !current.is_empty() {
			groups.push(std::mem::take(&mut current));
		}
		rest = skip_spaces(tail);
	}
	if !current.is_empty() {
		groups.push(current);
	}

	Ok(groups)
}

fn word_value(word: &str, table: &[(&str, u8)]) -> Option<u8> {
	table
		.iter()
		.find(|(name, _)| word.eq_ignore_ascii_case(name))
		.map(|(_, value)| *value)
}

/// Parse a `Status: want flag state` triple.
pub fn parse_status(line: &str) -> Result<(u8, u8, u8), Error> {
	let mut words = line.split_whitespace();
	let (Some(want), Some(flag_word), Some(state)) = (words.next(), words.next(), words.next())
	else {
		return Err(Error::parse(format!("malformed Status line '{line}'")));
	};
	if words.next().is_some() {
		return Err(Error::parse(format!("malformed Status line '{line}'")));
	}

	let selected = word_value(want, &[
		("unknown", 0),
		("install", 1),
		("hold", 2),
		("deinstall", 3),
		("purge", 4),
	])
	.ok_or_else(|| Error::parse(format!("malformed 1st word in the Status line '{line}'")))?;

	let inst = word_value(flag_word, &[
		("ok", 0),
		("reinstreq", 1),
		("hold", 2),
		("hold-reinstreq", 3),
	])
	.ok_or_else(|| Error::parse(format!("malformed 2nd word in the Status line '{line}'")))?;

	let current = word_value(state, &[
		("not-installed", 0),
		("unpacked", 1),
		("half-configured", 2),
		("half-installed", 4),
		("config-files", 5),
		("installed", 6),
		// Obsolete spellings the status file may still carry.
		("post-inst-failed", 2),
		("removal-failed", 4),
	])
	.ok_or_else(|| Error::parse(format!("malformed 3rd word in the Status line '{line}'")))?;

	Ok((selected, inst, current))
}

fn parse_priority(word: &str) -> Option<u8> {
	word_value(word, &[
		("required", prio::REQUIRED),
		("important", prio::IMPORTANT),
		("standard", prio::STANDARD),
		("optional", prio::OPTIONAL),
		("extra", prio::EXTRA),
	])
}

/// Drives a [`CacheBuilder`] from parsed stanzas.
pub struct ListParser {
	opts: DependsOpts,
	native_arch: String,
}

const DEP_FIELDS: [(&str, u8); 9] = [
	("Depends", dep::DEPENDS),
	("Pre-Depends", dep::PRE_DEPENDS),
	("Suggests", dep::SUGGESTS),
	("Recommends", dep::RECOMMENDS),
	("Conflicts", dep::CONFLICTS),
	("Replaces", dep::REPLACES),
	("Obsoletes", dep::OBSOLETES),
	("Breaks", dep::DPKG_BREAKS),
	("Enhances", dep::ENHANCES),
];

impl ListParser {
	pub fn new(config: &Config) -> ListParser {
		ListParser {
			opts: DependsOpts::from_config(config),
			native_arch: config.architecture(),
		}
	}

	fn handle_flag(section: &TagSection, field: &str, flags: &mut u32, bit: u32) {
		match section.get(field).map(str::trim) {
			Some("yes") | Some("true") => *flags |= bit,
			Some("no") | Some("false") => *flags &= !bit,
			Some(_) => warn!("unknown flag value for {field}"),
			None => {},
		}
	}

	/// Load one stanza into the cache under construction.
	///
	/// `file` is the PackageFile record of the index this stanza came
	/// from, or zero when the stanza has no origin.
	pub fn load_section(
		&self,
		b: &mut CacheBuilder,
		section: &TagSection,
		file: u32,
	) -> Result<(), Error> {
		let Some(name) = section.get("Package") else {
			return Err(Error::parse("encountered a section with no Package: header"));
		};
		let arch = section.get_default("Architecture", &self.native_arch).to_string();

		let pkg_off = b.find_or_create_pkg(name, &arch)?;

		// Package level properties may arrive with any stanza.
		if b.get(pkg_off + pkg::SECTION) == 0 {
			if let Some(section_name) = section.get("Section") {
				let s = b.add_string(section_name)?;
				b.set(pkg_off + pkg::SECTION, s);
			}
		}

		let mut flags = b.get(pkg_off + pkg::FLAGS);
		Self::handle_flag(section, "Essential", &mut flags, flag::ESSENTIAL);
		Self::handle_flag(section, "Important", &mut flags, flag::IMPORTANT);
		Self::handle_flag(section, "Immediate-Configure", &mut flags, flag::IMMEDIATE_CONF);
		b.set(pkg_off + pkg::FLAGS, flags);

		let version_str = match section.get("Version") {
			Some(v) => v.trim().to_string(),
			// A stanza without a version only describes package
			// properties.
			None => return Ok(()),
		};

		let (ver_off, is_new) = b.find_or_create_version(pkg_off, &version_str)?;

		if is_new {
			if let Some(section_name) = section.get("Section") {
				let s = b.add_string(section_name)?;
				b.set(ver_off + ver::SECTION, s);
			}
			let size: u32 = section
				.get("Size")
				.and_then(|s| s.trim().parse().ok())
				.unwrap_or(0);
			b.set(ver_off + ver::SIZE_BYTES, size);

			// Installed-Size arrives in KiB.
			let inst_size: u32 = section
				.get("Installed-Size")
				.and_then(|s| s.trim().parse().ok())
				.unwrap_or(0);
			b.set(ver_off + ver::INSTALLED_SIZE, inst_size.saturating_mul(1024));

			if let Some(word) = section.get("Priority") {
				match parse_priority(word.trim()) {
					Some(p) => b.set8(ver_off + ver::PRIORITY, p),
					None => warn!("malformed Priority line '{word}'"),
				}
			}

			for (field, dep_type) in DEP_FIELDS {
				let Some(line) = section.get(field) else { continue };
				for group in parse_depends(line, &self.opts)? {
					let last = group.len() - 1;
					for (i, alt) in group.iter().enumerate() {
						let target = b.find_or_create_pkg(&alt.name, &self.native_arch)?;
						let op = if i < last { alt.op | dep::OR } else { alt.op };
						b.new_dep(ver_off, target, &alt.version, op, dep_type)?;
					}
				}
			}

			if let Some(line) = section.get("Provides") {
				for group in parse_depends(line, &self.opts)? {
					for alt in group {
						if alt.op != dep::NO_OP && alt.op != dep::EQUALS {
							warn!("ignoring provides with a non equality restriction");
							continue;
						}
						let target = b.find_or_create_pkg(&alt.name, &self.native_arch)?;
						b.new_provides(ver_off, target, &alt.version)?;
					}
				}
			}
		}

		if let Some(status) = section.get("Status") {
			let (selected, inst, current) = parse_status(status)?;
			b.set8(pkg_off + pkg::SELECTED_STATE, selected);
			b.set8(pkg_off + pkg::INST_STATE, inst);
			b.set8(pkg_off + pkg::CURRENT_STATE, current);

			// Only a really present state makes this the current version,
			// the status file otherwise creates bogus entries.
			if current != 0 && current != 5 {
				b.set(pkg_off + pkg::CURRENT_VER, ver_off);
			}
		}

		if file != 0 {
			b.new_verfile(ver_off, file, section.offset() as u32, section.size() as u32)?;
		}

		Ok(())
	}
}
