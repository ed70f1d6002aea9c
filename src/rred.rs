//! Applies restricted ed style patches to index files.
//!
//! The accepted grammar is the subset diff emits: `<n>a`, `<n>d`,
//! `<n>,<m>d` and `<n>,<m>c`, with the payload of `a` and `c` terminated
//! by a lone `.`. Commands must arrive reverse sorted by line number and
//! may not overlap. The whole script is parsed into a vector first and
//! then applied back to front, so base file line numbers stay valid
//! while the base is streamed forward exactly once.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use filetime::FileTime;
use memmap2::Mmap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::Error;

const MODE_ADDED: u8 = b'a';
const MODE_DELETED: u8 = b'd';
const MODE_CHANGED: u8 = b'c';

#[derive(Debug, Clone)]
struct EdCommand {
	kind: u8,
	first_line: u64,
	last_line: u64,
	data_start: usize,
	data_end: usize,
}

/// The outcome of a successful patch run.
#[derive(Debug, Clone)]
pub struct PatchResult {
	/// Bytes written to the output.
	pub size: u64,
	/// Hex SHA-256 over the exact byte sequence written.
	pub sha256: String,
}

fn corrupt(msg: impl Into<String>) -> Error { Error::CorruptPatch { msg: msg.into() } }

/// Parse the entire script into commands, validating grammar and order.
fn parse_script(script: &[u8]) -> Result<Vec<EdCommand>, Error> {
	let mut commands: Vec<EdCommand> = Vec::new();
	let mut pos = 0;

	while pos < script.len() {
		if script[pos] == b'\n' {
			pos += 1;
			continue;
		}

		let line_end = script[pos..]
			.iter()
			.position(|&b| b == b'\n')
			.map(|p| pos + p)
			.unwrap_or(script.len());
		let line = &script[pos..line_end];

		// <n> or <n>,<m>
		let mut idx = 0;
		while idx < line.len() && line[idx].is_ascii_digit() {
			idx += 1;
		}
		if idx == 0 {
			return Err(corrupt("command does not start with a line number"));
		}
		let first_line: u64 = std::str::from_utf8(&line[..idx])
			.ok()
			.and_then(|s| s.parse().ok())
			.ok_or_else(|| corrupt("start line is an invalid number"))?;

		let mut last_line = first_line;
		if idx < line.len() && line[idx] == b',' {
			let num_start = idx + 1;
			idx += 1;
			while idx < line.len() && line[idx].is_ascii_digit() {
				idx += 1;
			}
			last_line = std::str::from_utf8(&line[num_start..idx])
				.ok()
				.and_then(|s| s.parse().ok())
				.ok_or_else(|| corrupt("stop line is an invalid number"))?;
		}
		if last_line < first_line {
			return Err(corrupt("stop line precedes start line"));
		}

		if idx + 1 != line.len() {
			return Err(corrupt("garbage after ed command"));
		}
		let kind = line[idx];
		match kind {
			MODE_ADDED => {
				if last_line != first_line {
					return Err(corrupt("ranged append is not a thing"));
				}
			},
			MODE_DELETED | MODE_CHANGED => {
				if first_line == 0 {
					return Err(corrupt("line numbers start at one"));
				}
			},
			other => {
				return Err(corrupt(format!("unknown ed command '{}'", other as char)));
			},
		}

		pos = line_end + 1;

		// Payload until a lone dot.
		let (data_start, data_end) = if kind == MODE_ADDED || kind == MODE_CHANGED {
			let data_start = pos;
			loop {
				if pos >= script.len() {
					return Err(corrupt("unterminated data block"));
				}
				let end = script[pos..]
					.iter()
					.position(|&b| b == b'\n')
					.map(|p| pos + p)
					.unwrap_or(script.len());
				if &script[pos..end] == b"." {
					let data_end = pos;
					pos = end + 1;
					break (data_start, data_end);
				}
				pos = end + 1;
			}
		} else {
			(0, 0)
		};

		// Start lines strictly decrease and ranges may not overlap.
		if let Some(prev) = commands.last() {
			if first_line >= prev.first_line || last_line >= prev.first_line {
				return Err(corrupt(format!(
					"commands out of order, {} follows {}",
					first_line, prev.first_line
				)));
			}
		}

		commands.push(EdCommand {
			kind,
			first_line,
			last_line,
			data_start,
			data_end,
		});
	}

	Ok(commands)
}

/// Advance past `count` lines of `input` starting at `pos`, returning
/// the new offset.
fn skip_lines(input: &[u8], mut pos: usize, count: u64) -> usize {
	for _ in 0..count {
		match input[pos..].iter().position(|&b| b == b'\n') {
			Some(p) => pos += p + 1,
			None => return input.len(),
		}
	}
	pos
}

/// Apply a parsed script over the base bytes, writing the result.
fn apply(
	base: &[u8],
	script: &[u8],
	commands: &[EdCommand],
	out: &mut impl Write,
) -> Result<PatchResult, Error> {
	let mut hash = Sha256::new();
	let mut size: u64 = 0;
	let mut emit = |out: &mut dyn Write, bytes: &[u8]| -> Result<(), Error> {
		out.write_all(bytes)
			.map_err(|e| Error::io("write", "patched output", e))?;
		hash.update(bytes);
		size += bytes.len() as u64;
		Ok(())
	};

	let mut line: u64 = 1;
	let mut pos = 0;

	// The script is reverse sorted, so the last parsed command touches
	// the earliest lines and is executed first.
	for cmd in commands.iter().rev() {
		let copy_until = if cmd.kind == MODE_ADDED {
			cmd.first_line + 1
		} else {
			cmd.first_line
		};

		if line < copy_until {
			let end = skip_lines(base, pos, copy_until - line);
			emit(out, &base[pos..end])?;
			pos = end;
			line = copy_until;
		}

		if cmd.kind == MODE_DELETED || cmd.kind == MODE_CHANGED {
			let dropped = cmd.last_line - cmd.first_line + 1;
			pos = skip_lines(base, pos, dropped);
			line += dropped;
		}

		if cmd.kind == MODE_CHANGED || cmd.kind == MODE_ADDED {
			emit(out, &script[cmd.data_start..cmd.data_end])?;
		}
	}

	// The unchanged tail.
	emit(out, &base[pos..])?;

	Ok(PatchResult {
		size,
		sha256: hash
			.finalize()
			.iter()
			.map(|b| format!("{b:02x}"))
			.collect(),
	})
}

/// Apply an ed script to in memory bytes. The slower but allocation
/// friendly path; output is byte identical to [`patch_file`].
pub fn patch_bytes(base: &[u8], script: &[u8]) -> Result<(Vec<u8>, PatchResult), Error> {
	let commands = parse_script(script)?;
	let mut out = Vec::with_capacity(base.len());
	let result = apply(base, script, &commands, &mut out)?;
	Ok((out, result))
}

enum Input {
	Mapped(Mmap),
	Read(Vec<u8>),
}

impl Input {
	fn bytes(&self) -> &[u8] {
		match self {
			Input::Mapped(map) => map,
			Input::Read(vec) => vec,
		}
	}
}

/// Map a file when possible, falling back to a plain read. Both roads
/// hand out the same bytes.
fn open_input(path: &Path) -> Result<Input, Error> {
	let file = File::open(path).map_err(|e| Error::io("open", path, e))?;
	let len = file.metadata().map_err(|e| Error::io("stat", path, e))?.len();
	if len > 0 {
		if let Ok(map) = unsafe { Mmap::map(&file) } {
			return Ok(Input::Mapped(map));
		}
		debug!("mmap of {} unavailable, using file mode", path.display());
	}
	Ok(Input::Read(
		fs::read(path).map_err(|e| Error::io("read", path, e))?,
	))
}

/// Patch `base` with the ed script in `patch`, producing `out`.
///
/// The result carries the access time of the base and the modification
/// time of the patch, so later freshness checks see the patched file
/// the way they would have seen a fresh download.
pub fn patch_file(base: &Path, patch: &Path, out: &Path) -> Result<PatchResult, Error> {
	let base_input = open_input(base)?;
	let patch_input = open_input(patch)?;

	let commands = parse_script(patch_input.bytes())?;
	debug!("applying {} ed commands to {}", commands.len(), base.display());

	let out_file = File::create(out).map_err(|e| Error::io("create", out, e))?;
	let mut writer = BufWriter::new(out_file);
	let result = apply(base_input.bytes(), patch_input.bytes(), &commands, &mut writer)?;
	writer
		.into_inner()
		.map_err(|e| Error::io("flush", out, e.into_error()))?;

	// Times: access from the base, modification from the patch.
	let base_meta = fs::metadata(base).map_err(|e| Error::io("stat", base, e))?;
	let patch_meta = fs::metadata(patch).map_err(|e| Error::io("stat", patch, e))?;
	filetime::set_file_times(
		out,
		FileTime::from_last_access_time(&base_meta),
		FileTime::from_last_modification_time(&patch_meta),
	)
	.map_err(|e| Error::io("utime", out, e))?;

	Ok(result)
}
