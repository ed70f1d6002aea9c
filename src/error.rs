//! There be Errors here.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// The kinds of failure the core can produce.
///
/// These carry machine readable fields; rendering for humans happens at
/// the UI boundary via [`std::fmt::Display`].
#[derive(Debug, Error)]
pub enum Error {
	/// A system call failed. Carries the operation and the path involved.
	#[error("{op} failed on {}: {source}", path.display())]
	Io {
		op: &'static str,
		path: PathBuf,
		#[source]
		source: io::Error,
	},

	/// A persisted cache is structurally inconsistent.
	///
	/// Always recoverable by a full rebuild.
	#[error("cache file {} is corrupt: {reason}", path.display())]
	CorruptCache { path: PathBuf, reason: String },

	/// The cache was built with different structure sizes.
	#[error("cache file {} was built by an incompatible version", path.display())]
	SchemaMismatch { path: PathBuf },

	/// The arena refused to grow any further.
	#[error("out of space while building the cache")]
	OutOfSpace,

	/// A malformed stanza, dependency line, or state file record.
	#[error("parse error: {msg}")]
	Parse { msg: String, line: Option<usize> },

	/// The solver could not find a consistent decision set.
	#[error("unable to satisfy dependencies: {witness}")]
	Unsatisfiable { witness: String },

	/// A planned change collides with a package hold.
	#[error("package {pkg} is held back")]
	Held { pkg: String },

	/// Extraction-time collision not authorised by any Replaces.
	#[error("trying to overwrite {path}, which is also in package {other_pkg}")]
	OverwriteConflict { other_pkg: String, path: String },

	/// A critical predepends loop that ordering cannot break.
	#[error("fatal ordering loop: {msg}")]
	FatalOrdering { msg: String },

	/// A worker subprocess died or misbehaved.
	#[error("worker {worker} failed with status {status}")]
	WorkerFailure { worker: String, status: i32 },

	/// The process wide lock is held by someone else.
	#[error("could not acquire lock {}, held by another process", path.display())]
	LockBusy { path: PathBuf },

	/// A restricted ed script failed validation.
	#[error("corrupt patch: {msg}")]
	CorruptPatch { msg: String },

	/// Memory mapping was refused; callers fall back to file mode.
	#[error("memory map unavailable")]
	MmapUnavailable,

	/// An ActionGroup was left open, or an internal invariant broke.
	#[error("internal inconsistency: {msg}")]
	InconsistentState { msg: String },

	/// A bug, not a user problem.
	#[error("internal error: {msg}")]
	InternalInvariant { msg: String },
}

impl Error {
	pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Error {
		Error::Io {
			op,
			path: path.into(),
			source,
		}
	}

	pub(crate) fn parse(msg: impl Into<String>) -> Error {
		Error::Parse {
			msg: msg.into(),
			line: None,
		}
	}
}

/// Representation of a single Error or Warning on the stack.
#[derive(Debug)]
pub struct AptError {
	/// * [`true`] = Error.
	/// * [`false`] = Warning, Notice, etc.
	pub is_error: bool,
	/// The String version of the Error.
	pub msg: String,
}

impl fmt::Display for AptError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		if self.is_error {
			write!(f, "E: {}", self.msg)?;
		} else {
			write!(f, "W: {}", self.msg)?;
		}

		Ok(())
	}
}

impl std::error::Error for AptError {}

/// Struct that represents multiple errors and warnings.
///
/// Recoverable routines push warnings here and keep going; callers that
/// can handle a failure inspect the stack and either [`AptErrors::revert`]
/// back to a mark or merge everything and report.
#[derive(Debug, Default)]
pub struct AptErrors {
	pub(crate) stack: Vec<AptError>,
}

impl AptErrors {
	pub fn new() -> AptErrors { AptErrors { stack: Vec::new() } }

	/// Push an error onto the stack.
	pub fn error(&mut self, msg: impl Into<String>) {
		self.stack.push(AptError {
			is_error: true,
			msg: msg.into(),
		});
	}

	/// Push a warning onto the stack.
	pub fn warning(&mut self, msg: impl Into<String>) {
		self.stack.push(AptError {
			is_error: false,
			msg: msg.into(),
		});
	}

	/// True if any entry on the stack is a real error.
	pub fn pending_error(&self) -> bool { self.stack.iter().any(|e| e.is_error) }

	/// True if there are no Errors or Warnings.
	pub fn is_empty(&self) -> bool { self.stack.is_empty() }

	pub fn len(&self) -> usize { self.stack.len() }

	/// Iterate over all errors and warnings, oldest first.
	pub fn iter(&self) -> impl Iterator<Item = &AptError> { self.stack.iter() }

	/// A mark for later use with [`AptErrors::revert`].
	pub fn mark(&self) -> usize { self.stack.len() }

	/// Drop everything pushed after the mark.
	pub fn revert(&mut self, mark: usize) { self.stack.truncate(mark); }

	/// Move everything from `other` onto this stack.
	pub fn merge(&mut self, other: AptErrors) { self.stack.extend(other.stack); }
}

impl fmt::Display for AptErrors {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		for error in self.iter() {
			writeln!(f, "{error}")?;
		}
		Ok(())
	}
}

impl From<String> for AptErrors {
	fn from(err: String) -> Self {
		AptErrors {
			stack: vec![AptError {
				is_error: true,
				msg: err,
			}],
		}
	}
}

impl From<Error> for AptErrors {
	fn from(err: Error) -> Self { AptErrors::from(err.to_string()) }
}

impl From<io::Error> for AptErrors {
	fn from(err: io::Error) -> Self { AptErrors::from(err.to_string()) }
}

impl std::error::Error for AptErrors {}
