//! Talks to external worker subprocesses.
//!
//! Workers (download methods, the installer backend, the patcher in
//! standalone mode) speak a line oriented protocol: stanzas separated by
//! a blank line, the first line `<code> <short message>`, the rest
//! `Key: value`. Messages from a single worker arrive in emission
//! order; nothing is guaranteed across workers.

use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::io::AsRawFd;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::Error;

/// Message codes used by the core.
pub mod code {
	pub const CAPABILITIES: u32 = 100;
	pub const LOG: u32 = 101;
	pub const STATUS: u32 = 102;
	pub const URI_START: u32 = 200;
	pub const URI_DONE: u32 = 201;
	pub const URI_FAILURE: u32 = 400;
	pub const GENERAL_FAILURE: u32 = 401;
	pub const URI_ACQUIRE: u32 = 600;
	pub const CONFIGURATION: u32 = 601;
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
	pub status_code: u32,
	pub message: String,
	pub fields: Vec<(String, String)>,
}

impl Stanza {
	pub fn new(status_code: u32, message: &str) -> Stanza {
		Stanza {
			status_code,
			message: message.to_string(),
			fields: Vec::new(),
		}
	}

	pub fn field(mut self, key: &str, value: &str) -> Stanza {
		self.fields.push((key.to_string(), value.to_string()));
		self
	}

	/// The first matching field value.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.fields
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(key))
			.map(|(_, v)| v.as_str())
	}

	/// Parse the accumulated lines of one stanza. The caller has already
	/// stripped the blank separator.
	pub fn parse(lines: &[String]) -> Result<Stanza, Error> {
		let Some(first) = lines.first() else {
			return Err(Error::parse("empty stanza"));
		};

		let (code_word, message) = first.split_once(' ').unwrap_or((first.as_str(), ""));
		let status_code = code_word
			.parse()
			.map_err(|_| Error::parse(format!("bad status line '{first}'")))?;

		let mut fields = Vec::new();
		for line in &lines[1..] {
			let Some((key, value)) = line.split_once(':') else {
				return Err(Error::parse(format!("bad message header '{line}'")));
			};
			fields.push((key.trim().to_string(), value.trim().to_string()));
		}

		Ok(Stanza {
			status_code,
			message: message.trim().to_string(),
			fields,
		})
	}

	/// Wire form, including the blank line terminator.
	pub fn serialize(&self) -> String {
		let mut out = format!("{} {}\n", self.status_code, self.message);
		for (key, value) in &self.fields {
			out.push_str(key);
			out.push_str(": ");
			out.push_str(value);
			out.push('\n');
		}
		out.push('\n');
		out
	}
}

/// An owned worker subprocess with its message pipes.
pub struct Worker {
	name: String,
	child: Child,
	stdin: Option<ChildStdin>,
	stdout: BufReader<ChildStdout>,
	timeout: Duration,
}

impl Worker {
	/// Spawn the worker binary with a pipe pair.
	pub fn spawn(name: &str, program: &str, args: &[&str]) -> Result<Worker, Error> {
		let mut child = Command::new(program)
			.args(args)
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.spawn()
			.map_err(|e| Error::io("spawn", program, e))?;

		let stdin = child.stdin.take().ok_or_else(|| Error::WorkerFailure {
			worker: name.to_string(),
			status: -1,
		})?;
		let stdout = child.stdout.take().ok_or_else(|| Error::WorkerFailure {
			worker: name.to_string(),
			status: -1,
		})?;

		debug!("spawned worker {name} ({program})");
		Ok(Worker {
			name: name.to_string(),
			child,
			stdin: Some(stdin),
			stdout: BufReader::new(stdout),
			timeout: Duration::from_secs(120),
		})
	}

	pub fn name(&self) -> &str { &self.name }

	pub fn set_timeout(&mut self, timeout: Duration) { self.timeout = timeout; }

	/// Send one stanza down the pipe.
	pub fn send_stanza(&mut self, stanza: &Stanza) -> Result<(), Error> {
		let Some(stdin) = self.stdin.as_mut() else {
			return Err(Error::WorkerFailure {
				worker: self.name.clone(),
				status: -1,
			});
		};
		stdin
			.write_all(stanza.serialize().as_bytes())
			.and_then(|_| stdin.flush())
			.map_err(|e| Error::io("write", format!("worker {}", self.name), e))
	}

	/// Level triggered readiness probe on the worker's pipe.
	fn wait_readable(&mut self, timeout: Duration) -> Result<bool, Error> {
		// Buffered bytes count as readable.
		if !self.stdout.buffer().is_empty() {
			return Ok(true);
		}

		let mut pollfd = libc::pollfd {
			fd: self.stdout.get_ref().as_raw_fd(),
			events: libc::POLLIN,
			revents: 0,
		};
		let millis = timeout.as_millis().min(i32::MAX as u128) as i32;
		let ret = unsafe { libc::poll(&mut pollfd, 1, millis) };
		if ret < 0 {
			return Err(Error::io(
				"poll",
				format!("worker {}", self.name),
				std::io::Error::last_os_error(),
			));
		}
		Ok(ret > 0)
	}

	/// Receive the next stanza.
	///
	/// Returns `Ok(None)` on a clean end of stream. A worker that stays
	/// silent past its timeout is cancelled and reaped.
	pub fn recv_stanza(&mut self) -> Result<Option<Stanza>, Error> {
		let deadline = Instant::now() + self.timeout;
		let mut lines: Vec<String> = Vec::new();

		loop {
			let remaining = deadline.saturating_duration_since(Instant::now());
			if remaining.is_zero() || !self.wait_readable(remaining)? {
				warn!("worker {} timed out, cancelling", self.name);
				self.cancel();
				let status = self.wait_raw();
				return Err(Error::WorkerFailure {
					worker: self.name.clone(),
					status,
				});
			}

			let mut line = String::new();
			let n = self
				.stdout
				.read_line(&mut line)
				.map_err(|e| Error::io("read", format!("worker {}", self.name), e))?;

			if n == 0 {
				// End of stream; a partial stanza is a protocol error.
				if lines.is_empty() {
					return Ok(None);
				}
				return Err(Error::parse(format!(
					"worker {} closed the pipe mid stanza",
					self.name
				)));
			}

			let line = line.trim_end_matches('\n').to_string();
			if line.is_empty() {
				if lines.is_empty() {
					continue;
				}
				return Ok(Some(Stanza::parse(&lines)?));
			}
			lines.push(line);
		}
	}

	/// Receive and dispatch, logging and skipping unknown codes.
	pub fn recv_known(&mut self) -> Result<Option<Stanza>, Error> {
		loop {
			let Some(stanza) = self.recv_stanza()? else { return Ok(None) };
			match stanza.status_code {
				code::CAPABILITIES
				| code::LOG
				| code::STATUS
				| code::URI_START
				| code::URI_DONE
				| code::URI_FAILURE
				| code::GENERAL_FAILURE
				| code::URI_ACQUIRE
				| code::CONFIGURATION => return Ok(Some(stanza)),
				other => {
					debug!("worker {} sent unknown code {other}, ignored", self.name);
				},
			}
		}
	}

	/// Ask the worker to stop.
	pub fn cancel(&mut self) {
		unsafe {
			libc::kill(self.child.id() as libc::pid_t, libc::SIGINT);
		}
	}

	fn wait_raw(&mut self) -> i32 {
		match self.child.wait() {
			Ok(status) => status.code().unwrap_or(-1),
			Err(_) => -1,
		}
	}

	/// Reap the worker and turn a non zero exit into an error.
	pub fn wait(mut self) -> Result<(), Error> {
		// Closing our end of the pipe lets the worker finish.
		self.stdin.take();

		let mut tail = String::new();
		let _ = self.stdout.read_to_string(&mut tail);

		let status = match self.child.wait() {
			Ok(status) => status.code().unwrap_or(-1),
			Err(_) => -1,
		};
		if status != 0 {
			return Err(Error::WorkerFailure {
				worker: self.name.clone(),
				status,
			});
		}
		Ok(())
	}
}

impl Drop for Worker {
	fn drop(&mut self) {
		// Reap rather than leak; the process may already be gone.
		if let Ok(None) = self.child.try_wait() {
			self.cancel();
			let _ = self.child.wait();
		}
	}
}
