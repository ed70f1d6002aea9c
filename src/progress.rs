//! Contains Progress structs for reporting long running operations.

use std::io::{stdout, Write};

use crate::util::{get_apt_progress_string, terminal_width, time_str, unit_str, NumSys};

/// Customize the output shown during index and archive fetches.
pub trait DynAcquireProgress {
	/// Called when an item is confirmed to be up-to-date.
	fn hit(&mut self, id: u32, description: &str);

	/// Called when an item has started to download
	fn fetch(&mut self, id: u32, description: &str, file_size: u64);

	/// Called when an item fails to download
	fn fail(&mut self, id: u32, description: &str);

	/// Called periodically to provide the overall progress information
	fn pulse(&mut self, fetched_bytes: u64, total_bytes: u64, elapsed: u64);

	/// Called when an item is successfully and completely fetched.
	fn done(&mut self, id: u32, description: &str);

	/// Called when progress has started
	fn start(&mut self);

	/// Called when progress has finished
	fn stop(&mut self, fetched_bytes: u64, elapsed: u64);
}

/// Customize the output of operation progress on things like opening
/// the cache.
pub trait DynOperationProgress {
	fn update(&mut self, operation: String, percent: f32);
	fn done(&mut self);
}

/// Customize the output of installation progress.
pub trait DynInstallProgress {
	fn status_changed(
		&mut self,
		pkgname: String,
		steps_done: u64,
		total_steps: u64,
		action: String,
	);
	fn error(&mut self, pkgname: String, steps_done: u64, total_steps: u64, error: String);
}

/// An acquire progress that mimics the familiar terminal output.
#[derive(Debug, Default)]
pub struct AcquireProgress {
	quiet: bool,
}

impl AcquireProgress {
	/// Returns a new AcquireProgress for terminal output.
	pub fn apt() -> Self { Self { quiet: false } }

	/// Returns a new AcquireProgress that outputs nothing.
	pub fn quiet() -> Self { Self { quiet: true } }
}

impl DynAcquireProgress for AcquireProgress {
	fn hit(&mut self, id: u32, description: &str) {
		if !self.quiet {
			println!("Hit:{id} {description}");
		}
	}

	fn fetch(&mut self, id: u32, description: &str, file_size: u64) {
		if self.quiet {
			return;
		}
		if file_size != 0 {
			println!("Get:{id} {description} [{}]", unit_str(file_size, NumSys::Decimal));
		} else {
			println!("Get:{id} {description}");
		}
	}

	fn fail(&mut self, id: u32, description: &str) {
		if !self.quiet {
			println!("Err:{id} {description}");
		}
	}

	fn pulse(&mut self, fetched_bytes: u64, total_bytes: u64, elapsed: u64) {
		if self.quiet || total_bytes == 0 {
			return;
		}
		let percent = fetched_bytes as f32 / total_bytes as f32;
		let width = terminal_width().min(80) as u32;
		print!(
			"\r{} {:.0}% [{}]",
			time_str(elapsed),
			percent * 100.0,
			get_apt_progress_string(percent, width / 2)
		);
		let _ = stdout().flush();
	}

	fn done(&mut self, _id: u32, _description: &str) {}

	fn start(&mut self) {}

	fn stop(&mut self, fetched_bytes: u64, elapsed: u64) {
		if self.quiet {
			return;
		}
		if fetched_bytes != 0 {
			println!(
				"Fetched {} in {}",
				unit_str(fetched_bytes, NumSys::Decimal),
				time_str(elapsed)
			);
		} else {
			println!("Nothing to fetch.");
		}
	}
}

/// An operation progress that prints nothing at all.
#[derive(Debug, Default)]
pub struct OperationProgress;

impl OperationProgress {
	pub fn quiet() -> Self { Self }
}

impl DynOperationProgress for OperationProgress {
	fn update(&mut self, _operation: String, _percent: f32) {}

	fn done(&mut self) {}
}
