//! Allows access to complete package description records directly from
//! the index files.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;

use crate::cache::Cache;
use crate::tagfile::TagSection;
use crate::VersionFile;

/// A module containing [`&str`] constants for known record fields
///
/// Pass these to [`crate::Version::get_record`]
/// or use a custom [`&str`] for fields not listed here.
#[allow(non_upper_case_globals, non_snake_case)]
pub mod RecordField {
	/// Name of the package `apt`
	pub const Package: &str = "Package";

	/// The name of the source package and the version if it exists
	pub const Source: &str = "Source";

	/// Version of the package `2.5.2`
	pub const Version: &str = "Version";

	/// Architecture of the package `amd64`
	pub const Architecture: &str = "Architecture";

	/// Priority of the package `optional`
	pub const Priority: &str = "Priority";

	/// If the package is essential `yes`
	pub const Essential: &str = "Essential";

	/// Section of the package `admin`
	pub const Section: &str = "Section";

	/// The unpacked size in KiB `4352`
	pub const InstalledSize: &str = "Installed-Size";

	/// The archive size in bytes
	pub const Size: &str = "Size";

	/// Maintainer of the package
	pub const Maintainer: &str = "Maintainer";

	/// The homepage of the software
	pub const Homepage: &str = "Homepage";

	/// Conffiles tracked for the package
	pub const Conffiles: &str = "Conffiles";

	/// The dpkg status triple of the package
	pub const Status: &str = "Status";

	/// SHA256 of the package archive
	pub const SHA256: &str = "SHA256";
}

/// Reads version stanzas back out of the origin indexes.
///
/// The VerFile records carry the byte range of every stanza; the whole
/// origin file is read once and kept around for further lookups.
#[derive(Debug, Default)]
pub struct PackageRecords {
	files: RefCell<HashMap<String, String>>,
}

impl PackageRecords {
	pub fn new() -> PackageRecords {
		PackageRecords {
			files: RefCell::new(HashMap::new()),
		}
	}

	fn with_file<R>(
		&self,
		path: &str,
		f: impl FnOnce(&str) -> Option<R>,
	) -> Option<R> {
		{
			let files = self.files.borrow();
			if let Some(content) = files.get(path) {
				return f(content);
			}
		}

		let content = fs::read_to_string(path).ok()?;
		let result = f(&content);
		self.files.borrow_mut().insert(path.to_string(), content);
		result
	}

	/// The raw stanza bytes of a version in its origin index.
	pub fn stanza(&self, _cache: &Cache, vf: &VersionFile) -> Option<String> {
		let file = vf.package_file();
		let path = file.filename()?.to_string();
		let start = vf.stanza_offset() as usize;
		let len = vf.stanza_size() as usize;

		self.with_file(&path, |content| {
			content.get(start..start + len).map(|s| s.to_string())
		})
	}

	/// A single field out of the stanza of a version.
	pub fn get_field(&self, cache: &Cache, vf: &VersionFile, field: &str) -> Option<String> {
		let stanza = self.stanza(cache, vf)?;
		let section = TagSection::new(&stanza).ok()?;
		section.get(field).map(|s| s.to_string())
	}
}
