use std::fmt;

use crate::raw::{pkf, vrf};
use crate::Cache;

/// Associates a version with a PackageFile
///
/// This allows a full description of all Versions in all files
pub struct VersionFile<'a> {
	pub(crate) off: u32,
	cache: &'a Cache,
}

impl<'a> VersionFile<'a> {
	pub fn new(off: u32, cache: &'a Cache) -> VersionFile<'a> { VersionFile { off, cache } }

	/// Return the PackageFile for this VersionFile
	pub fn package_file(&self) -> PackageFile<'a> {
		PackageFile::new(self.cache.arena().get(self.off + vrf::FILE), self.cache)
	}

	/// Byte offset of the stanza for this version in the origin index.
	pub fn stanza_offset(&self) -> u64 { u64::from(self.cache.arena().get(self.off + vrf::OFFSET)) }

	/// Byte length of the stanza for this version in the origin index.
	pub fn stanza_size(&self) -> u64 {
		u64::from(self.cache.arena().get(self.off + vrf::STANZA_SIZE))
	}

	/// Read the stanza of this version back out of the origin index.
	pub fn lookup(&self) -> Option<String> { self.cache.records().stanza(self.cache, self) }
}

/// Stores information about the files used to generate the cache
///
/// Package files are referenced by Version structures to be able to know
/// which index includes this Version.
pub struct PackageFile<'a> {
	pub(crate) off: u32,
	cache: &'a Cache,
}

impl<'a> PackageFile<'a> {
	pub fn new(off: u32, cache: &'a Cache) -> PackageFile<'a> { PackageFile { off, cache } }

	fn string(&self, field: u32) -> Option<&'a str> {
		let a = self.cache.arena();
		let s = a.get(self.off + field);
		if s == 0 {
			return None;
		}
		Some(a.str_at(s))
	}

	/// The path to the PackageFile
	pub fn filename(&self) -> Option<&'a str> { self.string(pkf::FILENAME) }

	/// The Archive of the PackageFile. ex: unstable
	pub fn archive(&self) -> Option<&'a str> { self.string(pkf::ARCHIVE) }

	/// The Origin of the PackageFile. ex: Debian
	pub fn origin(&self) -> Option<&'a str> { self.string(pkf::ORIGIN) }

	/// The Codename of the PackageFile. ex: sid
	pub fn codename(&self) -> Option<&'a str> { self.string(pkf::CODENAME) }

	/// The release Version of the PackageFile. ex: 12.4
	pub fn version(&self) -> Option<&'a str> { self.string(pkf::VERSION) }

	/// The Label of the PackageFile. ex: Debian
	pub fn label(&self) -> Option<&'a str> { self.string(pkf::LABEL) }

	/// The Hostname the index was fetched from. ex: deb.debian.org
	pub fn site(&self) -> Option<&'a str> { self.string(pkf::SITE) }

	/// The Component of the PackageFile. ex: main
	pub fn component(&self) -> Option<&'a str> { self.string(pkf::COMPONENT) }

	/// The Architecture of the PackageFile. ex: amd64
	pub fn arch(&self) -> Option<&'a str> { self.string(pkf::ARCH) }

	/// Check a flag bit on the PackageFile.
	pub fn flag(&self, bit: u32) -> bool {
		self.cache.arena().get(self.off + pkf::FLAGS) & bit != 0
	}

	/// Sequential id of the PackageFile, usable as a side table index.
	pub fn id(&self) -> u32 { self.cache.arena().get(self.off + pkf::ID) }

	/// The offset of this PackageFile inside the cache arena.
	pub fn offset(&self) -> u32 { self.off }
}

impl fmt::Debug for PackageFile<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("PackageFile")
			.field("filename", &self.filename())
			.field("archive", &self.archive())
			.field("origin", &self.origin())
			.field("codename", &self.codename())
			.field("component", &self.component())
			.finish_non_exhaustive()
	}
}
