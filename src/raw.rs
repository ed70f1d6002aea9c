//! The on disk record layer shared by both caches.
//!
//! Every long lived structure lives in a single contiguous arena that is
//! persisted as one file and memory mapped back in. Cross references are
//! byte offsets into the arena, never pointers, which keeps the format
//! position independent and makes loading a plain map operation. An
//! offset of `0` always means "none"; offset zero itself is occupied by
//! the header, so no record can legitimately live there.
//!
//! All integers are little endian and of fixed width. Strings are stored
//! length prefixed in a deduplicating pool inside the same arena.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::Error;

/// Cache file signature. Shared by the package cache and the file list
/// cache, which differ in their minor version.
pub const SIGNATURE: u32 = 0x98FE_76DC;
pub const MAJOR_VERSION: u32 = 1;

/// Size of the fixed header at the front of the arena.
pub const HEADER_SIZE: u32 = 88;

/// Hard ceiling for arena growth. Offsets are 32 bit.
const ARENA_LIMIT: usize = u32::MAX as usize;

/// Dependency comparison operators and types.
pub mod dep {
	// Comparison operators, stored in the low nibble.
	pub const NO_OP: u8 = 0;
	pub const LESS_EQ: u8 = 1;
	pub const GREATER_EQ: u8 = 2;
	pub const LESS: u8 = 3;
	pub const GREATER: u8 = 4;
	pub const EQUALS: u8 = 5;
	pub const NOT_EQUALS: u8 = 6;
	/// Marks the dependency as an alternative; its right neighbour is the
	/// next member of the same or group.
	pub const OR: u8 = 0x10;

	// Dependency types.
	pub const DEPENDS: u8 = 1;
	pub const PRE_DEPENDS: u8 = 2;
	pub const SUGGESTS: u8 = 3;
	pub const RECOMMENDS: u8 = 4;
	pub const CONFLICTS: u8 = 5;
	pub const REPLACES: u8 = 6;
	pub const OBSOLETES: u8 = 7;
	pub const DPKG_BREAKS: u8 = 8;
	pub const ENHANCES: u8 = 9;

	/// Critical dependencies restrict what states the system may pass
	/// through; the rest are advisory.
	pub fn is_critical(dep_type: u8) -> bool {
		matches!(
			dep_type,
			DEPENDS | PRE_DEPENDS | CONFLICTS | OBSOLETES | DPKG_BREAKS
		)
	}

	/// Negative dependencies are satisfied by absence.
	pub fn is_negative(dep_type: u8) -> bool {
		matches!(dep_type, CONFLICTS | OBSOLETES | DPKG_BREAKS)
	}
}

/// Package flag bits.
pub mod flag {
	pub const ESSENTIAL: u32 = 1 << 0;
	pub const IMPORTANT: u32 = 1 << 1;
	pub const IMMEDIATE_CONF: u32 = 1 << 2;
	pub const AUTO: u32 = 1 << 3;

	// PackageFile flag bits.
	pub const NOT_SOURCE: u32 = 1 << 0;
	pub const NOT_AUTOMATIC: u32 = 1 << 1;
}

/// Field offsets of a Package record.
///
/// Identity is `(name, architecture)`. Versions hang off `VERSIONS` in
/// descending order; packages of the same hash bucket chain through
/// `NEXT_PACKAGE`.
pub mod pkg {
	pub const NAME: u32 = 0; // String
	pub const ARCH: u32 = 4; // String
	pub const VERSIONS: u32 = 8; // Version
	pub const CURRENT_VER: u32 = 12; // Version
	pub const SECTION: u32 = 16; // String
	pub const NEXT_PACKAGE: u32 = 20; // Package
	pub const REV_DEPENDS: u32 = 24; // Dependency
	pub const PROVIDES: u32 = 28; // Provides
	pub const FLAGS: u32 = 32;
	pub const SELECTED_STATE: u32 = 36; // u8
	pub const INST_STATE: u32 = 37; // u8
	pub const CURRENT_STATE: u32 = 38; // u8
	pub const ID: u32 = 40;
	pub const SIZE: u32 = 44;
}

/// Field offsets of a Version record.
pub mod ver {
	pub const PARENT_PKG: u32 = 0; // Package
	pub const VERSION: u32 = 4; // String
	pub const SECTION: u32 = 8; // String
	pub const DEPENDS: u32 = 12; // Dependency
	pub const PROVIDES: u32 = 16; // Provides
	pub const FILE_LIST: u32 = 20; // VerFile
	pub const NEXT_VER: u32 = 24; // Version
	pub const SIZE_BYTES: u32 = 28; // archive size
	pub const INSTALLED_SIZE: u32 = 32;
	pub const PRIORITY: u32 = 36; // u8
	pub const ID: u32 = 40;
	pub const SIZE: u32 = 44;
}

/// Version priority values.
pub mod prio {
	pub const REQUIRED: u8 = 1;
	pub const IMPORTANT: u8 = 2;
	pub const STANDARD: u8 = 3;
	pub const OPTIONAL: u8 = 4;
	pub const EXTRA: u8 = 5;
}

/// Field offsets of a Dependency record.
///
/// `NEXT_DEP` chains the parent version's dependency list in parse
/// order; `NEXT_REV` chains the reverse list of the target package.
pub mod depend {
	pub const PARENT_VER: u32 = 0; // Version
	pub const TARGET_PKG: u32 = 4; // Package
	pub const TARGET_VER: u32 = 8; // String, 0 for unversioned
	pub const COMP_TYPE: u32 = 12; // u8 op | OR
	pub const DEP_TYPE: u32 = 13; // u8
	pub const NEXT_DEP: u32 = 16; // Dependency
	pub const NEXT_REV: u32 = 20; // Dependency
	pub const ID: u32 = 24;
	pub const SIZE: u32 = 28;
}

/// Field offsets of a Provides record.
pub mod prv {
	pub const PARENT_VER: u32 = 0; // Version that does the providing
	pub const TARGET_PKG: u32 = 4; // Package being provided
	pub const TARGET_VER: u32 = 8; // String, 0 for unversioned
	pub const NEXT_PRV_VER: u32 = 12; // Provides, next of the same version
	pub const NEXT_PRV_PKG: u32 = 16; // Provides, next provider of the package
	pub const SIZE: u32 = 20;
}

/// Field offsets of a PackageFile (origin) record.
pub mod pkf {
	pub const FILENAME: u32 = 0; // String
	pub const ARCHIVE: u32 = 4; // String
	pub const CODENAME: u32 = 8; // String
	pub const VERSION: u32 = 12; // String
	pub const ORIGIN: u32 = 16; // String
	pub const LABEL: u32 = 20; // String
	pub const SITE: u32 = 24; // String
	pub const COMPONENT: u32 = 28; // String
	pub const ARCH: u32 = 32; // String
	pub const FLAGS: u32 = 36;
	pub const FILE_SIZE: u32 = 40;
	pub const MTIME: u32 = 44;
	pub const NEXT_FILE: u32 = 48; // PackageFile
	pub const ID: u32 = 52;
	pub const SIZE: u32 = 56;
}

/// Field offsets of a VerFile record linking a Version to the origin it
/// came from, with the byte range of its stanza in the raw index.
pub mod vrf {
	pub const FILE: u32 = 0; // PackageFile
	pub const NEXT: u32 = 4; // VerFile
	pub const OFFSET: u32 = 8;
	pub const STANZA_SIZE: u32 = 12;
	pub const SIZE: u32 = 16;
}

/// The parsed fixed header of a cache arena.
#[derive(Debug, Clone, Default)]
pub struct Header {
	pub signature: u32,
	pub major_version: u32,
	pub minor_version: u32,
	pub dirty: u32,
	pub header_size: u32,
	pub package_sz: u32,
	pub version_sz: u32,
	pub dependency_sz: u32,
	pub provides_sz: u32,
	pub verfile_sz: u32,
	pub packagefile_sz: u32,
	pub package_count: u32,
	pub version_count: u32,
	pub dependency_count: u32,
	pub provides_count: u32,
	pub verfile_count: u32,
	pub packagefile_count: u32,
	pub hash_table: u32,
	pub hash_size: u32,
	pub first_file: u32,
	pub string_count: u32,
	pub arena_size: u32,
}

impl Header {
	/// A fresh header carrying the structure sizes of this build.
	pub fn new(minor_version: u32) -> Header {
		Header {
			signature: SIGNATURE,
			major_version: MAJOR_VERSION,
			minor_version,
			dirty: 1,
			header_size: HEADER_SIZE,
			package_sz: pkg::SIZE,
			version_sz: ver::SIZE,
			dependency_sz: depend::SIZE,
			provides_sz: prv::SIZE,
			verfile_sz: vrf::SIZE,
			packagefile_sz: pkf::SIZE,
			..Default::default()
		}
	}

	fn to_array(&self) -> [u32; 22] {
		[
			self.signature,
			self.major_version,
			self.minor_version,
			self.dirty,
			self.header_size,
			self.package_sz,
			self.version_sz,
			self.dependency_sz,
			self.provides_sz,
			self.verfile_sz,
			self.packagefile_sz,
			self.package_count,
			self.version_count,
			self.dependency_count,
			self.provides_count,
			self.verfile_count,
			self.packagefile_count,
			self.hash_table,
			self.hash_size,
			self.first_file,
			self.string_count,
			self.arena_size,
		]
	}

	/// Serialize into the first [`HEADER_SIZE`] bytes of `out`.
	pub fn store(&self, out: &mut [u8]) {
		for (i, value) in self.to_array().iter().enumerate() {
			let at = i * 4;
			out[at..at + 4].copy_from_slice(&value.to_le_bytes());
		}
	}

	/// Parse a header back out of raw bytes.
	pub fn load(bytes: &[u8]) -> Option<Header> {
		if bytes.len() < HEADER_SIZE as usize {
			return None;
		}

		let mut fields = [0u32; 22];
		for (i, field) in fields.iter_mut().enumerate() {
			let at = i * 4;
			*field = u32::from_le_bytes(bytes[at..at + 4].try_into().ok()?);
		}

		Some(Header {
			signature: fields[0],
			major_version: fields[1],
			minor_version: fields[2],
			dirty: fields[3],
			header_size: fields[4],
			package_sz: fields[5],
			version_sz: fields[6],
			dependency_sz: fields[7],
			provides_sz: fields[8],
			verfile_sz: fields[9],
			packagefile_sz: fields[10],
			package_count: fields[11],
			version_count: fields[12],
			dependency_count: fields[13],
			provides_count: fields[14],
			verfile_count: fields[15],
			packagefile_count: fields[16],
			hash_table: fields[17],
			hash_size: fields[18],
			first_file: fields[19],
			string_count: fields[20],
			arena_size: fields[21],
		})
	}

	/// Validate signature, version, dirty bit and structure sizes against
	/// what this build would produce.
	pub fn check(&self, minor_version: u32, file_len: usize, path: &Path) -> Result<(), Error> {
		if self.signature != SIGNATURE {
			return Err(Error::CorruptCache {
				path: path.to_path_buf(),
				reason: "bad signature".to_string(),
			});
		}
		if self.dirty != 0 {
			return Err(Error::CorruptCache {
				path: path.to_path_buf(),
				reason: "dirty bit set, a build did not complete".to_string(),
			});
		}
		if self.arena_size as usize != file_len {
			return Err(Error::CorruptCache {
				path: path.to_path_buf(),
				reason: "arena size does not match the file".to_string(),
			});
		}
		if self.major_version != MAJOR_VERSION
			|| self.minor_version != minor_version
			|| self.header_size != HEADER_SIZE
			|| self.package_sz != pkg::SIZE
			|| self.version_sz != ver::SIZE
			|| self.dependency_sz != depend::SIZE
			|| self.provides_sz != prv::SIZE
			|| self.verfile_sz != vrf::SIZE
			|| self.packagefile_sz != pkf::SIZE
		{
			return Err(Error::SchemaMismatch {
				path: path.to_path_buf(),
			});
		}
		Ok(())
	}
}

enum ArenaData {
	Owned(Vec<u8>),
	Mapped(Mmap),
}

/// A read only view of a cache arena, either freshly built or memory
/// mapped from disk.
///
/// Accessors are total: a reference outside the arena reads as zero or
/// the empty string. Structural validation happens once at open time;
/// afterwards every stored offset is trusted to be in range or zero.
pub struct Arena {
	data: ArenaData,
}

impl Arena {
	pub fn from_vec(data: Vec<u8>) -> Arena {
		Arena {
			data: ArenaData::Owned(data),
		}
	}

	/// Map a cache file read only.
	pub fn map(path: &Path) -> Result<Arena, Error> {
		let file = File::open(path).map_err(|e| Error::io("open", path, e))?;
		// An empty file cannot be mapped and cannot be a cache.
		let len = file.metadata().map_err(|e| Error::io("stat", path, e))?.len();
		if len < u64::from(HEADER_SIZE) {
			return Err(Error::CorruptCache {
				path: path.to_path_buf(),
				reason: "file too small".to_string(),
			});
		}
		let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::io("mmap", path, e))?;
		Ok(Arena {
			data: ArenaData::Mapped(map),
		})
	}

	pub fn bytes(&self) -> &[u8] {
		match &self.data {
			ArenaData::Owned(vec) => vec,
			ArenaData::Mapped(map) => map,
		}
	}

	pub fn len(&self) -> usize { self.bytes().len() }

	pub fn is_empty(&self) -> bool { self.bytes().is_empty() }

	pub fn get(&self, off: u32) -> u32 {
		let off = off as usize;
		self.bytes()
			.get(off..off + 4)
			.map(|b| u32::from_le_bytes(b.try_into().unwrap()))
			.unwrap_or(0)
	}

	pub fn get8(&self, off: u32) -> u8 { self.bytes().get(off as usize).copied().unwrap_or(0) }

	/// Read a string out of the pool. Strings are u16 length prefixed
	/// UTF-8; anything out of range reads as empty.
	pub fn str_at(&self, off: u32) -> &str {
		if off == 0 {
			return "";
		}
		let off = off as usize;
		let bytes = self.bytes();
		let Some(len) = bytes.get(off..off + 2) else { return "" };
		let len = u16::from_le_bytes(len.try_into().unwrap()) as usize;
		bytes
			.get(off + 2..off + 2 + len)
			.and_then(|s| std::str::from_utf8(s).ok())
			.unwrap_or("")
	}

	pub fn header(&self) -> Option<Header> { Header::load(self.bytes()) }
}

/// An append only arena under construction, with in place field updates
/// for chain linking.
///
/// The builder starts with a zeroed header region; [`ArenaBuilder::finish`]
/// stamps the final header in and hands the bytes over.
pub struct ArenaBuilder {
	data: Vec<u8>,
	strings: std::collections::HashMap<String, u32>,
	pub string_count: u32,
}

impl Default for ArenaBuilder {
	fn default() -> Self { Self::new() }
}

impl ArenaBuilder {
	pub fn new() -> ArenaBuilder {
		ArenaBuilder {
			data: vec![0; HEADER_SIZE as usize],
			strings: std::collections::HashMap::new(),
			string_count: 0,
		}
	}

	/// Rehydrate a builder from previously persisted bytes. Used by the
	/// file list cache, which mutates after load.
	pub fn from_vec(data: Vec<u8>) -> ArenaBuilder {
		ArenaBuilder {
			data,
			strings: std::collections::HashMap::new(),
			string_count: 0,
		}
	}

	pub fn len(&self) -> u32 { self.data.len() as u32 }

	pub fn is_empty(&self) -> bool { self.data.is_empty() }

	/// Allocate `size` zeroed bytes, returning their offset.
	pub fn alloc(&mut self, size: u32) -> Result<u32, Error> {
		let at = self.data.len();
		if at + size as usize > ARENA_LIMIT {
			return Err(Error::OutOfSpace);
		}
		self.data.resize(at + size as usize, 0);
		Ok(at as u32)
	}

	/// Store a string in the pool, reusing an identical earlier one.
	pub fn add_string(&mut self, s: &str) -> Result<u32, Error> {
		if s.is_empty() {
			return Ok(0);
		}
		if let Some(&off) = self.strings.get(s) {
			return Ok(off);
		}
		if s.len() > u16::MAX as usize {
			return Err(Error::OutOfSpace);
		}

		let off = self.alloc(2 + s.len() as u32)?;
		self.data[off as usize..off as usize + 2]
			.copy_from_slice(&(s.len() as u16).to_le_bytes());
		self.data[off as usize + 2..off as usize + 2 + s.len()].copy_from_slice(s.as_bytes());
		self.strings.insert(s.to_string(), off);
		self.string_count += 1;
		Ok(off)
	}

	pub fn get(&self, off: u32) -> u32 {
		let off = off as usize;
		self.data
			.get(off..off + 4)
			.map(|b| u32::from_le_bytes(b.try_into().unwrap()))
			.unwrap_or(0)
	}

	pub fn get8(&self, off: u32) -> u8 { self.data.get(off as usize).copied().unwrap_or(0) }

	pub fn set(&mut self, off: u32, value: u32) {
		let off = off as usize;
		if let Some(slot) = self.data.get_mut(off..off + 4) {
			slot.copy_from_slice(&value.to_le_bytes());
		}
	}

	pub fn set8(&mut self, off: u32, value: u8) {
		if let Some(slot) = self.data.get_mut(off as usize) {
			*slot = value;
		}
	}

	pub fn set_bytes(&mut self, off: u32, value: &[u8]) {
		let off = off as usize;
		if let Some(slot) = self.data.get_mut(off..off + value.len()) {
			slot.copy_from_slice(value);
		}
	}

	pub fn get_bytes(&self, off: u32, len: usize) -> &[u8] {
		self.data.get(off as usize..off as usize + len).unwrap_or(&[])
	}

	/// Read a string back out of the builder.
	pub fn str_at(&self, off: u32) -> &str {
		if off == 0 {
			return "";
		}
		let off = off as usize;
		let Some(len) = self.data.get(off..off + 2) else { return "" };
		let len = u16::from_le_bytes(len.try_into().unwrap()) as usize;
		self.data
			.get(off + 2..off + 2 + len)
			.and_then(|s| std::str::from_utf8(s).ok())
			.unwrap_or("")
	}

	/// Stamp the header and return the finished arena bytes.
	pub fn finish(mut self, header: &mut Header) -> Vec<u8> {
		header.dirty = 0;
		header.string_count = self.string_count;
		header.arena_size = self.data.len() as u32;
		let mut head = [0u8; HEADER_SIZE as usize];
		header.store(&mut head);
		self.data[..HEADER_SIZE as usize].copy_from_slice(&head);
		self.data
	}
}

/// Hash a package name for the cache hash table.
///
/// Position weighted byte sum; stable across builds by construction.
pub fn pkg_hash(name: &str, hash_size: u32) -> u32 {
	let bytes = name.as_bytes();
	let mut hash: u64 = 0;
	for (i, b) in bytes.iter().enumerate() {
		hash += u64::from(*b) * (bytes.len() - i + 1) as u64;
	}
	(hash % u64::from(hash_size.max(1))) as u32
}

/// Hash a full file path for the file list hash table.
///
/// Multiplicative hash over every byte of the path.
pub fn path_hash(path: &str, hash_size: u32) -> u32 {
	let mut hash: u32 = 0;
	for b in path.as_bytes() {
		hash = hash.wrapping_mul(1637).wrapping_add(u32::from(*b));
	}
	hash % hash_size.max(1)
}
