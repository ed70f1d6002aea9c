//! Manages a cache of file -> package names.
//!
//! This shares the arena substrate with the package cache but is built
//! to handle live updates: extraction flips transient flags on nodes as
//! archives are applied and rolls them back on abort.
//!
//! File names live in a fixed size chained hash table linked both to the
//! owning package and to the directory component. Directory paths are
//! collected into a binary tree and stored only once, which keeps the
//! cache smaller than the sum of the file names. Identical file names
//! across packages share their string.
//!
//! The pointer field of a node means different things depending on its
//! flags: the owning package, a conffile record, or a diversion record.
//! A node's meaning is fixed for its lifetime.

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Error;
use crate::raw::{path_hash, ArenaBuilder, Header, HEADER_SIZE};
use crate::tagfile::parse_tagfile;

/// Minor version stamped into file list cache headers.
const FL_CACHE_MINOR: u32 = 7;

const HASH_SIZE: u32 = 2048;

/// Root pointers kept in a fixed block right after the header:
/// directory tree, package tree, first diversion.
const ROOT_DIRS: u32 = HEADER_SIZE;
const ROOT_PKGS: u32 = HEADER_SIZE + 4;
const ROOT_DIVERSIONS: u32 = HEADER_SIZE + 8;
const BUCKETS: u32 = HEADER_SIZE + 12;

/// Node flag bits, kept in the high byte of the packed pointer field.
pub mod nflag {
	pub const DIVERSION: u8 = 1 << 0;
	pub const CONFFILE: u8 = 1 << 1;
	pub const NEW_CONFFILE: u8 = 1 << 2;
	pub const NEW_FILE: u8 = 1 << 3;
	pub const UNPACKED: u8 = 1 << 4;
	pub const REPLACED: u8 = 1 << 5;
}

/// One entry in the file hash table.
mod node {
	pub const DIR: u32 = 0; // Directory
	pub const FILE: u32 = 4; // String
	/// Pointer in the low 24 bits, flags in the high 8.
	pub const PTR_FLAGS: u32 = 8;
	pub const NEXT: u32 = 12; // Node, same bucket
	pub const NEXT_PKG: u32 = 16; // Node, same package
	pub const SIZE: u32 = 20;
}

/// Directory tree entries; layout prefix shared with [`flpkg`].
mod dir {
	pub const LEFT: u32 = 0;
	pub const RIGHT: u32 = 4;
	pub const NAME: u32 = 8; // String
	pub const SIZE: u32 = 12;
}

/// Package tree entries.
mod flpkg {
	pub const LEFT: u32 = 0;
	pub const RIGHT: u32 = 4;
	pub const NAME: u32 = 8; // String
	pub const FILES: u32 = 12; // Node
	pub const SIZE: u32 = 16;
}

/// A single diversion record. It is reachable from the hash table twice,
/// through its from node and its to node.
mod diver {
	pub const OWNER: u32 = 0; // Package
	pub const FROM: u32 = 4; // Node
	pub const TO: u32 = 8; // Node
	pub const NEXT: u32 = 12; // Diversion
	pub const FLAGS: u32 = 16;
	pub const SIZE: u32 = 20;

	pub const TOUCHED: u32 = 1;
}

/// A tracked configuration file with its recorded digest.
mod conf {
	pub const OWNER: u32 = 0; // Package
	pub const MD5: u32 = 4; // 16 raw bytes
	pub const SIZE: u32 = 20;
}

/// The limit of the 24 bit pointer field.
const POINTER_LIMIT: u32 = 1 << 24;

/// Maps absolute file paths to owning packages, with the diversion and
/// conffile overlay used during extraction.
pub struct FileListCache {
	b: ArenaBuilder,
}

fn split_path(path: &str) -> (&str, &str) {
	match path.rfind('/') {
		Some(pos) => (&path[..pos], &path[pos + 1..]),
		None => ("", path),
	}
}

impl Default for FileListCache {
	fn default() -> Self { Self::new() }
}

impl FileListCache {
	/// An empty cache ready for loading the state files.
	pub fn new() -> FileListCache {
		let mut b = ArenaBuilder::new();
		// Root block and hash buckets.
		b.alloc(12 + HASH_SIZE * 4).expect("fresh arena cannot be full");
		FileListCache { b }
	}

	/// Load a previously saved cache.
	pub fn open(path: &Path) -> Result<FileListCache, Error> {
		let bytes = fs::read(path).map_err(|e| Error::io("read", path, e))?;
		let header = Header::load(&bytes).ok_or_else(|| Error::CorruptCache {
			path: path.to_path_buf(),
			reason: "unreadable header".to_string(),
		})?;

		if header.dirty != 0 || header.arena_size as usize != bytes.len() {
			return Err(Error::CorruptCache {
				path: path.to_path_buf(),
				reason: "dirty or truncated".to_string(),
			});
		}
		if header.minor_version != FL_CACHE_MINOR
			|| header.package_sz != flpkg::SIZE
			|| header.version_sz != node::SIZE
			|| header.dependency_sz != diver::SIZE
			|| header.provides_sz != conf::SIZE
			|| header.verfile_sz != dir::SIZE
		{
			return Err(Error::SchemaMismatch {
				path: path.to_path_buf(),
			});
		}

		Ok(FileListCache {
			b: ArenaBuilder::from_vec(bytes),
		})
	}

	/// Persist through the rename-from-sibling protocol.
	pub fn save(&self, path: &Path) -> Result<(), Error> {
		let mut header = Header::new(FL_CACHE_MINOR);
		header.package_sz = flpkg::SIZE;
		header.version_sz = node::SIZE;
		header.dependency_sz = diver::SIZE;
		header.provides_sz = conf::SIZE;
		header.verfile_sz = dir::SIZE;
		header.hash_table = BUCKETS;
		header.hash_size = HASH_SIZE;

		// The builder stays usable, so finish a copy of the bytes.
		let copy = ArenaBuilder::from_vec(self.b.get_bytes(0, self.b.len() as usize).to_vec());
		let bytes = copy.finish(&mut header);

		let new_path = path.with_extension("bin.new");
		fs::write(&new_path, &bytes).map_err(|e| Error::io("write", &new_path, e))?;
		fs::rename(&new_path, path).map_err(|e| Error::io("rename", path, e))?;
		Ok(())
	}

	fn root(&self, slot: u32) -> u32 { self.b.get(slot) }

	// Packed pointer/flags accessors.

	pub fn node_flags(&self, node_off: u32) -> u8 {
		(self.b.get(node_off + node::PTR_FLAGS) >> 24) as u8
	}

	pub fn node_pointer(&self, node_off: u32) -> u32 {
		self.b.get(node_off + node::PTR_FLAGS) & (POINTER_LIMIT - 1)
	}

	pub fn set_node_flag(&mut self, node_off: u32, flag: u8) {
		let packed = self.b.get(node_off + node::PTR_FLAGS);
		self.b
			.set(node_off + node::PTR_FLAGS, packed | (u32::from(flag) << 24));
	}

	pub fn clear_node_flag(&mut self, node_off: u32, flag: u8) {
		let packed = self.b.get(node_off + node::PTR_FLAGS);
		self.b
			.set(node_off + node::PTR_FLAGS, packed & !(u32::from(flag) << 24));
	}

	fn set_node_pointer(&mut self, node_off: u32, pointer: u32) {
		let flags = self.b.get(node_off + node::PTR_FLAGS) & 0xFF00_0000;
		self.b.set(node_off + node::PTR_FLAGS, flags | pointer);
	}

	pub fn node_file(&self, node_off: u32) -> &str {
		self.b.str_at(self.b.get(node_off + node::FILE))
	}

	pub fn node_dir(&self, node_off: u32) -> &str {
		let d = self.b.get(node_off + node::DIR);
		self.b.str_at(self.b.get(d + dir::NAME))
	}

	/// The absolute path of a node.
	pub fn node_path(&self, node_off: u32) -> String {
		format!("{}/{}", self.node_dir(node_off), self.node_file(node_off))
	}

	pub fn next_in_package(&self, node_off: u32) -> u32 { self.b.get(node_off + node::NEXT_PKG) }

	/// The package owning this node, resolved through whatever the
	/// pointer currently means.
	pub fn owner_of(&self, node_off: u32) -> Option<u32> {
		let flags = self.node_flags(node_off);
		let pointer = self.node_pointer(node_off);
		if pointer == 0 {
			return None;
		}
		if flags & nflag::DIVERSION != 0 {
			return None;
		}
		if flags & nflag::CONFFILE != 0 {
			return Some(self.b.get(pointer + conf::OWNER));
		}
		Some(pointer)
	}

	/// The diversion record attached to a node, if it is one.
	pub fn diversion_of(&self, node_off: u32) -> Option<u32> {
		if self.node_flags(node_off) & nflag::DIVERSION == 0 {
			return None;
		}
		let pointer = self.node_pointer(node_off);
		if pointer == 0 {
			return None;
		}
		Some(pointer)
	}

	pub fn diversion_owner(&self, diver_off: u32) -> u32 { self.b.get(diver_off + diver::OWNER) }

	pub fn diversion_from(&self, diver_off: u32) -> u32 { self.b.get(diver_off + diver::FROM) }

	pub fn diversion_to(&self, diver_off: u32) -> u32 { self.b.get(diver_off + diver::TO) }

	/// The MD5 recorded for a conffile node.
	pub fn conffile_md5(&self, node_off: u32) -> Option<[u8; 16]> {
		if self.node_flags(node_off) & nflag::CONFFILE == 0 {
			return None;
		}
		let pointer = self.node_pointer(node_off);
		let bytes = self.b.get_bytes(pointer + conf::MD5, 16);
		bytes.try_into().ok()
	}

	pub fn pkg_name(&self, pkg_off: u32) -> &str {
		self.b.str_at(self.b.get(pkg_off + flpkg::NAME))
	}

	/// First node of the package's file list.
	pub fn pkg_files(&self, pkg_off: u32) -> u32 { self.b.get(pkg_off + flpkg::FILES) }

	/// Perform a lookup in one of the name trees, optionally inserting.
	fn tree_lookup(
		&mut self,
		root_slot: u32,
		name: &str,
		size: u32,
		insert: bool,
	) -> Result<u32, Error> {
		let mut slot = root_slot;
		loop {
			let cur = self.b.get(slot);
			if cur == 0 {
				if !insert {
					return Ok(0);
				}
				let name_off = self.b.add_string(name)?;
				let rec = self.b.alloc(size)?;
				self.b.set(rec + dir::NAME, name_off);
				self.b.set(slot, rec);
				return Ok(rec);
			}

			let existing = self.b.str_at(self.b.get(cur + dir::NAME)).to_string();
			match name.cmp(existing.as_str()) {
				std::cmp::Ordering::Equal => return Ok(cur),
				std::cmp::Ordering::Less => slot = cur + dir::LEFT,
				std::cmp::Ordering::Greater => slot = cur + dir::RIGHT,
			}
		}
	}

	/// Find or insert the package record for a name.
	pub fn get_pkg(&mut self, name: &str, insert: bool) -> Result<u32, Error> {
		self.tree_lookup(ROOT_PKGS, name, flpkg::SIZE, insert)
	}

	/// Locate or insert a node for an absolute path.
	///
	/// `loc` is the owning package for a fresh package file node, zero
	/// otherwise. With `divert` the lookup targets diversion nodes,
	/// which coexist with plain nodes of the same name and sort first
	/// in their bucket.
	pub fn get_node(
		&mut self,
		path: &str,
		loc: u32,
		insert: bool,
		divert: bool,
	) -> Result<u32, Error> {
		let (dir_name, file_name) = split_path(path);
		let bucket = BUCKETS + path_hash(path, HASH_SIZE) * 4;

		let mut prev = 0u32;
		let mut cur = self.b.get(bucket);
		let mut shared_file = 0u32;

		while cur != 0 {
			// Buckets are ordered descending, diversions first among
			// equal names.
			let existing_file = self.node_file(cur).to_string();
			let existing_dir = self.node_dir(cur).to_string();
			let mut res = match (file_name, dir_name)
				.cmp(&(existing_file.as_str(), existing_dir.as_str()))
			{
				std::cmp::Ordering::Less => -1,
				std::cmp::Ordering::Equal => 0,
				std::cmp::Ordering::Greater => 1,
			};

			if res == 0 && insert {
				// Same name, reuse the file string on insertion.
				shared_file = self.b.get(cur + node::FILE);
				let existing_divert = self.node_flags(cur) & nflag::DIVERSION != 0;
				res = i32::from(divert) - i32::from(existing_divert);
			}

			if res == 0 {
				if !insert {
					return Ok(cur);
				}
				// Only one diversion per name.
				if divert {
					return Ok(cur);
				}
				break;
			}
			if res > 0 {
				break;
			}
			prev = cur;
			cur = self.b.get(cur + node::NEXT);
		}

		if !insert {
			return Ok(0);
		}

		let dir_rec = self.tree_lookup(ROOT_DIRS, dir_name, dir::SIZE, true)?;
		if loc >= POINTER_LIMIT {
			return Err(Error::OutOfSpace);
		}

		let file_off = if shared_file != 0 {
			shared_file
		} else {
			self.b.add_string(file_name)?
		};

		let new = self.b.alloc(node::SIZE)?;
		self.b.set(new + node::DIR, dir_rec);
		self.b.set(new + node::FILE, file_off);
		let flags = if divert { nflag::DIVERSION } else { 0 };
		self.b
			.set(new + node::PTR_FLAGS, loc | (u32::from(flags) << 24));

		// Splice into the sorted bucket.
		self.b.set(new + node::NEXT, cur);
		if prev == 0 {
			self.b.set(bucket, new);
		} else {
			self.b.set(prev + node::NEXT, new);
		}

		// Link the node into the package file list.
		if !divert && loc != 0 {
			let head = self.b.get(loc + flpkg::FILES);
			self.b.set(new + node::NEXT_PKG, head);
			self.b.set(loc + flpkg::FILES, new);
		}

		Ok(new)
	}

	/// Pure lookup without mutation. Diversion nodes sort first, so a
	/// diverted path returns its diversion node.
	pub fn lookup(&self, path: &str) -> Option<u32> {
		let bucket = BUCKETS + path_hash(path, HASH_SIZE) * 4;
		let (dir_name, file_name) = split_path(path);

		let mut cur = self.b.get(bucket);
		while cur != 0 {
			if self.node_file(cur) == file_name && self.node_dir(cur) == dir_name {
				return Some(cur);
			}
			cur = self.b.get(cur + node::NEXT);
		}
		None
	}

	/// Lookup skipping diversion nodes, for ownership questions.
	pub fn lookup_real(&self, path: &str) -> Option<u32> {
		let bucket = BUCKETS + path_hash(path, HASH_SIZE) * 4;
		let (dir_name, file_name) = split_path(path);

		let mut cur = self.b.get(bucket);
		while cur != 0 {
			if self.node_file(cur) == file_name
				&& self.node_dir(cur) == dir_name
				&& self.node_flags(cur) & nflag::DIVERSION == 0
			{
				return Some(cur);
			}
			cur = self.b.get(cur + node::NEXT);
		}
		None
	}

	/// Remove a node from its package's file list so it can be dropped.
	pub fn unlink_from_pkg(&mut self, pkg_off: u32, node_off: u32) {
		let mut slot = pkg_off + flpkg::FILES;
		loop {
			let cur = self.b.get(slot);
			if cur == 0 {
				return;
			}
			if cur == node_off {
				self.b.set(slot, self.b.get(cur + node::NEXT_PKG));
				self.b.set(cur + node::NEXT_PKG, 0);
				return;
			}
			slot = cur + node::NEXT_PKG;
		}
	}

	/// Erase a node from the hash table. This does not unlink it from a
	/// package list.
	pub fn drop_node(&mut self, node_off: u32) {
		if node_off == 0 {
			return;
		}
		if self.b.get(node_off + node::NEXT_PKG) != 0 {
			warn!("drop_node called on a still linked node");
		}

		let path = self.node_path(node_off);
		let bucket = BUCKETS + path_hash(&path, HASH_SIZE) * 4;

		let mut prev = 0u32;
		let mut cur = self.b.get(bucket);
		while cur != 0 {
			if cur == node_off {
				let next = self.b.get(cur + node::NEXT);
				if prev == 0 {
					self.b.set(bucket, next);
				} else {
					self.b.set(prev + node::NEXT, next);
				}
				return;
			}
			prev = cur;
			cur = self.b.get(cur + node::NEXT);
		}
		warn!("failed to locate the hash element");
	}

	/// Tag all diversions as untouched before a reload.
	pub fn begin_diver_load(&mut self) {
		let mut d = self.root(ROOT_DIVERSIONS);
		while d != 0 {
			self.b.set(d + diver::FLAGS, 0);
			d = self.b.get(d + diver::NEXT);
		}
	}

	/// Drop any diversion the reload did not touch; the diversion file
	/// on disk is authoritative.
	pub fn finish_diver_load(&mut self) {
		let mut slot = ROOT_DIVERSIONS;
		loop {
			let cur = self.b.get(slot);
			if cur == 0 {
				break;
			}
			if self.b.get(cur + diver::FLAGS) & diver::TOUCHED != 0 {
				slot = cur + diver::NEXT;
				continue;
			}

			// Purge!
			let to = self.b.get(cur + diver::TO);
			let from = self.b.get(cur + diver::FROM);
			self.drop_node(to);
			self.drop_node(from);
			self.b.set(slot, self.b.get(cur + diver::NEXT));
		}
	}

	/// Add a diversion, reusing an existing record for the same pair.
	pub fn add_diversion(&mut self, owner_pkg: u32, from: &str, to: &str) -> Result<(), Error> {
		let from_node = self.get_node(from, 0, true, true)?;
		let to_node = self.get_node(to, 0, true, true)?;

		let mut diver_off = self.node_pointer(from_node);

		/* From and to must point at the same diversion record,
		   otherwise two diversions are being intermixed. A stale one
		   that the current load has not touched may be displaced. */
		let to_ptr = self.node_pointer(to_node);
		if to_ptr != 0 && to_ptr != diver_off {
			if self.b.get(to_ptr + diver::FLAGS) & diver::TOUCHED != 0 {
				return Err(Error::parse(format!(
					"trying to overwrite a diversion, {from} -> {to}"
				)));
			}
			self.set_node_pointer(to_node, 0);
			if self.b.get(to_ptr + diver::TO) == to_node {
				self.b.set(to_ptr + diver::TO, 0);
			}
			if self.b.get(to_ptr + diver::FROM) == to_node {
				self.b.set(to_ptr + diver::FROM, 0);
			}
			// That record is cleaned up by finish_diver_load.
		}

		if diver_off == 0 {
			diver_off = self.b.alloc(diver::SIZE)?;
			if diver_off >= POINTER_LIMIT {
				return Err(Error::OutOfSpace);
			}
			let head = self.root(ROOT_DIVERSIONS);
			self.b.set(diver_off + diver::NEXT, head);
			self.b.set(ROOT_DIVERSIONS, diver_off);
		}

		// Can only have one diversion of the same files.
		if self.b.get(diver_off + diver::FLAGS) & diver::TOUCHED != 0 {
			return Err(Error::parse(format!("double add of diversion {from} -> {to}")));
		}

		// Point the record at its new pair of nodes, releasing any it
		// referenced before.
		let old_from = self.b.get(diver_off + diver::FROM);
		if old_from != from_node && old_from != to_node {
			self.drop_node(old_from);
		}
		self.b.set(diver_off + diver::FROM, from_node);

		let old_to = self.b.get(diver_off + diver::TO);
		if old_to != from_node && old_to != to_node {
			self.drop_node(old_to);
		}
		self.b.set(diver_off + diver::TO, to_node);

		self.set_node_pointer(from_node, diver_off);
		self.set_node_pointer(to_node, diver_off);

		self.b.set(diver_off + diver::OWNER, owner_pkg);
		self.b
			.set(diver_off + diver::FLAGS, self.b.get(diver_off + diver::FLAGS) | diver::TOUCHED);

		Ok(())
	}

	/// Attach a conffile digest to the node owned by the given package.
	///
	/// Duplicate conffiles across packages are left to other routines
	/// to deal with.
	pub fn add_conffile(&mut self, path: &str, owner_pkg: u32, md5: [u8; 16]) -> Result<(), Error> {
		let Some(mut node_off) = self.lookup(path) else {
			// Not in any list file; nothing to attach to.
			return Ok(());
		};

		// Walk nodes sharing the file string to find the owner's.
		let file = self.b.get(node_off + node::FILE);
		while node_off != 0 && self.b.get(node_off + node::FILE) == file {
			if self.owner_of(node_off) == Some(owner_pkg) {
				if self.node_flags(node_off) & nflag::DIVERSION != 0 {
					return Err(Error::parse(format!(
						"node {path} cannot change meaning to a conffile"
					)));
				}
				let rec = self.b.alloc(conf::SIZE)?;
				if rec >= POINTER_LIMIT {
					return Err(Error::OutOfSpace);
				}
				self.b.set(rec + conf::OWNER, owner_pkg);
				self.b.set_bytes(rec + conf::MD5, &md5);
				self.set_node_pointer(node_off, rec);
				self.set_node_flag(node_off, nflag::CONFFILE);
				return Ok(());
			}
			node_off = self.b.get(node_off + node::NEXT);
		}
		Ok(())
	}

	/// Read one per package `.list` file: one absolute path per line.
	pub fn load_list_file(&mut self, pkg_name: &str, content: &str) -> Result<u32, Error> {
		let pkg_off = self.get_pkg(pkg_name, true)?;
		for line in content.lines() {
			let line = line.trim_end();
			if line.is_empty() || line == "/." {
				continue;
			}
			self.get_node(line, pkg_off, true, false)?;
		}
		Ok(pkg_off)
	}

	/// Read the single diversions file: three line records of from path,
	/// to path and owner, with `:` standing for dpkg itself.
	pub fn load_diversions(&mut self, content: &str) -> Result<(), Error> {
		self.begin_diver_load();

		let mut lines = content.lines();
		loop {
			let Some(from) = lines.next() else { break };
			let (Some(to), Some(owner)) = (lines.next(), lines.next()) else {
				return Err(Error::parse("truncated diversion record"));
			};

			let owner_pkg = if owner == ":" { 0 } else { self.get_pkg(owner, true)? };
			self.add_diversion(owner_pkg, from, to)?;
		}

		self.finish_diver_load();
		Ok(())
	}

	/// Pull the `Conffiles:` blocks out of a status file.
	pub fn load_status_conffiles(&mut self, content: &str) -> Result<(), Error> {
		let sections = parse_tagfile(content).map_err(|e| Error::parse(e.to_string()))?;

		for section in sections {
			let Some(name) = section.get("Package") else { continue };
			let Some(conffiles) = section.get("Conffiles") else { continue };
			let pkg_off = self.get_pkg(name, true)?;

			for line in conffiles.lines() {
				let mut words = line.split_whitespace();
				let (Some(path), Some(sum)) = (words.next(), words.next()) else {
					continue;
				};
				// A third word marks an obsolete conffile; it is still
				// tracked.
				let mut md5 = [0u8; 16];
				if sum.len() == 32 {
					for (i, chunk) in sum.as_bytes().chunks(2).enumerate() {
						let hex = std::str::from_utf8(chunk).unwrap_or("0");
						md5[i] = u8::from_str_radix(hex, 16).unwrap_or(0);
					}
				} else {
					debug!("skipping malformed conffile digest for {path}");
					continue;
				}
				self.add_conffile(path, pkg_off, md5)?;
			}
		}
		Ok(())
	}

	/// Build the whole cache from the dpkg state directory layout.
	pub fn build_from_state(
		info_dir: &Path,
		diversions: &Path,
		status: &Path,
	) -> Result<FileListCache, Error> {
		let mut fl = FileListCache::new();

		if let Ok(entries) = fs::read_dir(info_dir) {
			for entry in entries.flatten() {
				let path = entry.path();
				let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
				let Some(pkg_name) = name.strip_suffix(".list") else { continue };
				let content = fs::read_to_string(&path)
					.map_err(|e| Error::io("read", &path, e))?;
				fl.load_list_file(pkg_name, &content)?;
			}
		}

		if let Ok(content) = fs::read_to_string(diversions) {
			fl.load_diversions(&content)?;
		}
		if let Ok(content) = fs::read_to_string(status) {
			fl.load_status_conffiles(&content)?;
		}

		Ok(fl)
	}
}
