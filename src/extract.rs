//! Applies a stream of archive items to the filesystem atomically.
//!
//! Each item is resolved against the file list cache first: diversions
//! redirect it, foreign ownership requires a Replaces authorisation, and
//! only then do bytes move. New content lands next to the target as
//! `.dpkg-new`, the old file is preserved as `.dpkg-tmp`, and a rename
//! puts the new file in place. Aborting an archive rolls all of it back.

use std::collections::HashMap;
use std::ffi::CString;
use std::fs;
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Error;
use crate::filelist::{nflag, FileListCache};
use crate::util::check_dep;

/// Longest name or link target the tar layer may hand us.
pub const LONG_NAME_LIMIT: usize = 1024 * 1024;

/// Largest member size accepted, to keep pad rounding away from
/// overflow.
pub const MEMBER_SIZE_LIMIT: u64 = 128 * 1024 * 1024 * 1024;

/// Longest canonical path accepted.
const PATH_LIMIT: usize = 4096;

/// How deep the foreign-content scan of a replaced directory goes.
const DIR_SCAN_DEPTH: u32 = 40;

/// The kinds of item a tar like archive stream produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
	File,
	Directory,
	HardLink,
	SymbolicLink,
	CharDevice,
	BlockDevice,
	Fifo,
}

/// One member of the archive stream.
#[derive(Debug, Clone)]
pub struct Item {
	pub path: String,
	pub kind: ItemKind,
	pub size: u64,
	pub mode: u32,
	/// Target for hard and symbolic links.
	pub link_target: String,
	pub major: u32,
	pub minor: u32,
}

/// One Replaces declaration of the package being unpacked.
#[derive(Debug, Clone)]
pub struct Replace {
	pub name: String,
	pub op: u8,
	pub version: String,
}

enum Undo {
	/// Restore the `.dpkg-tmp` backup over the path.
	RestoreBackup(PathBuf),
	/// The path did not exist before; delete it again.
	RemoveNew(PathBuf),
}

/// Applies one package's archive to the filesystem.
pub struct ExtractStream<'a> {
	fl: &'a mut FileListCache,
	/// File list package record of the package being unpacked.
	pkg: u32,
	pkg_name: String,
	replaces: Vec<Replace>,
	/// Installed versions of other packages, for Replaces restrictions.
	installed: HashMap<String, String>,
	/// Filesystem root everything is applied under.
	root: PathBuf,
	touched: Vec<u32>,
	undo: Vec<Undo>,
}

fn canonicalise(raw: &str) -> Result<String, Error> {
	let mut path = raw;
	while let Some(rest) = path.strip_prefix("./") {
		path = rest;
	}
	let path = path.trim_matches('/');

	if path.is_empty() || path == "." {
		return Err(Error::parse("empty archive member name"));
	}
	if path.len() > PATH_LIMIT {
		return Err(Error::parse("archive member name too long"));
	}
	if path.split('/').any(|seg| seg == "..") {
		return Err(Error::parse(format!("unsafe path in archive: {raw}")));
	}
	if path.chars().any(|c| (c as u32) < 0x20) {
		return Err(Error::parse(format!("control character in path: {raw}")));
	}
	Ok(path.to_string())
}

impl<'a> ExtractStream<'a> {
	/// Start unpacking one archive of `pkg_name` under `root`.
	pub fn new(
		fl: &'a mut FileListCache,
		root: impl Into<PathBuf>,
		pkg_name: &str,
		replaces: Vec<Replace>,
		installed: HashMap<String, String>,
	) -> Result<ExtractStream<'a>, Error> {
		let pkg = fl.get_pkg(pkg_name, true)?;
		Ok(ExtractStream {
			fl,
			pkg,
			pkg_name: pkg_name.to_string(),
			replaces,
			installed,
			root: root.into(),
			touched: Vec::new(),
			undo: Vec::new(),
		})
	}

	/// Does one of our Replaces authorise overwriting the owner?
	fn replaces_authorises(&self, owner_name: &str) -> bool {
		for rep in &self.replaces {
			if rep.name != owner_name {
				continue;
			}
			if rep.version.is_empty() {
				return true;
			}
			if let Some(installed) = self.installed.get(owner_name) {
				if check_dep(installed, rep.op, &rep.version) {
					return true;
				}
			}
		}
		false
	}

	/// Refuse to replace a populated directory with a non directory when
	/// it shelters files of other packages.
	fn check_dir_replace(&self, dir: &Path, abs_prefix: &str, depth: u32) -> Result<(), Error> {
		if depth == 0 {
			return Err(Error::parse(format!(
				"directory {abs_prefix} is nested too deeply"
			)));
		}

		let entries = match fs::read_dir(dir) {
			Ok(entries) => entries,
			Err(_) => return Ok(()),
		};

		for entry in entries.flatten() {
			let name = entry.file_name();
			let abs = format!("{abs_prefix}/{}", name.to_string_lossy());

			let owner = self
				.fl
				.lookup_real(&abs)
				.and_then(|node| self.fl.owner_of(node));
			match owner {
				Some(owner) if owner == self.pkg => {},
				Some(owner) => {
					return Err(Error::OverwriteConflict {
						other_pkg: self.fl.pkg_name(owner).to_string(),
						path: abs,
					});
				},
				None => {},
			}

			let path = entry.path();
			if path.is_dir() && !path.is_symlink() {
				self.check_dir_replace(&path, &abs, depth - 1)?;
			}
		}
		Ok(())
	}

	/// Process one archive item, reading its payload from `data`.
	pub fn do_item(&mut self, item: &Item, data: &mut dyn Read) -> Result<(), Error> {
		if item.size > MEMBER_SIZE_LIMIT {
			return Err(Error::parse(format!("archive member {} too large", item.path)));
		}
		if item.link_target.len() > LONG_NAME_LIMIT {
			return Err(Error::parse("link target too long"));
		}

		let canonical = canonicalise(&item.path)?;
		let mut abs = format!("/{canonical}");

		// A diversion redirects everyone except the diversion's owner.
		if let Some(node) = self.fl.lookup(&abs) {
			if let Some(diver) = self.fl.diversion_of(node) {
				let owner = self.fl.diversion_owner(diver);
				if self.fl.diversion_from(diver) == node && owner != self.pkg {
					let to = self.fl.diversion_to(diver);
					if to != 0 {
						abs = self.fl.node_path(to);
						debug!("item {} diverted to {abs}", item.path);
					}
				}
			}
		}

		// Ownership: overwriting another package's file needs a matching
		// Replaces. Directories are shared freely.
		let existing = self.fl.lookup_real(&abs);
		let mut replaced_owner = None;
		if item.kind != ItemKind::Directory {
			if let Some(node) = existing {
				if let Some(owner) = self.fl.owner_of(node) {
					if owner != self.pkg && !self.fl.pkg_name(owner).is_empty() {
						let owner_name = self.fl.pkg_name(owner).to_string();
						if !self.replaces_authorises(&owner_name) {
							return Err(Error::OverwriteConflict {
								other_pkg: owner_name,
								path: abs,
							});
						}
						replaced_owner = Some(node);
					}
				}
			}
		}

		let real = self.root.join(abs.trim_start_matches('/'));

		// Replacing a directory with something else is only allowed when
		// it holds nothing foreign.
		let meta = fs::symlink_metadata(&real).ok();
		if let Some(meta) = &meta {
			if meta.is_dir() && item.kind != ItemKind::Directory {
				self.check_dir_replace(&real, &abs, DIR_SCAN_DEPTH)?;
			}
		}

		self.apply(item, &real, meta.is_some(), data)?;

		// Bookkeeping on the cache side happens only after the bytes are
		// safely in place.
		if let Some(node) = replaced_owner {
			self.fl.set_node_flag(node, nflag::REPLACED);
			self.touched.push(node);
		}

		let node = match existing {
			Some(node) if self.fl.owner_of(node) == Some(self.pkg) => node,
			_ => {
				let node = self.fl.get_node(&abs, self.pkg, true, false)?;
				self.fl.set_node_flag(node, nflag::NEW_FILE);
				node
			},
		};
		self.fl.set_node_flag(node, nflag::UNPACKED);
		self.touched.push(node);

		Ok(())
	}

	fn apply(
		&mut self,
		item: &Item,
		real: &Path,
		existed: bool,
		data: &mut dyn Read,
	) -> Result<(), Error> {
		if let Some(parent) = real.parent() {
			fs::create_dir_all(parent).map_err(|e| Error::io("mkdir", parent, e))?;
		}

		if item.kind == ItemKind::Directory {
			if !existed {
				fs::create_dir_all(real).map_err(|e| Error::io("mkdir", real, e))?;
				self.undo.push(Undo::RemoveNew(real.to_path_buf()));
			}
			return Ok(());
		}

		// Stage the new content next to the target.
		let new_path = with_suffix(real, ".dpkg-new");
		let _ = fs::remove_file(&new_path);

		match item.kind {
			ItemKind::File => {
				let mut out = fs::File::create(&new_path)
					.map_err(|e| Error::io("create", &new_path, e))?;
				let written = io::copy(&mut data.take(item.size), &mut out)
					.map_err(|e| Error::io("write", &new_path, e))?;
				if written != item.size {
					let _ = fs::remove_file(&new_path);
					return Err(Error::parse(format!(
						"archive member {} is truncated",
						item.path
					)));
				}
			},
			ItemKind::SymbolicLink => {
				std::os::unix::fs::symlink(&item.link_target, &new_path)
					.map_err(|e| Error::io("symlink", &new_path, e))?;
			},
			ItemKind::HardLink => {
				let target = self.root.join(item.link_target.trim_start_matches('/'));
				fs::hard_link(&target, &new_path)
					.map_err(|e| Error::io("link", &new_path, e))?;
			},
			ItemKind::CharDevice | ItemKind::BlockDevice | ItemKind::Fifo => {
				let kind_bits = match item.kind {
					ItemKind::CharDevice => libc::S_IFCHR,
					ItemKind::BlockDevice => libc::S_IFBLK,
					_ => libc::S_IFIFO,
				};
				let cpath = CString::new(new_path.as_os_str().as_bytes())
					.map_err(|_| Error::parse("path contains a NUL"))?;
				let dev = libc::makedev(item.major, item.minor);
				let ret = unsafe { libc::mknod(cpath.as_ptr(), kind_bits | item.mode, dev) };
				if ret != 0 {
					return Err(Error::io(
						"mknod",
						&new_path,
						io::Error::last_os_error(),
					));
				}
			},
			ItemKind::Directory => unreachable!(),
		}

		// Preserve the old file, then move the new one into place.
		if existed {
			let tmp_path = with_suffix(real, ".dpkg-tmp");
			let _ = fs::remove_file(&tmp_path);
			if fs::hard_link(real, &tmp_path).is_err() {
				fs::rename(real, &tmp_path).map_err(|e| Error::io("rename", real, e))?;
			}
			self.undo.push(Undo::RestoreBackup(real.to_path_buf()));
		} else {
			self.undo.push(Undo::RemoveNew(real.to_path_buf()));
		}

		fs::rename(&new_path, real).map_err(|e| Error::io("rename", real, e))?;
		Ok(())
	}

	/// Commit the archive: drop backups and clear the transient flags.
	pub fn finish(mut self) -> Result<(), Error> {
		for undo in self.undo.drain(..) {
			if let Undo::RestoreBackup(real) = undo {
				let _ = fs::remove_file(with_suffix(&real, ".dpkg-tmp"));
			}
		}
		for node in self.touched.drain(..) {
			self.fl
				.clear_node_flag(node, nflag::NEW_FILE | nflag::UNPACKED | nflag::REPLACED);
		}
		Ok(())
	}

	/// Roll the archive back: restore every backup and drop every node
	/// created by this stream.
	pub fn abort(mut self) {
		for undo in self.undo.drain(..).rev() {
			match undo {
				Undo::RestoreBackup(real) => {
					let tmp = with_suffix(&real, ".dpkg-tmp");
					if fs::rename(&tmp, &real).is_err() {
						warn!("failed to restore backup of {}", real.display());
					}
				},
				Undo::RemoveNew(real) => {
					if real.is_dir() {
						let _ = fs::remove_dir(&real);
					} else {
						let _ = fs::remove_file(&real);
					}
				},
			}
		}

		// Newest first so package list unlinking stays cheap.
		for node in self.touched.drain(..).rev() {
			if self.fl.node_flags(node) & nflag::NEW_FILE != 0 {
				self.fl.unlink_from_pkg(self.pkg, node);
				self.fl.drop_node(node);
			} else {
				self.fl
					.clear_node_flag(node, nflag::UNPACKED | nflag::REPLACED);
			}
		}
		debug!("archive of {} rolled back", self.pkg_name);
	}
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
	let mut os = path.as_os_str().to_os_string();
	os.push(suffix);
	PathBuf::from(os)
}
