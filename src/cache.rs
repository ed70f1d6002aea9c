//! Contains Cache related structs.

use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

use crate::config::Config;
use crate::depcache::DepCache;
use crate::error::{AptErrors, Error};
use crate::listparser::ListParser;
use crate::policy::Policy;
use crate::raw::{dep, depend, flag, pkf, pkg, prv, ver, vrf, Arena, ArenaBuilder, Header};
use crate::records::PackageRecords;
use crate::tagfile::parse_tagfile;
use crate::util::{check_dep, cmp_versions};
use crate::Package;

/// Minor version stamped into package cache headers.
const PKG_CACHE_MINOR: u32 = 2;

/// Bucket count of the package hash table. Power of two, chosen once at
/// creation and recorded in the header.
const HASH_SIZE: u32 = 4096;

/// Selection of Upgrade type
#[repr(i32)]
#[derive(Clone, Debug)]
pub enum Upgrade {
	/// Upgrade will Install new and Remove packages in addition to
	/// upgrading them.
	///
	/// Equivalent to `apt full-upgrade` and `apt-get dist-upgrade`.
	FullUpgrade = 0,
	/// Upgrade will Install new but not Remove packages.
	///
	/// Equivalent to `apt upgrade`.
	Upgrade = 1,
	/// Upgrade will Not Install new or Remove packages.
	///
	/// Equivalent to `apt-get upgrade`.
	SafeUpgrade = 3,
}

/// Selection of how to sort
enum Sort {
	/// Disable the sort method.
	Disable,
	/// Enable the sort method.
	Enable,
	/// Reverse the sort method.
	Reverse,
}

/// Determines how to sort packages from the Cache.
pub struct PackageSort {
	names: bool,
	upgradable: Sort,
	virtual_pkgs: Sort,
	installed: Sort,
	auto_installed: Sort,
	auto_removable: Sort,
}

impl Default for PackageSort {
	fn default() -> PackageSort {
		PackageSort {
			names: false,
			upgradable: Sort::Disable,
			virtual_pkgs: Sort::Disable,
			installed: Sort::Disable,
			auto_installed: Sort::Disable,
			auto_removable: Sort::Disable,
		}
	}
}

impl PackageSort {
	/// Packages will be sorted by their names a -> z.
	pub fn names(mut self) -> Self {
		self.names = true;
		self
	}

	/// Only packages that are upgradable will be included.
	pub fn upgradable(mut self) -> Self {
		self.upgradable = Sort::Enable;
		self
	}

	/// Only packages that are NOT upgradable will be included.
	pub fn not_upgradable(mut self) -> Self {
		self.upgradable = Sort::Reverse;
		self
	}

	/// Virtual packages will be included.
	pub fn include_virtual(mut self) -> Self {
		self.virtual_pkgs = Sort::Enable;
		self
	}

	/// Only Virtual packages will be included.
	pub fn only_virtual(mut self) -> Self {
		self.virtual_pkgs = Sort::Reverse;
		self
	}

	/// Only packages that are installed will be included.
	pub fn installed(mut self) -> Self {
		self.installed = Sort::Enable;
		self
	}

	/// Only packages that are NOT installed will be included.
	pub fn not_installed(mut self) -> Self {
		self.installed = Sort::Reverse;
		self
	}

	/// Only packages that are auto installed will be included.
	pub fn auto_installed(mut self) -> Self {
		self.auto_installed = Sort::Enable;
		self
	}

	/// Only packages that are manually installed will be included.
	pub fn manually_installed(mut self) -> Self {
		self.auto_installed = Sort::Reverse;
		self
	}

	/// Only packages that are auto removable will be included.
	pub fn auto_removable(mut self) -> Self {
		self.auto_removable = Sort::Enable;
		self
	}

	/// Only packages that are NOT auto removable will be included.
	pub fn not_auto_removable(mut self) -> Self {
		self.auto_removable = Sort::Reverse;
		self
	}
}

/// Description of the repository an index file came from. Lands in the
/// PackageFile record so Policy can pin against it.
#[derive(Debug, Clone, Default)]
pub struct ReleaseInfo {
	pub archive: String,
	pub codename: String,
	pub version: String,
	pub origin: String,
	pub label: String,
	pub site: String,
	pub component: String,
	pub arch: String,
	pub not_automatic: bool,
}

/// One input file for the cache build.
#[derive(Debug, Clone)]
pub struct IndexSource {
	pub path: PathBuf,
	pub release: ReleaseInfo,
	/// The status file of the installer backend rather than a repository
	/// index.
	pub status: bool,
}

impl IndexSource {
	/// A repository package index.
	pub fn index(path: impl Into<PathBuf>, release: ReleaseInfo) -> IndexSource {
		IndexSource {
			path: path.into(),
			release,
			status: false,
		}
	}

	/// The installer backend's status file.
	pub fn status_file(path: impl Into<PathBuf>) -> IndexSource {
		IndexSource {
			path: path.into(),
			release: ReleaseInfo {
				archive: "now".to_string(),
				..Default::default()
			},
			status: true,
		}
	}
}

/// The main struct for accessing any and all package data.
pub struct Cache {
	arena: Arena,
	config: Config,
	depcache: OnceCell<DepCache>,
	policy: OnceCell<Policy>,
	records: OnceCell<PackageRecords>,
}

impl Cache {
	/// Open the cache for the configured system.
	///
	/// This is the entry point for normal operation: the status file and
	/// every index below `Dir::State::lists` are taken as sources, and
	/// the persisted cache under `Dir::Cache::pkgcache` is reused when
	/// it is still fresh.
	pub fn new(config: Config) -> Result<Cache, AptErrors> {
		let mut sources = vec![IndexSource::status_file(
			config.file("Dir::State::status", "/var/lib/dpkg/status"),
		)];

		let lists = config.dir("Dir::State::lists", "lists/");
		if let Ok(entries) = fs::read_dir(&lists) {
			for entry in entries.flatten() {
				let path = entry.path();
				if path.to_string_lossy().ends_with("_Packages") {
					sources.push(IndexSource::index(path, ReleaseInfo::default()));
				}
			}
		}

		let cache_file = config.file("Dir::Cache::pkgcache", "pkgcache.bin");
		Cache::open(&sources, Some(Path::new(&cache_file)), config)
	}

	/// Open or rebuild a cache over the given sources.
	///
	/// An existing blob at `cache_path` is memory mapped and reused when
	/// its header matches this build and the source files are unchanged;
	/// anything else triggers a silent full rebuild.
	pub fn open(
		sources: &[IndexSource],
		cache_path: Option<&Path>,
		config: Config,
	) -> Result<Cache, AptErrors> {
		if let Some(path) = cache_path {
			match Cache::try_map(sources, path, &config) {
				Ok(arena) => {
					debug!("reusing mapped cache at {}", path.display());
					return Ok(Cache::from_arena(arena, config));
				},
				Err(err) => debug!("cache at {} not reusable: {err}", path.display()),
			}
		}

		let mut errors = AptErrors::new();
		let arena = Cache::build(sources, &config, &mut errors)?;

		if let Some(path) = cache_path {
			Cache::persist(arena.bytes(), path)?;
		}

		if errors.pending_error() {
			return Err(errors);
		}
		Ok(Cache::from_arena(arena, config))
	}

	fn from_arena(arena: Arena, config: Config) -> Cache {
		Cache {
			arena,
			config,
			depcache: OnceCell::new(),
			policy: OnceCell::new(),
			records: OnceCell::new(),
		}
	}

	fn try_map(sources: &[IndexSource], path: &Path, _config: &Config) -> Result<Arena, Error> {
		let arena = Arena::map(path)?;
		let header = arena.header().ok_or_else(|| Error::CorruptCache {
			path: path.to_path_buf(),
			reason: "unreadable header".to_string(),
		})?;
		header.check(PKG_CACHE_MINOR, arena.len(), path)?;

		// Freshness: every configured source must appear with the size
		// and mtime it had when the cache was built, and nothing else.
		if header.packagefile_count as usize != sources.len() {
			return Err(Error::CorruptCache {
				path: path.to_path_buf(),
				reason: "source list changed".to_string(),
			});
		}

		for source in sources {
			let (size, mtime) = stat_file(&source.path)?;
			let mut file = header.first_file;
			let mut found = false;
			while file != 0 {
				if arena.str_at(arena.get(file + pkf::FILENAME))
					== source.path.to_string_lossy()
				{
					found = arena.get(file + pkf::FILE_SIZE) == size
						&& arena.get(file + pkf::MTIME) == mtime;
					break;
				}
				file = arena.get(file + pkf::NEXT_FILE);
			}
			if !found {
				return Err(Error::CorruptCache {
					path: path.to_path_buf(),
					reason: format!("{} changed since the last build", source.path.display()),
				});
			}
		}

		Ok(arena)
	}

	fn build(
		sources: &[IndexSource],
		config: &Config,
		errors: &mut AptErrors,
	) -> Result<Arena, AptErrors> {
		let mut builder = CacheBuilder::new()?;
		let parser = ListParser::new(config);

		for source in sources {
			let content = fs::read_to_string(&source.path)
				.map_err(|e| Error::io("read", &source.path, e))?;
			let (size, mtime) = stat_file(&source.path)?;

			let file = builder.new_package_file(source, size, mtime)?;

			let sections = match parse_tagfile(&content) {
				Ok(sections) => sections,
				Err(err) => {
					errors.error(format!("{}: {err}", source.path.display()));
					continue;
				},
			};

			for section in &sections {
				// A malformed stanza is skipped, not fatal.
				if let Err(err) = parser.load_section(&mut builder, section, file) {
					errors.warning(format!("{}: {err}", source.path.display()));
				}
			}
		}

		Ok(Arena::from_vec(builder.finish()))
	}

	/// Write cache bytes to disk through a rename from a sibling, so a
	/// crash mid write leaves the previous cache intact.
	fn persist(bytes: &[u8], path: &Path) -> Result<(), Error> {
		let new_path = path.with_extension("bin.new");
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent).map_err(|e| Error::io("mkdir", parent, e))?;
		}
		fs::write(&new_path, bytes).map_err(|e| Error::io("write", &new_path, e))?;
		fs::rename(&new_path, path).map_err(|e| Error::io("rename", path, e))?;
		Ok(())
	}

	pub(crate) fn arena(&self) -> &Arena { &self.arena }

	pub fn config(&self) -> &Config { &self.config }

	pub(crate) fn header(&self) -> Header { self.arena.header().unwrap_or_default() }

	/// Get the DepCache
	pub fn depcache(&self) -> &DepCache { self.depcache.get_or_init(|| DepCache::new(self)) }

	/// Get the Policy
	pub fn policy(&self) -> &Policy { self.policy.get_or_init(|| Policy::new(self)) }

	/// Replace the Policy before first use, for callers that loaded pins.
	///
	/// Returns false if the policy was already in use.
	pub fn set_policy(&self, policy: Policy) -> bool { self.policy.set(policy).is_ok() }

	/// Get the PkgRecords
	pub fn records(&self) -> &PackageRecords {
		self.records.get_or_init(PackageRecords::new)
	}

	/// Get a single package.
	///
	/// `cache.get("apt")` Returns a Package object for the native arch.
	///
	/// `cache.get("apt:i386")` Returns a Package object for the i386 arch
	pub fn get(&self, name: &str) -> Option<Package> {
		let (name, arch) = match name.split_once(':') {
			Some((name, arch)) => (name, Some(arch)),
			None => (name, None),
		};
		let off = self.find_pkg_offset(name, arch)?;
		Some(Package::new(self, off))
	}

	pub(crate) fn find_pkg_offset(&self, name: &str, arch: Option<&str>) -> Option<u32> {
		let header = self.header();
		if header.hash_size == 0 {
			return None;
		}
		let bucket = crate::raw::pkg_hash(name, header.hash_size);
		let mut off = self.arena.get(header.hash_table + bucket * 4);
		let native = self.config.architecture();
		let wanted = arch.unwrap_or(&native);

		let mut name_match = None;
		while off != 0 {
			if self.arena.str_at(self.arena.get(off + pkg::NAME)) == name {
				if self.arena.str_at(self.arena.get(off + pkg::ARCH)) == wanted {
					return Some(off);
				}
				name_match.get_or_insert(off);
			}
			off = self.arena.get(off + pkg::NEXT_PACKAGE);
		}

		// No exact architecture hit. Fall back to any package of that
		// name unless the caller demanded a specific one.
		match arch {
			Some(_) => None,
			None => name_match,
		}
	}

	/// Iterate through the packages in hash table order.
	pub fn iter(&self) -> CacheIter {
		CacheIter {
			cache: self,
			bucket: 0,
			off: 0,
		}
	}

	/// Every package offset, in hash table order.
	pub(crate) fn pkg_offsets(&self) -> Vec<u32> {
		let header = self.header();
		let mut offsets = Vec::with_capacity(header.package_count as usize);
		for bucket in 0..header.hash_size {
			let mut off = self.arena.get(header.hash_table + bucket * 4);
			while off != 0 {
				offsets.push(off);
				off = self.arena.get(off + pkg::NEXT_PACKAGE);
			}
		}
		offsets
	}

	/// Package offsets indexed by package id.
	pub(crate) fn pkgs_by_id(&self) -> Vec<u32> {
		let mut by_id = vec![0u32; self.header().package_count as usize];
		for off in self.pkg_offsets() {
			let id = self.arena.get(off + pkg::ID) as usize;
			if id < by_id.len() {
				by_id[id] = off;
			}
		}
		by_id
	}

	/// Version offsets indexed by version id.
	pub(crate) fn vers_by_id(&self) -> Vec<u32> {
		let mut by_id = vec![0u32; self.header().version_count as usize];
		for p in self.pkg_offsets() {
			let mut v = self.arena.get(p + pkg::VERSIONS);
			while v != 0 {
				let id = self.arena.get(v + ver::ID) as usize;
				if id < by_id.len() {
					by_id[id] = v;
				}
				v = self.arena.get(v + ver::NEXT_VER);
			}
		}
		by_id
	}

	/// All versions able to satisfy the dependency at `dep_off`.
	///
	/// For a positive dependency these are the versions of the target
	/// that match the restriction plus any matching provider versions.
	/// For a negative dependency the parent package itself never
	/// conflicts with its own providers or versions.
	pub(crate) fn dep_targets(&self, dep_off: u32) -> Vec<u32> {
		let a = &self.arena;
		let target_pkg = a.get(dep_off + depend::TARGET_PKG);
		let dep_type = a.get8(dep_off + depend::DEP_TYPE);
		let op = a.get8(dep_off + depend::COMP_TYPE);
		let target_ver = a.str_at(a.get(dep_off + depend::TARGET_VER));
		let parent_pkg = a.get(a.get(dep_off + depend::PARENT_VER) + ver::PARENT_PKG);
		let negative = dep::is_negative(dep_type);

		let mut out = Vec::new();

		if !(negative && target_pkg == parent_pkg) {
			let mut v = a.get(target_pkg + pkg::VERSIONS);
			while v != 0 {
				let vstr = a.str_at(a.get(v + ver::VERSION));
				if target_ver.is_empty() || check_dep(vstr, op, target_ver) {
					out.push(v);
				}
				v = a.get(v + ver::NEXT_VER);
			}
		}

		// Providers of the target package.
		let mut p = a.get(target_pkg + pkg::PROVIDES);
		while p != 0 {
			let prv_ver = a.str_at(a.get(p + prv::TARGET_VER));
			let providing = a.get(p + prv::PARENT_VER);
			let provider_pkg = a.get(providing + ver::PARENT_PKG);

			let skip_self = negative && provider_pkg == parent_pkg;
			let matches = if target_ver.is_empty() {
				true
			} else {
				// A versioned restriction only matches versioned provides.
				!prv_ver.is_empty() && check_dep(prv_ver, op, target_ver)
			};
			if matches && !skip_self && !out.contains(&providing) {
				out.push(providing);
			}
			p = a.get(p + prv::NEXT_PRV_PKG);
		}

		out
	}

	/// An iterator of packages in the cache.
	pub fn packages(&self, sort: &PackageSort) -> impl Iterator<Item = Package> {
		let mut pkg_list = vec![];
		for pkg in self.iter() {
			match sort.virtual_pkgs {
				// Virtual packages are enabled, include them.
				Sort::Enable => {},
				// If disabled and pkg has no versions, exclude
				Sort::Disable => {
					if !pkg.has_versions() {
						continue;
					}
				},
				// If reverse and the package has versions, exclude
				// This section is for if you only want virtual packages
				Sort::Reverse => {
					if pkg.has_versions() {
						continue;
					}
				},
			}

			match sort.upgradable {
				Sort::Disable => {},
				Sort::Enable => {
					if !pkg.is_installed() || !self.depcache().is_upgradable(&pkg) {
						continue;
					}
				},
				Sort::Reverse => {
					if pkg.is_installed() && self.depcache().is_upgradable(&pkg) {
						continue;
					}
				},
			}

			match sort.installed {
				Sort::Disable => {},
				Sort::Enable => {
					if !pkg.is_installed() {
						continue;
					}
				},
				Sort::Reverse => {
					if pkg.is_installed() {
						continue;
					}
				},
			}

			match sort.auto_installed {
				Sort::Disable => {},
				Sort::Enable => {
					if !self.depcache().is_auto_installed(&pkg) {
						continue;
					}
				},
				Sort::Reverse => {
					if self.depcache().is_auto_installed(&pkg) {
						continue;
					}
				},
			}

			match sort.auto_removable {
				Sort::Disable => {},
				Sort::Enable => {
					if !pkg.is_auto_removable() {
						continue;
					}
				},
				Sort::Reverse => {
					if pkg.is_auto_removable() {
						continue;
					}
				},
			}

			// If this is reached we're clear to include the package.
			pkg_list.push(pkg);
		}

		if sort.names {
			pkg_list.sort_by_cached_key(|pkg| pkg.name().to_string());
		}

		pkg_list.into_iter()
	}

	/// Mark all packages for upgrade
	pub fn upgrade(&self, upgrade_type: Upgrade) -> Result<(), AptErrors> {
		self.depcache().upgrade(self, upgrade_type)
	}

	/// Resolve dependencies with the changes marked on all packages. This
	/// marks additional packages for installation/removal to satisfy the
	/// dependency chain.
	///
	/// Note that just running a `mark_*` function on a package doesn't
	/// guarantee that the selected state will be kept during dependency
	/// resolution. If you need such, make sure to run
	/// [`crate::Package::protect`] after marking your requested
	/// modifications.
	///
	/// If `fix_broken` is set to [`true`], the library will try to repair
	/// broken dependencies of installed packages.
	pub fn resolve(&self, fix_broken: bool) -> Result<(), AptErrors> {
		if self.config.find("APT::Solver", "classic") == "3.0" {
			crate::solver::Solver::new(self).solve()?;
			Ok(())
		} else {
			self.depcache().resolver().resolve(self, fix_broken)
		}
	}

	/// Autoinstall every broken package and run the problem resolver
	/// Returns false if the problem resolver fails.
	pub fn fix_broken(&self) -> bool {
		let depcache = self.depcache();
		for pkg in self.iter() {
			if depcache.is_inst_broken(&pkg) && !depcache.marked_delete(&pkg) {
				depcache.mark_install(&pkg, true, false);
			}
		}
		self.resolve(true).is_ok()
	}

	/// An iterator over the packages that will be altered when the
	/// planned changes are committed.
	///
	/// # sort_name:
	/// * [`true`] = Packages will be in alphabetical order
	/// * [`false`] = Packages will not be sorted by name
	pub fn get_changes(&self, sort_name: bool) -> impl Iterator<Item = Package> {
		let mut changed = Vec::new();
		let depcache = self.depcache();

		for pkg in self.iter() {
			if depcache.marked_install(&pkg)
				|| depcache.marked_delete(&pkg)
				|| depcache.marked_upgrade(&pkg)
				|| depcache.marked_downgrade(&pkg)
				|| depcache.marked_reinstall(&pkg)
			{
				changed.push(pkg);
			}
		}

		if sort_name {
			changed.sort_by_cached_key(|pkg| pkg.name().to_string());
		}

		changed.into_iter()
	}
}

fn stat_file(path: &Path) -> Result<(u32, u32), Error> {
	let meta = fs::metadata(path).map_err(|e| Error::io("stat", path, e))?;
	let mtime = meta
		.modified()
		.ok()
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_secs() as u32)
		.unwrap_or(0);
	Ok((meta.len() as u32, mtime))
}

/// Iterator Implementation for the Cache.
pub struct CacheIter<'a> {
	cache: &'a Cache,
	bucket: u32,
	off: u32,
}

impl<'a> Iterator for CacheIter<'a> {
	type Item = Package<'a>;

	fn next(&mut self) -> Option<Self::Item> {
		let header = self.cache.header();
		let arena = self.cache.arena();

		while self.off == 0 {
			if self.bucket >= header.hash_size {
				return None;
			}
			self.off = arena.get(header.hash_table + self.bucket * 4);
			self.bucket += 1;
		}

		let off = self.off;
		self.off = arena.get(off + pkg::NEXT_PACKAGE);
		Some(Package::new(self.cache, off))
	}
}

/// Allocates records into a fresh arena during a cache build.
pub(crate) struct CacheBuilder {
	b: ArenaBuilder,
	header: Header,
	hash_table: u32,
	last_file: u32,
}

impl CacheBuilder {
	pub fn new() -> Result<CacheBuilder, Error> {
		let mut b = ArenaBuilder::new();
		let hash_table = b.alloc(HASH_SIZE * 4)?;

		let mut header = Header::new(PKG_CACHE_MINOR);
		header.hash_table = hash_table;
		header.hash_size = HASH_SIZE;

		Ok(CacheBuilder {
			b,
			header,
			hash_table,
			last_file: 0,
		})
	}

	pub fn get(&self, off: u32) -> u32 { self.b.get(off) }

	pub fn set(&mut self, off: u32, value: u32) { self.b.set(off, value) }

	pub fn set8(&mut self, off: u32, value: u8) { self.b.set8(off, value) }

	pub fn add_string(&mut self, s: &str) -> Result<u32, Error> { self.b.add_string(s) }

	pub fn find_pkg(&self, name: &str, arch: &str) -> Option<u32> {
		let bucket = crate::raw::pkg_hash(name, HASH_SIZE);
		let mut off = self.b.get(self.hash_table + bucket * 4);
		while off != 0 {
			if self.b.str_at(self.b.get(off + pkg::NAME)) == name
				&& self.b.str_at(self.b.get(off + pkg::ARCH)) == arch
			{
				return Some(off);
			}
			off = self.b.get(off + pkg::NEXT_PACKAGE);
		}
		None
	}

	pub fn find_or_create_pkg(&mut self, name: &str, arch: &str) -> Result<u32, Error> {
		if let Some(off) = self.find_pkg(name, arch) {
			return Ok(off);
		}

		let name_off = self.b.add_string(name)?;
		let arch_off = self.b.add_string(arch)?;
		let off = self.b.alloc(pkg::SIZE)?;
		self.b.set(off + pkg::NAME, name_off);
		self.b.set(off + pkg::ARCH, arch_off);
		self.b.set(off + pkg::ID, self.header.package_count);
		self.header.package_count += 1;

		// Chain into the hash bucket.
		let bucket = self.hash_table + crate::raw::pkg_hash(name, HASH_SIZE) * 4;
		let head = self.b.get(bucket);
		self.b.set(off + pkg::NEXT_PACKAGE, head);
		self.b.set(bucket, off);

		Ok(off)
	}

	/// Find a version of the package by exact string, or insert a new
	/// one keeping the list in descending order.
	pub fn find_or_create_version(
		&mut self,
		pkg_off: u32,
		version: &str,
	) -> Result<(u32, bool), Error> {
		let mut prev = 0;
		let mut cur = self.b.get(pkg_off + pkg::VERSIONS);
		while cur != 0 {
			let existing = self.b.str_at(self.b.get(cur + ver::VERSION));
			if existing == version {
				return Ok((cur, false));
			}
			if cmp_versions(existing, version) == std::cmp::Ordering::Less {
				break;
			}
			prev = cur;
			cur = self.b.get(cur + ver::NEXT_VER);
		}

		let ver_str = self.b.add_string(version)?;
		let off = self.b.alloc(ver::SIZE)?;
		self.b.set(off + ver::PARENT_PKG, pkg_off);
		self.b.set(off + ver::VERSION, ver_str);
		self.b.set(off + ver::ID, self.header.version_count);
		self.header.version_count += 1;

		self.b.set(off + ver::NEXT_VER, cur);
		if prev == 0 {
			self.b.set(pkg_off + pkg::VERSIONS, off);
		} else {
			self.b.set(prev + ver::NEXT_VER, off);
		}

		Ok((off, true))
	}

	/// Append a dependency to the version's list and to the reverse list
	/// of its target.
	pub fn new_dep(
		&mut self,
		ver_off: u32,
		target_pkg: u32,
		target_ver: &str,
		comp: u8,
		dep_type: u8,
	) -> Result<u32, Error> {
		let ver_str = self.b.add_string(target_ver)?;
		let off = self.b.alloc(depend::SIZE)?;
		self.b.set(off + depend::PARENT_VER, ver_off);
		self.b.set(off + depend::TARGET_PKG, target_pkg);
		self.b.set(off + depend::TARGET_VER, ver_str);
		self.b.set8(off + depend::COMP_TYPE, comp);
		self.b.set8(off + depend::DEP_TYPE, dep_type);
		self.b.set(off + depend::ID, self.header.dependency_count);
		self.header.dependency_count += 1;

		// Parse order matters for or groups, so append at the tail.
		let mut tail = self.b.get(ver_off + ver::DEPENDS);
		if tail == 0 {
			self.b.set(ver_off + ver::DEPENDS, off);
		} else {
			while self.b.get(tail + depend::NEXT_DEP) != 0 {
				tail = self.b.get(tail + depend::NEXT_DEP);
			}
			self.b.set(tail + depend::NEXT_DEP, off);
		}

		let rev_head = self.b.get(target_pkg + pkg::REV_DEPENDS);
		self.b.set(off + depend::NEXT_REV, rev_head);
		self.b.set(target_pkg + pkg::REV_DEPENDS, off);

		Ok(off)
	}

	pub fn new_provides(
		&mut self,
		ver_off: u32,
		target_pkg: u32,
		provided_ver: &str,
	) -> Result<u32, Error> {
		let ver_str = self.b.add_string(provided_ver)?;
		let off = self.b.alloc(prv::SIZE)?;
		self.b.set(off + prv::PARENT_VER, ver_off);
		self.b.set(off + prv::TARGET_PKG, target_pkg);
		self.b.set(off + prv::TARGET_VER, ver_str);
		self.header.provides_count += 1;

		let ver_head = self.b.get(ver_off + ver::PROVIDES);
		self.b.set(off + prv::NEXT_PRV_VER, ver_head);
		self.b.set(ver_off + ver::PROVIDES, off);

		let pkg_head = self.b.get(target_pkg + pkg::PROVIDES);
		self.b.set(off + prv::NEXT_PRV_PKG, pkg_head);
		self.b.set(target_pkg + pkg::PROVIDES, off);

		Ok(off)
	}

	pub fn new_package_file(
		&mut self,
		source: &IndexSource,
		size: u32,
		mtime: u32,
	) -> Result<u32, Error> {
		let filename = self.b.add_string(&source.path.to_string_lossy())?;
		let archive = self.b.add_string(&source.release.archive)?;
		let codename = self.b.add_string(&source.release.codename)?;
		let version = self.b.add_string(&source.release.version)?;
		let origin = self.b.add_string(&source.release.origin)?;
		let label = self.b.add_string(&source.release.label)?;
		let site = self.b.add_string(&source.release.site)?;
		let component = self.b.add_string(&source.release.component)?;
		let arch = self.b.add_string(&source.release.arch)?;

		let off = self.b.alloc(pkf::SIZE)?;
		self.b.set(off + pkf::FILENAME, filename);
		self.b.set(off + pkf::ARCHIVE, archive);
		self.b.set(off + pkf::CODENAME, codename);
		self.b.set(off + pkf::VERSION, version);
		self.b.set(off + pkf::ORIGIN, origin);
		self.b.set(off + pkf::LABEL, label);
		self.b.set(off + pkf::SITE, site);
		self.b.set(off + pkf::COMPONENT, component);
		self.b.set(off + pkf::ARCH, arch);
		self.b.set(off + pkf::FILE_SIZE, size);
		self.b.set(off + pkf::MTIME, mtime);
		self.b.set(off + pkf::ID, self.header.packagefile_count);
		self.header.packagefile_count += 1;

		let mut flags = 0;
		if source.status {
			flags |= flag::NOT_SOURCE;
		}
		if source.release.not_automatic {
			flags |= flag::NOT_AUTOMATIC;
		}
		self.b.set(off + pkf::FLAGS, flags);

		// Keep file order, the chain is also the freshness record.
		if self.last_file == 0 {
			self.header.first_file = off;
		} else {
			self.b.set(self.last_file + pkf::NEXT_FILE, off);
		}
		self.last_file = off;

		Ok(off)
	}

	pub fn new_verfile(
		&mut self,
		ver_off: u32,
		file: u32,
		offset: u32,
		size: u32,
	) -> Result<u32, Error> {
		let off = self.b.alloc(vrf::SIZE)?;
		self.b.set(off + vrf::FILE, file);
		self.b.set(off + vrf::OFFSET, offset);
		self.b.set(off + vrf::STANZA_SIZE, size);
		self.header.verfile_count += 1;

		let mut tail = self.b.get(ver_off + ver::FILE_LIST);
		if tail == 0 {
			self.b.set(ver_off + ver::FILE_LIST, off);
		} else {
			while self.b.get(tail + vrf::NEXT) != 0 {
				tail = self.b.get(tail + vrf::NEXT);
			}
			self.b.set(tail + vrf::NEXT, off);
		}

		Ok(off)
	}

	pub fn finish(mut self) -> Vec<u8> {
		if self.header.package_count == 0 {
			warn!("built an empty package cache");
		}
		self.b.finish(&mut self.header)
	}
}
