use std::cell::OnceCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::raw::{flag, prv, ver, vrf};
use crate::util::cmp_versions;
use crate::{
	create_depends_map, Cache, DepType, Dependency, Package, PackageFile, Provider, VersionFile,
};

/// Represents a single Version of a package.
pub struct Version<'a> {
	pub(crate) off: u32,
	cache: &'a Cache,
	depends_map: OnceCell<HashMap<DepType, Vec<Dependency<'a>>>>,
}

impl<'a> Version<'a> {
	pub fn new(off: u32, cache: &'a Cache) -> Version<'a> {
		Version {
			off,
			cache,
			depends_map: OnceCell::new(),
		}
	}

	/// The version string of the version. "1.4.10"
	pub fn version(&self) -> &'a str {
		let a = self.cache.arena();
		a.str_at(a.get(self.off + ver::VERSION))
	}

	/// The offset of this version inside the cache arena.
	pub fn offset(&self) -> u32 { self.off }

	/// Sequential id of the version, usable as a side table index.
	pub fn id(&self) -> u32 { self.cache.arena().get(self.off + ver::ID) }

	/// The architecture of the version, which is its parent's.
	pub fn arch(&self) -> &'a str { self.parent_view().arch() }

	/// The section of the package as it appears in the index.
	pub fn section(&self) -> Option<&'a str> {
		let a = self.cache.arena();
		let s = a.get(self.off + ver::SECTION);
		if s == 0 {
			return None;
		}
		Some(a.str_at(s))
	}

	/// The priority of the package as determined by its stanza.
	pub fn priority(&self) -> u8 { self.cache.arena().get8(self.off + ver::PRIORITY) }

	/// The size of the archive for this version.
	pub fn size(&self) -> u64 { u64::from(self.cache.arena().get(self.off + ver::SIZE_BYTES)) }

	/// The unpacked size of this version.
	pub fn installed_size(&self) -> u64 {
		u64::from(self.cache.arena().get(self.off + ver::INSTALLED_SIZE))
	}

	/// True if this version is currently installed.
	pub fn is_installed(&self) -> bool {
		let a = self.cache.arena();
		a.get(a.get(self.off + ver::PARENT_PKG) + crate::raw::pkg::CURRENT_VER) == self.off
	}

	/// True if any origin of this version can serve the archive.
	pub fn is_downloadable(&self) -> bool {
		self.package_files()
			.any(|file| !file.flag(flag::NOT_SOURCE))
	}

	/// Returns a list of providers
	pub fn provides(&self) -> impl Iterator<Item = Provider<'a>> {
		let cache = self.cache;
		let mut off = cache.arena().get(self.off + ver::PROVIDES);
		std::iter::from_fn(move || {
			if off == 0 {
				return None;
			}
			let this = off;
			off = cache.arena().get(this + prv::NEXT_PRV_VER);
			Some(Provider::new(this, cache))
		})
	}

	pub fn version_files(&self) -> impl Iterator<Item = VersionFile<'a>> {
		let cache = self.cache;
		let mut off = cache.arena().get(self.off + ver::FILE_LIST);
		std::iter::from_fn(move || {
			if off == 0 {
				return None;
			}
			let this = off;
			off = cache.arena().get(this + vrf::NEXT);
			Some(VersionFile::new(this, cache))
		})
	}

	/// Returns an iterator of PackageFiles (Origins) for the version
	pub fn package_files(&self) -> impl Iterator<Item = PackageFile<'a>> {
		self.version_files().map(|vf| vf.package_file())
	}

	/// Return the version's parent package.
	pub fn parent(&self) -> Package<'a> { self.parent_view() }

	fn parent_view(&self) -> Package<'a> {
		let a = self.cache.arena();
		Package::new(self.cache, a.get(self.off + ver::PARENT_PKG))
	}

	/// Returns a reference to the Dependency Map owned by the Version
	///
	/// Dependencies are in a `Vec<Dependency>`
	///
	/// The Dependency struct represents an Or Group of dependencies.
	pub fn depends_map(&self) -> &HashMap<DepType, Vec<Dependency<'a>>> {
		self.depends_map.get_or_init(|| {
			let first = self.cache.arena().get(self.off + ver::DEPENDS);
			create_depends_map(self.cache, first, false)
		})
	}

	/// Returns a reference Vector, if it exists, for the given key.
	///
	/// See the doc for `depends_map()` for more information.
	pub fn get_depends(&self, key: &DepType) -> Option<&Vec<Dependency<'a>>> {
		self.depends_map().get(key)
	}

	/// Returns a Reference Vector, if it exists, for "Enhances".
	pub fn enhances(&self) -> Option<&Vec<Dependency<'a>>> { self.get_depends(&DepType::Enhances) }

	/// Returns a Reference Vector, if it exists,
	/// for "Depends" and "PreDepends".
	pub fn dependencies(&self) -> Option<Vec<&Dependency<'a>>> {
		let mut ret_vec: Vec<&Dependency> = Vec::new();

		if let Some(dep_list) = self.get_depends(&DepType::Depends) {
			ret_vec.extend(dep_list);
		}
		if let Some(dep_list) = self.get_depends(&DepType::PreDepends) {
			ret_vec.extend(dep_list);
		}

		if ret_vec.is_empty() {
			return None;
		}
		Some(ret_vec)
	}

	/// Returns a Reference Vector, if it exists, for "Recommends".
	pub fn recommends(&self) -> Option<&Vec<Dependency<'a>>> {
		self.get_depends(&DepType::Recommends)
	}

	/// Returns a Reference Vector, if it exists, for "Suggests".
	pub fn suggests(&self) -> Option<&Vec<Dependency<'a>>> { self.get_depends(&DepType::Suggests) }

	/// Set this version as the candidate of its package.
	pub fn set_candidate(&self) { self.cache.depcache().set_candidate(self); }

	/// Read the whole stanza of this version back out of its index.
	pub fn get_record(&self, field: &str) -> Option<String> {
		let vf = self.version_files().next()?;
		self.cache.records().get_field(self.cache, &vf, field)
	}
}

impl<'a> Clone for Version<'a> {
	fn clone(&self) -> Self {
		Self {
			off: self.off,
			cache: self.cache,
			depends_map: OnceCell::new(),
		}
	}
}

impl<'a> PartialEq for Version<'a> {
	fn eq(&self, other: &Self) -> bool { cmp_versions(self.version(), other.version()).is_eq() }
}

impl<'a> PartialOrd for Version<'a> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(cmp_versions(self.version(), other.version()))
	}
}

impl<'a> fmt::Display for Version<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{} {}", self.parent().name(), self.version())?;
		Ok(())
	}
}

impl<'a> fmt::Debug for Version<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Version")
			.field("version", &self.version())
			.field("section", &self.section())
			.field("is_installed", &self.is_installed())
			.finish_non_exhaustive()
	}
}
