use std::collections::HashMap;
use std::fmt;

use crate::raw::{dep, depend, ver};
use crate::{Cache, Package, Version};

/// Cached dependency state bits maintained by the DepCache.
#[allow(non_upper_case_globals, non_snake_case)]
pub mod DepFlags {
	pub const DepNow: u8 = 1;
	pub const DepInstall: u8 = 2;
	pub const DepCVer: u8 = 4;
	pub const DepGNow: u8 = 8;
	pub const DepGInstall: u8 = 16;
	pub const DepGVer: u8 = 32;
}

#[cfg_attr(feature = "serde", derive(serde::Serialize))]
/// The different types of Dependencies.
#[derive(Debug, Eq, PartialEq, Hash, Clone)]
pub enum DepType {
	Depends = 1,
	PreDepends = 2,
	Suggests = 3,
	Recommends = 4,
	Conflicts = 5,
	Replaces = 6,
	Obsoletes = 7,
	DpkgBreaks = 8,
	Enhances = 9,
}

impl From<u8> for DepType {
	fn from(value: u8) -> Self {
		match value {
			1 => DepType::Depends,
			2 => DepType::PreDepends,
			3 => DepType::Suggests,
			4 => DepType::Recommends,
			5 => DepType::Conflicts,
			6 => DepType::Replaces,
			7 => DepType::Obsoletes,
			8 => DepType::DpkgBreaks,
			9 => DepType::Enhances,
			_ => panic!("Dependency is malformed?"),
		}
	}
}

impl AsRef<str> for DepType {
	fn as_ref(&self) -> &str { self.to_str() }
}

impl DepType {
	pub fn to_str(&self) -> &'static str {
		match self {
			DepType::Depends => "Depends",
			DepType::PreDepends => "PreDepends",
			DepType::Suggests => "Suggests",
			DepType::Recommends => "Recommends",
			DepType::Conflicts => "Conflicts",
			DepType::Replaces => "Replaces",
			DepType::Obsoletes => "Obsoletes",
			DepType::DpkgBreaks => "Breaks",
			DepType::Enhances => "Enhances",
		}
	}
}

impl fmt::Display for DepType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result { write!(f, "{}", self.as_ref()) }
}

/// A struct representing a Base Dependency.
pub struct BaseDep<'a> {
	pub(crate) off: u32,
	cache: &'a Cache,
	reverse: bool,
}

impl<'a> BaseDep<'a> {
	pub fn new(off: u32, cache: &'a Cache, reverse: bool) -> BaseDep<'a> {
		BaseDep {
			off,
			cache,
			reverse,
		}
	}

	/// This is the name of the dependency.
	pub fn name(&self) -> &'a str { self.target_package().name() }

	/// The offset of this dependency inside the cache arena.
	pub fn offset(&self) -> u32 { self.off }

	/// Sequential id of the dependency, usable as a side table index.
	pub fn id(&self) -> u32 { self.cache.arena().get(self.off + depend::ID) }

	/// Return the target package.
	///
	/// For Reverse Dependencies this will actually return the parent
	/// package
	pub fn target_package(&self) -> Package<'a> {
		let a = self.cache.arena();
		if self.reverse {
			let parent_ver = a.get(self.off + depend::PARENT_VER);
			Package::new(self.cache, a.get(parent_ver + ver::PARENT_PKG))
		} else {
			Package::new(self.cache, a.get(self.off + depend::TARGET_PKG))
		}
	}

	/// The parent version that declares this dependency.
	pub fn parent_version(&self) -> Version<'a> {
		let a = self.cache.arena();
		Version::new(a.get(self.off + depend::PARENT_VER), self.cache)
	}

	/// The target version &str of the dependency if specified.
	pub fn version(&self) -> Option<&'a str> {
		if self.reverse {
			return Some(self.parent_version().version());
		}
		let a = self.cache.arena();
		let v = a.get(self.off + depend::TARGET_VER);
		if v == 0 {
			return None;
		}
		Some(a.str_at(v))
	}

	/// The Dependency Type. Depends, Recommends, etc.
	pub fn dep_type(&self) -> DepType {
		DepType::from(self.cache.arena().get8(self.off + depend::DEP_TYPE))
	}

	/// The raw comparison operator byte, including the or flag.
	pub(crate) fn comp_op(&self) -> u8 { self.cache.arena().get8(self.off + depend::COMP_TYPE) }

	/// Comparison type of the dependency version, if specified.
	pub fn comp_type(&self) -> Option<&'static str> {
		match self.comp_op() & !dep::OR {
			dep::LESS_EQ => Some("<="),
			dep::GREATER_EQ => Some(">="),
			dep::LESS => Some("<"),
			dep::GREATER => Some(">"),
			dep::EQUALS => Some("="),
			dep::NOT_EQUALS => Some("!="),
			_ => None,
		}
	}

	/// Returns true if the dependency type is critical.
	///
	/// Depends, PreDepends, Conflicts, Obsoletes, Breaks
	/// will return [true].
	///
	/// Suggests, Recommends, Replaces and Enhances
	/// will return [false].
	pub fn is_critical(&self) -> bool {
		dep::is_critical(self.cache.arena().get8(self.off + depend::DEP_TYPE))
	}

	/// Return True if the dep is reverse, false if normal
	pub fn is_reverse(&self) -> bool { self.reverse }

	/// Return true if this dep is Or'd with the next. The last dep in
	/// the or group will return False.
	pub fn or_dep(&self) -> bool { self.comp_op() & dep::OR != 0 }

	/// Iterate all Versions that are able to satisfy this dependency
	pub fn all_targets(&self) -> Vec<Version<'a>> {
		self.cache
			.dep_targets(self.off)
			.into_iter()
			.map(|off| Version::new(off, self.cache))
			.collect()
	}
}

impl fmt::Display for BaseDep<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		if let (Some(comp), Some(version)) = (self.comp_type(), self.version()) {
			write!(f, "({} {comp} {version})", self.name())
		} else {
			write!(f, "({})", self.name())
		}
	}
}

impl fmt::Debug for BaseDep<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("BaseDep")
			.field("name", &self.name())
			.field("comp", &self.comp_type())
			.field("version", &self.version())
			.field("dep_type", &self.dep_type())
			.field("is_reverse", &self.is_reverse())
			.finish()
	}
}

/// A struct representing a single Dependency record.
///
/// This can contain multiple Base Dependencies that can
/// satisfy the same Dependency.
#[derive(fmt::Debug)]
pub struct Dependency<'a> {
	pub(crate) base_deps: Vec<BaseDep<'a>>,
}

impl<'a> Dependency<'a> {
	/// Return the Dep Type of this group. Depends, Pre-Depends.
	pub fn dep_type(&self) -> DepType { self.base_deps[0].dep_type() }

	/// Returns True if there are multiple dependencies that can satisfy
	/// this
	pub fn is_or(&self) -> bool { self.base_deps.len() > 1 }

	/// Returns a reference to the first BaseDep
	pub fn first(&self) -> &BaseDep<'a> { &self.base_deps[0] }

	pub fn iter(&self) -> impl Iterator<Item = &BaseDep<'a>> { self.base_deps.iter() }

	pub fn len(&self) -> usize { self.base_deps.len() }

	pub fn is_empty(&self) -> bool { self.base_deps.is_empty() }
}

impl<'a> std::ops::Index<usize> for Dependency<'a> {
	type Output = BaseDep<'a>;

	fn index(&self, index: usize) -> &Self::Output { &self.base_deps[index] }
}

impl fmt::Display for Dependency<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let mut dep_str = String::new();

		for (i, base_dep) in self.iter().enumerate() {
			dep_str += &base_dep.to_string();
			if i + 1 != self.len() {
				dep_str += " | "
			}
		}

		write!(
			f,
			"{} {:?} {dep_str}",
			self.first().parent_version().parent().fullname(false),
			self.dep_type(),
		)?;
		Ok(())
	}
}

/// Walk a dependency chain and group it by type and or relation.
///
/// For forward chains consecutive records carrying the or flag belong to
/// one group. Reverse chains cannot be grouped, every record is its own
/// group.
pub fn create_depends_map(
	cache: &Cache,
	first: u32,
	reverse: bool,
) -> HashMap<DepType, Vec<Dependency>> {
	let a = cache.arena();
	let mut dependencies: HashMap<DepType, Vec<Dependency>> = HashMap::new();
	let mut off = first;

	while off != 0 {
		let mut or_deps = vec![BaseDep::new(off, cache, reverse)];
		let dep_type = DepType::from(a.get8(off + depend::DEP_TYPE));

		let next_field = if reverse { depend::NEXT_REV } else { depend::NEXT_DEP };

		// This means that more than one thing can satisfy a dependency.
		if !reverse {
			while a.get8(off + depend::COMP_TYPE) & dep::OR != 0 {
				off = a.get(off + next_field);
				if off == 0 {
					break;
				}
				or_deps.push(BaseDep::new(off, cache, reverse));
			}
		}

		dependencies
			.entry(dep_type)
			.or_default()
			.push(Dependency { base_deps: or_deps });

		if off == 0 {
			break;
		}
		off = a.get(off + next_field);
	}
	dependencies
}
