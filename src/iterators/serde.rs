use serde::ser::{SerializeSeq, SerializeStruct, Serializer};
use serde::Serialize;

use crate::{BaseDep, Dependency, PackageFile, Version};

impl<'a> Serialize for Version<'a> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let depends = self.depends_map();
		let mut state = serializer.serialize_struct("Version", 5 + depends.len())?;

		state.serialize_field("package", &self.parent().fullname(true))?;
		state.serialize_field("version", &self.version())?;
		state.serialize_field("section", &self.section())?;
		state.serialize_field("size", &self.size())?;

		let pkg_files: Vec<PackageFile<'a>> = self.package_files().collect();
		state.serialize_field("package_files", &pkg_files)?;

		for (kind, dep_vec) in depends {
			state.serialize_field(kind.to_str(), &dep_vec)?;
		}

		state.end()
	}
}

impl Serialize for BaseDep<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut state = serializer.serialize_struct("Dependency", 3)?;

		state.serialize_field("name", &self.name())?;
		state.serialize_field("comp", &self.comp_type())?;
		state.serialize_field("version", &self.version())?;
		state.end()
	}
}

impl Serialize for PackageFile<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut state = serializer.serialize_struct("PackageFile", 5)?;
		state.serialize_field("filename", &self.filename())?;
		state.serialize_field("archive", &self.archive())?;
		state.serialize_field("origin", &self.origin())?;
		state.serialize_field("codename", &self.codename())?;
		state.serialize_field("component", &self.component())?;
		state.end()
	}
}

impl Serialize for Dependency<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut state = serializer.serialize_seq(Some(self.base_deps.len()))?;
		for dep in &self.base_deps {
			state.serialize_element(dep)?;
		}
		state.end()
	}
}
