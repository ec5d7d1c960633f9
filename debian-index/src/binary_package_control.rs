// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Binary package records from `Packages` indices. */

use {
    crate::{control::ControlParagraph, error::Result},
    std::ops::{Deref, DerefMut},
};

/// A binary package paragraph from a repository `Packages` file.
///
/// This type is a low-level wrapper around an inner [ControlParagraph].
/// [Deref] and [DerefMut] can be used to operate on the inner [ControlParagraph].
/// [From] and [Into] are implemented in both directions to enable cheap coercion
/// between the types.
///
/// Getters for fields every index entry must carry return [Result]. Others return
/// [Option].
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PackageRecord<'a> {
    paragraph: ControlParagraph<'a>,
}

impl<'a> Deref for PackageRecord<'a> {
    type Target = ControlParagraph<'a>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl<'a> DerefMut for PackageRecord<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.paragraph
    }
}

impl<'a> From<ControlParagraph<'a>> for PackageRecord<'a> {
    fn from(paragraph: ControlParagraph<'a>) -> Self {
        Self { paragraph }
    }
}

impl<'a> From<PackageRecord<'a>> for ControlParagraph<'a> {
    fn from(record: PackageRecord<'a>) -> Self {
        record.paragraph
    }
}

impl<'a> PackageRecord<'a> {
    /// The `Package` field value.
    pub fn package(&self) -> Result<&str> {
        self.required_field_str("Package")
    }

    /// The `Version` field as its original string.
    pub fn version_str(&self) -> Result<&str> {
        self.required_field_str("Version")
    }

    /// The `Architecture` field.
    pub fn architecture(&self) -> Option<&str> {
        self.field_str("Architecture")
    }

    /// The `SHA256` field.
    ///
    /// This is the digest of the `.deb` the record describes.
    pub fn sha256(&self) -> Option<&str> {
        self.field_str("SHA256")
    }

    /// The `Filename` field, relative to the repository root.
    pub fn filename(&self) -> Option<&str> {
        self.field_str("Filename")
    }

    /// The `Size` field.
    pub fn size(&self) -> Option<Result<u64>> {
        self.field_u64("Size")
    }

    /// Build identifiers of ELF objects shipped in this package.
    ///
    /// Taken from the space delimited `Build-Ids` field, which is present on
    /// debug symbol packages.
    pub fn build_ids(&self) -> Option<impl Iterator<Item = &str> + '_> {
        self.field_str("Build-Ids")
            .map(|v| v.split(' ').filter(|id| !id.is_empty()))
    }

    /// Associate each build identifier with the checksum of this package.
    ///
    /// Errors if `Build-Ids` is present without a `SHA256` field. Records lacking
    /// `Build-Ids` yield an empty list.
    pub fn build_id_checksums(&self) -> Result<Vec<(&str, &str)>> {
        let ids = match self.build_ids() {
            Some(ids) => ids,
            None => return Ok(vec![]),
        };

        let sha256 = self.required_field_str("SHA256")?;

        Ok(ids.map(|id| (id, sha256)).collect())
    }
}
