// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Collections of binary package records.

[PackageIndex] holds the content of a decoded `Packages` file, keyed by package
name. [fetch_package_index()] locates a `Packages` file through a [DataResolver],
probing the compressed variants before the plain one.
*/

use {
    crate::{
        binary_package_control::PackageRecord,
        control::ControlParagraphAsyncReader,
        error::{DebianError, Result},
        io::{Compression, DataResolver, FetchOutcome},
    },
    futures::AsyncBufRead,
    log::{debug, warn},
    std::collections::BTreeMap,
};

/// Binary package records indexed by their `Package` field.
///
/// Iteration is ordered by package name.
#[derive(Clone, Debug, Default)]
pub struct PackageIndex {
    packages: BTreeMap<String, PackageRecord<'static>>,
}

impl PackageIndex {
    /// Parse a (decompressed) `Packages` stream.
    ///
    /// Every paragraph must carry a `Package` field.
    pub async fn from_reader<R: AsyncBufRead + Unpin>(reader: R) -> Result<Self> {
        let mut reader = ControlParagraphAsyncReader::new(reader);
        let mut res = Self::default();

        while let Some(paragraph) = reader.read_paragraph().await? {
            res.insert(PackageRecord::from(paragraph))?;
        }

        Ok(res)
    }

    /// Add a record, keyed by its `Package` field.
    ///
    /// A record with the same name replaces the existing one, which is returned.
    pub fn insert(
        &mut self,
        record: PackageRecord<'static>,
    ) -> Result<Option<PackageRecord<'static>>> {
        let name = record.package()?.to_string();

        let previous = self.packages.insert(name, record);

        if let Some(previous) = &previous {
            warn!(
                "package {} listed multiple times; keeping the last occurrence",
                previous.package()?
            );
        }

        Ok(previous)
    }

    /// Obtain the record for a package name.
    pub fn get(&self, package: &str) -> Option<&PackageRecord<'static>> {
        self.packages.get(package)
    }

    /// The number of packages in this index.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether this index has no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Iterate over package names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(|k| k.as_str())
    }

    /// Iterate over records.
    pub fn iter(&self) -> impl Iterator<Item = &PackageRecord<'static>> {
        self.packages.values()
    }

    /// Collect `(build id, SHA256)` associations across all records.
    pub fn build_id_checksums(&self) -> Result<Vec<(&str, &str)>> {
        let mut res = vec![];

        for record in self.packages.values() {
            res.extend(record.build_id_checksums()?);
        }

        Ok(res)
    }
}

impl<'a> IntoIterator for &'a PackageIndex {
    type Item = &'a PackageRecord<'static>;
    type IntoIter = std::collections::btree_map::Values<'a, String, PackageRecord<'static>>;

    fn into_iter(self) -> Self::IntoIter {
        self.packages.values()
    }
}

/// Fetch and decode a `Packages` file.
///
/// `path` is the path of the uncompressed file, e.g.
/// `dists/bullseye/main/binary-amd64/Packages`. The `.xz`, `.gz`, and uncompressed
/// variants are tried in that order and the first one that exists is decoded.
///
/// If none exist, [DebianError::IndexUnavailable] is returned. Any other failure
/// ends the search immediately. Failures decoding a found variant are reported as
/// [DebianError::IndexParse], naming its URL.
pub async fn fetch_package_index(
    resolver: &(impl DataResolver + ?Sized),
    path: &str,
) -> Result<PackageIndex> {
    for compression in Compression::index_fallback_order() {
        let candidate = format!("{}{}", path, compression.extension());

        debug!("trying {}", candidate);

        match resolver.try_get_path_decoded(&candidate, compression).await? {
            FetchOutcome::Found(reader) => {
                let index = match PackageIndex::from_reader(reader).await {
                    Ok(index) => index,
                    Err(e) => {
                        return Err(DebianError::IndexParse {
                            url: resolver.path_url(&candidate)?.to_string(),
                            source: Box::new(e),
                        });
                    }
                };
                debug!("decoded {} packages from {}", index.len(), candidate);

                return Ok(index);
            }
            FetchOutcome::NotFound => {
                debug!("{} not found", candidate);
            }
        }
    }

    Err(DebianError::IndexUnavailable(
        resolver.path_url(path)?.to_string(),
    ))
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{error::StanzaViolation, repository::memory::MemoryRepository},
        indoc::indoc,
    };

    const PACKAGES: &str = indoc! {"
        Package: foo
        Version: 1.0
        SHA256: 1111

        Package: bar
        Version: 2.0
        Build-Ids: id1 id2
        SHA256: abc
        Description: a package
         with a long description
    "};

    #[tokio::test]
    async fn keyed_lookup() -> Result<()> {
        let index = PackageIndex::from_reader(futures::io::Cursor::new(PACKAGES.as_bytes())).await?;

        assert_eq!(index.len(), 2);
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["bar", "foo"]);
        assert_eq!(index.get("foo").unwrap().version_str()?, "1.0");
        assert_eq!(
            index.get("bar").unwrap().field_str("Description"),
            Some("a package\nwith a long description")
        );
        assert!(index.get("baz").is_none());
        assert_eq!(
            index.build_id_checksums()?,
            vec![("id1", "abc"), ("id2", "abc")]
        );

        Ok(())
    }

    #[tokio::test]
    async fn duplicate_package_replaces() -> Result<()> {
        let index = PackageIndex::from_reader(futures::io::Cursor::new(
            b"Package: foo\nVersion: 1\n\nPackage: foo\nVersion: 2\n".to_vec(),
        ))
        .await?;

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("foo").unwrap().version_str()?, "2");

        Ok(())
    }

    #[tokio::test]
    async fn missing_package_field() {
        let res = PackageIndex::from_reader(futures::io::Cursor::new(b"Version: 1\n".to_vec())).await;

        assert!(matches!(
            res,
            Err(DebianError::ControlRequiredFieldMissing(name)) if name == "Package"
        ));
    }

    #[tokio::test]
    async fn prefers_xz() -> Result<()> {
        let mut repo = MemoryRepository::default();
        repo.insert_compressed("p/Packages", "Package: xz\n", Compression::Xz)
            .await?;
        repo.insert_compressed("p/Packages", "Package: gz\n", Compression::Gzip)
            .await?;
        repo.insert("p/Packages", "Package: plain\n");

        let index = fetch_package_index(&repo, "p/Packages").await?;
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["xz"]);

        Ok(())
    }

    #[tokio::test]
    async fn falls_back_to_gzip() -> Result<()> {
        let mut repo = MemoryRepository::default();
        repo.insert_compressed("p/Packages", PACKAGES, Compression::Gzip)
            .await?;
        repo.insert("p/Packages", "Package: plain\n");

        let index = fetch_package_index(&repo, "p/Packages").await?;
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["bar", "foo"]);
        assert_eq!(
            repo.requested_paths(),
            vec!["p/Packages.xz", "p/Packages.gz"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn falls_back_to_plain() -> Result<()> {
        let mut repo = MemoryRepository::default();
        repo.insert("p/Packages", "Package: plain\n");

        let index = fetch_package_index(&repo, "p/Packages").await?;
        assert_eq!(index.names().collect::<Vec<_>>(), vec!["plain"]);

        Ok(())
    }

    #[tokio::test]
    async fn all_variants_missing() {
        let repo = MemoryRepository::default();

        let res = fetch_package_index(&repo, "p/Packages").await;
        assert!(matches!(
            res,
            Err(DebianError::IndexUnavailable(url)) if url == "memory:///p/Packages"
        ));
        assert_eq!(
            repo.requested_paths(),
            vec!["p/Packages.xz", "p/Packages.gz", "p/Packages"]
        );
    }

    #[tokio::test]
    async fn transport_error_stops_fallback() {
        let mut repo = MemoryRepository::default();
        repo.insert_failure("p/Packages.gz");
        repo.insert("p/Packages", "Package: plain\n");

        let res = fetch_package_index(&repo, "p/Packages").await;
        assert!(matches!(res, Err(DebianError::RepositoryIoPath(path, _)) if path == "p/Packages.gz"));
        assert_eq!(
            repo.requested_paths(),
            vec!["p/Packages.xz", "p/Packages.gz"]
        );
    }

    #[tokio::test]
    async fn parse_error_is_not_fallback() {
        let mut repo = MemoryRepository::default();
        repo.insert_compressed("p/Packages", " orphan\n", Compression::Xz)
            .await
            .unwrap();
        repo.insert("p/Packages", "Package: plain\n");

        let res = fetch_package_index(&repo, "p/Packages").await;
        match res {
            Err(DebianError::IndexParse { url, source }) => {
                assert_eq!(url, "memory:///p/Packages.xz");
                assert!(matches!(
                    *source,
                    DebianError::MalformedStanza {
                        line: 1,
                        violation: StanzaViolation::ContinuationWithoutKey,
                    }
                ));
            }
            res => panic!("expected index parse error; got {:?}", res.map(|i| i.len())),
        }
    }

    #[tokio::test]
    async fn parse_errors_name_index_url() {
        let mut repo = MemoryRepository::default();
        repo.insert("p/Packages", "Package: foo\nVersion: 1\nPackage: bar\n");

        let err = fetch_package_index(&repo, "p/Packages").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "error reading Packages file at memory:///p/Packages: \
             malformed stanza at line 3: duplicate key 'Package'"
        );
    }

    #[tokio::test]
    async fn corrupt_compressed_variant_names_index_url() {
        let mut repo = MemoryRepository::default();
        repo.insert("p/Packages.gz", b"not gzip data".to_vec());

        let res = fetch_package_index(&repo, "p/Packages").await;
        assert!(matches!(
            res,
            Err(DebianError::IndexParse { url, .. }) if url == "memory:///p/Packages.gz"
        ));
    }
}
