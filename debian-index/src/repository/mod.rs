// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository primitives.

A Debian repository is a collection of files holding packages and other
support primitives. See <https://wiki.debian.org/DebianRepository/Format>
for the canonical definition of a Debian repository.

The model here is a tree of lazily resolved handles:

* [Repository] discovers distributions from the listing of `dists/`.
* [Release] resolves a distribution's `Release` (or `InRelease`) file.
* [PackageList] resolves the `Packages` index of a component and architecture.

Every handle fetches its content at most once and caches it for its own lifetime.
All content is obtained through a [DataResolver].
*/

use {
    crate::{
        binary_package_control::PackageRecord,
        binary_package_list::{fetch_package_index, PackageIndex},
        error::{DebianError, Result},
        io::{DataResolver, FetchOutcome},
        repository::{
            listing::parse_directory_listing,
            release::{unwrap_clearsigned, FieldValue, ReleaseDocument, ReleaseSignature},
        },
    },
    log::{debug, info},
    std::sync::Arc,
    tokio::sync::OnceCell,
    url::Url,
};

pub mod filesystem;
#[cfg(feature = "http")]
pub mod http;
pub mod listing;
pub mod memory;
pub mod release;

/// The pseudo architecture holding architecture independent packages.
pub const ARCHITECTURE_ALL: &str = "all";

fn decode_utf8(resolver: &dyn DataResolver, path: &str, data: Vec<u8>) -> Result<String> {
    String::from_utf8(data).map_err(|e| match resolver.path_url(path) {
        Ok(url) => DebianError::Utf8Path(url.to_string(), e),
        Err(err) => err,
    })
}

/// The root of a Debian repository.
pub struct Repository {
    resolver: Arc<dyn DataResolver>,
    distributions: Option<Vec<String>>,
    releases: OnceCell<Vec<Release>>,
}

impl Repository {
    /// Construct an instance reading content from a [DataResolver].
    pub fn new(resolver: impl DataResolver + 'static) -> Self {
        Self::from_resolver(Arc::new(resolver))
    }

    /// Construct an instance from a shared [DataResolver].
    pub fn from_resolver(resolver: Arc<dyn DataResolver>) -> Self {
        Self {
            resolver,
            distributions: None,
            releases: OnceCell::new(),
        }
    }

    /// Use a fixed set of distribution names instead of discovering them.
    pub fn with_distributions(
        mut self,
        names: impl IntoIterator<Item = impl ToString>,
    ) -> Self {
        self.distributions = Some(names.into_iter().map(|s| s.to_string()).collect());
        self
    }

    /// The URL of the repository root.
    pub fn url(&self) -> Result<Url> {
        self.resolver.url()
    }

    /// The [DataResolver] content is fetched from.
    pub fn resolver(&self) -> &Arc<dyn DataResolver> {
        &self.resolver
    }

    /// Obtain a handle on the distribution in `dists/<name>/`.
    ///
    /// The returned handle is independent of the ones cached by [Self::releases()].
    pub fn release(&self, name: &str) -> Release {
        Release::new(self.resolver.clone(), name)
    }

    /// Names of distributions in the repository, as listed in `dists/`.
    pub async fn discover_distributions(&self) -> Result<Vec<String>> {
        let path = "dists/";

        let data = match self.resolver.try_get_path_bytes(path).await? {
            FetchOutcome::Found(data) => data,
            FetchOutcome::NotFound => {
                return Err(DebianError::NotFound(
                    self.resolver.path_url(path)?.to_string(),
                ))
            }
        };

        let names = parse_directory_listing(&decode_utf8(self.resolver.as_ref(), path, data)?);
        debug!("discovered distributions: {}", names.join(", "));

        Ok(names)
    }

    /// Handles on every distribution in the repository.
    ///
    /// Resolved once.
    pub async fn releases(&self) -> Result<&[Release]> {
        self.releases
            .get_or_try_init(|| async {
                let names = match &self.distributions {
                    Some(names) => names.clone(),
                    None => self.discover_distributions().await?,
                };

                Ok::<_, DebianError>(names.iter().map(|name| self.release(name)).collect())
            })
            .await
            .map(|releases| releases.as_slice())
    }
}

/// A distribution within a [Repository].
pub struct Release {
    resolver: Arc<dyn DataResolver>,
    name: String,
    path: String,
    document: OnceCell<ReleaseDocument>,
    package_lists: OnceCell<Vec<PackageList>>,
}

impl Release {
    fn new(resolver: Arc<dyn DataResolver>, name: &str) -> Self {
        let name = name.trim_matches('/').to_string();
        let path = format!("dists/{}/", name);

        Self {
            resolver,
            name,
            path,
            document: OnceCell::new(),
            package_lists: OnceCell::new(),
        }
    }

    /// The distribution name. e.g. `bullseye`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the distribution directory relative to the repository root.
    ///
    /// Always ends with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// URL of the distribution directory.
    pub fn url(&self) -> Result<Url> {
        self.resolver.path_url(&self.path)
    }

    /// The parsed `Release` file of this distribution.
    ///
    /// `Release` and `Release.gpg` are tried first. If either is missing,
    /// `InRelease` is used. Resolved once.
    pub async fn document(&self) -> Result<&ReleaseDocument> {
        self.document
            .get_or_try_init(|| self.fetch_document())
            .await
    }

    async fn fetch_document(&self) -> Result<ReleaseDocument> {
        let release_path = format!("{}Release", self.path);
        let signature_path = format!("{}Release.gpg", self.path);

        if let FetchOutcome::Found(release) = self.resolver.try_get_path_bytes(&release_path).await? {
            // TODO verify the detached signature once a keyring can be supplied.
            if let FetchOutcome::Found(signature) =
                self.resolver.try_get_path_bytes(&signature_path).await?
            {
                let text = decode_utf8(self.resolver.as_ref(), &release_path, release)?;
                info!("resolved {}", self.resolver.path_url(&release_path)?);

                return Ok(ReleaseDocument::parse_str(&text)?
                    .with_signature(ReleaseSignature::Detached(signature)));
            }

            debug!("{} not found", signature_path);
        } else {
            debug!("{} not found", release_path);
        }

        let inrelease_path = format!("{}InRelease", self.path);

        match self.resolver.try_get_path_bytes(&inrelease_path).await? {
            FetchOutcome::Found(data) => {
                let url = self.resolver.path_url(&inrelease_path)?.to_string();
                let text = decode_utf8(self.resolver.as_ref(), &inrelease_path, data)?;
                let message =
                    unwrap_clearsigned(&text).map_err(|e| DebianError::MalformedRelease(url.clone(), e))?;

                info!("resolved {}", url);

                Ok(ReleaseDocument::parse_str(&message.text)?
                    .with_signature(ReleaseSignature::Cleartext(message.signature)))
            }
            FetchOutcome::NotFound => Err(DebianError::ReleaseUnavailable(self.url()?.to_string())),
        }
    }

    /// Obtain a field of the `Release` file by its literal or normalized name.
    pub async fn get_field(&self, name: &str) -> Result<&FieldValue> {
        self.document().await?.get_field(name)
    }

    /// Components declared by the `Release` file.
    pub async fn components(&self) -> Result<&[String]> {
        self.document().await?.components()
    }

    /// Architectures declared by the `Release` file.
    pub async fn architectures(&self) -> Result<&[String]> {
        self.document().await?.architectures()
    }

    /// Handles on the package lists of this distribution.
    ///
    /// There is one per component and architecture, where architectures are
    /// [ARCHITECTURE_ALL] followed by the declared architectures. Index content is
    /// fetched lazily by each [PackageList].
    pub async fn package_lists(&self) -> Result<&[PackageList]> {
        self.package_lists
            .get_or_try_init(|| async {
                let document = self.document().await?;
                let components = document.components()?;
                let architectures = std::iter::once(ARCHITECTURE_ALL)
                    .chain(
                        document
                            .architectures()?
                            .iter()
                            .map(|a| a.as_str())
                            .filter(|a| *a != ARCHITECTURE_ALL),
                    )
                    .collect::<Vec<_>>();

                Ok::<_, DebianError>(
                    components
                        .iter()
                        .flat_map(|component| {
                            architectures.iter().map(move |architecture| {
                                PackageList::new(
                                    self.resolver.clone(),
                                    &self.path,
                                    component,
                                    architecture,
                                )
                            })
                        })
                        .collect(),
                )
            })
            .await
            .map(|lists| lists.as_slice())
    }
}

/// The binary packages of one component and architecture of a [Release].
pub struct PackageList {
    resolver: Arc<dyn DataResolver>,
    component: String,
    architecture: String,
    path: String,
    packages: OnceCell<PackageIndex>,
}

impl PackageList {
    fn new(
        resolver: Arc<dyn DataResolver>,
        release_path: &str,
        component: &str,
        architecture: &str,
    ) -> Self {
        Self {
            resolver,
            component: component.to_string(),
            architecture: architecture.to_string(),
            path: format!("{}{}/binary-{}/", release_path, component, architecture),
            packages: OnceCell::new(),
        }
    }

    /// The component. e.g. `main`.
    pub fn component(&self) -> &str {
        &self.component
    }

    /// The architecture. e.g. `amd64` or `all`.
    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// Path of the uncompressed `Packages` file relative to the repository root.
    pub fn index_path(&self) -> String {
        format!("{}Packages", self.path)
    }

    /// URL of the uncompressed `Packages` file.
    pub fn url(&self) -> Result<Url> {
        self.resolver.path_url(&self.index_path())
    }

    /// The decoded `Packages` index. Resolved once.
    pub async fn packages(&self) -> Result<&PackageIndex> {
        self.packages
            .get_or_try_init(|| async {
                let index = fetch_package_index(self.resolver.as_ref(), &self.index_path()).await?;
                info!(
                    "resolved {} packages for {} / {}",
                    index.len(),
                    self.component,
                    self.architecture
                );

                Ok::<_, DebianError>(index)
            })
            .await
    }

    /// Iterate over package records, resolving the index if needed.
    pub async fn iter(&self) -> Result<impl Iterator<Item = &PackageRecord<'static>> + '_> {
        Ok(self.packages().await?.iter())
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::{error::ClearsignError, io::Compression, repository::memory::MemoryRepository},
        indoc::indoc,
    };

    const STABLE_RELEASE: &str = indoc! {"
        Suite: stable
        Components: main
        Architectures: amd64
    "};

    fn stable_repository() -> MemoryRepository {
        let mut repo = MemoryRepository::default();
        repo.insert("dists/stable/Release", STABLE_RELEASE);
        repo.insert("dists/stable/Release.gpg", "signature");

        repo
    }

    #[tokio::test]
    async fn discovered_release_package_lists() -> Result<()> {
        let repo = Repository::new(stable_repository());

        let releases = repo.releases().await?;
        assert_eq!(releases.len(), 1);

        let release = &releases[0];
        assert_eq!(release.name(), "stable");
        assert_eq!(release.url()?.as_str(), "memory:///dists/stable/");

        let pairs = release
            .package_lists()
            .await?
            .iter()
            .map(|l| (l.component(), l.architecture()))
            .collect::<Vec<_>>();
        assert_eq!(pairs, vec![("main", "all"), ("main", "amd64")]);
        assert_eq!(
            release.package_lists().await?[1].url()?.as_str(),
            "memory:///dists/stable/main/binary-amd64/Packages"
        );

        Ok(())
    }

    #[tokio::test]
    async fn resolution_is_cached() -> Result<()> {
        let mut memory = stable_repository();
        memory
            .insert_compressed(
                "dists/stable/main/binary-amd64/Packages",
                "Package: foo\nVersion: 1\n",
                Compression::Gzip,
            )
            .await?;
        let memory = Arc::new(memory);

        let repo = Repository::from_resolver(memory.clone()).with_distributions(["stable"]);
        let release = &repo.releases().await?[0];
        let list = &release.package_lists().await?[1];

        assert_eq!(list.iter().await?.count(), 1);
        let requests = memory.requested_paths().len();

        assert_eq!(list.packages().await?.get("foo").unwrap().version_str()?, "1");
        assert_eq!(release.components().await?, &["main"]);
        assert_eq!(repo.releases().await?.len(), 1);
        assert_eq!(memory.requested_paths().len(), requests);
        assert!(!memory.requested_paths().contains(&"dists/".to_string()));

        Ok(())
    }

    #[tokio::test]
    async fn unavailable_index_is_isolated() -> Result<()> {
        let mut memory = stable_repository();
        memory.insert(
            "dists/stable/main/binary-amd64/Packages",
            "Package: foo\nVersion: 1\n",
        );

        let repo = Repository::new(memory);
        let release = repo.release("stable");
        let lists = release.package_lists().await?;

        assert!(matches!(
            lists[0].packages().await,
            Err(DebianError::IndexUnavailable(url))
                if url == "memory:///dists/stable/main/binary-all/Packages"
        ));
        assert_eq!(lists[1].packages().await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn declared_all_architecture() -> Result<()> {
        let mut memory = MemoryRepository::default();
        memory.insert(
            "dists/sid/Release",
            "Components: main contrib\nArchitectures: all arm64\n",
        );
        memory.insert("dists/sid/Release.gpg", "signature");

        let release = Repository::new(memory).release("sid");
        let pairs = release
            .package_lists()
            .await?
            .iter()
            .map(|l| format!("{}/{}", l.component(), l.architecture()))
            .collect::<Vec<_>>();

        assert_eq!(
            pairs,
            vec!["main/all", "main/arm64", "contrib/all", "contrib/arm64"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn inrelease_fallback() -> Result<()> {
        let mut memory = MemoryRepository::default();
        memory.insert(
            "dists/stable/InRelease",
            "-----BEGIN PGP SIGNED MESSAGE-----\n\nSuite: stable\nComponents: main\n-----BEGIN PGP SIGNATURE-----\n\n<sig>",
        );
        let memory = Arc::new(memory);

        let release = Repository::from_resolver(memory.clone()).release("stable");
        let document = release.document().await?;

        assert_eq!(document.suite(), Some("stable"));
        assert_eq!(
            document.signature(),
            Some(&ReleaseSignature::Cleartext(
                "-----BEGIN PGP SIGNATURE-----\n\n<sig>".to_string()
            ))
        );
        assert_eq!(
            memory.requested_paths(),
            vec!["dists/stable/Release", "dists/stable/InRelease"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn detached_signature_required() -> Result<()> {
        let mut memory = MemoryRepository::default();
        memory.insert("dists/stable/Release", STABLE_RELEASE);
        memory.insert(
            "dists/stable/InRelease",
            "-----BEGIN PGP SIGNED MESSAGE-----\n\nSuite: signed\n-----BEGIN PGP SIGNATURE-----\n",
        );

        let release = Repository::new(memory).release("stable");
        assert_eq!(release.document().await?.suite(), Some("signed"));

        Ok(())
    }

    #[tokio::test]
    async fn release_resolution_failures() {
        let mut memory = MemoryRepository::default();
        memory.insert("dists/broken/InRelease", "Suite: unsigned\n");

        let repo = Repository::new(memory);

        assert!(matches!(
            repo.release("missing").document().await,
            Err(DebianError::ReleaseUnavailable(url)) if url == "memory:///dists/missing/"
        ));
        assert!(matches!(
            repo.release("broken").document().await,
            Err(DebianError::MalformedRelease(url, ClearsignError::MissingMessageMarker))
                if url == "memory:///dists/broken/InRelease"
        ));
        assert!(matches!(
            repo.release("broken").get_field("Suite").await,
            Err(DebianError::MalformedRelease(..))
        ));
    }

    #[tokio::test]
    async fn field_lookup() -> Result<()> {
        let release = Repository::new(stable_repository()).release("stable");

        assert_eq!(
            release.get_field("suite").await?,
            &FieldValue::Scalar("stable".into())
        );
        assert!(matches!(
            release.get_field("Codename").await,
            Err(DebianError::FieldNotFound(name)) if name == "Codename"
        ));
        assert!(matches!(
            release.document().await?.signature(),
            Some(ReleaseSignature::Detached(data)) if data == b"signature"
        ));

        Ok(())
    }

    #[tokio::test]
    async fn missing_dists_directory() {
        let repo = Repository::new(MemoryRepository::default());

        assert!(matches!(
            repo.releases().await,
            Err(DebianError::NotFound(url)) if url == "memory:///dists/"
        ));
    }
}
