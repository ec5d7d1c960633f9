// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Filesystem based Debian repositories. */

use {
    crate::{
        error::{DebianError, Result},
        io::{DataReader, DataResolver, FetchOutcome},
        repository::listing::render_directory_listing,
    },
    async_trait::async_trait,
    futures::io::BufReader,
    std::path::{Path, PathBuf},
    url::Url,
};

/// A readable interface to a Debian repository backed by a filesystem.
///
/// Directories are served as HTML listings of their subdirectories.
#[derive(Clone, Debug)]
pub struct FilesystemRepositoryReader {
    root_dir: PathBuf,
}

impl FilesystemRepositoryReader {
    /// Construct a new instance, bound to the root directory specified.
    ///
    /// No validation of the passed path is performed.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            root_dir: path.as_ref().to_path_buf(),
        }
    }

    fn list_directory(path: &Path) -> std::io::Result<String> {
        let mut names = vec![];

        for entry in std::fs::read_dir(path)? {
            let entry = entry?;

            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        names.sort();

        Ok(render_directory_listing(names.iter().map(|s| s.as_str())))
    }
}

#[async_trait]
impl DataResolver for FilesystemRepositoryReader {
    fn url(&self) -> Result<Url> {
        let path = if self.root_dir.is_absolute() {
            self.root_dir.clone()
        } else {
            std::env::current_dir()?.join(&self.root_dir)
        };

        Url::from_directory_path(&path)
            .map_err(|_| DebianError::Other("error converting filesystem path to URL".to_string()))
    }

    async fn try_get_path(&self, path: &str) -> Result<FetchOutcome<DataReader>> {
        let path = self.root_dir.join(path);
        let io_error = |e| DebianError::RepositoryIoPath(format!("{}", path.display()), e);

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FetchOutcome::NotFound);
            }
            Err(e) => return Err(io_error(e)),
        };

        if metadata.is_dir() {
            let html = Self::list_directory(&path).map_err(io_error)?;

            Ok(FetchOutcome::Found(Box::pin(futures::io::Cursor::new(
                html.into_bytes(),
            ))))
        } else {
            let f = std::fs::File::open(&path).map_err(io_error)?;

            Ok(FetchOutcome::Found(Box::pin(BufReader::new(
                futures::io::AllowStdIo::new(f),
            ))))
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::repository::listing::parse_directory_listing};

    #[tokio::test]
    async fn read_files_and_directories() -> Result<()> {
        let td = tempfile::tempdir()?;
        let dists = td.path().join("dists");
        std::fs::create_dir_all(dists.join("stable"))?;
        std::fs::create_dir_all(dists.join("bookworm"))?;
        std::fs::write(dists.join("stable").join("Release"), b"Suite: stable\n")?;
        std::fs::write(dists.join("README"), b"hello\n")?;

        let reader = FilesystemRepositoryReader::new(td.path());

        assert_eq!(
            reader
                .try_get_path_bytes("dists/stable/Release")
                .await?
                .found(),
            Some(b"Suite: stable\n".to_vec())
        );
        assert!(reader
            .try_get_path("dists/stable/InRelease")
            .await?
            .is_not_found());

        let listing = reader.try_get_path_bytes("dists/").await?.found().unwrap();
        assert_eq!(
            parse_directory_listing(&String::from_utf8_lossy(&listing)),
            vec!["bookworm", "stable"]
        );

        assert!(matches!(
            reader.get_path("dists/missing").await,
            Err(DebianError::NotFound(url)) if url.ends_with("/dists/missing")
        ));
        assert!(reader.url()?.as_str().ends_with('/'));

        Ok(())
    }
}
