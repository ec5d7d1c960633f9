// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! In-memory Debian repositories.

[MemoryRepository] serves content from a map of paths. Paths ending in `/` that
are a prefix of stored paths are served as directory listings. Every request is
recorded, which allows observing fetch behavior.
*/

use {
    crate::{
        error::{DebianError, Result},
        io::{read_compressed, Compression, DataReader, DataResolver, FetchOutcome},
        repository::listing::render_directory_listing,
    },
    async_trait::async_trait,
    futures::AsyncReadExt,
    std::{
        collections::{BTreeSet, HashMap},
        sync::Mutex,
    },
    url::Url,
};

#[derive(Clone, Debug)]
enum MemoryEntry {
    Data(Vec<u8>),
    Failure,
}

/// A Debian repository whose content lives in memory.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    entries: HashMap<String, MemoryEntry>,
    requests: Mutex<Vec<String>>,
}

impl MemoryRepository {
    /// Register content at a path, replacing any existing entry.
    pub fn insert(&mut self, path: impl ToString, data: impl Into<Vec<u8>>) {
        self.entries
            .insert(path.to_string(), MemoryEntry::Data(data.into()));
    }

    /// Register compressed content.
    ///
    /// The entry is stored at `path` plus the extension of the compression format.
    pub async fn insert_compressed(
        &mut self,
        path: &str,
        data: impl Into<Vec<u8>>,
        compression: Compression,
    ) -> Result<()> {
        let mut compressed = vec![];
        read_compressed(futures::io::Cursor::new(data.into()), compression)
            .read_to_end(&mut compressed)
            .await?;

        self.insert(format!("{}{}", path, compression.extension()), compressed);

        Ok(())
    }

    /// Register a path whose retrieval fails with an I/O error.
    pub fn insert_failure(&mut self, path: impl ToString) {
        self.entries.insert(path.to_string(), MemoryEntry::Failure);
    }

    /// Paths requested so far, in request order.
    pub fn requested_paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn listing(&self, dir: &str) -> Option<String> {
        if !(dir.is_empty() || dir.ends_with('/')) {
            return None;
        }

        let names = self
            .entries
            .keys()
            .filter_map(|key| key.strip_prefix(dir))
            .filter_map(|rest| rest.split_once('/'))
            .map(|(name, _)| name)
            .filter(|name| !name.is_empty())
            .collect::<BTreeSet<_>>();

        if names.is_empty() {
            None
        } else {
            Some(render_directory_listing(names))
        }
    }
}

#[async_trait]
impl DataResolver for MemoryRepository {
    fn url(&self) -> Result<Url> {
        Ok(Url::parse("memory:///")?)
    }

    async fn try_get_path(&self, path: &str) -> Result<FetchOutcome<DataReader>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(path.to_string());

        let data = match self.entries.get(path) {
            Some(MemoryEntry::Data(data)) => data.clone(),
            Some(MemoryEntry::Failure) => {
                return Err(DebianError::RepositoryIoPath(
                    path.to_string(),
                    std::io::Error::new(std::io::ErrorKind::Other, "simulated failure"),
                ));
            }
            None => match self.listing(path) {
                Some(html) => html.into_bytes(),
                None => return Ok(FetchOutcome::NotFound),
            },
        };

        Ok(FetchOutcome::Found(Box::pin(futures::io::Cursor::new(data))))
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::repository::listing::parse_directory_listing};

    #[tokio::test]
    async fn content_and_requests() -> Result<()> {
        let mut repo = MemoryRepository::default();
        repo.insert("dists/stable/Release", "Suite: stable\n");
        repo.insert("dists/testing/Release", "Suite: testing\n");
        repo.insert_failure("broken");

        assert_eq!(
            repo.try_get_path_bytes("dists/stable/Release")
                .await?
                .found(),
            Some(b"Suite: stable\n".to_vec())
        );
        assert!(repo.try_get_path("missing").await?.is_not_found());
        assert!(repo.try_get_path("dists/stable").await?.is_not_found());
        assert!(matches!(
            repo.try_get_path("broken").await,
            Err(DebianError::RepositoryIoPath(path, _)) if path == "broken"
        ));

        let listing = repo.try_get_path_bytes("dists/").await?.found().unwrap();
        assert_eq!(
            parse_directory_listing(&String::from_utf8_lossy(&listing)),
            vec!["stable", "testing"]
        );

        assert_eq!(
            repo.requested_paths(),
            vec![
                "dists/stable/Release",
                "missing",
                "dists/stable",
                "broken",
                "dists/"
            ]
        );
        assert_eq!(repo.path_url("dists/")?.as_str(), "memory:///dists/");

        Ok(())
    }
}
