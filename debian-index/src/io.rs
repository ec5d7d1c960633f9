// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers.

[DataResolver] is the only capability this crate needs from a transport: given a
path relative to some root, yield the content, report that it doesn't exist, or fail.
The not-found case is a value ([FetchOutcome::NotFound]) rather than an error so
callers probing alternatives can branch on it without inspecting errors.
*/

use {
    crate::error::{DebianError, Result},
    async_compression::futures::bufread::{GzipDecoder, GzipEncoder, XzDecoder, XzEncoder},
    async_trait::async_trait,
    futures::{AsyncBufRead, AsyncRead, AsyncReadExt},
    std::pin::Pin,
    url::Url,
};

/// A boxed, buffered stream of content obtained from a [DataResolver].
pub type DataReader = Pin<Box<dyn AsyncBufRead + Send>>;

/// Compression format used by Debian index files.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Compression {
    /// No compression (no extension).
    None,

    /// XZ compression (.xz extension).
    Xz,

    /// Gzip compression (.gz extension).
    Gzip,
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Xz => ".xz",
            Self::Gzip => ".gz",
        }
    }

    /// The order in which variants of an index file are probed.
    pub fn index_fallback_order() -> impl Iterator<Item = Compression> {
        [Self::Xz, Self::Gzip, Self::None].into_iter()
    }
}

/// The outcome of a fetch that didn't error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FetchOutcome<T> {
    /// The content exists.
    Found(T),
    /// The content does not exist at the requested location.
    NotFound,
}

impl<T> FetchOutcome<T> {
    /// Convert to an [Option], discarding the distinction between variants.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(v) => Some(v),
            Self::NotFound => None,
        }
    }

    /// Whether this is [Self::NotFound].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Map the found value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            Self::Found(v) => FetchOutcome::Found(f(v)),
            Self::NotFound => FetchOutcome::NotFound,
        }
    }
}

/// Wrap a reader with transparent decompression.
pub fn read_decompressed(stream: DataReader, compression: Compression) -> DataReader {
    match compression {
        Compression::None => stream,
        Compression::Gzip => Box::pin(futures::io::BufReader::new(GzipDecoder::new(stream))),
        Compression::Xz => Box::pin(futures::io::BufReader::new(XzDecoder::new(stream))),
    }
}

/// Wrap a reader with transparent compression.
pub fn read_compressed<'a>(
    stream: impl AsyncBufRead + Send + 'a,
    compression: Compression,
) -> Pin<Box<dyn AsyncRead + Send + 'a>> {
    match compression {
        Compression::None => Box::pin(stream),
        Compression::Gzip => Box::pin(GzipEncoder::new(stream)),
        Compression::Xz => Box::pin(XzEncoder::new(stream)),
    }
}

/// Generic mechanism for obtaining content at a given path.
///
/// Implementations only need to implement `url()` and `try_get_path()`. The other
/// members have default implementations that should do the correct thing.
#[async_trait]
pub trait DataResolver: Send + Sync {
    /// The URL paths are resolved against.
    ///
    /// Always ends with `/`.
    fn url(&self) -> Result<Url>;

    /// Obtain the URL of a relative path, for diagnostics.
    fn path_url(&self, path: &str) -> Result<Url> {
        Ok(self.url()?.join(path)?)
    }

    /// Get the content of a relative path as an async reader.
    ///
    /// Resolves to [FetchOutcome::NotFound] if nothing exists at the path. All other
    /// failures are errors.
    async fn try_get_path(&self, path: &str) -> Result<FetchOutcome<DataReader>>;

    /// Get the content of a relative path, treating its absence as an error.
    async fn get_path(&self, path: &str) -> Result<DataReader> {
        match self.try_get_path(path).await? {
            FetchOutcome::Found(reader) => Ok(reader),
            FetchOutcome::NotFound => Err(DebianError::NotFound(
                self.path_url(path)?.to_string(),
            )),
        }
    }

    /// Read the full content of a relative path into memory.
    async fn try_get_path_bytes(&self, path: &str) -> Result<FetchOutcome<Vec<u8>>> {
        match self.try_get_path(path).await? {
            FetchOutcome::Found(mut reader) => {
                let mut data = vec![];
                reader
                    .read_to_end(&mut data)
                    .await
                    .map_err(|e| DebianError::RepositoryIoPath(path.to_string(), e))?;

                Ok(FetchOutcome::Found(data))
            }
            FetchOutcome::NotFound => Ok(FetchOutcome::NotFound),
        }
    }

    /// Get the content of a relative path with decompression transparently applied.
    async fn try_get_path_decoded(
        &self,
        path: &str,
        compression: Compression,
    ) -> Result<FetchOutcome<DataReader>> {
        Ok(self
            .try_get_path(path)
            .await?
            .map(|reader| read_decompressed(reader, compression)))
    }
}

#[cfg(test)]
mod test {
    use {super::*, futures::AsyncBufReadExt};

    async fn round_trip(compression: Compression) -> Result<String> {
        let source = b"line one\nline two\n".to_vec();

        let mut compressed = vec![];
        read_compressed(futures::io::Cursor::new(source), compression)
            .read_to_end(&mut compressed)
            .await?;

        let mut reader = read_decompressed(
            Box::pin(futures::io::Cursor::new(compressed)),
            compression,
        );

        let mut lines = vec![];
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            lines.push(line);
        }

        Ok(lines.concat())
    }

    #[test]
    fn fallback_order() {
        assert_eq!(
            Compression::index_fallback_order()
                .map(|c| c.extension())
                .collect::<Vec<_>>(),
            vec![".xz", ".gz", ""]
        );
    }

    #[tokio::test]
    async fn decompression() -> Result<()> {
        for compression in Compression::index_fallback_order() {
            assert_eq!(round_trip(compression).await?, "line one\nline two\n");
        }

        Ok(())
    }

    #[test]
    fn outcome_helpers() {
        assert_eq!(FetchOutcome::Found(1).map(|x| x + 1).found(), Some(2));
        assert!(FetchOutcome::<u8>::NotFound.is_not_found());
        assert_eq!(FetchOutcome::<u8>::NotFound.found(), None);
    }
}
