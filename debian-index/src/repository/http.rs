// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian repository HTTP client.

This module provides functionality for interfacing with HTTP based Debian
repositories.
*/

use {
    crate::{
        error::{DebianError, Result},
        io::{DataReader, DataResolver, FetchOutcome},
    },
    async_trait::async_trait,
    futures::stream::TryStreamExt,
    log::debug,
    reqwest::{Client, IntoUrl, StatusCode, Url},
};

fn transport_error(path: &str, message: String) -> DebianError {
    DebianError::RepositoryIoPath(
        path.to_string(),
        std::io::Error::new(std::io::ErrorKind::Other, message),
    )
}

async fn fetch_url(client: &Client, root_url: &Url, path: &str) -> Result<FetchOutcome<DataReader>> {
    let url = root_url.join(path)?;

    debug!("fetching {}", url);

    let res = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(path, format!("error sending HTTP request: {:?}", e)))?;

    if res.status() == StatusCode::NOT_FOUND {
        return Ok(FetchOutcome::NotFound);
    }

    let res = res
        .error_for_status()
        .map_err(|e| transport_error(path, format!("bad HTTP status code: {:?}", e)))?;

    Ok(FetchOutcome::Found(Box::pin(
        res.bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("{:?}", e)))
            .into_async_read(),
    )))
}

/// Client for a Debian repository served via HTTP.
///
/// Instances are bound to a base URL, which represents the base directory.
///
/// Distributions (typically) exist in a `dists/<distribution>` directory.
/// Distributions have an `InRelease` and/or `Release` file under it.
///
/// A `404` response is reported as [FetchOutcome::NotFound]. Every other
/// non-success status is an error.
#[derive(Debug)]
pub struct HttpRepositoryClient {
    /// HTTP client to use.
    client: Client,

    /// Base URL for this Debian archive.
    ///
    /// Contains both distributions and the files pool.
    root_url: Url,
}

impl HttpRepositoryClient {
    /// Construct an instance bound to the specified URL.
    pub fn new(url: impl IntoUrl) -> Result<Self> {
        Self::new_client(Client::default(), url)
    }

    /// Construct an instance using the given [Client] and URL.
    ///
    /// The given URL should be the value that follows the
    /// `deb` line in apt sources files. e.g. for
    /// `deb https://deb.debian.org/debian stable main`, the value would be
    /// `https://deb.debian.org/debian`. The URL typically has a `dists/` directory
    /// underneath.
    pub fn new_client(client: Client, url: impl IntoUrl) -> Result<Self> {
        let mut root_url = url.into_url()?;

        // Trailing URLs are significant to the Url type when we .join(). So ensure
        // the URL has a trailing path.
        if !root_url.path().ends_with('/') {
            root_url.set_path(&format!("{}/", root_url.path()));
        }

        Ok(Self { client, root_url })
    }
}

#[async_trait]
impl DataResolver for HttpRepositoryClient {
    fn url(&self) -> Result<Url> {
        Ok(self.root_url.clone())
    }

    async fn try_get_path(&self, path: &str) -> Result<FetchOutcome<DataReader>> {
        fetch_url(&self.client, &self.root_url, path).await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn root_url_normalization() -> Result<()> {
        let client = HttpRepositoryClient::new("http://deb.debian.org/debian")?;
        assert_eq!(client.url()?.as_str(), "http://deb.debian.org/debian/");
        assert_eq!(
            client.path_url("dists/bullseye/Release")?.as_str(),
            "http://deb.debian.org/debian/dists/bullseye/Release"
        );

        let client = HttpRepositoryClient::new("http://deb.debian.org/debian/")?;
        assert_eq!(client.url()?.as_str(), "http://deb.debian.org/debian/");

        Ok(())
    }
}
