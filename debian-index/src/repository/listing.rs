// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Directory listings.

HTTP servers hosting Debian repositories typically render directories as HTML
pages with one anchor per entry. Distribution discovery walks the listing of
`dists/`. Transports without native listings render the same format.
*/

use {once_cell::sync::Lazy, regex::Regex};

static ANCHOR_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a href="([^"]*)""#).expect("anchor regular expression should be valid")
});

/// Extract names of subdirectories from an HTML directory listing.
///
/// Only relative links ending with `/` are considered, minus the trailing `/`.
/// Parent and self links are ignored. Names are returned in document order.
pub fn parse_directory_listing(html: &str) -> Vec<String> {
    ANCHOR_HREF
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|href| {
            href.ends_with('/')
                && !href.starts_with('/')
                && !href.contains("://")
                && *href != "../"
                && *href != "./"
        })
        .map(|href| href.trim_end_matches('/').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Render an HTML listing of subdirectories.
pub fn render_directory_listing<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut html = String::from("<html><body>\n<a href=\"../\">../</a>\n");

    for name in names {
        html.push_str(&format!("<a href=\"{0}/\">{0}/</a>\n", name));
    }

    html.push_str("</body></html>\n");

    html
}
