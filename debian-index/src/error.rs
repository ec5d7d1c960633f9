// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Describes how a control file line violated the stanza grammar.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StanzaViolation {
    /// An indented line appeared before any field in the current stanza.
    ContinuationWithoutKey,
    /// A field line lacked the `: ` separator.
    MissingSeparator(String),
    /// A field name occurred twice in the same stanza.
    DuplicateKey(String),
}

impl std::fmt::Display for StanzaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContinuationWithoutKey => f.write_str("continuation without preceding key"),
            Self::MissingSeparator(line) => write!(f, "missing separator in line '{}'", line),
            Self::DuplicateKey(key) => write!(f, "duplicate key '{}'", key),
        }
    }
}

/// Describes how a PGP cleartext signed document deviated from the expected envelope.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ClearsignError {
    #[error("missing BEGIN PGP SIGNED MESSAGE marker")]
    MissingMessageMarker,
    #[error("BEGIN PGP SIGNED MESSAGE marker occurs more than once")]
    RepeatedMessageMarker,
    #[error("content precedes BEGIN PGP SIGNED MESSAGE marker")]
    LeadingContent,
    #[error("malformed armor header")]
    MalformedArmorHeader,
    #[error("missing BEGIN PGP SIGNATURE marker")]
    MissingSignatureMarker,
    #[error("BEGIN PGP SIGNATURE marker occurs more than once")]
    RepeatedSignatureMarker,
}

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum DebianError {
    #[error("URL error: {0:?}")]
    Url(#[from] url::ParseError),

    #[error("hex parsing error: {0:?}")]
    Hex(#[from] hex::FromHexError),

    #[error("date parsing error: {0:?}")]
    DateParse(#[from] mailparse::MailParseError),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0:?}")]
    Reqwest(#[from] reqwest::Error),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("repository I/O error on path {0}: {1:?}")]
    RepositoryIoPath(String, std::io::Error),

    #[error("content at {0} is not valid UTF-8: {1:?}")]
    Utf8Path(String, std::string::FromUtf8Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed stanza at line {line}: {violation}")]
    MalformedStanza {
        line: usize,
        violation: StanzaViolation,
    },

    #[error("required field missing in control paragraph: {0}")]
    ControlRequiredFieldMissing(String),

    #[error("malformed InRelease at {0}: {1}")]
    MalformedRelease(String, #[source] ClearsignError),

    #[error("no (In)Release found at {0}")]
    ReleaseUnavailable(String),

    #[error("no Packages file at {0}")]
    IndexUnavailable(String),

    #[error("error reading Packages file at {url}: {source}")]
    IndexParse {
        url: String,
        #[source]
        source: Box<DebianError>,
    },

    #[error("release field not found: {0}")]
    FieldNotFound(String),

    #[error("fields {first} and {second} both normalize to {normalized}")]
    ReleaseFieldKeyCollision {
        normalized: String,
        first: String,
        second: String,
    },

    #[error("expected 1 paragraph in control file; got {0}")]
    ReleaseControlParagraphMismatch(usize),

    #[error("digest missing from index entry")]
    ReleaseMissingDigest,

    #[error("size missing from index entry")]
    ReleaseMissingSize,

    #[error("path missing from index entry")]
    ReleaseMissingPath,

    #[error("index entry path unexpectedly has spaces: {0}")]
    ReleasePathWithSpaces(String),

    #[error("{0}")]
    Other(String),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, DebianError>;
