// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! `Release` file primitives.

`Release` files (or `InRelease` if it contains a PGP cleartext signature) are
the main definition of a Debian repository distribution. They are a single control
paragraph that defines repository-level metadata as well as a list of additional
*indices* files.

[ReleaseDocument] represents a parsed `Release` file. Every field is classified as
either a scalar or an array (see [FieldValue]) and is reachable both by its literal
name and by a normalized name (`Valid-Until` is also `valid_until`).

[unwrap_clearsigned()] extracts the signed text from an `InRelease` file.
*/

use {
    crate::{
        control::{ControlField, ControlParagraph, ControlParagraphReader},
        error::{ClearsignError, DebianError, Result},
    },
    chrono::{DateTime, TimeZone, Utc},
    once_cell::sync::OnceCell,
    std::{
        collections::{hash_map::Entry, HashMap},
        io::BufRead,
        ops::Deref,
        str::FromStr,
    },
};

const MESSAGE_MARKER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const SIGNATURE_MARKER: &str = "-----BEGIN PGP SIGNATURE-----";

/// Checksum type / digest mechanism used in a release file.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ChecksumType {
    /// MD5.
    Md5,

    /// SHA-1.
    Sha1,

    /// SHA-256.
    Sha256,
}

impl ChecksumType {
    /// Name of the control field in `Release` files holding this variant type.
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5Sum",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
        }
    }
}

/// Normalize a field name for attribute-style lookup.
///
/// Hyphens become underscores and the result is lowercased.
pub fn normalize_field_name(name: &str) -> String {
    name.replace('-', "_").to_lowercase()
}

/// The value of a field in a [ReleaseDocument].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    /// A value that started on the same line as the field name.
    ///
    /// Continuation lines, if any, are joined with `\n`.
    Scalar(String),

    /// A value with nothing after the field name and one element per
    /// continuation line.
    Array(Vec<String>),
}

impl FieldValue {
    /// Classify a control field.
    pub fn classify(field: &ControlField) -> Self {
        let mut lines = field.iter_lines();

        match lines.next() {
            Some("") if field.is_multiline() => Self::Array(lines.map(String::from).collect()),
            _ => Self::Scalar(field.value_str().to_string()),
        }
    }

    /// Obtain the scalar value, if this is a scalar.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Array(_) => None,
        }
    }

    /// Obtain the array elements, if this is an array.
    pub fn as_array(&self) -> Option<&[String]> {
        match self {
            Self::Scalar(_) => None,
            Self::Array(v) => Some(v),
        }
    }
}

/// Signature material accompanying a release document.
///
/// Signatures are retained so callers can verify them. They are never verified
/// by this crate.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ReleaseSignature {
    /// Content of a `Release.gpg` file.
    Detached(Vec<u8>),

    /// The armored signature block of an `InRelease` file.
    Cleartext(String),
}

/// The pieces of a PGP cleartext signed document.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClearsignedMessage {
    /// The signed text, including the terminator of its last line.
    pub text: String,

    /// The armored signature block, beginning with the `BEGIN PGP SIGNATURE` line.
    pub signature: String,
}

/// Split a PGP cleartext signed document into its text and signature.
///
/// The document must begin with the `BEGIN PGP SIGNED MESSAGE` line, optionally
/// followed by armor headers (e.g. `Hash: SHA512`), then an empty line. The text runs
/// until the `BEGIN PGP SIGNATURE` line. Each marker must occur exactly once.
///
/// Dash-escaped text lines (`- ` prefix) are unescaped. No signature verification
/// is performed.
pub fn unwrap_clearsigned(document: &str) -> std::result::Result<ClearsignedMessage, ClearsignError> {
    match document.matches(MESSAGE_MARKER).count() {
        0 => return Err(ClearsignError::MissingMessageMarker),
        1 => {}
        _ => return Err(ClearsignError::RepeatedMessageMarker),
    }
    match document.matches(SIGNATURE_MARKER).count() {
        0 => return Err(ClearsignError::MissingSignatureMarker),
        1 => {}
        _ => return Err(ClearsignError::RepeatedSignatureMarker),
    }

    let mut rest = document
        .strip_prefix(MESSAGE_MARKER)
        .ok_or(ClearsignError::LeadingContent)?
        .strip_prefix('\n')
        .ok_or(ClearsignError::MalformedArmorHeader)?;

    loop {
        let (line, remaining) = rest
            .split_once('\n')
            .ok_or(ClearsignError::MalformedArmorHeader)?;
        rest = remaining;

        if line.is_empty() {
            break;
        } else if !line.contains(": ") {
            return Err(ClearsignError::MalformedArmorHeader);
        }
    }

    let end = rest
        .find(&format!("\n{}\n", SIGNATURE_MARKER))
        .ok_or(ClearsignError::MissingSignatureMarker)?;
    let (body, signature) = rest.split_at(end + 1);

    let text = body
        .split_inclusive('\n')
        .map(|line| line.strip_prefix("- ").unwrap_or(line))
        .collect::<String>();

    Ok(ClearsignedMessage {
        text,
        signature: signature.to_string(),
    })
}

/// An entry for a file in a parsed `Release` file.
///
/// Instances correspond to a line in a `MD5Sum`, `SHA1`, or `SHA256` field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseFileEntry<'a> {
    /// The path to this file within the distribution directory.
    pub path: &'a str,

    /// The flavor of [Self::digest].
    pub checksum: ChecksumType,

    /// The content digest of this file.
    pub digest: Vec<u8>,

    /// The size of the file in bytes.
    pub size: u64,
}

impl<'a> ReleaseFileEntry<'a> {
    /// The hex encoded content digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(&self.digest)
    }

    /// Obtain the `by-hash` path variant for this entry.
    pub fn by_hash_path(&self) -> String {
        if let Some((prefix, _)) = self.path.rsplit_once('/') {
            format!(
                "{}/by-hash/{}/{}",
                prefix,
                self.checksum.field_name(),
                self.digest_hex()
            )
        } else {
            format!("by-hash/{}/{}", self.checksum.field_name(), self.digest_hex())
        }
    }
}

/// A parsed Debian repository `Release` file.
///
/// Instances wrap a [ControlParagraph], reachable via [Deref], and a lookup table
/// resolving both literal and normalized field names to classified [FieldValue].
///
/// Two distinct fields whose names normalize identically (e.g. `Foo-Bar` and
/// `foo_bar`) are rejected at construction.
#[derive(Debug)]
pub struct ReleaseDocument {
    paragraph: ControlParagraph<'static>,
    values: Vec<FieldValue>,
    keys: HashMap<String, usize>,
    components: OnceCell<Vec<String>>,
    architectures: OnceCell<Vec<String>>,
    signature: Option<ReleaseSignature>,
}

impl Deref for ReleaseDocument {
    type Target = ControlParagraph<'static>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl TryFrom<ControlParagraph<'static>> for ReleaseDocument {
    type Error = DebianError;

    fn try_from(paragraph: ControlParagraph<'static>) -> Result<Self> {
        let mut values = Vec::with_capacity(paragraph.len());
        let mut keys = HashMap::<String, usize>::new();
        let names = paragraph.iter_fields().map(|f| f.name()).collect::<Vec<_>>();

        for (index, field) in paragraph.iter_fields().enumerate() {
            values.push(FieldValue::classify(field));

            for key in [field.name().to_string(), normalize_field_name(field.name())] {
                match keys.entry(key) {
                    Entry::Occupied(entry) if *entry.get() != index => {
                        return Err(DebianError::ReleaseFieldKeyCollision {
                            normalized: entry.key().clone(),
                            first: names[*entry.get()].to_string(),
                            second: field.name().to_string(),
                        });
                    }
                    Entry::Occupied(_) => {}
                    Entry::Vacant(entry) => {
                        entry.insert(index);
                    }
                }
            }
        }

        Ok(Self {
            paragraph,
            values,
            keys,
            components: OnceCell::new(),
            architectures: OnceCell::new(),
            signature: None,
        })
    }
}

impl ReleaseDocument {
    /// Construct an instance by reading data from a reader.
    ///
    /// The source must be a Debian control file with exactly 1 paragraph.
    ///
    /// The source must not be PGP armored. Use [unwrap_clearsigned()] on `InRelease`
    /// content first.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut paragraphs = ControlParagraphReader::new(reader).collect::<Result<Vec<_>>>()?;

        // A Release control file should have a single paragraph.
        if paragraphs.len() != 1 {
            return Err(DebianError::ReleaseControlParagraphMismatch(
                paragraphs.len(),
            ));
        }

        Self::try_from(paragraphs.remove(0))
    }

    /// Construct an instance from the plaintext of a `Release` file.
    pub fn parse_str(s: &str) -> Result<Self> {
        Self::from_reader(std::io::Cursor::new(s.as_bytes()))
    }

    /// Attach signature material to this instance.
    pub fn with_signature(mut self, signature: ReleaseSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Signature material that accompanied this document, if any.
    pub fn signature(&self) -> Option<&ReleaseSignature> {
        self.signature.as_ref()
    }

    /// The underlying control paragraph.
    pub fn paragraph(&self) -> &ControlParagraph<'static> {
        &self.paragraph
    }

    /// Obtain a field by its literal or normalized name.
    pub fn get_field(&self, name: &str) -> Result<&FieldValue> {
        self.keys
            .get(name)
            .map(|index| &self.values[*index])
            .ok_or_else(|| DebianError::FieldNotFound(name.to_string()))
    }

    /// Iterate over `(literal name, value)` pairs in file order.
    pub fn iter_field_values(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.paragraph
            .iter_fields()
            .map(|f| f.name())
            .zip(self.values.iter())
    }

    fn scalar(&self, name: &str) -> Option<&str> {
        self.get_field(name).ok().and_then(FieldValue::as_scalar)
    }

    fn words(&self, name: &str) -> Result<Vec<String>> {
        Ok(match self.get_field(name)? {
            FieldValue::Scalar(v) => v
                .split(' ')
                .filter(|word| !word.is_empty())
                .map(String::from)
                .collect(),
            FieldValue::Array(v) => v.clone(),
        })
    }

    /// Names of components within this repository.
    ///
    /// These are areas within the repository. Values may contain path characters.
    /// e.g. `main`, `updates/main`.
    pub fn components(&self) -> Result<&[String]> {
        self.components
            .get_or_try_init(|| self.words("Components"))
            .map(|v| v.as_slice())
    }

    /// Debian machine architectures supported by this repository.
    ///
    /// e.g. `amd64`, `arm64`.
    pub fn architectures(&self) -> Result<&[String]> {
        self.architectures
            .get_or_try_init(|| self.words("Architectures"))
            .map(|v| v.as_slice())
    }

    /// Description of this repository.
    pub fn description(&self) -> Option<&str> {
        self.scalar("Description")
    }

    /// Origin of the repository.
    pub fn origin(&self) -> Option<&str> {
        self.scalar("Origin")
    }

    /// Label for the repository.
    pub fn label(&self) -> Option<&str> {
        self.scalar("Label")
    }

    /// Version of this repository.
    ///
    /// Typically a sequence of `.` delimited integers.
    pub fn version(&self) -> Option<&str> {
        self.scalar("Version")
    }

    /// Suite of this repository.
    ///
    /// e.g. `stable`, `unstable`, `experimental`.
    pub fn suite(&self) -> Option<&str> {
        self.scalar("Suite")
    }

    /// Codename of this repository.
    pub fn codename(&self) -> Option<&str> {
        self.scalar("Codename")
    }

    /// Time the release file was created, as its raw string value.
    pub fn date_str(&self) -> Option<&str> {
        self.scalar("Date")
    }

    /// Time the release file was created, normalized to UTC.
    pub fn date(&self) -> Option<Result<DateTime<Utc>>> {
        self.date_str().map(parse_rfc5322_date)
    }

    /// Time after which the release file should be considered expired.
    pub fn valid_until(&self) -> Option<Result<DateTime<Utc>>> {
        self.scalar("Valid-Until").map(parse_rfc5322_date)
    }

    /// Whether to acquire files by hash.
    pub fn acquire_by_hash(&self) -> Option<bool> {
        self.scalar("Acquire-By-Hash").map(|v| v == "yes")
    }

    /// Obtain indexed files in this repository.
    ///
    /// [Some] is returned if the field for the checksum flavor is present as an array.
    /// Entries are lazily parsed as they are consumed from the iterator.
    pub fn iter_index_files(
        &self,
        checksum: ChecksumType,
    ) -> Option<Box<(dyn Iterator<Item = Result<ReleaseFileEntry<'_>>> + '_)>> {
        let lines = self
            .get_field(checksum.field_name())
            .ok()
            .and_then(FieldValue::as_array)?;

        Some(Box::new(lines.iter().map(move |v| {
            // Values are of form: <digest> <size> <path>
            let mut parts = v.split_ascii_whitespace();

            let digest = parts.next().ok_or(DebianError::ReleaseMissingDigest)?;
            let size = parts.next().ok_or(DebianError::ReleaseMissingSize)?;
            let path = parts.next().ok_or(DebianError::ReleaseMissingPath)?;

            if parts.next().is_some() {
                return Err(DebianError::ReleasePathWithSpaces(v.to_string()));
            }

            Ok(ReleaseFileEntry {
                path,
                checksum,
                digest: hex::decode(digest)?,
                size: u64::from_str(size)?,
            })
        })))
    }
}

fn parse_rfc5322_date(value: &str) -> Result<DateTime<Utc>> {
    let timestamp = mailparse::dateparse(value)?;

    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| DebianError::Other(format!("date out of range: {}", value)))
}
