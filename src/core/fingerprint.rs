//! EG-015: BLAKE3 fingerprints of canonical dumps.
//!
//! Two documents that load equal dump to the same text, so the hash of
//! the dump identifies a document independent of source formatting.

use super::dumper::dump;
use super::error::Error;
use super::loader::Document;

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Fingerprint of a document's canonical dump.
pub fn fingerprint(doc: &Document) -> Result<String, Error> {
    Ok(hash_string(&dump(doc)?))
}
