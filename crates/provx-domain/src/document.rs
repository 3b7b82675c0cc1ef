use std::io::Cursor;

use plist::{Dictionary, Value};

use crate::error::ProfileError;

const XML_START: &[u8] = b"<?xml";
const PLIST_END: &[u8] = b"</plist>";
const BINARY_MAGIC: &[u8] = b"bplist";

/// Decodes the property list carried by a profile file.
pub trait DocumentDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> Result<Dictionary, ProfileError>;
}

/// Reads the XML property list out of the CMS envelope Apple signs profiles
/// with. Bare XML or binary property lists are accepted as well.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlistDocumentDecoder;

impl DocumentDecoder for PlistDocumentDecoder {
    fn decode(&self, data: &[u8]) -> Result<Dictionary, ProfileError> {
        let payload = if data.starts_with(BINARY_MAGIC) {
            data
        } else {
            embedded_property_list(data).ok_or(ProfileError::MissingDocument)?
        };
        Value::from_reader(Cursor::new(payload))?
            .into_dictionary()
            .ok_or(ProfileError::NotADictionary)
    }
}

/// Slice of `data` spanning the first `<?xml` through the following `</plist>`.
#[must_use]
pub fn embedded_property_list(data: &[u8]) -> Option<&[u8]> {
    let start = find(data, XML_START)?;
    let end = start + find(&data[start..], PLIST_END)? + PLIST_END.len();
    Some(&data[start..end])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
