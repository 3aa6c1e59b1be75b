use std::fs;
use std::path::Path;

use crate::{io_err, ExtractError};

/// Read a text file as UTF-8, sniffing a BOM first so UTF-16 exports from
/// office tooling still come through. Undecodable bytes are replaced rather
/// than failing the whole file.
pub fn read_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
    Ok(decode_bytes(&bytes))
}

pub(crate) fn decode_bytes(bytes: &[u8]) -> String {
    let text = match bytes {
        [0xFF, 0xFE, rest @ ..] => encoding_rs::UTF_16LE.decode(rest).0.into_owned(),
        [0xFE, 0xFF, rest @ ..] => encoding_rs::UTF_16BE.decode(rest).0.into_owned(),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    // Normalize CRLF to LF
    text.replace('\r', "")
}
