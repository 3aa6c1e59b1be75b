use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::{failed, io_err, ExtractError};

fn local_name(q: &[u8]) -> &[u8] {
    match q.iter().position(|&b| b == b':') {
        Some(i) => &q[i + 1..],
        None => q,
    }
}

/// Read a DOCX file and return its paragraph text, one paragraph per line.
///
/// The document body lives in `word/document.xml` inside the zip container;
/// runs of text are `w:t` elements, paragraph boundaries are `w:p` ends,
/// explicit line breaks are `w:br`/`w:tab`. Empty paragraphs are dropped.
pub fn read_docx(path: &Path) -> Result<String, ExtractError> {
    let file = std::fs::File::open(path).map_err(|e| io_err(path, e))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| failed(path, format!("not a valid .docx (zip) file: {e}")))?;

    let mut xml = String::new();
    zip.by_name("word/document.xml")
        .map_err(|e| failed(path, format!("missing word/document.xml: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| io_err(path, e))?;

    let mut reader = Reader::from_str(&xml);
    reader.trim_text(false);
    let mut buf = Vec::new();

    let mut out = String::new();
    let mut para = String::new();
    let mut in_text = false;

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if local_name(e.name().as_ref()) == b"t" {
                    in_text = true;
                }
            }
            Ok(Event::Empty(e)) => match local_name(e.name().as_ref()) {
                b"br" => para.push('\n'),
                b"tab" => para.push('\t'),
                _ => {}
            },
            Ok(Event::End(e)) => match local_name(e.name().as_ref()) {
                b"t" => in_text = false,
                b"p" => {
                    let text = para.trim();
                    if !text.is_empty() {
                        out.push_str(text);
                        out.push('\n');
                    }
                    para.clear();
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_text {
                    if let Ok(cow) = t.unescape() {
                        para.push_str(&cow);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(failed(path, format!("malformed document.xml: {e}"))),
            _ => {}
        }
    }

    // Trailing paragraph without a closing event.
    let tail = para.trim();
    if !tail.is_empty() {
        out.push_str(tail);
        out.push('\n');
    }

    if out.trim().is_empty() {
        return Err(failed(path, "document contains no extractable text"));
    }
    Ok(out)
}
