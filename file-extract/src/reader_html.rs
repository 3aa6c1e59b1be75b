use std::path::Path;

use crate::{reader_txt, ExtractError};

/// Elements whose content is chrome, not document text.
const DROP_ELEMENTS: [&str; 5] = ["script", "style", "nav", "footer", "header"];

/// Read an HTML file and return its visible text. Script/style blocks and
/// page chrome (nav/footer/header) are removed before conversion so menus do
/// not pollute the index.
pub fn read_html(path: &Path) -> Result<String, ExtractError> {
    let raw = reader_txt::read_text(path)?;
    let stripped = strip_elements(&raw, &DROP_ELEMENTS);
    let text = nanohtml2text::html2text(&stripped);
    Ok(collapse_whitespace(&text))
}

/// Remove `<tag ...>...</tag>` spans, case-insensitively. Unclosed tags drop
/// everything to the end of input, which is the safe direction for scripts.
fn strip_elements(html: &str, tags: &[&str]) -> String {
    let bytes = html.as_bytes();
    let mut keep = vec![true; bytes.len()];
    for tag in tags {
        let open = format!("<{tag}");
        let close = format!("</{tag}>");
        let mut at = 0usize;
        while let Some(start) = find_ascii_ci(bytes, open.as_bytes(), at) {
            // Require a delimiter after the name so `<header` does not match `<head>`.
            let after = start + open.len();
            let boundary = bytes
                .get(after)
                .map(|&b| b == b'>' || b == b'/' || b.is_ascii_whitespace())
                .unwrap_or(true);
            if !boundary {
                at = after;
                continue;
            }
            let end = match find_ascii_ci(bytes, close.as_bytes(), start) {
                Some(e) => e + close.len(),
                None => bytes.len(),
            };
            for flag in &mut keep[start..end] {
                *flag = false;
            }
            at = end;
        }
    }
    let kept: Vec<u8> = bytes
        .iter()
        .zip(keep)
        .filter_map(|(&b, k)| k.then_some(b))
        .collect();
    String::from_utf8_lossy(&kept).into_owned()
}

fn find_ascii_ci(hay: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || hay.len() < needle.len() || from > hay.len() - needle.len() {
        return None;
    }
    (from..=hay.len() - needle.len())
        .find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_html(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        std::fs::File::create(&path).unwrap().write_all(body.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn strips_scripts_and_chrome() {
        let (_dir, path) = write_html(
            "<html><head><script>var x = 1;</script><style>p{}</style></head>\
             <body><nav>Home | About</nav><p>Actual article text.</p>\
             <footer>contact us</footer></body></html>",
        );
        let text = read_html(&path).unwrap();
        assert!(text.contains("Actual article text."));
        assert!(!text.contains("var x"));
        assert!(!text.contains("Home | About"));
        assert!(!text.contains("contact us"));
    }

    #[test]
    fn header_element_does_not_swallow_head() {
        let stripped = strip_elements("<head><title>T</title></head><header>H</header>", &["header"]);
        assert!(stripped.contains("<title>T</title>"));
        assert!(!stripped.contains(">H<"));
    }

    #[test]
    fn unclosed_script_drops_to_end() {
        let stripped = strip_elements("before<script>alert(1)", &["script"]);
        assert_eq!(stripped, "before");
    }
}
