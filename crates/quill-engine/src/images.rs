//! Preview image source resolution.

use std::borrow::Cow;
use std::path::Path;
use std::sync::LazyLock;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use regex::{Captures, Regex};

static IMG_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(<img\b[^>]*?\ssrc=")([^"]*)(")"#).unwrap());

static SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap());

/// Characters escaped in a `file://` path.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Rewrite local `<img src>` values to absolute `file://` URLs.
///
/// Relative sources resolve against `file_directory`. Rooted sources already
/// inside `project_directory` are kept as filesystem paths; other rooted
/// sources resolve against `project_directory`. Sources with a scheme and
/// fragment-only sources are untouched. A query string is preserved.
pub(crate) fn resolve_image_paths(
    html: &str,
    file_directory: &Path,
    project_directory: &Path,
) -> String {
    IMG_SRC
        .replace_all(html, |caps: &Captures<'_>| {
            let src = &caps[2];
            match resolve(src, file_directory, project_directory) {
                Some(url) => format!("{}{url}{}", &caps[1], &caps[3]),
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}

fn resolve(src: &str, file_directory: &Path, project_directory: &Path) -> Option<String> {
    if src.is_empty() || src.starts_with('#') || src.starts_with("//") || SCHEME.is_match(src) {
        return None;
    }
    let (path, query) = match src.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (src, None),
    };
    let decoded: Cow<'_, str> = percent_encoding::percent_decode_str(path).decode_utf8_lossy();

    let absolute = match decoded.strip_prefix('/') {
        Some(rooted) if !Path::new(decoded.as_ref()).starts_with(project_directory) => {
            project_directory.join(rooted)
        }
        Some(_) => Path::new(decoded.as_ref()).to_path_buf(),
        None => file_directory.join(decoded.as_ref()),
    };

    let mut url = format!(
        "file://{}",
        utf8_percent_encode(&absolute.to_string_lossy(), PATH)
    );
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    Some(url)
}
