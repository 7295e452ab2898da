//! Filesystem helpers shared by the routers and the render pipeline.

use std::path::{Component, Path, PathBuf};

pub const MARKDOWN_CONTENT_TYPE: &str = "text/x-markdown";
pub const R_MARKDOWN_CONTENT_TYPE: &str = "text/x-r-markdown";

/// Content type used when serving `path`, with the markdown flavours that
/// the help router dispatches on reported distinctly.
pub fn content_type_for(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("md" | "markdown") => MARKDOWN_CONTENT_TYPE.to_string(),
        Some("rmd") => R_MARKDOWN_CONTENT_TYPE.to_string(),
        _ => mime_guess::from_path(path)
            .first_or_octet_stream()
            .as_ref()
            .to_string(),
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn resolve_aliased_path(raw: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (raw, home) {
        ("~", Some(home)) => home,
        (value, Some(home)) if value.starts_with("~/") => home.join(&value[2..]),
        (value, _) => PathBuf::from(value),
    }
}

/// Inverse of [`resolve_aliased_path`]: paths under the home directory are
/// shown as `~/...`.
pub fn create_aliased_path(path: &Path) -> String {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    alias_under(path, home.as_deref())
}

fn alias_under(path: &Path, home: Option<&Path>) -> String {
    match home.and_then(|home| path.strip_prefix(home).ok()) {
        Some(rest) if rest.as_os_str().is_empty() => "~".to_string(),
        Some(rest) => format!("~/{}", rest.display()),
        None => path.display().to_string(),
    }
}

/// Join a request-supplied relative path onto `root`, refusing anything that
/// could climb out of it.
pub fn join_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let candidate = Path::new(relative);
    let escapes = candidate.components().any(|component| {
        matches!(
            component,
            Component::ParentDir | Component::Prefix(_) | Component::RootDir
        )
    });
    if escapes {
        return None;
    }
    Some(root.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_flavours_have_dedicated_content_types() {
        assert_eq!(content_type_for(Path::new("a/slides.md")), MARKDOWN_CONTENT_TYPE);
        assert_eq!(content_type_for(Path::new("a/slides.Rmd")), R_MARKDOWN_CONTENT_TYPE);
        assert_eq!(content_type_for(Path::new("movie.mp4")), "video/mp4");
        assert_eq!(
            content_type_for(Path::new("blob.unknownext")),
            "application/octet-stream"
        );
    }

    #[test]
    fn join_within_rejects_traversal() {
        let root = Path::new("/srv/deck");
        assert_eq!(
            join_within(root, "img/plot.png"),
            Some(PathBuf::from("/srv/deck/img/plot.png"))
        );
        assert!(join_within(root, "../etc/passwd").is_none());
        assert!(join_within(root, "/etc/passwd").is_none());
        assert!(join_within(root, "img/../../x").is_none());
    }

    #[test]
    fn home_paths_are_aliased() {
        let home = Path::new("/home/ada");
        assert_eq!(alias_under(Path::new("/home/ada/src/a.cpp"), Some(home)), "~/src/a.cpp");
        assert_eq!(alias_under(home, Some(home)), "~");
        assert_eq!(alias_under(Path::new("/opt/a.cpp"), Some(home)), "/opt/a.cpp");
        assert_eq!(alias_under(Path::new("/opt/a.cpp"), None), "/opt/a.cpp");
    }

    #[test]
    fn plain_paths_are_not_expanded() {
        assert_eq!(resolve_aliased_path("/tmp/x.md"), PathBuf::from("/tmp/x.md"));
        assert_eq!(resolve_aliased_path("docs/x.md"), PathBuf::from("docs/x.md"));
    }
}
