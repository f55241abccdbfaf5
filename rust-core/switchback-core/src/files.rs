//! # Static Files
//!
//! Handler that serves files below a root directory through a wildcard
//! route. Paths that try to climb out of the root are refused.

use crate::context::Context;
use crate::handler::Handler;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Capture name the file path is bound to
pub const FILEPATH_PARAM: &str = "filepath";

/// Wildcard pattern for files mounted at `relative`
#[must_use]
pub fn wildcard_pattern(relative: &str) -> String {
    format!("{}/*{FILEPATH_PARAM}", relative.trim_end_matches('/'))
}

/// Handler serving files from `root`
///
/// Directories are served through their `index.html`. Anything missing or
/// unreadable answers 404.
#[must_use]
pub fn static_handler(root: PathBuf) -> Handler {
    Handler::named("static_files", move |c| serve(c, &root))
}

fn serve(c: &mut Context, root: &Path) {
    let Some(mut target) = resolve(root, c.param(FILEPATH_PARAM)) else {
        debug!(path = %c.path(), "refusing path outside static root");
        c.status(404);
        return;
    };
    if target.is_dir() {
        target.push("index.html");
    }

    match std::fs::read(&target) {
        Ok(bytes) => {
            c.set_header("Content-Type", content_type(&target));
            c.data(200, bytes);
        }
        Err(e) => {
            debug!(file = %target.display(), error = %e, "static file not served");
            c.status(404);
        }
    }
}

/// Join `relative` onto `root`, rejecting any component that is not a
/// plain name
fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut target = root.to_path_buf();
    for component in Path::new(relative.trim_start_matches('/')).components() {
        match component {
            Component::Normal(name) => target.push(name),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(target)
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
