// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! Static file serving for everything outside `/hid/`.
//!
//! A deliberately small collaborator: docroot lookup with optional URL
//! rewrite prefixes, `index.html` for directories, a fixed content-type
//! table and a hard refusal of path traversal.

use std::path::{Component, Path, PathBuf};

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

#[derive(Debug, Clone)]
struct Rewrite {
    prefix: String,
    target: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StaticFiles {
    docroot: PathBuf,
    rewrites: Vec<Rewrite>,
}

impl StaticFiles {
    /// `url_rewrites` is a comma-separated list of
    /// `"/uri-prefix=/filesystem/path"` pairs; the first matching prefix
    /// wins and bypasses the docroot.
    #[must_use]
    pub fn new(docroot: PathBuf, url_rewrites: &str) -> Self {
        let rewrites = url_rewrites
            .split(',')
            .filter(|pair| !pair.is_empty())
            .filter_map(|pair| {
                let Some((prefix, target)) = pair.split_once('=') else {
                    log::warn!("Ignoring malformed URL rewrite: {pair}");
                    return None;
                };
                Some(Rewrite {
                    prefix: prefix.to_owned(),
                    target: PathBuf::from(target),
                })
            })
            .collect();
        Self { docroot, rewrites }
    }

    pub(crate) async fn serve(&self, uri_path: &str) -> Response {
        let Some(mut file_path) = self.resolve(uri_path) else {
            return (StatusCode::NOT_FOUND, "file not found\n").into_response();
        };
        if tokio::fs::metadata(&file_path)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
        {
            file_path.push("index.html");
        }
        match tokio::fs::read(&file_path).await {
            Ok(contents) => (
                [(header::CONTENT_TYPE, content_type(&file_path))],
                contents,
            )
                .into_response(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                (StatusCode::NOT_FOUND, "file not found\n").into_response()
            }
            Err(err) => {
                log::warn!(
                    "Failed to read {file_path}: {err}",
                    file_path = file_path.display()
                );
                (StatusCode::INTERNAL_SERVER_ERROR, "file not readable\n").into_response()
            }
        }
    }

    fn resolve(&self, uri_path: &str) -> Option<PathBuf> {
        let relative = uri_path.trim_start_matches('/');
        // Refuse traversal before touching the filesystem.
        let traversal = Path::new(relative)
            .components()
            .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
        if traversal {
            return None;
        }
        for rewrite in &self.rewrites {
            if let Some(rest) = uri_path.strip_prefix(rewrite.prefix.as_str()) {
                return Some(rewrite.target.join(rest.trim_start_matches('/')));
            }
        }
        Some(self.docroot.join(relative))
    }
}

fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or_default();
    match extension {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}
