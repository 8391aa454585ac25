// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! Command line options.
//!
//! The flag set mirrors the classic WebHID server so existing launch
//! scripts keep working. Flags configuring features this build does not
//! ship (digest auth, CGI, SSL termination, traffic hexdumps) are accepted
//! and warned about instead of failing the launch.

use std::path::{Path, PathBuf};

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "hidbridge", version, about = "HID streaming server")]
pub struct Args {
    /// TCP port to listen on.
    #[arg(short = 'p', long, default_value_t = 8000)]
    pub port: u16,

    /// Document root for static file serving. Defaults to the directory
    /// containing the server binary.
    #[arg(short = 'd', long)]
    pub docroot: Option<PathBuf>,

    /// Comma-separated URL rewrites, each `"/uri-prefix=/filesystem/path"`.
    #[arg(short = 'r', long, default_value = "")]
    pub url_rewrites: String,

    /// Authentication domain (accepted for compatibility, not supported).
    #[arg(short = 'a', long)]
    pub auth_domain: Option<String>,

    /// Global auth file (accepted for compatibility, not supported).
    #[arg(short = 'P', long)]
    pub global_auth_file: Option<PathBuf>,

    /// Per-directory auth file (accepted for compatibility, not supported).
    #[arg(short = 'A', long)]
    pub per_directory_auth_file: Option<PathBuf>,

    /// Traffic hexdump file (accepted for compatibility, not supported).
    #[arg(short = 'D', long)]
    pub hexdump_file: Option<PathBuf>,

    /// CGI interpreter (accepted for compatibility, not supported).
    #[arg(short = 'i', long)]
    pub cgi_interpreter: Option<PathBuf>,

    /// SSL certificate (accepted for compatibility, not supported).
    #[arg(short = 's', long)]
    pub ssl_cert: Option<PathBuf>,
}

impl Args {
    /// Warn once for every compatibility flag that has no backing feature.
    pub fn warn_unsupported(&self) {
        let ignored: [(&str, bool); 6] = [
            ("-a/--auth-domain", self.auth_domain.is_some()),
            ("-P/--global-auth-file", self.global_auth_file.is_some()),
            (
                "-A/--per-directory-auth-file",
                self.per_directory_auth_file.is_some(),
            ),
            ("-D/--hexdump-file", self.hexdump_file.is_some()),
            ("-i/--cgi-interpreter", self.cgi_interpreter.is_some()),
            ("-s/--ssl-cert", self.ssl_cert.is_some()),
        ];
        for (flag, given) in ignored {
            if given {
                log::warn!("Ignoring {flag}: the feature is not supported by this build");
            }
        }
    }

    /// The docroot to serve from: either the `-d` flag or the directory of
    /// the server binary.
    #[must_use]
    pub fn resolved_docroot(&self) -> PathBuf {
        if let Some(docroot) = &self.docroot {
            return docroot.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
