// SPDX-FileCopyrightText: The hidbridge authors
// SPDX-License-Identifier: MPL-2.0

//! Canonical virtual device paths.
//!
//! Every HID interface is addressable under a fixed-width URI prefix derived
//! from its descriptor:
//!
//! ```text
//! /hid/IIII/VVVV/PPPP/UUUU/uuuu/
//! ```
//!
//! with the interface number, vendor id, product id, usage page and usage
//! each rendered as four lowercase hex digits. The remainder of the URI
//! selects a sub-resource (`feature/<rid>`, `input/`, `output/<rid>`) or, on
//! a WebSocket handshake, an optional report-id filter.

use std::fmt;

use thiserror::Error;

/// Byte length of the rendered prefix up to and including the final `/`.
pub const VIRTUAL_PATH_LEN: usize = 30;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum VirtualPathError {
    #[error("URI does not match the virtual path pattern")]
    Pattern,
}

/// The five descriptor fields that identify one HID interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualPath {
    pub interface_number: u16,
    pub vendor_id: u16,
    pub product_id: u16,
    pub usage_page: u16,
    pub usage: u16,
}

impl VirtualPath {
    #[must_use]
    pub const fn new(
        interface_number: u16,
        vendor_id: u16,
        product_id: u16,
        usage_page: u16,
        usage: u16,
    ) -> Self {
        Self {
            interface_number,
            vendor_id,
            product_id,
            usage_page,
            usage,
        }
    }

    /// Parse the fixed-width prefix of a request URI.
    ///
    /// Returns the decoded path and the remaining suffix after the trailing
    /// slash. Field digits must be lowercase hex, matching exactly what
    /// [`VirtualPath::fmt`] renders.
    pub fn parse_prefix(uri: &str) -> Result<(Self, &str), VirtualPathError> {
        let bytes = uri.as_bytes();
        // ASCII-only keeps the fixed byte offsets below on char boundaries.
        if bytes.len() < VIRTUAL_PATH_LEN || !uri.is_ascii() || !uri.starts_with("/hid/") {
            return Err(VirtualPathError::Pattern);
        }
        // Slash positions are fixed by the format.
        for pos in [9, 14, 19, 24, 29] {
            if bytes[pos] != b'/' {
                return Err(VirtualPathError::Pattern);
            }
        }
        let field = |start: usize| parse_hex_field(&uri[start..start + 4]);
        let path = Self {
            interface_number: field(5)?,
            vendor_id: field(10)?,
            product_id: field(15)?,
            usage_page: field(20)?,
            usage: field(25)?,
        };
        Ok((path, &uri[VIRTUAL_PATH_LEN..]))
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            interface_number,
            vendor_id,
            product_id,
            usage_page,
            usage,
        } = self;
        write!(f, "/hid/{interface_number:04x}/{vendor_id:04x}/{product_id:04x}/{usage_page:04x}/{usage:04x}/")
    }
}

fn parse_hex_field(digits: &str) -> Result<u16, VirtualPathError> {
    // from_str_radix() also accepts uppercase digits and a leading sign,
    // neither of which a rendered path may contain.
    if digits
        .bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        u16::from_str_radix(digits, 16).map_err(|_| VirtualPathError::Pattern)
    } else {
        Err(VirtualPathError::Pattern)
    }
}

/// Sub-resource selector for one-shot report transfers over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportSelector {
    /// `feature/<rid>`: GET or SET a feature report.
    Feature(u8),
    /// `input/`: read a single input report.
    Input,
    /// `output/<rid>`: send an output report.
    Output(u8),
}

impl ReportSelector {
    /// Parse the suffix that follows the virtual path prefix.
    #[must_use]
    pub fn parse(suffix: &str) -> Option<Self> {
        if let Some(rid) = suffix.strip_prefix("feature/") {
            Some(Self::Feature(truncate_u8(parse_leading_number(rid))))
        } else if suffix.starts_with("input/") {
            Some(Self::Input)
        } else if let Some(rid) = suffix.strip_prefix("output/") {
            Some(Self::Output(truncate_u8(parse_leading_number(rid))))
        } else {
            None
        }
    }
}

/// Parse the longest leading number of a string, `strtol`-style.
///
/// Accepts decimal and `0x`-prefixed hex; stops at the first byte that does
/// not belong to the number. An empty or non-numeric string yields 0.
#[must_use]
pub fn parse_leading_number(s: &str) -> u32 {
    let bytes = s.as_bytes();
    let (radix, digits) = match bytes {
        [b'0', b'x' | b'X', rest @ ..] => (16, rest),
        _ => (10, bytes),
    };
    let mut value: u32 = 0;
    for &b in digits {
        let Some(digit) = (b as char).to_digit(radix) else {
            break;
        };
        value = value.saturating_mul(radix).saturating_add(digit);
    }
    value
}

#[must_use]
pub(crate) fn truncate_u8(value: u32) -> u8 {
    #[allow(clippy::cast_possible_truncation)]
    {
        value as u8
    }
}

#[must_use]
pub(crate) fn truncate_u16(value: u32) -> u16 {
    #[allow(clippy::cast_possible_truncation)]
    {
        value as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_prefix_is_fixed_width() {
        let path = VirtualPath::new(0, 0x1234, 0x5678, 0x0001, 0x0002);
        let rendered = path.to_string();
        assert_eq!(VIRTUAL_PATH_LEN, rendered.len());
        assert_eq!("/hid/0000/1234/5678/0001/0002/", rendered);
        // Negative hidapi interface numbers are masked to 16 bits upstream.
        let masked = VirtualPath::new(0xffff, 1, 2, 3, 4);
        assert_eq!("/hid/ffff/0001/0002/0003/0004/", masked.to_string());
    }

    #[test]
    fn parse_round_trips_render() {
        let path = VirtualPath::new(0x0001, 0x046d, 0xc077, 0x0001, 0x0006);
        let rendered = path.to_string();
        let (parsed, suffix) = VirtualPath::parse_prefix(&rendered).unwrap();
        assert_eq!(path, parsed);
        assert!(suffix.is_empty());
    }

    #[test]
    fn parse_returns_suffix() {
        let (_, suffix) =
            VirtualPath::parse_prefix("/hid/0000/1234/5678/0001/0002/feature/0x03").unwrap();
        assert_eq!("feature/0x03", suffix);
    }

    #[test]
    fn parse_rejects_malformed_prefixes() {
        for uri in [
            "/hid/",
            "/hid//enumerate",
            "/hid/0000/1234/5678/0001/0002", // missing trailing slash
            "/hid/0000/1234/5678/0001/00xx/",
            "/hid/0000/1234/5678/0001/00AB/", // uppercase digits
            "/hid/0000/1234/5678/0001/+002/",
            "/other/0000/1234/5678/0001/0002/",
        ] {
            assert_eq!(
                Err(VirtualPathError::Pattern),
                VirtualPath::parse_prefix(uri).map(|(path, _)| path),
                "{uri}"
            );
        }
    }

    #[test]
    fn selector_parsing() {
        assert_eq!(
            Some(ReportSelector::Feature(3)),
            ReportSelector::parse("feature/0x03")
        );
        assert_eq!(
            Some(ReportSelector::Feature(7)),
            ReportSelector::parse("feature/7")
        );
        assert_eq!(Some(ReportSelector::Input), ReportSelector::parse("input/"));
        assert_eq!(
            Some(ReportSelector::Output(255)),
            ReportSelector::parse("output/0xff")
        );
        // Missing trailing slash or unknown selectors do not match.
        assert_eq!(None, ReportSelector::parse("input"));
        assert_eq!(None, ReportSelector::parse("report/1"));
        assert_eq!(None, ReportSelector::parse("0x02"));
    }

    #[test]
    fn leading_number_parsing() {
        assert_eq!(0, parse_leading_number(""));
        assert_eq!(0, parse_leading_number("abc"));
        assert_eq!(2, parse_leading_number("2"));
        assert_eq!(2, parse_leading_number("2/trailing"));
        assert_eq!(0x1a, parse_leading_number("0x1a"));
        assert_eq!(0, parse_leading_number("0x"));
        assert_eq!(4660, parse_leading_number("4660"));
    }
}
