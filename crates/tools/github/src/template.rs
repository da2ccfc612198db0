//! Typed asset-name templates.
//!
//! A template is literal text interleaved with named placeholders, e.g.
//! `{base_name}{separator}{os_tag}{separator}{arch_tag}{compress_ext}`.
//! Rendering substitutes each placeholder with its regex-escaped value and
//! passes literal text through unchanged, so the literal parts act as an
//! operator-authored regex fragment while values can never inject syntax.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use taskrunner_core::{Error, Result};

/// Named value that can appear in an asset template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// Asset base name, e.g. `task`.
    BaseName,
    /// Separator between name parts, e.g. `_` or `-`.
    Separator,
    /// OS tag, e.g. `linux`.
    OsTag,
    /// Architecture tag, e.g. `amd64`.
    ArchTag,
    /// Release tag of the latest release, e.g. `v1.2.0`.
    Version,
    /// Archive suffix, e.g. `.tar.gz`.
    CompressExt,
}

impl Placeholder {
    const ALL: [Self; 6] = [
        Self::BaseName,
        Self::Separator,
        Self::OsTag,
        Self::ArchTag,
        Self::Version,
        Self::CompressExt,
    ];

    /// Name as written between braces.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::BaseName => "base_name",
            Self::Separator => "separator",
            Self::OsTag => "os_tag",
            Self::ArchTag => "arch_tag",
            Self::Version => "version",
            Self::CompressExt => "compress_ext",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value(Placeholder),
}

/// Parsed asset-name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTemplate {
    segments: Vec<Segment>,
}

impl AssetTemplate {
    /// `{base_name}{separator}{os_tag}{separator}{arch_tag}{compress_ext}`
    #[must_use]
    pub fn platform() -> Self {
        Self::from_placeholders(&[
            Placeholder::BaseName,
            Placeholder::Separator,
            Placeholder::OsTag,
            Placeholder::Separator,
            Placeholder::ArchTag,
            Placeholder::CompressExt,
        ])
    }

    /// `{base_name}{compress_ext}`, for releases publishing one archive.
    #[must_use]
    pub fn generic() -> Self {
        Self::from_placeholders(&[Placeholder::BaseName, Placeholder::CompressExt])
    }

    /// `{base_name}{separator}{version}{compress_ext}`
    #[must_use]
    pub fn versioned() -> Self {
        Self::from_placeholders(&[
            Placeholder::BaseName,
            Placeholder::Separator,
            Placeholder::Version,
            Placeholder::CompressExt,
        ])
    }

    fn from_placeholders(placeholders: &[Placeholder]) -> Self {
        Self {
            segments: placeholders.iter().copied().map(Segment::Value).collect(),
        }
    }

    /// Parse template text. Unknown or unterminated placeholders are errors.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(Error::invalid_config("asset template", "template is empty"));
        }

        let mut segments = Vec::new();
        let mut rest = text;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                return Err(Error::invalid_config(
                    "asset template",
                    format!("unterminated placeholder in '{text}'"),
                ));
            };
            let key = &after[..close];
            let placeholder = Placeholder::from_key(key).ok_or_else(|| {
                Error::invalid_config(
                    "asset template",
                    format!("unknown placeholder '{{{key}}}' in '{text}'"),
                )
            })?;
            segments.push(Segment::Value(placeholder));
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Render the search expression, asking `value` for each placeholder.
    ///
    /// Values are regex-escaped. A placeholder with no value is an error.
    pub fn render<'a, F>(&self, value: F) -> Result<String>
    where
        F: Fn(Placeholder) -> Option<&'a str>,
    {
        let mut pattern = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => pattern.push_str(text),
                Segment::Value(p) => {
                    let v = value(*p).ok_or_else(|| {
                        Error::invalid_config(
                            "asset template",
                            format!("no value for placeholder '{{{}}}'", p.key()),
                        )
                    })?;
                    pattern.push_str(&regex::escape(v));
                }
            }
        }
        Ok(pattern)
    }

    /// Render and compile the search expression.
    pub fn compile<'a, F>(&self, value: F) -> Result<Regex>
    where
        F: Fn(Placeholder) -> Option<&'a str>,
    {
        let pattern = self.render(value)?;
        Regex::new(&pattern).map_err(|e| {
            Error::invalid_config("asset template", format!("pattern '{pattern}' is not a valid regex: {e}"))
        })
    }
}

impl FromStr for AssetTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for AssetTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => f.write_str(text)?,
                Segment::Value(p) => write!(f, "{{{}}}", p.key())?,
            }
        }
        Ok(())
    }
}
