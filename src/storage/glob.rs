//! Path globs over object listings.
//!
//! A glob such as `s3a://bucket/song_data/*/*/*/*.json` is split into a
//! static base URL (`s3a://bucket/song_data`) that a storage provider can be
//! built for, and a relative pattern that listed keys are matched against
//! one segment at a time. `*` and `?` never cross a `/`; a `**` segment
//! matches any number of segments.

use regex::Regex;
use snafu::prelude::*;

use crate::error::{InvalidGlobSnafu, StorageError};

#[derive(Debug, Clone)]
enum Segment {
    /// Matches zero or more whole segments.
    AnyDepth,
    Literal(String),
    Wildcard(Regex),
}

impl Segment {
    fn parse(raw: &str) -> Result<Self, StorageError> {
        if raw == "**" {
            return Ok(Segment::AnyDepth);
        }
        if !has_wildcard(raw) {
            return Ok(Segment::Literal(raw.to_string()));
        }

        let mut expr = String::with_capacity(raw.len() + 8);
        expr.push('^');
        for c in raw.chars() {
            match c {
                '*' => expr.push_str("[^/]*"),
                '?' => expr.push_str("[^/]"),
                other => expr.push_str(&regex::escape(&other.to_string())),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).context(InvalidGlobSnafu {
            pattern: raw.to_string(),
        })?;
        Ok(Segment::Wildcard(regex))
    }

    fn matches(&self, part: &str) -> bool {
        match self {
            Segment::AnyDepth => true,
            Segment::Literal(lit) => lit == part,
            Segment::Wildcard(regex) => regex.is_match(part),
        }
    }
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

/// A glob split into a listable base and a relative matcher.
#[derive(Debug, Clone)]
pub struct Glob {
    base: String,
    pattern: String,
    segments: Vec<Segment>,
}

impl Glob {
    /// Parse a full glob URL or path.
    ///
    /// Without any wildcard the last segment is treated as a literal file
    /// name under its parent.
    pub fn parse(glob: &str) -> Result<Self, StorageError> {
        let parts: Vec<&str> = glob.split('/').collect();
        let first_wild = parts
            .iter()
            .position(|p| has_wildcard(p))
            .unwrap_or(parts.len().saturating_sub(1));

        let base = parts[..first_wild].join("/");
        let relative: Vec<&str> = parts[first_wild..]
            .iter()
            .copied()
            .filter(|p| !p.is_empty())
            .collect();

        let segments = relative
            .iter()
            .map(|p| Segment::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            base,
            pattern: relative.join("/"),
            segments,
        })
    }

    /// The static prefix to build a storage provider for.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The pattern relative to [`Glob::base`].
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Match a key relative to the base.
    pub fn matches(&self, relative: &str) -> bool {
        let parts: Vec<&str> = relative.split('/').filter(|p| !p.is_empty()).collect();
        match_segments(&self.segments, &parts)
    }
}

fn match_segments(segments: &[Segment], parts: &[&str]) -> bool {
    match segments.split_first() {
        None => parts.is_empty(),
        Some((Segment::AnyDepth, rest)) => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        Some((segment, rest)) => match parts.split_first() {
            Some((part, remaining)) => segment.matches(part) && match_segments(rest, remaining),
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_glob_split() {
        let glob = Glob::parse("s3a://udacity-dend/song_data/*/*/*/*.json").unwrap();
        assert_eq!(glob.base(), "s3a://udacity-dend/song_data");
        assert_eq!(glob.pattern(), "*/*/*/*.json");
    }

    #[test]
    fn test_song_glob_matching() {
        let glob = Glob::parse("/raw/song_data/*/*/*/*.json").unwrap();
        assert!(glob.matches("A/A/B/TRAABJL12903CDCF1A.json"));
        assert!(!glob.matches("A/A/TRAABJL12903CDCF1A.json"));
        assert!(!glob.matches("A/A/B/C/TRAABJL12903CDCF1A.json"));
        assert!(!glob.matches("A/A/B/TRAABJL12903CDCF1A.json.bak"));
    }

    #[test]
    fn test_flat_log_glob() {
        let glob = Glob::parse("/raw/log_data/*.json").unwrap();
        assert_eq!(glob.base(), "/raw/log_data");
        assert!(glob.matches("2018-11-12-events.json"));
        assert!(!glob.matches("2018/11/2018-11-12-events.json"));
    }

    #[test]
    fn test_any_depth() {
        let glob = Glob::parse("/raw/**/*.json").unwrap();
        assert!(glob.matches("a.json"));
        assert!(glob.matches("x/y/z/a.json"));
        assert!(!glob.matches("x/y/z/a.csv"));
    }

    #[test]
    fn test_literal_file() {
        let glob = Glob::parse("/raw/log_data/events.json").unwrap();
        assert_eq!(glob.base(), "/raw/log_data");
        assert!(glob.matches("events.json"));
        assert!(!glob.matches("other.json"));
    }

    #[test]
    fn test_question_mark_and_escaping() {
        let glob = Glob::parse("/raw/part-?.json").unwrap();
        assert!(glob.matches("part-1.json"));
        assert!(!glob.matches("part-10.json"));
        assert!(!glob.matches("part-1xjson"));
    }
}
