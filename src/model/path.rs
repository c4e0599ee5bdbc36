// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Flowsheet MCP and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::str::FromStr;

use smol_str::SmolStr;

/// One `name` or `name[i,j,...]` step of a [`ComponentPath`].
///
/// Index elements are stored in canonical form: surrounding quotes are dropped and numeric
/// elements are rendered as floats, so `x[0]`, `x[0.0]` and `x['0.0']` address the same element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathSegment {
    name: SmolStr,
    index: Option<Vec<SmolStr>>,
}

impl PathSegment {
    fn parse(name: &str, index: Option<&str>, position: usize) -> Result<Self, PathError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PathError::EmptySegment { position });
        }
        let index = match index {
            None => None,
            Some(raw) => {
                let elements = raw
                    .split(',')
                    .map(canonical_index_element)
                    .collect::<Option<Vec<_>>>()
                    .ok_or(PathError::EmptyIndex { position })?;
                Some(elements)
            }
        };
        Ok(Self { name: SmolStr::new(name), index })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<&[SmolStr]> {
        self.index.as_deref()
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(index) = &self.index {
            f.write_str("[")?;
            for (pos, element) in index.iter().enumerate() {
                if pos > 0 {
                    f.write_str(",")?;
                }
                f.write_str(element)?;
            }
            f.write_str("]")?;
        }
        Ok(())
    }
}

fn canonical_index_element(raw: &str) -> Option<SmolStr> {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .or_else(|| trimmed.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')))
        .unwrap_or(trimmed);
    if unquoted.is_empty() {
        return None;
    }
    match unquoted.parse::<f64>() {
        Ok(number) if number.is_finite() => Some(SmolStr::new(format!("{number:?}"))),
        _ => Some(SmolStr::new(unquoted)),
    }
}

/// Hierarchical address of a variable, constraint or block, e.g.
/// `fs.valve.control_volume.properties_in[0.0].pressure`.
///
/// Segments are separated by `.` outside of brackets; names may contain spaces. Paths are only
/// meaningful relative to the model they were captured from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentPath {
    segments: Vec<PathSegment>,
}

impl ComponentPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> &PathSegment {
        // Construction guarantees at least one segment.
        &self.segments[self.segments.len() - 1]
    }

    /// Proper prefixes, outermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = ComponentPath> + '_ {
        (1..self.segments.len()).map(|len| Self { segments: self.segments[..len].to_vec() })
    }

    pub fn starts_with(&self, prefix: &ComponentPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Drops a leading root alias segment (`m.fs.x` -> `fs.x`).
    pub fn strip_root(&self, alias: &str) -> Option<ComponentPath> {
        let first = self.segments.first()?;
        if self.segments.len() < 2 || first.is_indexed() || first.name() != alias {
            return None;
        }
        Some(Self { segments: self.segments[1..].to_vec() })
    }

    /// True if `self` is `unindexed` with an index attached to its last segment.
    pub fn is_element_of(&self, unindexed: &ComponentPath) -> bool {
        if self.segments.len() != unindexed.segments.len() || unindexed.last().is_indexed() {
            return false;
        }
        let split = self.segments.len() - 1;
        self.segments[..split] == unindexed.segments[..split]
            && self.last().is_indexed()
            && self.last().name() == unindexed.last().name()
    }
}

impl fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pos, segment) in self.segments.iter().enumerate() {
            if pos > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    Empty,
    EmptySegment { position: usize },
    EmptyIndex { position: usize },
    UnclosedIndex { position: usize },
    UnexpectedClose { position: usize },
    NestedIndex { position: usize },
    TrailingAfterIndex { position: usize },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("path must not be empty"),
            Self::EmptySegment { position } => write!(f, "empty path segment at byte {position}"),
            Self::EmptyIndex { position } => write!(f, "empty index element at byte {position}"),
            Self::UnclosedIndex { position } => write!(f, "unclosed '[' at byte {position}"),
            Self::UnexpectedClose { position } => write!(f, "unexpected ']' at byte {position}"),
            Self::NestedIndex { position } => write!(f, "nested '[' at byte {position}"),
            Self::TrailingAfterIndex { position } => {
                write!(f, "expected '.' after index at byte {position}")
            }
        }
    }
}

impl std::error::Error for PathError {}

impl FromStr for ComponentPath {
    type Err = PathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        let mut name_start = 0usize;
        let mut chars = raw.char_indices();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '.' => {
                    segments.push(PathSegment::parse(&raw[name_start..pos], None, name_start)?);
                    name_start = pos + 1;
                }
                '[' => {
                    let index_start = pos + 1;
                    let mut index_end = None;
                    for (inner_pos, inner) in chars.by_ref() {
                        match inner {
                            ']' => {
                                index_end = Some(inner_pos);
                                break;
                            }
                            '[' => return Err(PathError::NestedIndex { position: inner_pos }),
                            _ => {}
                        }
                    }
                    let index_end = index_end.ok_or(PathError::UnclosedIndex { position: pos })?;
                    segments.push(PathSegment::parse(
                        &raw[name_start..pos],
                        Some(&raw[index_start..index_end]),
                        name_start,
                    )?);

                    match chars.next() {
                        None => return Ok(Self { segments }),
                        Some((dot_pos, '.')) => name_start = dot_pos + 1,
                        Some((other_pos, _)) => {
                            return Err(PathError::TrailingAfterIndex { position: other_pos })
                        }
                    }
                }
                ']' => return Err(PathError::UnexpectedClose { position: pos }),
                _ => {}
            }
        }

        segments.push(PathSegment::parse(&raw[name_start..], None, name_start)?);
        Ok(Self { segments })
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{ComponentPath, PathError};

    fn path(raw: &str) -> ComponentPath {
        raw.parse().expect("component path")
    }

    #[rstest]
    #[case("fs.valve.valve_opening", "fs.valve.valve_opening")]
    #[case("fs.valve.inlet.flow_mol[0]", "fs.valve.inlet.flow_mol[0.0]")]
    #[case("fs.sep.eqn[ 0.0 , 'water' ]", "fs.sep.eqn[0.0,water]")]
    #[case("fs.TVR Split_1646163.pressure_equality_eqn[0.0,outlet_1]", "fs.TVR Split_1646163.pressure_equality_eqn[0.0,outlet_1]")]
    #[case("fs.cv.properties_in[0.0].pressure", "fs.cv.properties_in[0.0].pressure")]
    fn parses_and_renders_canonically(#[case] raw: &str, #[case] rendered: &str) {
        assert_eq!(path(raw).to_string(), rendered);
    }

    #[rstest]
    #[case("", PathError::Empty)]
    #[case("fs..valve", PathError::EmptySegment { position: 3 })]
    #[case("fs.valve.", PathError::EmptySegment { position: 9 })]
    #[case("fs.x[0", PathError::UnclosedIndex { position: 4 })]
    #[case("fs.x]", PathError::UnexpectedClose { position: 4 })]
    #[case("fs.x[0[1]]", PathError::NestedIndex { position: 6 })]
    #[case("fs.x[0]y", PathError::TrailingAfterIndex { position: 7 })]
    #[case("fs.x[]", PathError::EmptyIndex { position: 3 })]
    fn rejects_malformed_paths(#[case] raw: &str, #[case] expected: PathError) {
        assert_eq!(raw.parse::<ComponentPath>(), Err(expected));
    }

    #[test]
    fn strip_root_only_drops_matching_unindexed_prefix() {
        assert_eq!(path("m.fs.valve").strip_root("m"), Some(path("fs.valve")));
        assert_eq!(path("fs.valve").strip_root("m"), None);
        assert_eq!(path("m").strip_root("m"), None);
        assert_eq!(path("m[0].fs").strip_root("m"), None);
    }

    #[test]
    fn element_of_matches_only_the_last_segment_index() {
        let unindexed = path("fs.valve.flow_mol");
        assert!(path("fs.valve.flow_mol[0.0]").is_element_of(&unindexed));
        assert!(!path("fs.valve.flow_mol").is_element_of(&unindexed));
        assert!(!path("fs.pump.flow_mol[0.0]").is_element_of(&unindexed));
        assert!(!path("fs.valve.flow[0.0]").is_element_of(&unindexed));
    }

    #[test]
    fn ancestors_are_outermost_first() {
        let ancestors = path("fs.valve.cv.x").ancestors().map(|p| p.to_string()).collect::<Vec<_>>();
        assert_eq!(ancestors, vec!["fs", "fs.valve", "fs.valve.cv"]);
    }
}
