//! JSON Pointer (RFC 6901) path engine.
//!
//! Paths are parsed into object/array segments so concurrent array
//! edits can be reconciled by index arithmetic. Escape pairs are
//! decoded `~1` → `/` before `~0` → `~` (the RFC order); encoding
//! re-escapes `~` before `/`. A segment counts as an array index only
//! in canonical decimal form (no leading zeros except `"0"`), which
//! keeps `reconstruct(parse(p))` the identity on valid paths.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PathError {
    #[error("path must not be empty")]
    Empty,
    #[error("path must start with '/': {0}")]
    MissingLeadingSlash(String),
    #[error("adjusting index {index} by {delta} in {path} yields a negative index")]
    NegativeIndex {
        path: String,
        index: usize,
        delta: i64,
    },
}

/// One step through a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Object(String),
    Array(usize),
}

/// A parsed path: the original string plus its decoded segments.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPath {
    pub raw: String,
    pub segments: Vec<PathSegment>,
}

/// Relationship between two paths, used for conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRelation {
    Same,
    /// The first path is an ancestor of the second.
    Parent,
    /// The first path is a descendant of the second.
    Child,
    Sibling,
    Unrelated,
}

pub fn parse(path: &str) -> Result<ParsedPath, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if !path.starts_with('/') {
        return Err(PathError::MissingLeadingSlash(path.to_owned()));
    }

    let segments = if path == "/" {
        Vec::new()
    } else {
        path[1..].split('/').map(parse_segment).collect()
    };

    Ok(ParsedPath {
        raw: path.to_owned(),
        segments,
    })
}

fn parse_segment(raw: &str) -> PathSegment {
    if is_canonical_index(raw)
        && let Ok(index) = raw.parse::<usize>()
    {
        return PathSegment::Array(index);
    }
    PathSegment::Object(decode_segment(raw))
}

fn is_canonical_index(raw: &str) -> bool {
    !raw.is_empty()
        && raw.bytes().all(|b| b.is_ascii_digit())
        && (raw.len() == 1 || !raw.starts_with('0'))
}

fn decode_segment(raw: &str) -> String {
    raw.replace("~1", "/").replace("~0", "~")
}

fn encode_segment(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Inverse of [`parse`]. An empty segment list reconstructs to `/`.
pub fn reconstruct(segments: &[PathSegment]) -> String {
    if segments.is_empty() {
        return "/".to_owned();
    }
    let mut path = String::new();
    for segment in segments {
        path.push('/');
        match segment {
            PathSegment::Object(key) => path.push_str(&encode_segment(key)),
            PathSegment::Array(index) => path.push_str(&index.to_string()),
        }
    }
    path
}

/// The right-most array index in the path, if any.
pub fn extract_last_array_index(path: &str) -> Result<Option<usize>, PathError> {
    let parsed = parse(path)?;
    Ok(parsed.segments.iter().rev().find_map(|segment| match segment {
        PathSegment::Array(index) => Some(*index),
        PathSegment::Object(_) => None,
    }))
}

/// Shift the right-most array segment equal to `target` by `delta`.
///
/// Paths without a matching segment are returned unchanged; a shift
/// below zero is an error.
pub fn adjust_array_index(path: &str, target: usize, delta: i64) -> Result<String, PathError> {
    let mut parsed = parse(path)?;
    let position = parsed
        .segments
        .iter()
        .rposition(|segment| *segment == PathSegment::Array(target));

    let Some(position) = position else {
        return Ok(path.to_owned());
    };

    let adjusted = target as i64 + delta;
    if adjusted < 0 {
        return Err(PathError::NegativeIndex {
            path: path.to_owned(),
            index: target,
            delta,
        });
    }
    parsed.segments[position] = PathSegment::Array(adjusted as usize);
    Ok(reconstruct(&parsed.segments))
}

/// The path with its final segment removed; `/` has no parent, and a
/// single-segment path's parent is `/`.
pub fn parent(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_owned()),
        Some(index) => Some(path[..index].to_owned()),
        None => None,
    }
}

/// Classify two paths. Two top-level paths share parent `/` and are
/// therefore siblings.
pub fn compare(a: &str, b: &str) -> PathRelation {
    if a == b {
        return PathRelation::Same;
    }
    if b.starts_with(a) && b[a.len()..].starts_with('/') {
        return PathRelation::Parent;
    }
    if a.starts_with(b) && a[b.len()..].starts_with('/') {
        return PathRelation::Child;
    }
    match (parent(a), parent(b)) {
        (Some(parent_a), Some(parent_b)) if parent_a == parent_b => PathRelation::Sibling,
        _ => PathRelation::Unrelated,
    }
}

/// Paths conflict when one contains, equals, or is contained by the other.
pub fn paths_conflict(a: &str, b: &str) -> bool {
    matches!(
        compare(a, b),
        PathRelation::Same | PathRelation::Parent | PathRelation::Child
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_is_rejected() {
        assert_eq!(parse(""), Err(PathError::Empty));
    }

    #[test]
    fn missing_leading_slash_is_rejected() {
        assert!(matches!(
            parse("items/2"),
            Err(PathError::MissingLeadingSlash(_))
        ));
    }

    #[test]
    fn root_parses_to_zero_segments() {
        let parsed = parse("/").unwrap();
        assert!(parsed.segments.is_empty());
        assert_eq!(parsed.raw, "/");
    }

    #[test]
    fn segments_classify_objects_and_arrays() {
        let parsed = parse("/items/2/name").unwrap();
        assert_eq!(
            parsed.segments,
            vec![
                PathSegment::Object("items".to_owned()),
                PathSegment::Array(2),
                PathSegment::Object("name".to_owned()),
            ]
        );
    }

    #[test]
    fn escapes_decode_in_rfc_order() {
        let parsed = parse("/a~1b/m~0n/~01").unwrap();
        assert_eq!(
            parsed.segments,
            vec![
                PathSegment::Object("a/b".to_owned()),
                PathSegment::Object("m~n".to_owned()),
                PathSegment::Object("~1".to_owned()),
            ]
        );
    }

    #[test]
    fn leading_zero_segment_is_an_object_key() {
        let parsed = parse("/items/01").unwrap();
        assert_eq!(parsed.segments[1], PathSegment::Object("01".to_owned()));
    }

    #[test]
    fn reconstruct_is_the_inverse_of_parse() {
        for path in [
            "/",
            "/title",
            "/items/2",
            "/items/2/name",
            "/a~1b/m~0n",
            "/~01",
            "/0",
            "/items/10/tags/0",
        ] {
            let parsed = parse(path).unwrap();
            assert_eq!(reconstruct(&parsed.segments), path, "round trip of {path}");
        }
    }

    #[test]
    fn last_array_index_walks_right_to_left() {
        assert_eq!(extract_last_array_index("/items/2").unwrap(), Some(2));
        assert_eq!(extract_last_array_index("/items/2/name").unwrap(), Some(2));
        assert_eq!(extract_last_array_index("/a/3/b/7/c").unwrap(), Some(7));
        assert_eq!(extract_last_array_index("/a/b").unwrap(), None);
    }

    #[test]
    fn adjust_shifts_the_rightmost_match() {
        assert_eq!(adjust_array_index("/items/2", 2, 1).unwrap(), "/items/3");
        assert_eq!(adjust_array_index("/2/x/2", 2, 1).unwrap(), "/2/x/3");
        assert_eq!(adjust_array_index("/items/2", 5, 1).unwrap(), "/items/2");
    }

    #[test]
    fn adjust_underflow_is_an_error() {
        assert!(matches!(
            adjust_array_index("/items/0", 0, -1),
            Err(PathError::NegativeIndex { .. })
        ));
    }

    #[test]
    fn adjust_round_trips_when_nonnegative() {
        let shifted = adjust_array_index("/items/4/name", 4, 3).unwrap();
        assert_eq!(shifted, "/items/7/name");
        assert_eq!(adjust_array_index(&shifted, 7, -3).unwrap(), "/items/4/name");
    }

    #[test]
    fn parent_walks_up_one_level() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a").as_deref(), Some("/"));
        assert_eq!(parent("/a/b").as_deref(), Some("/a"));
        assert_eq!(parent("/items/2/name").as_deref(), Some("/items/2"));
    }

    #[test]
    fn compare_follows_the_ordered_rules() {
        assert_eq!(compare("/a/b", "/a/b"), PathRelation::Same);
        assert_eq!(compare("/a", "/a/b"), PathRelation::Parent);
        assert_eq!(compare("/a/b", "/a"), PathRelation::Child);
        assert_eq!(compare("/a/b", "/a/c"), PathRelation::Sibling);
        assert_eq!(compare("/a", "/b"), PathRelation::Sibling);
        assert_eq!(compare("/a/b", "/c/d"), PathRelation::Unrelated);
    }

    #[test]
    fn prefix_without_separator_is_not_a_parent() {
        assert_eq!(compare("/ab", "/abc"), PathRelation::Sibling);
    }

    #[test]
    fn conflicts_cover_same_parent_child() {
        assert!(paths_conflict("/a/b", "/a/b"));
        assert!(paths_conflict("/a", "/a/b"));
        assert!(paths_conflict("/a/b", "/a"));
        assert!(!paths_conflict("/a/b", "/a/c"));
        assert!(!paths_conflict("/a/b", "/c"));
    }
}
