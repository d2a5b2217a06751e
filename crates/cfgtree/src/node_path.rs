//! slash separated node addresses
//!
//! A [NodePath] is a plain string:
//! - `/` is the root
//! - `/a/b` is absolute, `a/b` is relative to some working node
//! - `..` steps up to the parent
//!
//! Names must match `^[a-zA-Z][a-zA-Z0-9_]*$`.
//!
//! Operations never fail loudly. An operation that cannot produce a sensible path returns an
//! empty (invalid) path instead and callers check [NodePath::is_valid].
use regex::Regex;
use std::sync::LazyLock;

pub const SEPARATOR: char = '/';
pub const PARENT: &str = "..";

static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").unwrap());

/// Checks a single member name (no separators, no `..`)
pub fn is_valid_name(name: &str) -> bool {
    NAME_REGEX.is_match(name)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(String);

impl NodePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    /// The empty path. Never valid.
    pub fn invalid() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1 && self.0.starts_with(SEPARATOR)
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with(SEPARATOR)
    }

    pub fn is_relative(&self) -> bool {
        !self.0.is_empty() && !self.is_absolute()
    }

    pub fn is_valid(&self) -> bool {
        if self.0.is_empty() {
            return false;
        }

        if self.is_root() {
            return true;
        }

        let absolute = self.is_absolute();
        let mut depth = 0usize;
        for segment in self.segments() {
            if segment == PARENT {
                if absolute {
                    let Some(parent_depth) = depth.checked_sub(1) else {
                        return false;
                    };
                    depth = parent_depth;
                }
            } else if is_valid_name(segment) {
                depth += 1;
            } else {
                return false;
            }
        }

        true
    }

    pub fn has_unresolved_references(&self) -> bool {
        self.segments().any(|segment| segment == PARENT)
    }

    /// Collapses `name/..` pairs in place
    ///
    /// Fails (and leaves the path untouched) when the path is invalid, when a `..` has nothing
    /// left to cancel or when a relative path would collapse to nothing.
    pub fn resolve_references(&mut self) -> bool {
        if !self.is_valid() {
            return false;
        }

        if !self.has_unresolved_references() {
            return true;
        }

        let absolute = self.is_absolute();
        let mut names: Vec<&str> = vec![];
        for segment in self.segments() {
            if segment == PARENT {
                if names.pop().is_none() {
                    return false;
                }
            } else {
                names.push(segment);
            }
        }

        let joined = names.join("/");
        if absolute {
            self.0 = format!("{SEPARATOR}{joined}");
        } else if joined.is_empty() {
            return false;
        } else {
            self.0 = joined;
        }

        true
    }

    /// Segments without separators. Empty for the root.
    pub fn node_names(&self) -> Vec<&str> {
        if self.0.is_empty() || self.is_root() {
            return vec![];
        }

        self.segments().collect()
    }

    /// Appends a relative path (or a single name)
    ///
    /// Returns an invalid path when either side is invalid, when `other` is absolute or when
    /// the result would step above the root.
    pub fn append(&self, other: impl AsRef<str>) -> NodePath {
        let other = NodePath::new(other.as_ref());
        if !self.is_valid() || !other.is_valid() || other.is_absolute() {
            return NodePath::invalid();
        }

        let combined = if self.is_root() {
            NodePath(format!("{SEPARATOR}{}", other.0))
        } else {
            NodePath(format!("{}{SEPARATOR}{}", self.0, other.0))
        };

        if combined.is_valid() {
            combined
        } else {
            NodePath::invalid()
        }
    }

    pub fn to_absolute(&self, working_path: &NodePath) -> NodePath {
        if self.is_absolute() {
            return self.clone();
        }

        if !working_path.is_valid() || !working_path.is_absolute() {
            return NodePath::invalid();
        }

        working_path.append(self)
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0
            .strip_prefix(SEPARATOR)
            .unwrap_or(&self.0)
            .split(SEPARATOR)
    }
}

impl AsRef<str> for NodePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodePath {
    fn from(value: &str) -> Self {
        NodePath::new(value)
    }
}

impl From<String> for NodePath {
    fn from(value: String) -> Self {
        NodePath(value)
    }
}

impl std::fmt::Display for NodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn validity() {
        let valid = [
            "/", "/a", "/a/b", "a", "a/b_2", "..", "../a", "a/../..", "/a/..", "/a/b/../c",
        ];
        for path in valid {
            assert!(NodePath::new(path).is_valid(), "{path} must be valid");
        }

        let invalid = [
            "", "//", "/a/", "a//b", "/..", "/a/../..", "1a", "_a", "a-b", "a/./b", "/a/b c",
        ];
        for path in invalid {
            assert!(!NodePath::new(path).is_valid(), "{path} must be invalid");
        }
    }

    #[test]
    fn kinds() {
        assert!(NodePath::root().is_root());
        assert!(NodePath::root().is_absolute());
        assert!(NodePath::new("a/b").is_relative());
        assert!(!NodePath::new("/a").is_relative());
        assert!(!NodePath::invalid().is_relative());
        assert!(!NodePath::invalid().is_absolute());
    }

    #[test]
    fn resolve_references() {
        let mut path = NodePath::new("/a/b/../c");
        assert!(path.resolve_references());
        assert_eq!(path.as_str(), "/a/c");

        let mut path = NodePath::new("/a/..");
        assert!(path.resolve_references());
        assert!(path.is_root());

        let mut path = NodePath::new("a/b/../../c");
        assert!(path.resolve_references());
        assert_eq!(path.as_str(), "c");

        let mut path = NodePath::new("../a");
        assert!(!path.resolve_references());
        assert_eq!(path.as_str(), "../a");

        let mut path = NodePath::new("a/..");
        assert!(!path.resolve_references());

        let mut path = NodePath::new("/a/../..");
        assert!(!path.resolve_references());
    }

    #[test]
    fn resolve_references_is_idempotent() {
        for raw in ["/a/b/../c", "a/b/../c/d/..", "/x", "/"] {
            let mut once = NodePath::new(raw);
            assert!(once.resolve_references());
            let mut twice = once.clone();
            assert!(twice.resolve_references());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn node_names() {
        assert_eq!(NodePath::new("/a/b/..").node_names(), vec!["a", "b", ".."]);
        assert_eq!(NodePath::new("a").node_names(), vec!["a"]);
        assert!(NodePath::root().node_names().is_empty());
    }

    #[test]
    fn append() {
        assert_eq!(NodePath::root().append("a").as_str(), "/a");
        assert_eq!(NodePath::new("/a").append("b/c").as_str(), "/a/b/c");
        assert_eq!(NodePath::new("a").append(NodePath::new("..")).as_str(), "a/..");
        assert!(!NodePath::new("/a").append("/b").is_valid());
        assert!(!NodePath::new("/a").append("b-c").is_valid());
        assert!(!NodePath::new("a//").append("b").is_valid());
        assert!(!NodePath::new("/a").append("../..").is_valid());
    }

    #[test]
    fn to_absolute() {
        let working = NodePath::new("/a/b");
        assert_eq!(NodePath::new("/x").to_absolute(&working).as_str(), "/x");
        assert_eq!(NodePath::new("../c").to_absolute(&working).as_str(), "/a/b/../c");
        assert_eq!(NodePath::new("c").to_absolute(&NodePath::root()).as_str(), "/c");
        assert!(!NodePath::new("c").to_absolute(&NodePath::new("a")).is_valid());
    }
}
