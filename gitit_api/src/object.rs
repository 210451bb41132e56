use std::fmt;

use serde::{Deserialize, Serialize};

/// Content hash identifying a blob, tree, or commit in an object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wrap a hash string produced by an object store.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form used in log output.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// The kind of object a tree entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit reference; inside a tree this is a submodule link.
    Commit,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        })
    }
}

/// One named entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Single path segment (no separators).
    pub name: String,
    /// Kind of the referenced object.
    pub kind: ObjectKind,
    /// Identifier of the referenced object.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ObjectKind, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            kind,
            id,
        }
    }
}

/// Identity recorded as the author of a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Author {
    /// Construct an author from a name and email.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Immutable commit metadata as read back from an object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    /// Identifier of the commit itself.
    pub id: ObjectId,
    /// Root tree of the snapshot.
    pub tree: ObjectId,
    /// Parent commits, first parent first.
    #[serde(default)]
    pub parents: Vec<ObjectId>,
    /// Full commit message.
    pub message: String,
    /// Commit author.
    pub author: Author,
    /// Unix timestamp (seconds) of authorship.
    pub timestamp: i64,
}

impl CommitInfo {
    /// First line of the commit message.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Working-tree state of a single path relative to HEAD and the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    /// Tracked and identical to HEAD.
    Unmodified,
    /// Tracked and changed in the index or working tree.
    Modified,
    /// Staged for addition but not yet committed.
    Added,
    /// Tracked but removed from the index or working tree.
    Deleted,
    /// Present on disk but never staged.
    Untracked,
    /// Excluded by ignore rules.
    Ignored,
    /// Neither tracked nor present on disk.
    Absent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_is_transparent() {
        let id = ObjectId::new("0123456789abcdef0123456789abcdef01234567");
        let json = serde_json::to_string(&id).expect("serialize id");
        assert_eq!(json, "\"0123456789abcdef0123456789abcdef01234567\"");
        assert_eq!(id.short(), "0123456");
    }

    #[test]
    fn short_id_tolerates_short_hashes() {
        assert_eq!(ObjectId::new("abc").short(), "abc");
    }

    #[test]
    fn tree_entry_kind_uses_snake_case() {
        let entry = TreeEntry::new("src", ObjectKind::Tree, ObjectId::new("ff"));
        let json = serde_json::to_string(&entry).expect("serialize entry");
        assert!(json.contains("\"kind\":\"tree\""));
    }

    #[test]
    fn commit_summary_is_first_line() {
        let commit = CommitInfo {
            id: ObjectId::new("aa"),
            tree: ObjectId::new("bb"),
            parents: vec![],
            message: "add footer\n\nlonger body".into(),
            author: Author::new("A", "a@x.com"),
            timestamp: 1_700_000_000,
        };
        assert_eq!(commit.summary(), "add footer");
    }

    #[test]
    fn commit_parents_default_to_empty() {
        let json = r#"{
            "id": "aa",
            "tree": "bb",
            "message": "initial",
            "author": { "name": "A", "email": "a@x.com" },
            "timestamp": 0
        }"#;
        let commit: CommitInfo = serde_json::from_str(json).expect("deserialize commit");
        assert!(commit.parents.is_empty());
    }
}
