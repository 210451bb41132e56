//! Lazy depth-first walk over every blob reachable from a commit.
//!
//! The walk keeps an explicit stack of open directories instead of
//! recursing, so arbitrarily deep trees cost heap rather than call stack.
//! Each directory is read only when the walk reaches it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use gitit_api::{ObjectId, ObjectKind, TreeEntry};
use gitit_store::ObjectStore;

use crate::{Error, Result};

/// Shared flag that aborts walks (and the diffs built on them) in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Limits applied to a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Deepest directory nesting to follow; the root tree is depth 0.
    pub max_depth: Option<usize>,
    /// Checked before each directory is opened.
    pub cancel: Option<CancelToken>,
}

struct Frame {
    prefix: String,
    depth: usize,
    entries: std::vec::IntoIter<TreeEntry>,
}

/// Iterator over `(path, blob id)` pairs in depth-first pre-order.
///
/// Paths are slash-separated and relative to the repository root. Entries
/// named like the store's control directory are never descended into and
/// submodule links are skipped. The first error ends the walk.
pub struct TreeWalk<'s, S: ?Sized> {
    store: &'s S,
    commit: Option<ObjectId>,
    stack: Vec<Frame>,
    options: WalkOptions,
    finished: bool,
}

/// Start walking the tree of `commit`. Nothing is read until the first
/// call to `next`.
pub fn walk<'s, S>(store: &'s S, commit: &ObjectId, options: WalkOptions) -> TreeWalk<'s, S>
where
    S: ObjectStore + ?Sized,
{
    TreeWalk {
        store,
        commit: Some(commit.clone()),
        stack: Vec::new(),
        options,
        finished: false,
    }
}

impl<S: ObjectStore + ?Sized> TreeWalk<'_, S> {
    fn advance(&mut self) -> Result<Option<(String, ObjectId)>> {
        if let Some(commit) = self.commit.take() {
            let commit = self.store.read_commit(&commit)?;
            self.open(String::new(), 0, &commit.tree)?;
        }

        while let Some(frame) = self.stack.last_mut() {
            let Some(entry) = frame.entries.next() else {
                self.stack.pop();
                continue;
            };

            match entry.kind {
                ObjectKind::Blob => {
                    return Ok(Some((join(&frame.prefix, &entry.name), entry.id)));
                }
                ObjectKind::Tree if entry.name == self.store.control_dir() => {
                    tracing::trace!(prefix = %frame.prefix, "skipping control directory");
                }
                ObjectKind::Tree => {
                    let prefix = join(&frame.prefix, &entry.name);
                    let depth = frame.depth + 1;
                    self.open(prefix, depth, &entry.id)?;
                }
                ObjectKind::Commit => {
                    tracing::trace!(
                        path = %join(&frame.prefix, &entry.name),
                        "skipping submodule entry"
                    );
                }
            }
        }

        Ok(None)
    }

    fn open(&mut self, prefix: String, depth: usize, tree: &ObjectId) -> Result<()> {
        if self
            .options
            .cancel
            .as_ref()
            .is_some_and(CancelToken::is_cancelled)
        {
            return Err(Error::Cancelled);
        }
        if let Some(limit) = self.options.max_depth {
            if depth > limit {
                return Err(Error::TreeTooDeep {
                    path: prefix,
                    limit,
                });
            }
        }

        let entries = self.store.read_tree(tree)?;
        self.stack.push(Frame {
            prefix,
            depth,
            entries: entries.into_iter(),
        });
        Ok(())
    }
}

impl<S: ObjectStore + ?Sized> Iterator for TreeWalk<'_, S> {
    type Item = Result<(String, ObjectId)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                self.stack.clear();
                Some(Err(err))
            }
        }
    }
}

impl<S: ?Sized> std::iter::FusedIterator for TreeWalk<'_, S> where S: ObjectStore {}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use gitit_api::Author;
    use gitit_store::{MemoryStore, StoreError};

    use super::*;

    fn author() -> Author {
        Author::new("Test User", "test@example.com")
    }

    fn blob(store: &MemoryStore, name: &str, content: &str) -> TreeEntry {
        let id = store.write_blob(content).expect("write blob");
        TreeEntry::new(name, ObjectKind::Blob, id)
    }

    fn tree(store: &MemoryStore, name: &str, entries: Vec<TreeEntry>) -> TreeEntry {
        let id = store.write_tree(entries).expect("write tree");
        TreeEntry::new(name, ObjectKind::Tree, id)
    }

    fn commit(store: &MemoryStore, entries: Vec<TreeEntry>) -> ObjectId {
        let root = store.write_tree(entries).expect("write root");
        store
            .write_commit(root, vec![], "snapshot", &author())
            .expect("write commit")
    }

    fn paths(store: &MemoryStore, commit: &ObjectId, options: WalkOptions) -> Vec<String> {
        walk(store, commit, options)
            .map(|item| item.expect("walk item").0)
            .collect()
    }

    #[test]
    fn yields_blobs_in_pre_order() {
        let store = MemoryStore::new();
        let nested = tree(&store, "inner", vec![blob(&store, "deep.txt", "deep\n")]);
        let dir = tree(
            &store,
            "dir",
            vec![blob(&store, "x.txt", "x\n"), nested, blob(&store, "y.txt", "y\n")],
        );
        let id = commit(
            &store,
            vec![blob(&store, "a.txt", "a\n"), dir, blob(&store, "z.txt", "z\n")],
        );

        assert_eq!(
            paths(&store, &id, WalkOptions::default()),
            vec!["a.txt", "dir/x.txt", "dir/inner/deep.txt", "dir/y.txt", "z.txt"]
        );
    }

    #[test]
    fn never_enters_the_control_directory() {
        let store = MemoryStore::new();
        let control = tree(
            &store,
            ".git",
            vec![blob(&store, "HEAD", "ref: refs/heads/main\n")],
        );
        let nested_control = tree(&store, "vendor", vec![control.clone()]);
        let id = commit(
            &store,
            vec![control, nested_control, blob(&store, "index.html", "<p></p>\n")],
        );

        assert_eq!(paths(&store, &id, WalkOptions::default()), vec!["index.html"]);
    }

    #[test]
    fn empty_trees_yield_nothing() {
        let store = MemoryStore::new();
        let empty_dir = tree(&store, "empty", vec![]);
        let id = commit(&store, vec![empty_dir]);
        assert!(paths(&store, &id, WalkOptions::default()).is_empty());
    }

    #[test]
    fn submodule_links_are_skipped() {
        let store = MemoryStore::new();
        let link = TreeEntry::new(
            "lib",
            ObjectKind::Commit,
            ObjectId::new("0000000000000000000000000000000000000001"),
        );
        let id = commit(&store, vec![link, blob(&store, "main.py", "print()\n")]);
        assert_eq!(paths(&store, &id, WalkOptions::default()), vec!["main.py"]);
    }

    #[test]
    fn unknown_commit_is_an_error() {
        let store = MemoryStore::new();
        let mut items = walk(&store, &ObjectId::new("deadbeef"), WalkOptions::default());
        let err = items.next().expect("one item").expect_err("missing commit");
        assert!(matches!(
            err,
            Error::Store(StoreError::ObjectNotFound {
                kind: ObjectKind::Commit,
                ..
            })
        ));
        assert!(items.next().is_none());
    }

    #[test]
    fn missing_subtree_propagates_after_earlier_items() {
        let store = MemoryStore::new();
        let dir = tree(&store, "dir", vec![blob(&store, "x.txt", "x\n")]);
        let dir_id = dir.id.clone();
        let id = commit(&store, vec![blob(&store, "a.txt", "a\n"), dir]);
        store.remove_object(&dir_id).expect("remove tree");

        let items: Vec<_> = walk(&store, &id, WalkOptions::default()).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().expect("first item").0, "a.txt");
        assert!(matches!(
            items[1],
            Err(Error::Store(StoreError::ObjectNotFound {
                kind: ObjectKind::Tree,
                ..
            }))
        ));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let store = MemoryStore::new();
        let level2 = tree(&store, "b", vec![blob(&store, "leaf.txt", "leaf\n")]);
        let level1 = tree(&store, "a", vec![level2]);
        let id = commit(&store, vec![level1]);

        let options = WalkOptions {
            max_depth: Some(1),
            cancel: None,
        };
        let err = walk(&store, &id, options)
            .find_map(std::result::Result::err)
            .expect("depth error");
        assert!(matches!(err, Error::TreeTooDeep { ref path, limit: 1 } if path == "a/b"));

        let options = WalkOptions {
            max_depth: Some(2),
            cancel: None,
        };
        assert_eq!(paths(&store, &id, options), vec!["a/b/leaf.txt"]);
    }

    #[test]
    fn cancelled_token_stops_the_walk() {
        let store = MemoryStore::new();
        let id = commit(&store, vec![blob(&store, "a.txt", "a\n")]);
        let token = CancelToken::new();
        token.clone().cancel();

        let options = WalkOptions {
            max_depth: None,
            cancel: Some(token),
        };
        let result: Result<Vec<_>> = walk(&store, &id, options).collect();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn walks_are_repeatable() {
        let store = MemoryStore::new();
        store.stage("src/app.js", "run()\n").expect("stage");
        store.stage("index.html", "<html></html>\n").expect("stage");
        let id = store.create_commit("initial", &author()).expect("commit");

        let first = paths(&store, &id, WalkOptions::default());
        let second = paths(&store, &id, WalkOptions::default());
        assert_eq!(first, vec!["index.html", "src/app.js"]);
        assert_eq!(first, second);
    }
}
