//! In-memory content-addressed store with a flat staging area.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Mutex;

use git2::{ObjectType, Oid};
use gitit_api::{Author, CommitInfo, ObjectId, ObjectKind, TreeEntry};

use crate::{ObjectStore, StoreError, StoreResult, HEAD};

#[derive(Debug, Clone)]
enum Object {
    Blob(Vec<u8>),
    Tree(Vec<TreeEntry>),
    Commit(CommitInfo),
}

enum Node<'a> {
    File(&'a [u8]),
    Dir(BTreeMap<&'a str, Node<'a>>),
}

#[derive(Debug)]
struct State {
    objects: HashMap<ObjectId, Object>,
    refs: HashMap<String, ObjectId>,
    head: String,
    staged: BTreeMap<String, Vec<u8>>,
    clock: i64,
}

/// Object store kept entirely in memory.
///
/// Ids are git object hashes of the stored payloads, so identical content
/// always lands under the same id. The staging area mirrors a git index:
/// every staged path is part of the next commit until it is unstaged.
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_branch("main")
    }
}

impl MemoryStore {
    /// Create an empty store whose `HEAD` points at an unborn `main`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store whose `HEAD` points at an unborn `branch`.
    #[must_use]
    pub fn with_branch(branch: &str) -> Self {
        Self {
            state: Mutex::new(State {
                objects: HashMap::new(),
                refs: HashMap::new(),
                head: format!("refs/heads/{branch}"),
                staged: BTreeMap::new(),
                clock: 0,
            }),
        }
    }

    /// Stage `content` at a slash-separated `path` for the next commit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StageConflict`] if `path` is staged as a file
    /// under an already-staged file, or as a file over already-staged
    /// children. Returns [`StoreError::Poisoned`] if the store lock was
    /// poisoned.
    pub fn stage(&self, path: &str, content: impl AsRef<[u8]>) -> StoreResult<()> {
        let path = normalize(path);
        let mut state = self.state.lock()?;
        if let Some(existing) = conflicting_path(&state.staged, &path) {
            return Err(StoreError::StageConflict { path, existing });
        }
        state.staged.insert(path, content.as_ref().to_vec());
        Ok(())
    }

    /// Drop `path` from the staging area so the next commit deletes it.
    ///
    /// Returns whether the path was staged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the store lock was poisoned.
    pub fn unstage(&self, path: &str) -> StoreResult<bool> {
        let mut state = self.state.lock()?;
        Ok(state.staged.remove(&normalize(path)).is_some())
    }

    /// Store a blob directly, bypassing the staging area.
    ///
    /// # Errors
    ///
    /// Fails if hashing fails or the store lock was poisoned.
    pub fn write_blob(&self, content: impl AsRef<[u8]>) -> StoreResult<ObjectId> {
        self.state.lock()?.insert_blob(content.as_ref())
    }

    /// Store a tree built from explicit entries.
    ///
    /// Entries are kept in the given order and are not validated, which lets
    /// callers build trees a real index would refuse (for example one with a
    /// `.git` entry).
    ///
    /// # Errors
    ///
    /// Fails if hashing fails or the store lock was poisoned.
    pub fn write_tree(&self, entries: Vec<TreeEntry>) -> StoreResult<ObjectId> {
        self.state.lock()?.insert_tree(entries)
    }

    /// Store a commit object without moving any reference.
    ///
    /// # Errors
    ///
    /// Fails if hashing fails or the store lock was poisoned.
    pub fn write_commit(
        &self,
        tree: ObjectId,
        parents: Vec<ObjectId>,
        message: &str,
        author: &Author,
    ) -> StoreResult<ObjectId> {
        let mut state = self.state.lock()?;
        state.clock += 1;
        state.insert_commit(tree, parents, message, author)
    }

    /// Point a fully-qualified reference (e.g. `refs/heads/main`) at `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the store lock was poisoned.
    pub fn set_ref(&self, name: &str, id: ObjectId) -> StoreResult<()> {
        self.state.lock()?.refs.insert(name.to_owned(), id);
        Ok(())
    }

    /// Forget an object, simulating a missing or corrupted entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the store lock was poisoned.
    pub fn remove_object(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.state.lock()?.objects.remove(id).is_some())
    }

    /// Number of objects currently stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the store lock was poisoned.
    pub fn object_count(&self) -> StoreResult<usize> {
        Ok(self.state.lock()?.objects.len())
    }
}

impl ObjectStore for MemoryStore {
    fn resolve_ref(&self, name: &str) -> StoreResult<ObjectId> {
        let state = self.state.lock()?;
        let target = if name == HEAD { state.head.as_str() } else { name };
        state
            .refs
            .get(target)
            .or_else(|| state.refs.get(&format!("refs/heads/{target}")))
            .cloned()
            .ok_or_else(|| StoreError::RefNotFound {
                name: name.to_owned(),
            })
    }

    fn read_commit(&self, id: &ObjectId) -> StoreResult<CommitInfo> {
        match self.state.lock()?.objects.get(id) {
            Some(Object::Commit(commit)) => Ok(commit.clone()),
            _ => Err(StoreError::not_found(id, ObjectKind::Commit)),
        }
    }

    fn read_tree(&self, id: &ObjectId) -> StoreResult<Vec<TreeEntry>> {
        match self.state.lock()?.objects.get(id) {
            Some(Object::Tree(entries)) => Ok(entries.clone()),
            _ => Err(StoreError::not_found(id, ObjectKind::Tree)),
        }
    }

    fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        match self.state.lock()?.objects.get(id) {
            Some(Object::Blob(content)) => Ok(content.clone()),
            _ => Err(StoreError::not_found(id, ObjectKind::Blob)),
        }
    }

    fn create_commit(&self, message: &str, author: &Author) -> StoreResult<ObjectId> {
        let mut state = self.state.lock()?;
        let staged = std::mem::take(&mut state.staged);
        let tree = state.write_staged(&staged);
        state.staged = staged;
        let tree = tree?;

        let parents = state.refs.get(&state.head).cloned().into_iter().collect();
        state.clock += 1;
        let id = state.insert_commit(tree, parents, message, author)?;
        let branch = state.head.clone();
        state.refs.insert(branch, id.clone());

        tracing::debug!(commit = %id.short(), "memory store sealed staged tree");
        Ok(id)
    }
}

impl State {
    fn insert(&mut self, kind: ObjectType, payload: &[u8], object: Object) -> StoreResult<ObjectId> {
        let oid = Oid::hash_object(kind, payload).map_err(StoreError::backend)?;
        let id = ObjectId::new(oid.to_string());
        self.objects.entry(id.clone()).or_insert(object);
        Ok(id)
    }

    fn insert_blob(&mut self, content: &[u8]) -> StoreResult<ObjectId> {
        self.insert(ObjectType::Blob, content, Object::Blob(content.to_vec()))
    }

    fn insert_tree(&mut self, entries: Vec<TreeEntry>) -> StoreResult<ObjectId> {
        let mut payload = String::new();
        for entry in &entries {
            let _ = writeln!(payload, "{} {}\t{}", entry.kind, entry.id, entry.name);
        }
        self.insert(ObjectType::Tree, payload.as_bytes(), Object::Tree(entries))
    }

    fn insert_commit(
        &mut self,
        tree: ObjectId,
        parents: Vec<ObjectId>,
        message: &str,
        author: &Author,
    ) -> StoreResult<ObjectId> {
        let mut payload = format!("tree {tree}\n");
        for parent in &parents {
            let _ = writeln!(payload, "parent {parent}");
        }
        let _ = write!(
            payload,
            "author {} <{}> {}\n\n{message}",
            author.name, author.email, self.clock
        );

        let oid = Oid::hash_object(ObjectType::Commit, payload.as_bytes())
            .map_err(StoreError::backend)?;
        let id = ObjectId::new(oid.to_string());
        let commit = CommitInfo {
            id: id.clone(),
            tree,
            parents,
            message: message.to_owned(),
            author: author.clone(),
            timestamp: self.clock,
        };
        self.objects.entry(id.clone()).or_insert(Object::Commit(commit));
        Ok(id)
    }

    fn write_staged(&mut self, staged: &BTreeMap<String, Vec<u8>>) -> StoreResult<ObjectId> {
        let mut root = BTreeMap::new();
        for (path, content) in staged {
            let segments: Vec<&str> = path.split('/').collect();
            insert_node(&mut root, &segments, content);
        }
        self.write_dir(&root)
    }

    fn write_dir(&mut self, dir: &BTreeMap<&str, Node<'_>>) -> StoreResult<ObjectId> {
        let mut entries = Vec::with_capacity(dir.len());
        for (name, node) in dir {
            let entry = match node {
                Node::File(content) => {
                    TreeEntry::new(*name, ObjectKind::Blob, self.insert_blob(content)?)
                }
                Node::Dir(children) => {
                    TreeEntry::new(*name, ObjectKind::Tree, self.write_dir(children)?)
                }
            };
            entries.push(entry);
        }
        self.insert_tree(entries)
    }
}

fn insert_node<'a>(dir: &mut BTreeMap<&'a str, Node<'a>>, segments: &[&'a str], content: &'a [u8]) {
    match segments {
        [] => {}
        [name] => {
            dir.insert(*name, Node::File(content));
        }
        [name, rest @ ..] => {
            let node = dir
                .entry(*name)
                .or_insert_with(|| Node::Dir(BTreeMap::new()));
            if let Node::Dir(children) = node {
                insert_node(children, rest, content);
            }
        }
    }
}

/// First staged path that would need `path` (or one of its parents) to be
/// both a blob and a tree.
fn conflicting_path(staged: &BTreeMap<String, Vec<u8>>, path: &str) -> Option<String> {
    let ancestor = path
        .match_indices('/')
        .map(|(end, _)| &path[..end])
        .find(|parent| staged.contains_key(*parent));
    if let Some(parent) = ancestor {
        return Some(parent.to_owned());
    }

    let prefix = format!("{path}/");
    staged
        .range(prefix.clone()..)
        .next()
        .map(|(existing, _)| existing)
        .filter(|existing| existing.starts_with(&prefix))
        .cloned()
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author() -> Author {
        Author::new("Test User", "test@example.com")
    }

    #[test]
    fn head_is_unborn_until_first_commit() {
        let store = MemoryStore::new();
        let err = store.resolve_ref(HEAD).expect_err("unborn head");
        assert!(matches!(err, StoreError::RefNotFound { ref name } if name == "HEAD"));

        store.stage("README.md", "hello\n").expect("stage");
        let id = store.create_commit("Initial commit", &author()).expect("commit");
        assert_eq!(store.resolve_ref(HEAD).expect("head"), id);
        assert_eq!(store.resolve_ref("main").expect("branch"), id);
    }

    #[test]
    fn identical_content_shares_an_id() {
        let store = MemoryStore::new();
        let first = store.write_blob("same\n").expect("blob");
        let second = store.write_blob("same\n").expect("blob");
        assert_eq!(first, second);
        // Matches `git hash-object` for the same payload.
        assert_eq!(first.as_str(), "1275430f1765c63e539cb0452565563bd6aef6a6");
    }

    #[test]
    fn staged_paths_become_nested_trees() {
        let store = MemoryStore::new();
        store.stage("src/lib.rs", "pub fn a() {}\n").expect("stage");
        store.stage("src/bin/main.rs", "fn main() {}\n").expect("stage");
        store.stage("/README.md", "docs\n").expect("stage");
        let id = store.create_commit("layout", &author()).expect("commit");

        let commit = store.read_commit(&id).expect("commit");
        assert!(commit.parents.is_empty());
        let root = store.read_tree(&commit.tree).expect("root tree");
        let names: Vec<_> = root.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["README.md", "src"]);

        let src = store.read_tree(&root[1].id).expect("src tree");
        assert_eq!(src[0].name, "bin");
        assert_eq!(src[0].kind, ObjectKind::Tree);
        assert_eq!(src[1].name, "lib.rs");
        assert_eq!(
            store.read_blob(&src[1].id).expect("blob"),
            b"pub fn a() {}\n".to_vec()
        );
    }

    #[test]
    fn commits_chain_through_head() {
        let store = MemoryStore::new();
        store.stage("a.txt", "1\n").expect("stage");
        let first = store.create_commit("one", &author()).expect("commit");
        assert!(store.unstage("a.txt").expect("unstage"));
        let second = store.create_commit("two", &author()).expect("commit");

        let commit = store.read_commit(&second).expect("commit");
        assert_eq!(commit.parents, vec![first]);
        assert!(store.read_tree(&commit.tree).expect("tree").is_empty());
    }

    #[test]
    fn file_and_directory_at_one_path_conflict() {
        let store = MemoryStore::new();
        store.stage("docs", "file\n").expect("stage");
        let err = store
            .stage("docs/intro.md", "hi\n")
            .expect_err("docs is a file");
        assert!(matches!(
            err,
            StoreError::StageConflict { ref path, ref existing }
                if path == "docs/intro.md" && existing == "docs"
        ));

        let other = MemoryStore::new();
        other.stage("docs/guide/intro.md", "hi\n").expect("stage");
        let err = other.stage("docs", "file\n").expect_err("docs is a dir");
        assert!(matches!(
            err,
            StoreError::StageConflict { ref existing, .. } if existing == "docs/guide/intro.md"
        ));

        // Siblings sharing a name prefix are fine, and the failed stage left
        // the earlier content in place.
        store.stage("docs.md", "readme\n").expect("stage sibling");
        store.stage("docs", "file v2\n").expect("restage file");
        let id = store.create_commit("docs", &author()).expect("commit");
        let tree = store
            .read_tree(&store.read_commit(&id).expect("commit").tree)
            .expect("tree");
        let names: Vec<_> = tree.iter().map(|entry| entry.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "docs.md"]);
        assert_eq!(tree[0].kind, ObjectKind::Blob);
    }

    #[test]
    fn unstaging_a_file_frees_its_path_for_a_directory() {
        let store = MemoryStore::new();
        store.stage("docs", "file\n").expect("stage");
        assert!(store.unstage("docs").expect("unstage"));
        store.stage("docs/intro.md", "hi\n").expect("stage under former file");
    }

    #[test]
    fn reading_with_the_wrong_kind_is_not_found() {
        let store = MemoryStore::new();
        let blob = store.write_blob("text").expect("blob");
        let err = store.read_tree(&blob).expect_err("blob is not a tree");
        assert!(err.is_not_found());

        assert!(store.remove_object(&blob).expect("remove"));
        assert!(store.read_blob(&blob).expect_err("removed").is_not_found());
    }
}
