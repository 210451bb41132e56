use std::fs;
use std::path::Path;

use git2::{build::CheckoutBuilder, IndexAddOption, Repository};
use gitit_core::{
    Author, Error, FileState, GitRepository, ObjectKind, ObjectStore, Result, StoreError, HEAD,
};
use tempfile::TempDir;

#[test]
fn open_discovers_from_nested_path() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    Repository::init(temp.path())?;
    let nested = temp.path().join("nested/deeper");
    fs::create_dir_all(&nested).expect("nested dirs");

    let repo = GitRepository::open(&nested)?;
    let repo_root = repo.root().canonicalize().expect("canonical root");
    let expected_root = temp.path().canonicalize().expect("canonical temp path");
    assert_eq!(repo_root, expected_root);

    Ok(())
}

#[test]
fn open_rejects_bare_repository() {
    let temp = TempDir::new().expect("tempdir");
    let bare_path = temp.path().join("bare.git");
    Repository::init_bare(&bare_path).expect("bare repo");

    let err = GitRepository::open(&bare_path);
    assert!(matches!(err, Err(Error::BareRepository { .. })));
}

#[test]
fn open_missing_directory_is_io_error() {
    let temp = TempDir::new().expect("tempdir");
    let err = GitRepository::open(temp.path().join("absent"));
    assert!(matches!(err, Err(Error::Io { .. })));
}

#[test]
fn reads_commits_written_by_plain_git() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let git_repo = Repository::init(temp.path())?;

    write_file(temp.path().join("README.md"), "hello\n");
    write_file(temp.path().join("docs/guide.md"), "# Guide\n");
    let first = commit_all(&git_repo, "initial")?;
    write_file(temp.path().join("README.md"), "hello world\n");
    let second = commit_all(&git_repo, "second")?;

    let repo = GitRepository::open(temp.path())?;
    let head = repo.resolve_ref(HEAD)?;
    assert_eq!(head.as_str(), second.to_string());

    let info = repo.read_commit(&head)?;
    assert_eq!(info.summary(), "second");
    assert_eq!(info.parents.len(), 1);
    assert_eq!(info.parents[0].as_str(), first.to_string());

    let root = repo.read_tree(&info.tree)?;
    let docs = root
        .iter()
        .find(|entry| entry.name == "docs")
        .expect("docs entry");
    assert_eq!(docs.kind, ObjectKind::Tree);
    let guide = &repo.read_tree(&docs.id)?[0];
    assert_eq!(repo.read_blob(&guide.id)?, b"# Guide\n".to_vec());

    Ok(())
}

#[test]
fn reading_a_blob_as_a_tree_is_not_found() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let repo = GitRepository::init(temp.path(), "main")?;
    repo.write_file("a.txt", "a\n")?;
    repo.stage_all()?;
    let id = repo.create_commit("initial", &author())?;

    let tree = repo.read_commit(&id)?.tree;
    let blob = repo.read_tree(&tree)?.remove(0).id;
    assert!(matches!(
        repo.read_tree(&blob),
        Err(StoreError::ObjectNotFound {
            kind: ObjectKind::Tree,
            ..
        })
    ));
    Ok(())
}

#[test]
fn merge_commits_follow_every_parent_in_the_log() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let git_repo = Repository::init(temp.path())?;

    write_file(temp.path().join("file.txt"), "base\n");
    commit_all(&git_repo, "base")?;
    let main_branch = git_repo
        .head()?
        .shorthand()
        .unwrap_or("main")
        .to_string();
    let base_commit = git_repo.head()?.peel_to_commit()?;

    write_file(temp.path().join("file.txt"), "feature\n");
    commit_all(&git_repo, "feature commit")?;
    let feature_commit = git_repo.head()?.peel_to_commit()?;

    git_repo.branch("side", &base_commit, false)?;
    git_repo.set_head("refs/heads/side")?;
    checkout_head_force(&git_repo)?;
    write_file(temp.path().join("side.txt"), "side\n");
    commit_all(&git_repo, "side commit")?;
    let side_commit = git_repo.head()?.peel_to_commit()?;

    git_repo.set_head(&format!("refs/heads/{main_branch}"))?;
    checkout_head_force(&git_repo)?;
    write_file(temp.path().join("file.txt"), "merged\n");
    commit_with_parents(&git_repo, "merge commit", &[&feature_commit, &side_commit])?;

    let repo = GitRepository::open(temp.path())?;
    let log = repo.log(None)?;
    assert_eq!(log.len(), 4);
    assert_eq!(log[0].summary(), "merge commit");
    assert_eq!(log[0].parents.len(), 2);
    assert_eq!(log.last().map(|commit| commit.summary()), Some("base"));
    assert_eq!(repo.head_branch()?.as_deref(), Some(main_branch.as_str()));

    Ok(())
}

#[test]
fn stage_all_picks_up_deletions_and_new_files() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let repo = GitRepository::init(temp.path(), "main")?;
    repo.write_file("old.txt", "old\n")?;
    repo.write_file("kept.txt", "kept\n")?;
    repo.stage_all()?;
    repo.create_commit("initial", &author())?;

    fs::remove_file(repo.root().join("old.txt")).expect("remove");
    repo.write_file("css/site.css", "body {}\n")?;
    repo.stage_all()?;
    assert_eq!(repo.file_status("old.txt")?, FileState::Deleted);
    assert_eq!(repo.file_status("css/site.css")?, FileState::Added);

    let id = repo.create_commit("second", &author())?;
    let tree = repo.read_commit(&id)?.tree;
    let names: Vec<_> = repo
        .read_tree(&tree)?
        .into_iter()
        .map(|entry| entry.name)
        .collect();
    assert_eq!(names, vec!["css", "kept.txt"]);

    Ok(())
}

#[test]
fn ignored_files_are_reported() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let repo = GitRepository::init(temp.path(), "main")?;
    repo.write_file(".gitignore", "*.log\n")?;
    repo.write_file("debug.log", "noise\n")?;

    assert_eq!(repo.file_status("debug.log")?, FileState::Ignored);
    assert_eq!(repo.file_status(".gitignore")?, FileState::Untracked);
    Ok(())
}

fn author() -> Author {
    Author::new("Test User", "test@example.com")
}

fn commit_all(repo: &Repository, message: &str) -> Result<git2::Oid> {
    let parents = match repo.head() {
        Ok(reference) => vec![reference.peel_to_commit()?],
        Err(err) if err.code() == git2::ErrorCode::UnbornBranch => Vec::new(),
        Err(err) => return Err(Error::from(err)),
    };

    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    commit_with_parents(repo, message, parent_refs.as_slice())
}

fn commit_with_parents(
    repo: &Repository,
    message: &str,
    parents: &[&git2::Commit],
) -> Result<git2::Oid> {
    let mut index = repo.index()?;
    index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let signature = git2::Signature::now("Test User", "test@example.com")?;

    Ok(repo.commit(
        Some("HEAD"),
        &signature,
        &signature,
        message,
        &tree,
        parents,
    )?)
}

fn checkout_head_force(repo: &Repository) -> Result<()> {
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))?;
    Ok(())
}

fn write_file(path: impl AsRef<Path>, contents: &str) {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}
