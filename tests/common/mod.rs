//! Shared helpers for integration tests

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use git2::{Repository, Signature};
use tempfile::TempDir;

use nebenchat::session::{AttachmentJanitor, SessionStore, VectorStores};
use nebenchat::storage::{FileStorage, LocalStorage};
use nebenchat::StorageResult;

/// Vector store fake recording every create and release
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct RecordingVectorStores {
    created: Mutex<Vec<String>>,
    released: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingVectorStores {
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

impl VectorStores for RecordingVectorStores {
    fn create(&self, name: &str) -> StorageResult<String> {
        let mut created = self.created.lock().unwrap();
        created.push(name.to_string());
        Ok(format!("vs-{}", created.len()))
    }

    fn release(&self, id: &str) -> StorageResult<()> {
        self.released.lock().unwrap().push(id.to_string());
        Ok(())
    }
}

/// Session store over local storage rooted at `<tmp>/data`
///
/// Attachment directories are `<tmp>/uploads` and `<tmp>/generated_files`.
#[allow(dead_code)]
pub fn local_session_store(
    vector_stores: Arc<dyn VectorStores>,
) -> (SessionStore, Arc<dyn FileStorage>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let storage: Arc<dyn FileStorage> = Arc::new(LocalStorage::new(tmp.path().join("data")));
    let janitor = AttachmentJanitor::new(
        tmp.path().join("uploads"),
        tmp.path().join("generated_files"),
    );
    let store = SessionStore::new(storage.clone(), vector_stores).with_janitor(janitor);
    (store, storage, tmp)
}

/// Helper: create a temporary config file and return tempdir and path.
#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Bare repository with one commit on `main`; the path doubles as clone URL
#[allow(dead_code)]
pub fn seed_bare_remote() -> (TempDir, String) {
    let dir = TempDir::new().expect("failed to create tempdir");
    let bare = Repository::init_bare(dir.path()).expect("init bare");
    let signature = Signature::now("seed", "seed@example.com").unwrap();
    let blob = bare.blob(b"# chat history\n").unwrap();
    let mut builder = bare.treebuilder(None).unwrap();
    builder.insert("README.md", blob, 0o100644).unwrap();
    let tree = bare.find_tree(builder.write().unwrap()).unwrap();
    bare.commit(Some("refs/heads/main"), &signature, &signature, "seed", &tree, &[])
        .unwrap();
    bare.set_head("refs/heads/main").unwrap();
    let url = dir.path().to_str().unwrap().to_string();
    (dir, url)
}

/// File contents at the tip of `main` in a bare repository
#[allow(dead_code)]
pub fn remote_file(remote: &Path, path: &str) -> Option<String> {
    let repo = Repository::open_bare(remote).unwrap();
    let commit = repo
        .find_reference("refs/heads/main")
        .unwrap()
        .peel_to_commit()
        .unwrap();
    let entry = commit.tree().unwrap().get_path(Path::new(path)).ok()?;
    let blob = repo.find_blob(entry.id()).unwrap();
    Some(String::from_utf8(blob.content().to_vec()).unwrap())
}
