use nomadlet::state::{commit, temp_path, write_atomic, write_temp, NodeState, StateError};

#[tokio::test]
async fn test_identity_is_stable_across_starts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let (first, generated) = NodeState::load_or_generate(&path).await.unwrap();
    assert!(generated);
    let (second, generated) = NodeState::load_or_generate(&path).await.unwrap();
    assert!(!generated);

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_generated_identity_matches_what_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let (generated, _) = NodeState::load_or_generate(&path).await.unwrap();
    let loaded = NodeState::load(&path).await.unwrap();

    assert_eq!(generated, loaded);
    assert!(loaded.is_complete());
}

#[tokio::test]
async fn test_missing_file_loads_empty_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = NodeState::load(&dir.path().join("absent.json")).await.unwrap();

    assert_eq!(state, NodeState::default());
    assert!(!state.is_complete());
}

#[tokio::test]
async fn test_partial_identity_is_regenerated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, r#"{"node_id": "abc", "node_secret": ""}"#).unwrap();

    let (state, generated) = NodeState::load_or_generate(&path).await.unwrap();

    assert!(generated);
    assert_ne!(state.node_id, "abc");
    assert!(state.is_complete());
}

#[tokio::test]
async fn test_corrupt_state_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, "{not json").unwrap();

    let err = NodeState::load(&path).await.unwrap_err();
    assert!(matches!(err, StateError::Parse { .. }));
}

#[tokio::test]
async fn test_crash_before_rename_keeps_prior_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let old = NodeState::generate();
    old.store(&path).await.unwrap();

    // Stage a replacement but never commit it.
    let new = NodeState::generate();
    let staged = serde_json::to_vec(&new).unwrap();
    let tmp = write_temp(&path, &staged).await.unwrap();

    assert!(tmp.exists());
    assert_eq!(NodeState::load(&path).await.unwrap(), old);

    commit(&tmp, &path).await.unwrap();
    assert!(!tmp.exists());
    assert_eq!(NodeState::load(&path).await.unwrap(), new);
}

#[tokio::test]
async fn test_atomic_write_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    write_atomic(&path, b"first").await.unwrap();
    write_atomic(&path, b"second").await.unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"second");
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_failed_write_removes_temp_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let contents = b"never fits";

    // Every write to /dev/full fails with ENOSPC.
    let tmp = temp_path(&path, contents).unwrap();
    std::os::unix::fs::symlink("/dev/full", &tmp).unwrap();

    let err = write_temp(&path, contents).await.unwrap_err();

    assert!(matches!(err, StateError::Io { .. }));
    assert!(std::fs::symlink_metadata(&tmp).is_err());
    assert!(!path.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_state_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    NodeState::generate().store(&path).await.unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
