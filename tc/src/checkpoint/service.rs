//! CheckpointService - snapshot and restore through a hidden git repository

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{OwnedRwLockReadGuard, RwLock};
use tracing::{debug, info, warn};

use super::{CheckpointError, CheckpointRecord};
use crate::tools::ToolCall;

const GIT_NAME: &str = "toolcore";
const GIT_EMAIL: &str = "toolcore@localhost";

/// Check a tag is usable as a file name and ref component
pub fn validate_tag(tag: &str) -> Result<(), CheckpointError> {
    let valid = !tag.is_empty()
        && !tag.starts_with('.')
        && !tag.contains("..")
        && !tag.ends_with(".lock")
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(CheckpointError::InvalidTag(tag.to_string()))
    }
}

/// Build a tag of the form `<UTC timestamp>-<file basename>-<tool>`
pub fn checkpoint_tag(tool_name: &str, file: Option<&Path>) -> String {
    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
    let base = file
        .and_then(|f| f.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());

    format!("{}-{}-{}", timestamp, base, tool_name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Snapshots a project into a private repository under the data directory
///
/// Layout: `<data-dir>/history/<sha256(project root)>/repo.git` for the
/// repository and `.../checkpoints/<tag>.json` for the records.
#[derive(Debug, Clone)]
pub struct CheckpointService {
    project_root: PathBuf,
    git_dir: PathBuf,
    records_dir: PathBuf,
    workspace: Arc<RwLock<()>>,
}

impl CheckpointService {
    pub fn new(data_dir: &Path, project_root: &Path) -> Self {
        let project_root = project_root
            .canonicalize()
            .unwrap_or_else(|_| project_root.to_path_buf());
        let digest = hex::encode(Sha256::digest(project_root.to_string_lossy().as_bytes()));
        let history_dir = data_dir.join("history").join(digest);
        debug!(?project_root, ?history_dir, "CheckpointService::new: called");

        Self {
            git_dir: history_dir.join("repo.git"),
            records_dir: history_dir.join("checkpoints"),
            project_root,
            workspace: Arc::new(RwLock::new(())),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Ensure the hidden repository exists and has a first commit
    pub async fn initialize(&self) -> Result<(), CheckpointError> {
        debug!("CheckpointService::initialize: called");
        self.check_git().await?;
        tokio::fs::create_dir_all(&self.records_dir).await?;

        if !self.git_dir.join("HEAD").exists() {
            debug!("CheckpointService::initialize: creating hidden repository");
            tokio::fs::create_dir_all(&self.git_dir).await?;
            self.git(&["init", "--quiet"]).await?;
        }
        self.sync_excludes().await?;

        if self.git(&["rev-parse", "--verify", "--quiet", "HEAD"]).await.is_err() {
            debug!("CheckpointService::initialize: creating initial commit");
            self.git(&["commit", "--quiet", "--allow-empty", "-m", "initial"]).await?;
        }

        info!(git_dir = ?self.git_dir, "Checkpoint repository ready");
        Ok(())
    }

    /// Hold this while a mutating tool runs; snapshot and restore wait for it
    pub async fn guard_mutation(&self) -> OwnedRwLockReadGuard<()> {
        self.workspace.clone().read_owned().await
    }

    /// Commit the whole working tree and record it under `tag`
    ///
    /// A clean tree still produces an (empty) commit so the tag resolves.
    pub async fn snapshot(
        &self,
        tag: &str,
        tool_call: &ToolCall,
        conversation: &Value,
    ) -> Result<CheckpointRecord, CheckpointError> {
        debug!(%tag, tool = %tool_call.name, "CheckpointService::snapshot: called");
        validate_tag(tag)?;
        let record_path = self.record_path(tag);

        let _workspace = self.workspace.write().await;
        if tokio::fs::try_exists(&record_path).await? {
            return Err(CheckpointError::AlreadyExists(tag.to_string()));
        }

        self.sync_excludes().await?;
        self.git(&["add", "--all"]).await?;
        let message = format!("checkpoint {} ({})", tag, tool_call.name);
        self.git(&["commit", "--quiet", "--allow-empty", "--no-verify", "-m", &message])
            .await?;
        let commit_hash = self.git(&["rev-parse", "HEAD"]).await?;
        self.git(&["update-ref", &format!("refs/checkpoints/{}", tag), &commit_hash])
            .await?;

        let record = CheckpointRecord {
            tag: tag.to_string(),
            commit_hash,
            tool_call: tool_call.clone(),
            conversation: conversation.clone(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&record_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(CheckpointError::AlreadyExists(tag.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;

        info!(%tag, commit = %record.commit_hash, "Checkpoint created");
        Ok(record)
    }

    /// Reset the working tree to the checkpoint and return its record
    ///
    /// Tracked files are reset and untracked files removed; ignored files
    /// are left alone.
    pub async fn restore(&self, tag: &str) -> Result<CheckpointRecord, CheckpointError> {
        debug!(%tag, "CheckpointService::restore: called");
        let record = self.get(tag).await?;

        let _workspace = self.workspace.write().await;

        self.sync_excludes().await?;
        self.git(&["reset", "--hard", "--quiet", &record.commit_hash]).await?;
        self.git(&["clean", "-fd", "--quiet"]).await?;

        info!(%tag, commit = %record.commit_hash, "Checkpoint restored");
        Ok(record)
    }

    /// Load a record without touching the working tree
    pub async fn get(&self, tag: &str) -> Result<CheckpointRecord, CheckpointError> {
        debug!(%tag, "CheckpointService::get: called");
        validate_tag(tag)?;
        let path = self.record_path(tag);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CheckpointError::NotFound(tag.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Available tags, oldest first
    pub async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        debug!("CheckpointService::list: called");
        let mut records = self.records().await?;
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.tag.cmp(&b.tag)));
        Ok(records.into_iter().map(|r| r.tag).collect())
    }

    /// Every readable record; unreadable ones are logged and skipped
    pub async fn records(&self) -> Result<Vec<CheckpointRecord>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.records_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = tokio::fs::read_to_string(&path)
                .await
                .map_err(CheckpointError::from)
                .and_then(|content| Ok(serde_json::from_str::<CheckpointRecord>(&content)?));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!(?path, error = %e, "Skipping unreadable checkpoint record"),
            }
        }
        Ok(records)
    }

    fn record_path(&self, tag: &str) -> PathBuf {
        self.records_dir.join(format!("{}.json", tag))
    }

    async fn check_git(&self) -> Result<(), CheckpointError> {
        match Command::new("git").arg("--version").output().await {
            Ok(output) if output.status.success() => Ok(()),
            Ok(output) => Err(CheckpointError::GitUnavailable(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
            Err(e) => Err(CheckpointError::GitUnavailable(e.to_string())),
        }
    }

    /// Mirror the project's `.gitignore` into the hidden repository
    async fn sync_excludes(&self) -> Result<(), CheckpointError> {
        let mut exclude = String::from("# managed by toolcore\n.git\n");
        match tokio::fs::read_to_string(self.project_root.join(".gitignore")).await {
            Ok(ignore) => exclude.push_str(&ignore),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let info_dir = self.git_dir.join("info");
        tokio::fs::create_dir_all(&info_dir).await?;
        tokio::fs::write(info_dir.join("exclude"), exclude).await?;
        Ok(())
    }

    /// Run git against the hidden repository with a fixed identity
    async fn git(&self, args: &[&str]) -> Result<String, CheckpointError> {
        debug!(?args, "CheckpointService::git: called");
        let output = Command::new("git")
            .args(["-c", "commit.gpgsign=false", "-c", "core.autocrlf=false"])
            .args(["-c", &format!("user.name={}", GIT_NAME)])
            .args(["-c", &format!("user.email={}", GIT_EMAIL)])
            .args(args)
            .env("GIT_DIR", &self.git_dir)
            .env("GIT_WORK_TREE", &self.project_root)
            .env("GIT_CONFIG_GLOBAL", "/dev/null")
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .env("GIT_AUTHOR_NAME", GIT_NAME)
            .env("GIT_AUTHOR_EMAIL", GIT_EMAIL)
            .env("GIT_COMMITTER_NAME", GIT_NAME)
            .env("GIT_COMMITTER_EMAIL", GIT_EMAIL)
            .env_remove("GIT_INDEX_FILE")
            .current_dir(&self.project_root)
            .output()
            .await
            .map_err(|e| CheckpointError::GitUnavailable(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(?args, %stderr, "CheckpointService::git: failed");
            Err(CheckpointError::GitError(format!(
                "git {}: {}",
                args.join(" "),
                stderr.trim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        project: TempDir,
        _data: TempDir,
        service: CheckpointService,
    }

    async fn fixture() -> Fixture {
        let project = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let service = CheckpointService::new(data.path(), project.path());
        service.initialize().await.unwrap();
        Fixture {
            project,
            _data: data,
            service,
        }
    }

    fn call() -> ToolCall {
        ToolCall::new("write_file", json!({"path": "a.txt", "content": "x"}))
    }

    async fn commit_exists(service: &CheckpointService, hash: &str) -> bool {
        Command::new("git")
            .args(["cat-file", "-e", &format!("{}^{{commit}}", hash)])
            .env("GIT_DIR", service.git_dir())
            .status()
            .await
            .unwrap()
            .success()
    }

    #[test]
    fn test_validate_tag() {
        assert!(validate_tag("2024-01-01T00-00-00.000Z-a.txt-edit").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag("../escape").is_err());
        assert!(validate_tag("has space").is_err());
        assert!(validate_tag("a/b").is_err());
    }

    #[test]
    fn test_checkpoint_tag_format() {
        let tag = checkpoint_tag("edit", Some(Path::new("src/main file.rs")));
        assert!(tag.ends_with("-main_file.rs-edit"));
        assert!(validate_tag(&tag).is_ok());

        let tag = checkpoint_tag("shell", None);
        assert!(tag.ends_with("-workspace-shell"));
    }

    #[test]
    fn test_storage_layout() {
        let data = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let service = CheckpointService::new(data.path(), project.path());

        let git_dir = service.git_dir();
        assert!(git_dir.starts_with(data.path().join("history")));
        assert!(git_dir.ends_with("repo.git"));
        let hash_component = git_dir.parent().unwrap().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(hash_component.len(), 64);
    }

    #[tokio::test]
    async fn test_snapshot_clean_tree_is_resolvable() {
        let f = fixture().await;

        let first = f.service.snapshot("t1", &call(), &json!([])).await.unwrap();
        let second = f.service.snapshot("t2", &call(), &json!([])).await.unwrap();

        assert!(commit_exists(&f.service, &first.commit_hash).await);
        assert!(commit_exists(&f.service, &second.commit_hash).await);
        assert_ne!(first.commit_hash, second.commit_hash);
    }

    #[tokio::test]
    async fn test_restore_reverts_changes_and_removes_new_files() {
        let f = fixture().await;
        let root = f.project.path();
        fs::write(root.join("a.txt"), "one").unwrap();
        fs::create_dir(root.join("dir")).unwrap();
        fs::write(root.join("dir/nested.txt"), "nested").unwrap();

        let conversation = json!([{"role": "user", "content": "edit a.txt"}]);
        f.service.snapshot("before-edit", &call(), &conversation).await.unwrap();

        fs::write(root.join("a.txt"), "two").unwrap();
        fs::remove_file(root.join("dir/nested.txt")).unwrap();
        fs::write(root.join("b.txt"), "new").unwrap();
        fs::create_dir(root.join("newdir")).unwrap();
        fs::write(root.join("newdir/c.txt"), "new").unwrap();

        let record = f.service.restore("before-edit").await.unwrap();

        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "one");
        assert_eq!(fs::read_to_string(root.join("dir/nested.txt")).unwrap(), "nested");
        assert!(!root.join("b.txt").exists());
        assert!(!root.join("newdir").exists());
        assert_eq!(record.conversation, conversation);
        assert_eq!(record.tool_call.name, "write_file");
    }

    #[tokio::test]
    async fn test_gitignored_files_are_not_touched() {
        let f = fixture().await;
        let root = f.project.path();
        fs::write(root.join(".gitignore"), "*.log\n").unwrap();
        fs::write(root.join("keep.log"), "log").unwrap();

        f.service.snapshot("t1", &call(), &json!(null)).await.unwrap();
        fs::write(root.join("later.log"), "log").unwrap();
        f.service.restore("t1").await.unwrap();

        assert!(root.join("keep.log").exists());
        assert!(root.join("later.log").exists());
    }

    #[tokio::test]
    async fn test_project_git_dir_survives_restore() {
        let f = fixture().await;
        let root = f.project.path();
        Command::new("git")
            .args(["init", "--quiet"])
            .current_dir(root)
            .status()
            .await
            .unwrap();
        fs::write(root.join("a.txt"), "one").unwrap();

        f.service.snapshot("t1", &call(), &json!(null)).await.unwrap();
        f.service.restore("t1").await.unwrap();

        assert!(root.join(".git").join("HEAD").exists());
    }

    #[tokio::test]
    async fn test_list_and_get() {
        let f = fixture().await;
        assert!(f.service.list().await.unwrap().is_empty());

        f.service.snapshot("first", &call(), &json!(1)).await.unwrap();
        f.service.snapshot("second", &call(), &json!(2)).await.unwrap();

        assert_eq!(f.service.list().await.unwrap(), vec!["first", "second"]);
        assert_eq!(f.service.get("second").await.unwrap().conversation, json!(2));
    }

    #[tokio::test]
    async fn test_errors() {
        let f = fixture().await;

        assert!(matches!(
            f.service.restore("missing").await,
            Err(CheckpointError::NotFound(_))
        ));
        assert!(matches!(
            f.service.snapshot("bad tag", &call(), &json!(null)).await,
            Err(CheckpointError::InvalidTag(_))
        ));

        f.service.snapshot("dup", &call(), &json!(null)).await.unwrap();
        assert!(matches!(
            f.service.snapshot("dup", &call(), &json!(null)).await,
            Err(CheckpointError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_snapshots_with_same_tag() {
        let f = fixture().await;
        let a = ToolCall::new("a", json!({}));
        let b = ToolCall::new("b", json!({}));

        let (first, second) = tokio::join!(
            f.service.snapshot("same", &a, &json!(null)),
            f.service.snapshot("same", &b, &json!(null)),
        );

        let winner = match (first, second) {
            (Ok(record), Err(CheckpointError::AlreadyExists(_))) => record,
            (Err(CheckpointError::AlreadyExists(_)), Ok(record)) => record,
            other => panic!("expected exactly one snapshot to win: {:?}", other),
        };

        let stored = f.service.get("same").await.unwrap();
        assert_eq!(stored, winner);
        assert_eq!(f.service.list().await.unwrap(), vec!["same"]);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let f = fixture().await;
        f.service.initialize().await.unwrap();
        f.service.snapshot("t1", &call(), &json!(null)).await.unwrap();
    }
}
