//! Filesystem and shell tools rooted at a workspace directory.
//!
//! | Tool | Name | Purpose |
//! |------|------|---------|
//! | [`ReadFile`] | `read_file` | Read a single file |
//! | [`WriteFile`] | `write_file` | Create or overwrite a file |
//! | [`ListFiles`] | `list_files` | List a directory |
//! | [`Shell`] | `shell` | Run a shell command in the workspace |
//!
//! Paths are relative to the workspace root. Any `..` component is refused.

use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

use super::core::{Tool, ToolFuture, ToolOutcome, ToolSet, parse_tool_args};
use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use serde::Deserialize;

/// Default blocked shell command patterns (lowercased substrings).
pub const DEFAULT_BLOCKED_COMMANDS: &[&str] =
    &["rm -rf /", "mkfs", "> /dev/", "sudo", "chmod 777"];

/// Default shell command timeout.
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

// ── Typed argument structs ──────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
pub struct ReadFileArgs {
    /// Path to the file, relative to the workspace root.
    pub path: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct WriteFileArgs {
    /// Path to the file, relative to the workspace root.
    pub path: String,
    /// Full content to write.
    pub content: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ListFilesArgs {
    /// Directory relative to the workspace root. Use '.' for the root.
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct ShellArgs {
    /// Shell command to execute (e.g. 'cargo test', 'git diff').
    pub command: String,
}

/// Join `relative` onto `root`, refusing absolute paths and `..`.
pub fn resolve_in(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let rel = Path::new(relative);
    let escapes = rel
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err("path traversal not allowed".into());
    }
    Ok(root.join(rel))
}

// ── ReadFile ────────────────────────────────────────────────────────

pub struct ReadFile {
    root: PathBuf,
}

impl ReadFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for ReadFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "read_file",
            "Read the contents of a file at the given path.",
            json_schema_for::<ReadFileArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<ReadFileArgs>(arguments);
        Box::pin(async move {
            let args = match parsed {
                Ok(a) => a,
                Err(e) => return ToolOutcome::err(e),
            };
            let full_path = match resolve_in(&self.root, &args.path) {
                Ok(p) => p,
                Err(e) => return ToolOutcome::err(e),
            };

            if let Ok(meta) = fs::metadata(&full_path).await
                && meta.is_dir()
            {
                return ToolOutcome::err(format!(
                    "'{}' is a directory, not a file. Use list_files to browse directories.",
                    args.path
                ));
            }

            match fs::read_to_string(&full_path).await {
                Ok(content) => ToolOutcome::ok(content),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    ToolOutcome::err(format!("File not found: {}", args.path))
                }
                Err(e) => ToolOutcome::err(format!("reading '{}': {e}", args.path)),
            }
        })
    }
}

// ── WriteFile ───────────────────────────────────────────────────────

pub struct WriteFile {
    root: PathBuf,
}

impl WriteFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for WriteFile {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "write_file",
            "Write content to a file. Creates the file (and parent directories) \
             if it doesn't exist, otherwise replaces its content.",
            json_schema_for::<WriteFileArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<WriteFileArgs>(arguments);
        Box::pin(async move {
            let args = match parsed {
                Ok(a) => a,
                Err(e) => return ToolOutcome::err(e),
            };
            let full_path = match resolve_in(&self.root, &args.path) {
                Ok(p) => p,
                Err(e) => return ToolOutcome::err(e),
            };
            if let Some(parent) = full_path.parent()
                && let Err(e) = fs::create_dir_all(parent).await
            {
                return ToolOutcome::err(format!("creating parent of '{}': {e}", args.path));
            }
            match fs::write(&full_path, args.content.as_bytes()).await {
                Ok(()) => ToolOutcome::ok(format!(
                    "Successfully wrote {} bytes to {}",
                    args.content.len(),
                    args.path
                )),
                Err(e) => ToolOutcome::err(format!("writing '{}': {e}", args.path)),
            }
        })
    }
}

// ── ListFiles ───────────────────────────────────────────────────────

pub struct ListFiles {
    root: PathBuf,
}

impl ListFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Tool for ListFiles {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "list_files",
            "List files and directories at the given path, one per line, sorted \
             by name. Directories end with '/'.",
            json_schema_for::<ListFilesArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<ListFilesArgs>(arguments);
        Box::pin(async move {
            let args = match parsed {
                Ok(a) => a,
                Err(e) => return ToolOutcome::err(e),
            };
            let rel = args.path.unwrap_or_else(|| ".".into());
            let dir = match resolve_in(&self.root, &rel) {
                Ok(p) => p,
                Err(e) => return ToolOutcome::err(e),
            };
            match list_dir(&dir).await {
                Ok(entries) if entries.is_empty() => ToolOutcome::ok("(empty directory)"),
                Ok(entries) => ToolOutcome::ok(entries.join("\n")),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    ToolOutcome::err(format!("Directory not found: {rel}"))
                }
                Err(e) => ToolOutcome::err(format!("listing '{rel}': {e}")),
            }
        })
    }
}

async fn list_dir(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut reader = fs::read_dir(dir).await?;
    let mut entries = Vec::new();
    while let Some(entry) = reader.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            name.push('/');
        }
        entries.push(name);
    }
    entries.sort();
    Ok(entries)
}

// ── Shell ───────────────────────────────────────────────────────────

/// Run `sh -c <command>` in the workspace.
///
/// Commands matching a blocked pattern are refused. The child is killed if
/// it outlives `timeout`.
pub struct Shell {
    root: PathBuf,
    blocked_commands: Vec<String>,
    timeout: Duration,
}

impl Shell {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            blocked_commands: DEFAULT_BLOCKED_COMMANDS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            timeout: DEFAULT_SHELL_TIMEOUT,
        }
    }

    /// Add a blocked pattern (matched as a lowercased substring).
    pub fn block_command(mut self, pattern: impl Into<String>) -> Self {
        self.blocked_commands.push(pattern.into().to_lowercase());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Tool for Shell {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "shell",
            format!(
                "Run a shell command in the workspace root and return its combined \
                 output. Timeout: {}s.",
                self.timeout.as_secs()
            ),
            json_schema_for::<ShellArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let parsed = parse_tool_args::<ShellArgs>(arguments);
        Box::pin(async move {
            let args = match parsed {
                Ok(a) => a,
                Err(e) => return ToolOutcome::err(e),
            };
            let lower = args.command.to_lowercase();
            if let Some(pattern) = self.blocked_commands.iter().find(|p| lower.contains(p.as_str())) {
                return ToolOutcome::err(format!("dangerous command pattern blocked: {pattern}"));
            }
            ToolOutcome::Ordinary(run_shell(&self.root, &args.command, self.timeout).await)
        })
    }
}

/// Format a finished command's output. Non-zero exits are failures that
/// still carry the output.
fn format_output(output: std::process::Output) -> Result<String, String> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = if stderr.is_empty() {
        stdout.into_owned()
    } else {
        format!("{stdout}\n[stderr]\n{stderr}")
    };
    if output.status.success() {
        Ok(combined)
    } else {
        Err(format!("Command failed ({}):\n{combined}", output.status))
    }
}

/// Run a shell command (`sh -c`) in `workdir`, bounded by `timeout`.
pub async fn run_shell(workdir: &Path, command: &str, timeout: Duration) -> Result<String, String> {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(workdir)
        .env("HOME", workdir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => format_output(output),
        Ok(Err(e)) => Err(format!("running command: {e}")),
        Err(_) => Err(format!("Command timed out after {}s", timeout.as_secs())),
    }
}

impl ToolSet {
    /// Register `read_file`, `write_file`, `list_files` and `shell` rooted
    /// at `root`.
    pub fn with_workspace_tools(self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.with(ReadFile::new(root.clone()))
            .with(WriteFile::new(root.clone()))
            .with(ListFiles::new(root.clone()))
            .with(Shell::new(root))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_text(outcome: ToolOutcome) -> String {
        match outcome {
            ToolOutcome::Ordinary(Ok(s)) => s,
            other => panic!("expected success, got {other:?}"),
        }
    }

    fn err_text(outcome: ToolOutcome) -> String {
        match outcome {
            ToolOutcome::Ordinary(Err(s)) => s,
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn resolve_rejects_traversal() {
        let root = Path::new("/ws");
        assert_eq!(resolve_in(root, "src/lib.rs").unwrap(), root.join("src/lib.rs"));
        assert!(resolve_in(root, "../etc/passwd").is_err());
        assert!(resolve_in(root, "/etc/passwd").is_err());
        assert!(resolve_in(root, "a/../../b").is_err());
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let tools = ToolSet::new().with_workspace_tools(dir.path());

        let written = ok_text(
            tools
                .execute("write_file", r#"{"path":"src/a.txt","content":"hello"}"#)
                .await,
        );
        assert!(written.contains("5 bytes"));

        let read = ok_text(tools.execute("read_file", r#"{"path":"src/a.txt"}"#).await);
        assert_eq!(read, "hello");
    }

    #[tokio::test]
    async fn read_file_reports_missing_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let tool = ReadFile::new(dir.path());

        assert!(err_text(tool.execute(r#"{"path":"nope.txt"}"#).await).contains("File not found"));
        assert!(err_text(tool.execute(r#"{"path":"sub"}"#).await).contains("is a directory"));
    }

    #[tokio::test]
    async fn list_files_sorted_with_dir_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.rs"), "").unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let listing = ok_text(ListFiles::new(dir.path()).execute("{}").await);
        assert_eq!(listing, "a.rs\nb.rs\nsrc/");
    }

    #[tokio::test]
    async fn shell_runs_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let out = ok_text(Shell::new(dir.path()).execute(r#"{"command":"ls"}"#).await);
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn shell_failure_carries_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = err_text(
            Shell::new(dir.path())
                .execute(r#"{"command":"echo oops; exit 3"}"#)
                .await,
        );
        assert!(err.contains("Command failed"));
        assert!(err.contains("oops"));
    }

    #[tokio::test]
    async fn shell_blocks_destructive_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Shell::new(dir.path()).block_command("DROP TABLE");
        assert!(err_text(shell.execute(r#"{"command":"sudo ls"}"#).await).contains("blocked"));
        assert!(
            err_text(shell.execute(r#"{"command":"psql -c 'drop table x'"}"#).await)
                .contains("blocked")
        );
    }

    #[tokio::test]
    async fn shell_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let shell = Shell::new(dir.path()).timeout(Duration::from_millis(100));
        let err = err_text(shell.execute(r#"{"command":"sleep 5"}"#).await);
        assert!(err.contains("timed out"));
    }
}
