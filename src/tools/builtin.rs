//! Local tools confined to a workspace directory.
//!
//! `read_file`, `list_directory` and `current_time`, used by the CLI's `chat`
//! command. Every path argument is resolved against the workspace root and
//! may not escape it.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncReadExt;

use crate::error::ConduitError;
use crate::tools::tool::{AgentTool, Tool, ToolExecutionContext};
use crate::tools::types::ToolParameters;

const READ_FILE_MAX_BYTES: usize = 65_536;

/// Decode a prefix read from a file. A trailing code point cut by the byte
/// limit is dropped; any other invalid byte is an error.
fn decode_prefix(bytes: Vec<u8>, truncated: bool) -> Result<String, std::str::Utf8Error> {
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(error) => {
            let utf8 = error.utf8_error();
            if truncated && utf8.error_len().is_none() {
                let bytes = error.into_bytes();
                Ok(String::from_utf8_lossy(&bytes[..utf8.valid_up_to()]).into_owned())
            } else {
                Err(utf8)
            }
        }
    }
}

/// Resolve `relative` under `root`, following symlinks, and reject anything
/// whose canonical path lies outside the canonical root.
async fn resolve(root: &Path, relative: &str, tool_name: &str) -> Result<PathBuf, ConduitError> {
    let outside = || {
        ConduitError::tool(
            tool_name,
            format!("{relative}: path must stay inside the workspace"),
        )
    };
    let candidate = Path::new(relative);
    let escapes = candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(outside());
    }

    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| ConduitError::tool(tool_name, format!("workspace root: {e}")))?;
    let path = tokio::fs::canonicalize(root.join(candidate))
        .await
        .map_err(|e| ConduitError::tool(tool_name, format!("{relative}: {e}")))?;
    if !path.starts_with(&root) {
        return Err(outside());
    }
    Ok(path)
}

pub fn read_file_tool(root: impl Into<PathBuf>) -> Arc<dyn Tool> {
    let root = Arc::new(root.into());
    Arc::new(AgentTool::new(
        "read_file",
        "Read a workspace file as UTF-8 text",
        ToolParameters::object()
            .string("path", "Path relative to the workspace root", true)
            .build(),
        move |args, _ctx: ToolExecutionContext| {
            let root = Arc::clone(&root);
            async move {
                let relative = args.get_str("path")?;
                let path = resolve(&root, relative, "read_file").await?;
                let io_error = |e: std::io::Error| ConduitError::tool("read_file", format!("{relative}: {e}"));

                let file = tokio::fs::File::open(&path).await.map_err(io_error)?;
                let total_bytes = file.metadata().await.map_err(io_error)?.len();
                let mut bytes = Vec::with_capacity(READ_FILE_MAX_BYTES.min(total_bytes as usize));
                file.take(READ_FILE_MAX_BYTES as u64)
                    .read_to_end(&mut bytes)
                    .await
                    .map_err(io_error)?;

                let truncated = total_bytes > bytes.len() as u64;
                let mut content = decode_prefix(bytes, truncated).map_err(|e| {
                    ConduitError::tool("read_file", format!("{relative}: not UTF-8 text ({e})"))
                })?;
                if truncated {
                    content.push_str("\n... (truncated)");
                }
                Ok(serde_json::json!({
                    "content": content,
                    "bytes": total_bytes,
                    "truncated": truncated,
                }))
            }
        },
    ))
}

pub fn list_directory_tool(root: impl Into<PathBuf>) -> Arc<dyn Tool> {
    let root = Arc::new(root.into());
    Arc::new(AgentTool::new(
        "list_directory",
        "List entries of a workspace directory",
        ToolParameters::object()
            .string("path", "Directory relative to the workspace root; defaults to the root", false)
            .build(),
        move |args, _ctx: ToolExecutionContext| {
            let root = Arc::clone(&root);
            async move {
                let relative = args.get_str_opt("path").unwrap_or(".");
                let path = resolve(&root, relative, "list_directory").await?;
                let mut read_dir = tokio::fs::read_dir(&path).await.map_err(|e| {
                    ConduitError::tool("list_directory", format!("{relative}: {e}"))
                })?;

                let mut entries = Vec::new();
                while let Some(entry) = read_dir
                    .next_entry()
                    .await
                    .map_err(|e| ConduitError::tool("list_directory", e.to_string()))?
                {
                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|kind| kind.is_dir())
                        .unwrap_or(false);
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if is_dir {
                        name.push('/');
                    }
                    entries.push(name);
                }
                entries.sort();
                Ok(serde_json::json!({ "text": entries.join("\n"), "count": entries.len() }))
            }
        },
    ))
}

pub fn current_time_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "current_time",
        "Current date and time in UTC (RFC 3339)",
        ToolParameters::empty(),
        |_args, _ctx: ToolExecutionContext| async move {
            Ok(serde_json::Value::String(chrono::Utc::now().to_rfc3339()))
        },
    ))
}

/// All local tools rooted at `root`.
pub fn workspace_tools(root: impl Into<PathBuf>) -> Vec<Arc<dyn Tool>> {
    let root = root.into();
    vec![
        read_file_tool(root.clone()),
        list_directory_tool(root),
        current_time_tool(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolArguments;

    fn args(json: serde_json::Value) -> ToolArguments {
        ToolArguments::new(json)
    }

    #[tokio::test]
    async fn read_file_returns_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "hello").unwrap();

        let tool = read_file_tool(dir.path());
        let value = tool
            .execute(&args(serde_json::json!({"path": "notes.md"})), &ToolExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(value["content"], "hello");
        assert_eq!(value["truncated"], false);
    }

    #[tokio::test]
    async fn paths_cannot_escape_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let tool = read_file_tool(dir.path());
        let err = tool
            .execute(
                &args(serde_json::json!({"path": "../etc/passwd"})),
                &ToolExecutionContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::ToolExecution { tool_name, .. } if tool_name == "read_file"));
    }

    #[tokio::test]
    async fn list_directory_marks_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("Cargo.toml"), "").unwrap();

        let tool = list_directory_tool(dir.path());
        let value = tool
            .execute(&args(serde_json::json!({})), &ToolExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(value["text"], "Cargo.toml\nsrc/");
        assert_eq!(value["count"], 2);
    }

    #[tokio::test]
    async fn large_files_are_read_as_a_bounded_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!("a{}", "é".repeat(35_000));
        std::fs::write(dir.path().join("big.txt"), &text).unwrap();

        let tool = read_file_tool(dir.path());
        let value = tool
            .execute(&args(serde_json::json!({"path": "big.txt"})), &ToolExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(value["truncated"], true);
        assert_eq!(value["bytes"], 70_001);
        let content = value["content"].as_str().unwrap();
        let body = content.strip_suffix("\n... (truncated)").unwrap();
        // The code point split by the limit is dropped.
        assert_eq!(body.len(), READ_FILE_MAX_BYTES - 1);
        assert!(text.starts_with(body));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_cannot_escape_the_workspace() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "TOP SECRET").unwrap();
        let workspace = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), workspace.path().join("link")).unwrap();

        let read = read_file_tool(workspace.path())
            .execute(
                &args(serde_json::json!({"path": "link/secret.txt"})),
                &ToolExecutionContext::default(),
            )
            .await
            .unwrap_err();
        assert!(read.to_string().contains("inside the workspace"));

        let list = list_directory_tool(workspace.path())
            .execute(&args(serde_json::json!({"path": "link"})), &ToolExecutionContext::default())
            .await
            .unwrap_err();
        assert!(list.to_string().contains("inside the workspace"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_inside_the_workspace_are_followed() {
        let workspace = tempfile::tempdir().unwrap();
        std::fs::create_dir(workspace.path().join("docs")).unwrap();
        std::fs::write(workspace.path().join("docs/readme.md"), "inside").unwrap();
        std::os::unix::fs::symlink(
            workspace.path().join("docs"),
            workspace.path().join("alias"),
        )
        .unwrap();

        let value = read_file_tool(workspace.path())
            .execute(
                &args(serde_json::json!({"path": "alias/readme.md"})),
                &ToolExecutionContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(value["content"], "inside");
    }
}
