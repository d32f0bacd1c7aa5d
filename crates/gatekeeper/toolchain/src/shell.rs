//! Shell execution of command templates.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use gatekeeper_types::{ServiceError, ServiceResult};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Captured result of one shell command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Quote one argument for the platform shell.
#[cfg(not(windows))]
pub fn quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '@' | ':' | '+'))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(windows)]
pub fn quote(arg: &str) -> String {
    format!("\"{}\"", arg.replace('"', "\"\""))
}

/// Fill `{file}` and `{files}` placeholders with quoted paths.
pub fn render(template: &str, file: Option<&str>, files: &[String]) -> String {
    let joined = files.iter().map(|f| quote(f)).collect::<Vec<_>>().join(" ");
    let mut rendered = template.replace("{files}", &joined);
    if let Some(file) = file {
        rendered = rendered.replace("{file}", &quote(file));
    }
    rendered
}

/// Run `command` through the platform shell in `cwd`.
///
/// A non-zero exit is a normal outcome. Spawn failures and timeouts are
/// errors.
pub async fn run_shell(command: &str, cwd: &Path, limit: Duration) -> ServiceResult<CommandOutput> {
    debug!(command, cwd = %cwd.display(), "Running command");

    #[cfg(windows)]
    let mut cmd = Command::new("cmd");
    #[cfg(windows)]
    cmd.arg("/C").arg(command);

    #[cfg(not(windows))]
    let mut cmd = Command::new("sh");
    #[cfg(not(windows))]
    cmd.arg("-c").arg(command);

    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let started = Instant::now();
    let child = cmd.spawn().map_err(|e| ServiceError::Process {
        command: command.to_string(),
        message: format!("failed to spawn: {}", e),
    })?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| ServiceError::Process {
            command: command.to_string(),
            message: e.to_string(),
        })?,
        Err(_) => {
            return Err(ServiceError::Process {
                command: command.to_string(),
                message: format!("timed out after {}s", limit.as_secs()),
            })
        }
    };

    let result = CommandOutput {
        // Killed by a signal: no exit code.
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms: started.elapsed().as_millis() as u64,
    };
    debug!(command, exit_code = result.exit_code, duration_ms = result.duration_ms, "Command finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn quoting_leaves_plain_paths_alone() {
        assert_eq!(quote("src/login.test.ts"), "src/login.test.ts");
        assert_eq!(quote("my file.ts"), "'my file.ts'");
        assert_eq!(quote("it's.ts"), r"'it'\''s.ts'");
        assert_eq!(quote(""), "''");
    }

    #[cfg(not(windows))]
    #[test]
    fn placeholders_are_filled() {
        let files = vec!["a.ts".to_string(), "b c.ts".to_string()];
        assert_eq!(render("eslint {files}", None, &files), "eslint a.ts 'b c.ts'");
        assert_eq!(render("vitest run {file}", Some("x.test.ts"), &[]), "vitest run x.test.ts");
        assert_eq!(render("npm run build", None, &[]), "npm run build");
    }

    #[test]
    fn combined_output_skips_empty_streams() {
        let out = CommandOutput {
            stdout: "ok".into(),
            ..Default::default()
        };
        assert_eq!(out.combined(), "ok");
        let out = CommandOutput {
            stdout: "ok".into(),
            stderr: "warn".into(),
            ..Default::default()
        };
        assert_eq!(out.combined(), "ok\nwarn");
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn exit_codes_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_shell("echo hi; exit 3", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "hi");
        assert!(!out.success());
    }

    #[cfg(not(windows))]
    #[tokio::test]
    async fn slow_commands_time_out() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_shell("sleep 5", dir.path(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
