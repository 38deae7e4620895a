use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{DispatchError, DispatchOutcome, DispatchRequest, Dispatcher};

/// Runs an external program per dispatch.
///
/// The request is written to the program's stdin as JSON and the outcome is
/// read back as JSON from stdout. A non-zero exit status, unparsable output or
/// an expired timeout count as a failed dispatch; the child is killed on timeout.
pub struct CommandDispatcher {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(program: &str, args: &[String], timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            args: args.to_vec(),
            timeout,
        }
    }

    async fn run(&self, payload: Vec<u8>) -> Result<std::process::Output, DispatchError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DispatchError::Failed(format!("could not start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .await
                .map_err(|e| DispatchError::Failed(format!("could not write request: {e}")))?;
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| DispatchError::Failed(format!("{} did not finish: {e}", self.program)))
    }
}

#[async_trait]
impl Dispatcher for CommandDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let payload =
            serde_json::to_vec(&request).map_err(|e| DispatchError::InvalidResponse(e.to_string()))?;
        debug!(
            program = %self.program,
            role = %request.role,
            level = %request.level,
            issue = request.issue_id,
            mode = %request.mode,
            "Dispatching task"
        );

        let output = tokio::time::timeout(self.timeout, self.run(payload))
            .await
            .map_err(|_| DispatchError::Timeout {
                seconds: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DispatchError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let outcome: DispatchOutcome = serde_json::from_slice(&output.stdout)
            .map_err(|e| DispatchError::InvalidResponse(e.to_string()))?;
        if outcome.session_ref.trim().is_empty() {
            return Err(DispatchError::InvalidResponse(
                "response has an empty sessionRef".to_string(),
            ));
        }

        info!(
            role = %request.role,
            issue = request.issue_id,
            action = %outcome.action,
            session = %outcome.session_ref,
            "Task dispatched"
        );
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::dispatch::DispatchMode;

    fn request() -> DispatchRequest {
        DispatchRequest {
            project_id: "p1".to_string(),
            project_name: "demo".to_string(),
            repo: "/src/demo".to_string(),
            channel: None,
            role: "developer".to_string(),
            level: "junior".to_string(),
            issue_id: 3,
            issue_title: "Fix typo".to_string(),
            issue_url: "https://example.test/3".to_string(),
            message: "developer task".to_string(),
            from_label: "To Do".to_string(),
            to_label: "Doing".to_string(),
            mode: DispatchMode::Spawn,
            session_ref: None,
        }
    }

    fn sh(script: &str, timeout: Duration) -> CommandDispatcher {
        CommandDispatcher::new("sh", &["-c".to_string(), script.to_string()], timeout)
    }

    #[tokio::test]
    async fn parses_json_outcome() {
        let dispatcher = sh(
            r#"cat > /dev/null; echo '{"action":"spawn","sessionRef":"s-9","announcement":"started"}'"#,
            Duration::from_secs(5),
        );
        let outcome = dispatcher.dispatch(request()).await.unwrap();
        assert_eq!(outcome.action, DispatchMode::Spawn);
        assert_eq!(outcome.session_ref, "s-9");
        assert_eq!(outcome.announcement, "started");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let dispatcher = sh("cat > /dev/null; echo boom >&2; exit 3", Duration::from_secs(5));
        let err = dispatcher.dispatch(request()).await.unwrap_err();
        match err {
            DispatchError::Failed(msg) => {
                assert!(msg.contains("exited with 3"));
                assert!(msg.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_dispatch_times_out() {
        let dispatcher = sh("sleep 5", Duration::from_millis(100));
        let err = dispatcher.dispatch(request()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn garbage_output_is_rejected() {
        let dispatcher = sh("cat > /dev/null; echo not-json", Duration::from_secs(5));
        let err = dispatcher.dispatch(request()).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidResponse(_)));
    }
}
