use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use safepush_core::{ModelRef, Packager, PackagingError, PackagingLinter};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

pub const COG_CONFIG_FILE: &str = "cog.yaml";
pub const DEFAULT_REGISTRY: &str = "r8.im";

#[derive(Debug, Default, Deserialize)]
struct CogConfig {
    #[serde(default)]
    predict: Option<String>,
}

/// Python file named by the `predict:` stanza, e.g. `predict.py:Predictor` → `predict.py`.
pub fn predict_file(cog_yaml: &str) -> Result<Option<String>, PackagingError> {
    let config: CogConfig = serde_yaml::from_str(cog_yaml)
        .map_err(|e| PackagingError::Config(format!("{COG_CONFIG_FILE}: {e}")))?;
    Ok(config
        .predict
        .and_then(|p| p.split(':').next().map(str::to_string))
        .filter(|f| !f.trim().is_empty()))
}

/// Lints the predictor with `ruff`, the way the packaged model's code is checked
/// before anything is pushed.
pub struct CogLinter {
    workdir: PathBuf,
    ruff: String,
}

impl CogLinter {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            ruff: "ruff".into(),
        }
    }

    pub fn with_ruff(mut self, program: impl Into<String>) -> Self {
        self.ruff = program.into();
        self
    }
}

#[async_trait]
impl PackagingLinter for CogLinter {
    async fn lint(&self) -> Result<Vec<String>, PackagingError> {
        let config_path = self.workdir.join(COG_CONFIG_FILE);
        let raw = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| PackagingError::Config(format!("{}: {e}", config_path.display())))?;

        let Some(file) = predict_file(&raw)? else {
            return Ok(vec![format!("{COG_CONFIG_FILE} doesn't have a valid predict stanza")]);
        };
        if !self.workdir.join(&file).exists() {
            return Ok(vec![format!("{file} doesn't exist")]);
        }

        tracing::debug!(%file, "running {}", self.ruff);
        let output = Command::new(&self.ruff)
            .args(["check", file.as_str(), "--ignore=E402"])
            .current_dir(&self.workdir)
            .output()
            .await
            .map_err(|e| PackagingError::Command {
                program: self.ruff.clone(),
                message: e.to_string(),
            })?;
        if output.status.success() {
            return Ok(vec![]);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut findings: Vec<String> = stdout
            .lines()
            .chain(stderr.lines())
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect();
        if findings.is_empty() {
            findings.push(format!("Linting {file} failed with {}", output.status));
        }
        Ok(findings)
    }
}

/// Pushes the packaged model with `cog push` and reports the pushed digest.
pub struct CogCli {
    workdir: PathBuf,
    program: String,
    registry: String,
}

impl CogCli {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            program: "cog".into(),
            registry: DEFAULT_REGISTRY.into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn command_error(&self, message: impl Into<String>) -> PackagingError {
        PackagingError::Command {
            program: self.program.clone(),
            message: message.into(),
        }
    }
}

/// Digest from a `latest: digest: sha256:<hex> size: ...` line.
pub fn parse_digest(line: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if !line.contains("latest: digest: sha256:") {
        return None;
    }
    let re = PATTERN.get_or_init(|| Regex::new(r"sha256:([a-f0-9]{64})").expect("valid digest pattern"));
    re.captures(line).map(|c| c[1].to_string())
}

#[async_trait]
impl Packager for CogCli {
    async fn push(&self, model: &ModelRef) -> Result<String, PackagingError> {
        let image = format!("{}/{}/{}", self.registry, model.owner, model.name);
        tracing::info!(%image, "pushing");

        let mut child = Command::new(&self.program)
            .args(["push", image.as_str()])
            .current_dir(&self.workdir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.command_error(e.to_string()))?;

        let stdout = child.stdout.take().ok_or_else(|| self.command_error("no stdout"))?;
        let mut stderr = child.stderr.take().ok_or_else(|| self.command_error("no stderr"))?;

        let read_stdout = async {
            let mut digest = None;
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "cog", "{line}");
                if let Some(d) = parse_digest(&line) {
                    digest = Some(d);
                }
            }
            digest
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                tracing::warn!(error = %e, "could not read cog stderr");
            }
            String::from_utf8_lossy(&buf).into_owned()
        };
        let (digest, err_text) = tokio::join!(read_stdout, read_stderr);

        let status = child.wait().await.map_err(|e| self.command_error(e.to_string()))?;
        if !status.success() {
            return Err(self.command_error(format!("{status}: {}", err_text.trim())));
        }
        digest.ok_or_else(|| self.command_error("no sha256 digest in push output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_stanza() {
        assert_eq!(
            predict_file("build:\n  gpu: true\npredict: \"predict.py:Predictor\"\n").unwrap(),
            Some("predict.py".to_string())
        );
        assert_eq!(predict_file("build: {}\n").unwrap(), None);
        assert_eq!(predict_file("predict: \"\"\n").unwrap(), None);
        assert!(predict_file("predict: [unclosed").is_err());
    }

    #[test]
    fn digest_line() {
        let hex = "a".repeat(64);
        let line = format!("latest: digest: sha256:{hex} size: 1234");
        assert_eq!(parse_digest(&line), Some(hex.clone()));
        assert_eq!(parse_digest(&format!("pushing layer sha256:{hex}")), None);
    }

    #[tokio::test]
    async fn lint_reports_missing_predictor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(COG_CONFIG_FILE), "predict: \"predict.py:Predictor\"\n").unwrap();
        let findings = CogLinter::new(dir.path()).lint().await.unwrap();
        assert_eq!(findings, vec!["predict.py doesn't exist".to_string()]);
    }

    #[tokio::test]
    async fn lint_reports_missing_stanza() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(COG_CONFIG_FILE), "build:\n  python_version: \"3.11\"\n").unwrap();
        let findings = CogLinter::new(dir.path()).lint().await.unwrap();
        assert_eq!(findings, vec!["cog.yaml doesn't have a valid predict stanza".to_string()]);
    }

    #[tokio::test]
    async fn lint_without_cog_yaml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CogLinter::new(dir.path()).lint().await.unwrap_err();
        assert!(matches!(err, PackagingError::Config(_)));
    }

    #[cfg(unix)]
    fn fake_tool(dir: &std::path::Path, name: &str, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn push_reads_digest_from_output() {
        let dir = tempfile::tempdir().unwrap();
        let hex = "0123456789abcdef".repeat(4);
        let cog = fake_tool(
            dir.path(),
            "cog",
            &format!("echo \"Pushing $2\"\necho \"latest: digest: sha256:{hex} size: 99\""),
        );
        let digest = CogCli::new(dir.path())
            .with_program(cog)
            .push(&ModelRef::new("acme", "sdxl-test"))
            .await
            .unwrap();
        assert_eq!(digest, hex);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn push_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cog = fake_tool(dir.path(), "cog", "echo 'not logged in' >&2\nexit 1");
        let err = CogCli::new(dir.path())
            .with_program(cog)
            .push(&ModelRef::new("acme", "sdxl-test"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not logged in"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn push_failure_keeps_non_utf8_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cog = fake_tool(dir.path(), "cog", "printf 'denied \\377 registry\\n' >&2
exit 1");
        let err = CogCli::new(dir.path())
            .with_program(cog)
            .push(&ModelRef::new("acme", "sdxl-test"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("denied"), "{message}");
        assert!(message.contains("registry"), "{message}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn ruff_findings_are_reported_line_by_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(COG_CONFIG_FILE), "predict: \"predict.py:Predictor\"\n").unwrap();
        std::fs::write(dir.path().join("predict.py"), "import os\n").unwrap();
        let ruff = fake_tool(
            dir.path(),
            "ruff",
            "echo 'predict.py:1:8: F401 os imported but unused'\necho 'Found 1 error.'\nexit 1",
        );
        let findings = CogLinter::new(dir.path()).with_ruff(ruff).lint().await.unwrap();
        assert_eq!(
            findings,
            vec![
                "predict.py:1:8: F401 os imported but unused".to_string(),
                "Found 1 error.".to_string()
            ]
        );
    }
}
