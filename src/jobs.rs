//! Turning job descriptions into queue records.
//!
//! The queue only needs an identifier and a ready-to-run shell command per
//! job. [`JobSource`] is the capability that produces them; [`ShellJob`] and
//! [`ScriptJob`] are the two kinds a job manifest can describe.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CalcitError, Result};
use crate::queue::Job;
use crate::template;

/// Something that can be turned into a queued job.
pub trait JobSource {
    /// Human-readable label, used in logs only.
    fn identifier(&self) -> String;

    /// Produce the shell command that runs this job.
    fn command(&self) -> Result<String>;
}

/// A job whose command is given literally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellJob {
    pub identifier: String,
    pub command: String,
}

impl ShellJob {
    pub fn new(identifier: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            command: command.into(),
        }
    }
}

impl JobSource for ShellJob {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn command(&self) -> Result<String> {
        Ok(self.command.clone())
    }
}

/// A job that renders its own run script from a template.
///
/// The command is `sh <script>`; the script is written when the command is
/// produced and left on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptJob {
    pub identifier: String,
    pub template: PathBuf,
    pub script: PathBuf,
    #[serde(default)]
    pub substitutions: HashMap<String, String>,
}

impl JobSource for ScriptJob {
    fn identifier(&self) -> String {
        self.identifier.clone()
    }

    fn command(&self) -> Result<String> {
        let mut substitutions = self.substitutions.clone();
        substitutions
            .entry("JOB".to_string())
            .or_insert_with(|| self.identifier.clone());

        template::render(&self.template, &self.script, &substitutions).map_err(|source| {
            CalcitError::JobCreate {
                identifier: self.identifier.clone(),
                source,
            }
        })?;
        Ok(format!("sh {}", self.script.display()))
    }
}

/// One entry of a JSON job manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobSpec {
    Script(ScriptJob),
    Shell(ShellJob),
}

impl JobSource for JobSpec {
    fn identifier(&self) -> String {
        match self {
            JobSpec::Script(job) => job.identifier(),
            JobSpec::Shell(job) => job.identifier(),
        }
    }

    fn command(&self) -> Result<String> {
        match self {
            JobSpec::Script(job) => job.command(),
            JobSpec::Shell(job) => job.command(),
        }
    }
}

/// Produce queue records for every source, preserving input order.
///
/// Stops at the first source whose command cannot be produced.
pub fn prepare_jobs<S: JobSource>(sources: &[S]) -> Result<Vec<Job>> {
    sources
        .iter()
        .map(|source| Ok(Job::new(source.identifier(), source.command()?)))
        .collect()
}

/// Load a job manifest.
///
/// `.json` files hold an array of [`JobSpec`]. Anything else is read line
/// by line: blank lines and `#` comments are skipped, and each line is
/// either `identifier<TAB>command` or a bare command named `job-<n>`.
pub fn load_job_file(path: &Path) -> Result<Vec<JobSpec>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CalcitError::JobFileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    if path.extension().is_some_and(|ext| ext == "json") {
        return Ok(serde_json::from_str(&contents)?);
    }
    Ok(parse_job_lines(&contents))
}

fn parse_job_lines(contents: &str) -> Vec<JobSpec> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .enumerate()
        .map(|(index, line)| {
            let job = match line.split_once('\t') {
                Some((identifier, command)) => ShellJob::new(identifier.trim(), command.trim()),
                None => ShellJob::new(format!("job-{}", index + 1), line),
            };
            JobSpec::Shell(job)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_keeps_input_order() {
        let sources = vec![
            ShellJob::new("a", "echo a"),
            ShellJob::new("b", "echo b"),
            ShellJob::new("c", "echo c"),
        ];
        let jobs = prepare_jobs(&sources).unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(jobs[1].command, "echo b");
    }

    #[test]
    fn line_manifest_supports_names_comments_and_blanks() {
        let specs = parse_job_lines("# header\n\necho one\nwater\tsh run.sh water\n  echo two  \n");
        let pairs: Vec<_> = specs
            .iter()
            .map(|s| (s.identifier(), s.command().unwrap()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("job-1".to_string(), "echo one".to_string()),
                ("water".to_string(), "sh run.sh water".to_string()),
                ("job-3".to_string(), "echo two".to_string()),
            ]
        );
    }

    #[test]
    fn json_manifest_accepts_both_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(
            &path,
            r#"[
                {"identifier": "a", "command": "echo a"},
                {"identifier": "b", "template": "t.sh", "script": "b.sh",
                 "substitutions": {"X": "1"}}
            ]"#,
        )
        .unwrap();

        let specs = load_job_file(&path).unwrap();
        assert_eq!(specs.len(), 2);
        assert!(matches!(&specs[0], JobSpec::Shell(j) if j.command == "echo a"));
        assert!(matches!(&specs[1], JobSpec::Script(j) if j.substitutions["X"] == "1"));
    }

    #[test]
    fn missing_job_file_is_reported() {
        let err = load_job_file(Path::new("/nonexistent/jobs.txt")).unwrap_err();
        assert!(matches!(err, CalcitError::JobFileNotFound(_)));
    }

    #[test]
    fn script_job_renders_run_script() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("run.tmpl");
        let script = dir.path().join("water.sh");
        std::fs::write(&template, "echo $JOB $BASIS\n").unwrap();

        let job = ScriptJob {
            identifier: "water".to_string(),
            template,
            script: script.clone(),
            substitutions: HashMap::from([("BASIS".to_string(), "6-31G".to_string())]),
        };
        assert_eq!(job.command().unwrap(), format!("sh {}", script.display()));
        assert_eq!(std::fs::read_to_string(&script).unwrap(), "echo water 6-31G\n");
    }

    #[test]
    fn script_job_with_missing_template_is_a_job_create_error() {
        let dir = tempfile::tempdir().unwrap();
        let job = ScriptJob {
            identifier: "methane".to_string(),
            template: dir.path().join("absent.tmpl"),
            script: dir.path().join("methane.sh"),
            substitutions: HashMap::new(),
        };
        let err = prepare_jobs(&[job]).unwrap_err();
        assert!(matches!(
            err,
            CalcitError::JobCreate { ref identifier, source: template::TemplateError::NotFound(_) }
                if identifier == "methane"
        ));
    }
}
