use serde::Serialize;
use uuid::Uuid;

use crate::error::CalcitError;
use crate::proto::{JobRecord, ResultRecord};

/// One unit of work: an opaque shell command and a human-readable label.
///
/// `id` is assigned at submission and only used to match results back to
/// jobs; the identifier is never used for lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub identifier: String,
    pub command: String,
}

impl Job {
    pub fn new(identifier: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            identifier: identifier.into(),
            command: command.into(),
        }
    }
}

/// Output of running a [`Job`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    pub job_id: Uuid,
    pub identifier: String,
    pub elapsed_seconds: f64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Name of the worker that ran the job.
    pub worker: String,
}

impl JobResult {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

fn parse_id(raw: &str) -> Result<Uuid, CalcitError> {
    Uuid::parse_str(raw).map_err(|_| CalcitError::InvalidRecord(format!("bad job id '{}'", raw)))
}

impl From<Job> for JobRecord {
    fn from(job: Job) -> Self {
        JobRecord {
            job_id: job.id.to_string(),
            identifier: job.identifier,
            command: job.command,
        }
    }
}

impl TryFrom<JobRecord> for Job {
    type Error = CalcitError;

    fn try_from(record: JobRecord) -> Result<Self, Self::Error> {
        Ok(Job {
            id: parse_id(&record.job_id)?,
            identifier: record.identifier,
            command: record.command,
        })
    }
}

impl From<JobResult> for ResultRecord {
    fn from(result: JobResult) -> Self {
        ResultRecord {
            job_id: result.job_id.to_string(),
            identifier: result.identifier,
            elapsed_seconds: result.elapsed_seconds,
            stdout: result.stdout,
            stderr: result.stderr,
            worker: result.worker,
        }
    }
}

impl TryFrom<ResultRecord> for JobResult {
    type Error = CalcitError;

    fn try_from(record: ResultRecord) -> Result<Self, Self::Error> {
        Ok(JobResult {
            job_id: parse_id(&record.job_id)?,
            identifier: record.identifier,
            elapsed_seconds: record.elapsed_seconds,
            stdout: record.stdout,
            stderr: record.stderr,
            worker: record.worker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_jobs_get_distinct_ids() {
        let a = Job::new("a", "echo a");
        let b = Job::new("a", "echo a");
        assert_ne!(a.id, b.id);
        assert_eq!(a.identifier, "a");
        assert_eq!(a.command, "echo a");
    }

    #[test]
    fn job_record_with_bad_id_is_rejected() {
        let record = JobRecord {
            job_id: "not-a-uuid".to_string(),
            identifier: "x".to_string(),
            command: "true".to_string(),
        };
        let err = Job::try_from(record).unwrap_err();
        assert!(matches!(err, CalcitError::InvalidRecord(_)));
    }

    #[test]
    fn result_record_keeps_raw_bytes() {
        let result = JobResult {
            job_id: Uuid::new_v4(),
            identifier: "bin".to_string(),
            elapsed_seconds: 0.5,
            stdout: vec![0xff, 0x00, b'a'],
            stderr: Vec::new(),
            worker: "w".to_string(),
        };
        let record = ResultRecord::from(result.clone());
        assert_eq!(record.stdout, vec![0xff, 0x00, b'a']);
        assert_eq!(JobResult::try_from(record).unwrap(), result);
        assert_eq!(result.stdout_lossy(), "\u{fffd}\u{0}a");
    }
}
