//! Measurement ingestion: the `POST /runs` payload, its validation, and the
//! transactional write.

use reqwest::Url;
use serde::Deserialize;

use crate::error::{Error, FieldError, Result};
use crate::store::Store;
use crate::types::{Fixed, NewRun, RepositoryInput, Run};

/// decimal(12,6): strictly below one million kWh / kg.
const MAX_QUANTITY: f64 = 1_000_000.0;
/// decimal(10,3): strictly below ten million seconds.
const MAX_DURATION_SECS: f64 = 10_000_000.0;
const MAX_NAME_LEN: usize = 255;
const MAX_URL_LEN: usize = 2048;
const MAX_DESCRIPTION_LEN: usize = 4096;
const COMMIT_SHA_LEN: usize = 40;

/// Body of `POST /runs` as sent by the CLI. Everything is optional at the
/// serde level so that missing fields are reported as validation errors.
#[derive(Debug, Default, Deserialize)]
pub struct RunSubmission {
    pub energy_kwh: Option<f64>,
    pub co2_kg: Option<f64>,
    pub duration_s: Option<f64>,
    #[serde(default, alias = "metadata")]
    pub run_metadata: Option<serde_json::Value>,
    pub git_commit_sha: Option<String>,
    pub branch_name: Option<String>,
    pub workflow_name: Option<String>,
    pub repository: Option<RepositoryDescriptor>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RepositoryDescriptor {
    #[serde(alias = "id")]
    pub github_repo_id: Option<i64>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub html_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
}

/// Validates and stores one run, creating or refreshing its repository.
pub fn submit(store: &dyn Store, identity_id: &str, submission: RunSubmission) -> Result<Run> {
    let run = validate(submission)?;
    let full_name = run.repository.full_name.clone();

    let created = store.create_run(identity_id, &run)?;

    tracing::info!(
        run_id = %created.id,
        repository = %full_name,
        co2_kg = %created.co2_kg,
        energy_kwh = %created.energy_kwh,
        "Run recorded"
    );
    Ok(created)
}

/// Checks the whole payload and reports every problem at once.
pub fn validate(submission: RunSubmission) -> Result<NewRun> {
    let mut errors = Vec::new();

    let energy_kwh = quantity::<1_000_000>(&mut errors, "energy_kwh", submission.energy_kwh, MAX_QUANTITY);
    let co2_kg = quantity::<1_000_000>(&mut errors, "co2_kg", submission.co2_kg, MAX_QUANTITY);
    let duration_s = quantity::<1_000>(&mut errors, "duration_s", submission.duration_s, MAX_DURATION_SECS);

    let git_commit_sha = non_empty(submission.git_commit_sha).map(|sha| sha.to_ascii_lowercase());
    if let Some(sha) = &git_commit_sha {
        if sha.len() != COMMIT_SHA_LEN || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            errors.push(FieldError::new(
                "git_commit_sha",
                "must be exactly 40 hexadecimal characters",
            ));
        }
    }

    let branch_name = bounded(&mut errors, "branch_name", submission.branch_name, MAX_NAME_LEN);
    let workflow_name = bounded(&mut errors, "workflow_name", submission.workflow_name, MAX_NAME_LEN);

    let run_metadata = match submission.run_metadata {
        None | Some(serde_json::Value::Null) => None,
        Some(value @ serde_json::Value::Object(_)) => Some(value),
        Some(_) => {
            errors.push(FieldError::new("run_metadata", "must be a JSON object"));
            None
        }
    };

    let repository = match submission.repository {
        Some(descriptor) => repository(&mut errors, descriptor),
        None => {
            errors.push(FieldError::new("repository", "is required"));
            None
        }
    };

    match (energy_kwh, co2_kg, duration_s, repository) {
        (Some(energy_kwh), Some(co2_kg), Some(duration_s), Some(repository)) if errors.is_empty() => {
            Ok(NewRun {
                energy_kwh,
                co2_kg,
                duration_s,
                run_metadata,
                git_commit_sha,
                branch_name,
                workflow_name,
                repository,
            })
        }
        _ => Err(Error::Validation(errors)),
    }
}

fn quantity<const SCALE: i64>(
    errors: &mut Vec<FieldError>,
    field: &str,
    value: Option<f64>,
    max: f64,
) -> Option<Fixed<SCALE>> {
    let Some(value) = value else {
        errors.push(FieldError::new(field, "is required"));
        return None;
    };
    if value.is_finite() && value >= max {
        errors.push(FieldError::new(field, format!("must be less than {max}")));
        return None;
    }
    let fixed = Fixed::<SCALE>::from_f64(value);
    if fixed.is_none() {
        errors.push(FieldError::new(field, "must be a number greater than or equal to 0"));
    }
    fixed
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn bounded(errors: &mut Vec<FieldError>, field: &str, value: Option<String>, max_len: usize) -> Option<String> {
    let value = non_empty(value)?;
    if value.chars().count() > max_len {
        errors.push(FieldError::new(field, format!("must be at most {max_len} characters")));
    }
    Some(value)
}

fn repository(errors: &mut Vec<FieldError>, descriptor: RepositoryDescriptor) -> Option<RepositoryInput> {
    let before = errors.len();

    let full_name = bounded(errors, "repository.full_name", descriptor.full_name, MAX_NAME_LEN);
    match &full_name {
        None => errors.push(FieldError::new("repository.full_name", "is required")),
        Some(full) => {
            let valid = full
                .split_once('/')
                .is_some_and(|(owner, name)| !owner.is_empty() && !name.is_empty());
            if !valid {
                errors.push(FieldError::new(
                    "repository.full_name",
                    "must have the form owner/name",
                ));
            }
        }
    }

    let name = bounded(errors, "repository.name", descriptor.name, MAX_NAME_LEN).or_else(|| {
        full_name
            .as_deref()
            .and_then(|full| full.rsplit('/').next())
            .map(str::to_string)
    });

    let html_url = bounded(errors, "repository.html_url", descriptor.html_url, MAX_URL_LEN);
    match &html_url {
        None => errors.push(FieldError::new("repository.html_url", "is required")),
        Some(url) => {
            let web = Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
            if !web {
                errors.push(FieldError::new("repository.html_url", "must be an http(s) URL"));
            }
        }
    }

    let description = bounded(
        errors,
        "repository.description",
        descriptor.description,
        MAX_DESCRIPTION_LEN,
    );

    if errors.len() > before {
        return None;
    }

    Some(RepositoryInput {
        github_repo_id: descriptor.github_repo_id,
        name: name?,
        full_name: full_name?,
        description,
        private: descriptor.private,
        html_url: html_url?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{Micros, Millis, ProviderProfile, RepositoryQuery};

    fn submission(body: serde_json::Value) -> RunSubmission {
        serde_json::from_value(body).unwrap()
    }

    fn scenario() -> serde_json::Value {
        json!({
            "energy_kwh": 0.5,
            "co2_kg": 0.3,
            "duration_s": 120,
            "repository": {"name": "r", "full_name": "u/r", "html_url": "https://x/u/r"}
        })
    }

    fn fields(err: Error) -> Vec<String> {
        match err {
            Error::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_submission() {
        let run = validate(submission(scenario())).unwrap();
        assert_eq!(run.energy_kwh, Micros::from_raw(500_000));
        assert_eq!(run.co2_kg, Micros::from_raw(300_000));
        assert_eq!(run.duration_s, Millis::from_raw(120_000));
        assert_eq!(run.repository.full_name, "u/r");
        assert_eq!(run.repository.name, "r");
    }

    #[test]
    fn test_negative_and_missing_quantities() {
        let mut body = scenario();
        body["co2_kg"] = json!(-0.1);
        body.as_object_mut().unwrap().remove("duration_s");

        let errors = fields(validate(submission(body)).unwrap_err());
        assert_eq!(errors, vec!["co2_kg", "duration_s"]);
    }

    #[test]
    fn test_out_of_range_quantity() {
        let mut body = scenario();
        body["energy_kwh"] = json!(1_000_000.0);
        assert_eq!(fields(validate(submission(body)).unwrap_err()), vec!["energy_kwh"]);
    }

    #[test]
    fn test_commit_sha_rules() {
        let mut body = scenario();
        body["git_commit_sha"] = json!("ABCDEF0123456789abcdef0123456789ABCDEF01");
        let run = validate(submission(body)).unwrap();
        assert_eq!(
            run.git_commit_sha.as_deref(),
            Some("abcdef0123456789abcdef0123456789abcdef01")
        );

        let mut body = scenario();
        body["git_commit_sha"] = json!("abc123");
        assert_eq!(fields(validate(submission(body)).unwrap_err()), vec!["git_commit_sha"]);

        let mut body = scenario();
        body["git_commit_sha"] = json!("");
        assert!(validate(submission(body)).unwrap().git_commit_sha.is_none());
    }

    #[test]
    fn test_repository_descriptor_rules() {
        let mut body = scenario();
        body["repository"] = json!({"full_name": "u/derived", "html_url": "https://github.com/u/derived"});
        assert_eq!(validate(submission(body)).unwrap().repository.name, "derived");

        let mut body = scenario();
        body["repository"] = json!({"full_name": "nope", "html_url": "ftp://x"});
        assert_eq!(
            fields(validate(submission(body)).unwrap_err()),
            vec!["repository.full_name", "repository.html_url"]
        );

        let mut body = scenario();
        body.as_object_mut().unwrap().remove("repository");
        assert_eq!(fields(validate(submission(body)).unwrap_err()), vec!["repository"]);
    }

    #[test]
    fn test_metadata_must_be_object() {
        let mut body = scenario();
        body["run_metadata"] = json!(["not", "an", "object"]);
        assert_eq!(fields(validate(submission(body)).unwrap_err()), vec!["run_metadata"]);

        let mut body = scenario();
        body["metadata"] = json!({"runner": "linux"});
        assert!(validate(submission(body)).unwrap().run_metadata.is_some());
    }

    #[test]
    fn test_rejected_submission_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        let owner = store
            .upsert_identity(&ProviderProfile {
                github_id: 1,
                handle: "u".to_string(),
                email: None,
                avatar_url: None,
                name: None,
            })
            .unwrap();

        let mut body = scenario();
        body["energy_kwh"] = json!(-1);
        assert!(submit(&store, &owner.id, submission(body)).is_err());
        assert_eq!(store.get_identity_stats(&owner.id).unwrap().run_count, 0);

        let run = submit(&store, &owner.id, submission(scenario())).unwrap();
        let repo = store.get_repository(&run.repository_id).unwrap().unwrap();
        assert_eq!(repo.owner_id, owner.id);
        assert_eq!(run.co2_kg.as_f64(), 0.3);

        let listed = store
            .list_repositories_with_stats(&RepositoryQuery::default())
            .unwrap();
        assert_eq!(listed.total, 1);
    }
}
