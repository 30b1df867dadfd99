/// User-filed submissions forwarded to the remote endpoint: correctness reports on a
/// listing and new-listing ("missing") suggestions. Both are validated before any
/// network call is made.
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSubmission {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub reason_code: String,
    #[serde(default)]
    pub evidence_url: String,
    #[serde(default)]
    pub posts: String,
    #[serde(default)]
    pub last_date: String,
    #[serde(default)]
    pub eligibility: String,
    #[serde(default)]
    pub note: String,
    #[serde(default = "Timestamp::epoch")]
    pub ts: Timestamp,
}

impl ReportSubmission {
    /// Trim every field and require a reason code.
    pub fn validated(mut self, now: Timestamp) -> Result<Self, SubmissionError> {
        for field in [
            &mut self.job_id,
            &mut self.title,
            &mut self.url,
            &mut self.reason_code,
            &mut self.evidence_url,
            &mut self.posts,
            &mut self.last_date,
            &mut self.eligibility,
            &mut self.note,
        ] {
            trim_in_place(field);
        }
        if self.reason_code.is_empty() {
            return Err(SubmissionError::MissingField("reason"));
        }
        self.ts = now;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingSubmission {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub official_site: String,
    #[serde(default)]
    pub posts: String,
    #[serde(default)]
    pub last_date: String,
    #[serde(default)]
    pub note: String,
    #[serde(default = "Timestamp::epoch")]
    pub ts: Timestamp,
}

impl MissingSubmission {
    /// Trim every field and require both a title and a URL.
    pub fn validated(mut self, now: Timestamp) -> Result<Self, SubmissionError> {
        for field in [
            &mut self.title,
            &mut self.url,
            &mut self.official_site,
            &mut self.posts,
            &mut self.last_date,
            &mut self.note,
        ] {
            trim_in_place(field);
        }
        if self.title.is_empty() {
            return Err(SubmissionError::MissingField("title"));
        }
        if self.url.is_empty() {
            return Err(SubmissionError::MissingField("url"));
        }
        self.ts = now;
        Ok(self)
    }
}

fn trim_in_place(field: &mut String) {
    let trimmed = field.trim();
    if trimmed.len() != field.len() {
        *field = trimmed.to_string();
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SubmissionError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> Timestamp {
        Timestamp::parse_lenient("2025-11-01T10:00:00Z")
    }

    #[test]
    fn test_report_requires_reason() {
        let report: ReportSubmission =
            serde_json::from_value(json!({ "jobId": "J1", "reasonCode": "   " })).unwrap();
        assert_eq!(
            report.validated(now()),
            Err(SubmissionError::MissingField("reason"))
        );
    }

    #[test]
    fn test_report_is_trimmed_and_stamped() {
        let report: ReportSubmission = serde_json::from_value(json!({
            "jobId": " J1 ",
            "reasonCode": "expired ",
            "note": "  closed early",
        }))
        .unwrap();
        let report = report.validated(now()).unwrap();
        assert_eq!(report.job_id, "J1");
        assert_eq!(report.reason_code, "expired");
        assert_eq!(report.note, "closed early");
        assert_eq!(report.ts, now());
    }

    #[test]
    fn test_missing_requires_title_and_url() {
        let no_url: MissingSubmission =
            serde_json::from_value(json!({ "title": "Clerk" })).unwrap();
        assert_eq!(
            no_url.validated(now()),
            Err(SubmissionError::MissingField("url"))
        );

        let no_title: MissingSubmission =
            serde_json::from_value(json!({ "url": "https://example.org" })).unwrap();
        assert_eq!(
            no_title.validated(now()),
            Err(SubmissionError::MissingField("title"))
        );
    }

    #[test]
    fn test_report_push_is_flat() {
        let report: ReportSubmission =
            serde_json::from_value(json!({ "jobId": "J1", "reasonCode": "dup" })).unwrap();
        let event = crate::sync::PushEvent::Report(report.validated(now()).unwrap());
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "report");
        assert_eq!(value["jobId"], "J1");
        assert_eq!(value["reasonCode"], "dup");
    }
}
