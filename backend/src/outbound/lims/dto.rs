//! DTOs for decoding LIMS JSON responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetComment, LimsDataset, ProjectId, ValidationFlag};

#[derive(Debug, Serialize)]
pub(super) struct LoginRequestDto<'a> {
    pub(super) username: &'a str,
    pub(super) password: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct RefreshRequestDto<'a> {
    pub(super) refresh: &'a str,
}

#[derive(Deserialize)]
pub(super) struct TokenResponseDto {
    pub(super) access: String,
    pub(super) refresh: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct DatasetListDto {
    #[serde(default)]
    pub(super) results: Vec<DatasetDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct DatasetDto {
    pub(super) id: i64,
    pub(super) lane: i64,
    pub(super) external_project_id: String,
    #[serde(default)]
    pub(super) project_name: String,
    pub(super) run_name: String,
    #[serde(default)]
    pub(super) released_status_count: i64,
    pub(super) latest_release_update: Option<DateTime<Utc>>,
    pub(super) latest_validation_update: Option<DateTime<Utc>>,
    pub(super) validation_status: Option<i64>,
    pub(super) validated_by: Option<serde_json::Value>,
    #[serde(default)]
    pub(super) archived_comments: Vec<CommentDto>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CommentDto {
    pub(super) comment: String,
    pub(super) created_at: DateTime<Utc>,
    pub(super) created_by: i64,
}

impl DatasetListDto {
    pub(super) fn into_domain(self) -> Result<Vec<LimsDataset>, String> {
        self.results.into_iter().map(DatasetDto::into_domain).collect()
    }
}

impl DatasetDto {
    fn into_domain(self) -> Result<LimsDataset, String> {
        let validation_status = match self.validation_status {
            None => None,
            Some(code) => Some(ValidationFlag::from_code(code).ok_or_else(|| {
                format!("dataset {} has unknown validation status {code}", self.id)
            })?),
        };
        let validated_by = self.validated_by.and_then(|value| match value {
            serde_json::Value::String(name) if !name.is_empty() => Some(name),
            serde_json::Value::Number(id) => Some(id.to_string()),
            _ => None,
        });

        Ok(LimsDataset {
            id: self.id,
            lane: self.lane,
            project_id: ProjectId::new(self.external_project_id),
            project_name: self.project_name,
            run_name: self.run_name,
            released_status_count: self.released_status_count,
            latest_release_update: self.latest_release_update,
            latest_validation_update: self.latest_validation_update,
            validation_status,
            validated_by,
            comments: self
                .archived_comments
                .into_iter()
                .map(|comment| DatasetComment {
                    comment: comment.comment,
                    created_at: comment.created_at,
                    created_by: comment.created_by,
                })
                .collect(),
        })
    }
}
