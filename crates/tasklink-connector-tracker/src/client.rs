//! Tracker REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use tasklink_connector::error::{ConnectorError, ConnectorResult};
use tasklink_connector::traits::TargetSystem;
use tasklink_connector::types::{DestinationList, TargetTaskSpec};

use crate::config::TrackerConfig;

/// REST adapter for the work tracker.
#[derive(Debug)]
pub struct TrackerClient {
    config: TrackerConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TeamEnvelope {
    team: TeamDetail,
}

#[derive(Debug, Deserialize)]
struct TeamDetail {
    #[serde(default)]
    members: Vec<Member>,
}

#[derive(Debug, Deserialize)]
struct Member {
    user: MemberUser,
}

#[derive(Debug, Deserialize)]
struct MemberUser {
    id: serde_json::Value,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamList {
    #[serde(default)]
    teams: Vec<TeamRef>,
}

#[derive(Debug, Deserialize)]
struct TeamRef {
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SpaceList {
    #[serde(default)]
    spaces: Vec<Space>,
}

#[derive(Debug, Deserialize)]
struct Space {
    id: serde_json::Value,
    name: String,
}

#[derive(Debug, Deserialize)]
struct FolderList {
    #[serde(default)]
    folders: Vec<FolderRef>,
}

#[derive(Debug, Deserialize)]
struct FolderRef {
    id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ListEnvelope {
    #[serde(default)]
    lists: Vec<ListDetail>,
}

#[derive(Debug, Deserialize)]
struct ListDetail {
    id: serde_json::Value,
    name: String,
}

/// The tracker serves ids as either strings or numbers.
fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl TrackerClient {
    /// Build a client from a validated configuration.
    pub fn new(config: TrackerConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.read_timeout_secs))
            .build()
            .map_err(|e| {
                ConnectorError::invalid_configuration(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { config, client })
    }

    fn http_error(&self, err: reqwest::Error) -> ConnectorError {
        if err.is_timeout() {
            ConnectorError::ConnectionTimeout {
                timeout_secs: self.config.read_timeout_secs,
            }
        } else if err.is_connect() {
            ConnectorError::connection_failed(err.to_string())
        } else {
            ConnectorError::network_with_source("tracker request failed", err)
        }
    }

    async fn api_error(response: Response) -> ConnectorError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ConnectorError::api(status, body)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> ConnectorResult<T> {
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.config.api_token)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| ConnectorError::invalid_data(format!("tracker payload: {e}")))
    }

    async fn find_list_in_space(
        &self,
        space_id: &str,
    ) -> ConnectorResult<Option<DestinationList>> {
        let filter = self.config.list_name_filter.to_lowercase();

        let folders: FolderList = self
            .get_json(&format!("{}/space/{}/folder", self.config.base_url, space_id))
            .await?;
        for folder in &folders.folders {
            let lists: ListEnvelope = self
                .get_json(&format!(
                    "{}/folder/{}/list",
                    self.config.base_url,
                    id_string(&folder.id)
                ))
                .await?;
            if let Some(list) = lists
                .lists
                .into_iter()
                .find(|l| l.name.to_lowercase().contains(&filter))
            {
                return Ok(Some(DestinationList {
                    id: id_string(&list.id),
                    name: list.name,
                }));
            }
        }

        // Lists can also live directly under the space.
        let folderless: ListEnvelope = self
            .get_json(&format!("{}/space/{}/list", self.config.base_url, space_id))
            .await?;
        Ok(folderless
            .lists
            .into_iter()
            .find(|l| l.name.to_lowercase().contains(&filter))
            .map(|l| DestinationList {
                id: id_string(&l.id),
                name: l.name,
            }))
    }
}

#[async_trait]
impl TargetSystem for TrackerClient {
    #[instrument(skip(self, spec), fields(task_name = %spec.name))]
    async fn create_task(&self, list_id: &str, spec: &TargetTaskSpec) -> ConnectorResult<String> {
        let url = format!("{}/list/{}/task", self.config.base_url, list_id);
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.config.api_token)
            .json(spec)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let created: CreatedTask = response
            .json()
            .await
            .map_err(|e| ConnectorError::invalid_data(format!("created task payload: {e}")))?;
        let task_id = id_string(&created.id);
        debug!(list_id, task_id, "tracker task created");
        Ok(task_id)
    }

    #[instrument(skip(self, value))]
    async fn update_task_field(
        &self,
        task_id: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> ConnectorResult<()> {
        let url = format!("{}/task/{}", self.config.base_url, task_id);
        let response = self
            .client
            .put(&url)
            .header("Authorization", &self.config.api_token)
            .json(&json!({ field: value }))
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ConnectorError::ObjectNotFound {
                identifier: task_id.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        debug!(task_id, field, "tracker task updated");
        Ok(())
    }

    async fn resolve_member_by_email(&self, email: &str) -> ConnectorResult<Option<String>> {
        let url = format!("{}/team/{}", self.config.base_url, self.config.team_id);
        let envelope: TeamEnvelope = self.get_json(&url).await?;
        Ok(envelope
            .team
            .members
            .into_iter()
            .find(|member| {
                member
                    .user
                    .email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .map(|member| id_string(&member.user.id)))
    }

    async fn resolve_destination_list(
        &self,
        company_name: &str,
    ) -> ConnectorResult<Option<DestinationList>> {
        let needle = company_name.to_lowercase();
        let teams: TeamList = self
            .get_json(&format!("{}/team", self.config.base_url))
            .await?;

        for team in &teams.teams {
            let spaces: SpaceList = self
                .get_json(&format!(
                    "{}/team/{}/space",
                    self.config.base_url,
                    id_string(&team.id)
                ))
                .await?;
            if let Some(space) = spaces
                .spaces
                .iter()
                .find(|space| space.name.to_lowercase().contains(&needle))
            {
                if let Some(list) = self.find_list_in_space(&id_string(&space.id)).await? {
                    return Ok(Some(list));
                }
            }
        }
        debug!(company_name, "no destination list for company");
        Ok(None)
    }

    async fn set_custom_field(
        &self,
        task_id: &str,
        field_id: &str,
        value: &serde_json::Value,
    ) -> ConnectorResult<()> {
        let url = format!("{}/task/{}/field/{}", self.config.base_url, task_id, field_id);
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.config.api_token)
            .json(&json!({ "value": value }))
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }
}
