//! CRM REST client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use tasklink_connector::error::{ConnectorError, ConnectorResult};
use tasklink_connector::traits::SourceSystem;
use tasklink_connector::types::{DirectoryUser, PropertyVersion};
use tasklink_core::mapping::tracked_crm_properties;
use tasklink_core::types::{SourceObject, SourceObjectType};

use crate::config::CrmConfig;

/// REST adapter for the CRM source system.
#[derive(Debug)]
pub struct CrmClient {
    config: CrmConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ObjectEnvelope {
    id: String,
    #[serde(default)]
    properties: HashMap<String, Option<String>>,
    #[serde(default)]
    associations: Associations,
}

#[derive(Debug, Default, Deserialize)]
struct Associations {
    #[serde(default)]
    companies: AssociationResults,
}

#[derive(Debug, Default, Deserialize)]
struct AssociationResults {
    #[serde(default)]
    results: Vec<AssociationRef>,
}

#[derive(Debug, Deserialize)]
struct AssociationRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct HistoryEnvelope {
    #[serde(default, rename = "propertiesWithHistory")]
    properties_with_history: HashMap<String, Vec<PropertyVersion>>,
}

#[derive(Debug, Deserialize)]
struct OwnerList {
    #[serde(default)]
    results: Vec<DirectoryUser>,
}

impl CrmClient {
    /// Build a client from a validated configuration.
    pub fn new(config: CrmConfig) -> ConnectorResult<Self> {
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

    fn object_path(object_type: SourceObjectType) -> &'static str {
        match object_type {
            SourceObjectType::Task => "tasks",
            SourceObjectType::Ticket => "tickets",
        }
    }

    fn http_error(&self, err: reqwest::Error) -> ConnectorError {
        if err.is_timeout() {
            ConnectorError::ConnectionTimeout {
                timeout_secs: self.config.read_timeout_secs,
            }
        } else if err.is_connect() {
            ConnectorError::connection_failed(err.to_string())
        } else {
            ConnectorError::network_with_source("CRM request failed", err)
        }
    }

    async fn api_error(response: Response) -> ConnectorError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        ConnectorError::api(status, body)
    }

    async fn fetch_owners(&self) -> ConnectorResult<Vec<DirectoryUser>> {
        let url = format!("{}/owners", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        let list: OwnerList = response
            .json()
            .await
            .map_err(|e| ConnectorError::invalid_data(format!("owners payload: {e}")))?;
        Ok(list.results)
    }
}

#[async_trait]
impl SourceSystem for CrmClient {
    #[instrument(skip(self), fields(object_type = %object_type))]
    async fn fetch_object(
        &self,
        object_id: &str,
        object_type: SourceObjectType,
    ) -> ConnectorResult<Option<SourceObject>> {
        let url = format!(
            "{}/objects/{}/{}",
            self.config.base_url,
            Self::object_path(object_type),
            object_id
        );
        let properties = tracked_crm_properties(object_type).join(",");
        let response = self
            .client
            .get(&url)
            .query(&[("properties", properties.as_str()), ("associations", "companies")])
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(object_id, "object not found in CRM");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let envelope: ObjectEnvelope = response
            .json()
            .await
            .map_err(|e| ConnectorError::invalid_data(format!("object payload: {e}")))?;

        let company_id = envelope
            .associations
            .companies
            .results
            .first()
            .map(|r| r.id.clone());
        Ok(Some(SourceObject {
            id: envelope.id,
            properties: envelope
                .properties
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
            company_id,
        }))
    }

    #[instrument(skip(self, value), fields(object_type = %object_type))]
    async fn update_object_field(
        &self,
        object_id: &str,
        object_type: SourceObjectType,
        property: &str,
        value: &serde_json::Value,
    ) -> ConnectorResult<()> {
        let url = format!(
            "{}/objects/{}/{}",
            self.config.base_url,
            Self::object_path(object_type),
            object_id
        );
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.config.api_token)
            .json(&json!({ "properties": { property: value } }))
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        debug!(object_id, property, "CRM property updated");
        Ok(())
    }

    async fn fetch_property_history(
        &self,
        object_id: &str,
        object_type: SourceObjectType,
        property: &str,
    ) -> ConnectorResult<Vec<PropertyVersion>> {
        let url = format!(
            "{}/objects/{}/{}",
            self.config.base_url,
            Self::object_path(object_type),
            object_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[("propertiesWithHistory", property), ("archived", "false")])
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let envelope: HistoryEnvelope = response
            .json()
            .await
            .map_err(|e| ConnectorError::invalid_data(format!("history payload: {e}")))?;
        Ok(envelope
            .properties_with_history
            .get(property)
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve_email_by_owner_id(&self, owner_id: &str) -> ConnectorResult<Option<String>> {
        let owners = self.fetch_owners().await?;
        let email = owners
            .into_iter()
            .find(|owner| owner.id == owner_id)
            .and_then(|owner| owner.email);
        if email.is_none() {
            warn!(owner_id, "CRM owner has no resolvable email");
        }
        Ok(email)
    }

    async fn resolve_owner_id_by_email(&self, email: &str) -> ConnectorResult<Option<String>> {
        let owners = self.fetch_owners().await?;
        Ok(owners
            .into_iter()
            .find(|owner| {
                owner
                    .email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .map(|owner| owner.id))
    }

    async fn fetch_company_name(&self, company_id: &str) -> ConnectorResult<Option<String>> {
        let url = format!("{}/objects/companies/{}", self.config.base_url, company_id);
        let response = self
            .client
            .get(&url)
            .query(&[("properties", "name")])
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let envelope: ObjectEnvelope = response
            .json()
            .await
            .map_err(|e| ConnectorError::invalid_data(format!("company payload: {e}")))?;
        Ok(envelope.properties.get("name").cloned().flatten())
    }

    fn record_url(&self, object_id: &str, object_type: SourceObjectType) -> String {
        format!(
            "{}/record/{}/{}",
            self.config.portal_url,
            object_type.as_str(),
            object_id
        )
    }
}
