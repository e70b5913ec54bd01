//! HTTP implementation of [`OmeApi`] on top of `reqwest`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use super::models::{
    Baseline, BaselinePayload, Collection, Device, DeviceComplianceReport, ExecutionHistory,
    ExecutionHistoryDetail, Job, SessionInfo, SessionRequest, Template,
};
use super::{Connector, OmeApi};
use crate::config::ProviderConfig;
use crate::error::OmeError;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
const SESSIONS: &str = "/api/SessionService/Sessions";
const DEVICES: &str = "/api/DeviceService/Devices";
const TEMPLATES: &str = "/api/TemplateService/Templates";
const BASELINES: &str = "/api/TemplateService/Baselines";
const REMOVE_BASELINE: &str = "/api/TemplateService/Actions/TemplateService.RemoveBaseline";
const JOBS: &str = "/api/JobService/Jobs";

/// Opens sessions against the configured appliance.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    config: ProviderConfig,
}

impl HttpConnector {
    /// Connector for `config`.
    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn open(&self) -> Result<Arc<dyn OmeApi>, OmeError> {
        let client = OmeClient::login(&self.config).await?;
        Ok(Arc::new(client))
    }
}

/// An authenticated OME API session.
pub struct OmeClient {
    http: Client,
    base_url: String,
    token: String,
    session_id: String,
    closed: AtomicBool,
}

impl std::fmt::Debug for OmeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OmeClient")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl OmeClient {
    /// Create an API session with the configured credentials.
    #[instrument(skip(config), fields(host = %config.host))]
    pub async fn login(config: &ProviderConfig) -> Result<Self, OmeError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(config.skipssl)
            .timeout(config.request_timeout())
            .build()?;
        let base_url = config.base_url();

        let request = SessionRequest {
            user_name: &config.username,
            password: &config.password,
            session_type: "API",
        };
        let response = http
            .post(format!("{base_url}{SESSIONS}"))
            .json(&request)
            .send()
            .await
            .map_err(|e| OmeError::AuthFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OmeError::AuthFailed(format!("status {status}: {body}")));
        }

        let token = response
            .headers()
            .get(AUTH_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| OmeError::AuthFailed("response carried no session token".into()))?;
        let info: SessionInfo = serde_json::from_str(&response.text().await?)?;

        debug!(session_id = %info.id, "session opened");
        Ok(Self {
            http,
            base_url,
            token,
            session_id: info.id,
            closed: AtomicBool::new(false),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send an authenticated request and return the body of a success
    /// response.
    async fn execute(&self, request: RequestBuilder) -> Result<String, OmeError> {
        let response = request.header(AUTH_TOKEN_HEADER, &self.token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OmeError::RequestFailed {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, OmeError> {
        let body = self.execute(request).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, OmeError> {
        self.send(self.http.get(self.url(path))).await
    }

    /// Collect every page of a collection, following `@odata.nextLink`.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: Option<String>,
    ) -> Result<Vec<T>, OmeError> {
        let mut request = self.http.get(self.url(path));
        if let Some(filter) = filter {
            request = request.query(&[("$filter", filter)]);
        }

        let mut items = Vec::new();
        loop {
            let page: Collection<T> = self.send(request).await?;
            items.extend(page.value);
            match page.next_link {
                Some(link) if !link.is_empty() => {
                    request = self.http.get(self.url(&link));
                },
                _ => return Ok(items),
            }
        }
    }
}

/// Quote a literal for an OData `$filter` expression.
fn odata_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn not_found_as_none<T>(result: Result<T, OmeError>) -> Result<Option<T>, OmeError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

#[async_trait]
impl OmeApi for OmeClient {
    async fn device(&self, id: i64) -> Result<Device, OmeError> {
        self.get(&format!("{DEVICES}({id})")).await
    }

    async fn devices_by_service_tag(&self, tag: &str) -> Result<Vec<Device>, OmeError> {
        let filter = format!("DeviceServiceTag eq {}", odata_literal(tag));
        self.get_all(DEVICES, Some(filter)).await
    }

    async fn template_by_id(&self, id: i64) -> Result<Option<Template>, OmeError> {
        not_found_as_none(self.get(&format!("{TEMPLATES}({id})")).await)
    }

    async fn template_by_name(&self, name: &str) -> Result<Option<Template>, OmeError> {
        let filter = format!("Name eq {}", odata_literal(name));
        let templates: Vec<Template> = self.get_all(TEMPLATES, Some(filter)).await?;
        Ok(templates.into_iter().find(|t| t.name == name))
    }

    #[instrument(skip(self, payload), fields(name = %payload.name))]
    async fn create_baseline(&self, payload: &BaselinePayload) -> Result<Baseline, OmeError> {
        self.send(self.http.post(self.url(BASELINES)).json(payload))
            .await
    }

    #[instrument(skip(self, payload))]
    async fn update_baseline(
        &self,
        id: i64,
        payload: &BaselinePayload,
    ) -> Result<Baseline, OmeError> {
        let url = self.url(&format!("{BASELINES}({id})"));
        self.send(self.http.put(url).json(payload)).await
    }

    #[instrument(skip(self))]
    async fn delete_baselines(&self, ids: &[i64]) -> Result<(), OmeError> {
        let body = json!({ "BaselineIds": ids });
        self.execute(self.http.post(self.url(REMOVE_BASELINE)).json(&body))
            .await
            .map(|_| ())
    }

    async fn baseline(&self, id: i64) -> Result<Baseline, OmeError> {
        self.get(&format!("{BASELINES}({id})")).await
    }

    async fn baseline_by_name(&self, name: &str) -> Result<Option<Baseline>, OmeError> {
        let baselines: Vec<Baseline> = self.get_all(BASELINES, None).await?;
        Ok(baselines.into_iter().find(|b| b.name == name))
    }

    async fn job(&self, id: i64) -> Result<Job, OmeError> {
        self.get(&format!("{JOBS}({id})")).await
    }

    async fn execution_histories(&self, job_id: i64) -> Result<Vec<ExecutionHistory>, OmeError> {
        self.get_all(&format!("{JOBS}({job_id})/ExecutionHistories"), None)
            .await
    }

    async fn execution_history_details(
        &self,
        job_id: i64,
        history_id: i64,
    ) -> Result<Vec<ExecutionHistoryDetail>, OmeError> {
        let path = format!(
            "{JOBS}({job_id})/ExecutionHistories({history_id})/ExecutionHistoryDetails"
        );
        self.get_all(&path, None).await
    }

    async fn compliance_reports(
        &self,
        baseline_id: i64,
    ) -> Result<Vec<DeviceComplianceReport>, OmeError> {
        let path = format!("{BASELINES}({baseline_id})/DeviceConfigComplianceReports");
        self.get_all(&path, None).await
    }

    async fn device_compliance_details(
        &self,
        baseline_id: i64,
        device_id: i64,
    ) -> Result<serde_json::Value, OmeError> {
        let path = format!(
            "{BASELINES}({baseline_id})/DeviceConfigComplianceReports({device_id})/DeviceComplianceDetails"
        );
        self.get(&path).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let url = self.url(&format!("{SESSIONS}('{}')", self.session_id));
        match self.execute(self.http.delete(url)).await {
            Ok(_) => debug!(session_id = %self.session_id, "session closed"),
            Err(err) => debug!(session_id = %self.session_id, error = %err, "session close failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odata_literal_escapes_quotes() {
        assert_eq!(odata_literal("SVC1"), "'SVC1'");
        assert_eq!(odata_literal("O'Brien tpl"), "'O''Brien tpl'");
    }

    #[test]
    fn test_not_found_as_none() {
        let missing: Result<Template, OmeError> = Err(OmeError::RequestFailed {
            status: 404,
            body: String::new(),
        });
        assert!(not_found_as_none(missing).unwrap().is_none());

        let failed: Result<Template, OmeError> = Err(OmeError::RequestFailed {
            status: 500,
            body: "boom".into(),
        });
        assert!(not_found_as_none(failed).is_err());

        let found: Result<Template, OmeError> = Ok(Template::default());
        assert!(not_found_as_none(found).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_login_reports_unreachable_host_as_auth_failure() {
        let config = ProviderConfig {
            host: "127.0.0.1".into(),
            port: 1,
            protocol: "http".into(),
            username: "admin".into(),
            password: "pw".into(),
            timeout: 2,
            ..ProviderConfig::default()
        };
        let err = OmeClient::login(&config).await.unwrap_err();
        assert!(matches!(err, OmeError::AuthFailed(_)));
    }
}
