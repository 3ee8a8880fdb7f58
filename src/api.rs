// API client module: a small blocking HTTP client for the Kualitee v2 API.
// Everything is synchronous: one request is in flight at a time and each
// call either completes or fails after `REQUEST_TIMEOUT`.

use crate::config::Config;
use crate::error::ApiError;
use crate::logging::{mask_token, truncate_for_log, MAX_LOGGED_BODY};
use crate::models::{
    value_to_string, Cycle, DefectDetails, DefectUpdate, TestCase, TestCycleUpdate,
};
use anyhow::{Context, Result};
use reqwest::blocking::{multipart, Client};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://apiss3.kualitee.com/api/v2";
pub const BASE_URL_ENV: &str = "KUALITEE_API_URL";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Multipart field the service reads uploaded files from.
pub const ATTACHMENT_FIELD: &str = "attachment[]";

/// Page size used when listing test cases of a cycle.
const TEST_CASE_PAGE: u32 = 2000;

/// Request body for `ApiClient::send`.
#[derive(Debug, Clone)]
pub enum Payload {
    Empty,
    Json(Value),
    /// Query string on GET, urlencoded body otherwise.
    Form(BTreeMap<String, String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(v) => Some(v),
            ResponseBody::Text(_) => None,
        }
    }

    pub fn text(&self) -> String {
        match &self.body {
            ResponseBody::Json(v) => v.to_string(),
            ResponseBody::Text(t) => t.clone(),
        }
    }

    fn into_json(self) -> Result<Value, ApiError> {
        match self.body {
            ResponseBody::Json(v) => Ok(v),
            ResponseBody::Text(t) => Err(ApiError::Decode(format!(
                "expected JSON, got: {}",
                truncate_for_log(&t, 200)
            ))),
        }
    }
}

/// Operations the interactive modules need from the service.
pub trait KualiteeApi {
    fn list_cycles(&self) -> Result<Vec<Cycle>, ApiError>;

    fn list_test_cases(&self, cycle_id: &str) -> Result<Vec<TestCase>, ApiError>;

    /// Record a result for a test case; returns the new execution id.
    fn execute_test(&self, update: &TestCycleUpdate) -> Result<String, ApiError>;

    fn upload_attachment(
        &self,
        update: &TestCycleUpdate,
        execution_id: &str,
        path: &Path,
    ) -> Result<(), ApiError>;

    fn defect_details(&self, defect_id: &str) -> Result<DefectDetails, ApiError>;

    /// Send `update` merged over the defect's `current` record.
    fn update_defect(&self, update: &DefectUpdate, current: &DefectDetails) -> Result<(), ApiError>;
}

/// Blocking client bound to one project. Holds the reqwest client (with a
/// cookie store, so the session persists across calls), the base URL and
/// the loaded configuration.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    config: Config,
}

impl ApiClient {
    /// Create a client for `config`, using `KUALITEE_API_URL` when set or
    /// the public Kualitee host otherwise.
    pub fn from_config(config: &Config) -> Result<Self> {
        let base_url = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        Self::with_base_url(config, base_url)
    }

    pub fn with_base_url(config: &Config, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config: config.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one call against `endpoint` (relative to the base URL).
    ///
    /// The token goes in a bearer `Authorization` header. With an
    /// attachment the payload fields are sent as multipart text parts next
    /// to the file. Any status outside 200..=299 becomes
    /// `ApiError::Status` carrying the code unchanged.
    pub fn send(
        &self,
        method: Method,
        endpoint: &str,
        payload: &Payload,
        attachment: Option<&Path>,
    ) -> Result<ApiResponse, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        self.log_request(&method, endpoint, payload, attachment);

        let mut req = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.config.token);
        req = match (attachment, payload) {
            (Some(path), _) => req.multipart(multipart_form(payload, path)?),
            (None, Payload::Json(v)) => req.json(v),
            (None, Payload::Form(fields)) if method == Method::GET => req.query(fields),
            (None, Payload::Form(fields)) => req.form(fields),
            (None, Payload::Empty) => req,
        };

        let started = Instant::now();
        let res = req.send().map_err(|e| {
            let e = ApiError::from(e);
            error!("API request failed: {}", e);
            e
        })?;
        let status = res.status().as_u16();
        let text = res.text()?;
        info!("Response: {} ({:.2}s)", status, started.elapsed().as_secs_f64());
        debug!("Response body: {}", truncate_for_log(&text, MAX_LOGGED_BODY));

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(v) => ResponseBody::Json(v),
            Err(_) => ResponseBody::Text(text),
        };
        let response = ApiResponse { status, body };
        if !response.is_success() {
            let body = response.text();
            error!("Error response: {}", truncate_for_log(&body, MAX_LOGGED_BODY));
            return Err(ApiError::Status { status, body });
        }
        Ok(response)
    }

    /// JSON body with the credentials every endpoint expects.
    fn json_with_auth(&self, extra: Value) -> Payload {
        let mut body = json!({
            "token": self.config.token,
            "project_id": self.config.project_id,
        });
        if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), extra) {
            obj.extend(extra);
        }
        Payload::Json(body)
    }

    fn form_with_auth(&self, mut fields: BTreeMap<String, String>) -> Payload {
        fields.insert("token".into(), self.config.token.clone());
        fields.insert("project_id".into(), self.config.project_id.to_string());
        Payload::Form(fields)
    }

    fn post_json(&self, endpoint: &str, extra: Value) -> Result<Value, ApiError> {
        let payload = self.json_with_auth(extra);
        let value = self.send(Method::POST, endpoint, &payload, None)?.into_json()?;
        ensure_accepted(&value)?;
        Ok(value)
    }

    fn log_request(
        &self,
        method: &Method,
        endpoint: &str,
        payload: &Payload,
        attachment: Option<&Path>,
    ) {
        info!("[API] {} {}", method, endpoint);
        let masked = mask_token(&self.config.token);
        match payload {
            Payload::Empty => {}
            Payload::Json(v) => {
                let mut v = v.clone();
                if let Some(t) = v.get_mut("token") {
                    *t = Value::String(masked);
                }
                debug!("Request: {}", v);
            }
            Payload::Form(fields) => {
                let mut fields = fields.clone();
                if let Some(t) = fields.get_mut("token") {
                    *t = masked;
                }
                debug!("Request: {:?}", fields);
            }
        }
        if let Some(path) = attachment {
            debug!("Attachment: {}", path.display());
        }
    }
}

impl KualiteeApi for ApiClient {
    fn list_cycles(&self) -> Result<Vec<Cycle>, ApiError> {
        let value = self.post_json("/cycle/list", json!({}))?;
        let cycles: Vec<Cycle> = data_array(&value, "cycles")?;
        info!("Retrieved {} cycles", cycles.len());
        Ok(cycles)
    }

    fn list_test_cases(&self, cycle_id: &str) -> Result<Vec<TestCase>, ApiError> {
        let value = self.post_json(
            "/test_case_execution/list",
            json!({ "cycle_id": cycle_id, "length": TEST_CASE_PAGE }),
        )?;
        let cases: Vec<TestCase> = data_array(&value, "test cases")?;
        info!("Retrieved {} test cases for cycle {}", cases.len(), cycle_id);
        Ok(cases)
    }

    fn execute_test(&self, update: &TestCycleUpdate) -> Result<String, ApiError> {
        let value = self.post_json(
            "/test_case_execution/execute",
            json!({
                "cycle_id": update.cycle_id,
                "build_id": update.build_id,
                "tc_id": update.tc_id,
                "status": update.status.as_str(),
                "execute": "yes",
                "testscenario_id": update.testscenario_id,
            }),
        )?;
        let execution_id = value
            .get("executed_results")
            .and_then(|r| r.get(0))
            .and_then(|r| r.get("id"))
            .map(value_to_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Decode("no execution results in response".into()))?;
        info!("Test executed successfully. Execution ID: {}", execution_id);
        Ok(execution_id)
    }

    fn upload_attachment(
        &self,
        update: &TestCycleUpdate,
        execution_id: &str,
        path: &Path,
    ) -> Result<(), ApiError> {
        let fields: BTreeMap<String, String> = [
            ("cycle_id", update.cycle_id.as_str()),
            ("testcase_id", update.tc_id.as_str()),
            ("execution_id", execution_id),
            ("type", "tc"),
            ("sub_testcase_id", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let payload = self.form_with_auth(fields);
        let value = self
            .send(
                Method::POST,
                "/test_case_execution/execution_attachments",
                &payload,
                Some(path),
            )?
            .into_json()?;
        ensure_accepted(&value)?;
        info!("Attachment uploaded: {}", path.display());
        Ok(())
    }

    fn defect_details(&self, defect_id: &str) -> Result<DefectDetails, ApiError> {
        let mut query = BTreeMap::new();
        query.insert("defect_id".to_string(), defect_id.to_string());
        let payload = self.form_with_auth(query);
        let value = self
            .send(Method::GET, "/defects/details", &payload, None)?
            .into_json()?;
        ensure_accepted(&value)?;

        // Some deployments wrap the record in `data`, others return it bare.
        // A `data` that is not an object means there is no such defect.
        let record = match value {
            Value::Object(mut obj) => match obj.remove("data") {
                Some(Value::Object(inner)) => inner,
                Some(_) => Map::new(),
                None => obj,
            },
            other => {
                return Err(ApiError::Decode(format!(
                    "defect details is not an object: {}",
                    truncate_for_log(&other.to_string(), 200)
                )))
            }
        };
        if record.is_empty() {
            return Err(ApiError::Decode(format!("no defect found with ID {}", defect_id)));
        }
        info!("Retrieved details for defect {}", defect_id);
        Ok(DefectDetails(record))
    }

    fn update_defect(&self, update: &DefectUpdate, current: &DefectDetails) -> Result<(), ApiError> {
        let payload = self.form_with_auth(update.merge_over(current));
        let response = self.send(Method::POST, "/defects/update", &payload, None)?;
        if let Some(value) = response.json() {
            ensure_accepted(value)?;
        }
        info!("Updated defect {} with {:?}", update.defect_id, update.fields);
        Ok(())
    }
}

/// Build the multipart body: every payload field as a text part, then the
/// file under `ATTACHMENT_FIELD`. reqwest guesses the mime type from the
/// extension.
fn multipart_form(payload: &Payload, path: &Path) -> Result<multipart::Form, ApiError> {
    let mut form = multipart::Form::new();
    match payload {
        Payload::Empty => {}
        Payload::Json(Value::Object(obj)) => {
            for (k, v) in obj {
                form = form.text(k.clone(), value_to_string(v));
            }
        }
        Payload::Json(other) => {
            return Err(ApiError::Decode(format!(
                "multipart payload must be an object, got {}",
                other
            )))
        }
        Payload::Form(fields) => {
            for (k, v) in fields {
                form = form.text(k.clone(), v.clone());
            }
        }
    }
    form.file(ATTACHMENT_FIELD, path)
        .map_err(|source| ApiError::Attachment {
            path: path.to_path_buf(),
            source,
        })
}

/// The service answers some failures with 200 and `"status": false`.
fn ensure_accepted(value: &Value) -> Result<(), ApiError> {
    if value.get("status") == Some(&Value::Bool(false)) {
        let message = value
            .get("message")
            .map(value_to_string)
            .unwrap_or_else(|| "no message".into());
        return Err(ApiError::Rejected(message));
    }
    Ok(())
}

/// Deserialize the `data` array of a list response. A missing array is
/// treated as an empty list.
fn data_array<T: DeserializeOwned>(value: &Value, what: &str) -> Result<Vec<T>, ApiError> {
    match value.get("data") {
        Some(data @ Value::Array(_)) => serde_json::from_value(data.clone())
            .map_err(|e| ApiError::Decode(format!("parsing {}: {}", what, e))),
        _ => {
            warn!("No {} data in response", what);
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_range_is_2xx() {
        let mk = |status| ApiResponse {
            status,
            body: ResponseBody::Text(String::new()),
        };
        assert!(mk(200).is_success());
        assert!(mk(204).is_success());
        assert!(mk(299).is_success());
        assert!(!mk(199).is_success());
        assert!(!mk(300).is_success());
        assert!(!mk(404).is_success());
    }

    #[test]
    fn status_false_is_rejected() {
        let err = ensure_accepted(&json!({"status": false, "message": "Invalid token"}))
            .unwrap_err();
        assert!(matches!(err, ApiError::Rejected(m) if m == "Invalid token"));
        // A defect's own workflow status is a string and must not trip this.
        assert!(ensure_accepted(&json!({"status": "close"})).is_ok());
        assert!(ensure_accepted(&json!({"status": true})).is_ok());
    }

    #[test]
    fn missing_data_is_an_empty_list() {
        let cycles: Vec<Cycle> = data_array(&json!({"status": true}), "cycles").unwrap();
        assert!(cycles.is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let cfg = Config {
            token: "abc".into(),
            project_id: 1,
        };
        let api = ApiClient::with_base_url(&cfg, "http://localhost:9/api/").unwrap();
        assert_eq!(api.base_url(), "http://localhost:9/api");
    }
}
