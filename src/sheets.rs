use reqwest::{StatusCode, Url};
use serde_json::{json, Value};
use yup_oauth2::authenticator::DefaultAuthenticator;

use crate::config::SheetConfig;
use crate::error::SheetsError;
use crate::quiz::scoring::ResultRecord;

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets/";
const SCOPES: [&str; 1] = ["https://www.googleapis.com/auth/spreadsheets"];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const HEADER: [&str; 13] = [
    "timestamp",
    "name",
    "email",
    "verbal_correct",
    "verbal_total",
    "nonverbal_correct",
    "nonverbal_total",
    "total_correct",
    "total_questions",
    "total_pct",
    "t_score",
    "answers_verbal",
    "answers_nonverbal",
];

/// Header names that hold the total percentage in sheets written by hand or by older versions.
const PERCENT_HEADERS: [&str; 4] = ["total_pct", "総合%", "total_pct (%)", "total_pct_pct"];

/// Where finished attempts go. `Offline` keeps the bot usable without a spreadsheet.
pub enum Recorder {
    Sheet(SheetClient),
    Offline { reason: String },
}

impl Recorder {
    pub async fn from_config(config: &SheetConfig) -> Self {
        match SheetClient::connect(config).await {
            Ok(client) => Recorder::Sheet(client),
            Err(e) => {
                log::warn!("Results will not be recorded: {}", e);
                Recorder::Offline {
                    reason: e.to_string(),
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Recorder::Sheet(_))
    }

    /// Past total percentages. Never fails: any problem yields an empty history.
    pub async fn history(&self) -> Vec<f64> {
        let client = match self {
            Recorder::Sheet(client) => client,
            Recorder::Offline { .. } => return Vec::new(),
        };
        match client.fetch_rows().await {
            Ok(rows) => {
                let history = percentage_column(&rows);
                log::debug!("Fetched {} rows, {} usable percentages", rows.len(), history.len());
                history
            }
            Err(e) => {
                log::warn!("Could not read history: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn append(&self, record: &ResultRecord) -> Result<(), SheetsError> {
        match self {
            Recorder::Sheet(client) => client.append_row(record_row(record)).await,
            Recorder::Offline { reason } => Err(SheetsError::NotConfigured(reason.clone())),
        }
    }

    /// Writes [`HEADER`] into an empty sheet so history can find `total_pct` by name.
    pub async fn ensure_header(&self) -> Result<(), SheetsError> {
        let Recorder::Sheet(client) = self else {
            return Ok(());
        };
        if client.fetch_rows().await?.is_empty() {
            log::info!("Sheet is empty, writing header row");
            client
                .append_row(HEADER.iter().map(|h| json!(h)).collect())
                .await?;
        }
        Ok(())
    }
}

pub struct SheetClient {
    http: reqwest::Client,
    api_base: Url,
    spreadsheet_id: String,
    range: String,
    credentials: Credentials,
}

enum Credentials {
    /// Mints and caches short-lived tokens from a service-account key.
    ServiceAccount(DefaultAuthenticator),
    /// Used as-is until Google expires it.
    Token(String),
}

impl Credentials {
    async fn load(config: &SheetConfig) -> Result<Self, SheetsError> {
        if let Some(path) = &config.credentials_path {
            let key = yup_oauth2::read_service_account_key(path).await.map_err(|e| {
                SheetsError::NotConfigured(format!("cannot read service-account key {}: {}", path, e))
            })?;
            let auth = yup_oauth2::ServiceAccountAuthenticator::builder(key)
                .build()
                .await
                .map_err(|e| SheetsError::NotConfigured(format!("cannot set up service account: {}", e)))?;
            log::info!("Using service-account credentials from {}", path);
            return Ok(Credentials::ServiceAccount(auth));
        }
        match &config.access_token {
            Some(token) => {
                log::warn!("Using a fixed GOOGLE_SHEETS_TOKEN; it stops working when it expires");
                Ok(Credentials::Token(token.clone()))
            }
            None => Err(SheetsError::NotConfigured(
                "neither GOOGLE_APPLICATION_CREDENTIALS nor GOOGLE_SHEETS_TOKEN is set".to_string(),
            )),
        }
    }

    /// A bearer token valid for the next request.
    async fn bearer(&self) -> Result<String, SheetsError> {
        match self {
            Credentials::Token(token) => Ok(token.clone()),
            Credentials::ServiceAccount(auth) => {
                let token = auth
                    .token(&SCOPES)
                    .await
                    .map_err(|e| SheetsError::Unauthorized(format!("token exchange failed: {}", e)))?;
                token
                    .token()
                    .map(str::to_string)
                    .ok_or_else(|| SheetsError::Unauthorized("token exchange returned no access token".to_string()))
            }
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl SheetClient {
    pub async fn connect(config: &SheetConfig) -> Result<Self, SheetsError> {
        let spreadsheet_id = config
            .spreadsheet_id
            .clone()
            .ok_or_else(|| SheetsError::NotConfigured("SPI_SHEET_ID is not set".to_string()))?;
        let credentials = Credentials::load(config).await?;

        let client = Self {
            http: reqwest::Client::new(),
            api_base: Url::parse(API_BASE).map_err(|_| SheetsError::BadUrl)?,
            spreadsheet_id,
            range: config.range.clone(),
            credentials,
        };
        client.values_url("")?;
        Ok(client)
    }

    fn values_url(&self, suffix: &str) -> Result<Url, SheetsError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| SheetsError::BadUrl)?
            .pop_if_empty()
            .push(&self.spreadsheet_id)
            .push("values")
            .push(&format!("{}{}", self.range, suffix));
        Ok(url)
    }

    pub async fn fetch_rows(&self) -> Result<Vec<Vec<String>>, SheetsError> {
        let response = self
            .http
            .get(self.values_url("")?)
            .bearer_auth(self.credentials.bearer().await?)
            .send()
            .await?;
        let body: ValueRange = check(response).await?.json().await?;

        Ok(body
            .values
            .into_iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    pub async fn append_row(&self, row: Vec<Value>) -> Result<(), SheetsError> {
        let response = self
            .http
            .post(self.values_url(":append")?)
            .bearer_auth(self.credentials.bearer().await?)
            .query(&[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [row] }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, SheetsError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SheetsError::Unauthorized(format!("HTTP {}", status.as_u16())));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(SheetsError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// The row appended for one finished attempt, in [`HEADER`] order.
pub fn record_row(record: &ResultRecord) -> Vec<Value> {
    vec![
        json!(record.timestamp.format(TIMESTAMP_FORMAT).to_string()),
        json!(record.name),
        json!(record.email),
        json!(record.verbal.correct),
        json!(record.verbal.total),
        json!(record.nonverbal.correct),
        json!(record.nonverbal.total),
        json!(record.total_correct),
        json!(record.total_questions),
        json!(round1(record.total_pct)),
        json!(round1(record.standard_score)),
        json!(record.verbal_answers),
        json!(record.nonverbal_answers),
    ]
}

/// Finds the total-percentage column of a sheet whose first row is the header.
///
/// A known header name wins. Otherwise columns are scanned right to left for
/// the first one whose numeric cells exist and all lie in `[0, 100]`.
/// Non-numeric cells are ignored.
pub fn percentage_column(rows: &[Vec<String>]) -> Vec<f64> {
    let Some((header, records)) = rows.split_first() else {
        return Vec::new();
    };

    let by_name = PERCENT_HEADERS
        .iter()
        .find_map(|name| header.iter().position(|h| h.trim() == *name));
    if let Some(col) = by_name {
        return numeric_cells(records, col);
    }

    (0..header.len())
        .rev()
        .map(|col| numeric_cells(records, col))
        .find(|values| !values.is_empty() && values.iter().all(|v| (0.0..=100.0).contains(v)))
        .unwrap_or_default()
}

fn numeric_cells(records: &[Vec<String>], col: usize) -> Vec<f64> {
    records
        .iter()
        .filter_map(|row| row.get(col))
        .filter_map(|cell| cell.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::scoring::{CategoryScore, ReferenceSource};
    use chrono::NaiveDate;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    fn record() -> ResultRecord {
        ResultRecord {
            timestamp: NaiveDate::from_ymd_opt(2025, 4, 1)
                .and_then(|d| d.and_hms_opt(9, 5, 7))
                .unwrap(),
            name: "Taro".to_string(),
            email: String::new(),
            verbal: CategoryScore { correct: 35, total: 35 },
            nonverbal: CategoryScore { correct: 0, total: 35 },
            total_correct: 35,
            total_questions: 70,
            total_pct: 50.0,
            standard_score: 41.66666,
            reference_source: ReferenceSource::Synthetic,
            reference_points: 0,
            timed_out: false,
            verbal_answers: "1;2;3".to_string(),
            nonverbal_answers: ";;".to_string(),
        }
    }

    #[test]
    fn test_record_row_layout() {
        let row = record_row(&record());
        assert_eq!(row.len(), HEADER.len());
        assert_eq!(row[0], json!("2025-04-01 09:05:07"));
        assert_eq!(row[1], json!("Taro"));
        assert_eq!(row[2], json!(""));
        assert_eq!(row[3], json!(35));
        assert_eq!(row[8], json!(70));
        assert_eq!(row[9], json!(50.0));
        assert_eq!(row[10], json!(41.7));
        assert_eq!(row[12], json!(";;"));
    }

    #[test]
    fn test_column_found_by_name() {
        let sheet = rows(&[
            &["timestamp", "name", "total_pct", "t_score"],
            &["2025-04-01 09:00:00", "A", "55.7", "48.2"],
            &["2025-04-01 10:00:00", "B", "", "51.0"],
            &["2025-04-01 11:00:00", "C", "71.4", "60.3"],
        ]);
        assert_eq!(percentage_column(&sheet), vec![55.7, 71.4]);
    }

    #[test]
    fn test_japanese_header_is_known() {
        let sheet = rows(&[&["氏名", "総合%"], &["A", "40"], &["B", "120"]]);
        assert_eq!(percentage_column(&sheet), vec![40.0, 120.0]);
    }

    #[test]
    fn test_heuristic_scans_right_to_left() {
        let sheet = rows(&[
            &["when", "who", "score", "pct", "answers"],
            &["2025-04-01", "A", "250", "62.5", "1;2"],
            &["2025-04-02", "B", "300", "80", "3;4"],
        ]);
        assert_eq!(percentage_column(&sheet), vec![62.5, 80.0]);
    }

    #[test]
    fn test_heuristic_skips_out_of_range_columns() {
        let sheet = rows(&[&["a", "b"], &["50", "150"], &["60", "20"]]);
        assert_eq!(percentage_column(&sheet), vec![50.0, 60.0]);
    }

    #[test]
    fn test_nothing_usable_is_empty() {
        assert!(percentage_column(&[]).is_empty());
        assert!(percentage_column(&rows(&[&["total_pct"]])).is_empty());
        assert!(percentage_column(&rows(&[&["name"], &["Taro"]])).is_empty());
    }

    fn sheet_config(credentials_path: Option<&str>, access_token: Option<&str>) -> SheetConfig {
        SheetConfig {
            spreadsheet_id: Some("abc".to_string()),
            range: "Sheet1".to_string(),
            credentials_path: credentials_path.map(str::to_string),
            access_token: access_token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_go_offline() {
        let config = sheet_config(None, None);
        let err = SheetClient::connect(&config).await.err().unwrap();
        assert!(matches!(err, SheetsError::NotConfigured(_)));
        assert!(err.is_auth());

        let recorder = Recorder::from_config(&config).await;
        assert!(!recorder.is_connected());
    }

    #[tokio::test]
    async fn test_unreadable_key_is_not_configured() {
        let config = sheet_config(Some("/nonexistent/spi-service-account.json"), Some("token"));
        let err = SheetClient::connect(&config).await.err().unwrap();
        assert!(matches!(err, SheetsError::NotConfigured(_)), "{}", err);
        assert!(!Recorder::from_config(&config).await.is_connected());
    }

    #[tokio::test]
    async fn test_offline_recorder_degrades() {
        let recorder = Recorder::Offline {
            reason: "SPI_SHEET_ID is not set".to_string(),
        };
        assert!(recorder.history().await.is_empty());
        assert!(recorder.ensure_header().await.is_ok());

        let err = recorder.append(&record()).await.unwrap_err();
        assert!(err.is_auth(), "{}", err);
    }

    #[tokio::test]
    async fn test_unreachable_sheet_degrades() {
        let mut client = SheetClient::connect(&sheet_config(None, Some("bad"))).await.unwrap();
        // Nothing listens on the discard port, so every request fails at the transport.
        client.api_base = Url::parse("http://127.0.0.1:9/v4/spreadsheets/").unwrap();
        let recorder = Recorder::Sheet(client);
        assert!(recorder.is_connected());

        assert!(recorder.history().await.is_empty());

        let err = recorder.append(&record()).await.unwrap_err();
        assert!(!err.is_auth(), "{}", err);
        assert!(recorder.ensure_header().await.is_err());
    }

    #[tokio::test]
    async fn test_values_url_encodes_range() {
        let config = SheetConfig {
            range: "結果 1".to_string(),
            ..sheet_config(None, Some("token"))
        };
        let client = SheetClient::connect(&config).await.unwrap();
        let url = client.values_url(":append").unwrap();
        assert!(url
            .as_str()
            .starts_with("https://sheets.googleapis.com/v4/spreadsheets/abc/values/"));
        assert!(url.as_str().ends_with("%201:append"));
    }
}
