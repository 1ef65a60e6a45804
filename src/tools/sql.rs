//! SQL warehouse tool backed by a statements REST API.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ToolError, ToolHandler};

/// Character budget for inlined CSV result sets.
const MAX_CSV_CHARS: usize = 2_000;

/// Connection settings for the warehouse SQL REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Base URL of the warehouse API
    pub base_url: String,
    /// Bearer token for authentication
    #[serde(default)]
    pub token: String,
    /// Role to assume for statement execution
    #[serde(default)]
    pub role: Option<String>,
    /// Compute warehouse to run on
    #[serde(default)]
    pub warehouse: Option<String>,
    /// Server-side statement timeout in seconds
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

fn default_statement_timeout() -> u64 {
    300
}

/// Executes one SQL statement per invocation against the warehouse.
///
/// Arguments: `sql` (required), `database` (optional, overrides the task
/// default). Result rows come back as CSV inside a fenced block, truncated
/// to [`MAX_CSV_CHARS`] with the full size noted.
pub struct SqlTool {
    config: Arc<WarehouseConfig>,
    client: Client,
    default_database: Option<String>,
}

#[derive(Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Deserialize, Debug)]
struct StatementResponse {
    #[serde(rename = "resultSetMetaData")]
    metadata: Option<ResultSetMetaData>,
    data: Option<Vec<Vec<Option<String>>>>,
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ResultSetMetaData {
    #[serde(rename = "rowType")]
    row_type: Vec<ColumnType>,
}

#[derive(Deserialize, Debug)]
struct ColumnType {
    name: String,
}

impl SqlTool {
    pub fn new(config: WarehouseConfig, default_database: Option<String>) -> Self {
        Self::with_client(Client::new(), config, default_database)
    }

    /// Creates the tool with a custom HTTP client.
    pub fn with_client(
        client: Client,
        config: WarehouseConfig,
        default_database: Option<String>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            default_database,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v2/statements",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn execute_statement(
        &self,
        sql: &str,
        database: Option<&str>,
    ) -> Result<String, ToolError> {
        log::info!("executing SQL statement: {sql}");

        let body = StatementRequest {
            statement: sql,
            timeout: self.config.statement_timeout_secs,
            database,
            warehouse: self.config.warehouse.as_deref(),
            role: self.config.role.as_deref(),
        };

        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("warehouse request failed: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ToolError::Execution(format!("warehouse response unreadable: {e}")))?;

        let parsed: StatementResponse = serde_json::from_str(&text).map_err(|e| {
            ToolError::Execution(format!("warehouse response was not JSON: {e}"))
        })?;

        if !status.is_success() {
            let message = parsed
                .message
                .unwrap_or_else(|| format!("warehouse returned HTTP {status}"));
            return Ok(format!("SQL Error: {message}"));
        }

        Ok(render_result(parsed))
    }
}

fn render_result(resp: StatementResponse) -> String {
    let Some(metadata) = resp.metadata else {
        // Statements without a result set (DDL, DML) just acknowledge.
        return "Query executed successfully.".to_string();
    };
    let rows = resp.data.unwrap_or_default();
    if rows.is_empty() {
        return "Query executed successfully, but no rows returned.".to_string();
    }

    let headers: Vec<&str> = metadata.row_type.iter().map(|c| c.name.as_str()).collect();
    let total_rows = rows.len();
    let csv = to_csv(&headers, &rows);

    if csv.chars().count() > MAX_CSV_CHARS {
        let cut: String = csv.chars().take(MAX_CSV_CHARS).collect();
        let kept = match cut.rfind('\n') {
            Some(pos) if pos > 0 => &cut[..pos],
            _ => cut.as_str(),
        };
        format!(
            "Query executed successfully\n\n```csv\n{kept}\n```\n\nNote: The result has been \
             truncated to {MAX_CSV_CHARS} characters for display purposes. The complete result \
             set contains {total_rows} rows and {} characters.",
            csv.chars().count()
        )
    } else {
        format!("Query executed successfully\n\n```csv\n{csv}```")
    }
}

fn to_csv(headers: &[&str], rows: &[Vec<Option<String>>]) -> String {
    let mut out = String::new();
    out.push_str(&headers.iter().map(|h| csv_field(h)).collect::<Vec<_>>().join(","));
    out.push('\n');
    for row in rows {
        let line = row
            .iter()
            .map(|cell| csv_field(cell.as_deref().unwrap_or("")))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[async_trait]
impl ToolHandler for SqlTool {
    fn name(&self) -> &str {
        "execute_sql"
    }

    fn description(&self) -> &str {
        "Execute one SQL statement against the task's warehouse database and \
         return the result rows as CSV."
    }

    async fn run(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let sql = arguments
            .get("sql")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("missing 'sql'".to_string()))?;
        let database = arguments
            .get("database")
            .and_then(Value::as_str)
            .or(self.default_database.as_deref());

        self.execute_statement(sql, database).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(base_url: String) -> SqlTool {
        SqlTool::new(
            WarehouseConfig {
                base_url,
                token: "t".to_string(),
                role: None,
                warehouse: Some("COMPUTE".to_string()),
                statement_timeout_secs: 30,
            },
            Some("SALES".to_string()),
        )
    }

    fn args(sql: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("sql".to_string(), sql.into());
        map
    }

    #[tokio::test]
    async fn result_rows_are_rendered_as_csv() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/statements")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"resultSetMetaData":{"rowType":[{"name":"CITY"},{"name":"ORDERS"}]},
                    "data":[["Paris","12"],["Lyon",null]]}"#,
            )
            .create_async()
            .await;

        let out = tool(server.url()).run(&args("SELECT 1")).await.unwrap();
        assert!(out.starts_with("Query executed successfully"));
        assert!(out.contains("CITY,ORDERS"));
        assert!(out.contains("Paris,12"));
        assert!(out.contains("Lyon,"));
    }

    #[tokio::test]
    async fn backend_rejection_is_reported_as_sql_error_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v2/statements")
            .with_status(422)
            .with_body(r#"{"message":"SQL compilation error: invalid identifier 'FOO'"}"#)
            .create_async()
            .await;

        let out = tool(server.url()).run(&args("SELECT foo")).await.unwrap();
        assert!(out.starts_with("SQL Error:"));
        assert!(out.contains("invalid identifier"));
    }

    #[tokio::test]
    async fn missing_sql_argument_is_invalid() {
        let err = tool("http://localhost:1".to_string())
            .run(&Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }

    #[test]
    fn csv_fields_are_escaped() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn oversized_result_sets_are_truncated_with_a_note() {
        let rows: Vec<Vec<Option<String>>> = (0..500)
            .map(|i| vec![Some(format!("value-{i}")), Some("x".repeat(20))])
            .collect();
        let resp = StatementResponse {
            metadata: Some(ResultSetMetaData {
                row_type: vec![
                    ColumnType {
                        name: "A".to_string(),
                    },
                    ColumnType {
                        name: "B".to_string(),
                    },
                ],
            }),
            data: Some(rows),
            message: None,
        };
        let out = render_result(resp);
        assert!(out.contains("truncated to 2000 characters"));
        assert!(out.contains("500 rows"));
    }
}
