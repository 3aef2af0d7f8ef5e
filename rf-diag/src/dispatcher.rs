//! Request dispatch
//!
//! Maps each RPC `type` onto the traffic handle, the log search engine or
//! the unified query. File scans run on the blocking pool.

use std::sync::Arc;

use rf_logs::{LogLevel, LogSearchEngine, SearchRequest};
use rf_protocol::{MessageFilter, Origin};
use rf_query::{UnifiedMessageQuery, UnifiedQueryRequest, DEFAULT_QUERY_LIMIT};
use rf_traffic::{BridgeEvent, EventBus, StatsWindow, TrafficHandle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::rpc::{ErrorCode, Request, Response, RpcError};
use crate::settings::SearchDefaults;

const DEFAULT_STATS_LIMIT: usize = 50;
const DEFAULT_MESSAGES_LIMIT: usize = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatsParams {
    filters: Option<Value>,
    window: StatsWindow,
    limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessagesParams {
    filters: Option<Value>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ListFilesParams {
    path_id: String,
}

#[derive(Debug, Deserialize)]
struct TailParams {
    file_id: String,
    max_lines: Option<usize>,
    max_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    file_id: String,
    include: Option<String>,
    exclude: Option<String>,
    #[serde(default)]
    case_sensitive: bool,
    level: Option<String>,
    logger: Option<String>,
    since_minutes: Option<u32>,
    tail_lines: Option<usize>,
    context_lines: Option<usize>,
    max_matches: Option<usize>,
    #[serde(default)]
    include_tracebacks: bool,
    max_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct UnifiedParams {
    sources: Vec<Origin>,
    filters: Option<Value>,
    dedupe: Option<bool>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EventParams {
    event_type: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Routes decoded requests to the subsystem that answers them
pub struct Dispatcher {
    bus: Arc<EventBus>,
    event_name: String,
    traffic: TrafficHandle,
    engine: Arc<LogSearchEngine>,
    query: UnifiedMessageQuery,
    search: SearchDefaults,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<EventBus>,
        event_name: impl Into<String>,
        traffic: TrafficHandle,
        engine: Arc<LogSearchEngine>,
        query: UnifiedMessageQuery,
        search: SearchDefaults,
    ) -> Self {
        Self {
            bus,
            event_name: event_name.into(),
            traffic,
            engine,
            query,
            search,
        }
    }

    /// Decode one request line and produce its response
    pub async fn handle_line(&self, line: &str) -> Response {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                return Response::err(
                    Value::Null,
                    RpcError::new(ErrorCode::InvalidRequest, format!("malformed JSON: {}", e)),
                )
            }
        };
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        let request: Request = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                return Response::err(
                    id,
                    RpcError::new(ErrorCode::InvalidRequest, format!("bad request: {}", e)),
                )
            }
        };

        match self.handle(&request).await {
            Ok(result) => Response::ok(request.id, result),
            Err(err) => {
                if err.code == ErrorCode::Internal {
                    warn!("Request '{}' failed: {}", request.kind, err.message);
                } else {
                    debug!("Request '{}' rejected: {}", request.kind, err);
                }
                Response::err(request.id, err)
            }
        }
    }

    /// Execute a decoded request
    pub async fn handle(&self, req: &Request) -> Result<Value, RpcError> {
        match req.kind.as_str() {
            "traffic/get_stats" => {
                let params: StatsParams = req.params()?;
                let filter = decode_filter(params.filters)?;
                let stats = self
                    .traffic
                    .get_stats(
                        filter,
                        params.window,
                        params.limit.unwrap_or(DEFAULT_STATS_LIMIT),
                    )
                    .await?;
                to_result(&stats)
            }
            "traffic/get_messages" => {
                let params: MessagesParams = req.params()?;
                let filter = decode_filter(params.filters)?;
                let page = self
                    .traffic
                    .get_messages(filter, params.limit.unwrap_or(DEFAULT_MESSAGES_LIMIT))
                    .await?;
                to_result(&page)
            }
            "traffic/reset_stats" => {
                self.traffic.reset_stats().await?;
                Ok(json!({ "ok": true }))
            }
            "log/list_files" => {
                let params: ListFilesParams = req.params()?;
                let engine = Arc::clone(&self.engine);
                let files =
                    run_blocking(move || engine.list_files(&params.path_id)).await??;
                Ok(json!({ "files": files }))
            }
            "log/get_tail" => {
                let params: TailParams = req.params()?;
                let max_lines = params.max_lines.unwrap_or(self.search.tail_lines);
                let max_chars = params.max_chars.unwrap_or(self.search.max_chars);
                let engine = Arc::clone(&self.engine);
                let tail =
                    run_blocking(move || engine.get_tail(&params.file_id, max_lines, max_chars))
                        .await??;
                to_result(&tail)
            }
            "log/search" => {
                let params: SearchParams = req.params()?;
                let file_id = params.file_id.clone();
                let request = self.search_request(params)?;
                let engine = Arc::clone(&self.engine);
                let result = run_blocking(move || engine.search(&file_id, &request)).await??;
                to_result(&result)
            }
            "messages/get_messages" => {
                let params: UnifiedParams = req.params()?;
                let request = UnifiedQueryRequest {
                    sources: params.sources,
                    filter: decode_filter(params.filters)?,
                    dedupe: params.dedupe.unwrap_or(true),
                    limit: params.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
                };
                let result = self.query.query(&request).await?;
                to_result(&result)
            }
            "event" => {
                let params: EventParams = req.params()?;
                let event_type = params
                    .event_type
                    .unwrap_or_else(|| self.event_name.clone());
                let delivered = self.bus.publish(&BridgeEvent::new(event_type, params.data));
                Ok(json!({ "delivered": delivered }))
            }
            other => Err(RpcError::new(
                ErrorCode::InvalidRequest,
                format!("unknown request type: {}", other),
            )),
        }
    }

    fn search_request(&self, params: SearchParams) -> Result<SearchRequest, RpcError> {
        let level = params
            .level
            .map(|l| {
                l.parse::<LogLevel>().map_err(|_| {
                    RpcError::new(ErrorCode::InvalidFilter, format!("unknown log level: {}", l))
                })
            })
            .transpose()?;
        Ok(SearchRequest {
            include: params.include,
            exclude: params.exclude,
            case_sensitive: params.case_sensitive,
            level,
            logger: params.logger,
            since_minutes: params.since_minutes,
            tail_lines: params.tail_lines,
            context_lines: params.context_lines.unwrap_or(self.search.context_lines),
            max_matches: params.max_matches.unwrap_or(self.search.max_matches),
            include_tracebacks: params.include_tracebacks,
            max_chars: params.max_chars.unwrap_or(self.search.max_chars),
        })
    }
}

fn decode_filter(filters: Option<Value>) -> Result<MessageFilter, RpcError> {
    match filters {
        None | Some(Value::Null) => Ok(MessageFilter::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| {
            RpcError::new(ErrorCode::InvalidFilter, format!("invalid filters: {}", e))
        }),
    }
}

fn to_result<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(ErrorCode::Internal, e.to_string()))
}

async fn run_blocking<F, T>(f: F) -> Result<T, RpcError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RpcError::new(ErrorCode::Internal, format!("worker failed: {}", e)))
}
