//! Client for the transit lines REST backend.
//!
//! Every failure is logged with its details and mapped to an `ApiError` whose
//! `Display` is the short message shown to the user. No retries.

use crate::transit_types::{StopFilter, StopUpdate, TransitLine, TransitStop};
use anyhow::Context;
use log::{debug, error};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {url}. Please verify the backend server is running on port {port}")]
    NotFound { url: String, port: u16 },
    #[error("Unable to connect to the backend server. Please verify it is running.")]
    Unreachable(#[source] reqwest::Error),
    #[error("{0}")]
    Validation(String),
    #[error("At least 2 stops are required to create a line")]
    TooFewStops,
    #[error("An error occurred")]
    Status { status: u16, url: String },
    #[error("An error occurred")]
    Decode(#[source] reqwest::Error),
}

impl ApiError {
    /// Status to report to our own callers.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound { .. } => 404,
            ApiError::Validation(_) | ApiError::TooFewStops => 400,
            ApiError::Unreachable(_) | ApiError::Status { .. } | ApiError::Decode(_) => 502,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Serialize)]
struct CreateLineBody<'a> {
    stops: &'a [TransitStop],
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    port: u16,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let parsed = Url::parse(base_url).with_context(|| format!("Invalid API URL: {}", base_url))?;
        let port = parsed
            .port_or_known_default()
            .with_context(|| format!("API URL has no port: {}", base_url))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            port,
            http: Client::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, context: &str, url: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            error!("{}: request to {} failed: {}", context, url, e);
            ApiError::Unreachable(e)
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            "{}: API error status={} url={} body={}",
            context, status, url, body
        );
        Err(match status.as_u16() {
            404 => ApiError::NotFound {
                url: url.to_string(),
                port: self.port,
            },
            400 => ApiError::Validation(
                serde_json::from_str::<ErrorBody>(&body)
                    .ok()
                    .and_then(|b| b.error)
                    .unwrap_or_else(|| "Invalid request. Please check your input.".to_string()),
            ),
            s => ApiError::Status {
                status: s,
                url: url.to_string(),
            },
        })
    }

    async fn json<T: DeserializeOwned>(&self, context: &str, method: Method, path: &str, body: Option<&impl Serialize>) -> Result<T, ApiError> {
        let url = self.url(path);
        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = self.send(context, &url, request).await?;
        response.json::<T>().await.map_err(|e| {
            error!("{}: could not decode response from {}: {}", context, url, e);
            ApiError::Decode(e)
        })
    }

    pub async fn get_transit_lines(&self) -> Result<Vec<TransitLine>, ApiError> {
        debug!("Fetching all transit lines from {}", self.url("/transit-lines"));
        let lines: Vec<TransitLine> = self
            .json("Failed to fetch transit lines", Method::GET, "/transit-lines", None::<&()>)
            .await?;
        debug!("Retrieved {} lines", lines.len());
        Ok(lines)
    }

    pub async fn get_transit_line(&self, id: &str) -> Result<TransitLine, ApiError> {
        debug!("Fetching transit line {}", id);
        self.json(
            "Failed to fetch transit line",
            Method::GET,
            &format!("/transit-lines/{}", id),
            None::<&()>,
        )
        .await
    }

    /// Creates a line with its initial stops. Needs at least 2 stops; checked before any request.
    pub async fn create_transit_line(&self, id: &str, stops: &[TransitStop]) -> Result<TransitLine, ApiError> {
        if stops.len() < 2 {
            error!("Cannot create line {}: at least 2 stops are required", id);
            return Err(ApiError::TooFewStops);
        }
        debug!("Creating transit line {} with {} stops", id, stops.len());
        self.json(
            "Failed to create transit line",
            Method::POST,
            &format!("/transit-lines/{}", id),
            Some(&CreateLineBody { stops }),
        )
        .await
    }

    pub async fn delete_transit_line(&self, id: &str) -> Result<(), ApiError> {
        debug!("Deleting transit line {}", id);
        let url = self.url(&format!("/transit-lines/{}", id));
        let request = self.http.delete(&url);
        self.send("Failed to delete transit line", &url, request).await?;
        debug!("Deleted line {}", id);
        Ok(())
    }

    pub async fn add_stop(&self, line_id: &str, stop: &TransitStop) -> Result<TransitLine, ApiError> {
        debug!("Adding stop {} to line {}", stop.id, line_id);
        self.json(
            "Failed to add stop",
            Method::POST,
            &format!("/transit-lines/{}/stops", line_id),
            Some(stop),
        )
        .await
    }

    pub async fn update_stop(&self, line_id: &str, stop_id: &str, update: &StopUpdate) -> Result<TransitLine, ApiError> {
        debug!("Updating stop {} in line {} with {:?}", stop_id, line_id, update);
        self.json(
            "Failed to update stop",
            Method::PATCH,
            &format!("/transit-lines/{}/stops/{}", line_id, stop_id),
            Some(update),
        )
        .await
    }

    pub async fn remove_stop(&self, line_id: &str, stop_id: &str) -> Result<TransitLine, ApiError> {
        debug!("Removing stop {} from line {}", stop_id, line_id);
        self.json(
            "Failed to remove stop",
            Method::DELETE,
            &format!("/transit-lines/{}/stops/{}", line_id, stop_id),
            None::<&()>,
        )
        .await
    }

    pub async fn get_filtered_stops(&self, filter: &StopFilter) -> Result<Vec<TransitStop>, ApiError> {
        debug!("Filtering stops with {:?}", filter);
        let url = self.url("/transit-lines/stops");
        let request = self.http.get(&url).query(&filter.query_pairs());
        let response = self.send("Failed to filter stops", &url, request).await?;
        let stops: Vec<TransitStop> = response.json().await.map_err(|e| {
            error!("Failed to filter stops: could not decode response: {}", e);
            ApiError::Decode(e)
        })?;
        debug!("Filter matched {} stops", stops.len());
        Ok(stops)
    }
}

#[cfg(test)]
pub mod fake_backend {
    use crate::ordering;
    use crate::transit_types::{StopUpdate, TransitLine, TransitStop, VisualizationProperty};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use warp::http::StatusCode;
    use warp::reply::Response;
    use warp::{Filter, Rejection, Reply};

    pub type Lines = Arc<Mutex<Vec<TransitLine>>>;

    /// Reachability the fake assigns to stops it stores.
    pub const WALK_REACH: u32 = 1234;

    fn not_found() -> Response {
        StatusCode::NOT_FOUND.into_response()
    }

    fn bad_request(msg: &str) -> Response {
        warp::reply::with_status(
            warp::reply::json(&serde_json::json!({ "error": msg })),
            StatusCode::BAD_REQUEST,
        )
        .into_response()
    }

    fn with_line(db: &Lines, id: &str, f: impl FnOnce(&mut TransitLine)) -> Response {
        let mut lines = db.lock().unwrap();
        match lines.iter_mut().find(|l| l.id == id) {
            Some(line) => {
                f(line);
                warp::reply::json(&*line).into_response()
            }
            None => not_found(),
        }
    }

    /// In-memory implementation of the transit lines REST API.
    pub fn transit_api(db: Lines) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone + Send + Sync + 'static {
        let db = warp::any().map(move || db.clone());

        let list = warp::path!("transit-lines")
            .and(warp::get())
            .and(db.clone())
            .map(|db: Lines| warp::reply::json(&*db.lock().unwrap()).into_response());

        let filtered = warp::path!("transit-lines" / "stops")
            .and(warp::get())
            .and(warp::query::<HashMap<String, u32>>())
            .and(db.clone())
            .map(|q: HashMap<String, u32>, db: Lines| {
                let lines = db.lock().unwrap();
                let stops: Vec<&TransitStop> = lines
                    .iter()
                    .flat_map(|l| l.stops.iter())
                    .filter(|s| {
                        VisualizationProperty::METRICS.iter().all(|p| match q.get(p.key()) {
                            Some(min) => s.metric(*p) > *min,
                            None => true,
                        })
                    })
                    .collect();
                warp::reply::json(&stops).into_response()
            });

        let get_one = warp::path!("transit-lines" / String)
            .and(warp::get())
            .and(db.clone())
            .map(|id: String, db: Lines| with_line(&db, &id, |_| {}));

        let create = warp::path!("transit-lines" / String)
            .and(warp::post())
            .and(warp::body::json())
            .and(db.clone())
            .map(|id: String, body: serde_json::Value, db: Lines| {
                let Ok(stops) = serde_json::from_value::<Vec<TransitStop>>(body["stops"].clone()) else {
                    return bad_request("stops missing");
                };
                let mut lines = db.lock().unwrap();
                if lines.iter().any(|l| l.id == id) {
                    return bad_request("Line already exists");
                }
                let line = TransitLine { id, stops };
                lines.push(line.clone());
                warp::reply::json(&line).into_response()
            });

        let delete_line = warp::path!("transit-lines" / String)
            .and(warp::delete())
            .and(db.clone())
            .map(|id: String, db: Lines| {
                let mut lines = db.lock().unwrap();
                let before = lines.len();
                lines.retain(|l| l.id != id);
                if lines.len() == before {
                    return not_found();
                }
                StatusCode::NO_CONTENT.into_response()
            });

        let add_stop = warp::path!("transit-lines" / String / "stops")
            .and(warp::post())
            .and(warp::body::json())
            .and(db.clone())
            .map(|id: String, mut stop: TransitStop, db: Lines| {
                with_line(&db, &id, |line| {
                    if let Some(prev) = stop.prev_id.clone() {
                        if let Some(p) = line.stops.iter_mut().find(|s| s.id == prev) {
                            p.next_id = Some(stop.id.clone());
                        }
                    }
                    stop.reachable_population_walk = WALK_REACH;
                    line.stops.push(stop);
                })
            });

        let patch_stop = warp::path!("transit-lines" / String / "stops" / String)
            .and(warp::patch())
            .and(warp::body::json())
            .and(db.clone())
            .map(|id: String, stop_id: String, update: StopUpdate, db: Lines| {
                with_line(&db, &id, |line| {
                    if let Some(stop) = line.stops.iter_mut().find(|s| s.id == stop_id) {
                        stop.apply(&update);
                    }
                })
            });

        let remove_stop = warp::path!("transit-lines" / String / "stops" / String)
            .and(warp::delete())
            .and(db)
            .map(|id: String, stop_id: String, db: Lines| {
                with_line(&db, &id, |line| {
                    ordering::splice_out(line, &stop_id);
                })
            });

        list.or(filtered)
            .unify()
            .or(get_one)
            .unify()
            .or(create)
            .unify()
            .or(delete_line)
            .unify()
            .or(add_stop)
            .unify()
            .or(patch_stop)
            .unify()
            .or(remove_stop)
            .unify()
    }

    /// Serves `routes` on an ephemeral local port and returns its base URL.
    pub fn spawn<F>(routes: F) -> String
    where
        F: Filter + Clone + Send + Sync + 'static,
        F::Extract: Reply,
        F::Error: Into<Rejection>,
    {
        let (addr, server) = warp::serve(routes.boxed()).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    /// A base URL nothing listens on.
    pub fn closed_port() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("http://127.0.0.1:{}", port)
    }
}
