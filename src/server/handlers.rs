//! HTTP request handlers for the vector tile API.
//!
//! # Endpoints
//!
//! - `GET /tilezen/vector/v1[/{pixel_size}]/all/{z}/{x}/{y}.{fmt}` - Serve a tile
//! - `GET /tilezen/vector/v1[/{pixel_size}]/all/tilejson.{fmt}.json` - TileJSON document
//! - `GET /health_check` - Health check endpoint

use std::sync::Arc;
use std::time::SystemTime;

use aws_sdk_s3::primitives::{DateTime, DateTimeFormat};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::coord::{TileFormat, BASE_TILE_PIXELS, MAX_ZOOM};
use crate::error::{CoordError, TileError};
use crate::store::{ArchiveStore, CacheValidators};
use crate::tile::{TileOutcome, TileRequest, TileResponse, TileService};

/// Response header reporting whether the metatile came from memory.
pub const METATILE_CACHE_HIT_HEADER: &str = "x-metatile-cache-hit";

// =============================================================================
// Application State
// =============================================================================

/// `Cache-Control` directives sent with every tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheControl {
    /// `max-age` in seconds
    pub max_age: u32,

    /// `s-maxage` in seconds, omitted when `None`
    pub shared_max_age: Option<u32>,
}

impl CacheControl {
    pub fn new(max_age: u32, shared_max_age: Option<u32>) -> Self {
        Self {
            max_age,
            shared_max_age,
        }
    }

    /// Render the header value, e.g. `public, max-age=1200, s-maxage=600`.
    pub fn header_value(&self) -> String {
        match self.shared_max_age {
            Some(shared) => format!("public, max-age={}, s-maxage={}", self.max_age, shared),
            None => format!("public, max-age={}", self.max_age),
        }
    }
}

impl Default for CacheControl {
    fn default() -> Self {
        Self::new(1200, Some(600))
    }
}

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: ArchiveStore> {
    /// The tile service for processing tile requests
    pub tile_service: Arc<TileService<S>>,

    pub cache_control: CacheControl,

    /// Scheme and host prepended to tile URLs in TileJSON documents
    pub tiles_url_base: String,
}

impl<S: ArchiveStore> AppState<S> {
    /// Create a new application state with default cache directives.
    pub fn new(tile_service: TileService<S>) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_control: CacheControl::default(),
            tiles_url_base: String::new(),
        }
    }

    pub fn with_cache_control(mut self, cache_control: CacheControl) -> Self {
        self.cache_control = cache_control;
        self
    }

    pub fn with_tiles_url_base(mut self, base: impl Into<String>) -> Self {
        self.tiles_url_base = base.into().trim_end_matches('/').to_string();
        self
    }
}

impl<S: ArchiveStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_control: self.cache_control,
            tiles_url_base: self.tiles_url_base.clone(),
        }
    }
}

// =============================================================================
// Request Paths
// =============================================================================

/// What a path under `/tilezen/vector/v1/.../all/` names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorPath {
    /// `{z}/{x}/{y}.{fmt}`
    Tile {
        zoom: u32,
        x: u32,
        y: u32,
        format: TileFormat,
    },

    /// `tilejson.{fmt}.json`
    TileJson { format: TileFormat },
}

impl VectorPath {
    /// Parse the remainder of a vector tile URL.
    ///
    /// Returns `Ok(None)` when the path does not have either shape, and an
    /// error when the shape matches but the format is not a tile format.
    pub fn parse(path: &str) -> Result<Option<Self>, CoordError> {
        if let Some(fmt) = path
            .strip_prefix("tilejson.")
            .and_then(|rest| rest.strip_suffix(".json"))
        {
            let format = parse_tile_format(fmt)?;
            return Ok(Some(VectorPath::TileJson { format }));
        }

        let mut parts = path.split('/');
        let (Some(z), Some(x), Some(file), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Ok(None);
        };
        let Some((y, fmt)) = file.split_once('.') else {
            return Ok(None);
        };
        let (Ok(zoom), Ok(x), Ok(y)) = (z.parse(), x.parse(), y.parse()) else {
            return Ok(None);
        };

        let format = parse_tile_format(fmt)?;
        Ok(Some(VectorPath::Tile { zoom, x, y, format }))
    }
}

/// Parse a format that can be served as a tile; metatile archives cannot.
fn parse_tile_format(fmt: &str) -> Result<TileFormat, CoordError> {
    match fmt.parse::<TileFormat>()? {
        format if format.is_tile() => Ok(format),
        _ => Err(CoordError::UnknownFormat(fmt.to_string())),
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// TileJSON 2.2.0 document describing one tile format.
#[derive(Debug, Serialize)]
pub struct TileJson {
    pub tilejson: &'static str,
    pub name: String,
    pub format: &'static str,
    pub scheme: &'static str,
    pub tiles: Vec<String>,
    pub minzoom: u32,
    pub maxzoom: u32,
    pub bounds: [f64; 4],
}

// =============================================================================
// Error Handling
// =============================================================================

/// HTTP status and error identifier for a tile error.
pub fn error_status(err: &TileError) -> (StatusCode, &'static str) {
    match err {
        TileError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        TileError::ArchiveNotFound { .. } => (StatusCode::NOT_FOUND, "metatile_not_found"),
        TileError::MemberNotFound { .. } => (StatusCode::NOT_FOUND, "tile_not_found"),
        TileError::UnknownStorage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        TileError::InvalidGeometry(_) => (StatusCode::INTERNAL_SERVER_ERROR, "invalid_geometry"),
        TileError::CorruptArchive { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "corrupt_metatile"),
    }
}

/// Convert TileError to HTTP response.
///
/// Maps each error variant to an appropriate HTTP status code and
/// JSON error response.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = error_status(&self);
        let message = self.to_string();

        // Log errors based on severity
        match &self {
            _ if status.is_server_error() => {
                error!(error_type, status = status.as_u16(), "Server error: {}", message);
            }
            // A metatile without the tile usually means a geometry mismatch
            TileError::MemberNotFound { .. } => {
                warn!(error_type, status = status.as_u16(), "Tile missing from metatile: {}", message);
            }
            TileError::ArchiveNotFound { .. } => {
                debug!(error_type, status = status.as_u16(), "Resource not found: {}", message);
            }
            _ => {
                warn!(error_type, status = status.as_u16(), "Client error: {}", message);
            }
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

fn route_not_found() -> Response {
    let status = StatusCode::NOT_FOUND;
    let body = ErrorResponse::with_status("not_found", "No such tile path", status);
    (status, Json(body)).into_response()
}

// =============================================================================
// Header Helpers
// =============================================================================

/// Parse an HTTP-date header value. Unparseable dates are ignored.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::from_str(value.trim(), DateTimeFormat::HttpDate)
        .ok()
        .and_then(|t| SystemTime::try_from(t).ok())
}

/// Format a timestamp as an HTTP-date, e.g. `Fri, 14 Jul 2017 02:40:00 GMT`.
pub fn format_http_date(time: SystemTime) -> Option<String> {
    // HTTP-dates have whole-second precision
    let secs = DateTime::from(time).secs();
    DateTime::from_secs(secs).fmt(DateTimeFormat::HttpDate).ok()
}

/// Read the client's conditional request headers.
///
/// `If-None-Match` is passed on verbatim.
pub fn request_validators(headers: &HeaderMap) -> CacheValidators {
    let last_modified = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date);
    let etag = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    CacheValidators::new(last_modified, etag)
}

fn tile_response(tile: TileResponse, cache_control: &CacheControl) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(tile.format.mime_type()),
    );
    if let Ok(value) = HeaderValue::from_str(&cache_control.header_value()) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Some(value) = tile
        .validators
        .last_modified
        .and_then(format_http_date)
        .and_then(|d| HeaderValue::from_str(&d).ok())
    {
        headers.insert(header::LAST_MODIFIED, value);
    }
    if let Some(value) = tile
        .validators
        .etag
        .as_deref()
        .and_then(|e| HeaderValue::from_str(&format!("\"{}\"", e)).ok())
    {
        headers.insert(header::ETAG, value);
    }
    headers.insert(
        HeaderName::from_static(METATILE_CACHE_HIT_HEADER),
        HeaderValue::from_static(if tile.archive_cache_hit { "true" } else { "false" }),
    );

    (StatusCode::OK, headers, Body::from(tile.data)).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle `/tilezen/vector/v1/all/{*path}` requests at 256px.
pub async fn vector_handler<S: ArchiveStore + 'static>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    dispatch(&state, None, &path, &headers).await
}

/// Handle `/tilezen/vector/v1/{pixel_size}/all/{*path}` requests.
///
/// A pixel size that is not a number does not match the route.
pub async fn sized_vector_handler<S: ArchiveStore + 'static>(
    State(state): State<AppState<S>>,
    Path((pixel_size, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    match pixel_size.parse::<u32>() {
        Ok(pixel_size) => dispatch(&state, Some(pixel_size), &path, &headers).await,
        Err(_) => route_not_found(),
    }
}

async fn dispatch<S: ArchiveStore>(
    state: &AppState<S>,
    pixel_size: Option<u32>,
    path: &str,
    headers: &HeaderMap,
) -> Response {
    match VectorPath::parse(path) {
        Ok(Some(VectorPath::Tile { zoom, x, y, format })) => {
            let pixel_size = pixel_size.unwrap_or(BASE_TILE_PIXELS);
            let request = TileRequest::with_pixel_size(zoom, x, y, format, pixel_size);
            serve_tile(state, &request, headers).await
        }
        Ok(Some(VectorPath::TileJson { format })) => tilejson(state, pixel_size, format),
        Ok(None) => route_not_found(),
        Err(e) => TileError::from(e).into_response(),
    }
}

async fn serve_tile<S: ArchiveStore>(
    state: &AppState<S>,
    request: &TileRequest,
    headers: &HeaderMap,
) -> Response {
    let validators = request_validators(headers);

    match state.tile_service.retrieve(request, &validators).await {
        Ok(TileOutcome::Tile(tile)) => tile_response(tile, &state.cache_control),
        Ok(TileOutcome::NotModified) => StatusCode::NOT_MODIFIED.into_response(),
        Err(e) => e.into_response(),
    }
}

fn tilejson<S: ArchiveStore>(
    state: &AppState<S>,
    pixel_size: Option<u32>,
    format: TileFormat,
) -> Response {
    let size_part = match pixel_size {
        Some(pixel_size) => {
            if let Err(e) = state.tile_service.geometry().tile_size_for_pixels(pixel_size) {
                return TileError::from(e).into_response();
            }
            format!("/{}", pixel_size)
        }
        None => String::new(),
    };

    let url = format!(
        "{}/tilezen/vector/v1{}/all/{{z}}/{{x}}/{{y}}.{}",
        state.tiles_url_base, size_part, format
    );

    Json(TileJson {
        tilejson: "2.2.0",
        name: format!("tilezen vector tiles ({})", format),
        format: format.extension(),
        scheme: "xyz",
        tiles: vec![url],
        minzoom: 0,
        maxzoom: MAX_ZOOM - 1,
        bounds: [-180.0, -85.0511, 180.0, 85.0511],
    })
    .into_response()
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health_check`
///
/// Retrieves the world tile `0/0/0.mvt` through the full pipeline. Returns
/// `200 OK` unless the retrieval fails with a server-side error, in which
/// case `503 Service Unavailable` carries the error.
pub async fn health_check_handler<S: ArchiveStore + 'static>(
    State(state): State<AppState<S>>,
) -> Response {
    let request = TileRequest::new(0, 0, 0, TileFormat::Mvt);

    match state
        .tile_service
        .retrieve(&request, &CacheValidators::default())
        .await
    {
        Ok(_) => (StatusCode::OK, "OK").into_response(),
        Err(e) if error_status(&e).0.is_server_error() => {
            error!(error = %e, "Health check failed");
            let status = StatusCode::SERVICE_UNAVAILABLE;
            let (_, error_type) = error_status(&e);
            (
                status,
                Json(ErrorResponse::with_status(error_type, e.to_string(), status)),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "Health check tile unavailable");
            (StatusCode::OK, "OK").into_response()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
