//! HTTP server layer.
//!
//! This module provides the HTTP API for serving vector tiles out of metatiles.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │      GET /tilezen/vector/v1[/{size}]/all/{z}/{x}/{y}.{fmt}      │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (paths, headers, errors) │  │ (router, CORS, gzip, trace) │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    error_status, format_http_date, health_check_handler, parse_http_date, request_validators,
    sized_vector_handler, vector_handler, AppState, CacheControl, ErrorResponse, TileJson,
    VectorPath, METATILE_CACHE_HIT_HEADER,
};
pub use routes::{create_router, RouterConfig};
