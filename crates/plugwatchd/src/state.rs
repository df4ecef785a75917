//! Shared application state and global allocator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;

use axum::extract::State;

use plugwatch_core::metrics::MetricSet;

/// Written by pollers, read by scrape handlers. No lock: every field is atomic.
pub(crate) type SharedMetrics = Arc<MetricSet>;

pub(crate) type AppState = State<SharedMetrics>;
