//! Tests for the session components
//!
//! End-to-end flows across the store, storage, API client, and lifecycle.
