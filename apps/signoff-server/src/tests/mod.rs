//! Server tests.
//!
//! Each test drives the real axum router over a bound listener with `reqwest`:
//! - `common` - test server, accounts, sessions and a recording mail provider
//! - `magic_links` - issue, validate and submit through the public endpoints
//! - `evidence` - the authenticated in-app path and amendments
//! - `health` - liveness, readiness and metrics on the health listener

pub mod common;

mod evidence;
