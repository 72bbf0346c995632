//! # Live Session Test Utilities
//!
//! Shared test utilities for the live session coordinator.
//!
//! ## Modules
//!
//! - `harness` - In-process relay and backend with joinable mesh members
//! - `mock_backend` - `wiremock` stand-in for the campus REST backend
//! - `fixtures` - Pre-configured identities and session metadata
//!
//! ## Usage
//!
//! ```rust,ignore
//! use live_session_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let mesh = MeshHarness::start().await?;
//!     let host = mesh.join_host().await?;
//!     let guest = mesh.join("Ada").await?;
//!
//!     host.wait_connected(1).await;
//!     guest.wait_connected(1).await;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod mock_backend;

pub use fixtures::{TestIdentity, TestSession};
pub use harness::{test_settings, MeshHarness, MeshMember, HOST_USER_ID, WAIT_TIMEOUT};
pub use mock_backend::{MockBackendServer, TEST_TOKEN};
