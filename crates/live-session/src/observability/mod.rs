//! Observability for the live session coordinator.
//!
//! Metrics are emitted through the `metrics` facade; the embedding
//! application decides which recorder to install. Labels are bounded enums
//! (link role, removal reason, end reason), never participant identifiers.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `ls_peer_links_created_total` | Counter | `role` |
//! | `ls_peer_links_removed_total` | Counter | `reason` |
//! | `ls_peer_links_active` | Gauge | none |
//! | `ls_negotiation_failures_total` | Counter | `reason` |
//! | `ls_payloads_buffered_total` | Counter | none |
//! | `ls_payloads_dropped_total` | Counter | `reason` |
//! | `ls_join_duration_seconds` | Histogram | `status` |
//! | `ls_sessions_ended_total` | Counter | `reason` |
//! | `ls_media_releases_total` | Counter | none |
//! | `ls_relay_lagging_evictions_total` | Counter | none |

pub mod metrics;
