//! Client SDK for a realtime financial-report delivery service.
//!
//! Two cooperating facilities are exposed: an authenticated point-in-time
//! [`client`] for pulling report envelopes over REST, and the [`stream`]
//! module, a high-availability subscription engine that maintains several
//! concurrent socket connections to distinct server origins and presents a
//! single linearized, back-pressured feed of reports to the caller.

pub mod auth;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod feed;
pub mod report;
pub mod stream;
