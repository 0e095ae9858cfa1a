//! BizCalc onboarding - provisions isolated client deployments on one host
//!
//! This library turns a client identifier and a public hostname into a
//! running, network-reachable deployment:
//! - Allocates a private backend port from a bounded range
//! - Materializes the per-client directory layout and copies the shared
//!   frontend bundle into it
//! - Registers a supervised backend process for the client
//! - Activates a reverse-proxy virtual host routing public traffic to the
//!   allocated port while serving static assets directly
//!
//! Every step overwrites its own artifacts, so re-running create for an
//! existing client converges instead of corrupting state.

pub mod config;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod ports;
pub mod proxy;
pub mod server;
pub mod supervisor;
