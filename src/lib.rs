//! perimeter-control - toggles the network exposure of a Dialogflow CX webhook
//! and the VPC Service Controls perimeter around it.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod build_info;
pub mod config;

// ============================================================================
// Server & HTTP
// ============================================================================

pub mod auth;
pub mod handlers;
pub mod server;

// ============================================================================
// Domain
// ============================================================================

pub mod gcp;
pub mod reconcile;
