//! MCP server integration.
//!
//! Connects the MCP protocol to the gateway's tool handlers through the
//! rmcp framework.

pub mod service;

pub use service::GatewayService;
