//! Tool model, registry and the domain tool catalog.

pub mod implementations;
pub mod registry;
pub mod schema;
pub mod truncation;

pub use implementations::{build_registry, register_all_tools};
pub use registry::{
    parse_params, AdvertisedTool, RiskLevel, Tool, ToolCategory, ToolContext, ToolRegistry,
    ToolRegistryBuilder, ToolResult,
};
