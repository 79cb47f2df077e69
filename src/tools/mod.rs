pub mod analysis;
pub mod calendar;
pub mod memory;
pub mod notion;
pub mod registry;
pub mod tasks;
pub mod traits;
pub mod url;

pub use registry::ToolRegistry;
pub use traits::{Tool, ToolResult, ToolSpec};
