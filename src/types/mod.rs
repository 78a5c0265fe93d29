mod executor;
mod tool;
mod tool_object;
mod toolset;

pub use executor::{Arguments, ToolExecutor};
pub use tool::Tool;
pub use tool_object::{ToolDescriptor, ToolObject, ValidationError};
pub use toolset::{ToolCallError, ToolSet, ToolSetCreationError};
