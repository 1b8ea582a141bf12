pub mod content;
pub mod credential;
pub mod error;
pub mod model_id;
pub mod response;
pub mod stats;

pub use content::{Message, MessagePart, Role};
pub use credential::Credential;
pub use error::{EspritError, Result};
pub use model_id::ModelId;
pub use response::{LlmResponse, ThinkingBlock, ToolInvocation};
pub use stats::RequestStats;
