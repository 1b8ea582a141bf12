pub mod antigravity;
pub mod chat_format;
pub mod oauth_adapter;
pub mod registry;
pub mod sse;
pub mod tool_grammar;

pub use oauth_adapter::{adapter_registry, AntigravityAdapter, GenericOAuthAdapter, ProviderAdapter};
pub use registry::{detect_provider, detect_provider_with_fallback, is_anthropic, is_antigravity};
pub use sse::SseBuffer;
pub use tool_grammar::{extract_native_tool_calls, fix_incomplete_tool_call, parse_tool_invocations, truncate_to_first_function};
