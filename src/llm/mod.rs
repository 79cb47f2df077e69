pub mod openai;
pub mod traits;
pub mod types;

pub use openai::OpenAiProvider;
pub use traits::Provider;
pub use types::{
    ContentBlock, ImageSource, MessageRole, ProviderMessage, ProviderResponse, StopReason,
};
