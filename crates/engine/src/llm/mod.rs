pub mod gateway;
mod openrouter;

pub use gateway::{
    ChatModelGateway, ModelCompletion, ModelGatewayError, ModelGatewayFuture, ModelMessage,
    ModelRequest, ModelRole, ModelTokenUsage, ToolCallRequest, ToolSpec,
};
pub use openrouter::{
    OpenRouterConfig, OpenRouterConfigError, OpenRouterGateway, OpenRouterModelRoute,
};
