pub mod schema;

pub use schema::{
    BotConfig, Config, DirectoryConfig, ObservabilityConfig, PipelineConfig, ServerConfig,
};
