//! pagebinder - Telegram bot that renders a web page and binds its images into a PDF.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod channels;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod session;

pub use channels::{Channel, ChannelMessage, Dispatcher, TelegramChannel};
pub use config::Config;
pub use directory::{AdminDirectory, AdminRecord, RemoveOutcome};
pub use error::{AssembleError, CommandError, FetchError, RenderError};
pub use pipeline::{ChromiumRenderer, DocumentPipeline, PageRenderer};
pub use server::build_router;
pub use session::{Conversations, DocumentGenerator, GenerateRequest};
