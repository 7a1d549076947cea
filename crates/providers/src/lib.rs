pub mod anthropic;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod ollama;
pub mod openai;
pub mod pump;
pub mod transport;

pub use config::{AccessConfig, Environment, IntakeConfig};
pub use dispatch::{DispatchHandle, DispatchRequest, EventParser};
pub use http::HttpTransport;
pub use pump::{IntakePump, IntakeRequest, PumpOptions};
pub use transport::{Transport, UpstreamBody};
