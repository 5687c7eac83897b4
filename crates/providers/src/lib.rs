pub mod credential;
pub mod gemini;
pub mod persona;
pub mod session;
pub mod traits;
pub mod waterfall;

pub use credential::{ApiKey, API_KEY_ENV};
pub use gemini::GeminiBackend;
pub use session::ChatSession;
pub use traits::*;
pub use waterfall::WaterfallClient;
