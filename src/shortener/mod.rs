pub mod code;
pub mod service;

pub use code::{CodeGenerator, Sha256CodeGenerator};
pub use service::{ShortenerError, ShortenerResult, ShortenerService, MAX_CODE_ATTEMPTS};
