pub mod click;
pub mod url;

pub use click::{ClickInfo, UNKNOWN, UNKNOWN_IP};
pub use url::{ApiResponse, CreateUrlRequest, UrlRecord, SHORT_CODE_LENGTH};
