mod client;
mod client_metadata;
mod metadata;
mod request;
mod response;

pub use self::client::*;
pub use self::client_metadata::*;
pub use self::metadata::*;
pub use self::request::*;
pub use self::response::*;
