//! Stateless client-side state: every value lives in cookies, nothing on
//! the server survives the response.

mod authentication;
mod flash;
mod session;

pub mod codec;

pub use authentication::{hash_password, verify_password, Authentication};
pub use codec::StateCodec;
pub use flash::Flash;
pub use session::{Session, AUTHENTICITY_TOKEN_LENGTH};
