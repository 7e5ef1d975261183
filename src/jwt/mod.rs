pub mod builder;
pub mod claims;
pub mod issuer;
pub mod verifier;

pub use builder::ClaimsBuilder;
pub use claims::Claims;
pub use issuer::{ClaimsTemplate, TokenIssuer};
pub use verifier::TokenVerifier;
