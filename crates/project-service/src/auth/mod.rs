//! Bearer token authentication.
//!
//! - `keys` - RSA public key reconstruction from JWK material
//! - `jwks` - Key set fetching and the shared key cache
//! - `jwt` - Token validation
//! - `claims` - Validated claim set

pub mod claims;
pub mod jwks;
pub mod jwt;
pub mod keys;

pub use claims::{Audience, ClaimValue, Claims};
pub use jwks::{KeyCache, KeySetSource, RemoteKeySetFetcher};
pub use jwt::TokenValidator;
pub use keys::{decode_rsa_public_key, RsaPublicKey};
