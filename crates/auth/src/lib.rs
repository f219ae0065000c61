//! `stratus-auth`: authorization policies and gateway token primitives.
//!
//! Transport and storage agnostic: policies are evaluated against role
//! bindings handed in by the caller, and tokens are signed/verified with keys
//! handed in by the caller.

pub mod authorize;
pub mod binding;
pub mod claims;
pub mod issuer;
pub mod keys;
pub mod policy;
pub mod roles;
pub mod state;
pub mod token;

pub use authorize::{Decision, Grant, authorize};
pub use binding::UserRoleBinding;
pub use claims::{Audience, AuthClaims, ClusterClaim};
pub use issuer::{CLUSTER_BOOTSTRAP_VALIDITY, IssuedToken, TokenIssuer, TokenKind, TokenSubject};
pub use keys::{Jwk, JwkSet, KeySet, SigningKey};
pub use policy::{Policy, ResourceMatch};
pub use roles::{Role, Scope};
pub use state::{State, generate_nonce};
pub use token::{Signer, TokenError, Verifier, check_audience};
