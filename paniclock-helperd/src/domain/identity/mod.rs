pub mod value_object;

pub use value_object::{
    ApplicationId, CodeSignature, PeerCredentials, PeerIdentity, SigningAuthorityId,
    TrustRequirement,
};
