pub mod access_gate;
pub mod broadcaster;
pub mod relay;

pub use access_gate::{extract_token, AccessGate, FirebaseIdentityVerifier, IdentityVerifier};
pub use broadcaster::{BroadcastReport, FanoutBroadcaster};
pub use relay::{ChangeRelay, RelayHandle};
