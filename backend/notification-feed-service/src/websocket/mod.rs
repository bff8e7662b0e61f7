/// Realtime notification feed over WebSocket
///
/// 1. SubscriberRegistry: the set of open feed connections
/// 2. FeedSession: one actor per connection, drains its bounded buffer to the socket
///
/// Inbound client frames carry no meaning; the feed is server-to-client only.

pub mod registry;
pub mod session;

pub use registry::{FeedPayload, FeedReceiver, SubscriberHandle, SubscriberId, SubscriberRegistry};
pub use session::FeedSession;
