use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;

use crate::config::FeedConfig;
use crate::services::FanoutBroadcaster;
use crate::websocket::{FeedPayload, FeedReceiver, SubscriberHandle, SubscriberId};

/// One realtime feed connection
///
/// Registers with the broadcaster when the actor starts and drains its
/// bounded buffer to the socket. Removal from the registry happens in
/// `stopped`, whichever side ended the connection.
pub struct FeedSession {
    id: SubscriberId,
    uid: Option<String>,
    handle: Option<SubscriberHandle>,
    receiver: Option<FeedReceiver>,
    broadcaster: Arc<FanoutBroadcaster>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl FeedSession {
    pub fn new(
        broadcaster: Arc<FanoutBroadcaster>,
        config: &FeedConfig,
        uid: Option<String>,
    ) -> Self {
        let (handle, receiver) = SubscriberHandle::channel(config.send_buffer);
        Self {
            id: handle.id(),
            uid,
            handle: Some(handle),
            receiver: Some(receiver),
            broadcaster,
            hb: Instant::now(),
            heartbeat_interval: config.heartbeat_interval,
            client_timeout: config.client_timeout,
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(subscriber = %act.id, "Feed heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for FeedSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            subscriber = %self.id,
            uid = self.uid.as_deref().unwrap_or("anonymous"),
            "Feed session started"
        );

        self.hb(ctx);

        if let Some(receiver) = self.receiver.take() {
            ctx.add_stream(ReceiverStream::new(receiver));
        }
        if let Some(handle) = self.handle.take() {
            self.broadcaster.attach(handle);
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.broadcaster.registry().remove(self.id);
        tracing::info!(subscriber = %self.id, "Feed session stopped");
    }
}

// Snapshots queued by the broadcaster
impl StreamHandler<FeedPayload> for FeedSession {
    fn handle(&mut self, payload: FeedPayload, ctx: &mut Self::Context) {
        ctx.text(payload.as_ref());
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // Sender dropped: removed for lagging, or the server is shutting down
        tracing::debug!(subscriber = %self.id, "Feed ended, closing connection");
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Away,
            description: Some("feed closed".to_string()),
        }));
        ctx.stop();
    }
}

// WebSocket protocol messages from the client
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for FeedSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Binary(_)) => {
                self.hb = Instant::now();
                tracing::trace!(subscriber = %self.id, "Ignoring client frame");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(subscriber = %self.id, "Feed close received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(subscriber = %self.id, error = %e, "Feed protocol error");
                ctx.stop();
            }
        }
    }
}
