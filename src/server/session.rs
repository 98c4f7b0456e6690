use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use futures_util::future::LocalBoxFuture;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::players::channel::{ChannelError, ClientChannel};
use crate::players::types::{DequeueReason, Player};
use crate::server::anti_spam::CommandLimiter;
use crate::server::messages::{ClientWsMessage, PushJoin, ServerWsMessage};
use crate::server::state::AppState;

/// One authenticated launcher connection. Owns the ws stream, feeds client
/// commands into the services and carries pushes back out.
pub struct ClientSession {
    stable_id: String,
    display_name: String,
    channel_id: Uuid,
    state: web::Data<AppState>,
    player: Option<Arc<Player>>,
    limiter: CommandLimiter,
}

impl Actor for ClientSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let channel = Arc::new(WsChannel {
            addr: ctx.address(),
        });
        match self.state.players.get_or_add(
            &self.stable_id,
            &self.display_name,
            self.channel_id,
            channel,
        ) {
            Ok(player) => {
                info!(
                    "[WS] {} connected as '{}' (channel={})",
                    self.stable_id, self.display_name, self.channel_id
                );
                self.player = Some(player);
            }
            Err(e) => {
                // First connection wins; this one is aborted.
                warn!("[WS] Aborting session for {}: {}", self.stable_id, e);
                self.send(ctx, ServerWsMessage::error("DUPLICATE_SESSION", &e.to_string()));
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Policy,
                    description: Some("duplicate session".into()),
                }));
                ctx.stop();
            }
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(player) = self.player.take() {
            info!("[WS] {} disconnected", self.stable_id);
            self.state.matchmaking.handle_disconnect(&player);
            self.state.queueing.handle_disconnect(&player);
            self.state.players.try_remove(&self.stable_id, self.channel_id);
        }
    }
}

impl ClientSession {
    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, msg: ServerWsMessage) {
        match serde_json::to_string(&msg) {
            Ok(text) => ctx.text(text),
            Err(e) => {
                warn!("[WS] Failed to serialize push for {}: {}", self.stable_id, e);
                ctx.text(r#"{"action":"Error","data":{"code":"INTERNAL","message":"serialization failure"}}"#);
            }
        }
    }

    fn send_error(&mut self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        if self.limiter.should_send_error(code, &self.stable_id) {
            self.send(ctx, ServerWsMessage::error(code, message));
        }
    }

    fn handle_command(&mut self, msg: ClientWsMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let player = match &self.player {
            Some(player) => Arc::clone(player),
            None => return,
        };
        match msg {
            ClientWsMessage::JoinQueue { ip, port, instance_id } => {
                let accepted = match ip.parse::<IpAddr>() {
                    Ok(ip) => self.state.queueing.join_queue(
                        &player,
                        SocketAddr::new(ip, port),
                        &instance_id,
                    ),
                    Err(_) => {
                        debug!("[WS] {} sent an unparseable server ip", self.stable_id);
                        false
                    }
                };
                self.send(ctx, ServerWsMessage::JoinQueueResult { accepted });
            }
            ClientWsMessage::LeaveQueue => {
                self.state.queueing.leave_queue(&player);
            }
            ClientWsMessage::JoinAck { success } => {
                self.state.queueing.on_join_ack(&player, success);
            }
            ClientWsMessage::SearchMatch { criteria, preferred_servers } => {
                let accepted =
                    self.state
                        .matchmaking
                        .enter_matchmaking(&player, criteria, &preferred_servers);
                self.send(ctx, ServerWsMessage::SearchMatchResult { accepted });
            }
            ClientWsMessage::UpdateSearchSession { criteria, server_pings } => {
                let accepted = self
                    .state
                    .matchmaking
                    .update_search(&player, criteria, &server_pings);
                self.send(ctx, ServerWsMessage::UpdateSearchResult { accepted });
            }
        }
        self.limiter.reset_error_suppression();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ClientSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                if self.limiter.record_command(&self.stable_id) {
                    return;
                }
                match serde_json::from_str::<ClientWsMessage>(&text) {
                    Ok(command) => self.handle_command(command, ctx),
                    Err(e) => {
                        debug!("[WS] Invalid command from {}: {}", self.stable_id, e);
                        self.send_error(ctx, "INVALID_COMMAND", "could not parse command");
                    }
                }
            }
            Ok(ws::Message::Ping(payload)) => ctx.pong(&payload),
            Ok(ws::Message::Close(_)) => ctx.stop(),
            Ok(_) => (),
            Err(e) => {
                warn!("[WS] Protocol error for {}: {:?}", self.stable_id, e);
                ctx.stop();
            }
        }
    }
}

impl Handler<ServerWsMessage> for ClientSession {
    type Result = ();

    fn handle(&mut self, msg: ServerWsMessage, ctx: &mut Self::Context) {
        self.send(ctx, msg);
    }
}

impl Handler<PushJoin> for ClientSession {
    type Result = bool;

    fn handle(&mut self, msg: PushJoin, ctx: &mut Self::Context) -> Self::Result {
        let push = ServerWsMessage::NotifyJoin {
            ip: msg.ip,
            port: msg.port,
        };
        match serde_json::to_string(&push) {
            Ok(text) => {
                ctx.text(text);
                true
            }
            Err(e) => {
                warn!("[WS] Failed to serialize join push for {}: {}", self.stable_id, e);
                false
            }
        }
    }
}

/// Client channel backed by a live ws session actor.
pub struct WsChannel {
    addr: Addr<ClientSession>,
}

impl ClientChannel for WsChannel {
    fn notify_join(
        &self,
        ip: String,
        port: u16,
    ) -> LocalBoxFuture<'static, Result<bool, ChannelError>> {
        let request = self.addr.send(PushJoin { ip, port });
        Box::pin(async move { request.await.map_err(|_| ChannelError::Closed) })
    }

    fn queue_position_changed(&self, position: usize, length: usize) -> Result<(), ChannelError> {
        if !self.addr.connected() {
            return Err(ChannelError::Closed);
        }
        self.addr
            .do_send(ServerWsMessage::QueuePositionChanged { position, length });
        Ok(())
    }

    fn removed_from_queue(&self, reason: DequeueReason) {
        self.addr.do_send(ServerWsMessage::RemovedFromQueue { reason });
    }

    fn match_found(&self, ip: String, port: u16) {
        self.addr.do_send(ServerWsMessage::MatchFound { ip, port });
    }

    fn matchmaking_failed(&self, reason: String) {
        self.addr.do_send(ServerWsMessage::MatchmakingFailed { reason });
    }
}

/// WebSocket entry point. The transport layer in front of this endpoint has
/// already authenticated the caller; the query string carries the stable id
/// and the in-game name.
pub async fn ws_queue(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut stable_id = String::new();
    let mut display_name = String::new();

    for kv in req.query_string().split('&') {
        let mut split = kv.split('=');
        match (split.next(), split.next()) {
            (Some("stableId"), Some(id)) => {
                stable_id = id.to_string();
            }
            (Some("name"), Some(name)) => {
                display_name = urlencoding::decode(name)
                    .unwrap_or_else(|_| Cow::Borrowed(""))
                    .into_owned();
            }
            _ => {}
        }
    }

    if stable_id.is_empty() {
        warn!("[WS] Connection refused: missing stableId");
        return Ok(HttpResponse::BadRequest().body("Missing stableId"));
    }
    let channel_id = Uuid::new_v4();
    if display_name.is_empty() {
        display_name = format!("Player_{}", &channel_id.to_string()[..4]);
    }

    ws::start(
        ClientSession {
            stable_id,
            display_name,
            channel_id,
            state: data.clone(),
            player: None,
            limiter: CommandLimiter::new(),
        },
        &req,
        stream,
    )
}
