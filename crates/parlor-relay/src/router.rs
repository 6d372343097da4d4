//! Shared relay state and message routing.
//!
//! Every outbound event goes through one broadcast channel as an
//! [`Outbound`] envelope. Each connection's writer task subscribes and keeps
//! only `Broadcast` envelopes and the ones addressed to its own id. Chat
//! broadcasts are only written once the connection has joined.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parlor_core::auth::Authorizer;
use parlor_core::command::{self, Command, Target, BAN_USAGE, UNBAN_USAGE, WHISPER_USAGE};
use parlor_core::event::{ChatBody, ChatMessage, ClientEvent, ServerEvent, SERVER_BANNER};
use parlor_core::registry::{validate_display_name, ConnectionId, Registry};
use parlor_core::Error;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

use crate::storage::BanStore;

/// Outbound channel capacity. A writer that falls this far behind is
/// disconnected.
pub const BROADCAST_CAPACITY: usize = 256;

/// An outbound event and who should receive it.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Every open connection. Chat lines reach joined connections only.
    Broadcast(ServerEvent),
    /// One connection.
    Direct(ConnectionId, ServerEvent),
    /// Close the connection after everything queued before this.
    Disconnect(ConnectionId),
}

/// Tunables taken from the command line.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub max_name_len: usize,
    pub max_frame_bytes: usize,
    pub trust_forwarded_for: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            max_name_len: 32,
            max_frame_bytes: 5 * 1024 * 1024,
            trust_forwarded_for: false,
        }
    }
}

/// Shared relay state.
pub struct RelayState {
    /// Joined participants by connection.
    pub registry: RwLock<Registry>,
    /// Origin address of every open connection, joined or not.
    open: RwLock<BTreeMap<ConnectionId, String>>,
    /// Persistent ban list.
    pub bans: BanStore,
    /// Outbound envelopes for all connection writers.
    pub outbound_tx: broadcast::Sender<Outbound>,
    /// Display name -> address for participants banned by name, so they can
    /// be unbanned by name after they are gone. Not persisted.
    banned_names: RwLock<HashMap<String, String>>,
    auth: Arc<dyn Authorizer>,
    next_conn: AtomicU64,
    pub options: RelayOptions,
    /// Server start time (for uptime reporting).
    pub start_time: Instant,
}

impl RelayState {
    pub fn new(bans: BanStore, auth: Arc<dyn Authorizer>, options: RelayOptions) -> Self {
        let (outbound_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            registry: RwLock::new(Registry::new()),
            open: RwLock::new(BTreeMap::new()),
            bans,
            outbound_tx,
            banned_names: RwLock::new(HashMap::new()),
            auth,
            next_conn: AtomicU64::new(1),
            options,
            start_time: Instant::now(),
        }
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed))
    }

    pub fn is_admin(&self, display_name: &str) -> bool {
        self.auth.is_admin(display_name)
    }

    // ── Delivery primitives ──

    fn broadcast(&self, event: ServerEvent) {
        // Err only means nobody is listening.
        let _ = self.outbound_tx.send(Outbound::Broadcast(event));
    }

    fn emit(&self, to: ConnectionId, event: ServerEvent) {
        let _ = self.outbound_tx.send(Outbound::Direct(to, event));
    }

    fn disconnect(&self, conn: ConnectionId) {
        let _ = self.outbound_tx.send(Outbound::Disconnect(conn));
    }

    /// Sender-only system notice.
    fn notify(&self, to: ConnectionId, text: impl Into<String>) {
        self.emit(to, ServerEvent::Chat(ChatMessage::system(text)));
    }

    // ── Presence ──

    /// Track a freshly accepted connection so bans can reach it before it joins.
    pub async fn open_connection(&self, conn: ConnectionId, origin: &str) {
        self.open.write().await.insert(conn, origin.to_string());
    }

    pub async fn is_joined(&self, conn: ConnectionId) -> bool {
        self.registry.read().await.get(conn).is_some()
    }

    /// Register `conn` under `raw_name` and rebroadcast the roster.
    pub async fn join(&self, conn: ConnectionId, raw_name: &str, origin: &str) {
        let name = match validate_display_name(raw_name, self.options.max_name_len) {
            Ok(name) => name,
            Err(e) => {
                debug!("{conn} join refused: {e}");
                self.notify(conn, format!("Cannot join: {e}."));
                return;
            }
        };

        // The list may have changed since this connection was accepted.
        if self.bans.is_banned(origin) {
            info!("{conn} from banned address {origin} tried to join as '{name}'");
            self.emit(conn, ServerEvent::Banned { by: SERVER_BANNER.to_string() });
            self.disconnect(conn);
            return;
        }

        self.registry.write().await.register(conn, name, origin);
        info!("{conn} joined as '{name}' from {origin}");
        self.broadcast_roster().await;
    }

    /// Forget `conn`. Rebroadcasts the roster if it had joined.
    pub async fn leave(&self, conn: ConnectionId) {
        self.open.write().await.remove(&conn);
        let removed = self.registry.write().await.deregister(conn);
        if let Some(p) = removed {
            info!("{conn} ('{}') left", p.display_name);
            self.broadcast_roster().await;
        }
    }

    pub async fn broadcast_roster(&self) {
        let names = self.registry.read().await.snapshot();
        self.broadcast(ServerEvent::UserList(names));
    }

    // ── Inbound events ──

    /// Handle one decoded event from `conn`.
    pub async fn handle_event(&self, conn: ConnectionId, origin: &str, event: ClientEvent) {
        if let ClientEvent::Join(name) = event {
            self.join(conn, &name, origin).await;
            return;
        }

        // Payload `user`/`from` fields are ignored: the registered name is
        // the only identity the relay acts on.
        let sender = self.registry.read().await.get(conn).map(|p| p.display_name.clone());
        let Some(sender) = sender else {
            debug!("{conn} sent an event before joining, dropped");
            return;
        };

        match event {
            ClientEvent::Join(_) => {}
            ClientEvent::Chat(body) => self.handle_chat(conn, &sender, body).await,
            ClientEvent::Whisper(w) => {
                let (to, text) = (w.to.trim(), w.text.trim());
                if to.is_empty() || text.is_empty() {
                    self.notify(conn, WHISPER_USAGE);
                } else {
                    self.send_whisper(conn, &sender, to, text).await;
                }
            }
            ClientEvent::Ban(m) => {
                self.handle_moderation_event(conn, &sender, &m.target, Command::Ban, BAN_USAGE)
                    .await
            }
            ClientEvent::Unban(m) => {
                self.handle_moderation_event(conn, &sender, &m.target, Command::Unban, UNBAN_USAGE)
                    .await
            }
        }
    }

    /// `ban` / `unban` events. Only administrators hear about a missing target.
    async fn handle_moderation_event(
        &self,
        conn: ConnectionId,
        sender: &str,
        raw_target: &str,
        command: fn(Target) -> Command,
        usage: &'static str,
    ) {
        let target = raw_target.trim();
        if target.is_empty() {
            if self.is_admin(sender) {
                self.notify(conn, usage);
            }
            return;
        }
        self.run_command(conn, sender, command(Target::classify(target))).await;
    }

    async fn handle_chat(&self, conn: ConnectionId, sender: &str, body: ChatBody) {
        let (text, image) = body.into_parts();

        if let Some(line) = text.as_deref() {
            match command::parse(line) {
                Ok(None) => {}
                Ok(Some(cmd)) => {
                    self.run_command(conn, sender, cmd).await;
                    return;
                }
                Err(Error::Usage { usage }) => {
                    self.notify(conn, usage);
                    return;
                }
                Err(Error::UnknownCommand(word)) => {
                    self.notify(
                        conn,
                        format!("Unknown command: /{word}. Type /help for available commands."),
                    );
                    return;
                }
                Err(e) => {
                    self.notify(conn, e.to_string());
                    return;
                }
            }
        }

        self.broadcast_chat(sender, text, image);
    }

    async fn run_command(&self, conn: ConnectionId, sender: &str, cmd: Command) {
        match cmd {
            Command::Whisper { target, text } => self.send_whisper(conn, sender, &target, &text).await,
            Command::Ban(target) => self.handle_ban(conn, sender, target).await,
            Command::Unban(target) => self.handle_unban(conn, sender, target).await,
            Command::Help => self.notify(conn, command::help_text(self.is_admin(sender))),
        }
    }

    // ── Routing ──

    /// Deliver a chat line to every connection, sender included.
    /// Lines with neither text nor image are dropped.
    pub fn broadcast_chat(&self, sender: &str, text: Option<String>, image: Option<String>) {
        let text = text.filter(|t| !t.trim().is_empty());
        if text.is_none() && image.is_none() {
            debug!("Empty chat message from '{sender}' dropped");
            return;
        }
        self.broadcast(ServerEvent::Chat(ChatMessage::chat(sender, text, image)));
    }

    /// Deliver a whisper to `to_name` and echo it to the sender.
    pub async fn send_whisper(&self, from: ConnectionId, from_name: &str, to_name: &str, text: &str) {
        let target = self.registry.read().await.find_by_name(to_name);
        let Some(target) = target else {
            self.notify(from, format!("User '{to_name}' not found."));
            return;
        };

        let msg = ServerEvent::Chat(ChatMessage::whisper(from_name, to_name, text));
        self.emit(from, msg.clone());
        if target != from {
            self.emit(target, msg);
        }
    }

    /// Ban by address or display name. Non-admin callers are ignored.
    pub async fn handle_ban(&self, from: ConnectionId, from_name: &str, target: Target) {
        if !self.is_admin(from_name) {
            warn!("{from} ('{from_name}') attempted to ban '{}' without permission", target.as_str());
            return;
        }

        let Some(address) = self.resolve_ban_target(&target).await else {
            self.notify(from, format!("User '{}' not found.", target.as_str()));
            return;
        };

        match self.bans.ban(&address) {
            Ok(false) => {
                self.notify(from, format!("'{}' is already banned.", target.as_str()));
                return;
            }
            Ok(true) => info!("'{from_name}' banned {address} (target '{}')", target.as_str()),
            Err(e) => {
                error!("Failed to persist ban of {address}: {e}");
                self.notify(
                    from,
                    format!("Ban of {address} is active but could not be saved; it may not survive a restart."),
                );
            }
        }

        if let Target::Name(name) = &target {
            self.banned_names.write().await.insert(name.clone(), address.clone());
        }

        // Every open connection from the address goes, joined or not.
        // Administrators sharing the address stay connected.
        let from_address: Vec<ConnectionId> = self
            .open
            .read()
            .await
            .iter()
            .filter(|(_, origin)| **origin == address)
            .map(|(id, _)| *id)
            .collect();
        let kicked: Vec<ConnectionId> = {
            let registry = self.registry.read().await;
            from_address
                .into_iter()
                .filter(|id| !registry.get(*id).is_some_and(|p| self.is_admin(&p.display_name)))
                .collect()
        };
        for conn in kicked {
            self.emit(conn, ServerEvent::Banned { by: from_name.to_string() });
            self.disconnect(conn);
        }

        self.broadcast(ServerEvent::Chat(ChatMessage::system(format!(
            "{} was banned by {from_name}.",
            target.as_str()
        ))));
    }

    /// Lift a ban by address or display name. Non-admin callers are ignored.
    pub async fn handle_unban(&self, from: ConnectionId, from_name: &str, target: Target) {
        if !self.is_admin(from_name) {
            warn!("{from} ('{from_name}') attempted to unban '{}' without permission", target.as_str());
            return;
        }

        let Some(address) = self.resolve_unban_target(&target).await else {
            self.notify(from, format!("User '{}' not found.", target.as_str()));
            return;
        };

        match self.bans.unban(&address) {
            Ok(false) => {
                self.notify(from, format!("'{}' is not banned.", target.as_str()));
                return;
            }
            Ok(true) => info!("'{from_name}' unbanned {address} (target '{}')", target.as_str()),
            Err(e) => {
                error!("Failed to persist unban of {address}: {e}");
                self.notify(
                    from,
                    format!("Unban of {address} is active but could not be saved; it may not survive a restart."),
                );
            }
        }

        self.banned_names.write().await.retain(|_, addr| *addr != address);

        self.broadcast(ServerEvent::Chat(ChatMessage::system(format!(
            "{} was unbanned by {from_name}.",
            target.as_str()
        ))));
    }

    /// Connected participants win; otherwise someone banned by name earlier.
    async fn resolve_ban_target(&self, target: &Target) -> Option<String> {
        match target {
            Target::Address(addr) => Some(addr.clone()),
            Target::Name(name) => {
                let connected = self.origin_of(name).await;
                match connected {
                    Some(addr) => Some(addr),
                    None => self.banned_names.read().await.get(name).cloned(),
                }
            }
        }
    }

    /// A banned participant is normally gone, so the ban memory goes first.
    async fn resolve_unban_target(&self, target: &Target) -> Option<String> {
        match target {
            Target::Address(addr) => Some(addr.clone()),
            Target::Name(name) => {
                let remembered = self.banned_names.read().await.get(name).cloned();
                match remembered {
                    Some(addr) => Some(addr),
                    None => self.origin_of(name).await,
                }
            }
        }
    }

    async fn origin_of(&self, name: &str) -> Option<String> {
        let registry = self.registry.read().await;
        registry
            .find_by_name(name)
            .and_then(|id| registry.get(id))
            .map(|p| p.origin_address.clone())
    }
}
