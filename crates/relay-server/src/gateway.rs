//! Connection gateway: connect/disconnect/message handling.
//!
//! The gateway sits between the transport loops and the registry. It applies
//! the inbound guard, delegates state changes to the registry and the
//! feature locator, and performs the actual group joins and sends.
//!
//! Error containment: a failure while handling a connect event must never
//! crash the listening process — it is caught, logged, and answered by an
//! explicit disconnect of the offending connection. Failures during
//! ordinary message handling become a typed `error` event to that
//! connection.

use std::sync::Arc;

use metrics::counter;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use relay_auth::AuthService;
use relay_core::{Auth, ConnectionId, Feature, WsError, events, feature};
use relay_hub::{ConnectionRegistry, FeatureLocator, HeaderSnapshot};

use crate::guard::{self, policy_for};
use crate::hub::WsHub;
use crate::message::{AuthRequest, ClientMessage, OutboundEvent};

/// Receives transport events, guards them and routes them to the registry
/// and feature locator.
pub struct ConnectionGateway {
    registry: Arc<ConnectionRegistry>,
    locator: Arc<FeatureLocator>,
    auth: Arc<AuthService>,
    hub: Arc<WsHub>,
}

impl ConnectionGateway {
    /// Wire the gateway to its collaborators.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        locator: Arc<FeatureLocator>,
        auth: Arc<AuthService>,
        hub: Arc<WsHub>,
    ) -> Self {
        Self {
            registry,
            locator,
            auth,
            hub,
        }
    }

    /// Handle a transport connect.
    ///
    /// Errors are contained: logged and converted into an explicit
    /// disconnect of this connection.
    #[instrument(skip_all, fields(conn = %id))]
    pub fn handle_connect(&self, id: &ConnectionId, remote_addr: String, headers: HeaderSnapshot) {
        if let Err(err) = self.connect_inner(id, remote_addr, headers) {
            error!(conn = %id, error = %err, "error handling connect");
            self.registry.remove(id);
            self.hub.disconnect(id, &format!("error handling connect: {err}"));
        }
    }

    fn connect_inner(
        &self,
        id: &ConnectionId,
        remote_addr: String,
        headers: HeaderSnapshot,
    ) -> Result<(), WsError> {
        info!(conn = %id, %remote_addr, "client connected");
        let _ = self.registry.add(id.clone(), remote_addr, headers);
        if !self
            .hub
            .send_to_connection(id, events::CONNECTED, json!(id))
        {
            return Err(WsError::Unknown("failed to send connected event".into()));
        }
        Ok(())
    }

    /// Handle a transport disconnect: drop the connection from the registry
    /// (which recomputes the aggregate bitmask).
    #[instrument(skip_all, fields(conn = %id))]
    pub fn handle_disconnect(&self, id: &ConnectionId) {
        info!(conn = %id, "client disconnected");
        self.registry.remove(id);
    }

    /// Handle one inbound text frame. Returns the direct response to send
    /// back, if any.
    #[instrument(skip_all, fields(conn = %id, kind))]
    pub async fn handle_message(&self, id: &ConnectionId, text: &str) -> Option<OutboundEvent> {
        let message: ClientMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(conn = %id, "invalid message received");
                let err = WsError::BadRequest(format!("invalid message: {err}"));
                return Some(OutboundEvent::new(events::ERROR, err.to_wire()));
            }
        };

        let kind = message.kind();
        let _ = tracing::Span::current().record("kind", kind);
        counter!("ws_messages_total", "kind" => kind).increment(1);

        if let Err(err) = guard::authorize(&self.registry, id, policy_for(&message), guard::now_epoch())
        {
            warn!(conn = %id, kind, error = %err, "message rejected by guard");
            counter!("ws_rejections_total", "kind" => kind).increment(1);
            return Some(OutboundEvent::new(events::ERROR, err.to_wire()));
        }

        match self.dispatch(id, message).await {
            Ok(response) => response,
            Err(err) => {
                warn!(conn = %id, kind, error = %err, "message handling failed");
                counter!("ws_rejections_total", "kind" => kind).increment(1);
                Some(OutboundEvent::new(events::ERROR, err.to_wire()))
            }
        }
    }

    async fn dispatch(
        &self,
        id: &ConnectionId,
        message: ClientMessage,
    ) -> Result<Option<OutboundEvent>, WsError> {
        match message {
            ClientMessage::Ping(payload)
            | ClientMessage::PingWithAuth(payload)
            | ClientMessage::PingAdminOnly(payload) => Ok(Some(OutboundEvent::new(
                events::PONG,
                payload.unwrap_or(serde_json::Value::Null),
            ))),
            ClientMessage::Auth(request) => self.handle_auth(id, request).await,
            ClientMessage::Logout => {
                self.handle_logout(id);
                Ok(None)
            }
            ClientMessage::AddFeature(feature) => self.handle_add_feature(id, feature).await,
            ClientMessage::RemoveFeature(feature) => {
                self.handle_remove_feature(id, feature);
                Ok(None)
            }
        }
    }

    /// Attach authentication state to the connection.
    ///
    /// On success the connection also joins its user group, subscribing it
    /// to user-targeted pushes.
    async fn handle_auth(
        &self,
        id: &ConnectionId,
        request: AuthRequest,
    ) -> Result<Option<OutboundEvent>, WsError> {
        let Some(token) = request.token else {
            // no case, just for sure if a client sends auth without a token
            debug!(conn = %id, "auth without token, not authorized");
            return Ok(None);
        };

        let (token_info, auth) = self.auth.resolve(&token).await;
        if !self.registry.set_auth(id, auth.clone(), token_info) {
            return Err(WsError::Unknown(format!(
                "connection not found for [{id}] to apply auth"
            )));
        }

        match auth {
            Some(auth) => {
                let user_room = feature::user_group(&auth.name);
                self.hub.join_group(id, user_room);
                debug!(conn = %id, user = %auth.name, "authorized, joined user group");
                Ok(Some(OutboundEvent::new(
                    events::AUTHORIZED,
                    json!(request.reason),
                )))
            }
            None => Ok(Some(OutboundEvent::new(
                events::AUTH_ERROR,
                json!(request.reason),
            ))),
        }
    }

    /// Subscribe the connection to a feature: authorize, join the group,
    /// set the bit, return the initial data.
    async fn handle_add_feature(
        &self,
        id: &ConnectionId,
        feature: Feature,
    ) -> Result<Option<OutboundEvent>, WsError> {
        let Some(conn) = self.registry.get(id) else {
            // tolerated race with disconnect
            error!(conn = %id, %feature, "connection not found to add feature");
            return Ok(Some(OutboundEvent::feature_scoped(
                events::FEATURE_NOT_ADDED,
                feature,
                json!(format!("no connection found for adding feature [{feature}]")),
            )));
        };

        let auth = conn.auth();
        check_initial_data_authorization(feature, id, auth.as_ref())?;

        let group = feature::feature_group(feature, conn.user_name().as_deref());
        self.hub.join_group(id, group);
        self.registry.add_feature(id, feature);

        let data = self.locator.initial_data(auth.as_ref(), feature).await?;
        debug!(conn = %id, %feature, items = data.len(), "feature added");
        Ok(Some(OutboundEvent::feature_scoped(
            events::FEATURE_ADDED,
            feature,
            json!(data),
        )))
    }

    /// Unsubscribe the connection from a feature. Safe no-op for a feature
    /// that was never subscribed, and tolerant of a raced disconnect.
    fn handle_remove_feature(&self, id: &ConnectionId, feature: Feature) {
        let Some(conn) = self.registry.get(id) else {
            warn!(conn = %id, %feature, "connection not found to remove feature");
            return;
        };
        let group = feature::feature_group(feature, conn.user_name().as_deref());
        self.hub.leave_group(id, &group);
        self.registry.remove_feature(id, feature);
        debug!(conn = %id, %feature, "feature removed");
    }

    /// Drop the connection's auth state and leave its user group.
    fn handle_logout(&self, id: &ConnectionId) {
        let user = self
            .registry
            .get(id)
            .and_then(|conn| conn.user_name());
        self.registry.logout(id);
        if let Some(user) = user {
            self.hub.leave_group(id, &feature::user_group(&user));
            debug!(conn = %id, %user, "logged out, left user group");
        }
    }
}

/// Route-level authorization of the initial feature read.
///
/// App config is exempt — it is subscribed before auth. `Role::All` in a
/// feature's role list admits any authenticated user; everything else
/// requires a role overlap.
fn check_initial_data_authorization(
    feature: Feature,
    id: &ConnectionId,
    auth: Option<&Auth>,
) -> Result<(), WsError> {
    if feature == Feature::AppConfig {
        return Ok(());
    }
    let roles = feature::config_for(feature).initial_data_roles;
    if roles.authorizes(auth) {
        return Ok(());
    }
    let user = auth.map_or("<anonymous>", |auth| auth.name.as_str());
    Err(WsError::Unauthorized(format!(
        "feature [{feature}] not authorized to '{user}' for connection [{id}]"
    )))
}
