//! Inbound-message authorization guard.
//!
//! The WebSocket protocol itself carries no per-message credentials; the
//! connection is authenticated once by the `auth` message and every later
//! guarded message is checked against the state cached on the connection.
//!
//! The checks run in fixed order, short-circuiting on the first applicable
//! decision:
//!
//! 1. message kind marked no-auth → allow
//! 2. no connection for this id → reject
//! 3. connection has no token info → reject
//! 4. cached token invalid → reject (cached reason)
//! 5. token expired right now → flip `valid=false`, reject. Lazy only — a
//!    connection can silently become unauthorized between messages, there
//!    is no background sweep.
//! 6. required roles don't overlap the connection's role bits → reject
//! 7. allow

use relay_core::{ConnectionId, Role, RoleBits, WsError};
use relay_hub::ConnectionRegistry;
use tracing::debug;

use crate::message::ClientMessage;

/// Per-message-kind guard policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GuardPolicy {
    /// Skip the guard entirely for this message kind.
    pub no_auth: bool,
    /// Roles required on top of a valid token, if any.
    pub required_roles: Option<RoleBits>,
}

impl GuardPolicy {
    const OPEN: Self = Self {
        no_auth: true,
        required_roles: None,
    };

    const AUTHENTICATED: Self = Self {
        no_auth: false,
        required_roles: None,
    };

    fn roles(roles: &[Role]) -> Self {
        Self {
            no_auth: false,
            required_roles: Some(RoleBits::from_roles(roles)),
        }
    }
}

/// Guard policy of a message kind.
///
/// `auth` is open because it establishes the auth state in the first place;
/// `add_feature`/`remove_feature` are open at the route level (the bootstrap
/// feature is subscribed before auth, and unsubscribes can arrive after
/// logout) — subscribe enforces its own feature-level authorization.
#[must_use]
pub fn policy_for(message: &ClientMessage) -> GuardPolicy {
    match message {
        ClientMessage::Ping(_)
        | ClientMessage::Auth(_)
        | ClientMessage::AddFeature(_)
        | ClientMessage::RemoveFeature(_) => GuardPolicy::OPEN,
        ClientMessage::PingWithAuth(_) | ClientMessage::Logout => GuardPolicy::AUTHENTICATED,
        ClientMessage::PingAdminOnly(_) => GuardPolicy::roles(&[Role::Admin]),
    }
}

/// Run the guard for one inbound message.
///
/// `now_epoch` is the current time in epoch seconds, passed in for
/// testability.
pub fn authorize(
    registry: &ConnectionRegistry,
    conn_id: &ConnectionId,
    policy: GuardPolicy,
    now_epoch: i64,
) -> Result<(), WsError> {
    if policy.no_auth {
        return Ok(());
    }

    let Some(conn) = registry.get(conn_id) else {
        return Err(WsError::Unauthorized(format!(
            "no connection found for [{conn_id}]"
        )));
    };

    let Some(token_info) = conn.token_info() else {
        return Err(WsError::Unauthorized(format!(
            "no auth token found in connection [{conn_id}]"
        )));
    };

    if !token_info.valid {
        let reason = token_info
            .reason
            .unwrap_or_else(|| "token is not valid".to_owned());
        return Err(WsError::Unauthorized(format!(
            "token is not valid in connection [{conn_id}]: {reason}"
        )));
    }

    // re-check expiration against the current time
    if token_info.expiration < now_epoch {
        conn.invalidate_token("token has expired");
        debug!(conn = %conn_id, expiration = token_info.expiration, now = now_epoch, "token expired");
        return Err(WsError::Unauthorized(format!(
            "token has expired in connection [{conn_id}]"
        )));
    }

    if let Some(required) = policy.required_roles {
        if !conn.roles().intersects(required) {
            return Err(WsError::Unauthorized("not authorized by roles".into()));
        }
    }

    Ok(())
}

/// Current time in epoch seconds.
#[must_use]
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Auth, TokenInfo};
    use relay_hub::HeaderSnapshot;
    use serde_json::json;

    const NOW: i64 = 1_000_000;

    fn registry_with_conn() -> (ConnectionRegistry, ConnectionId) {
        let registry = ConnectionRegistry::new();
        let id = ConnectionId::from("c1");
        let _ = registry.add(id.clone(), "127.0.0.1:1".into(), HeaderSnapshot::default());
        (registry, id)
    }

    fn apply_auth(registry: &ConnectionRegistry, id: &ConnectionId, roles: &[Role], exp: i64) {
        let auth = Auth {
            id: 1,
            name: "alice".into(),
            roles: roles.to_vec(),
        };
        let _ = registry.set_auth(
            id,
            Some(auth),
            TokenInfo {
                token: "tok".into(),
                valid: true,
                expiration: exp,
                reason: None,
            },
        );
    }

    fn parse(raw: &str) -> ClientMessage {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn open_kinds_bypass_everything() {
        let registry = ConnectionRegistry::new();
        // no connection registered at all
        let id = ConnectionId::from("ghost");
        for raw in [
            r#"{"event": "ping"}"#,
            r#"{"event": "auth", "data": {"reason": "LOGIN"}}"#,
            r#"{"event": "add_feature", "data": "COUNTER"}"#,
            r#"{"event": "remove_feature", "data": "COUNTER"}"#,
        ] {
            let policy = policy_for(&parse(raw));
            assert!(authorize(&registry, &id, policy, NOW).is_ok(), "{raw}");
        }
    }

    #[test]
    fn missing_connection_is_rejected() {
        let registry = ConnectionRegistry::new();
        let policy = policy_for(&parse(r#"{"event": "ping_with_auth"}"#));
        let err = authorize(&registry, &ConnectionId::from("ghost"), policy, NOW).unwrap_err();
        assert!(matches!(err, WsError::Unauthorized(_)));
        assert!(err.to_string().contains("no connection"));
    }

    #[test]
    fn missing_token_is_rejected() {
        let (registry, id) = registry_with_conn();
        let policy = policy_for(&parse(r#"{"event": "ping_with_auth"}"#));
        let err = authorize(&registry, &id, policy, NOW).unwrap_err();
        assert!(err.to_string().contains("no auth token"));
    }

    #[test]
    fn invalid_token_rejected_with_cached_reason() {
        let (registry, id) = registry_with_conn();
        let _ = registry.set_auth(
            &id,
            None,
            TokenInfo {
                token: "tok".into(),
                valid: false,
                expiration: NOW + 100,
                reason: Some("signature mismatch".into()),
            },
        );
        let policy = policy_for(&parse(r#"{"event": "ping_with_auth"}"#));
        let err = authorize(&registry, &id, policy, NOW).unwrap_err();
        assert!(err.to_string().contains("signature mismatch"));
    }

    #[test]
    fn expired_token_is_rejected_and_flipped_invalid() {
        let (registry, id) = registry_with_conn();
        apply_auth(&registry, &id, &[Role::User], NOW - 1);
        let policy = policy_for(&parse(r#"{"event": "ping_with_auth"}"#));

        let err = authorize(&registry, &id, policy, NOW).unwrap_err();
        assert!(err.to_string().contains("expired"));

        // the flip persists: the next check fails at the cheaper validity
        // step with the recorded reason
        let err = authorize(&registry, &id, policy, NOW).unwrap_err();
        assert!(err.to_string().contains("token has expired"));
        let info = registry.get(&id).unwrap().token_info().unwrap();
        assert!(!info.valid);
    }

    #[test]
    fn role_mismatch_is_rejected() {
        let (registry, id) = registry_with_conn();
        apply_auth(&registry, &id, &[Role::User], NOW + 3600);
        let policy = policy_for(&parse(r#"{"event": "ping_admin_only"}"#));
        let err = authorize(&registry, &id, policy, NOW).unwrap_err();
        assert!(err.to_string().contains("not authorized by roles"));
    }

    #[test]
    fn admin_passes_the_role_check() {
        let (registry, id) = registry_with_conn();
        apply_auth(&registry, &id, &[Role::Admin], NOW + 3600);
        let policy = policy_for(&parse(r#"{"event": "ping_admin_only"}"#));
        assert!(authorize(&registry, &id, policy, NOW).is_ok());
    }

    #[test]
    fn valid_token_without_role_restriction_passes() {
        let (registry, id) = registry_with_conn();
        apply_auth(&registry, &id, &[Role::User], NOW + 3600);
        let policy = policy_for(&parse(r#"{"event": "ping_with_auth"}"#));
        assert!(authorize(&registry, &id, policy, NOW).is_ok());
    }

    #[test]
    fn logout_is_guarded() {
        let policy = policy_for(&parse(r#"{"event": "logout"}"#));
        assert!(!policy.no_auth);
        assert!(policy.required_roles.is_none());
    }

    #[test]
    fn ping_payload_does_not_change_policy() {
        let with = policy_for(&ClientMessage::Ping(Some(json!("x"))));
        let without = policy_for(&ClientMessage::Ping(None));
        assert_eq!(with, without);
    }

    #[test]
    fn expiration_boundary_is_inclusive() {
        let (registry, id) = registry_with_conn();
        apply_auth(&registry, &id, &[Role::User], NOW);
        let policy = policy_for(&parse(r#"{"event": "ping_with_auth"}"#));
        // expiration == now is still valid (strictly-less-than comparison)
        assert!(authorize(&registry, &id, policy, NOW).is_ok());
    }
}
