//! Role-based access decision for the Secure page.

use crate::claims::Principal;
use crate::settings::{allowed_roles_or_default, RoleSettings, SettingsError};
use crate::telemetry::{
    properties, timestamp, Telemetry, AUTHORIZATION_DENIED, AUTHORIZATION_GRANTED,
};

/// Whether `principal` holds any allowed role. Allowed roles are checked in
/// configured order and the first match wins. A failing settings lookup
/// denies access.
pub fn authorize(
    principal: &Principal,
    user_name: &str,
    settings: &dyn RoleSettings,
    telemetry: &dyn Telemetry,
) -> bool {
    match check(principal, user_name, settings, telemetry) {
        Ok(authorized) => authorized,
        Err(e) => {
            telemetry.track_exception(&e);
            tracing::error!("Error checking authorization: {}", e);
            false
        }
    }
}

fn check(
    principal: &Principal,
    user_name: &str,
    settings: &dyn RoleSettings,
    telemetry: &dyn Telemetry,
) -> Result<bool, SettingsError> {
    let allowed = allowed_roles_or_default(settings)?;

    if let Some(role) = allowed.iter().find(|role| principal.is_in_role(role)) {
        telemetry.track_event(
            AUTHORIZATION_GRANTED,
            properties([
                ("UserName", user_name.to_string()),
                ("Role", role.clone()),
                ("Timestamp", timestamp()),
            ]),
        );
        return Ok(true);
    }

    telemetry.track_event(
        AUTHORIZATION_DENIED,
        properties([
            ("UserName", user_name.to_string()),
            ("RequiredRoles", allowed.join(", ")),
            ("Timestamp", timestamp()),
        ]),
    );
    Ok(false)
}
