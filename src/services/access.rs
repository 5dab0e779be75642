use crate::{
    error::AppError,
    models::trip::{Role, Trip},
};

/// Role of `user_id` on `trip`, or `None` for strangers.
pub fn resolve_access(trip: &Trip, user_id: &str) -> Option<Role> {
    if trip.owner_id == user_id {
        return Some(Role::Owner);
    }
    trip.collaborator(user_id).map(|c| c.role.into())
}

pub fn require_read(trip: &Trip, user_id: &str) -> Result<Option<Role>, AppError> {
    let role = resolve_access(trip, user_id);
    if role.is_none() && !trip.is_public {
        return Err(AppError::Forbidden);
    }
    Ok(role)
}

pub fn require_write(trip: &Trip, user_id: &str) -> Result<Role, AppError> {
    match resolve_access(trip, user_id) {
        Some(role) if role.can_write() => Ok(role),
        _ => Err(AppError::Forbidden),
    }
}

pub fn require_owner(trip: &Trip, user_id: &str) -> Result<(), AppError> {
    match resolve_access(trip, user_id) {
        Some(Role::Owner) => Ok(()),
        _ => Err(AppError::Forbidden),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::trip::{Collaborator, CollaboratorRole};

    fn trip() -> Trip {
        let mut trip = Trip::new("owner", "Lisbon");
        trip.collaborators = vec![
            Collaborator {
                user_id: "ed".into(),
                role: CollaboratorRole::Editor,
            },
            Collaborator {
                user_id: "vi".into(),
                role: CollaboratorRole::Viewer,
            },
        ];
        trip
    }

    #[test]
    fn owner_resolves_to_owner() {
        assert_eq!(resolve_access(&trip(), "owner"), Some(Role::Owner));
    }

    #[test]
    fn collaborators_resolve_to_their_role() {
        let trip = trip();
        assert_eq!(resolve_access(&trip, "ed"), Some(Role::Editor));
        assert_eq!(resolve_access(&trip, "vi"), Some(Role::Viewer));
    }

    #[test]
    fn stranger_resolves_to_none() {
        assert_eq!(resolve_access(&trip(), "stranger"), None);
    }

    #[test]
    fn guards_follow_role() {
        let trip = trip();
        assert!(require_write(&trip, "ed").is_ok());
        assert!(matches!(require_write(&trip, "vi"), Err(AppError::Forbidden)));
        assert!(matches!(require_owner(&trip, "ed"), Err(AppError::Forbidden)));
        assert!(require_read(&trip, "vi").is_ok());
        assert!(matches!(require_read(&trip, "stranger"), Err(AppError::Forbidden)));
    }

    #[test]
    fn public_trips_are_readable_by_anyone() {
        let mut trip = trip();
        trip.is_public = true;
        assert_eq!(require_read(&trip, "stranger").ok(), Some(None));
        assert!(require_write(&trip, "stranger").is_err());
    }
}
