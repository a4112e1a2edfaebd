//! Principal validation predicates.
//!
//! Handlers that act on behalf of a PID named in the request check it here
//! first. The banned list comes from the repository; everything else is
//! session state.

use thiserror::Error;

use crate::session::SessionState;

/// Why a claimed PID was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// PID was never authenticated on this connection
    #[error("pid {pid} is not authenticated on this connection")]
    NotAuthenticated {
        /// Claimed PID
        pid: u32,
    },

    /// PID is the console's master user
    #[error("pid {pid} is a master user")]
    MasterUser {
        /// Claimed PID
        pid: u32,
    },

    /// PID is on the banned list
    #[error("pid {pid} is banned")]
    Banned {
        /// Claimed PID
        pid: u32,
    },
}

/// `pid` was authenticated on this connection.
pub fn validate_client_pid(session: &SessionState, pid: u32) -> Result<(), ValidationError> {
    if pid != 0 && session.pid_stack.contains(pid) {
        Ok(())
    } else {
        Err(ValidationError::NotAuthenticated { pid })
    }
}

/// [`validate_client_pid`], and `pid` is neither the master user nor banned.
pub fn validate_non_master_client_pid(
    session: &SessionState,
    pid: u32,
    banned: &[u32],
) -> Result<(), ValidationError> {
    validate_client_pid(session, pid)?;
    if session.is_master_pid(pid) {
        return Err(ValidationError::MasterUser { pid });
    }
    if banned.contains(&pid) {
        return Err(ValidationError::Banned { pid });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{platform::Platform, session::Endpoint};

    fn session() -> SessionState {
        let mut s = SessionState::new(Endpoint::Secure, Platform::Wii, "127.0.0.1:1".parse().unwrap(), 1);
        s.machine_id = 50;
        s.authenticate(50, "Wii (0000000000000001)");
        s.authenticate(1001, "alice");
        s
    }

    #[test]
    fn any_stacked_pid_is_valid() {
        let s = session();
        assert_eq!(validate_client_pid(&s, 1001), Ok(()));
        assert_eq!(validate_client_pid(&s, 50), Ok(()));
        assert_eq!(validate_client_pid(&s, 2), Err(ValidationError::NotAuthenticated { pid: 2 }));
        assert_eq!(validate_client_pid(&s, 0), Err(ValidationError::NotAuthenticated { pid: 0 }));
    }

    #[test]
    fn master_and_banned_rejected() {
        let s = session();
        assert_eq!(validate_non_master_client_pid(&s, 1001, &[]), Ok(()));
        assert_eq!(validate_non_master_client_pid(&s, 50, &[]), Err(ValidationError::MasterUser { pid: 50 }));
        assert_eq!(validate_non_master_client_pid(&s, 1001, &[1001]), Err(ValidationError::Banned { pid: 1001 }));
    }
}
