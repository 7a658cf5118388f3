//! Password handshake performed right after dialing

use tracing::{debug, info, warn};

use crate::{
    command::EslCommand,
    connection::EslConnection,
    constants::{AUTH_ACCEPTED, CONTENT_TYPE_AUTH_REQUEST},
    error::{EslError, EslResult},
    protocol::{ContentType, EslMessage},
};

/// Where a connection stands in the login exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing read yet.
    Unauthenticated,
    /// Handshake in progress.
    AwaitingChallenge,
    /// Server answered `+OK accepted`.
    Authenticated,
    /// Server replied without `-ERR` but did not accept; holds its Reply-Text.
    NotAccepted(String),
    /// Server reported an error or the exchange broke; holds the reason.
    Failed(String),
}

impl AuthState {
    /// Failure reason, if the handshake failed.
    pub fn reason(&self) -> Option<&str> {
        match self {
            AuthState::NotAccepted(reason) | AuthState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl EslConnection {
    /// Answer the server's auth challenge with the configured password.
    ///
    /// Returns `Ok(true)` once the server replies `+OK accepted`. A reply that
    /// neither accepts nor carries `-ERR` yields `Ok(false)`. A `-ERR` reply
    /// becomes [`EslError::LoginFailed`] with the server's text, and a first
    /// frame other than `auth/request` is [`EslError::UnexpectedContentType`].
    ///
    /// Calling again after success is a no-op. The server does not re-issue
    /// the challenge, so a repeated call after a refusal reports the earlier
    /// outcome: [`EslError::LoginIncomplete`] if the reply was merely not
    /// accepted, [`EslError::LoginFailed`] otherwise.
    pub async fn login(&mut self) -> EslResult<bool> {
        match &self.auth_state {
            AuthState::Authenticated => {
                debug!("[AUTH] Already authenticated");
                return Ok(true);
            }
            AuthState::NotAccepted(reply_text) => {
                return Err(EslError::LoginIncomplete {
                    reply_text: reply_text.clone(),
                })
            }
            AuthState::Failed(reason) => return Err(EslError::auth_failed(reason.clone())),
            AuthState::Unauthenticated | AuthState::AwaitingChallenge => {}
        }

        self.auth_state = AuthState::AwaitingChallenge;
        match self
            .authenticate()
            .await
        {
            Ok(reply) => {
                let reply_text = reply
                    .reply_text()
                    .unwrap_or_default();
                if reply_text == AUTH_ACCEPTED {
                    info!("[AUTH] Authenticated with {}", self.host());
                    self.auth_state = AuthState::Authenticated;
                    Ok(true)
                } else {
                    warn!("[AUTH] Login not accepted, Reply-Text: {:?}", reply_text);
                    self.auth_state = AuthState::NotAccepted(reply_text);
                    Ok(false)
                }
            }
            Err(e) => {
                warn!("[AUTH] Login failed: {}", e);
                let reason = match &e {
                    EslError::LoginFailed { reason } => reason.clone(),
                    other => other.to_string(),
                };
                self.auth_state = AuthState::Failed(reason);
                Err(e)
            }
        }
    }

    /// `true` once [`login`](Self::login) has succeeded.
    pub fn authenticated(&self) -> bool {
        self.auth_state == AuthState::Authenticated
    }

    /// Current handshake state.
    pub fn auth_state(&self) -> &AuthState {
        &self.auth_state
    }

    async fn authenticate(&mut self) -> EslResult<EslMessage> {
        debug!("[AUTH] Waiting for auth request");
        let challenge = self
            .read_message()
            .await?;
        if challenge.content_type() != &ContentType::AuthRequest {
            return Err(EslError::UnexpectedContentType {
                expected: CONTENT_TYPE_AUTH_REQUEST.to_string(),
                actual: challenge
                    .content_type()
                    .to_string(),
            });
        }

        let auth = EslCommand::Auth {
            password: self
                .password()
                .to_string(),
        };
        self.send_command(&auth)
            .await?;

        let reply = self
            .read_message()
            .await?;
        debug!("[AUTH] Reply: {}", reply.reply_text().unwrap_or_default());
        if let Some(reason) = reply.error_detail() {
            return Err(EslError::auth_failed(reason));
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_reason() {
        assert_eq!(AuthState::Failed("invalid".into()).reason(), Some("invalid"));
        assert_eq!(AuthState::NotAccepted("+OK".into()).reason(), Some("+OK"));
        assert_eq!(AuthState::Authenticated.reason(), None);
        assert_eq!(AuthState::Unauthenticated.reason(), None);
    }
}
