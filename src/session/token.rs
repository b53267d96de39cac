//! Signed game tokens handed out when a game is created

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::game::types::Side;
use crate::util::time::unix_secs;

type HmacSha256 = Hmac<Sha256>;

/// How long a player has to open the game socket after the handoff
pub const GAME_TOKEN_TTL_SECS: u64 = 5 * 60;

/// Claims carried by a game token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameClaims {
    pub session: Uuid,
    pub side: Side,
    pub admiral: Uuid,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Issues and checks `base64url(claims).hex(hmac)` tokens
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)
    }

    pub fn issue(&self, session: Uuid, side: Side, admiral: Uuid) -> Result<String, TokenError> {
        self.issue_claims(&GameClaims {
            session,
            side,
            admiral,
            exp: unix_secs() + GAME_TOKEN_TTL_SECS,
        })
    }

    pub fn issue_claims(&self, claims: &GameClaims) -> Result<String, TokenError> {
        let json = serde_json::to_vec(claims).map_err(|_| TokenError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.encode(json);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", payload, signature))
    }

    pub fn verify(&self, token: &str) -> Result<GameClaims, TokenError> {
        let (payload, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: GameClaims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;

        if claims.exp < unix_secs() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed game token")]
    Malformed,

    #[error("Game token signature does not match")]
    BadSignature,

    #[error("Game token expired")]
    Expired,

    #[error("Token signing key is unusable")]
    InvalidKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_and_verify() {
        let signer = TokenSigner::new("test-secret");
        let session = Uuid::new_v4();
        let admiral = Uuid::new_v4();
        let token = signer.issue(session, Side::Guest, admiral).unwrap();
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims.session, session);
        assert_eq!(claims.side, Side::Guest);
        assert_eq!(claims.admiral, admiral);
    }

    #[test]
    fn test_tampering_and_expiry_are_rejected() {
        let signer = TokenSigner::new("test-secret");
        let token = signer.issue(Uuid::new_v4(), Side::Host, Uuid::new_v4()).unwrap();

        let other = TokenSigner::new("other-secret");
        assert_eq!(other.verify(&token), Err(TokenError::BadSignature));
        assert_eq!(signer.verify("no-dot"), Err(TokenError::Malformed));

        let expired = signer
            .issue_claims(&GameClaims {
                session: Uuid::new_v4(),
                side: Side::Host,
                admiral: Uuid::new_v4(),
                exp: 1,
            })
            .unwrap();
        assert_eq!(signer.verify(&expired), Err(TokenError::Expired));
    }
}
