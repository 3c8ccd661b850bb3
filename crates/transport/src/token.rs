//! LiveKit join tokens

use livekit_api::access_token::{AccessToken, VideoGrants};
use room_assistant_config::TransportSettings;
use std::time::Duration;

use crate::TransportError;

/// Who joins which room, and for how long
#[derive(Debug, Clone)]
pub struct JoinTokenRequest<'a> {
    pub api_key: &'a str,
    pub api_secret: &'a str,
    pub room: &'a str,
    pub identity: &'a str,
    pub ttl: Duration,
}

impl<'a> JoinTokenRequest<'a> {
    pub fn from_settings(settings: &'a TransportSettings, room: &'a str) -> Self {
        Self {
            api_key: &settings.api_key,
            api_secret: &settings.api_secret,
            room,
            identity: &settings.identity,
            ttl: Duration::from_secs(settings.token_ttl_secs),
        }
    }
}

/// Mint a JWT that lets the assistant join, publish and subscribe
pub fn mint_join_token(request: &JoinTokenRequest<'_>) -> Result<String, TransportError> {
    if request.api_key.is_empty() || request.api_secret.is_empty() {
        return Err(TransportError::Token(
            "LiveKit API key and secret are required".to_string(),
        ));
    }

    AccessToken::with_api_key(request.api_key, request.api_secret)
        .with_identity(request.identity)
        .with_name(request.identity)
        .with_grants(VideoGrants {
            room_join: true,
            room: request.room.to_string(),
            can_publish: true,
            can_subscribe: true,
            ..Default::default()
        })
        .with_ttl(request.ttl)
        .to_jwt()
        .map_err(|e| TransportError::Token(e.to_string()))
}
