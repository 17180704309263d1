//! Routing-context codec.
//!
//! Stamps the account/secret/dialing-code triple into message metadata
//! under a reserved key so an outbound reply can be routed back to the
//! right device without consulting the account registry again. Every bus
//! message is self-describing for routing purposes; there is no session
//! table.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::account::AccountContext;

/// Reserved metadata key holding the routing context.
pub const METADATA_KEY: &str = "smssync";

#[derive(Debug, Serialize, Deserialize)]
struct MsgInfo {
    account_id: String,
    secret: String,
    dialing_code: String,
}

/// Decode failure.
///
/// Fatal for the single message carrying it: without a routing context
/// the message cannot be assigned to any account's queue.
#[derive(Debug, Error)]
pub enum MsgInfoError {
    /// The reserved key is absent from the metadata map.
    #[error("metadata has no '{METADATA_KEY}' routing context")]
    MissingContext,
    /// The reserved key holds something other than a routing context.
    #[error("routing context invalid: {0}")]
    InvalidContext(String),
}

/// Write `ctx` into `metadata` under [`METADATA_KEY`].
///
/// Non-destructive: other metadata keys are left untouched.
pub fn encode(ctx: &AccountContext, metadata: &mut Map<String, Value>) {
    let info = MsgInfo {
        account_id: ctx.account_id.clone(),
        secret: ctx.secret.clone(),
        dialing_code: ctx.dialing_code.clone(),
    };
    metadata.insert(METADATA_KEY.to_string(), serde_json::json!(info));
}

/// Read the routing context back out of `metadata`.
pub fn decode(metadata: &Map<String, Value>) -> Result<AccountContext, MsgInfoError> {
    let value = metadata
        .get(METADATA_KEY)
        .ok_or(MsgInfoError::MissingContext)?;
    let info: MsgInfo = serde_json::from_value(value.clone())
        .map_err(|e| MsgInfoError::InvalidContext(e.to_string()))?;

    if info.account_id.is_empty() {
        return Err(MsgInfoError::InvalidContext(
            "empty account_id".to_string(),
        ));
    }

    Ok(AccountContext {
        account_id: info.account_id,
        secret: info.secret,
        dialing_code: info.dialing_code,
    })
}
