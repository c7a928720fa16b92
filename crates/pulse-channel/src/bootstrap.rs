use std::time::Duration;

use serde_json::Value;
use tracing::info;

use crate::endpoints::Endpoints;
use crate::session::SessionContext;
use crate::transport::{get_payload, Transport};
use crate::types::{value_to_string, ChannelError};

/// Obtains fresh continuity tokens for the session via a zero-message pull.
///
/// Idempotent; each successful call replaces the session's sticky/pool tokens.
/// Fails with `ChannelError::Protocol` when the response carries no
/// load-balancer continuity info.
pub async fn bootstrap(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    session: &mut SessionContext,
    timeout: Duration,
) -> Result<(), ChannelError> {
    let params = session.request_params(&[
        ("msgs_recv", "0".to_string()),
        ("channel", session.channel_id().to_string()),
        ("clientid", session.client_id().to_string()),
    ]);
    let payload = get_payload(transport, &endpoints.pull_url(), &params, timeout).await?;
    let info = payload
        .get("lb_info")
        .ok_or_else(|| ChannelError::Protocol("missing lb_info in bootstrap response".to_string()))?;
    let sticky = require_token(info, "sticky")?;
    let pool = require_token(info, "pool")?;
    info!(
        channel = endpoints.pull_channel(),
        "pull channel bootstrapped"
    );
    session.set_continuity_tokens(sticky, pool);
    Ok(())
}

fn require_token(info: &Value, field: &str) -> Result<String, ChannelError> {
    info.get(field)
        .and_then(value_to_string)
        .ok_or_else(|| ChannelError::Protocol(format!("missing lb_info.{field} in bootstrap response")))
}
