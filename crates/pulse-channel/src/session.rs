use async_trait::async_trait;
use pulse_core::current_unix_timestamp_ms;

#[async_trait]
/// Trait contract for `AuthSession` behavior.
///
/// Supplied by the embedding application once credential login has produced a
/// valid transport; the listener only needs the viewer identity and a
/// reauthentication hook for stale-session recovery.
pub trait AuthSession: Send + Sync {
    fn viewer_id(&self) -> String;
    fn client_id(&self) -> String;
    async fn reauthenticate(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Per-listen session identity and continuity state.
///
/// Owned and mutated exclusively by the poll loop. The continuity tokens are
/// valid only until the next successful bootstrap; the sequence cursor is an
/// opaque server-assigned marker, replaced wholesale and never interpreted.
pub struct SessionContext {
    viewer_id: String,
    client_id: String,
    channel_id: String,
    sequence_cursor: String,
    sticky_token: Option<String>,
    pool_token: Option<String>,
    last_action_timestamp_ms: u64,
    request_counter: u64,
}

impl SessionContext {
    pub fn new(viewer_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        let viewer_id = viewer_id.into();
        let channel_id = format!("p_{viewer_id}");
        Self {
            viewer_id,
            client_id: client_id.into(),
            channel_id,
            sequence_cursor: "0".to_string(),
            sticky_token: None,
            pool_token: None,
            last_action_timestamp_ms: 0,
            request_counter: 1,
        }
    }

    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn sequence_cursor(&self) -> &str {
        &self.sequence_cursor
    }

    pub fn sticky_token(&self) -> Option<&str> {
        self.sticky_token.as_deref()
    }

    pub fn pool_token(&self) -> Option<&str> {
        self.pool_token.as_deref()
    }

    pub fn has_continuity_tokens(&self) -> bool {
        self.sticky_token.is_some() && self.pool_token.is_some()
    }

    pub fn last_action_timestamp_ms(&self) -> u64 {
        self.last_action_timestamp_ms
    }

    pub(crate) fn set_continuity_tokens(&mut self, sticky: String, pool: String) {
        self.sticky_token = Some(sticky);
        self.pool_token = Some(pool);
    }

    pub(crate) fn clear_continuity_tokens(&mut self) {
        self.sticky_token = None;
        self.pool_token = None;
    }

    pub(crate) fn set_sequence_cursor(&mut self, cursor: String) {
        self.sequence_cursor = cursor;
    }

    /// Builds the parameter list for one outbound request: the caller's query
    /// plus the standing `seq` cursor and the base-36 request counter.
    pub(crate) fn request_params(&mut self, query: &[(&str, String)]) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = query
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect();
        params.push(("seq".to_string(), self.sequence_cursor.clone()));
        params.push(("__req".to_string(), to_base36(self.request_counter)));
        self.request_counter = self.request_counter.wrapping_add(1);
        self.last_action_timestamp_ms = current_unix_timestamp_ms();
        params
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
