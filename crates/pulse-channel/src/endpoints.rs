/// Host template for the pull edge; `{}` is replaced by the current pull
/// channel index.
pub const DEFAULT_EDGE_HOST_TEMPLATE: &str = "https://{}-edge-chat.facebook.com";

/// Pull channel indices cycle 0..PULL_CHANNEL_COUNT.
pub const PULL_CHANNEL_COUNT: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Renders pull and ping URLs for the currently selected edge channel.
///
/// The backend exposes several interchangeable pull edges; when one reports
/// overload the listener rotates to the next and re-bootstraps against it.
pub struct Endpoints {
    host_template: String,
    pull_channel: u8,
}

impl Endpoints {
    pub fn new(host_template: impl Into<String>) -> Self {
        Self {
            host_template: host_template.into(),
            pull_channel: 0,
        }
    }

    pub fn pull_channel(&self) -> u8 {
        self.pull_channel
    }

    pub fn pull_url(&self) -> String {
        format!("{}/pull", self.host())
    }

    pub fn ping_url(&self) -> String {
        format!("{}/active_ping", self.host())
    }

    /// Selects the next pull channel variant, wrapping around the cycle.
    pub fn rotate(&mut self) {
        self.pull_channel = (self.pull_channel + 1) % PULL_CHANNEL_COUNT;
    }

    fn host(&self) -> String {
        self.host_template
            .replace("{}", &self.pull_channel.to_string())
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_EDGE_HOST_TEMPLATE)
    }
}
