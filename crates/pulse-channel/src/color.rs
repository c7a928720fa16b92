use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ThreadColor` values.
///
/// The backend names thread themes by ARGB hex tokens; this is the fixed
/// palette the pull channel is known to emit. Tokens outside the palette are
/// preserved verbatim as `Other` rather than failing the event.
pub enum ThreadColor {
    MessengerBlue,
    Viking,
    GoldenPoppy,
    RadicalRed,
    Shocking,
    PictonBlue,
    FreeSpeechGreen,
    Pumpkin,
    LightCoral,
    MediumSlateBlue,
    DeepSkyBlue,
    Fern,
    Cameo,
    BrilliantRose,
    BilobaFlower,
    Other(String),
}

impl ThreadColor {
    /// Maps a raw theme token (`FF0084FF`, `#0084ff`, ...) to a palette entry.
    pub fn from_theme_token(token: &str) -> Self {
        let hex = normalize_theme_token(token);
        match hex.as_str() {
            "#0084ff" => Self::MessengerBlue,
            "#44bec7" => Self::Viking,
            "#ffc300" => Self::GoldenPoppy,
            "#fa3c4c" => Self::RadicalRed,
            "#d696bb" => Self::Shocking,
            "#6699cc" => Self::PictonBlue,
            "#13cf13" => Self::FreeSpeechGreen,
            "#ff7e29" => Self::Pumpkin,
            "#e68585" => Self::LightCoral,
            "#7646ff" => Self::MediumSlateBlue,
            "#20cef5" => Self::DeepSkyBlue,
            "#67b868" => Self::Fern,
            "#d4a88c" => Self::Cameo,
            "#ff5ca1" => Self::BrilliantRose,
            "#a695c7" => Self::BilobaFlower,
            _ => Self::Other(token.to_string()),
        }
    }

    pub fn hex(&self) -> &str {
        match self {
            Self::MessengerBlue => "#0084ff",
            Self::Viking => "#44bec7",
            Self::GoldenPoppy => "#ffc300",
            Self::RadicalRed => "#fa3c4c",
            Self::Shocking => "#d696bb",
            Self::PictonBlue => "#6699cc",
            Self::FreeSpeechGreen => "#13cf13",
            Self::Pumpkin => "#ff7e29",
            Self::LightCoral => "#e68585",
            Self::MediumSlateBlue => "#7646ff",
            Self::DeepSkyBlue => "#20cef5",
            Self::Fern => "#67b868",
            Self::Cameo => "#d4a88c",
            Self::BrilliantRose => "#ff5ca1",
            Self::BilobaFlower => "#a695c7",
            Self::Other(token) => token.as_str(),
        }
    }
}

/// Theme tokens arrive as eight ARGB hex digits; the leading alpha octet is
/// dropped before comparison.
fn normalize_theme_token(token: &str) -> String {
    let raw = token.trim().trim_start_matches('#');
    let rgb = if raw.len() == 8 { &raw[2..] } else { raw };
    format!("#{}", rgb.to_ascii_lowercase())
}
