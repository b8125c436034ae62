//! Session configuration and the full `Session` object.
//!
//! `SessionConfig` is the effective, fully-resolved configuration a session
//! carries at any moment. `SessionConfigPatch` is the partial shape accepted
//! by `session.update` — every field optional, merged into `SessionConfig`
//! by [`SessionConfig::apply_patch`] rather than by serde magic, so the
//! deep-merge-vs-replace distinction in the spec stays auditable in one
//! place.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Audio format
// ============================================================================

/// Audio format for input/output.
///
/// The gateway only recognizes 16-bit signed little-endian PCM at 24 kHz.
/// Any other declared value fails to deserialize, which the session layer
/// reports as `invalid_request` — there is deliberately no variant for
/// other formats to decay into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    #[default]
    Pcm16,
}

// ============================================================================
// Voice
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl Default for Voice {
    fn default() -> Self {
        Self::Alloy
    }
}

// ============================================================================
// Modality
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Audio,
}

// ============================================================================
// Turn detection
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
    #[serde(rename = "none")]
    Disabled,
}

impl TurnDetection {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;
    pub const DEFAULT_PREFIX_MS: u32 = 300;
    pub const DEFAULT_SILENCE_MS: u32 = 500;

    pub fn threshold(&self) -> f32 {
        match self {
            Self::ServerVad { threshold, .. } => threshold.unwrap_or(Self::DEFAULT_THRESHOLD),
            Self::Disabled => Self::DEFAULT_THRESHOLD,
        }
    }

    pub fn prefix_ms(&self) -> u32 {
        match self {
            Self::ServerVad { prefix_padding_ms, .. } => {
                prefix_padding_ms.unwrap_or(Self::DEFAULT_PREFIX_MS)
            }
            Self::Disabled => Self::DEFAULT_PREFIX_MS,
        }
    }

    pub fn silence_ms(&self) -> u32 {
        match self {
            Self::ServerVad { silence_duration_ms, .. } => {
                silence_duration_ms.unwrap_or(Self::DEFAULT_SILENCE_MS)
            }
            Self::Disabled => Self::DEFAULT_SILENCE_MS,
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Disabled)
    }
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self::ServerVad {
            threshold: None,
            prefix_padding_ms: None,
            silence_duration_ms: None,
        }
    }
}

// ============================================================================
// Input audio transcription
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

// ============================================================================
// Tools
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type", default = "default_tool_type")]
    pub tool_type: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Value,
}

fn default_tool_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Function(ToolChoiceFunction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoiceMode {
    Auto,
    None,
    Required,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    #[serde(rename = "type")]
    pub choice_type: String,
    pub function: ToolChoiceFunctionName,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoiceFunctionName {
    pub name: String,
}

impl Default for ToolChoice {
    fn default() -> Self {
        Self::Mode(ToolChoiceMode::Auto)
    }
}

impl ToolChoice {
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function(ToolChoiceFunction {
            choice_type: "function".to_string(),
            function: ToolChoiceFunctionName { name: name.into() },
        })
    }
}

// ============================================================================
// Max tokens
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxResponseOutputTokens {
    Inf,
    Number(u32),
}

impl MaxResponseOutputTokens {
    pub fn as_limit(&self) -> Option<u32> {
        match self {
            Self::Inf => None,
            Self::Number(n) => Some(*n),
        }
    }
}

impl Default for MaxResponseOutputTokens {
    fn default() -> Self {
        Self::Inf
    }
}

impl Serialize for MaxResponseOutputTokens {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::Inf => serializer.serialize_str("inf"),
            Self::Number(n) => serializer.serialize_u32(*n),
        }
    }
}

impl<'de> Deserialize<'de> for MaxResponseOutputTokens {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct V;
        impl<'de> Visitor<'de> for V {
            type Value = MaxResponseOutputTokens;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("\"inf\" or a non-negative integer")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value == "inf" {
                    Ok(MaxResponseOutputTokens::Inf)
                } else {
                    Err(de::Error::custom(format!("expected \"inf\", got \"{value}\"")))
                }
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u32::try_from(value)
                    .map(MaxResponseOutputTokens::Number)
                    .map_err(|_| de::Error::custom(format!("value {value} out of range")))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(de::Error::custom(format!("value {value} out of range")));
                }
                self.visit_u64(value as u64)
            }
        }

        deserializer.deserialize_any(V)
    }
}

// ============================================================================
// Intent
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    Conversation,
    Transcription,
}

// ============================================================================
// Session configuration (effective state)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub instructions: String,
    pub modalities: Vec<Modality>,
    pub voice: Voice,
    pub input_audio_format: AudioFormat,
    pub output_audio_format: AudioFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub temperature: f32,
    pub max_response_output_tokens: MaxResponseOutputTokens,
    pub intent: Intent,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            instructions: String::new(),
            modalities: vec![Modality::Text, Modality::Audio],
            voice: Voice::default(),
            input_audio_format: AudioFormat::default(),
            output_audio_format: AudioFormat::default(),
            input_audio_transcription: None,
            turn_detection: Some(TurnDetection::default()),
            tools: Vec::new(),
            tool_choice: ToolChoice::default(),
            temperature: 0.8,
            max_response_output_tokens: MaxResponseOutputTokens::default(),
            intent: Intent::default(),
        }
    }
}

impl SessionConfig {
    /// Apply a `session.update` patch, deep-merging nested objects and
    /// replacing list-valued fields wholesale (spec §9 "Configuration
    /// merge"). Unknown keys are ignored by construction — the patch type
    /// only knows the fields below.
    pub fn apply_patch(&mut self, patch: SessionConfigPatch) {
        if let Some(instructions) = patch.instructions {
            self.instructions = instructions;
        }
        if let Some(modalities) = patch.modalities {
            self.modalities = modalities;
        }
        if let Some(voice) = patch.voice {
            self.voice = voice;
        }
        if let Some(format) = patch.input_audio_format {
            self.input_audio_format = format;
        }
        if let Some(format) = patch.output_audio_format {
            self.output_audio_format = format;
        }
        match (patch.input_audio_transcription, &mut self.input_audio_transcription) {
            (Some(Some(incoming)), Some(existing)) => {
                existing.model = incoming.model;
                if incoming.language.is_some() {
                    existing.language = incoming.language;
                }
                if incoming.prompt.is_some() {
                    existing.prompt = incoming.prompt;
                }
            }
            (Some(patch_value), slot) => *slot = patch_value,
            (None, _) => {}
        }
        match (patch.turn_detection, &mut self.turn_detection) {
            (
                Some(Some(TurnDetection::ServerVad {
                    threshold: incoming_threshold,
                    prefix_padding_ms: incoming_prefix,
                    silence_duration_ms: incoming_silence,
                })),
                Some(TurnDetection::ServerVad {
                    threshold,
                    prefix_padding_ms,
                    silence_duration_ms,
                }),
            ) => {
                if incoming_threshold.is_some() {
                    *threshold = incoming_threshold;
                }
                if incoming_prefix.is_some() {
                    *prefix_padding_ms = incoming_prefix;
                }
                if incoming_silence.is_some() {
                    *silence_duration_ms = incoming_silence;
                }
            }
            (Some(patch_value), slot) => *slot = patch_value,
            (None, _) => {}
        }
        if let Some(tools) = patch.tools {
            self.tools = tools;
        }
        if let Some(tool_choice) = patch.tool_choice {
            self.tool_choice = tool_choice;
        }
        if let Some(temperature) = patch.temperature {
            self.temperature = temperature;
        }
        if let Some(max_tokens) = patch.max_response_output_tokens {
            self.max_response_output_tokens = max_tokens;
        }
        if let Some(intent) = patch.intent {
            self.intent = intent;
        }
    }
}

/// The partial shape accepted by `session.update`. Every field optional;
/// a field's absence means "leave unchanged".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<Modality>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<Voice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_format: Option<AudioFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_format: Option<AudioFormat>,
    /// `Some(None)` clears transcription; `Some(Some(cfg))` sets/merges it.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_double_option",
        default
    )]
    pub input_audio_transcription: Option<Option<InputAudioTranscription>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<Option<TurnDetection>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_response_output_tokens: Option<MaxResponseOutputTokens>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
}

fn deserialize_double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ============================================================================
// Full session object (wire representation)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub object: String,
    pub model: String,
    #[serde(flatten)]
    pub config: SessionConfig,
}

impl Session {
    pub fn new(id: impl Into<String>, model: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            id: id.into(),
            object: "realtime.session".to_string(),
            model: model.into(),
            config,
        }
    }
}
