//! Stage keys, roles and the handler trait.

use std::fmt;

use crate::{message::HttpObject, payload::Payload};

/// Stable identifier of a pipeline stage.
///
/// Extractors are keyed by the stage they serve rather than by a derived
/// string, so looking one up never depends on naming conventions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StageKey {
    /// A stage installed under a caller-chosen name.
    Named(String),
    /// The extractor serving the named stage.
    Extractor(String),
}

impl StageKey {
    /// Key for a caller-named stage.
    pub fn named(name: impl Into<String>) -> Self { Self::Named(name.into()) }

    /// Key for the extractor placed ahead of `name`.
    pub fn extractor_for(name: impl Into<String>) -> Self { Self::Extractor(name.into()) }

    /// Name of the stage this key refers to or serves.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) | Self::Extractor(name) => name,
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Extractor(name) => write!(f, "{name}$extractor"),
        }
    }
}

/// What a handler does to the messages passing through it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandlerRole {
    /// Observes or transforms inbound messages.
    Inbound,
    /// Observes or transforms outbound messages only.
    Outbound,
    /// Decodes raw bytes into framed objects.
    Decoder,
    /// Decodes and encodes framed objects in both directions.
    Codec,
    /// A combined decoder/encoder pair installed as one stage.
    Composite,
    /// Splits framed HTTP objects back into raw payload.
    Extractor,
    /// Terminates TLS for the connection.
    Tls,
}

impl HandlerRole {
    /// Returns `true` for roles that expect raw bytes as input and therefore
    /// need an extractor in front of them once HTTP objects are flowing.
    #[must_use]
    pub fn needs_extractor(self) -> bool { matches!(self, Self::Decoder | Self::Codec | Self::Composite) }
}

/// A message travelling through the pipeline.
#[derive(Debug)]
pub enum PipelineMessage {
    /// Raw payload bytes.
    Bytes(Payload),
    /// A framed HTTP object.
    Http(HttpObject),
}

/// Collects the messages a stage passes on to the next one.
#[derive(Debug, Default)]
pub struct Forward(Vec<PipelineMessage>);

impl Forward {
    /// Pass `message` to the next stage.
    pub fn push(&mut self, message: PipelineMessage) { self.0.push(message); }

    /// Messages forwarded so far.
    #[must_use]
    pub fn into_messages(self) -> Vec<PipelineMessage> { self.0 }
}

/// A pipeline stage.
pub trait Handler: Send + 'static {
    /// Role used to decide whether an extractor is required.
    fn role(&self) -> HandlerRole { HandlerRole::Inbound }

    /// Process one inbound message. The default forwards it unchanged.
    fn read(&mut self, message: PipelineMessage, out: &mut Forward) { out.push(message); }
}
