//! ReplyService - generates structured chat replies over a ChatTransport.
//!
//! Both entry points build the same request (persona prompt, JSON format
//! instruction, trimmed history, strict `json_schema` contract) and run it
//! through the fallback negotiator, which relaxes the request when the
//! provider rejects a knob it does not support.
//!
//! Streaming feeds every content delta into a [`FieldExtractor`] so the reply
//! text reaches the sink while the object is still being generated, and the
//! emotion is announced as soon as its value is complete.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapters::ai::{OpenAICompatibleConfig, OpenAICompatibleTransport};
use crate::config::AiConfig;
use crate::domain::reply::{
    build_messages, parse_reply_payload, reply_response_format, ConversationMessage, EmotionSet,
    Escalation, EscalationState, FieldExtractor, RequestSpec, StructuredReply,
};
use crate::ports::{ChatTransport, ReplyError, ReplySink};

use super::prompt_source::PromptSource;

/// Per-service reply settings.
#[derive(Debug, Clone)]
pub struct ReplySettings {
    pub model: String,
    /// `None` leaves the sampling temperature to the provider.
    pub temperature: Option<f32>,
    pub emotions: EmotionSet,
    pub prompt: PromptSource,
    /// Most recent history turns forwarded (0 = all).
    pub max_history: usize,
}

impl ReplySettings {
    pub fn new(model: impl Into<String>, emotions: EmotionSet) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            emotions,
            prompt: PromptSource::default(),
            max_history: 0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_prompt(mut self, prompt: PromptSource) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Settings described by the chat provider configuration.
    pub fn from_config(config: &AiConfig) -> Self {
        let mut prompt = PromptSource::inline(config.system_prompt.clone());
        if let Some(path) = config.system_prompt_path.as_deref().filter(|p| !p.trim().is_empty()) {
            prompt = prompt.with_path(path.trim());
        }

        Self::new(config.model.clone(), EmotionSet::new(config.emotions.iter()))
            .with_temperature(config.temperature)
            .with_prompt(prompt)
            .with_max_history(config.max_history)
    }
}

/// Generates structured replies, buffered or streamed.
#[derive(Clone)]
pub struct ReplyService {
    transport: Arc<dyn ChatTransport>,
    settings: ReplySettings,
}

impl ReplyService {
    pub fn new(transport: Arc<dyn ChatTransport>, settings: ReplySettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Builds a service talking to the configured OpenAI-compatible provider.
    pub fn from_config(config: &AiConfig) -> Result<Self, ReplyError> {
        let transport_config =
            OpenAICompatibleConfig::new(config.api_key.clone().unwrap_or_default())
                .with_base_url(config.normalized_base_url())
                .with_timeout(config.timeout());

        let transport = OpenAICompatibleTransport::new(transport_config)?;
        Ok(Self::new(Arc::new(transport), ReplySettings::from_config(config)))
    }

    /// Produces one complete reply.
    pub async fn generate_reply(
        &self,
        history: &[ConversationMessage],
    ) -> Result<StructuredReply, ReplyError> {
        let request_id = Uuid::new_v4();
        let spec = self.build_spec(history, false).await;
        tracing::debug!(%request_id, transport = self.transport.name(), model = %spec.model, "Generating reply");

        let transport = Arc::clone(&self.transport);
        let message = self
            .negotiate(spec, request_id, move |spec| {
                let transport = Arc::clone(&transport);
                async move { transport.complete(&spec).await }
            })
            .await?;

        let content = message.content.trim();
        if content.is_empty() {
            return Err(match message.refusal {
                Some(reason) if !reason.trim().is_empty() => {
                    tracing::info!(%request_id, "Provider refused: {}", reason.trim());
                    ReplyError::Refused
                }
                _ => ReplyError::EmptyReply,
            });
        }

        let emotions = &self.settings.emotions;
        let reply = match parse_reply_payload(content) {
            Some(payload) if !payload.reply.trim().is_empty() => {
                StructuredReply::new(payload.reply.trim(), emotions.normalize(&payload.emotion))
            }
            _ => {
                tracing::debug!(%request_id, "Content is not a reply object, using it verbatim");
                StructuredReply::new(content, emotions.fallback())
            }
        };

        tracing::info!(%request_id, emotion = %reply.emotion, "Reply generated");
        Ok(reply)
    }

    /// Streams one reply into `sink`.
    ///
    /// Tokens reach the sink as they decode; the returned reply carries the
    /// complete trimmed text and the normalized emotion.
    pub async fn stream_reply<S>(
        &self,
        history: &[ConversationMessage],
        sink: &mut S,
    ) -> Result<StructuredReply, ReplyError>
    where
        S: ReplySink + ?Sized,
    {
        self.stream_reply_with_cancel(history, sink, &CancellationToken::new())
            .await
    }

    /// Like [`stream_reply`](Self::stream_reply), stopping with
    /// [`ReplyError::Cancelled`] once `cancel` fires.
    pub async fn stream_reply_with_cancel<S>(
        &self,
        history: &[ConversationMessage],
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> Result<StructuredReply, ReplyError>
    where
        S: ReplySink + ?Sized,
    {
        let request_id = Uuid::new_v4();
        let spec = self.build_spec(history, true).await;
        tracing::debug!(%request_id, transport = self.transport.name(), model = %spec.model, "Streaming reply");

        let transport = Arc::clone(&self.transport);
        let open = self.negotiate(spec, request_id, move |spec| {
            let transport = Arc::clone(&transport);
            async move { transport.open_stream(&spec).await }
        });

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ReplyError::Cancelled),
            opened = open => opened?,
        };

        let emotions = &self.settings.emotions;
        let mut extractor = FieldExtractor::for_reply();
        let mut raw = String::new();
        let mut refusal = String::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(%request_id, "Stream cancelled by caller");
                    return Err(ReplyError::Cancelled);
                }
                next = stream.next() => next,
            };

            let delta = match next {
                Some(Ok(delta)) => delta,
                Some(Err(err)) => {
                    tracing::warn!(%request_id, "Stream failed: {}", err);
                    return Err(err);
                }
                None => break,
            };

            refusal.push_str(&delta.refusal);
            if delta.content.is_empty() {
                continue;
            }
            raw.push_str(&delta.content);

            let outcome = extractor.feed(&delta.content);
            if let Some(emotion) = outcome.captured {
                sink.on_emotion(&emotions.normalize(&emotion))?;
            }
            if let Some(text) = outcome.delta {
                sink.on_token(&text)?;
            }
        }

        let mut emotion = extractor.captured().map(str::to_string);
        let mut text = extractor.pass_through().trim().to_string();

        if text.is_empty() {
            if let Some(payload) = parse_reply_payload(&raw) {
                tracing::debug!(%request_id, "Recovered reply from buffered content");
                text = payload.reply.trim().to_string();
                if emotion.is_none() && !payload.emotion.trim().is_empty() {
                    let normalized = emotions.normalize(&payload.emotion);
                    sink.on_emotion(&normalized)?;
                    emotion = Some(normalized);
                }
            }
        }

        if text.is_empty() {
            if !refusal.trim().is_empty() {
                tracing::info!(%request_id, "Provider refused: {}", refusal.trim());
                return Err(ReplyError::Refused);
            }
            return Err(ReplyError::EmptyReply);
        }

        let emotion = match emotion {
            Some(raw_emotion) => emotions.normalize(&raw_emotion),
            None => emotions.fallback(),
        };
        tracing::info!(%request_id, emotion = %emotion, "Reply streamed");
        Ok(StructuredReply::new(text, emotion))
    }

    async fn build_spec(&self, history: &[ConversationMessage], stream: bool) -> RequestSpec {
        let settings = &self.settings;
        let prompt = settings.prompt.resolve().await;
        let messages = build_messages(&prompt, &settings.emotions, history, settings.max_history);

        let mut spec = RequestSpec::new(settings.model.clone(), messages)
            .with_stream(stream)
            .with_response_format(reply_response_format(&settings.emotions));
        if let Some(temperature) = settings.temperature {
            spec = spec.with_temperature(temperature);
        }
        spec
    }

    /// Runs `attempt`, relaxing the request after each rejection the
    /// negotiator knows how to work around.
    async fn negotiate<R, F, Fut>(
        &self,
        mut spec: RequestSpec,
        request_id: Uuid,
        mut attempt: F,
    ) -> Result<R, ReplyError>
    where
        F: FnMut(RequestSpec) -> Fut,
        Fut: Future<Output = Result<R, ReplyError>>,
    {
        let mut state = EscalationState::new();

        loop {
            let err = match attempt(spec.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let escalation = match err.rejection() {
                Some((status, body)) => state.next_attempt(&spec, status, body),
                None => Escalation::GiveUp,
            };

            match escalation {
                Escalation::Retry {
                    state: next,
                    spec: relaxed,
                    downgrade,
                } => {
                    tracing::info!(
                        %request_id,
                        attempt = next.attempts(),
                        ?downgrade,
                        "Provider rejected request, retrying relaxed"
                    );
                    state = next;
                    spec = relaxed;
                }
                Escalation::GiveUp => return Err(err),
            }
        }
    }
}
