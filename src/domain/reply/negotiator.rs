//! Fallback negotiation for provider incompatibilities.
//!
//! Providers that speak the chat-completions dialect disagree on which knobs
//! they accept. Some reject a custom `temperature` for certain models, others
//! reject `json_schema` structured output. When a request fails with HTTP 400
//! and the body names one of those knobs, the request is retried once with
//! that knob relaxed.
//!
//! The decision is a pure function of the tried-combinations state, the
//! failed request and the rejection.
//! Each knob is relaxed at most once and the number of attempts is capped at
//! [`MAX_ATTEMPTS`].

use super::request::RequestSpec;

/// Upper bound on attempts for one logical call, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

const BAD_REQUEST: u16 = 400;

/// Why a request was relaxed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downgrade {
    /// Temperature removed so the provider default applies.
    DropTemperature,
    /// Response format moved one step down the escalation ladder.
    RelaxResponseFormat,
}

/// Outcome of inspecting a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Escalation {
    /// Try again with the relaxed spec; `state` tracks what has been tried.
    Retry {
        state: EscalationState,
        spec: RequestSpec,
        downgrade: Downgrade,
    },
    /// Nothing left to relax; surface the original error.
    GiveUp,
}

/// Combinations already tried within one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationState {
    attempts: u32,
    temperature_dropped: bool,
    format_relaxed: bool,
}

impl Default for EscalationState {
    fn default() -> Self {
        Self::new()
    }
}

impl EscalationState {
    /// State before the first attempt has failed.
    pub fn new() -> Self {
        Self {
            attempts: 1,
            temperature_dropped: false,
            format_relaxed: false,
        }
    }

    /// Attempts issued so far, including the one currently in flight.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn temperature_dropped(&self) -> bool {
        self.temperature_dropped
    }

    pub fn format_relaxed(&self) -> bool {
        self.format_relaxed
    }

    /// Decides how to continue after `spec` was rejected with `status`/`body`.
    pub fn next_attempt(&self, spec: &RequestSpec, status: u16, body: &str) -> Escalation {
        if self.attempts >= MAX_ATTEMPTS {
            return Escalation::GiveUp;
        }

        if !self.temperature_dropped
            && spec.temperature.is_some()
            && temperature_unsupported(status, body)
        {
            let mut relaxed = spec.clone();
            relaxed.temperature = None;
            return Escalation::Retry {
                state: Self {
                    attempts: self.attempts + 1,
                    temperature_dropped: true,
                    ..*self
                },
                spec: relaxed,
                downgrade: Downgrade::DropTemperature,
            };
        }

        if !self.format_relaxed && structured_output_unsupported(status, body) {
            if let Some(format) = spec.response_format.relaxed() {
                let mut relaxed = spec.clone();
                relaxed.response_format = format;
                return Escalation::Retry {
                    state: Self {
                        attempts: self.attempts + 1,
                        format_relaxed: true,
                        ..*self
                    },
                    spec: relaxed,
                    downgrade: Downgrade::RelaxResponseFormat,
                };
            }
        }

        Escalation::GiveUp
    }
}

/// True when the provider rejected the sampling temperature.
pub fn temperature_unsupported(status: u16, body: &str) -> bool {
    if status != BAD_REQUEST {
        return false;
    }
    let lowered = body.to_lowercase();
    lowered.contains("temperature") && lowered.contains("unsupported")
}

/// True when the provider rejected the structured-output contract.
pub fn structured_output_unsupported(status: u16, body: &str) -> bool {
    if status != BAD_REQUEST {
        return false;
    }
    let lowered = body.to_lowercase();
    ["response_format", "json_schema", "structured outputs", "not supported"]
        .iter()
        .any(|marker| lowered.contains(marker))
}
