//! Conversational voice agent
//!
//! Drives one outbound call turn by turn. The session lives in memory keyed
//! by call SID and is persisted to the voice_calls row after every turn, so
//! a turn arriving for an unknown SID (process restart, or the telephony
//! provider re-establishing a dropped session) restores the conversation
//! from the database and continues where it left off.
//!
//! The agent also runs an email capture flow: when the caller asks for
//! details, it collects a spoken address, reads it back for confirmation,
//! then emails the campaign details and stores the address on the contact.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use outreach_common::models::{
    CapturePhase, Channel, ConversationTurn, Speaker, VoiceSession,
};
use outreach_common::{Error, Result};

use crate::db;
use crate::services::dispatch::{substitute, tokens_for};
use crate::services::email::EmailMessage;
use crate::services::language::{self, LanguageConfig};
use crate::AppState;

/// Caller turns before the agent wraps up the call
pub const MAX_TURNS: usize = 6;
/// A caller cannot be kept waiting for the full LLM window
const LLM_TIMEOUT: Duration = Duration::from_secs(10);

const FALLBACK_REPLY: &str = "I'm sorry, I didn't catch that. Could you say it again?";

/// One agent reply, ready for TwiML rendering
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub hangup: bool,
    pub language: LanguageConfig,
}

/// Build the opening line for a freshly answered call and seed the session.
pub async fn open_call(
    state: &AppState,
    call_sid: &str,
    campaign_id: Uuid,
    contact_id: Uuid,
) -> Result<TurnOutcome> {
    let mut session = match load_session(state, call_sid).await? {
        // The provider can re-request the answer document mid-call
        Some(existing) => existing,
        None => VoiceSession::new(call_sid, campaign_id, contact_id, language::DEFAULT_LANGUAGE.code),
    };
    let config = language::by_code(&session.language);

    let greeting = if session.turns.is_empty() {
        let greeting = opening_line(state, &session).await?;
        session.turns.push(ConversationTurn::agent(&greeting));
        greeting
    } else {
        "Sorry, we got cut off. Where were we?".to_string()
    };

    save_session(state, session).await?;
    Ok(TurnOutcome {
        reply: greeting,
        hangup: false,
        language: config,
    })
}

/// Handle one caller utterance and produce the agent's reply.
pub async fn handle_turn(state: &AppState, call_sid: &str, speech: &str) -> Result<TurnOutcome> {
    let mut session = load_session(state, call_sid)
        .await?
        .ok_or_else(|| Error::NotFound(format!("voice call {}", call_sid)))?;
    let mut config = language::by_code(&session.language);

    let speech = speech.trim();
    if !speech.is_empty() {
        session.turns.push(ConversationTurn::caller(speech));
    }

    if session.closed {
        return finish_turn(state, session, language::farewell(&config).to_string(), true, config)
            .await;
    }

    // Spoken language switch takes effect immediately
    if let Some(switched) = language::detect_switch_request(speech, &session.language) {
        session.language = switched.code.to_string();
        config = switched;
        let reply = language::switch_acknowledgement(&switched).to_string();
        return finish_turn(state, session, reply, false, config).await;
    }

    // Email capture flow runs ahead of the LLM
    if let Some(reply) = advance_capture(state, &mut session, speech).await? {
        let hangup = session.closed;
        return finish_turn(state, session, reply, hangup, config).await;
    }

    if wants_email(speech) {
        session.capture_phase = CapturePhase::AwaitingEmail;
        let reply =
            "Happy to send the details over. Could you tell me your email address?".to_string();
        return finish_turn(state, session, reply, false, config).await;
    }

    // Turn budget: offer the email follow-up once, then say goodbye
    if session.caller_turns() >= MAX_TURNS {
        if session.capture_phase == CapturePhase::Idle && session.pending_email.is_none() {
            session.capture_phase = CapturePhase::Offered;
            let reply = "Before we wrap up, shall I email you the details?".to_string();
            return finish_turn(state, session, reply, false, config).await;
        }
        session.closed = true;
        let reply = language::farewell(&config).to_string();
        return finish_turn(state, session, reply, true, config).await;
    }

    let prompt = build_prompt(state, &session, &config).await?;
    let reply = match state.llm.generate_with_timeout(&prompt, LLM_TIMEOUT).await {
        Ok(text) => {
            let text = text.trim().to_string();
            if text.is_empty() {
                FALLBACK_REPLY.to_string()
            } else {
                text
            }
        }
        Err(err) => {
            tracing::warn!(call_sid, error = %err, "LLM turn failed, using fallback");
            FALLBACK_REPLY.to_string()
        }
    };
    finish_turn(state, session, reply, false, config).await
}

/// Look up the session in memory, falling back to the persisted
/// conversation log.
pub(crate) async fn load_session(state: &AppState, call_sid: &str) -> Result<Option<VoiceSession>> {
    if let Some(session) = state.voice_sessions.read().await.get(call_sid) {
        return Ok(Some(session.clone()));
    }
    let Some(call) = db::voice_calls::get_call_by_sid(&state.db, call_sid).await? else {
        return Ok(None);
    };
    let session = match &call.conversation_log {
        Some(log) => {
            tracing::info!(call_sid, "Restoring voice session from conversation log");
            VoiceSession::from_log(log)?
        }
        None => VoiceSession::new(call_sid, call.campaign_id, call.contact_id, &call.language),
    };
    Ok(Some(session))
}

async fn save_session(state: &AppState, session: VoiceSession) -> Result<()> {
    db::voice_calls::save_conversation(
        &state.db,
        &session.call_sid,
        &session.to_log()?,
        &session.language,
    )
    .await?;
    state
        .voice_sessions
        .write()
        .await
        .insert(session.call_sid.clone(), session);
    Ok(())
}

async fn finish_turn(
    state: &AppState,
    mut session: VoiceSession,
    reply: String,
    hangup: bool,
    config: LanguageConfig,
) -> Result<TurnOutcome> {
    session.turns.push(ConversationTurn::agent(&reply));
    if hangup {
        session.closed = true;
        state.voice_sessions.write().await.remove(&session.call_sid);
        db::voice_calls::save_conversation(
            &state.db,
            &session.call_sid,
            &session.to_log()?,
            &session.language,
        )
        .await?;
    } else {
        save_session(state, session).await?;
    }
    Ok(TurnOutcome {
        reply,
        hangup,
        language: config,
    })
}

/// Step the email capture state machine. Returns the agent reply when the
/// flow consumed this turn.
async fn advance_capture(
    state: &AppState,
    session: &mut VoiceSession,
    speech: &str,
) -> Result<Option<String>> {
    match session.capture_phase {
        CapturePhase::Idle => Ok(None),
        CapturePhase::Offered => {
            if is_affirmative(speech) {
                session.capture_phase = CapturePhase::AwaitingEmail;
                Ok(Some(
                    "Great. Could you tell me your email address?".to_string(),
                ))
            } else if is_negative(speech) {
                session.capture_phase = CapturePhase::Idle;
                session.closed = true;
                let config = language::by_code(&session.language);
                Ok(Some(format!(
                    "No problem. {}",
                    language::farewell(&config)
                )))
            } else {
                // Not a yes/no; fall through to the normal conversation
                session.capture_phase = CapturePhase::Idle;
                Ok(None)
            }
        }
        CapturePhase::AwaitingEmail => match speech_to_email(speech) {
            Some(email) => {
                session.pending_email = Some(email.clone());
                session.capture_phase = CapturePhase::Confirming;
                Ok(Some(format!(
                    "I heard {}. Is that right?",
                    speakable_email(&email)
                )))
            }
            None => Ok(Some(
                "Sorry, I couldn't make out an email address. Could you spell it out, \
                 saying at for the at sign and dot for the dots?"
                    .to_string(),
            )),
        },
        CapturePhase::Confirming => {
            if is_affirmative(speech) {
                let email = session.pending_email.take().unwrap_or_default();
                session.capture_phase = CapturePhase::Idle;
                finalize_capture(state, session, &email).await;
                Ok(Some(
                    "Perfect, I've sent the details to your inbox. Is there anything else?"
                        .to_string(),
                ))
            } else if is_negative(speech) {
                session.pending_email = None;
                session.capture_phase = CapturePhase::AwaitingEmail;
                Ok(Some(
                    "My mistake. Could you give me the address once more?".to_string(),
                ))
            } else {
                Ok(Some("Sorry, was that address correct?".to_string()))
            }
        }
    }
}

/// Store the captured address and send the follow-up email. Both are best
/// effort: a provider failure must not break the live call.
async fn finalize_capture(state: &AppState, session: &VoiceSession, email: &str) {
    if let Err(err) = db::contacts::set_contact_email(&state.db, session.contact_id, email).await {
        tracing::error!(call_sid = %session.call_sid, error = %err, "Failed to store captured email");
    }
    if let Err(err) =
        db::voice_calls::set_captured_email(&state.db, &session.call_sid, email).await
    {
        tracing::error!(call_sid = %session.call_sid, error = %err, "Failed to record captured email");
    }
    if let Err(err) = send_followup_email(state, session, email).await {
        tracing::warn!(call_sid = %session.call_sid, error = %err, "Follow-up email failed");
    }
}

async fn send_followup_email(state: &AppState, session: &VoiceSession, email: &str) -> Result<()> {
    let campaign = db::campaigns::require_campaign(&state.db, session.campaign_id).await?;
    let contact = db::contacts::get_contact(&state.db, session.contact_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("contact {}", session.contact_id)))?;
    let tokens = tokens_for(&campaign, &contact, &state.settings.sender_name);

    // Prefer the campaign's email template; otherwise summarize the call script
    let (subject, body) = match campaign
        .generated_content
        .as_ref()
        .and_then(|c| c.common.get(&Channel::Email))
    {
        Some(template) => (
            template
                .get("subject")
                .and_then(|v| v.as_str())
                .unwrap_or("The details we discussed")
                .to_string(),
            template
                .get("body")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        ),
        None => (
            format!("Following up on our call - {}", campaign.name),
            format!(
                "Hi [first_name],\n\nThanks for taking my call today. \
                 As promised, here are the details about {}.\n\nBest,\n[sender_name]",
                campaign.name
            ),
        ),
    };

    state
        .email
        .send(&EmailMessage {
            to: email.to_string(),
            to_name: Some(contact.name.clone()),
            subject: substitute(&subject, &tokens),
            body_html: substitute(&body, &tokens).replace('\n', "<br>"),
            campaign_id: Some(campaign.id),
        })
        .await?;
    Ok(())
}

async fn opening_line(state: &AppState, session: &VoiceSession) -> Result<String> {
    let campaign = db::campaigns::require_campaign(&state.db, session.campaign_id).await?;
    let contact = db::contacts::get_contact(&state.db, session.contact_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("contact {}", session.contact_id)))?;
    let tokens = tokens_for(&campaign, &contact, &state.settings.sender_name);

    let greeting = campaign
        .generated_content
        .as_ref()
        .and_then(|c| c.common.get(&Channel::Call))
        .and_then(|t| t.get("greeting"))
        .and_then(|v| v.as_str())
        .map(|g| g.to_string())
        .unwrap_or_else(|| {
            "Hello [first_name], this is [sender_name]. Do you have a moment to talk?".to_string()
        });
    Ok(substitute(&greeting, &tokens))
}

async fn build_prompt(
    state: &AppState,
    session: &VoiceSession,
    config: &LanguageConfig,
) -> Result<String> {
    let campaign = db::campaigns::require_campaign(&state.db, session.campaign_id).await?;
    let script = campaign
        .generated_content
        .as_ref()
        .and_then(|c| c.common.get(&Channel::Call))
        .cloned()
        .unwrap_or_default();

    let mut transcript = String::new();
    for turn in &session.turns {
        let speaker = match turn.speaker {
            Speaker::Agent => "Agent",
            Speaker::Caller => "Caller",
        };
        transcript.push_str(speaker);
        transcript.push_str(": ");
        transcript.push_str(&turn.text);
        transcript.push('\n');
    }

    Ok(format!(
        "You are a polite sales agent on a live phone call about \"{name}\".\n\
         Call script (use it as guidance, do not read it verbatim):\n{script}\n\n\
         Conversation so far:\n{transcript}\n\
         Reply with the agent's next line only. Keep it under two sentences, \
         conversational, and never use bullet points or placeholders. {lang}",
        name = campaign.name,
        script = script,
        transcript = transcript,
        lang = config.llm_instruction,
    ))
}

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}$")
        .unwrap_or_else(|e| panic!("invalid email pattern: {}", e))
});

/// Normalize a spoken email address ("asha at acme dot com") to text form.
pub fn speech_to_email(speech: &str) -> Option<String> {
    let mut candidate = format!(" {} ", speech.trim().to_lowercase());
    for (spoken, written) in [
        (" at the rate ", "@"),
        (" at ", "@"),
        (" dot ", "."),
        (" underscore ", "_"),
        (" dash ", "-"),
        (" hyphen ", "-"),
        (" plus ", "+"),
    ] {
        candidate = candidate.replace(spoken, written);
    }
    let candidate: String = candidate
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .trim_end_matches(&['.', ','][..])
        .to_string();

    EMAIL_SHAPE.is_match(&candidate).then_some(candidate)
}

/// Render an address the way a voice should read it back.
pub fn speakable_email(email: &str) -> String {
    email.replace('@', " at ").replace('.', " dot ")
}

const AFFIRMATIVE: [&str; 10] = [
    "yes", "yeah", "yep", "sure", "correct", "right", "ok", "okay", "please", "definitely",
];
const NEGATIVE: [&str; 6] = ["no", "nope", "nah", "wrong", "incorrect", "don't"];

fn contains_word(speech: &str, words: &[&str]) -> bool {
    let lowered = speech.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|w| words.contains(&w))
}

pub fn is_affirmative(speech: &str) -> bool {
    contains_word(speech, &AFFIRMATIVE)
}

pub fn is_negative(speech: &str) -> bool {
    contains_word(speech, &NEGATIVE)
}

/// Caller asked to be sent details over email
pub fn wants_email(speech: &str) -> bool {
    let lowered = speech.to_lowercase();
    (lowered.contains("email") || lowered.contains("mail"))
        && (lowered.contains("send") || lowered.contains("share") || lowered.contains("details"))
}
