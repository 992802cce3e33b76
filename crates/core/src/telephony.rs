//! Telephony Driver: wraps the carrier (Twilio-compatible REST API) and
//! renders call-control markup (TwiML). Places and hangs up calls via
//! `calls.create`/`calls(sid).update(status="completed")`-equivalent REST
//! calls, and renders the two TwiML shapes a call can run
//! (`<Play>`+`<Record>` vs `<Start><Stream>`) issued directly over `reqwest`.

use async_trait::async_trait;

use crate::config::TelephonyConfig;
use crate::error::{CoreError, Result};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub timeout_s: u32,
    pub record: bool,
    pub machine_detection: bool,
    pub amd_status_callback_url: Option<String>,
    pub recording_status_callback_url: Option<String>,
}

/// Wraps the carrier: place an outbound call, hang one up, and render the
/// call-control markup the carrier fetches once the call connects.
#[async_trait]
pub trait TelephonyDriver: Send + Sync {
    async fn place(
        &self,
        to: &str,
        call_control_url: &str,
        status_callback_url: &str,
        opts: CallOptions,
    ) -> Result<String>;

    async fn hangup(&self, carrier_sid: &str) -> Result<()>;
}

pub struct TwilioDriver {
    http: reqwest::Client,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    demo_mode: bool,
}

impl TwilioDriver {
    pub fn new(config: &TelephonyConfig, _backend_url: &str, demo_mode: bool) -> Self {
        TwilioDriver {
            http: reqwest::Client::new(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
            demo_mode,
        }
    }

    fn credentials(&self) -> Result<(&str, &str, &str)> {
        let sid = self
            .account_sid
            .as_deref()
            .ok_or_else(|| CoreError::Config("TWILIO_ACCOUNT_SID not configured".to_string()))?;
        let token = self
            .auth_token
            .as_deref()
            .ok_or_else(|| CoreError::Config("TWILIO_AUTH_TOKEN not configured".to_string()))?;
        let from = self
            .from_number
            .as_deref()
            .ok_or_else(|| CoreError::Config("TWILIO_PHONE_NUMBER not configured".to_string()))?;
        Ok((sid, token, from))
    }
}

#[async_trait]
impl TelephonyDriver for TwilioDriver {
    async fn place(
        &self,
        to: &str,
        call_control_url: &str,
        status_callback_url: &str,
        opts: CallOptions,
    ) -> Result<String> {
        if self.demo_mode {
            tracing::info!(to, "demo mode enabled, simulating call placement");
            return Ok(format!("demo-call-{}", uuid::Uuid::new_v4()));
        }

        let (sid, token, from) = self.credentials()?;

        let mut form: Vec<(&str, String)> = vec![
            ("To", to.to_string()),
            ("From", from.to_string()),
            ("Url", call_control_url.to_string()),
            ("StatusCallback", status_callback_url.to_string()),
            ("StatusCallbackMethod", "POST".to_string()),
            ("Timeout", opts.timeout_s.max(1).to_string()),
        ];
        for event in ["initiated", "ringing", "answered", "completed"] {
            form.push(("StatusCallbackEvent", event.to_string()));
        }
        if opts.record {
            form.push(("Record", "true".to_string()));
            if let Some(url) = &opts.recording_status_callback_url {
                form.push(("RecordingStatusCallback", url.clone()));
            }
        }
        if opts.machine_detection {
            form.push(("MachineDetection", "Enable".to_string()));
            form.push(("AsyncAmd", "true".to_string()));
            form.push(("AsyncAmdStatusCallbackMethod", "POST".to_string()));
            if let Some(url) = &opts.amd_status_callback_url {
                form.push(("AsyncAmdStatusCallback", url.clone()));
            }
        }

        let url = format!("{TWILIO_API_BASE}/Accounts/{sid}/Calls.json");
        let response: CallsCreateResponse = self
            .http
            .post(url)
            .basic_auth(sid, Some(token))
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.sid)
    }

    async fn hangup(&self, carrier_sid: &str) -> Result<()> {
        if self.demo_mode {
            tracing::info!(carrier_sid, "demo mode enabled, simulating hangup");
            return Ok(());
        }

        let (sid, token, _from) = self.credentials()?;
        let url = format!("{TWILIO_API_BASE}/Accounts/{sid}/Calls/{carrier_sid}.json");
        self.http
            .post(url)
            .basic_auth(sid, Some(token))
            .form(&[("Status", "completed")])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(serde::Deserialize)]
struct CallsCreateResponse {
    sid: String,
}

/// Playback mode: play pre-synthesized audio, pause, record the response
/// (max 30s, 5s silence trim), then hang up with a thank-you. Used by Blitz
/// and Queue's TTS-driven legs.
pub fn render_playback(audio_url: &str, record_action_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Play>{audio_url}</Play>
  <Pause length="1"/>
  <Record maxLength="30" timeout="5" playBeep="true" trim="trim-silence" action="{record_action_url}"/>
  <Say voice="Polly.Amy" language="en-GB">Thank you for your time. Goodbye!</Say>
</Response>"#,
        audio_url = escape_xml(audio_url),
        record_action_url = escape_xml(record_action_url),
    )
}

/// The text an AI caller reads out during a Blitz leg, defaulting the
/// timeframe to "soon" when the caller didn't specify one.
pub fn generate_call_script_text(service_type: &str, timeframe: Option<&str>, question: &str) -> String {
    let timeframe_text = timeframe.unwrap_or("soon");
    format!(
        "Hello! I'm an AI assistant calling on behalf of a customer.\n\
         They're looking for a {service_type} and would like to know about your {question}.\n\
         They need someone who can come {timeframe_text}.\n\
         Could you let me know your availability and pricing?\n\
         Please speak clearly after the beep."
    )
}

/// Playback mode without synthesized audio: say the script with the
/// carrier's own TTS voice instead of `<Play>`ing an ElevenLabs clip. Used
/// whenever [`crate::tts::TtsCache::get_or_synthesize`] comes back empty —
/// no API key configured, or the ElevenLabs call itself failed.
pub fn render_say_and_record(script_text: &str, record_action_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say voice="Polly.Amy" language="en-GB">{script_text}</Say>
  <Pause length="1"/>
  <Record maxLength="30" timeout="5" playBeep="true" trim="trim-silence" action="{record_action_url}"/>
  <Say voice="Polly.Amy" language="en-GB">Thank you for your time. Goodbye!</Say>
</Response>"#,
        script_text = escape_xml(script_text),
        record_action_url = escape_xml(record_action_url),
    )
}

/// Conversation mode: open a bidirectional media stream to the Media
/// Bridge's WebSocket, then pause long enough to keep the call alive while
/// the conversation runs (capped at 180s per the wait the agent applies).
pub fn render_conversation(stream_ws_url: &str, pause_s: u32) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Start>
    <Stream url="{stream_ws_url}" track="both_tracks"/>
  </Start>
  <Pause length="{pause_s}"/>
</Response>"#,
        stream_ws_url = escape_xml(stream_ws_url),
        pause_s = pause_s.min(180),
    )
}

/// Minimal XML text escaping for the handful of attribute values (URLs,
/// mostly) this driver ever interpolates into markup.
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_markup_includes_play_and_record() {
        let markup = render_playback("https://cdn/x.mp3", "https://api/recording-complete");
        assert!(markup.contains("<Play>https://cdn/x.mp3</Play>"));
        assert!(markup.contains("maxLength=\"30\""));
        assert!(markup.contains("timeout=\"5\""));
    }

    #[test]
    fn script_text_defaults_timeframe_to_soon() {
        let script = generate_call_script_text("plumber", None, "availability and call-out fee");
        assert!(script.contains("looking for a plumber"));
        assert!(script.contains("come soon"));
    }

    #[test]
    fn say_and_record_markup_escapes_script_text() {
        let markup = render_say_and_record("Quote me £50 & go", "https://api/recording-complete");
        assert!(markup.contains("<Say voice=\"Polly.Amy\" language=\"en-GB\">Quote me £50 &amp; go</Say>"));
        assert!(markup.contains("<Record"));
    }

    #[test]
    fn conversation_markup_caps_pause_at_180() {
        let markup = render_conversation("wss://host/stream", 999);
        assert!(markup.contains("length=\"180\""));
        assert!(markup.contains("<Stream url=\"wss://host/stream\""));
    }

    #[test]
    fn escapes_ampersands_in_urls() {
        let escaped = escape_xml("https://host/x?a=1&b=2");
        assert_eq!(escaped, "https://host/x?a=1&amp;b=2");
    }
}
