//! WebSocket transport to the Gemini Live API.
//!
//! One persistent bidirectional TLS WebSocket per session, driven in
//! blocking mode with short read timeouts so the session loop can
//! interleave sends, reads and stop checks on a single thread.

use std::net::TcpStream;
use std::time::{Duration, Instant};

use anyhow::Result;

use super::events::{is_setup_complete, parse_error};
use crate::languages::language_name;

/// Gemini native-audio model driving the voice bridge.
pub const LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// How long to wait for the server's setup acknowledgment.
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

pub type LiveSocket = tungstenite::WebSocket<native_tls::TlsStream<TcpStream>>;

/// Create TLS WebSocket connection to the Gemini Live API
pub fn connect_websocket(api_key: &str) -> Result<LiveSocket> {
    let ws_url = format!(
        "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key={}",
        api_key
    );

    let url = url::Url::parse(&ws_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("No host in URL"))?;
    let port = 443;

    use std::net::ToSocketAddrs;
    let addr = format!("{}:{}", host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve hostname: {}", host))?;

    // Long timeouts for the handshake; the main loop shortens them later.
    let tcp_stream = TcpStream::connect_timeout(&addr, Duration::from_secs(10))?;
    tcp_stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_write_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_nodelay(true)?;

    let connector = native_tls::TlsConnector::new()?;
    let tls_stream = connector.connect(host, tcp_stream)?;

    let (socket, _response) = tungstenite::client::client(&ws_url, tls_stream)?;

    Ok(socket)
}

/// Shorten the read timeout so the session loop can poll the socket.
pub fn set_socket_nonblocking(socket: &mut LiveSocket) -> Result<()> {
    let stream = socket.get_mut();
    let tcp_stream = stream.get_mut();
    tcp_stream.set_read_timeout(Some(Duration::from_millis(50)))?;
    Ok(())
}

/// Build the translate-only system instruction for a language pair.
pub fn build_instruction(source_lang: &str, target_lang: &str) -> String {
    let source = language_name(source_lang).unwrap_or(source_lang);
    let target = language_name(target_lang).unwrap_or(target_lang);
    format!(
        "You are a professional interpreter. The user speaks {source}. \
         Translate everything they say into {target} and speak only the \
         translation. Do not answer questions, add commentary, or respond \
         to the content in any way."
    )
}

/// Send the session setup message.
///
/// The native audio model requires the AUDIO response modality;
/// transcription is enabled on both directions so the state machine can
/// assemble transcript turns, and thinking is disabled for latency.
pub fn send_setup_message(
    socket: &mut LiveSocket,
    instruction: &str,
    voice_name: &str,
) -> Result<()> {
    let setup = serde_json::json!({
        "setup": {
            "model": format!("models/{}", LIVE_MODEL),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": {
                            "voiceName": voice_name
                        }
                    }
                },
                "thinkingConfig": {
                    "thinkingBudget": 0
                }
            },
            "systemInstruction": {
                "parts": [{
                    "text": instruction
                }]
            },
            "inputAudioTranscription": {},
            "outputAudioTranscription": {}
        }
    });

    socket.write(tungstenite::Message::Text(setup.to_string().into()))?;
    socket.flush()?;

    Ok(())
}

/// Wait for the server's `setupComplete` acknowledgment.
///
/// Returns an error on timeout, a server error frame, or a close frame;
/// all are terminal for the session.
pub fn wait_for_setup(socket: &mut LiveSocket) -> Result<()> {
    let setup_start = Instant::now();
    loop {
        match socket.read() {
            Ok(tungstenite::Message::Text(msg)) => {
                let msg = msg.as_str();
                if is_setup_complete(msg) {
                    return Ok(());
                }
                if let Some(error) = parse_error(msg) {
                    return Err(anyhow::anyhow!("Server rejected setup: {}", error));
                }
            }
            Ok(tungstenite::Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    if is_setup_complete(&text) {
                        return Ok(());
                    }
                    if let Some(error) = parse_error(&text) {
                        return Err(anyhow::anyhow!("Server rejected setup: {}", error));
                    }
                }
            }
            Ok(tungstenite::Message::Close(frame)) => {
                let close_info = frame
                    .map(|f| format!("code={}, reason={}", f.code, f.reason))
                    .unwrap_or_else(|| "no frame".to_string());
                return Err(anyhow::anyhow!("Connection closed during setup: {}", close_info));
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if setup_start.elapsed() > SETUP_TIMEOUT {
                    return Err(anyhow::anyhow!("Setup timeout - no response from server"));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Send one encoded audio frame as a realtime input message.
pub fn send_audio_frame(socket: &mut LiveSocket, payload: &str) -> Result<()> {
    let msg = serde_json::json!({
        "realtimeInput": {
            "media": {
                "data": payload,
                "mimeType": "audio/pcm;rate=16000"
            }
        }
    });

    socket.write(tungstenite::Message::Text(msg.to_string().into()))?;
    socket.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_names_both_languages() {
        let instruction = build_instruction("en", "es");
        assert!(instruction.contains("English"));
        assert!(instruction.contains("Spanish"));
    }

    #[test]
    fn instruction_falls_back_to_raw_code() {
        let instruction = build_instruction("en", "x-klingon");
        assert!(instruction.contains("x-klingon"));
    }
}
