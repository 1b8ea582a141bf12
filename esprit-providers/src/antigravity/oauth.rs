use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::net::TcpListener;

/// Google's public "installed application" OAuth client used for the
/// Antigravity login flow. Installed-app clients are not secret — Google's
/// own guidance is that the client secret for this flow type is a
/// convention, not a confidentiality boundary — but both are still
/// overridable via env for internal test fixtures.
pub fn client_id() -> String {
    std::env::var("ESPRIT_ANTIGRAVITY_CLIENT_ID")
        .unwrap_or_else(|_| "681255809395-antigravity.apps.googleusercontent.com".to_string())
}

pub fn client_secret() -> String {
    std::env::var("ESPRIT_ANTIGRAVITY_CLIENT_SECRET").unwrap_or_else(|_| "GOCSPX-antigravity-installed-app".to_string())
}

pub const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const SCOPES: &str = "openid email profile https://www.googleapis.com/auth/cloud-platform";

pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

fn random_url_safe_token(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn generate_pkce() -> PkcePair {
    let verifier = random_url_safe_token(32);
    let digest = Sha256::digest(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(digest);
    PkcePair { verifier, challenge }
}

pub fn generate_state() -> String {
    random_url_safe_token(16)
}

/// Finds a free local port by binding to port 0 and reading back what the
/// OS assigned, then immediately releasing it for the callback server.
pub fn find_free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

pub fn build_authorize_url(redirect_port: u16, state: &str, challenge: &str) -> String {
    let redirect_uri = format!("http://127.0.0.1:{redirect_port}/callback");
    format!(
        "{AUTHORIZE_URL}?client_id={client_id}&redirect_uri={redirect_uri}&response_type=code\
         &scope={scope}&state={state}&code_challenge={challenge}&code_challenge_method=S256\
         &access_type=offline&prompt=consent",
        client_id = client_id(),
        redirect_uri = urlencode(&redirect_uri),
        scope = urlencode(SCOPES),
    )
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// A minimal single-shot HTTP server that waits for the OAuth redirect,
/// extracts `code`/`state` from the callback URL's query string, and replies
/// with a static confirmation page. Blocks the calling thread — callers run
/// it via `tokio::task::spawn_blocking`.
pub fn await_callback(port: u16, expected_state: &str) -> std::io::Result<String> {
    let listener = TcpListener::bind(("127.0.0.1", port))?;
    let (mut stream, _) = listener.accept()?;

    let mut buf = [0u8; 8192];
    let n = stream.read(&mut buf)?;
    let request_line = String::from_utf8_lossy(&buf[..n]);
    let path = request_line.lines().next().unwrap_or("").split_whitespace().nth(1).unwrap_or("");

    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");
    let params = parse_query(query);

    let response_body = "Authentication complete. You may close this window.";
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
        response_body.len(),
        response_body
    );
    stream.write_all(response.as_bytes())?;

    match (params.get("state"), params.get("code")) {
        (Some(state), Some(code)) if state == expected_state => Ok(code.clone()),
        (Some(_), _) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "state mismatch on OAuth callback")),
        _ => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "missing code in OAuth callback")),
    }
}

fn parse_query(query: &str) -> std::collections::HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_challenge_is_sha256_of_verifier() {
        let pair = generate_pkce();
        let digest = Sha256::digest(pair.verifier.as_bytes());
        assert_eq!(pair.challenge, URL_SAFE_NO_PAD.encode(digest));
    }

    #[test]
    fn state_and_verifier_are_not_deterministic() {
        assert_ne!(generate_state(), generate_state());
        assert_ne!(generate_pkce().verifier, generate_pkce().verifier);
    }

    #[test]
    fn parse_query_splits_pairs() {
        let params = parse_query("code=abc123&state=xyz");
        assert_eq!(params.get("code").map(String::as_str), Some("abc123"));
        assert_eq!(params.get("state").map(String::as_str), Some("xyz"));
    }
}
