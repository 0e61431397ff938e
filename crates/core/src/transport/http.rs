use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::protocol::handler::MethodHandler;
use crate::protocol::request::RtspRequest;
use crate::protocol::tunnel;
use crate::server::ServerConfig;
use crate::session::{ControlProtocol, Session, SessionRegistry};

/// Accept loop for the optional RTSP-over-HTTP tunnel port.
///
/// Each POST carries one base64-encoded RTSP request and is answered
/// synchronously with a base64-encoded RTSP response. A `Session:`
/// header inside the decoded request re-binds the POST to the existing
/// session; otherwise a fresh session is created for the HTTP context.
pub fn accept_loop(
    listener: TcpListener,
    handler: Arc<MethodHandler>,
    sessions: SessionRegistry,
    config: Arc<ServerConfig>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                let h = handler.clone();
                let se = sessions.clone();
                let c = config.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_post(stream, peer_addr, h, se, c) {
                        tracing::debug!(%peer_addr, error = %e, "HTTP tunnel request failed");
                    }
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "HTTP tunnel accept error");
                }
            }
        }
    }
    tracing::debug!("HTTP tunnel loop exited");
}

fn handle_post(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<MethodHandler>,
    sessions: SessionRegistry,
    config: Arc<ServerConfig>,
) -> std::io::Result<()> {
    stream.set_read_timeout(Some(Duration::from_millis(config.receive_timeout_ms)))?;
    stream.set_write_timeout(Some(Duration::from_millis(config.send_timeout_ms)))?;

    let Some((head, body)) = read_http_request(&mut stream)? else {
        return reject(&mut stream, "400 Bad Request");
    };

    let first_line = head.lines().next().unwrap_or("");
    if !first_line.starts_with("POST ") {
        return reject(&mut stream, "405 Method Not Allowed");
    }
    if !header_value(&head, "Accept")
        .map(|v| v.contains(tunnel::TUNNEL_CONTENT_TYPE))
        .unwrap_or(false)
    {
        return reject(&mut stream, "400 Bad Request");
    }

    let Ok(decoded) = tunnel::decode_body(&body) else {
        return reject(&mut stream, "400 Bad Request");
    };
    let request = match RtspRequest::parse(&decoded) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(%peer_addr, error = %e, "parse error");
            let rtsp = handler.malformed_response().serialize();
            stream.write_all(tunnel::encode_response(&rtsp).as_bytes())?;
            return Ok(());
        }
    };

    // Re-use the session named by the tunnelled request, but only when
    // the POST arrives from the owner's address: every tunnel POST is a
    // fresh TCP connection, so a token from a foreign address must go
    // through a fresh session for the handler's endpoint defence to
    // reject it.
    let session = request
        .session_token()
        .and_then(|token| sessions.find_by_token(token))
        .filter(|owner| owner.peer_addr.ip() == peer_addr.ip())
        .unwrap_or_else(|| {
            Arc::new(Session::new(
                peer_addr,
                ControlProtocol::HttpTunnel,
                config.client_inactivity_timeout_secs,
            ))
        });

    if let Some(response) = handler.handle(&session, &request) {
        let rtsp = response.serialize();
        stream.write_all(tunnel::encode_response(&rtsp).as_bytes())?;
    }
    Ok(())
}

/// Read one HTTP request: head through the blank line, then exactly
/// `Content-Length` body bytes. `None` when framing never completes.
fn read_http_request(stream: &mut TcpStream) -> std::io::Result<Option<(String, Vec<u8>)>> {
    let mut buffer: Vec<u8> = Vec::with_capacity(2048);
    let mut chunk = [0u8; 2048];

    loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            let head_len = pos + 4;
            let head = match std::str::from_utf8(&buffer[..head_len]) {
                Ok(head) => head.to_string(),
                Err(_) => return Ok(None),
            };
            let Some(content_length) =
                header_value(&head, "Content-Length").and_then(|v| v.parse::<usize>().ok())
            else {
                // The tunnel requires an announced body.
                return Ok(None);
            };

            while buffer.len() < head_len + content_length {
                let n = stream.read(&mut chunk)?;
                if n == 0 {
                    return Ok(None);
                }
                buffer.extend_from_slice(&chunk[..n]);
            }
            let body = buffer[head_len..head_len + content_length].to_vec();
            return Ok(Some((head, body)));
        }

        let n = stream.read(&mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(name) {
            Some(value.trim())
        } else {
            None
        }
    })
}

fn reject(stream: &mut TcpStream, status: &str) -> std::io::Result<()> {
    stream.write_all(format!("HTTP/1.0 {}\r\nCache-Control: no-cache\r\n\r\n", status).as_bytes())
}
