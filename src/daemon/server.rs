//! The `russh` `Server`/`Handler` pair. One `ConnHandler` is constructed
//! per inbound TCP connection (`Server::new_client`); `russh` drives its
//! `Handler` methods on a dedicated task, matching the teacher's
//! one-task-per-connection shape from `daemon::server::Server::serve`,
//! just under `tokio::spawn` instead of `thread::spawn`.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use russh::{
    server::{self, Auth, Msg, Session as WireSession},
    Channel, ChannelId, CryptoVec,
};
use tracing::{debug, info, warn};

use crate::{
    daemon::Shared, error::HoneypotError, event::Event, lastlog, session::Session, term,
    ttylog::TtyLog,
};

pub struct SshServer {
    shared: Arc<Shared>,
}

impl SshServer {
    pub fn new(shared: Arc<Shared>) -> Self {
        SshServer { shared }
    }
}

impl server::Server for SshServer {
    type Handler = ConnHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> ConnHandler {
        ConnHandler {
            shared: self.shared.clone(),
            peer_addr,
            username: None,
            channel_id: None,
            decoder: term::Decoder::new(),
            session: None,
            ttylog: None,
            session_id: format!("{:x}", rand::random::<u64>()),
        }
    }
}

pub struct ConnHandler {
    shared: Arc<Shared>,
    peer_addr: Option<SocketAddr>,
    username: Option<String>,
    channel_id: Option<ChannelId>,
    decoder: term::Decoder,
    session: Option<Session>,
    ttylog: Option<TtyLog>,
    session_id: String,
}

impl ConnHandler {
    fn peer_string(&self) -> String {
        self.peer_addr.map(|a| a.to_string()).unwrap_or_else(|| "unknown".to_string())
    }

    fn accepted_password(&self, password: &str) -> bool {
        if let Some(configured) = &self.shared.config.password {
            if configured == password {
                return true;
            }
        }
        self.shared.password_store.contains(password)
    }

    /// Drains whatever output the session/shell accumulated and sends it
    /// over the channel. Only the subset not flagged no-log (§8: total
    /// WRITE bytes == channel bytes minus no-log bytes) is written to
    /// the tty log, as a single WRITE frame.
    async fn flush_output(&mut self, wire: &mut WireSession) -> anyhow::Result<()> {
        let channel_id = match self.channel_id {
            Some(id) => id,
            None => return Ok(()),
        };
        let Some(session) = self.session.as_mut() else { return Ok(()) };
        let bytes = session.drain_output();
        let log_bytes = session.drain_log_output();
        if !log_bytes.is_empty() {
            if let Some(log) = self.ttylog.as_mut() {
                log.log_write(Utc::now(), &log_bytes)?;
            }
        }
        if bytes.is_empty() {
            return Ok(());
        }
        wire.data(channel_id, CryptoVec::from(bytes));
        Ok(())
    }

    async fn handle_keystroke(&mut self, byte: u8) {
        let Some(session) = self.session.as_mut() else { return };
        match byte {
            0x03 => session.handle_ctrl_c().await,
            0x04 => {
                if session.line_buffer.is_empty() {
                    session.handle_ctrl_d().await;
                }
            }
            0x15 => session.handle_ctrl_u(),
            b'\r' | b'\n' => {
                let line = std::mem::take(&mut session.line_buffer);
                session.cursor = 0;
                session.history_cursor = None;
                session.write(b"\r\n");
                session.handle_line(line).await;
            }
            0x7f | 0x08 => {
                if session.cursor > 0 {
                    let idx = session.cursor - 1;
                    session.line_buffer.remove(idx);
                    session.cursor -= 1;
                    if !session.password_echo_suppressed {
                        session.write(b"\x08 \x08");
                    }
                }
            }
            _ if byte.is_ascii_graphic() || byte == b' ' => {
                let idx = session.cursor;
                session.line_buffer.insert(idx, byte as char);
                session.cursor += 1;
                if !session.password_echo_suppressed {
                    session.write(&[byte]);
                }
            }
            _ => {}
        }
    }

    async fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else { return };
        session.should_disconnect = true;
        let end = Utc::now();
        if let Err(e) = lastlog::append(&self.shared.lastlog_path, &self.peer_string(), session.login_time, end) {
            warn!(error = ?e, "failed to append lastlog entry");
        }
        self.shared
            .event_sink
            .emit(Event::ChannelClose { timestamp: end.to_rfc3339(), session_id: self.session_id.clone() })
            .await;
        self.ttylog = None;
    }
}

#[async_trait]
impl server::Handler for ConnHandler {
    type Error = anyhow::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        self.username = Some(user.to_string());
        self.shared
            .event_sink
            .emit(Event::Connection {
                timestamp: Utc::now().to_rfc3339(),
                session_id: self.session_id.clone(),
                peer_addr: self.peer_string(),
            })
            .await;

        let accepted = user == "root" && self.accepted_password(password);
        self.shared
            .event_sink
            .emit(Event::AuthAttempt {
                timestamp: Utc::now().to_rfc3339(),
                session_id: self.session_id.clone(),
                username: user.to_string(),
                password: password.to_string(),
                accepted,
            })
            .await;

        if accepted {
            self.shared
                .event_sink
                .emit(Event::AuthSuccess {
                    timestamp: Utc::now().to_rfc3339(),
                    session_id: self.session_id.clone(),
                    username: user.to_string(),
                })
                .await;
            Ok(Auth::Accept)
        } else {
            let err = HoneypotError::AuthFailure;
            debug!(%err, user, "credential rejected");
            Ok(Auth::Reject { proceed_with_methods: None })
        }
    }

    /// PAM-style keyboard-interactive, reduced to the same password
    /// check: the first response is treated as the password.
    async fn auth_keyboard_interactive(
        &mut self,
        user: &str,
        _submethods: &str,
        response: Option<server::Response<'async_trait>>,
    ) -> Result<Auth, Self::Error> {
        match response.and_then(|mut r| r.next()) {
            Some(answer) => {
                let password = String::from_utf8_lossy(answer).into_owned();
                self.auth_password(user, &password).await
            }
            None => Ok(Auth::Reject { proceed_with_methods: None }),
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut WireSession,
    ) -> Result<bool, Self::Error> {
        self.channel_id = Some(channel.id());
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        _channel: ChannelId,
        _term: &str,
        _col_width: u32,
        _row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        _session: &mut WireSession,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn exec_request(
        &mut self,
        _channel: ChannelId,
        _data: &[u8],
        _session: &mut WireSession,
    ) -> Result<(), Self::Error> {
        Err(anyhow::anyhow!("exec channels are not implemented"))
    }

    async fn shell_request(&mut self, channel: ChannelId, wire: &mut WireSession) -> Result<(), Self::Error> {
        let username = self.username.clone().unwrap_or_else(|| "root".to_string());
        let start = Utc::now();

        let log_path = crate::ttylog::session_log_path(&self.shared.config.log_path, start);
        let ttylog = TtyLog::open(&log_path, start)?;
        self.ttylog = Some(ttylog);

        let mut session = Session::with_event_sink(
            self.session_id.clone(),
            self.peer_string(),
            username,
            self.shared.config.hostname.clone(),
            self.shared.vfs_image.clone(),
            self.shared.txtcmds_path.clone(),
            self.shared.event_sink.clone(),
        );
        session.login_time = start;
        // Matches the original's `connectionMade` querying the terminal
        // size before the first prompt; flagged no-log so it doesn't
        // pollute replay.
        session.write_nolog(b"\x1b[21t");
        session.draw_prompt();
        self.session = Some(session);
        self.channel_id = Some(channel);

        self.flush_output(wire).await?;
        Ok(())
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], wire: &mut WireSession) -> Result<(), Self::Error> {
        self.channel_id = Some(channel);
        if self.session.is_none() {
            // A real client always requests a pty/shell before sending
            // data; anything else is a client skipping the handshake.
            let err = HoneypotError::Protocol("channel data received before shell request".to_string());
            warn!(%err, "closing connection");
            return Err(err.into());
        }
        if let Some(log) = self.ttylog.as_mut() {
            log.log_read(Utc::now(), data)?;
        }

        for &byte in data {
            if let Some(decoded) = self.decoder.feed(byte) {
                match decoded {
                    term::Decoded::Keystroke(b) => self.handle_keystroke(b).await,
                    term::Decoded::Title(title) => {
                        info!(title = %title, "terminal title captured");
                    }
                    // Arrow keys, function keys, and other control
                    // sequences are acknowledged (logged, state machine
                    // advances) but don't drive the line editor: the
                    // reference command set has no use for cursor
                    // movement or history recall yet.
                    term::Decoded::ShortControl(_)
                    | term::Decoded::Csi { .. }
                    | term::Decoded::LowFunction(_) => {}
                }
            }
        }

        self.flush_output(wire).await?;

        let disconnect = self.session.as_ref().map(|s| s.should_disconnect).unwrap_or(false);
        if disconnect {
            wire.close(channel);
            self.teardown().await;
        }
        Ok(())
    }

    async fn channel_close(&mut self, _channel: ChannelId, _session: &mut WireSession) -> Result<(), Self::Error> {
        self.teardown().await;
        Ok(())
    }

    async fn channel_eof(&mut self, channel: ChannelId, session: &mut WireSession) -> Result<(), Self::Error> {
        session.close(channel);
        self.teardown().await;
        Ok(())
    }
}
