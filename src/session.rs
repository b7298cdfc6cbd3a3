//! Session Orchestrator (C6): per-connection identity, cwd, hostname,
//! env, command registry, and the command stack, gluing the vfs, shell,
//! and terminal layers onto one authenticated SSH channel.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    command::{Command, CommandFactory, Outcome},
    commands, consts,
    event::{Event, EventSink, NullSink},
    shell,
    vfs::{Vfs, VfsImage},
};

/// Where a name resolved to, from `Session::get_command`.
pub enum Resolved {
    /// A builtin or reference command, keyed by name in the registry.
    Registry(CommandFactory),
    /// A canned-response file on the real host filesystem, sibling to a
    /// probed vfs path under `txtcmds_path`.
    Txtcmd(PathBuf),
    NotFound,
}

pub struct Session {
    pub session_id: String,
    pub client_ip: String,
    pub login_time: DateTime<Utc>,
    pub username: String,
    pub hostname: String,

    pub cwd: String,
    pub env: HashMap<String, String>,
    /// Per-command environment overlay: a copy of `env` with the current
    /// line's leading `KEY=VALUE` assignments folded in. Read by builtins
    /// like `env`; never written back to `env` (that would leak a
    /// per-command assignment into the session), except by builtins like
    /// `export` that explicitly mutate `env` itself.
    pub env_overlay: HashMap<String, String>,

    /// Raw line buffer and cursor maintained by the terminal/line-editor
    /// layer (C3) as it decodes keystrokes; moved into the shell only on
    /// RETURN.
    pub line_buffer: String,
    pub cursor: usize,
    pub history: Vec<String>,
    pub history_cursor: Option<usize>,
    /// Suppresses character echo (e.g. while a command fakes a password
    /// prompt) without suppressing the line buffer itself.
    pub password_echo_suppressed: bool,

    pub vfs: Vfs,
    registry: HashMap<String, CommandFactory>,
    pub command_stack: Vec<Box<dyn Command>>,
    /// Semicolon-split commands still waiting to run on this line.
    pub pending: std::collections::VecDeque<String>,

    /// Bytes queued for the attacker, drained and written to the SSH
    /// channel by the async connection-handling layer. Filling this
    /// buffer and tokenising/resolving commands is all CPU-only work;
    /// nothing in this file ever awaits.
    pub out: Vec<u8>,
    /// The subset of `out` that should also land in the tty log: every
    /// `write`/`writeln` appends here too, except `write_nolog`, used
    /// for the session-start terminal-size query, which would pollute
    /// replay (§8: total WRITE bytes == channel bytes minus no-log bytes).
    pub log_out: Vec<u8>,

    pub should_disconnect: bool,

    event_sink: Arc<dyn EventSink>,
    txtcmds_path: Option<PathBuf>,
}

impl Session {
    pub fn new(
        session_id: String,
        client_ip: String,
        username: String,
        hostname: String,
        base_image: Arc<VfsImage>,
        txtcmds_path: Option<PathBuf>,
    ) -> Self {
        Self::with_event_sink(
            session_id,
            client_ip,
            username,
            hostname,
            base_image,
            txtcmds_path,
            Arc::new(NullSink),
        )
    }

    pub fn with_event_sink(
        session_id: String,
        client_ip: String,
        username: String,
        hostname: String,
        base_image: Arc<VfsImage>,
        txtcmds_path: Option<PathBuf>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), consts::DEFAULT_PATH.to_string());
        env.insert("HOME".to_string(), "/root".to_string());
        env.insert("USER".to_string(), username.clone());

        Session {
            session_id,
            client_ip,
            login_time: Utc::now(),
            username,
            hostname,
            cwd: "/root".to_string(),
            env_overlay: env.clone(),
            env,
            line_buffer: String::new(),
            cursor: 0,
            history: Vec::new(),
            history_cursor: None,
            password_echo_suppressed: false,
            vfs: Vfs::new(base_image),
            registry: commands::default_registry(),
            command_stack: Vec::new(),
            pending: std::collections::VecDeque::new(),
            out: Vec::new(),
            log_out: Vec::new(),
            should_disconnect: false,
            event_sink,
            txtcmds_path,
        }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
        self.log_out.extend_from_slice(bytes);
    }

    /// Like `write`, but exempt from the tty log — used for writes the
    /// attacker's terminal must see but that would pollute replay, such
    /// as the terminal-size query sent at session start.
    pub fn write_nolog(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub fn writeln(&mut self, s: &str) {
        self.write(s.as_bytes());
        self.write(b"\r\n");
    }

    pub fn next_line(&mut self) {
        self.write(b"\r\n");
    }

    /// Takes and clears whatever has accumulated in the tty-log-only
    /// buffer since the last drain.
    pub fn drain_log_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.log_out)
    }

    pub async fn emit_event(&self, event: Event) {
        self.event_sink.emit(event).await;
    }

    /// The environment a command currently on top of the stack should
    /// see: `env` with this line's leading assignments folded in.
    pub fn effective_env(&self) -> &HashMap<String, String> {
        &self.env_overlay
    }

    /// Takes and clears whatever output has accumulated since the last
    /// drain, for the async layer to actually write (and tty-log) to the
    /// channel.
    pub fn drain_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    /// Command resolution, §4.6. `paths` is the effective PATH (already
    /// split on `:`) for the command currently being looked up.
    pub fn get_command(&self, name: &str, paths: &[&str]) -> Resolved {
        if name.is_empty() {
            return Resolved::NotFound;
        }
        if let Some(factory) = self.registry.get(name) {
            return Resolved::Registry(*factory);
        }

        let vfs_path = if name.starts_with('.') || name.starts_with('/') {
            match self.vfs.resolve_path(name, &self.cwd) {
                Ok(resolved) if self.vfs.exists(&resolved) => Some(resolved),
                _ => None,
            }
        } else {
            paths.iter().find_map(|dir| {
                let candidate = format!("{}/{}", dir.trim_end_matches('/'), name);
                if self.vfs.exists(&candidate) { Some(candidate) } else { None }
            })
        };

        let Some(vfs_path) = vfs_path else { return Resolved::NotFound };

        // Per SPEC_FULL.md §9's open-question resolution: only consult
        // the txtcmd sibling when a vfs path was actually found above.
        if let Some(txtcmds_path) = &self.txtcmds_path {
            let real_path = txtcmds_path.join(vfs_path.trim_start_matches('/'));
            if real_path.is_file() {
                return Resolved::Txtcmd(real_path);
            }
        }

        let basename = vfs_path.rsplit('/').next().unwrap_or(&vfs_path);
        match self.registry.get(basename) {
            Some(factory) => Resolved::Registry(*factory),
            None => Resolved::NotFound,
        }
    }

    /// `<hostname>:<path># ` with `/root` displayed as `~`.
    pub fn prompt(&self) -> String {
        let display_cwd = if self.cwd == "/root" { "~".to_string() } else { self.cwd.clone() };
        format!("{}:{}# ", self.hostname, display_cwd)
    }

    /// Writes the prompt with no leading newline, matching the
    /// original's `showPrompt` and real bash: the preceding command's
    /// own trailing `\r\n` (or the CR echo of the keystroke that ended
    /// the line) already put the cursor at the start of a fresh line.
    pub fn draw_prompt(&mut self) {
        let prompt = self.prompt();
        self.write(prompt.as_bytes());
    }

    /// Routes a completed input line to whatever is on top of the
    /// command stack, or to the shell if the stack is empty.
    pub async fn handle_line(&mut self, line: String) {
        match self.command_stack.pop() {
            Some(mut top) => {
                let outcome = top.line_received(self, &line).await;
                self.settle(top, outcome).await;
            }
            None => shell::on_line(self, &line).await,
        }
    }

    pub async fn handle_ctrl_c(&mut self) {
        match self.command_stack.pop() {
            Some(mut top) => {
                let outcome = top.ctrl_c(self).await;
                self.settle(top, outcome).await;
            }
            None => shell::on_ctrl_c(self),
        }
    }

    /// Ctrl-D is only meaningful at the shell (EOF on the fake tty);
    /// while a command owns the stack, a real shell would deliver it as
    /// EOF on that command's stdin, which none of the reference commands
    /// read, so it is a no-op there.
    pub async fn handle_ctrl_d(&mut self) {
        if self.command_stack.is_empty() {
            shell::on_ctrl_d(self).await;
        }
    }

    pub fn handle_ctrl_u(&mut self) {
        shell::on_ctrl_u(self);
    }

    /// After a stack entry handles an event: push it back if it wants to
    /// keep running, otherwise let it drop and resume whatever is now on
    /// top (another command, or the shell once the stack empties).
    async fn settle(&mut self, entry: Box<dyn Command>, outcome: Outcome) {
        match outcome {
            Outcome::Continue => self.command_stack.push(entry),
            Outcome::Exit => self.resume_top().await,
        }
    }

    /// Called once a command has actually popped off the stack. Keeps
    /// unwinding if the new top also exits immediately on resume.
    async fn resume_top(&mut self) {
        loop {
            match self.command_stack.pop() {
                Some(mut top) => {
                    let outcome = top.resume(self).await;
                    match outcome {
                        Outcome::Continue => {
                            self.command_stack.push(top);
                            return;
                        }
                        Outcome::Exit => continue,
                    }
                }
                None => {
                    shell::resume(self).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn session() -> Session {
        Session::new(
            "test-session".to_string(),
            "203.0.113.7".to_string(),
            "root".to_string(),
            "svr03".to_string(),
            VfsImage::minimal(),
            None,
        )
    }

    #[test]
    fn prompt_shows_tilde_for_home() {
        let s = session();
        assert_eq!(s.prompt(), "svr03:~# ");
    }

    #[test]
    fn prompt_shows_absolute_path_elsewhere() {
        let mut s = session();
        s.cwd = "/tmp".to_string();
        assert_eq!(s.prompt(), "svr03:/tmp# ");
    }

    #[test]
    fn get_command_finds_registered_builtin() {
        let s = session();
        assert!(matches!(s.get_command("pwd", &["/bin"]), Resolved::Registry(_)));
    }

    #[test]
    fn get_command_misses_unknown_name() {
        let s = session();
        assert!(matches!(s.get_command("wget", &["/bin", "/usr/bin"]), Resolved::NotFound));
    }

    #[test]
    fn get_command_empty_name_is_not_found() {
        let s = session();
        assert!(matches!(s.get_command("", &["/bin"]), Resolved::NotFound));
    }
}
