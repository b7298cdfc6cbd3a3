//! Reference Command Set (C14): the handful of builtins needed to drive
//! the session engine end-to-end without depending on an external
//! command plug-in repository (`ls`, `cat`, `wget`, and friends remain
//! external collaborators reachable only through the command ABI and,
//! for unregistered names, the txtcmd mechanism in `Session::get_command`).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    command::{Command, CommandFactory, Outcome},
    session::Session,
    vfs::NodeKind,
};

pub fn default_registry() -> HashMap<String, CommandFactory> {
    let mut reg: HashMap<String, CommandFactory> = HashMap::new();
    reg.insert("cd".to_string(), make_cd);
    reg.insert("pwd".to_string(), make_pwd);
    reg.insert("echo".to_string(), make_echo);
    reg.insert("env".to_string(), make_env);
    reg.insert("export".to_string(), make_export);
    reg.insert("exit".to_string(), make_exit);
    reg.insert("logout".to_string(), make_exit);
    reg.insert("clear".to_string(), make_clear);
    reg.insert("history".to_string(), make_history);
    reg.insert("whoami".to_string(), make_whoami);
    reg
}

struct CdCommand {
    argv: Vec<String>,
}
fn make_cd(argv: Vec<String>) -> Box<dyn Command> {
    Box::new(CdCommand { argv })
}
#[async_trait]
impl Command for CdCommand {
    async fn call(&mut self, session: &mut Session) {
        let target = self.argv.first().cloned().unwrap_or_else(|| "/root".to_string());
        let resolved = match session.vfs.resolve_path(&target, &session.cwd) {
            Ok(p) => p,
            Err(_) => {
                session.writeln(&format!("-bash: cd: {}: Invalid argument", target));
                return;
            }
        };
        match session.vfs.stat(&resolved) {
            Ok(node) if node.kind == NodeKind::Directory => session.cwd = resolved,
            Ok(_) => session.writeln(&format!("-bash: cd: {}: Not a directory", target)),
            Err(_) => session.writeln(&format!("-bash: cd: {}: No such file or directory", target)),
        }
    }
}

struct PwdCommand;
fn make_pwd(_argv: Vec<String>) -> Box<dyn Command> {
    Box::new(PwdCommand)
}
#[async_trait]
impl Command for PwdCommand {
    async fn call(&mut self, session: &mut Session) {
        let cwd = session.cwd.clone();
        session.writeln(&cwd);
    }
}

struct EchoCommand {
    argv: Vec<String>,
}
fn make_echo(argv: Vec<String>) -> Box<dyn Command> {
    Box::new(EchoCommand { argv })
}
#[async_trait]
impl Command for EchoCommand {
    async fn call(&mut self, session: &mut Session) {
        let mut words = self.argv.iter();
        let no_newline = matches!(self.argv.first().map(String::as_str), Some("-n"));
        if no_newline {
            words.next();
        }
        let line: Vec<&str> = words.map(String::as_str).collect();
        let text = line.join(" ");
        if no_newline {
            session.write(text.as_bytes());
        } else {
            session.writeln(&text);
        }
    }
}

struct EnvCommand;
fn make_env(_argv: Vec<String>) -> Box<dyn Command> {
    Box::new(EnvCommand)
}
#[async_trait]
impl Command for EnvCommand {
    async fn call(&mut self, session: &mut Session) {
        let mut vars: Vec<(String, String)> =
            session.effective_env().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        vars.sort();
        for (k, v) in vars {
            session.writeln(&format!("{}={}", k, v));
        }
    }
}

struct ExportCommand {
    argv: Vec<String>,
}
fn make_export(argv: Vec<String>) -> Box<dyn Command> {
    Box::new(ExportCommand { argv })
}
#[async_trait]
impl Command for ExportCommand {
    async fn call(&mut self, session: &mut Session) {
        for arg in &self.argv {
            if let Some((key, value)) = arg.split_once('=') {
                session.env.insert(key.to_string(), value.to_string());
            }
        }
    }
}

struct ExitCommand;
fn make_exit(_argv: Vec<String>) -> Box<dyn Command> {
    Box::new(ExitCommand)
}
#[async_trait]
impl Command for ExitCommand {
    async fn call(&mut self, session: &mut Session) {
        session.should_disconnect = true;
    }
}

struct ClearCommand;
fn make_clear(_argv: Vec<String>) -> Box<dyn Command> {
    Box::new(ClearCommand)
}
#[async_trait]
impl Command for ClearCommand {
    async fn call(&mut self, session: &mut Session) {
        session.write(b"\x1b[H\x1b[2J");
    }
}

struct HistoryCommand;
fn make_history(_argv: Vec<String>) -> Box<dyn Command> {
    Box::new(HistoryCommand)
}
#[async_trait]
impl Command for HistoryCommand {
    async fn call(&mut self, session: &mut Session) {
        let lines: Vec<String> = session
            .history
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:5}  {}", i + 1, line))
            .collect();
        for line in lines {
            session.writeln(&line);
        }
    }
}

struct WhoamiCommand;
fn make_whoami(_argv: Vec<String>) -> Box<dyn Command> {
    Box::new(WhoamiCommand)
}
#[async_trait]
impl Command for WhoamiCommand {
    async fn call(&mut self, session: &mut Session) {
        let username = session.username.clone();
        session.writeln(&username);
    }
}

/// Synthesizes a one-shot command that writes a canned-response file's
/// contents, replacing the original's closure-captured `txtcmd` per the
/// redesign note in SPEC_FULL.md §9: a value-typed `Command` whose state
/// is just the file path.
pub struct TxtCmd {
    pub path: std::path::PathBuf,
}
#[async_trait]
impl Command for TxtCmd {
    async fn call(&mut self, session: &mut Session) {
        match std::fs::read(&self.path) {
            Ok(bytes) => session.write(&bytes),
            Err(_) => session.writeln("-bash: command not found"),
        }
    }
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
    async fn cd_to_existing_directory_updates_cwd() {
        let mut s = session();
        let mut cmd = CdCommand { argv: vec!["/tmp".to_string()] };
        cmd.call(&mut s).await;
        assert_eq!(s.cwd, "/tmp");
    }

    #[tokio::test]
    async fn cd_to_missing_directory_reports_error_and_leaves_cwd() {
        let mut s = session();
        let mut cmd = CdCommand { argv: vec!["/nope".to_string()] };
        cmd.call(&mut s).await;
        assert_eq!(s.cwd, "/root");
        assert!(String::from_utf8(s.drain_output()).unwrap().contains("No such file or directory"));
    }

    #[tokio::test]
    async fn pwd_prints_cwd() {
        let mut s = session();
        s.cwd = "/tmp".to_string();
        let mut cmd = PwdCommand;
        cmd.call(&mut s).await;
        assert_eq!(s.drain_output(), b"/tmp\r\n");
    }

    #[tokio::test]
    async fn echo_joins_args_with_spaces() {
        let mut s = session();
        let mut cmd = EchoCommand { argv: vec!["hello".to_string(), "world".to_string()] };
        cmd.call(&mut s).await;
        assert_eq!(s.drain_output(), b"hello world\r\n");
    }

    #[tokio::test]
    async fn env_sees_per_command_overlay_without_mutating_session_env() {
        let mut s = session();
        s.env_overlay.insert("FOO".to_string(), "bar".to_string());
        let mut cmd = EnvCommand;
        cmd.call(&mut s).await;
        let out = String::from_utf8(s.drain_output()).unwrap();
        assert!(out.contains("FOO=bar"));
        assert!(!s.env.contains_key("FOO"));
    }

    #[tokio::test]
    async fn export_persists_into_session_env() {
        let mut s = session();
        let mut cmd = ExportCommand { argv: vec!["FOO=bar".to_string()] };
        cmd.call(&mut s).await;
        assert_eq!(s.env.get("FOO"), Some(&"bar".to_string()));
    }

    #[tokio::test]
    async fn exit_sets_disconnect_flag() {
        let mut s = session();
        let mut cmd = ExitCommand;
        cmd.call(&mut s).await;
        assert!(s.should_disconnect);
    }
}
