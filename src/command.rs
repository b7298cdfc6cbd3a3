//! Command Host Interface (C5): the contract between the shell and the
//! commands it pushes onto the session's command stack.
//!
//! A `Command` is produced by a `CommandFactory` at lookup time (§4.6),
//! pushed onto `Session::command_stack`, and exercises the lifecycle
//! below until it returns `Outcome::Exit`, at which point the session
//! pops it and resumes whatever is now on top (the shell, if the stack
//! is empty).

use async_trait::async_trait;

use crate::session::Session;

/// What a stack entry wants to happen to itself after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stay on the stack; a later event (usually a line) will come back
    /// to this command.
    Continue,
    /// Pop self off the stack and hand control to whatever is beneath.
    Exit,
}

/// A factory callable, matching the module-exported `name -> factory`
/// mapping the command ABI (§6) describes. `argv` is the command's
/// arguments, already tokenised and wildcard-expanded by the shell.
pub type CommandFactory = fn(argv: Vec<String>) -> Box<dyn Command>;

#[async_trait]
pub trait Command: Send {
    /// Entry point, called once right after the shell pushes this
    /// command onto the stack. The default for a trivial synchronous
    /// command runs `call` and then exits.
    async fn start(&mut self, session: &mut Session) -> Outcome {
        self.call(session).await;
        Outcome::Exit
    }

    /// The command's actual work. Commands that only run once (`pwd`,
    /// `echo`, ...) put everything here and rely on the default `start`.
    /// Commands that stay interactive (a fake line editor) override
    /// `start` instead and leave this as a no-op.
    async fn call(&mut self, _session: &mut Session) {}

    /// Ctrl-C while this command is on top of the stack. Default mimics
    /// a real shell: echo `^C` and exit.
    async fn ctrl_c(&mut self, session: &mut Session) -> Outcome {
        session.writeln("^C");
        Outcome::Exit
    }

    /// A full input line, for commands that consume stdin (fake editors,
    /// `passwd`-style prompts). Commands that don't expect input leave
    /// the default, which just exits — matching a real shell dropping
    /// back out of a one-shot builtin on unexpected input.
    async fn line_received(&mut self, _session: &mut Session, _line: &str) -> Outcome {
        Outcome::Exit
    }

    /// Called when a command this one pushed has popped back off the
    /// stack. Default exits immediately, i.e. this command did not
    /// expect to regain control.
    async fn resume(&mut self, _session: &mut Session) -> Outcome {
        Outcome::Exit
    }
}
