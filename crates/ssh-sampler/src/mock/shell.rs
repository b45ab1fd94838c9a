//! A very small fake shell for the mock backend.
//!
//! Understands `echo` (with optional `>&2`), `true`, `false`, `sleep N`,
//! `exit [N|$__rc]`, `__rc=$?`, `kill -9 $$` / `kill -KILL $$`, and command
//! lists joined with `;` and `&&`. Anything else is "not found" with status
//! 127.

use std::time::Duration;

use super::event::MockEvent;

/// How a statement ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Flow {
    Continue(u32),
    Exit(u32),
    Killed(String),
}

/// Fake shell state.
#[derive(Debug, Default)]
pub(crate) struct FakeShell {
    status: u32,
    saved: u32,
}

/// What a line of input did to the shell.
#[derive(Debug, Default)]
pub(crate) struct LineOutcome {
    pub(crate) events: Vec<MockEvent>,
    pub(crate) terminated: bool,
}

impl FakeShell {
    /// Last exit status.
    pub(crate) const fn status(&self) -> u32 {
        self.status
    }

    /// Run one command line.
    pub(crate) fn run_line(&mut self, line: &str) -> LineOutcome {
        let mut out = LineOutcome::default();
        for statement in line.split(';') {
            let mut first = true;
            for part in statement.split("&&") {
                if !first && self.status != 0 {
                    break;
                }
                first = false;
                match self.builtin(part.trim(), &mut out.events) {
                    Flow::Continue(status) => self.status = status,
                    Flow::Exit(status) => {
                        self.status = status;
                        out.events.extend([
                            MockEvent::Eof,
                            MockEvent::ExitStatus(status),
                            MockEvent::Close,
                        ]);
                        out.terminated = true;
                        return out;
                    }
                    Flow::Killed(signal) => {
                        out.events.extend([
                            MockEvent::ExitSignal(signal),
                            MockEvent::Eof,
                            MockEvent::Close,
                        ]);
                        out.terminated = true;
                        return out;
                    }
                }
            }
        }
        out
    }

    /// Run a whole exec request: the line, then exit with the last status.
    pub(crate) fn run_exec(&mut self, command: &str) -> Vec<MockEvent> {
        let mut outcome = self.run_line(command);
        if !outcome.terminated {
            outcome.events.extend([
                MockEvent::Eof,
                MockEvent::ExitStatus(self.status),
                MockEvent::Close,
            ]);
        }
        outcome.events
    }

    fn builtin(&mut self, part: &str, events: &mut Vec<MockEvent>) -> Flow {
        let (word, rest) = part.split_once(' ').unwrap_or((part, ""));
        let rest = rest.trim();
        match word {
            "" => Flow::Continue(self.status),
            "true" => Flow::Continue(0),
            "false" => Flow::Continue(1),
            "echo" => {
                if let Some(text) = rest.strip_suffix(">&2") {
                    events.push(MockEvent::stderr(&format!("{}\n", text.trim_end())));
                } else {
                    events.push(MockEvent::stdout(&format!("{rest}\n")));
                }
                Flow::Continue(0)
            }
            "sleep" => match rest.parse::<u64>() {
                Ok(secs) => {
                    if secs > 0 {
                        events.push(MockEvent::Delay(Duration::from_secs(secs)));
                    }
                    Flow::Continue(0)
                }
                Err(_) => {
                    events.push(MockEvent::stderr("sleep: invalid time interval\n"));
                    Flow::Continue(1)
                }
            },
            "__rc=$?" => {
                self.saved = self.status;
                Flow::Continue(0)
            }
            "exit" => match rest {
                "" => Flow::Exit(self.status),
                "$__rc" => Flow::Exit(self.saved),
                n => Flow::Exit(n.parse().unwrap_or(2)),
            },
            "kill" if rest == "-9 $$" || rest == "-KILL $$" => Flow::Killed("KILL".to_string()),
            other => {
                events.push(MockEvent::stderr(&format!("sh: 1: {other}: not found\n")));
                Flow::Continue(127)
            }
        }
    }
}
