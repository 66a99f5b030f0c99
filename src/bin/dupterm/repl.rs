use anyhow::Result;
use dupterm::console::Console;
use dupterm::{log_debug, token};
use dupterm::vterm::Vterm;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const PROMPT: &str = ">>> ";
const INPUT_POLL: Duration = Duration::from_millis(100);

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;
const CTRL_D: u8 = 0x04;

const HELP: &str = "\
commands:
  help          show this list
  echo <text>   print text
  status        show console duplication state as JSON
  detach        drop the remote console
  exit          leave dupterm
";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Command<'a> {
    Empty,
    Help,
    Echo(&'a str),
    Status,
    Detach,
    Exit,
    Unknown(&'a str),
}

pub(crate) fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    let (name, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(name, rest)| (name, rest.trim_start()));
    match name {
        "" => Command::Empty,
        "help" | "?" => Command::Help,
        "echo" => Command::Echo(rest),
        "status" => Command::Status,
        "detach" => Command::Detach,
        "exit" | "quit" => Command::Exit,
        _ => Command::Unknown(name),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Byte-at-a-time line editor over the console input queue.
struct LineEditor {
    line: Vec<u8>,
    after_cr: bool,
}

enum Edit {
    Nothing,
    Echo(&'static [u8]),
    Inserted(u8),
    Submit(String),
    EndOfInput,
}

impl LineEditor {
    fn new() -> Self {
        Self {
            line: Vec::new(),
            after_cr: false,
        }
    }

    fn feed(&mut self, byte: u8) -> Edit {
        let after_cr = std::mem::take(&mut self.after_cr);
        match byte {
            // Remote terminals send CR LF or CR NUL for Enter.
            b'\n' | 0 if after_cr => Edit::Nothing,
            b'\r' | b'\n' => {
                self.after_cr = byte == b'\r';
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                Edit::Submit(line)
            }
            BACKSPACE | DELETE => match self.line.pop() {
                Some(_) => Edit::Echo(b"\x08 \x08"),
                None => Edit::Nothing,
            },
            CTRL_D if self.line.is_empty() => Edit::EndOfInput,
            byte if byte.is_ascii_control() => Edit::Nothing,
            byte => {
                self.line.push(byte);
                Edit::Inserted(byte)
            }
        }
    }

    fn discard(&mut self) {
        self.line.clear();
        self.after_cr = false;
    }
}

/// Run the REPL until `exit`, Ctrl-D, or the local terminal closing with no remote
/// console attached.
pub(crate) fn run(
    engine: &Vterm,
    console: &Console,
    echo: bool,
    local_eof: &AtomicBool,
) -> Result<()> {
    let _token = token::acquire();
    let mut editor = LineEditor::new();
    console.stdout_str(PROMPT);
    loop {
        if console.interrupt().take_pending() {
            keyboard_interrupt(&mut editor, console);
            console.stdout_str(PROMPT);
            continue;
        }
        let Some(byte) = console.stdin_rx_chr(INPUT_POLL) else {
            if local_eof.load(Ordering::Acquire)
                && console.input().is_empty()
                && !engine.is_active()
            {
                return Ok(());
            }
            continue;
        };
        match editor.feed(byte) {
            Edit::Nothing => {}
            Edit::Echo(bytes) => {
                if echo {
                    console.stdout_write(bytes, true);
                }
            }
            Edit::Inserted(byte) => {
                if echo {
                    console.stdout_write(&[byte], true);
                }
            }
            Edit::Submit(line) => {
                console.stdout_str("\n");
                if execute(engine, console, &line)? == Flow::Exit {
                    return Ok(());
                }
                console.stdout_str(PROMPT);
            }
            Edit::EndOfInput => {
                console.stdout_str("\n");
                return Ok(());
            }
        }
    }
}

/// Abandon the pending line and whatever was typed ahead of the interrupt.
fn keyboard_interrupt(editor: &mut LineEditor, console: &Console) {
    editor.discard();
    let dropped = console.input().clear();
    if dropped > 0 {
        log_debug(&format!("keyboard interrupt discarded {dropped} queued input bytes"));
    }
    console.stdout_str("\nKeyboardInterrupt\n");
}

fn execute(engine: &Vterm, console: &Console, line: &str) -> Result<Flow> {
    match parse_command(line) {
        Command::Empty => {}
        Command::Help => console.stdout_str(HELP),
        Command::Echo(text) => console.stdout_str(&format!("{text}\n")),
        Command::Status => {
            let status = serde_json::to_string_pretty(&engine.stats())?;
            console.stdout_str(&format!("{status}\n"));
        }
        Command::Detach => {
            if engine.unregister() {
                console.stdout_str("remote console detached\n");
            } else {
                console.stdout_str("no remote console attached\n");
            }
        }
        Command::Exit => return Ok(Flow::Exit),
        Command::Unknown(name) => {
            console.stdout_str(&format!("unknown command: {name} (try help)\n"));
        }
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(editor: &mut LineEditor, bytes: &[u8]) -> Vec<String> {
        bytes
            .iter()
            .filter_map(|&byte| match editor.feed(byte) {
                Edit::Submit(line) => Some(line),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_commands_and_arguments() {
        assert_eq!(parse_command("   "), Command::Empty);
        assert_eq!(parse_command("help"), Command::Help);
        assert_eq!(parse_command("echo  hello world "), Command::Echo("hello world"));
        assert_eq!(parse_command("echo"), Command::Echo(""));
        assert_eq!(parse_command(" status"), Command::Status);
        assert_eq!(parse_command("quit"), Command::Exit);
        assert_eq!(parse_command("launch now"), Command::Unknown("launch"));
    }

    #[test]
    fn crlf_and_cr_nul_submit_one_line() {
        let mut editor = LineEditor::new();
        assert_eq!(feed_all(&mut editor, b"help\r\nstatus\r\0"), ["help", "status"]);
        assert_eq!(feed_all(&mut editor, b"echo\n\n"), ["echo", ""]);
    }

    #[test]
    fn backspace_edits_the_pending_line() {
        let mut editor = LineEditor::new();
        assert_eq!(feed_all(&mut editor, b"exiz\x7ft\r"), ["exit"]);
        assert!(matches!(editor.feed(DELETE), Edit::Nothing));
    }

    #[test]
    fn keyboard_interrupt_drops_line_and_type_ahead() {
        let console = Console::new(Box::new(std::io::sink()));
        let mut editor = LineEditor::new();
        assert!(feed_all(&mut editor, b"echo half").is_empty());
        assert!(console.input().enqueue_timeout(b'x', Duration::ZERO));
        assert!(console.input().enqueue_timeout(b'\r', Duration::ZERO));

        keyboard_interrupt(&mut editor, &console);
        assert!(console.input().is_empty());
        assert_eq!(feed_all(&mut editor, b"status\r"), ["status"]);
    }

    #[test]
    fn ctrl_d_ends_input_only_on_an_empty_line() {
        let mut editor = LineEditor::new();
        assert!(matches!(editor.feed(CTRL_D), Edit::EndOfInput));
        assert!(matches!(editor.feed(b'a'), Edit::Inserted(b'a')));
        assert!(matches!(editor.feed(CTRL_D), Edit::Nothing));
    }
}
