use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::backend::TerminalBackend;
use crate::error_handling::types::ContainerError;

/// Produces the canned response for one simulated-shell command line.
///
/// The interpreter is stateless: `cd` accepts anything and changes
/// nothing, the file set is fixed, and everything else is echoed back
/// as unknown. It exists so a session stays usable when no real
/// container is reachable, not to be convincing.
pub fn respond(line: &str) -> String {
    let line = line.trim_end_matches('\n').trim_end_matches('\r');
    if line.is_empty() {
        return "\r\n".to_string();
    }
    if line == "ls" {
        return "\r\nbin  etc  home  lib  root  usr  var\r\n".to_string();
    }
    if line == "pwd" {
        return "\r\n/root\r\n".to_string();
    }
    if line.starts_with("cd ") || line == "cd" {
        return "\r\n".to_string();
    }
    if line == "help" {
        return "\r\n\x1b[1;33mCommands available in simulated mode:\x1b[0m\r\n\
                ls, pwd, cd, help, echo, cat\r\n"
            .to_string();
    }
    if let Some(rest) = line.strip_prefix("echo ") {
        return format!("\r\n{}\r\n", rest);
    }
    if let Some(rest) = line.strip_prefix("cat ") {
        let file = rest.trim();
        return match file {
            "/etc/passwd" => "\r\nroot:x:0:0:root:/root:/bin/bash\r\n".to_string(),
            "/etc/hostname" => "\r\narena-sandbox\r\n".to_string(),
            _ => format!("\r\ncat: {}: No such file or directory\r\n", file),
        };
    }
    format!("\r\n{}: command not found\r\n", line)
}

/// Terminal backend running the simulated shell.
///
/// Input bytes are buffered until a carriage return completes the
/// command line; each completed line produces one response chunk on the
/// output side.
pub struct SimulatedStream {
    line: Vec<u8>,
    tx: UnboundedSender<Vec<u8>>,
    rx: UnboundedReceiver<Vec<u8>>,
}

impl SimulatedStream {
    pub fn new() -> Self {
        let (tx, rx) = unbounded_channel();
        SimulatedStream {
            line: Vec::new(),
            tx,
            rx,
        }
    }
}

impl Default for SimulatedStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TerminalBackend for SimulatedStream {
    async fn read_output(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    async fn write_input(&mut self, bytes: &[u8]) -> Result<(), ContainerError> {
        for &byte in bytes {
            if byte == b'\r' || byte == b'\n' {
                let line = String::from_utf8_lossy(&self.line).to_string();
                self.line.clear();
                let _ = self.tx.send(respond(&line).into_bytes());
            } else {
                self.line.push(byte);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_directory_listing() {
        assert_eq!(respond("ls"), "\r\nbin  etc  home  lib  root  usr  var\r\n");
    }

    #[test]
    fn working_directory_and_cd() {
        assert_eq!(respond("pwd"), "\r\n/root\r\n");
        assert_eq!(respond("cd /tmp"), "\r\n");
    }

    #[test]
    fn echo_returns_its_argument() {
        assert_eq!(respond("echo hello world"), "\r\nhello world\r\n");
    }

    #[test]
    fn canned_files_and_missing_files() {
        assert_eq!(
            respond("cat /etc/passwd"),
            "\r\nroot:x:0:0:root:/root:/bin/bash\r\n"
        );
        assert_eq!(respond("cat /etc/hostname"), "\r\narena-sandbox\r\n");
        assert_eq!(
            respond("cat /etc/shadow"),
            "\r\ncat: /etc/shadow: No such file or directory\r\n"
        );
    }

    #[test]
    fn unknown_commands_and_blank_lines() {
        assert_eq!(respond("nmap -sV"), "\r\nnmap -sV: command not found\r\n");
        assert_eq!(respond(""), "\r\n");
        assert_eq!(respond("\r"), "\r\n");
    }

    #[tokio::test]
    async fn stream_buffers_keystrokes_until_return() {
        let mut stream = SimulatedStream::new();
        // typed one key at a time, like a raw terminal sends them
        stream.write_input(b"l").await.unwrap();
        stream.write_input(b"s").await.unwrap();
        stream.write_input(b"\r").await.unwrap();

        let out = stream.read_output().await.unwrap();
        assert_eq!(out, b"\r\nbin  etc  home  lib  root  usr  var\r\n");
    }

    #[tokio::test]
    async fn stream_handles_whole_lines_too() {
        let mut stream = SimulatedStream::new();
        stream.write_input(b"pwd\r").await.unwrap();
        let out = stream.read_output().await.unwrap();
        assert_eq!(out, b"\r\n/root\r\n");
    }
}
